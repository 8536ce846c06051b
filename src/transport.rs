use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::stream_session::StreamSession;
use crate::types::{StreamParams, StreamSessionState};

/// Timing and codec used by [`LoopbackSession`]
#[derive(Debug, Clone)]
pub struct LoopbackTiming {
    pub connect_delay: Duration,
    pub first_frame_delay: Duration,
    pub codec: String,
}

impl Default for LoopbackTiming {
    fn default() -> Self {
        Self {
            connect_delay: Duration::from_millis(150),
            first_frame_delay: Duration::from_millis(350),
            codec: "h264".to_string(),
        }
    }
}

#[derive(Default)]
struct Attempt {
    last_params: Option<StreamParams>,
    task: Option<JoinHandle<()>>,
}

/// In-process stream session: walks through connect -> first frame on tokio
/// timers and publishes each step on a watch channel.
pub struct LoopbackSession {
    surface_id: String,
    timing: LoopbackTiming,
    state_tx: Arc<watch::Sender<StreamSessionState>>,
    attempt: Mutex<Attempt>,
}

impl LoopbackSession {
    pub fn new(surface_id: impl Into<String>, timing: LoopbackTiming) -> Self {
        let (state_tx, _) = watch::channel(StreamSessionState::default());
        Self {
            surface_id: surface_id.into(),
            timing,
            state_tx: Arc::new(state_tx),
            attempt: Mutex::new(Attempt::default()),
        }
    }

    #[allow(dead_code)]
    pub fn subscribe(&self) -> watch::Receiver<StreamSessionState> {
        self.state_tx.subscribe()
    }

    fn fail(&self, message: &str) {
        warn!("❌ Session {}: {}", self.surface_id, message);
        self.state_tx.send_replace(StreamSessionState {
            error: Some(message.to_string()),
            ..Default::default()
        });
    }

    fn abort_in_flight(attempt: &mut Attempt) {
        if let Some(task) = attempt.task.take() {
            task.abort();
        }
    }
}

impl StreamSession for LoopbackSession {
    fn start(&self, params: StreamParams) {
        let mut attempt = self.attempt.lock().unwrap_or_else(PoisonError::into_inner);
        Self::abort_in_flight(&mut attempt);
        attempt.last_params = Some(params.clone());

        if params.imei.is_empty() {
            drop(attempt);
            self.fail("device identifier is empty");
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                drop(attempt);
                self.fail("no async runtime to drive the stream");
                return;
            }
        };

        info!(
            "▶️ Session {} connecting: imei={}, channel={}, quality={}",
            self.surface_id, params.imei, params.channel, params.stream_type
        );
        self.state_tx.send_replace(StreamSessionState::default());

        let state_tx = self.state_tx.clone();
        let timing = self.timing.clone();
        let surface_id = self.surface_id.clone();
        attempt.task = Some(runtime.spawn(async move {
            tokio::time::sleep(timing.connect_delay).await;
            state_tx.send_modify(|state| {
                state.is_connected = true;
                state.error = None;
            });
            debug!("🔌 Session {} connected", surface_id);

            tokio::time::sleep(timing.first_frame_delay).await;
            state_tx.send_modify(|state| {
                state.is_streaming = true;
                state.codec = Some(timing.codec.clone());
            });
            info!("🎬 Session {} streaming ({})", surface_id, timing.codec);
        }));
    }

    fn stop(&self) {
        let mut attempt = self.attempt.lock().unwrap_or_else(PoisonError::into_inner);
        Self::abort_in_flight(&mut attempt);
        self.state_tx.send_replace(StreamSessionState::default());
        debug!("⏹️ Session {} stopped", self.surface_id);
    }

    fn reconnect(&self) {
        let last_params = self
            .attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_params
            .clone();

        match last_params {
            Some(params) => {
                info!("🔄 Session {} reconnecting", self.surface_id);
                self.stop();
                self.start(params);
            }
            None => self.fail("nothing to reconnect, stream was never started"),
        }
    }

    fn state(&self) -> StreamSessionState {
        self.state_tx.borrow().clone()
    }

    fn surface_id(&self) -> String {
        self.surface_id.clone()
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        let attempt = self.attempt.get_mut().unwrap_or_else(PoisonError::into_inner);
        Self::abort_in_flight(attempt);
    }
}
