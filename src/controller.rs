use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::presentation::{self, PresentationHost};
use crate::stream_session::{state_label, SessionPair};
use crate::types::{
    CameraChannel, ControllerPhase, RenderState, StreamParams, StreamQuality, StreamSessionState,
    ViewMode,
};

/// Settings a controller is created with
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Wait between stopping and restarting sessions on a quality change
    pub restart_delay: Duration,
    pub initial_view_mode: ViewMode,
    pub initial_channel: CameraChannel,
    pub initial_quality: StreamQuality,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_millis(500),
            initial_view_mode: ViewMode::Single,
            initial_channel: CameraChannel::Front,
            initial_quality: StreamQuality::Hd,
        }
    }
}

#[derive(Debug)]
struct PendingRestart {
    imei: String,
    quality: StreamQuality,
    channels: HashSet<CameraChannel>,
}

/// Start bookkeeping shared with the deferred restart task
#[derive(Debug, Default)]
struct StartLedger {
    /// Channels with a `start` issued and no `stop` since
    requested: HashSet<CameraChannel>,
    restart: Option<PendingRestart>,
    /// Bumped whenever a scheduled restart is replaced or cancelled
    generation: u64,
}

impl StartLedger {
    fn is_restarting(&self, channel: CameraChannel) -> bool {
        self.restart
            .as_ref()
            .is_some_and(|restart| restart.channels.contains(&channel))
    }

    fn cancel_restart(&mut self) {
        if self.restart.take().is_some() {
            self.generation += 1;
        }
    }
}

/// Orchestrates the front and rear stream sessions of one live view page.
///
/// Every command converges the running session set to what the current
/// view mode, active channel and quality require. A session already
/// running correctly is never restarted.
pub struct ViewController {
    imei: Option<String>,
    sessions: SessionPair,
    config: ControllerConfig,
    phase: ControllerPhase,
    mounted: bool,
    view_mode: ViewMode,
    active_channel: CameraChannel,
    quality: StreamQuality,
    ledger: Arc<Mutex<StartLedger>>,
    restart_task: Option<JoinHandle<()>>,
    dismissed_error: Option<String>,
}

impl ViewController {
    pub fn new(imei: Option<String>, sessions: SessionPair, config: ControllerConfig) -> Self {
        Self {
            imei: imei.filter(|imei| !imei.is_empty()),
            sessions,
            view_mode: config.initial_view_mode,
            active_channel: config.initial_channel,
            quality: config.initial_quality,
            config,
            phase: ControllerPhase::Uninitialized,
            mounted: false,
            ledger: Arc::new(Mutex::new(StartLedger::default())),
            restart_task: None,
            dismissed_error: None,
        }
    }

    fn ledger(&self) -> MutexGuard<'_, StartLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[allow(dead_code)]
    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn active_channel(&self) -> CameraChannel {
        self.active_channel
    }

    #[allow(dead_code)]
    pub fn quality(&self) -> StreamQuality {
        self.quality
    }

    /// Channels the current view mode needs streaming
    fn required_channels(&self) -> Vec<CameraChannel> {
        if self.view_mode.uses_both_channels() {
            CameraChannel::ALL.to_vec()
        } else {
            vec![self.active_channel]
        }
    }

    /// Start the sessions the initial layout needs, exactly once each.
    ///
    /// Without a device identifier nothing starts and the controller stays
    /// uninitialized.
    pub fn mount(&mut self) {
        if self.mounted {
            debug!("Controller already mounted, ignoring mount");
            return;
        }
        self.mounted = true;

        let Some(imei) = self.imei.clone() else {
            debug!("🚫 No device imei, live view stays idle");
            return;
        };

        self.phase = ControllerPhase::Initializing;
        info!(
            "📺 Mounting live view for {}: mode={}, channel={}, quality={}",
            imei, self.view_mode, self.active_channel, self.quality
        );
        for channel in self.required_channels() {
            self.start_session(&imei, channel);
        }
        self.phase = ControllerPhase::Ready;
    }

    /// Stop both sessions unconditionally and forget all lifecycle state.
    pub fn unmount(&mut self) {
        self.cancel_restart();
        for channel in CameraChannel::ALL {
            self.sessions.get(channel).stop();
        }
        self.ledger().requested.clear();

        self.phase = ControllerPhase::Uninitialized;
        self.mounted = false;
        self.dismissed_error = None;
        info!("📴 Live view unmounted, both sessions stopped");
    }

    /// Point the page at another device: full teardown, then a fresh mount.
    pub fn set_imei(&mut self, imei: Option<String>) {
        let imei = imei.filter(|imei| !imei.is_empty());
        if imei == self.imei {
            return;
        }

        info!("🔁 Device changed from {:?} to {:?}", self.imei, imei);
        if self.mounted {
            self.unmount();
            self.imei = imei;
            self.mount();
        } else {
            self.imei = imei;
        }
    }

    pub fn switch_channel(&mut self, channel: CameraChannel) {
        if channel == self.active_channel {
            debug!("Channel {} already active", channel);
            return;
        }

        let previous = self.active_channel;
        self.active_channel = channel;

        if self.view_mode != ViewMode::Single {
            debug!("🎯 Active channel {} -> {} (both sessions kept)", previous, channel);
            return;
        }

        let Some(imei) = self.ready_imei() else {
            return;
        };
        info!("🎯 Switching single view from {} to {}", previous, channel);
        self.stop_session(previous);
        self.start_session(&imei, channel);
    }

    pub fn switch_view_mode(&mut self, mode: ViewMode) {
        if mode == self.view_mode {
            debug!("View mode {} already active", mode);
            return;
        }

        info!("🪟 View mode {} -> {}", self.view_mode, mode);
        self.view_mode = mode;
        self.converge();
    }

    /// Change quality. The new value is readable immediately; sessions are
    /// stopped now and restarted once the restart delay has passed.
    pub fn switch_quality(&mut self, quality: StreamQuality) {
        if quality == self.quality {
            debug!("Quality {} already selected", quality);
            return;
        }

        info!("🎚️ Quality {} -> {}", self.quality, quality);
        self.quality = quality;

        let Some(imei) = self.ready_imei() else {
            return;
        };

        let targets = self.required_channels();
        {
            let mut ledger = self.ledger();
            let mut channels = ledger
                .restart
                .take()
                .map(|restart| restart.channels)
                .unwrap_or_default();

            for channel in targets {
                if !channels.contains(&channel) {
                    self.sessions.get(channel).stop();
                    ledger.requested.remove(&channel);
                    channels.insert(channel);
                    info!("⏹️ Stopped {} for quality change", channel);
                }
            }

            ledger.generation += 1;
            ledger.restart = Some(PendingRestart {
                imei,
                quality,
                channels,
            });
        }

        self.schedule_restart();
    }

    /// Swap the large and overlay channels in picture-in-picture layout.
    /// Never touches the sessions.
    pub fn swap_pip_channels(&mut self) {
        if self.view_mode != ViewMode::PictureInPicture {
            debug!("Swap ignored outside picture-in-picture mode");
            return;
        }
        self.active_channel = self.active_channel.other();
        debug!("🔀 Main picture is now {}", self.active_channel);
    }

    /// Caller-initiated reconnect of one channel. Nothing retries on its own.
    pub fn reconnect(&mut self, channel: CameraChannel) {
        if self.ready_imei().is_none() {
            return;
        }
        if !self.view_mode.uses_both_channels() && channel != self.active_channel {
            debug!(
                "Reconnect of {} ignored, single view shows {}",
                channel, self.active_channel
            );
            return;
        }
        if self.ledger().is_restarting(channel) {
            debug!("Reconnect of {} skipped, restart already scheduled", channel);
            return;
        }

        info!("🔄 Reconnecting {}", channel);
        self.sessions.get(channel).reconnect();
        self.ledger().requested.insert(channel);
    }

    pub fn reconnect_active(&mut self) {
        self.reconnect(self.active_channel);
    }

    /// Hide the current error banner until a different error shows up.
    pub fn dismiss_error(&mut self) {
        self.dismissed_error = self.error();
    }

    pub fn toggle_fullscreen(&self, host: &dyn PresentationHost) {
        presentation::toggle_fullscreen(host);
    }

    pub fn toggle_pip(&self, host: &dyn PresentationHost, channel: CameraChannel) {
        let surface_id = self.sessions.get(channel).surface_id();
        presentation::toggle_picture_in_picture(host, &surface_id);
    }

    /// State of the session for the active channel
    pub fn current_stream(&self) -> StreamSessionState {
        self.sessions.state(self.active_channel)
    }

    /// Connected to the transport, media not flowing yet
    pub fn is_loading(&self) -> bool {
        let current = self.current_stream();
        current.is_connected && !current.is_streaming
    }

    /// First error reported by front, then rear
    pub fn error(&self) -> Option<String> {
        CameraChannel::ALL
            .into_iter()
            .find_map(|channel| self.sessions.state(channel).error)
    }

    fn visible_error(&self) -> Option<String> {
        self.error().filter(|error| Some(error) != self.dismissed_error.as_ref())
    }

    pub fn render_state(&self) -> RenderState {
        RenderState {
            imei: self.imei.clone(),
            phase: self.phase,
            view_mode: self.view_mode,
            active_channel: self.active_channel,
            quality: self.quality,
            is_loading: self.is_loading(),
            error: self.visible_error(),
            restart_pending: self.ledger().restart.is_some(),
            front: self.sessions.state(CameraChannel::Front),
            rear: self.sessions.state(CameraChannel::Rear),
        }
    }

    /// Device id if session commands may run
    fn ready_imei(&self) -> Option<String> {
        if self.phase != ControllerPhase::Ready {
            debug!("Controller not ready ({:?}), no session activity", self.phase);
            return None;
        }
        self.imei.clone()
    }

    /// Bring the running set in line with the current mode: stop what is no
    /// longer needed, start what is needed and not already running.
    fn converge(&mut self) {
        let Some(imei) = self.ready_imei() else {
            return;
        };

        if self.view_mode.uses_both_channels() {
            for channel in CameraChannel::ALL {
                self.ensure_running(&imei, channel);
            }
        } else {
            self.stop_session(self.active_channel.other());
            self.ensure_running(&imei, self.active_channel);
        }
    }

    fn ensure_running(&mut self, imei: &str, channel: CameraChannel) {
        let state = self.sessions.state(channel);
        let (requested, restarting) = {
            let ledger = self.ledger();
            (ledger.requested.contains(&channel), ledger.is_restarting(channel))
        };

        if restarting {
            debug!("{} waits for the scheduled restart", channel);
        } else if state.is_streaming || (requested && state.error.is_none()) {
            debug!("{} already running ({})", channel, state_label(&state));
        } else {
            self.start_session(imei, channel);
        }
    }

    fn start_session(&mut self, imei: &str, channel: CameraChannel) {
        let params = StreamParams::new(imei, channel, self.quality);
        info!(
            "▶️ Starting {} stream for {} ({})",
            channel, imei, self.quality
        );
        self.sessions.get(channel).start(params);
        self.ledger().requested.insert(channel);
    }

    fn stop_session(&mut self, channel: CameraChannel) {
        self.sessions.get(channel).stop();
        info!("⏹️ Stopped {} stream", channel);

        let now_empty = {
            let mut ledger = self.ledger();
            ledger.requested.remove(&channel);
            match ledger.restart.as_mut() {
                Some(restart) => {
                    restart.channels.remove(&channel);
                    restart.channels.is_empty()
                }
                None => false,
            }
        };
        if now_empty {
            self.cancel_restart();
        }
    }

    fn cancel_restart(&mut self) {
        self.ledger().cancel_restart();
        if let Some(task) = self.restart_task.take() {
            task.abort();
        }
    }

    fn schedule_restart(&mut self) {
        if let Some(task) = self.restart_task.take() {
            task.abort();
        }

        let generation = self.ledger().generation;
        let ledger = self.ledger.clone();
        let sessions = self.sessions.clone();
        let delay = self.config.restart_delay;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("⏳ Restart scheduled in {:?}", delay);
                self.restart_task = Some(runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    run_restart(&ledger, &sessions, generation);
                }));
            }
            Err(_) => {
                warn!("No async runtime for delayed restart, waiting on a thread");
                let spawned = std::thread::Builder::new()
                    .name("quality-restart".to_string())
                    .spawn(move || {
                        std::thread::sleep(delay);
                        run_restart(&ledger, &sessions, generation);
                    });
                if let Err(e) = spawned {
                    warn!("Could not schedule restart, sessions stay stopped: {}", e);
                }
            }
        }
    }
}

/// Start the channels of a scheduled restart unless it was superseded.
fn run_restart(ledger: &Mutex<StartLedger>, sessions: &SessionPair, generation: u64) {
    let mut ledger = ledger.lock().unwrap_or_else(PoisonError::into_inner);
    if ledger.generation != generation {
        debug!("Scheduled restart superseded, skipping");
        return;
    }
    let Some(restart) = ledger.restart.take() else {
        return;
    };

    for channel in CameraChannel::ALL {
        if restart.channels.contains(&channel) {
            info!("▶️ Restarting {} stream at {}", channel, restart.quality);
            sessions
                .get(channel)
                .start(StreamParams::new(restart.imei.clone(), channel, restart.quality));
            ledger.requested.insert(channel);
        }
    }
}

impl Drop for ViewController {
    fn drop(&mut self) {
        if self.mounted {
            self.unmount();
        }
    }
}

impl std::fmt::Display for ViewController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ViewController {{ imei: {}, mode: {}, channel: {}, quality: {}, phase: {:?} }}",
            self.imei.as_deref().unwrap_or("-"),
            self.view_mode,
            self.active_channel,
            self.quality,
            self.phase
        )
    }
}
