use std::sync::Arc;

use crate::types::{CameraChannel, StreamParams, StreamSessionState};

/// One camera channel's connection and playback lifecycle.
///
/// Calls return immediately; the resulting state changes are published
/// later through [`StreamSession::state`].
pub trait StreamSession: Send + Sync {
    /// Must not be called while the session is already streaming.
    fn start(&self, params: StreamParams);

    /// Always safe, including when nothing is running.
    fn stop(&self);

    /// Re-establish using the last parameters given to `start`.
    fn reconnect(&self);

    fn state(&self) -> StreamSessionState;

    /// Handle the presentation layer binds a video element to
    fn surface_id(&self) -> String;
}

/// Short label for logs and status pages
pub fn state_label(state: &StreamSessionState) -> &'static str {
    match (state.is_connected, state.is_streaming, state.error.is_some()) {
        (_, _, true) => "Error",
        (_, true, false) => "Streaming",
        (true, false, false) => "Connecting",
        (false, false, false) => "Idle",
    }
}

/// The front and rear sessions owned by one controller
#[derive(Clone)]
pub struct SessionPair {
    front: Arc<dyn StreamSession>,
    rear: Arc<dyn StreamSession>,
}

impl SessionPair {
    pub fn new(front: Arc<dyn StreamSession>, rear: Arc<dyn StreamSession>) -> Self {
        Self { front, rear }
    }

    pub fn get(&self, channel: CameraChannel) -> &Arc<dyn StreamSession> {
        match channel {
            CameraChannel::Front => &self.front,
            CameraChannel::Rear => &self.rear,
        }
    }

    pub fn state(&self, channel: CameraChannel) -> StreamSessionState {
        self.get(channel).state()
    }
}

impl std::fmt::Debug for SessionPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPair")
            .field("front", &state_label(&self.front.state()))
            .field("rear", &state_label(&self.rear.state()))
            .finish()
    }
}
