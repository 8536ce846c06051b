use serde::{Deserialize, Serialize};

/// Physical camera feed on a dashcam device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraChannel {
    Front = 1,
    Rear = 2,
}

impl CameraChannel {
    pub const ALL: [CameraChannel; 2] = [CameraChannel::Front, CameraChannel::Rear];

    /// Channel number as the transport expects it (1 or 2)
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(CameraChannel::Front),
            2 => Some(CameraChannel::Rear),
            _ => None,
        }
    }

    pub fn other(self) -> Self {
        match self {
            CameraChannel::Front => CameraChannel::Rear,
            CameraChannel::Rear => CameraChannel::Front,
        }
    }
}

impl std::fmt::Display for CameraChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraChannel::Front => write!(f, "front"),
            CameraChannel::Rear => write!(f, "rear"),
        }
    }
}

/// Layout of the live view page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// One channel rendered and streamed
    #[default]
    Single,
    /// Both channels side by side
    Dual,
    /// Both channels streamed, one large and one overlaid
    PictureInPicture,
}

impl ViewMode {
    /// Whether this layout needs both sessions running
    pub fn uses_both_channels(self) -> bool {
        matches!(self, ViewMode::Dual | ViewMode::PictureInPicture)
    }
}

impl std::fmt::Display for ViewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewMode::Single => write!(f, "single"),
            ViewMode::Dual => write!(f, "dual"),
            ViewMode::PictureInPicture => write!(f, "pip"),
        }
    }
}

/// Main stream (HD) or sub stream (SD)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamQuality {
    #[default]
    Hd = 0,
    Sd = 1,
}

impl StreamQuality {
    /// `streamType` value sent to the transport
    pub fn stream_type(self) -> u8 {
        self as u8
    }

    pub fn from_stream_type(stream_type: u8) -> Option<Self> {
        match stream_type {
            0 => Some(StreamQuality::Hd),
            1 => Some(StreamQuality::Sd),
            _ => None,
        }
    }
}

impl std::fmt::Display for StreamQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamQuality::Hd => write!(f, "HD"),
            StreamQuality::Sd => write!(f, "SD"),
        }
    }
}

/// Parameters of a single `start()` request, in transport numbering:
/// `{"imei": "...", "channel": 1|2, "streamType": 0|1}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamParams {
    pub imei: String,
    #[serde(with = "channel_id")]
    pub channel: CameraChannel,
    #[serde(rename = "streamType", with = "stream_type_id")]
    pub stream_type: StreamQuality,
}

mod channel_id {
    use super::CameraChannel;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(channel: &CameraChannel, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(channel.id())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CameraChannel, D::Error> {
        let id = u8::deserialize(deserializer)?;
        CameraChannel::from_id(id)
            .ok_or_else(|| de::Error::custom(format!("invalid channel {}, expected 1 or 2", id)))
    }
}

mod stream_type_id {
    use super::StreamQuality;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(quality: &StreamQuality, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(quality.stream_type())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StreamQuality, D::Error> {
        let stream_type = u8::deserialize(deserializer)?;
        StreamQuality::from_stream_type(stream_type)
            .ok_or_else(|| de::Error::custom(format!("invalid streamType {}, expected 0 or 1", stream_type)))
    }
}

impl StreamParams {
    pub fn new(imei: impl Into<String>, channel: CameraChannel, stream_type: StreamQuality) -> Self {
        Self {
            imei: imei.into(),
            channel,
            stream_type,
        }
    }
}

/// Observable state of one stream session, owned by the transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSessionState {
    #[serde(rename = "isConnected")]
    pub is_connected: bool,
    #[serde(rename = "isStreaming")]
    pub is_streaming: bool,
    pub error: Option<String>,
    pub codec: Option<String>,
}

/// Controller lifecycle: uninitialized -> initializing -> ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerPhase {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
}

/// Everything the presentation layer needs to draw the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderState {
    pub imei: Option<String>,
    pub phase: ControllerPhase,
    pub view_mode: ViewMode,
    pub active_channel: CameraChannel,
    pub quality: StreamQuality,
    pub is_loading: bool,
    pub error: Option<String>,
    pub restart_pending: bool,
    pub front: StreamSessionState,
    pub rear: StreamSessionState,
}
