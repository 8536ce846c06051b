use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::controller::ControllerConfig;
use crate::transport::LoopbackTiming;
use crate::types::{CameraChannel, StreamQuality, ViewMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub web_port: u16,

    pub restart_delay_ms: u64,
    pub default_view_mode: ViewMode,
    pub default_channel: CameraChannel,
    pub default_quality: StreamQuality,

    pub connect_delay_ms: u64,
    pub first_frame_delay_ms: u64,
    pub codec: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            web_port: 8080,

            restart_delay_ms: 500,
            default_view_mode: ViewMode::Single,
            default_channel: CameraChannel::Front,
            default_quality: StreamQuality::Hd,

            connect_delay_ms: 150,
            first_frame_delay_ms: 350,
            codec: "h264".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Ok(config_str) = fs::read_to_string(path) {
            let config: AppConfig = serde_json::from_str(&config_str)
                .with_context(|| format!("invalid configuration in {}", path.display()))?;
            return Ok(config);
        }

        tracing::warn!("{} not found, using default configuration", path.display());
        Ok(AppConfig::default())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let config_str = serde_json::to_string_pretty(self)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            restart_delay: Duration::from_millis(self.restart_delay_ms),
            initial_view_mode: self.default_view_mode,
            initial_channel: self.default_channel,
            initial_quality: self.default_quality,
        }
    }

    pub fn loopback_timing(&self) -> LoopbackTiming {
        LoopbackTiming {
            connect_delay: Duration::from_millis(self.connect_delay_ms),
            first_frame_delay: Duration::from_millis(self.first_frame_delay_ms),
            codec: self.codec.clone(),
        }
    }
}
