use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::audio_models::AudioFormat;

/// Largest accepted pull block, in frames per channel.
pub const MAX_BLOCK_FRAMES: usize = 1 << 16;

/// Configuration shared by the session manager and the consumer-side stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureConfiguration {
    /// Sample rate assumed when the engine or a frame omits it (default: 48000).
    pub default_sample_rate: u32,

    /// Channel count assumed when the engine or a frame omits it (default: 2).
    pub default_channels: u16,

    /// Frames per channel in one pull block (default: 4096).
    pub block_frames: usize,

    /// Queue depth, in pull blocks, above which a stall is logged (default: 8).
    pub stall_threshold_blocks: usize,

    /// Minimum interval between buffer-health log lines (default: 5000 ms).
    pub health_log_interval_ms: u64,

    /// How often the consumer pump re-checks for shutdown (default: 50 ms).
    pub pump_poll_interval_ms: u64,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.default_sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if !(1..=8).contains(&self.default_channels) {
            return Err(format!("unsupported channel count: {}", self.default_channels));
        }
        if self.block_frames == 0 {
            return Err("block size must be positive".into());
        }
        if self.block_frames > MAX_BLOCK_FRAMES {
            return Err(format!(
                "block size {} exceeds {} frames",
                self.block_frames, MAX_BLOCK_FRAMES
            ));
        }
        if self.pump_poll_interval_ms == 0 {
            return Err("pump poll interval must be positive".into());
        }
        if self.stall_threshold_blocks == 0 {
            return Err("stall threshold must be positive".into());
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(json).map_err(|e| format!("invalid configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_format(&self) -> AudioFormat {
        AudioFormat::new(self.default_sample_rate, self.default_channels)
    }

    pub fn health_log_interval(&self) -> Duration {
        Duration::from_millis(self.health_log_interval_ms)
    }

    pub fn pump_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pump_poll_interval_ms)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            default_sample_rate: 48000,
            default_channels: 2,
            block_frames: 4096,
            stall_threshold_blocks: 8,
            health_log_interval_ms: 5000,
            pump_poll_interval_ms: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CaptureConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_format(), AudioFormat::new(48000, 2));
    }

    #[test]
    fn rejects_bad_values() {
        let config = CaptureConfiguration {
            default_channels: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CaptureConfiguration {
            block_frames: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CaptureConfiguration {
            block_frames: usize::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CaptureConfiguration {
            pump_poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = CaptureConfiguration::from_json_str(r#"{"blockFrames": 1024}"#).unwrap();
        assert_eq!(config.block_frames, 1024);
        assert_eq!(config.default_sample_rate, 48000);
    }

    #[test]
    fn json_is_validated() {
        assert!(CaptureConfiguration::from_json_str(r#"{"defaultSampleRate": 0}"#).is_err());
        assert!(CaptureConfiguration::from_json_str("not json").is_err());
    }
}
