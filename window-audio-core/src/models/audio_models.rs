use serde::{Deserialize, Serialize};

/// A top-level window reported by the capture engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub executable_name: String,
    #[serde(default)]
    pub process_id: u32,
}

/// An audio session on the render endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSessionInfo {
    pub process_id: u32,
    pub session_id: u32,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, alias = "displayName")]
    pub session_name: Option<String>,
    #[serde(default)]
    pub executable_name: Option<String>,
}

/// Negotiated stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::new(48000, 2)
    }
}

/// One batch of interleaved samples attributed to a capture client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFrame {
    pub client_id: String,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFrame {
    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channels)
    }

    /// Number of sample frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }
}

/// Result of a successful `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub sample_rate: u32,
    pub channels: u16,
    pub using_fallback: bool,
}

impl StartOutcome {
    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_info_accepts_engine_field_names() {
        let window: WindowInfo = serde_json::from_value(serde_json::json!({
            "id": 1234,
            "title": "Player",
            "executableName": "player.exe",
            "processId": 88
        }))
        .unwrap();
        assert_eq!(window.executable_name, "player.exe");
        assert_eq!(window.process_id, 88);
    }

    #[test]
    fn session_display_name_alias() {
        let session: AudioSessionInfo = serde_json::from_value(serde_json::json!({
            "processId": 7,
            "sessionId": 2,
            "isActive": true,
            "displayName": "Music"
        }))
        .unwrap();
        assert_eq!(session.session_name.as_deref(), Some("Music"));
        assert!(session.is_active);
    }

    #[test]
    fn frame_count_handles_zero_channels() {
        let frame = AudioFrame {
            client_id: "1".into(),
            samples: vec![0.0; 6],
            sample_rate: 48000,
            channels: 0,
        };
        assert_eq!(frame.frame_count(), 0);
    }
}
