//! Raw frame payloads as emitted by a capture engine.
//!
//! Engines hand the relay either a bare body (`{samples, sampleRate, channels}`)
//! or the same body wrapped under `data`. Both shapes are resolved once, at the
//! relay boundary, into an [`AudioFrame`](super::audio_models::AudioFrame).

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::processing::coercion;

/// Frame payload of either supported shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FramePayload {
    WrappedSamples { data: FrameBody },
    RawSamples(FrameBody),
}

impl FramePayload {
    /// Native engines producing typed buffers use this constructor.
    pub fn float32(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self::RawSamples(FrameBody {
            samples: SampleData::Float32(samples),
            sample_rate: Some(sample_rate),
            channels: Some(channels),
        })
    }

    /// Interpret an arbitrary JSON value as a payload. Never fails; an
    /// unrecognisable value becomes an empty body.
    pub fn from_json(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_else(|_| Self::RawSamples(FrameBody::default()))
    }

    pub fn into_body(self) -> FrameBody {
        match self {
            Self::WrappedSamples { data } => data,
            Self::RawSamples(body) => body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameBody {
    #[serde(default)]
    pub samples: SampleData,
    #[serde(default, deserialize_with = "lenient_count")]
    pub sample_rate: Option<u32>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub channels: Option<u16>,
}

/// Format fields never reject a body: anything other than a positive whole
/// number that fits the field reads as absent and takes the default later.
fn lenient_count<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(whole_number(&value).and_then(|n| T::try_from(n).ok()))
}

fn whole_number(value: &Value) -> Option<u64> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(n) = n.as_u64() {
        return Some(n).filter(|n| *n > 0);
    }
    let f = n.as_f64()?;
    (f.is_finite() && f >= 1.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then(|| f as u64)
}

/// Sample payload before coercion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SampleData {
    Float32(Vec<f32>),
    /// Anything that did not decode as a plain float array: array-like
    /// objects, mixed arrays, or junk.
    Json(Value),
}

impl Default for SampleData {
    fn default() -> Self {
        Self::Json(Value::Null)
    }
}

impl SampleData {
    /// Coerce into a canonical float sequence. Unusable input yields an empty vec.
    pub fn into_samples(self) -> Vec<f32> {
        match self {
            Self::Float32(samples) => samples,
            Self::Json(value) => coercion::coerce_samples(&value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrapped_payload_unwraps_data() {
        let payload = FramePayload::from_json(json!({
            "data": { "samples": [0.5, -0.5], "sampleRate": 44100, "channels": 1 }
        }));
        assert!(matches!(payload, FramePayload::WrappedSamples { .. }));

        let body = payload.into_body();
        assert_eq!(body.sample_rate, Some(44100));
        assert_eq!(body.channels, Some(1));
        assert_eq!(body.samples.into_samples(), vec![0.5, -0.5]);
    }

    #[test]
    fn raw_payload_without_format() {
        let body = FramePayload::from_json(json!({ "samples": [0.25] })).into_body();
        assert_eq!(body.sample_rate, None);
        assert_eq!(body.samples.into_samples(), vec![0.25]);
    }

    #[test]
    fn array_like_samples_are_coerced() {
        let body = FramePayload::from_json(json!({
            "samples": { "0": 0.1, "1": 0.2, "length": 2 }
        }))
        .into_body();
        let samples = body.samples.into_samples();
        assert_eq!(samples.len(), 2);
        assert!((samples[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn malformed_format_fields_keep_samples() {
        let body = FramePayload::from_json(json!({
            "data": { "samples": [0.1, 0.2, 0.3, 0.4], "sampleRate": 48000.0, "channels": 2 }
        }))
        .into_body();
        assert_eq!(body.sample_rate, Some(48000));
        assert_eq!(body.channels, Some(2));
        assert_eq!(body.samples.into_samples().len(), 4);

        let body = FramePayload::from_json(json!({ "samples": [0.1, 0.2], "channels": "2" })).into_body();
        assert_eq!(body.channels, None);
        assert_eq!(body.samples.into_samples(), vec![0.1, 0.2]);

        let body = FramePayload::from_json(json!({
            "samples": [0.5], "sampleRate": -1, "channels": 70000
        }))
        .into_body();
        assert_eq!(body.sample_rate, None);
        assert_eq!(body.channels, None);
        assert_eq!(body.samples.into_samples(), vec![0.5]);
    }

    #[test]
    fn junk_payload_becomes_empty() {
        let body = FramePayload::from_json(json!("garbage")).into_body();
        assert!(body.samples.into_samples().is_empty());

        let body = FramePayload::from_json(json!({ "samples": 12 })).into_body();
        assert!(body.samples.into_samples().is_empty());
    }
}
