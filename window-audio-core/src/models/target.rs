use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// String targets that explicitly mean "no target".
const DISABLED_SENTINELS: [&str; 4] = ["none", "false", "off", "null"];

/// Caller-supplied capture target, before resolution.
///
/// Models the loosely typed identifier a caller hands across the process
/// boundary: a window handle, a numeric-looking string, an opaque name, or
/// something unusable.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTarget {
    /// No value was supplied at all.
    Missing,
    Null,
    Number(f64),
    BigInt(i128),
    Text(String),
    Bool(bool),
    /// Any other shape (arrays, objects). Holds a short description for errors.
    Other(String),
}

impl From<serde_json::Value> for RawTarget {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Self::BigInt(u as i128)
                } else if let Some(i) = n.as_i64() {
                    Self::BigInt(i as i128)
                } else {
                    Self::Number(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Self::Text(s),
            Value::Array(_) => Self::Other("array".into()),
            Value::Object(_) => Self::Other("object".into()),
        }
    }
}

impl From<f64> for RawTarget {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u64> for RawTarget {
    fn from(value: u64) -> Self {
        Self::BigInt(value as i128)
    }
}

impl From<i64> for RawTarget {
    fn from(value: i64) -> Self {
        Self::BigInt(value as i128)
    }
}

impl From<u32> for RawTarget {
    fn from(value: u32) -> Self {
        Self::BigInt(value as i128)
    }
}

impl From<i32> for RawTarget {
    fn from(value: i32) -> Self {
        Self::BigInt(value as i128)
    }
}

impl From<i128> for RawTarget {
    fn from(value: i128) -> Self {
        Self::BigInt(value)
    }
}

impl From<&str> for RawTarget {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawTarget {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<RawTarget>> From<Option<T>> for RawTarget {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Missing)
    }
}

/// Canonical target handed to the capture engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestTarget {
    /// Window handle (or other numeric identifier understood by the engine).
    Handle(u64),
    /// Opaque name, passed through verbatim.
    Name(String),
    /// A specific audio session, used when falling back from per-process loopback.
    #[serde(rename_all = "camelCase")]
    AudioSession { session_id: u32, process_id: u32 },
}

impl fmt::Display for RequestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handle(handle) => write!(f, "{}", handle),
            Self::Name(name) => f.write_str(name),
            Self::AudioSession {
                session_id,
                process_id,
            } => write!(f, "session {} (pid {})", session_id, process_id),
        }
    }
}

/// A resolved capture target plus the client id used to attribute frames.
///
/// `client_id` is derived deterministically from the request target and never
/// changes for the lifetime of the session, even when capture falls back to a
/// different audio session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureTarget {
    pub request_target: RequestTarget,
    pub client_id: String,
}

impl CaptureTarget {
    fn numeric(handle: u64) -> Self {
        Self {
            request_target: RequestTarget::Handle(handle),
            client_id: handle.to_string(),
        }
    }

    fn named(name: &str) -> Self {
        Self {
            request_target: RequestTarget::Name(name.to_string()),
            client_id: name.to_string(),
        }
    }
}

/// Normalize a caller-supplied identifier into a [`CaptureTarget`].
///
/// Total over its input domain: every input yields either a target or
/// [`CaptureError::InvalidTarget`].
pub fn resolve(raw: &RawTarget) -> Result<CaptureTarget, CaptureError> {
    match raw {
        RawTarget::Missing | RawTarget::Null => Err(invalid("target is missing")),
        RawTarget::Number(value) => resolve_number(*value),
        RawTarget::BigInt(value) => resolve_integer(*value),
        RawTarget::Text(text) => resolve_text(text),
        RawTarget::Bool(_) => Err(invalid("boolean is not a capture target")),
        RawTarget::Other(kind) => Err(invalid(&format!("unsupported target type: {}", kind))),
    }
}

fn resolve_number(value: f64) -> Result<CaptureTarget, CaptureError> {
    if !value.is_finite() {
        return Err(invalid("target number is not finite"));
    }
    let floored = value.floor();
    if floored <= 0.0 {
        return Err(invalid(&format!("target number must be positive, got {}", value)));
    }
    if floored >= u64::MAX as f64 {
        return Err(invalid("target number is out of range"));
    }
    Ok(CaptureTarget::numeric(floored as u64))
}

fn resolve_integer(value: i128) -> Result<CaptureTarget, CaptureError> {
    if value <= 0 {
        return Err(invalid(&format!("target number must be positive, got {}", value)));
    }
    let handle = u64::try_from(value).map_err(|_| invalid("target number is out of range"))?;
    Ok(CaptureTarget::numeric(handle))
}

fn resolve_text(text: &str) -> Result<CaptureTarget, CaptureError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(invalid("target string is empty"));
    }

    let lower = trimmed.to_ascii_lowercase();
    if DISABLED_SENTINELS.contains(&lower.as_str()) {
        return Err(invalid(&format!("'{}' disables capture", trimmed)));
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let handle: u64 = trimmed
            .parse()
            .map_err(|_| invalid("numeric target string is out of range"))?;
        return resolve_integer(handle as i128);
    }

    Ok(CaptureTarget::named(trimmed))
}

fn invalid(reason: &str) -> CaptureError {
    CaptureError::InvalidTarget(reason.to_string())
}
