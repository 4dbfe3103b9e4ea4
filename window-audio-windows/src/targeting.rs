//! Mapping request targets onto a loopback source.
//!
//! Kept free of Win32 calls so the selection rules are testable anywhere; the
//! engine feeds it the live window and session lists.

use window_audio_core::models::audio_models::{AudioSessionInfo, WindowInfo};

/// What a loopback capture listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopbackSource {
    /// The whole mix of the default render endpoint.
    Endpoint,
    /// One process and its child process tree.
    Process(u32),
}

impl LoopbackSource {
    pub fn is_process_specific(&self) -> bool {
        matches!(self, Self::Process(_))
    }
}

/// Owning process for an executable name such as `spotify` or `Spotify.exe`.
///
/// Processes with an active audio session win over other sessions, which win
/// over processes known only from a window.
pub fn process_for_name(name: &str, windows: &[WindowInfo], sessions: &[AudioSessionInfo]) -> Option<u32> {
    let session_match = |active: bool| {
        sessions
            .iter()
            .filter(|s| s.is_active == active && s.process_id != 0)
            .find(|s| s.executable_name.as_deref().is_some_and(|exe| names_match(exe, name)))
            .map(|s| s.process_id)
    };

    session_match(true).or_else(|| session_match(false)).or_else(|| {
        windows
            .iter()
            .filter(|w| w.process_id != 0)
            .find(|w| names_match(&w.executable_name, name))
            .map(|w| w.process_id)
    })
}

fn names_match(executable: &str, wanted: &str) -> bool {
    let stem = |s: &str| {
        let s = s.trim();
        let s = s.rsplit(['\\', '/']).next().unwrap_or(s);
        match s.len().checked_sub(4) {
            Some(cut) if s.is_char_boundary(cut) && s[cut..].eq_ignore_ascii_case(".exe") => s[..cut].to_string(),
            _ => s.to_string(),
        }
    };
    let wanted = stem(wanted);
    !wanted.is_empty() && stem(executable).eq_ignore_ascii_case(&wanted)
}
