//! Audio session enumeration on the default render endpoint.
//!
//! Wraps `IAudioSessionManager2` to list the sessions currently registered
//! with the audio engine, with owning process, activity and display name.

use windows::core::Interface;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use window_audio_core::models::audio_models::AudioSessionInfo;
use window_audio_core::models::error::EngineError;

use crate::com::ComScope;
use crate::process::executable_name;

/// Audio sessions on the default render endpoint, skipping the system
/// sounds session (PID 0). `session_id` is the enumeration index.
pub fn render_sessions() -> Result<Vec<AudioSessionInfo>, EngineError> {
    let _com = ComScope::enter()?;

    unsafe {
        let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
            .map_err(|e| EngineError::new(format!("failed to create device enumerator: {}", e)))?;

        let device = enumerator
            .GetDefaultAudioEndpoint(eRender, eConsole)
            .map_err(|e| EngineError::new(format!("no default render endpoint: {}", e)))?;

        let manager: IAudioSessionManager2 = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| EngineError::new(format!("IAudioSessionManager2 activation failed: {}", e)))?;

        let sessions = manager
            .GetSessionEnumerator()
            .map_err(|e| EngineError::new(format!("GetSessionEnumerator failed: {}", e)))?;

        let count = sessions
            .GetCount()
            .map_err(|e| EngineError::new(format!("GetCount failed: {}", e)))?;

        let mut result = Vec::new();
        for i in 0..count {
            let control = match sessions.GetSession(i) {
                Ok(c) => c,
                Err(_) => continue,
            };
            let control2: IAudioSessionControl2 = match control.cast() {
                Ok(c) => c,
                Err(_) => continue,
            };

            let process_id = match control2.GetProcessId() {
                Ok(pid) if pid != 0 => pid,
                _ => continue,
            };

            let is_active = control
                .GetState()
                .map(|state| state == AudioSessionStateActive)
                .unwrap_or(false);

            result.push(AudioSessionInfo {
                process_id,
                session_id: i as u32,
                is_active,
                session_name: display_name(&control),
                executable_name: executable_name(process_id),
            });
        }

        Ok(result)
    }
}

fn display_name(control: &IAudioSessionControl) -> Option<String> {
    unsafe {
        let pwsz = control.GetDisplayName().ok()?;
        if pwsz.is_null() {
            return None;
        }
        let name = pwsz.to_string().ok();
        CoTaskMemFree(Some(pwsz.0 as *const _));
        name.filter(|n| !n.is_empty())
    }
}
