use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

use window_audio_core::models::error::EngineError;

/// COM initialisation for the current thread, undone on drop.
///
/// A thread already initialised in another apartment is used as is and left
/// initialised.
pub(crate) struct ComScope {
    owned: bool,
}

impl ComScope {
    pub(crate) fn enter() -> Result<Self, EngineError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            return Ok(Self { owned: false });
        }
        hr.ok()
            .map_err(|e| EngineError::new(format!("CoInitializeEx failed: {}", e)))?;
        Ok(Self { owned: true })
    }
}

impl Drop for ComScope {
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                CoUninitialize();
            }
        }
    }
}
