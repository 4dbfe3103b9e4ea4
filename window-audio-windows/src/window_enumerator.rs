//! Top-level window enumeration.
//!
//! Lists visible, titled top-level windows with their owning process. Shell
//! and system windows are left in; the core adapter filters them.

use std::ffi::c_void;

use windows::core::BOOL;
use windows::Win32::Foundation::{HWND, LPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible,
};

use window_audio_core::models::audio_models::WindowInfo;
use window_audio_core::models::error::EngineError;

use crate::process::executable_name;

pub fn top_level_windows() -> Result<Vec<WindowInfo>, EngineError> {
    let mut handles: Vec<HWND> = Vec::new();
    unsafe {
        EnumWindows(Some(collect_window), LPARAM(&mut handles as *mut Vec<HWND> as isize))
            .map_err(|e| EngineError::new(format!("EnumWindows failed: {}", e)))?;
    }

    Ok(handles.into_iter().filter_map(describe).collect())
}

/// Owning process of the window whose handle is `id`, if it still exists.
pub fn window_process_id(id: u64) -> Option<u32> {
    let hwnd = HWND(id as usize as *mut c_void);
    let mut process_id = 0u32;
    unsafe {
        GetWindowThreadProcessId(hwnd, Some(&mut process_id));
    }
    (process_id != 0).then_some(process_id)
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = &mut *(lparam.0 as *mut Vec<HWND>);
    if IsWindowVisible(hwnd).as_bool() {
        handles.push(hwnd);
    }
    BOOL(1)
}

fn describe(hwnd: HWND) -> Option<WindowInfo> {
    unsafe {
        let length = GetWindowTextLengthW(hwnd);
        if length <= 0 {
            return None;
        }
        let mut buffer = vec![0u16; length as usize + 1];
        let copied = GetWindowTextW(hwnd, &mut buffer);
        let title = String::from_utf16_lossy(&buffer[..copied.max(0) as usize]);

        let mut process_id = 0u32;
        GetWindowThreadProcessId(hwnd, Some(&mut process_id));

        Some(WindowInfo {
            id: hwnd.0 as usize as u64,
            title,
            executable_name: executable_name(process_id).unwrap_or_default(),
            process_id,
        })
    }
}
