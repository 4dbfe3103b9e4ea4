//! # window-audio-windows
//!
//! Windows WASAPI backend for window-audio-core.
//!
//! Provides:
//! - `WasapiEngine`: `CaptureEngine` over WASAPI
//! - `window_enumerator`: visible top-level windows with owning process
//! - `session_enumerator`: audio sessions on the default render endpoint
//! - `LoopbackCapture`: process or render endpoint loopback on a dedicated thread
//! - `targeting`: which process a window, name or session target listens to
//!
//! ## Platform Requirements
//! - Windows 10 2004+ (build 19041) for per-process loopback; older builds fall back to session capture
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use window_audio_core::{CaptureConfiguration, NativeCaptureAdapter, SessionManager, WindowAudioStream};
//! use window_audio_windows::WasapiEngine;
//!
//! let adapter = NativeCaptureAdapter::load(WasapiEngine::new);
//! let manager = SessionManager::new(adapter, CaptureConfiguration::default())?;
//! let mut stream = WindowAudioStream::new(manager);
//! let reconstructor = stream.start(hwnd)?;
//! ```

#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod engine;
#[cfg(target_os = "windows")]
pub mod loopback;
#[cfg(target_os = "windows")]
mod process;
#[cfg(target_os = "windows")]
pub mod session_enumerator;
pub mod targeting;
#[cfg(target_os = "windows")]
pub mod window_enumerator;

#[cfg(target_os = "windows")]
pub use engine::WasapiEngine;
#[cfg(target_os = "windows")]
pub use loopback::LoopbackCapture;
pub use targeting::LoopbackSource;
