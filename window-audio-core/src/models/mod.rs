pub mod audio_models;
pub mod config;
pub mod error;
pub mod frame_payload;
pub mod state;
pub mod target;
