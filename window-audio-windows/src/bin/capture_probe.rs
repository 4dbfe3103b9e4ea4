//! Diagnostic host for the capture pipeline.
//!
//! ```text
//! capture-probe                 list windows and audio sessions
//! capture-probe <target> [secs] stream <target> (handle, digits or name) and report stats
//! ```
//!
//! Logging follows `RUST_LOG`, e.g. `RUST_LOG=debug capture-probe 1234`.

#[cfg(target_os = "windows")]
fn main() {
    env_logger::init();

    if let Err(e) = probe::run(std::env::args().skip(1).collect()) {
        eprintln!("capture-probe: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(target_os = "windows"))]
fn main() {
    env_logger::init();
    eprintln!("capture-probe: the WASAPI capture engine is only available on Windows");
    std::process::exit(2);
}

#[cfg(target_os = "windows")]
mod probe {
    use std::thread;
    use std::time::{Duration, Instant};

    use window_audio_core::{CaptureConfiguration, CaptureError, NativeCaptureAdapter, SessionManager, WindowAudioStream};
    use window_audio_windows::WasapiEngine;

    const DEFAULT_SECONDS: u64 = 5;

    pub fn run(args: Vec<String>) -> Result<(), CaptureError> {
        let config = CaptureConfiguration::default();
        let adapter = NativeCaptureAdapter::load(WasapiEngine::new);
        let manager = SessionManager::new(adapter, config.clone())?;

        println!("Windows:");
        for window in manager.list_windows()? {
            println!("  {:>10}  {:<24} {}", window.id, window.executable_name, window.title);
        }
        println!("Audio sessions:");
        for session in manager.list_audio_sessions()? {
            println!(
                "  session {:>3}  pid {:>6}  {}  {}",
                session.session_id,
                session.process_id,
                if session.is_active { "active  " } else { "inactive" },
                session.executable_name.as_deref().unwrap_or("?")
            );
        }

        let Some(target) = args.first() else {
            return Ok(());
        };
        let seconds = args
            .get(1)
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SECONDS);

        let mut stream = WindowAudioStream::new(manager.clone());
        let reconstructor = stream.start(target.as_str())?;
        if let Some(outcome) = stream.outcome() {
            println!(
                "Streaming {} at {} Hz/{} ch (fallback: {})",
                target, outcome.sample_rate, outcome.channels, outcome.using_fallback
            );
        }

        // Stand-in for the audio graph: pull one block per block period.
        let format = reconstructor.format();
        let block_period = Duration::from_secs_f64(config.block_frames as f64 / format.sample_rate.max(1) as f64);
        let mut block = vec![0.0f32; config.block_frames * format.channels as usize];
        let deadline = Instant::now() + Duration::from_secs(seconds);
        let mut next_report = Instant::now() + Duration::from_secs(1);

        while Instant::now() < deadline && stream.is_capturing() {
            reconstructor.pull_interleaved(&mut block);
            if Instant::now() >= next_report {
                let stats = reconstructor.stats();
                println!(
                    "  accepted {:>6}  rendered {:>5}  underruns {:>5}  queued {:>7}",
                    stats.frames_accepted, stats.blocks_rendered, stats.underruns, stats.queue_depth
                );
                next_report += Duration::from_secs(1);
            }
            thread::sleep(block_period);
        }

        if let Some(info) = manager.session_info() {
            match serde_json::to_string_pretty(&info) {
                Ok(json) => println!("{}", json),
                Err(e) => log::warn!("Could not serialise session info: {}", e),
            }
        }
        stream.stop()
    }
}
