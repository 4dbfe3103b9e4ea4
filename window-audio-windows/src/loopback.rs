//! WASAPI loopback capture.
//!
//! Two sources share one capture thread:
//! - [`LoopbackSource::Process`]: the virtual process-loopback device, activated
//!   through `ActivateAudioInterfaceAsync` for one process tree (Windows 10 2004+)
//! - [`LoopbackSource::Endpoint`]: the whole mix of the default render endpoint
//!
//! Every packet reaches the engine's frame callback as interleaved `f32`.
//!
//! ## Notes
//! - Shared mode only. Endpoint loopback uses the mix format; process loopback
//!   has no mix format and asks for 48 kHz stereo float, converted by the engine
//! - DRM-protected audio is silenced in loopback
//! - The callback keeps firing until the capture thread observes `stop`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use windows::core::{implement, IUnknown, Interface, Ref, HRESULT, PCWSTR, PROPVARIANT};
use windows::Win32::Media::Audio::*;
use windows::Win32::Media::Multimedia::WAVE_FORMAT_IEEE_FLOAT;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;
use windows::Win32::System::Variant::VT_BLOB;

use window_audio_core::models::audio_models::AudioFormat;
use window_audio_core::models::error::EngineError;
use window_audio_core::models::frame_payload::FramePayload;
use window_audio_core::traits::capture_engine::FrameCallback;

use crate::com::ComScope;
use crate::targeting::LoopbackSource;

/// How long `start` waits for the capture thread to open its client.
/// Outlasts [`ACTIVATION_TIMEOUT`] so activation failures surface as such.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(8);

/// How long process-loopback activation may take before it is abandoned.
const ACTIVATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Format requested from the process-loopback device.
const PROCESS_FORMAT: AudioFormat = AudioFormat {
    sample_rate: 48000,
    channels: 2,
};

type Ready = Result<AudioFormat, EngineError>;

/// A running loopback capture on its own thread.
pub struct LoopbackCapture {
    source: LoopbackSource,
    format: AudioFormat,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl LoopbackCapture {
    /// Open `source` in loopback mode and start streaming.
    ///
    /// Returns once the stream is running, with its negotiated format. A
    /// process source that cannot be activated fails with a message naming
    /// process-specific loopback.
    pub fn start(source: LoopbackSource, on_frame: FrameCallback) -> Result<Self, EngineError> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Ready>(1);

        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("wasapi-loopback-capture".into())
            .spawn(move || {
                if let Err(e) = loopback_capture_loop(source, &thread_running, &on_frame, &ready_tx) {
                    log::error!("Loopback capture error: {}", e);
                    let _ = ready_tx.try_send(Err(e));
                }
                thread_running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| EngineError::new(format!("failed to spawn loopback thread: {}", e)))?;

        let mut capture = Self {
            source,
            format: AudioFormat::default(),
            running,
            handle: Some(handle),
        };

        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(format)) => {
                capture.format = format;
                Ok(capture)
            }
            Ok(Err(e)) => {
                capture.stop();
                Err(e)
            }
            Err(_) => {
                capture.stop();
                Err(EngineError::new("loopback capture did not start in time"))
            }
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn source(&self) -> LoopbackSource {
        self.source
    }

    /// Signal the capture thread and wait for it to release the endpoint.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Loopback capture thread panicked");
            }
        }
    }
}

impl Drop for LoopbackCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Loopback capture loop running on the dedicated thread.
///
/// Sequence:
/// 1. CoInitializeEx (MTA)
/// 2. Open and initialise an IAudioClient for `source`
/// 3. Get IAudioCaptureClient, register with MMCSS
/// 4. Start, report the format, poll for packets until `running` clears
fn loopback_capture_loop(
    source: LoopbackSource,
    running: &AtomicBool,
    on_frame: &FrameCallback,
    ready: &Sender<Ready>,
) -> Result<(), EngineError> {
    let _com = ComScope::enter()?;

    unsafe {
        let (audio_client, format) = match source {
            LoopbackSource::Endpoint => endpoint_client()?,
            LoopbackSource::Process(pid) => process_client(pid).map_err(|e| process_loopback_failure(pid, e))?,
        };

        let capture_client: IAudioCaptureClient = audio_client
            .GetService()
            .map_err(|e| EngineError::new(format!("GetService failed: {}", e)))?;

        let mut task_index: u32 = 0;
        let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
        let _mmcss_handle = AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index);

        audio_client
            .Start()
            .map_err(|e| EngineError::new(format!("IAudioClient::Start failed: {}", e)))?;

        let _ = ready.try_send(Ok(format));
        log::info!(
            "Loopback capture ({:?}) running at {} Hz/{} ch",
            source,
            format.sample_rate,
            format.channels
        );

        let streamed = drain_packets(running, &capture_client, format, on_frame);
        let _ = audio_client.Stop();
        streamed
    }
}

fn process_loopback_failure(pid: u32, cause: EngineError) -> EngineError {
    EngineError::new(format!(
        "Failed to create process-specific loopback capture for pid {}: {}",
        pid, cause
    ))
}

/// Default render endpoint, initialised for loopback in its mix format.
unsafe fn endpoint_client() -> Result<(IAudioClient, AudioFormat), EngineError> {
    let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
        .map_err(|e| EngineError::new(format!("failed to create device enumerator: {}", e)))?;

    // Loopback reads from the RENDER endpoint.
    let device = enumerator
        .GetDefaultAudioEndpoint(eRender, eConsole)
        .map_err(|e| EngineError::new(format!("no default render endpoint: {}", e)))?;

    let audio_client: IAudioClient = device
        .Activate(CLSCTX_ALL, None)
        .map_err(|e| EngineError::new(format!("Activate failed: {}", e)))?;

    let mix_format_ptr = audio_client
        .GetMixFormat()
        .map_err(|e| EngineError::new(format!("GetMixFormat failed: {}", e)))?;
    let mix_format = &*mix_format_ptr;
    let format = AudioFormat::new(mix_format.nSamplesPerSec, mix_format.nChannels);
    let bits = mix_format.wBitsPerSample;

    let initialized = if bits != 32 {
        Err(EngineError::new(format!("unsupported mix format: {} bits per sample", bits)))
    } else {
        let buffer_duration = 1_000_000; // 100ms in 100ns units
        audio_client
            .Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
                buffer_duration,
                0,
                mix_format,
                None,
            )
            .map_err(|e| EngineError::new(format!("IAudioClient::Initialize (loopback) failed: {}", e)))
    };

    CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));
    initialized.map(|()| (audio_client, format))
}

/// `PROPVARIANT` carrying a `VT_BLOB`, laid out like the real union.
#[repr(C)]
struct BlobVariant {
    vt: u16,
    reserved: [u16; 3],
    blob: BLOB,
}

#[implement(IActivateAudioInterfaceCompletionHandler)]
struct ActivationHandler {
    done: Sender<()>,
}

impl IActivateAudioInterfaceCompletionHandler_Impl for ActivationHandler_Impl {
    fn ActivateCompleted(&self, _operation: Ref<'_, IActivateAudioInterfaceAsyncOperation>) -> windows::core::Result<()> {
        let _ = self.done.try_send(());
        Ok(())
    }
}

/// Process-loopback client for `pid` and its child processes.
unsafe fn process_client(pid: u32) -> Result<(IAudioClient, AudioFormat), EngineError> {
    let mut params = AUDIOCLIENT_ACTIVATION_PARAMS {
        ActivationType: AUDIOCLIENT_ACTIVATION_TYPE_PROCESS_LOOPBACK,
        Anonymous: AUDIOCLIENT_ACTIVATION_PARAMS_0 {
            ProcessLoopbackParams: AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS {
                TargetProcessId: pid,
                ProcessLoopbackMode: PROCESS_LOOPBACK_MODE_INCLUDE_TARGET_PROCESS_TREE,
            },
        },
    };
    let variant = BlobVariant {
        vt: VT_BLOB.0,
        reserved: [0; 3],
        blob: BLOB {
            cbSize: std::mem::size_of::<AUDIOCLIENT_ACTIVATION_PARAMS>() as u32,
            pBlobData: &mut params as *mut AUDIOCLIENT_ACTIVATION_PARAMS as *mut u8,
        },
    };

    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
    let handler: IActivateAudioInterfaceCompletionHandler = ActivationHandler { done: done_tx }.into();

    let operation = ActivateAudioInterfaceAsync(
        VIRTUAL_AUDIO_DEVICE_PROCESS_LOOPBACK,
        &IAudioClient::IID,
        Some(&variant as *const BlobVariant as *const PROPVARIANT),
        &handler,
    )
    .map_err(|e| EngineError::new(format!("ActivateAudioInterfaceAsync failed: {}", e)))?;

    done_rx
        .recv_timeout(ACTIVATION_TIMEOUT)
        .map_err(|_| EngineError::new("activation did not complete in time"))?;

    let mut activate_result = HRESULT(0);
    let mut activated: Option<IUnknown> = None;
    operation
        .GetActivateResult(&mut activate_result, &mut activated)
        .map_err(|e| EngineError::new(format!("GetActivateResult failed: {}", e)))?;
    activate_result
        .ok()
        .map_err(|e| EngineError::new(format!("activation failed: {}", e)))?;

    let audio_client: IAudioClient = activated
        .ok_or_else(|| EngineError::new("activation returned no audio client"))?
        .cast()
        .map_err(|e| EngineError::new(format!("activated interface is not an IAudioClient: {}", e)))?;

    let format = PROCESS_FORMAT;
    let block_align = format.channels * 4;
    let wave_format = WAVEFORMATEX {
        wFormatTag: WAVE_FORMAT_IEEE_FLOAT as u16,
        nChannels: format.channels,
        nSamplesPerSec: format.sample_rate,
        nAvgBytesPerSec: format.sample_rate * block_align as u32,
        nBlockAlign: block_align,
        wBitsPerSample: 32,
        cbSize: 0,
    };

    let buffer_duration = 2_000_000; // 200ms in 100ns units
    audio_client
        .Initialize(
            AUDCLNT_SHAREMODE_SHARED,
            AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
            buffer_duration,
            0,
            &wave_format,
            None,
        )
        .map_err(|e| EngineError::new(format!("IAudioClient::Initialize (process loopback) failed: {}", e)))?;

    Ok((audio_client, format))
}

/// Poll the capture client every 10ms and forward each packet.
unsafe fn drain_packets(
    running: &AtomicBool,
    capture_client: &IAudioCaptureClient,
    format: AudioFormat,
    on_frame: &FrameCallback,
) -> Result<(), EngineError> {
    let channels = format.channels as usize;

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(10));

        let mut packet_length = capture_client
            .GetNextPacketSize()
            .map_err(|e| EngineError::new(format!("GetNextPacketSize failed: {}", e)))?;

        while packet_length > 0 {
            let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
            let mut num_frames: u32 = 0;
            let mut flags: u32 = 0;

            capture_client
                .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                .map_err(|e| EngineError::new(format!("GetBuffer failed: {}", e)))?;

            if num_frames > 0 && !buffer_ptr.is_null() {
                let total_samples = num_frames as usize * channels;
                let samples = if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                    vec![0.0f32; total_samples]
                } else {
                    std::slice::from_raw_parts(buffer_ptr as *const f32, total_samples).to_vec()
                };
                on_frame(FramePayload::float32(samples, format.sample_rate, format.channels));
            }

            capture_client
                .ReleaseBuffer(num_frames)
                .map_err(|e| EngineError::new(format!("ReleaseBuffer failed: {}", e)))?;

            packet_length = capture_client
                .GetNextPacketSize()
                .map_err(|e| EngineError::new(format!("GetNextPacketSize failed: {}", e)))?;
        }
    }

    Ok(())
}
