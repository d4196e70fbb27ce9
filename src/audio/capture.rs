//! Microphone capture via `cpal` (feature `microphone`).
//!
//! `cpal::Stream` is not `Send`, so [`MicrophoneInput`] builds and owns the
//! stream on a dedicated thread.  The [`InputStream`] it hands out carries a
//! guard for that thread: dropping the stream drops the guard, the thread
//! wakes up and the hardware stream is released.

use std::sync::mpsc as std_mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;

use super::device::{AudioChunk, AudioInput, DeviceError, InputStream};
use super::resample::stereo_to_mono;

impl From<cpal::BuildStreamError> for DeviceError {
    fn from(e: cpal::BuildStreamError) -> Self {
        match e {
            cpal::BuildStreamError::DeviceNotAvailable => DeviceError::NotFound(e.to_string()),
            cpal::BuildStreamError::StreamConfigNotSupported
            | cpal::BuildStreamError::InvalidArgument => DeviceError::Stream(e.to_string()),
            _ => DeviceError::Busy(e.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for DeviceError {
    fn from(e: cpal::PlayStreamError) -> Self {
        match e {
            cpal::PlayStreamError::DeviceNotAvailable => DeviceError::NotFound(e.to_string()),
            _ => DeviceError::Busy(e.to_string()),
        }
    }
}

impl From<cpal::DefaultStreamConfigError> for DeviceError {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        match e {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                DeviceError::NotFound(e.to_string())
            }
            _ => DeviceError::Stream(e.to_string()),
        }
    }
}

/// Dropping this wakes the capture thread, which then drops the stream.
struct CaptureGuard {
    _stop: std_mpsc::Sender<()>,
}

/// The system microphone, or a named input device.
pub struct MicrophoneInput {
    device_name: Option<String>,
}

impl MicrophoneInput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn find_device(&self) -> Result<cpal::Device, DeviceError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_input_device()
                .ok_or_else(|| DeviceError::NotFound("no default input device".into())),
            Some(wanted) => host
                .input_devices()
                .map_err(|e| DeviceError::Stream(e.to_string()))?
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false))
                .ok_or_else(|| DeviceError::NotFound(format!("input device `{wanted}`"))),
        }
    }
}

impl AudioInput for MicrophoneInput {
    fn open(&self) -> Result<InputStream, DeviceError> {
        let device = self.find_device()?;
        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        let (chunk_tx, chunk_rx) = mpsc::channel::<AudioChunk>(64);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), DeviceError>>();

        thread::Builder::new()
            .name("voice-chat-capture".into())
            .spawn(move || {
                let stream = device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let chunk = AudioChunk {
                            samples: stereo_to_mono(data, channels),
                            sample_rate,
                        };
                        // A full queue means the listener is behind; drop the chunk.
                        let _ = chunk_tx.try_send(chunk);
                    },
                    |err: cpal::StreamError| {
                        log::error!("capture: stream error: {err}");
                    },
                    None,
                );
                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Blocks until the guard is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("capture: stream released");
            })
            .map_err(|e| DeviceError::Stream(e.to_string()))?;

        ready_rx.recv().map_err(|_| DeviceError::Closed)??;
        log::info!("capture: microphone open ({sample_rate} Hz, {channels} ch)");

        Ok(InputStream::with_guard(
            chunk_rx,
            CaptureGuard { _stop: stop_tx },
        ))
    }
}
