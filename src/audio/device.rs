//! Audio device boundary: the microphone and speaker contracts the core
//! consumes, plus the error type shared by every device adapter.
//!
//! | Trait          | Adapter                                   |
//! |----------------|-------------------------------------------|
//! | [`AudioInput`] | `MicrophoneInput` (cpal, feature `microphone`) |
//! | [`AudioOutput`]| [`CommandPlayer`](super::CommandPlayer)    |

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Microphone or speaker access failure.
///
/// Device errors are surfaced to the caller immediately and never retried:
/// they usually need the user to grant access or plug something in.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("permission to use the audio device was denied: {0}")]
    PermissionDenied(String),

    #[error("audio device not found: {0}")]
    NotFound(String),

    #[error("audio device is busy: {0}")]
    Busy(String),

    #[error("audio stream failed: {0}")]
    Stream(String),

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("audio device closed")]
    Closed,
}

impl From<std::io::Error> for DeviceError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => DeviceError::NotFound(e.to_string()),
            std::io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied(e.to_string()),
            std::io::ErrorKind::BrokenPipe => DeviceError::Closed,
            _ => DeviceError::Playback(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioChunk / InputStream
// ---------------------------------------------------------------------------

/// A buffer of mono PCM samples in `[-1.0, 1.0]` as delivered by an input
/// device.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz.
    pub sample_rate: u32,
}

/// A running capture: the chunk receiver plus whatever keeps the device
/// alive.  Dropping the stream stops the device.
pub struct InputStream {
    chunks: mpsc::Receiver<AudioChunk>,
    _guard: Option<Box<dyn Send>>,
}

impl InputStream {
    pub fn new(chunks: mpsc::Receiver<AudioChunk>) -> Self {
        Self {
            chunks,
            _guard: None,
        }
    }

    /// Attach a guard that is dropped together with the stream.
    pub fn with_guard(chunks: mpsc::Receiver<AudioChunk>, guard: impl Send + 'static) -> Self {
        Self {
            chunks,
            _guard: Some(Box::new(guard)),
        }
    }

    /// Next captured chunk, or `None` once the device has stopped.
    pub async fn recv(&mut self) -> Option<AudioChunk> {
        self.chunks.recv().await
    }
}

// ---------------------------------------------------------------------------
// AudioInput / AudioOutput
// ---------------------------------------------------------------------------

/// A source of continuous audio.
///
/// Each [`open`](Self::open) starts a fresh capture; closing is dropping the
/// returned [`InputStream`].
pub trait AudioInput: Send + Sync {
    fn open(&self) -> Result<InputStream, DeviceError>;
}

/// An exclusive speaker.
///
/// `play` resolves when the audio has finished *or* when [`stop`](Self::stop)
/// cut it short; an interrupted playback is not an error.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn play(&self, audio: &[u8]) -> Result<(), DeviceError>;

    /// Stop whatever is playing right now.  A no-op when idle.
    fn stop(&self);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
