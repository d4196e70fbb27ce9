//! Audio front end — capture → level metering → voice activity detection,
//! plus the recorder, WAV encoder and playback adapter.
//!
//! # Pipeline
//!
//! ```text
//! AudioInput ─▶ AudioChunk (mpsc) ─▶ resample ─┬─▶ RingBuffer (recorder)
//!                                              └─▶ LevelMeter ─▶ AudioFrame
//!                                                    ─▶ VoiceActivityDetector
//!                                                    ─▶ VadEvent (mpsc)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use voice_chat::audio::{new_recorder, start_listening, AudioInput};
//! use voice_chat::config::AppConfig;
//!
//! # async fn example(mic: &dyn AudioInput) {
//! let config = AppConfig::default();
//! let recorder = new_recorder(16_000, 30.0);
//! let mut session = start_listening(mic, &config.vad, &config.audio, Some(recorder)).unwrap();
//!
//! while let Some(event) = session.events.recv().await {
//!     println!("{event:?}");
//! }
//! # }
//! ```

pub mod buffer;
#[cfg(feature = "microphone")]
pub mod capture;
pub mod device;
pub mod level;
pub mod playback;
pub mod resample;
pub mod vad;
pub mod wav;

pub use buffer::{new_recorder, RingBuffer, SharedRecorder};
#[cfg(feature = "microphone")]
pub use capture::MicrophoneInput;
pub use device::{AudioChunk, AudioInput, AudioOutput, DeviceError, InputStream};
pub use level::{AudioFrame, LevelMeter};
pub use playback::CommandPlayer;
pub use resample::{resample, stereo_to_mono};
pub use vad::{start_listening, Band, ListenHandle, VadEvent, VadSession, VadState, VoiceActivityDetector};
pub use wav::{encode_pcm16, WAV_MIME};
