//! Amplitude-based Voice Activity Detection.
//!
//! [`VoiceActivityDetector`] turns a stream of [`AudioFrame`] levels into
//! [`VadEvent::SpeechStarted`] / [`VadEvent::SpeechEnded`] pairs.
//!
//! ## Bands
//!
//! | Band       | Condition                       | Effect while speaking          |
//! |------------|---------------------------------|--------------------------------|
//! | Speech     | `level >= speech_threshold`     | clears the silence run         |
//! | Ambiguous  | between the two thresholds      | clears the silence run         |
//! | Silence    | `level <= silence_threshold`    | starts / extends the run       |
//!
//! A segment ends once a silence run has lasted `silence_duration`.  The
//! ambiguous band gives the detector hysteresis: a voice trailing off just
//! above the noise floor never chatters between states.
//!
//! ## Listening sessions
//!
//! [`start_listening`] opens an [`AudioInput`], meters it and runs the
//! detector on a tokio task.  Events arrive on the returned
//! [`VadSession::events`] channel; [`ListenHandle::stop`] (or dropping the
//! handle) tears the session down and releases the device.  Starting again
//! builds a fresh detector, so no timer survives a restart.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::buffer::SharedRecorder;
use super::device::{AudioInput, DeviceError};
use super::level::{AudioFrame, LevelMeter};
use super::resample::resample;
use crate::config::{AudioConfig, VadConfig};

// ---------------------------------------------------------------------------
// VadEvent / VadState
// ---------------------------------------------------------------------------

/// Speech boundary detected by the VAD.  `at` is the offset from the start
/// of the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    SpeechStarted { at: Duration },
    SpeechEnded { at: Duration },
}

impl VadEvent {
    pub fn at(&self) -> Duration {
        match self {
            VadEvent::SpeechStarted { at } | VadEvent::SpeechEnded { at } => *at,
        }
    }
}

/// Classification of a single level reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Speech,
    Ambiguous,
    Silence,
}

/// Current speech/silence classification.
///
/// `silence_since` is only ever `Some` while `speaking` is true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VadState {
    pub speaking: bool,
    pub silence_since: Option<Duration>,
}

// ---------------------------------------------------------------------------
// VoiceActivityDetector
// ---------------------------------------------------------------------------

/// Three-band threshold detector with a silence debounce.
///
/// ```rust
/// use std::time::Duration;
/// use voice_chat::audio::{AudioFrame, VadEvent, VoiceActivityDetector};
/// use voice_chat::config::VadConfig;
///
/// let mut vad = VoiceActivityDetector::new(&VadConfig::default());
/// let frame = |ms, level| AudioFrame { level, timestamp: Duration::from_millis(ms) };
///
/// assert!(matches!(vad.process(&frame(0, 0.5)), Some(VadEvent::SpeechStarted { .. })));
/// assert_eq!(vad.process(&frame(10, 0.0)), None);
/// assert!(matches!(vad.process(&frame(510, 0.0)), Some(VadEvent::SpeechEnded { .. })));
/// ```
pub struct VoiceActivityDetector {
    speech_threshold: f32,
    silence_threshold: f32,
    silence_duration: Duration,
    state: VadState,
}

impl VoiceActivityDetector {
    pub fn new(config: &VadConfig) -> Self {
        Self {
            speech_threshold: config.speech_threshold,
            silence_threshold: config.silence_threshold,
            silence_duration: Duration::from_millis(config.silence_duration_ms),
            state: VadState::default(),
        }
    }

    pub fn band(&self, level: f32) -> Band {
        if level >= self.speech_threshold {
            Band::Speech
        } else if level <= self.silence_threshold {
            Band::Silence
        } else {
            Band::Ambiguous
        }
    }

    /// Classify one frame and return the boundary it crosses, if any.
    pub fn process(&mut self, frame: &AudioFrame) -> Option<VadEvent> {
        match self.band(frame.level) {
            Band::Speech if !self.state.speaking => {
                self.state = VadState {
                    speaking: true,
                    silence_since: None,
                };
                log::debug!("vad: speech started at {:?}", frame.timestamp);
                Some(VadEvent::SpeechStarted {
                    at: frame.timestamp,
                })
            }
            Band::Speech | Band::Ambiguous => {
                self.state.silence_since = None;
                None
            }
            Band::Silence if !self.state.speaking => None,
            Band::Silence => {
                let since = *self.state.silence_since.get_or_insert(frame.timestamp);
                if frame.timestamp.saturating_sub(since) < self.silence_duration {
                    return None;
                }
                self.state = VadState::default();
                log::debug!("vad: speech ended at {:?}", frame.timestamp);
                Some(VadEvent::SpeechEnded {
                    at: frame.timestamp,
                })
            }
        }
    }

    pub fn state(&self) -> VadState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state.speaking
    }

    /// Clear the speaking flag and the silence timer.
    pub fn reset(&mut self) {
        self.state = VadState::default();
    }
}

// ---------------------------------------------------------------------------
// Listening session
// ---------------------------------------------------------------------------

/// Stops a listening session.  Dropping the handle stops it too.
pub struct ListenHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ListenHandle {
    /// Signal the listener to stop.  Returns immediately.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait until the device has been released.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("vad: listener task ended abnormally: {e}");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ListenHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A running listener: its event stream and the handle that stops it.
pub struct VadSession {
    pub events: mpsc::Receiver<VadEvent>,
    pub handle: ListenHandle,
}

/// Open `input` and run the detector over it on a background task.
///
/// Every captured sample is also appended to `recorder` when one is given, so
/// the caller can cut the utterance audio out once speech ends.
///
/// # Errors
///
/// Returns the device's [`DeviceError`] when the input cannot be opened.
/// Failures after a successful open end the session (the event channel
/// closes) without panicking.
pub fn start_listening(
    input: &dyn AudioInput,
    vad: &VadConfig,
    audio: &AudioConfig,
    recorder: Option<SharedRecorder>,
) -> Result<VadSession, DeviceError> {
    let mut stream = input.open()?;
    let (tx, rx) = mpsc::channel(32);
    let cancel = CancellationToken::new();

    let mut detector = VoiceActivityDetector::new(vad);
    let mut meter = LevelMeter::new(audio);
    let target_rate = audio.sample_rate;
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        log::info!("vad: listening");
        loop {
            let chunk = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                chunk = stream.recv() => match chunk {
                    Some(chunk) => chunk,
                    None => {
                        log::warn!("vad: input device closed");
                        break;
                    }
                },
            };

            let samples = if chunk.sample_rate == target_rate {
                chunk.samples
            } else {
                resample(&chunk.samples, chunk.sample_rate, target_rate)
            };

            if let Some(recorder) = &recorder {
                recorder
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push_slice(&samples);
            }

            for frame in meter.push(&samples) {
                if let Some(event) = detector.process(&frame) {
                    if tx.send(event).await.is_err() {
                        log::debug!("vad: event receiver dropped");
                        return;
                    }
                }
            }
        }
        log::info!("vad: stopped listening");
    });

    Ok(VadSession {
        events: rx,
        handle: ListenHandle {
            cancel,
            task: Some(task),
        },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::new_recorder;
    use crate::audio::device::{AudioChunk, InputStream};
    use std::sync::Mutex;

    fn frame(ms: u64, level: f32) -> AudioFrame {
        AudioFrame {
            level,
            timestamp: Duration::from_millis(ms),
        }
    }

    /// Run `(duration_ms, level)` segments through the detector at 1 ms steps.
    fn run_trace(vad: &mut VoiceActivityDetector, segments: &[(u64, f32)]) -> Vec<VadEvent> {
        let mut t = 0;
        let mut events = Vec::new();
        for &(len, level) in segments {
            for _ in 0..len {
                events.extend(vad.process(&frame(t, level)));
                t += 1;
            }
        }
        events
    }

    fn count(events: &[VadEvent]) -> (usize, usize) {
        let started = events
            .iter()
            .filter(|e| matches!(e, VadEvent::SpeechStarted { .. }))
            .count();
        (started, events.len() - started)
    }

    #[test]
    fn bands_follow_thresholds() {
        let vad = VoiceActivityDetector::new(&VadConfig::default());
        assert_eq!(vad.band(0.02), Band::Speech);
        assert_eq!(vad.band(0.5), Band::Speech);
        assert_eq!(vad.band(0.015), Band::Ambiguous);
        assert_eq!(vad.band(0.01), Band::Silence);
        assert_eq!(vad.band(0.0), Band::Silence);
    }

    #[test]
    fn ambiguous_dip_does_not_end_speech() {
        let mut vad = VoiceActivityDetector::new(&VadConfig::default());
        let events = run_trace(&mut vad, &[(200, 0.05), (450, 0.015), (200, 0.05)]);
        assert_eq!(count(&events), (1, 0));
        assert!(vad.is_speaking());
    }

    #[test]
    fn silence_for_duration_plus_one_ms_ends_once() {
        let mut vad = VoiceActivityDetector::new(&VadConfig::default());
        let events = run_trace(&mut vad, &[(300, 0.05), (501, 0.0)]);
        assert_eq!(count(&events), (1, 1));
        assert_eq!(events[1], VadEvent::SpeechEnded { at: Duration::from_millis(800) });
        assert!(!vad.is_speaking());
        assert_eq!(vad.state().silence_since, None);
    }

    #[test]
    fn long_silence_fires_end_only_once() {
        let mut vad = VoiceActivityDetector::new(&VadConfig::default());
        let events = run_trace(&mut vad, &[(100, 0.05), (3_000, 0.0)]);
        assert_eq!(count(&events), (1, 1));
    }

    #[test]
    fn ambiguous_sample_restarts_silence_run() {
        let mut vad = VoiceActivityDetector::new(&VadConfig::default());
        let events = run_trace(
            &mut vad,
            &[(100, 0.05), (400, 0.0), (1, 0.015), (400, 0.0)],
        );
        assert_eq!(count(&events), (1, 0));
    }

    #[test]
    fn silence_before_speech_sets_no_timer() {
        let mut vad = VoiceActivityDetector::new(&VadConfig::default());
        let events = run_trace(&mut vad, &[(1_000, 0.0)]);
        assert!(events.is_empty());
        assert_eq!(vad.state(), VadState::default());
    }

    #[test]
    fn two_segments_emit_two_pairs() {
        let mut vad = VoiceActivityDetector::new(&VadConfig::default());
        let events = run_trace(
            &mut vad,
            &[(200, 0.05), (600, 0.0), (200, 0.05), (600, 0.0)],
        );
        assert_eq!(count(&events), (2, 2));
    }

    #[test]
    fn speech_then_silence_end_to_end_timing() {
        // 1.2 s of speech followed by 0.6 s of silence, sampled every 10 ms.
        let mut vad = VoiceActivityDetector::new(&VadConfig::default());
        let mut events = Vec::new();
        for i in 0..180u64 {
            let level = if i < 120 { 0.3 } else { 0.0 };
            events.extend(vad.process(&frame(i * 10, level)));
        }
        assert_eq!(events[0], VadEvent::SpeechStarted { at: Duration::ZERO });
        assert_eq!(events[1], VadEvent::SpeechEnded { at: Duration::from_millis(1_700) });
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn reset_clears_speaking_state() {
        let mut vad = VoiceActivityDetector::new(&VadConfig::default());
        run_trace(&mut vad, &[(10, 0.05), (10, 0.0)]);
        assert!(vad.is_speaking());
        vad.reset();
        assert_eq!(vad.state(), VadState::default());
    }

    // ---- start_listening --------------------------------------------------

    /// Replays scripted chunks, then keeps the channel open until dropped.
    struct ScriptedInput {
        chunks: Mutex<Vec<AudioChunk>>,
    }

    impl AudioInput for ScriptedInput {
        fn open(&self) -> Result<InputStream, DeviceError> {
            let chunks = std::mem::take(&mut *self.chunks.lock().unwrap());
            let (tx, rx) = mpsc::channel(chunks.len().max(1));
            for chunk in chunks {
                tx.try_send(chunk).unwrap();
            }
            Ok(InputStream::with_guard(rx, tx))
        }
    }

    struct DeniedInput;

    impl AudioInput for DeniedInput {
        fn open(&self) -> Result<InputStream, DeviceError> {
            Err(DeviceError::PermissionDenied("microphone".into()))
        }
    }

    fn noise(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| if (i * 7919) % 13 < 6 { 0.4 } else { -0.4 })
            .collect()
    }

    #[tokio::test]
    async fn session_emits_started_then_ended() {
        let chunk = |samples| AudioChunk {
            samples,
            sample_rate: 16_000,
        };
        let input = ScriptedInput {
            chunks: Mutex::new(vec![chunk(noise(16_000)), chunk(vec![0.0; 48_000])]),
        };
        let recorder = new_recorder(16_000, 10.0);

        let mut session = start_listening(
            &input,
            &VadConfig::default(),
            &AudioConfig::default(),
            Some(recorder.clone()),
        )
        .expect("open");

        let first = session.events.recv().await.expect("start");
        let second = session.events.recv().await.expect("end");
        assert!(matches!(first, VadEvent::SpeechStarted { .. }));
        assert!(matches!(second, VadEvent::SpeechEnded { .. }));
        assert!(second.at() > first.at());

        session.handle.shutdown().await;
        assert_eq!(recorder.lock().unwrap().len(), 64_000);
    }

    #[tokio::test]
    async fn resamples_foreign_rate_into_recorder() {
        let input = ScriptedInput {
            chunks: Mutex::new(vec![AudioChunk {
                samples: vec![0.0; 48_000],
                sample_rate: 48_000,
            }]),
        };
        let recorder = new_recorder(16_000, 10.0);
        let session = start_listening(
            &input,
            &VadConfig::default(),
            &AudioConfig::default(),
            Some(recorder.clone()),
        )
        .expect("open");

        tokio::time::sleep(Duration::from_millis(50)).await;
        session.handle.shutdown().await;
        assert_eq!(recorder.lock().unwrap().len(), 16_000);
    }

    #[tokio::test]
    async fn device_error_is_surfaced() {
        let result = start_listening(
            &DeniedInput,
            &VadConfig::default(),
            &AudioConfig::default(),
            None,
        );
        assert!(matches!(result, Err(DeviceError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn stop_closes_event_stream() {
        let input = ScriptedInput {
            chunks: Mutex::new(Vec::new()),
        };
        let mut session =
            start_listening(&input, &VadConfig::default(), &AudioConfig::default(), None)
                .expect("open");
        session.handle.stop();
        assert!(session.handle.is_stopped());
        assert!(session.events.recv().await.is_none());
    }
}
