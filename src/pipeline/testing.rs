//! Test doubles for the pipeline collaborators, shared by the orchestrator
//! and controller tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioChunk, AudioInput, AudioOutput, DeviceError, InputStream};
use crate::config::AppConfig;
use crate::llm::{
    ChatMessage, CompletionParams, CompletionService, CompletionStream, ConversationHistory,
    StreamError, StreamEvent,
};
use crate::provider::{ProviderError, ProviderErrorKind};
use crate::stt::{AudioClip, TranscribeOptions, Transcriber};
use crate::tts::{Synthesizer, VoiceParams};

use super::retry::RetryPolicy;
use super::runner::PipelineOrchestrator;

pub const FAKE_AUDIO: &[u8] = b"ID3fake-mp3";

/// One second of a quiet tone at 16 kHz.
pub fn speech_clip() -> AudioClip {
    let samples: Vec<f32> = (0..16_000).map(|i| ((i as f32) * 0.05).sin() * 0.2).collect();
    AudioClip::from_pcm(&samples, 16_000)
}

// ---------------------------------------------------------------------------
// Transcriber
// ---------------------------------------------------------------------------

pub struct FakeTranscriber {
    result: Result<String, ProviderError>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTranscriber {
    pub fn ok(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing(kind: ProviderErrorKind) -> Self {
        Self {
            result: Err(ProviderError::new(kind, "transcription down")),
            ..Self::ok("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `transcribe` calls seen.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight count even when the call is dropped mid-way.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(
        &self,
        _clip: &AudioClip,
        _options: &TranscribeOptions,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

pub struct ScriptedCompletion {
    items: Vec<Result<StreamEvent, StreamError>>,
    delay: Duration,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl ScriptedCompletion {
    pub fn new(items: Vec<Result<StreamEvent, StreamError>>) -> Self {
        Self {
            items,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    /// Streams each fragment, then the end marker.
    pub fn reply(fragments: &[&str]) -> Self {
        let mut items: Vec<_> = fragments
            .iter()
            .map(|f| Ok(StreamEvent::Delta(f.to_string())))
            .collect();
        items.push(Ok(StreamEvent::Done));
        Self::new(items)
    }

    /// Wait `delay` before each item.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn stream(
        &self,
        messages: &[ChatMessage],
        _params: &CompletionParams,
    ) -> Result<CompletionStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();

        let delay = self.delay;
        Ok(futures::stream::iter(self.items.clone())
            .then(move |item| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .boxed())
    }
}

// ---------------------------------------------------------------------------
// Synthesizer
// ---------------------------------------------------------------------------

pub struct FakeSynthesizer {
    fail: bool,
    calls: AtomicUsize,
    last_params: Mutex<Option<VoiceParams>>,
}

impl FakeSynthesizer {
    pub fn ok() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
            last_params: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::ok()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_params(&self) -> Option<VoiceParams> {
        self.last_params.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, _text: &str, params: &VoiceParams) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(params.clone());
        if self.fail {
            Err(ProviderError::new(ProviderErrorKind::Auth, "bad key"))
        } else {
            Ok(FAKE_AUDIO.to_vec())
        }
    }
}

// ---------------------------------------------------------------------------
// Output device
// ---------------------------------------------------------------------------

/// Plays for a fixed duration unless stopped, like a real player process.
pub struct FakeOutput {
    duration: Duration,
    stop_delay: Duration,
    fail: bool,
    plays: AtomicUsize,
    stops: AtomicUsize,
    last_audio: Mutex<Option<Vec<u8>>>,
    current: Mutex<CancellationToken>,
}

impl FakeOutput {
    pub fn instant() -> Self {
        Self::playing_for(Duration::ZERO)
    }

    pub fn playing_for(duration: Duration) -> Self {
        Self {
            duration,
            stop_delay: Duration::ZERO,
            fail: false,
            plays: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            last_audio: Mutex::new(None),
            current: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::instant()
        }
    }

    /// `stop` ends the clip at once but takes `delay` to return, like
    /// killing and reaping a player process.
    pub fn with_slow_stop(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn last_audio(&self) -> Option<Vec<u8>> {
        self.last_audio.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioOutput for FakeOutput {
    async fn play(&self, audio: &[u8]) -> Result<(), DeviceError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        *self.last_audio.lock().unwrap() = Some(audio.to_vec());
        if self.fail {
            return Err(DeviceError::Playback("speaker unplugged".into()));
        }

        let token = CancellationToken::new();
        *self.current.lock().unwrap() = token.clone();
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(self.duration) => {}
        }
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.current.lock().unwrap().cancel();
        if !self.stop_delay.is_zero() {
            std::thread::sleep(self.stop_delay);
        }
    }
}

// ---------------------------------------------------------------------------
// Input device
// ---------------------------------------------------------------------------

/// Replays scripted chunks, then stays open until dropped.
pub struct ScriptedInput {
    chunks: Mutex<Vec<AudioChunk>>,
}

impl ScriptedInput {
    pub fn new(chunks: Vec<AudioChunk>) -> Self {
        Self {
            chunks: Mutex::new(chunks),
        }
    }

    /// Opens fine and never produces audio.
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }
}

impl AudioInput for ScriptedInput {
    fn open(&self) -> Result<InputStream, DeviceError> {
        let chunks = std::mem::take(&mut *self.chunks.lock().unwrap());
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            tx.try_send(chunk)
                .map_err(|e| DeviceError::Stream(e.to_string()))?;
        }
        Ok(InputStream::with_guard(rx, tx))
    }
}

pub struct DeniedInput;

impl AudioInput for DeniedInput {
    fn open(&self) -> Result<InputStream, DeviceError> {
        Err(DeviceError::PermissionDenied("microphone".into()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub orchestrator: PipelineOrchestrator,
    pub stt: Arc<FakeTranscriber>,
    pub llm: Arc<ScriptedCompletion>,
    pub synth: Arc<FakeSynthesizer>,
    pub output: Arc<FakeOutput>,
    pub history: ConversationHistory,
}

impl Harness {
    pub fn new(stt: FakeTranscriber, llm: ScriptedCompletion) -> Self {
        let stt = Arc::new(stt);
        let llm = Arc::new(llm);
        let synth = Arc::new(FakeSynthesizer::ok());
        let output = Arc::new(FakeOutput::instant());
        let history = ConversationHistory::new();
        let orchestrator = build(&stt, &llm, &synth, &output, &history);
        Self {
            orchestrator,
            stt,
            llm,
            synth,
            output,
            history,
        }
    }

    pub fn set_synth(&mut self, synth: FakeSynthesizer) {
        self.synth = Arc::new(synth);
        self.rebuild();
    }

    pub fn set_output(&mut self, output: FakeOutput) {
        self.output = Arc::new(output);
        self.rebuild();
    }

    pub fn configure(&mut self, config: &AppConfig) {
        self.orchestrator =
            build(&self.stt, &self.llm, &self.synth, &self.output, &self.history).with_config(config);
    }

    pub fn take_orchestrator(self) -> PipelineOrchestrator {
        self.orchestrator
    }

    fn rebuild(&mut self) {
        self.orchestrator = build(&self.stt, &self.llm, &self.synth, &self.output, &self.history);
    }
}

fn build(
    stt: &Arc<FakeTranscriber>,
    llm: &Arc<ScriptedCompletion>,
    synth: &Arc<FakeSynthesizer>,
    output: &Arc<FakeOutput>,
    history: &ConversationHistory,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        stt.clone(),
        llm.clone(),
        synth.clone(),
        output.clone(),
        history.clone(),
    )
    .with_retry(RetryPolicy::default())
}
