//! Pipeline orchestrator — drives one turn: STT → streamed LLM → TTS → playback.
//!
//! [`PipelineOrchestrator::run_turn`] takes the utterance audio and a
//! [`CancellationToken`] and reports progress as [`TurnEvent`]s over an
//! unbounded channel, finishing with exactly one terminal event.
//!
//! # Turn flow
//!
//! ```text
//! AudioClip
//!   └─▶ retry(stt.transcribe)                      [Stage(Transcription)]
//!         ├─ blank   → NoSpeech (history untouched)
//!         └─ text    → history += user, Transcript(text)
//!               └─▶ system + history.recent(10)
//!                     └─▶ retry(llm.stream)          [Stage(Completion)]
//!                           └─ Delta* → Partial(delta) …
//!                                 └─▶ retry(tts.synthesize) [Stage(Synthesis)]
//!                                       └─▶ output.play     [Stage(Playback)]
//!                                             └─▶ history += assistant
//!                                                   └─▶ Completed(reply)
//! ```
//!
//! The token is checked before every step, raced against every provider call
//! and every stream read, and against playback.  A cancelled run appends no
//! assistant message and ends with [`TurnEvent::Cancelled`], which is not an
//! error.  A synthesis or playback failure is logged and the reply text still
//! completes the turn.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audio::AudioOutput;
use crate::config::AppConfig;
use crate::llm::{
    CompletionParams, CompletionService, ConversationHistory, PromptBuilder, Role, StreamError,
    StreamEvent,
};
use crate::provider::ProviderError;
use crate::stt::{AudioClip, TranscribeOptions, Transcriber};
use crate::tts::{Synthesizer, VoiceParams};

use super::perf::{stage, PerformanceMonitor};
use super::retry::{RetryError, RetryExecutor, RetryPolicy};

// ---------------------------------------------------------------------------
// PipelineStage / PipelineError
// ---------------------------------------------------------------------------

/// Step of a turn, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Transcription,
    Completion,
    Synthesis,
    Playback,
}

impl PipelineStage {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStage::Transcription => "transcription",
            PipelineStage::Completion => "completion",
            PipelineStage::Synthesis => "synthesis",
            PipelineStage::Playback => "playback",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ways a turn can end other than with a reply.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Every retry of a provider call failed.
    #[error("{stage} provider unavailable: {source}")]
    ProviderUnavailable {
        stage: PipelineStage,
        #[source]
        source: ProviderError,
    },

    /// The transcript was blank.  Not a failure; the turn ends quietly.
    #[error("no speech recognized")]
    EmptyTranscript,

    /// The completion stream was unreadable before any text arrived.
    #[error("malformed completion stream: {0}")]
    StreamDecode(String),

    #[error("turn cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// TurnEvent / TurnOutcome
// ---------------------------------------------------------------------------

/// Progress of a running turn, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// A step is about to start.
    Stage(PipelineStage),
    /// The user's utterance, as recorded in history.
    Transcript(String),
    /// Next reply fragment, exactly as streamed.
    Partial(String),
    /// Terminal: the full reply text.
    Completed(String),
    /// Terminal: the transcript was blank.
    NoSpeech,
    /// Terminal: the run was cancelled.
    Cancelled,
    /// Terminal: the turn failed.
    Error(PipelineError),
}

impl TurnEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnEvent::Completed(_) | TurnEvent::NoSpeech | TurnEvent::Cancelled | TurnEvent::Error(_)
        )
    }
}

/// Final result of [`PipelineOrchestrator::run_turn`].
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// `reply` is empty when the model produced no text; nothing is spoken
    /// or recorded for it then.
    Completed { transcript: String, reply: String },
    NoSpeech,
    Cancelled,
    Failed(PipelineError),
}

impl TurnOutcome {
    fn terminal_event(&self) -> TurnEvent {
        match self {
            TurnOutcome::Completed { reply, .. } => TurnEvent::Completed(reply.clone()),
            TurnOutcome::NoSpeech => TurnEvent::NoSpeech,
            TurnOutcome::Cancelled => TurnEvent::Cancelled,
            TurnOutcome::Failed(e) => TurnEvent::Error(e.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineRun
// ---------------------------------------------------------------------------

/// A turn running on its own task.
///
/// Cancelling only signals the run; [`join`](Self::join) waits until it has
/// acknowledged and released the output device.
pub struct PipelineRun {
    id: u64,
    cancel: CancellationToken,
    events: mpsc::UnboundedReceiver<TurnEvent>,
    task: JoinHandle<TurnOutcome>,
}

impl PipelineRun {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Next event, or `None` once the run has emitted its terminal event and
    /// exited.
    pub async fn next_event(&mut self) -> Option<TurnEvent> {
        self.events.recv().await
    }

    /// Wait for the run to finish.
    pub async fn join(self) -> TurnOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("pipeline: run {} aborted: {e}", self.id);
                TurnOutcome::Cancelled
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

/// Runs turns against the external collaborators.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use voice_chat::audio::CommandPlayer;
/// use voice_chat::config::AppConfig;
/// use voice_chat::llm::{ApiCompletion, ConversationHistory};
/// use voice_chat::pipeline::PipelineOrchestrator;
/// use voice_chat::stt::{ApiTranscriber, AudioClip};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AppConfig::default();
/// let orchestrator = PipelineOrchestrator::new(
///     Arc::new(ApiTranscriber::from_config(&config.stt)?),
///     Arc::new(ApiCompletion::from_config(&config.llm)?),
///     Arc::from(voice_chat::tts::from_config(&config.tts)?),
///     Arc::new(CommandPlayer::from_config(&config.playback)?),
///     ConversationHistory::new(),
/// )
/// .with_config(&config);
///
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// let clip = AudioClip::from_pcm(&vec![0.0; 16_000], 16_000);
/// orchestrator.run_turn(clip, &CancellationToken::new(), &tx).await;
/// while let Ok(event) = rx.try_recv() {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct PipelineOrchestrator {
    stt: Arc<dyn Transcriber>,
    llm: Arc<dyn CompletionService>,
    tts: Arc<dyn Synthesizer>,
    output: Arc<dyn AudioOutput>,
    history: ConversationHistory,
    prompt: PromptBuilder,
    retry: RetryExecutor,
    perf: Arc<PerformanceMonitor>,
    stt_options: TranscribeOptions,
    params: CompletionParams,
    voice: VoiceParams,
}

impl PipelineOrchestrator {
    /// Create an orchestrator with default settings.
    ///
    /// * `stt`: transcription collaborator.
    /// * `llm`: streaming completion collaborator.
    /// * `tts`: synthesis collaborator, fallback already included.
    /// * `output`: playback device; only the active run uses it.
    /// * `history`: conversation log shared with the host.
    pub fn new(
        stt: Arc<dyn Transcriber>,
        llm: Arc<dyn CompletionService>,
        tts: Arc<dyn Synthesizer>,
        output: Arc<dyn AudioOutput>,
        history: ConversationHistory,
    ) -> Self {
        let defaults = AppConfig::default();
        Self {
            stt,
            llm,
            tts,
            output,
            history,
            prompt: PromptBuilder::from_config(&defaults.history),
            retry: RetryExecutor::new(RetryPolicy::from_config(&defaults.retry)),
            perf: Arc::new(PerformanceMonitor::new()),
            stt_options: TranscribeOptions::from(&defaults.stt),
            params: CompletionParams::from(&defaults.llm),
            voice: VoiceParams::default(),
        }
    }

    /// Take prompt, retry, language, model and voice settings from `config`.
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.prompt = PromptBuilder::from_config(&config.history);
        self.retry = RetryExecutor::new(RetryPolicy::from_config(&config.retry));
        self.stt_options = TranscribeOptions::from(&config.stt);
        self.params = CompletionParams::from(&config.llm);
        self.with_voice(VoiceParams::from(&config.tts))
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy);
        self
    }

    pub fn with_perf(mut self, perf: Arc<PerformanceMonitor>) -> Self {
        self.perf = perf;
        self
    }

    pub fn with_voice(mut self, voice: VoiceParams) -> Self {
        self.voice = voice;
        self
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn perf(&self) -> &Arc<PerformanceMonitor> {
        &self.perf
    }

    pub fn output(&self) -> &Arc<dyn AudioOutput> {
        &self.output
    }

    /// Run one turn on a new task with a fresh cancellation token.
    pub fn spawn(self: &Arc<Self>, id: u64, clip: AudioClip) -> PipelineRun {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let orchestrator = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            log::debug!("pipeline: run {id} started");
            let outcome = orchestrator.run_turn(clip, &token, &tx).await;
            log::debug!("pipeline: run {id} finished");
            outcome
        });

        PipelineRun {
            id,
            cancel,
            events: rx,
            task,
        }
    }

    // -----------------------------------------------------------------------
    // run_turn
    // -----------------------------------------------------------------------

    /// Run one turn to completion, cancellation or failure.
    ///
    /// Progress goes to `events`; the last event sent is always the terminal
    /// one matching the returned outcome.  A dropped receiver is ignored.
    pub async fn run_turn(
        &self,
        clip: AudioClip,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> TurnOutcome {
        self.perf.start(stage::END_TO_END);
        let outcome = self.drive(&clip, cancel, events).await;

        match &outcome {
            TurnOutcome::Completed { .. } => {
                self.perf.stop(stage::END_TO_END);
            }
            TurnOutcome::Cancelled => {
                log::info!("pipeline: turn cancelled");
                self.abandon_timers();
            }
            TurnOutcome::NoSpeech => {
                log::info!("pipeline: no speech recognized");
                self.abandon_timers();
            }
            TurnOutcome::Failed(e) => {
                log::error!("pipeline: turn failed: {e}");
                self.abandon_timers();
            }
        }

        let _ = events.send(outcome.terminal_event());
        outcome
    }

    async fn drive(
        &self,
        clip: &AudioClip,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> TurnOutcome {
        let emit = |event: TurnEvent| {
            let _ = events.send(event);
        };

        // ── 1. Transcription ─────────────────────────────────────────────
        if cancel.is_cancelled() {
            return TurnOutcome::Cancelled;
        }
        emit(TurnEvent::Stage(PipelineStage::Transcription));
        self.perf.start(stage::STT);

        let transcript = match self
            .retry
            .execute("stt", cancel, || self.stt.transcribe(clip, &self.stt_options))
            .await
        {
            Ok(text) => text,
            Err(e) => return provider_failure(PipelineStage::Transcription, e),
        };
        self.perf.stop(stage::STT);

        let transcript = transcript.trim().to_string();
        if transcript.is_empty() {
            return TurnOutcome::NoSpeech;
        }
        log::debug!("pipeline: transcript = {transcript:?}");
        self.history.push(Role::User, transcript.as_str());
        emit(TurnEvent::Transcript(transcript.clone()));

        // ── 2. Context assembly ──────────────────────────────────────────
        if cancel.is_cancelled() {
            return TurnOutcome::Cancelled;
        }
        let messages = self.prompt.build_messages(&self.history);

        // ── 3. Streamed completion ───────────────────────────────────────
        emit(TurnEvent::Stage(PipelineStage::Completion));
        self.perf.start(stage::LLM);

        let mut stream = match self
            .retry
            .execute("llm", cancel, || self.llm.stream(&messages, &self.params))
            .await
        {
            Ok(stream) => stream,
            Err(e) => return provider_failure(PipelineStage::Completion, e),
        };

        let mut reply = String::new();
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => return TurnOutcome::Cancelled,
                item = stream.next() => item,
            };

            match item {
                Some(Ok(StreamEvent::Delta(text))) => {
                    if reply.is_empty() {
                        self.perf.stop(stage::LLM);
                    }
                    reply.push_str(&text);
                    emit(TurnEvent::Partial(text));
                }
                Some(Ok(StreamEvent::Done)) => break,
                Some(Err(StreamError::Decode(msg))) => {
                    log::warn!("pipeline: {msg}; treating stream as ended");
                    if reply.is_empty() {
                        return TurnOutcome::Failed(PipelineError::StreamDecode(msg));
                    }
                    break;
                }
                Some(Err(StreamError::Provider(e))) => {
                    if reply.is_empty() {
                        return TurnOutcome::Failed(PipelineError::ProviderUnavailable {
                            stage: PipelineStage::Completion,
                            source: e,
                        });
                    }
                    log::warn!("pipeline: stream interrupted ({e}); keeping partial reply");
                    break;
                }
                None => {
                    log::debug!("pipeline: stream closed without end marker");
                    break;
                }
            }
        }
        drop(stream);

        if reply.trim().is_empty() {
            self.perf.discard(stage::LLM);
            log::info!("pipeline: model returned no text");
            return TurnOutcome::Completed {
                transcript,
                reply: String::new(),
            };
        }

        // ── 4. Synthesis + playback ──────────────────────────────────────
        if cancel.is_cancelled() {
            return TurnOutcome::Cancelled;
        }
        emit(TurnEvent::Stage(PipelineStage::Synthesis));
        self.perf.start(stage::TTS);

        let audio = match self
            .retry
            .execute("tts", cancel, || self.tts.synthesize(&reply, &self.voice))
            .await
        {
            Ok(audio) => {
                self.perf.stop(stage::TTS);
                Some(audio)
            }
            Err(RetryError::Cancelled) => return TurnOutcome::Cancelled,
            Err(RetryError::Failed(e)) => {
                self.perf.discard(stage::TTS);
                log::error!("pipeline: synthesis failed ({e}); reply kept as text");
                None
            }
        };

        if let Some(audio) = audio {
            if cancel.is_cancelled() {
                return TurnOutcome::Cancelled;
            }
            emit(TurnEvent::Stage(PipelineStage::Playback));

            let played = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.output.stop();
                    return TurnOutcome::Cancelled;
                }
                played = self.output.play(&audio) => played,
            };
            if let Err(e) = played {
                log::warn!("pipeline: playback failed: {e}");
            }
            // `stop()` makes `play` resolve normally.
            if cancel.is_cancelled() {
                return TurnOutcome::Cancelled;
            }
        }

        self.history.push(Role::Assistant, reply.as_str());
        TurnOutcome::Completed { transcript, reply }
    }

    fn abandon_timers(&self) {
        for name in [stage::STT, stage::LLM, stage::TTS, stage::END_TO_END] {
            self.perf.discard(name);
        }
    }
}

fn provider_failure(stage: PipelineStage, err: RetryError<ProviderError>) -> TurnOutcome {
    match err {
        RetryError::Cancelled => TurnOutcome::Cancelled,
        RetryError::Failed(source) => {
            TurnOutcome::Failed(PipelineError::ProviderUnavailable { stage, source })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
