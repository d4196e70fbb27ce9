//! Conversation pipeline: turn control, per-turn orchestration, retry and
//! latency measurement.
//!
//! # Architecture
//!
//! ```text
//! AudioInput ─▶ start_listening ─▶ VadEvent (mpsc)
//!                                     │
//!                                     ▼
//!                       TurnController::run()  ← async tokio task
//!                                     │
//!        SpeechStarted ───────────────┼─ Listening → Recording
//!                                     │  Processing/Speaking → barge-in
//!        SpeechEnded + settle ────────┴─ drain recorder
//!                                           │
//!                                           ▼
//!                     PipelineOrchestrator::spawn() → PipelineRun
//!                        ├─ retry(stt.transcribe)
//!                        ├─ retry(llm.stream) → TurnEvent::Partial …
//!                        ├─ retry(tts.synthesize)
//!                        └─ output.play
//!
//! SharedState (Arc<Mutex<SessionState>>) ←─── read by the host
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use voice_chat::audio::{AudioInput, AudioOutput};
//! use voice_chat::config::AppConfig;
//! use voice_chat::llm::{ApiCompletion, ConversationHistory};
//! use voice_chat::pipeline::{PipelineOrchestrator, TurnCommand, TurnController};
//! use voice_chat::stt::ApiTranscriber;
//!
//! # async fn example(mic: Arc<dyn AudioInput>, speaker: Arc<dyn AudioOutput>)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let orchestrator = PipelineOrchestrator::new(
//!     Arc::new(ApiTranscriber::from_config(&config.stt)?),
//!     Arc::new(ApiCompletion::from_config(&config.llm)?),
//!     Arc::from(voice_chat::tts::from_config(&config.tts)?),
//!     speaker,
//!     ConversationHistory::new(),
//! )
//! .with_config(&config);
//!
//! let mut controller = TurnController::new(Arc::new(orchestrator), &config);
//! let mut events = controller.subscribe();
//! let (commands, rx) = mpsc::channel(8);
//! tokio::spawn(controller.run(mic, rx));
//! commands.send(TurnCommand::StartListening).await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod perf;
pub mod retry;
pub mod runner;
pub mod state;
pub mod turn;

#[cfg(test)]
pub(crate) mod testing;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use perf::{LatencyStats, PerformanceMonitor};
pub use retry::{RetryError, RetryExecutor, RetryPolicy};
pub use runner::{
    PipelineError, PipelineOrchestrator, PipelineRun, PipelineStage, TurnEvent, TurnOutcome,
};
pub use state::{lock_state, new_shared_state, SessionState, SharedState, TurnState};
pub use turn::{TurnCommand, TurnConfig, TurnController};
