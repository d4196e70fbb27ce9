//! Turn controller — VAD events in, pipeline runs out.
//!
//! [`TurnController`] owns the [`TurnState`] machine, the utterance recorder
//! and at most one active [`PipelineRun`].
//!
//! # Event flow
//!
//! ```text
//! VadEvent::SpeechStarted
//!   ├─ Listening            → Recording (keep pre-roll)
//!   ├─ Processing/Speaking  → barge-in: stop output, cancel run,
//!   │                         clear partial reply, Recording
//!   └─ Recording            → cancel a pending settle, keep recording
//!
//! VadEvent::SpeechEnded (Recording)
//!   └─▶ settle delay ─▶ drain recorder ─▶ spawn run [Processing]
//!
//! TurnEvent::Stage(Playback) → Speaking
//! terminal TurnEvent          → Listening
//! ```
//!
//! Barge-in cancels the run and joins it before recording starts, so two
//! runs never hold the output device at once.

use std::sync::{Arc, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::audio::{
    new_recorder, start_listening, AudioInput, DeviceError, ListenHandle, RingBuffer, SharedRecorder,
    VadEvent,
};
use crate::config::{AppConfig, AudioConfig, VadConfig};
use crate::stt::AudioClip;

use super::perf::{stage, PerformanceMonitor};
use super::runner::{PipelineOrchestrator, PipelineRun, PipelineStage, TurnEvent, TurnOutcome};
use super::state::{lock_state, new_shared_state, SharedState, TurnState};

pub use crate::config::TurnConfig;

// ---------------------------------------------------------------------------
// TurnCommand
// ---------------------------------------------------------------------------

/// Requests a host sends to a controller running [`TurnController::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnCommand {
    StartListening,
    /// Manual mode: treat as an immediate end of speech.
    ForceEndOfSpeech,
    /// Cancel everything and go idle.
    Stop,
}

// ---------------------------------------------------------------------------
// TurnController
// ---------------------------------------------------------------------------

pub struct TurnController {
    orchestrator: Arc<PipelineOrchestrator>,
    config: TurnConfig,
    vad: VadConfig,
    audio: AudioConfig,
    state: SharedState,
    recorder: SharedRecorder,
    perf: Arc<PerformanceMonitor>,

    listener: Option<ListenHandle>,
    vad_events: Option<mpsc::Receiver<VadEvent>>,

    active: Option<PipelineRun>,
    next_run_id: u64,

    settle_at: Option<Instant>,
    record_limit_at: Option<Instant>,

    observer: Option<mpsc::UnboundedSender<TurnEvent>>,
}

impl TurnController {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, config: &AppConfig) -> Self {
        let perf = Arc::clone(orchestrator.perf());
        Self {
            orchestrator,
            config: config.turn.clone(),
            vad: config.vad.clone(),
            audio: config.audio.clone(),
            state: new_shared_state(),
            recorder: new_recorder(config.audio.sample_rate, config.turn.recording_limit_secs()),
            perf,
            listener: None,
            vad_events: None,
            active: None,
            next_run_id: 0,
            settle_at: None,
            record_limit_at: None,
            observer: None,
        }
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    pub fn turn_state(&self) -> TurnState {
        lock_state(&self.state).turn
    }

    pub fn recorder(&self) -> SharedRecorder {
        Arc::clone(&self.recorder)
    }

    pub fn orchestrator(&self) -> &Arc<PipelineOrchestrator> {
        &self.orchestrator
    }

    /// Receive every [`TurnEvent`] of the active run, plus a
    /// [`TurnEvent::Cancelled`] on each barge-in.  Replaces any earlier
    /// subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TurnEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer = Some(tx);
        rx
    }

    pub fn has_active_run(&self) -> bool {
        self.active.is_some()
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Drive the controller until `commands` closes, then stop.
    ///
    /// VAD events are served first, so a barge-in preempts everything else.
    pub async fn run(mut self, input: Arc<dyn AudioInput>, mut commands: mpsc::Receiver<TurnCommand>) {
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                biased;

                event = recv_vad(&mut self.vad_events) => match event {
                    Some(event) => self.handle_vad(event).await,
                    None => {
                        log::warn!("turn: VAD stream ended");
                        self.vad_events = None;
                    }
                },

                command = commands.recv() => match command {
                    Some(TurnCommand::StartListening) => {
                        // Failure is already logged and stored in the shared state.
                        let _ = self.start_listening(input.as_ref());
                    }
                    Some(TurnCommand::ForceEndOfSpeech) => self.force_end_of_speech().await,
                    Some(TurnCommand::Stop) => self.stop().await,
                    None => break,
                },

                wake = next_wake(&mut self.active, deadline) => self.handle_wake(wake).await,
            }
        }

        log::info!("turn: command channel closed, controller shutting down");
        self.stop().await;
    }

    /// Process the next deadline or run event.  Returns `false` when nothing
    /// is pending.
    pub async fn tick(&mut self) -> bool {
        let deadline = self.next_deadline();
        if deadline.is_none() && self.active.is_none() {
            return false;
        }
        let wake = next_wake(&mut self.active, deadline).await;
        self.handle_wake(wake).await;
        true
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// `Idle → Listening`.  A no-op while already listening.
    ///
    /// # Errors
    ///
    /// The input device's error; the controller stays `Idle` and listening
    /// can be retried.
    pub fn start_listening(&mut self, input: &dyn AudioInput) -> Result<(), DeviceError> {
        if self.listener.is_some() {
            return Ok(());
        }

        self.recorder_guard().clear();
        let session = match start_listening(input, &self.vad, &self.audio, Some(self.recorder()))
        {
            Ok(session) => session,
            Err(e) => {
                log::error!("turn: cannot start listening: {e}");
                lock_state(&self.state).last_error = Some(e.to_string());
                return Err(e);
            }
        };

        self.listener = Some(session.handle);
        self.vad_events = Some(session.events);

        let mut st = lock_state(&self.state);
        if st.turn == TurnState::Idle {
            st.turn = TurnState::Listening;
        }
        st.last_error = None;
        log::info!("turn: listening");
        Ok(())
    }

    /// `* → Idle`: cancel and join any run, release the microphone.
    pub async fn stop(&mut self) {
        self.settle_at = None;
        self.record_limit_at = None;

        if let Some(run) = self.active.take() {
            run.cancel();
            self.orchestrator.output().stop();
            run.join().await;
        }

        self.vad_events = None;
        if let Some(listener) = self.listener.take() {
            listener.shutdown().await;
        }
        self.recorder_guard().clear();

        let mut st = lock_state(&self.state);
        st.turn = TurnState::Idle;
        st.partial_reply.clear();
        log::info!("turn: stopped");
    }

    /// Manual end of speech: commit the recording now, skipping the settle
    /// delay.
    pub async fn force_end_of_speech(&mut self) {
        if self.turn_state() != TurnState::Recording {
            log::debug!("turn: end of speech forced while not recording, ignored");
            return;
        }
        self.commit().await;
    }

    // -----------------------------------------------------------------------
    // VAD events
    // -----------------------------------------------------------------------

    pub async fn handle_vad(&mut self, event: VadEvent) {
        match event {
            VadEvent::SpeechStarted { at } => self.on_speech_started(at).await,
            VadEvent::SpeechEnded { at } => self.on_speech_ended(at),
        }
    }

    async fn on_speech_started(&mut self, at: Duration) {
        let state = self.turn_state();
        if state.accepts_barge_in() {
            self.barge_in().await;
            self.begin_recording();
            return;
        }
        match state {
            TurnState::Listening => self.begin_recording(),
            TurnState::Recording => {
                if self.settle_at.take().is_some() {
                    log::debug!("turn: speech resumed at {at:?} before commit");
                }
            }
            _ => log::debug!("turn: speech while {}, ignored", state.label()),
        }
    }

    fn on_speech_ended(&mut self, at: Duration) {
        if self.turn_state() != TurnState::Recording || self.settle_at.is_some() {
            return;
        }
        log::debug!("turn: speech ended at {at:?}, settling");
        self.settle_at = Some(Instant::now() + Duration::from_millis(self.config.settle_delay_ms));
    }

    fn begin_recording(&mut self) {
        let pre_roll = (self.config.pre_roll_ms * self.audio.sample_rate as u64 / 1000) as usize;
        self.recorder_guard().retain_last(pre_roll);

        self.settle_at = None;
        self.record_limit_at =
            Some(Instant::now() + Duration::from_secs_f32(self.config.recording_limit_secs()));

        let mut st = lock_state(&self.state);
        st.turn = TurnState::Recording;
        st.partial_reply.clear();
        st.last_error = None;
        log::debug!("turn: → Recording");
    }

    /// Cancel the active run, stop playback, wait for the run to exit and
    /// drop its partial reply.
    async fn barge_in(&mut self) {
        log::info!("turn: barge-in");
        self.perf.start(stage::INTERRUPT);

        // Cancel first: a stopped `play` returns normally, and the run must
        // already see the token when it does.
        let run = self.active.take();
        if let Some(run) = &run {
            run.cancel();
        }
        self.orchestrator.output().stop();
        if let Some(run) = run {
            run.join().await;
        }
        self.perf.stop(stage::INTERRUPT);

        lock_state(&self.state).partial_reply.clear();
        self.notify(TurnEvent::Cancelled);
    }

    // -----------------------------------------------------------------------
    // Commit / run events
    // -----------------------------------------------------------------------

    async fn handle_wake(&mut self, wake: Wake) {
        match wake {
            Wake::Deadline => {
                if self.settle_at.is_none() {
                    log::info!("turn: recording limit reached, committing");
                }
                self.commit().await;
            }
            Wake::Run(Some(event)) => self.handle_run_event(event).await,
            Wake::Run(None) => self.finish_active().await,
        }
    }

    /// `Recording → Processing`: hand the recorded audio to a new run.
    async fn commit(&mut self) {
        self.settle_at = None;
        self.record_limit_at = None;
        if self.turn_state() != TurnState::Recording {
            return;
        }

        let samples = self.recorder_guard().drain();
        if samples.is_empty() {
            log::warn!("turn: nothing recorded");
            lock_state(&self.state).turn = self.resting_state();
            return;
        }

        // Single active run.
        if let Some(run) = self.active.take() {
            run.cancel();
            run.join().await;
        }

        let clip = AudioClip::from_pcm(&samples, self.audio.sample_rate);
        log::debug!("turn: committing {:.2}s of audio", clip.duration_secs);

        self.next_run_id += 1;
        self.active = Some(self.orchestrator.spawn(self.next_run_id, clip));
        lock_state(&self.state).turn = TurnState::Processing;
    }

    async fn handle_run_event(&mut self, event: TurnEvent) {
        {
            let mut st = lock_state(&self.state);
            match &event {
                TurnEvent::Stage(PipelineStage::Playback) => st.turn = TurnState::Speaking,
                TurnEvent::Stage(_) => {}
                TurnEvent::Transcript(text) => st.last_transcript = Some(text.clone()),
                TurnEvent::Partial(text) => st.partial_reply.push_str(text),
                TurnEvent::Completed(reply) => {
                    if !reply.is_empty() {
                        st.last_reply = Some(reply.clone());
                    }
                    st.partial_reply.clear();
                }
                TurnEvent::Error(e) => st.last_error = Some(e.to_string()),
                TurnEvent::NoSpeech | TurnEvent::Cancelled => {}
            }
        }

        let terminal = event.is_terminal();
        self.notify(event);
        if terminal {
            self.finish_active().await;
        }
    }

    async fn finish_active(&mut self) {
        let Some(run) = self.active.take() else {
            return;
        };
        if let TurnOutcome::Completed { .. } = run.join().await {
            self.perf.log_summary();
        }

        let mut st = lock_state(&self.state);
        if st.turn.is_busy() {
            st.turn = self.resting_state();
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn next_deadline(&self) -> Option<Instant> {
        match (self.settle_at, self.record_limit_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn resting_state(&self) -> TurnState {
        if self.listener.is_some() {
            TurnState::Listening
        } else {
            TurnState::Idle
        }
    }

    fn recorder_guard(&self) -> MutexGuard<'_, RingBuffer<f32>> {
        self.recorder.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, event: TurnEvent) {
        if let Some(observer) = &self.observer {
            let _ = observer.send(event);
        }
    }
}

// ---------------------------------------------------------------------------
// select! helpers
// ---------------------------------------------------------------------------

enum Wake {
    Deadline,
    Run(Option<TurnEvent>),
}

async fn recv_vad(events: &mut Option<mpsc::Receiver<VadEvent>>) -> Option<VadEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_wake(active: &mut Option<PipelineRun>, deadline: Option<Instant>) -> Wake {
    let run_event = async {
        match active {
            Some(run) => run.next_event().await,
            None => std::future::pending().await,
        }
    };
    let timer = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        _ = timer => Wake::Deadline,
        event = run_event => Wake::Run(event),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
