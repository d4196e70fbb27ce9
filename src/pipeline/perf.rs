//! Named latency timers for the voice pipeline.
//!
//! A [`PerformanceMonitor`] is owned by whoever builds the pipeline and shared
//! as `Arc<PerformanceMonitor>`; there is no global instance.  Measurement is
//! purely observational: stopping a timer that was never started returns `0`
//! and logs a warning.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::time::Instant;

/// Well-known stage names.
pub mod stage {
    pub const STT: &str = "stt";
    /// Time to first streamed token.
    pub const LLM: &str = "llm";
    pub const TTS: &str = "tts";
    pub const END_TO_END: &str = "end_to_end";
    /// Barge-in detection until the old run acknowledged cancellation.
    pub const INTERRUPT: &str = "interrupt";

    pub const ALL: [&str; 5] = [STT, LLM, TTS, END_TO_END, INTERRUPT];
}

/// Aggregate of every sample recorded for one timer name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub count: usize,
    pub last_ms: f64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Running totals for one timer; constant size however long the session.
#[derive(Debug, Clone, Copy)]
struct Totals {
    count: usize,
    sum_ms: f64,
    last_ms: f64,
    min_ms: f64,
    max_ms: f64,
}

impl Totals {
    fn first(ms: f64) -> Self {
        Self {
            count: 1,
            sum_ms: ms,
            last_ms: ms,
            min_ms: ms,
            max_ms: ms,
        }
    }

    fn record(&mut self, ms: f64) {
        self.count += 1;
        self.sum_ms += ms;
        self.last_ms = ms;
        self.min_ms = self.min_ms.min(ms);
        self.max_ms = self.max_ms.max(ms);
    }

    fn stats(&self) -> LatencyStats {
        LatencyStats {
            count: self.count,
            last_ms: self.last_ms,
            avg_ms: self.sum_ms / self.count as f64,
            min_ms: self.min_ms,
            max_ms: self.max_ms,
        }
    }
}

#[derive(Default)]
struct Timers {
    running: HashMap<String, Instant>,
    totals: HashMap<String, Totals>,
}

#[derive(Default)]
pub struct PerformanceMonitor {
    inner: Mutex<Timers>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Timers> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start (or restart) the timer `name`.
    pub fn start(&self, name: &str) {
        self.lock().running.insert(name.to_string(), Instant::now());
    }

    /// Stop `name` and return the elapsed milliseconds.
    pub fn stop(&self, name: &str) -> f64 {
        let mut timers = self.lock();
        let Some(started) = timers.running.remove(name) else {
            log::warn!("perf: timer \"{name}\" not running");
            return 0.0;
        };
        let elapsed = started.elapsed().as_secs_f64() * 1000.0;
        match timers.totals.get_mut(name) {
            Some(totals) => totals.record(elapsed),
            None => {
                timers.totals.insert(name.to_string(), Totals::first(elapsed));
            }
        }
        log::debug!("perf: {name} {elapsed:.0}ms");
        elapsed
    }

    /// Drop a running timer without recording a sample.
    pub fn discard(&self, name: &str) {
        self.lock().running.remove(name);
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.lock().running.contains_key(name)
    }

    /// Forget every running timer and every recorded sample.
    pub fn reset(&self) {
        let mut timers = self.lock();
        timers.running.clear();
        timers.totals.clear();
    }

    pub fn stats(&self, name: &str) -> Option<LatencyStats> {
        self.lock().totals.get(name).map(Totals::stats)
    }

    /// Most recent sample for `name`.
    pub fn last(&self, name: &str) -> Option<f64> {
        self.stats(name).map(|s| s.last_ms)
    }

    /// One line per well-known stage, `N/A` where nothing was recorded.
    pub fn summary(&self) -> String {
        stage::ALL
            .iter()
            .map(|name| match self.stats(name) {
                Some(s) => format!(
                    "{name}={:.0}ms (avg {:.0}, n={})",
                    s.last_ms, s.avg_ms, s.count
                ),
                None => format!("{name}=N/A"),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn log_summary(&self) {
        log::info!("perf: {}", self.summary());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
