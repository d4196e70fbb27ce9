//! Spectral level meter: raw PCM → normalised amplitude in `[0, 1]`.
//!
//! The detector does not look at samples directly.  Each fixed-size frame is
//! reduced to a single level the same way a browser analyser node does it:
//!
//! ```text
//! frame (N samples) ─▶ Blackman window ─▶ DFT magnitude / N   (N/2 bins)
//!                   ─▶ per-bin EMA (smoothing τ)
//!                   ─▶ 20·log10 ─▶ map [min_dB, max_dB] → [0, 255]
//!                   ─▶ mean over bins / 255  =  level
//! ```
//!
//! Frames are small (256 samples by default), so a direct DFT over
//! precomputed twiddle tables is plenty fast.

use std::f32::consts::PI;
use std::time::Duration;

use crate::config::AudioConfig;

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// One amplitude reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFrame {
    /// Normalised level in `[0.0, 1.0]`.
    pub level: f32,
    /// Offset of the end of this frame from the start of the capture.
    pub timestamp: Duration,
}

// ---------------------------------------------------------------------------
// LevelMeter
// ---------------------------------------------------------------------------

pub struct LevelMeter {
    frame_size: usize,
    sample_rate: u32,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
    window: Vec<f32>,
    cos_table: Vec<f32>,
    sin_table: Vec<f32>,
    smoothed: Vec<f32>,
    pending: Vec<f32>,
    frames_emitted: u64,
}

impl LevelMeter {
    pub fn new(config: &AudioConfig) -> Self {
        let n = config.frame_size.max(2);
        let window = (0..n)
            .map(|i| {
                let x = 2.0 * PI * i as f32 / n as f32;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();
        let cos_table = (0..n).map(|i| (2.0 * PI * i as f32 / n as f32).cos()).collect();
        let sin_table = (0..n).map(|i| (2.0 * PI * i as f32 / n as f32).sin()).collect();

        Self {
            frame_size: n,
            sample_rate: config.sample_rate.max(1),
            smoothing: config.smoothing.clamp(0.0, 1.0),
            min_db: config.min_decibels,
            max_db: config.max_decibels,
            window,
            cos_table,
            sin_table,
            smoothed: vec![0.0; n / 2],
            pending: Vec::with_capacity(n),
            frames_emitted: 0,
        }
    }

    /// Feed samples of any length; returns one frame per completed window.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        let mut rest = samples;

        while !rest.is_empty() {
            let take = (self.frame_size - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.frame_size {
                let frame = std::mem::take(&mut self.pending);
                let level = self.analyze(&frame);
                self.pending = frame;
                self.pending.clear();

                self.frames_emitted += 1;
                let samples_done = self.frames_emitted * self.frame_size as u64;
                frames.push(AudioFrame {
                    level,
                    timestamp: Duration::from_micros(
                        samples_done * 1_000_000 / self.sample_rate as u64,
                    ),
                });
            }
        }
        frames
    }

    /// Level of one complete frame, updating the smoothing state.
    pub fn analyze(&mut self, frame: &[f32]) -> f32 {
        let n = self.frame_size;
        let bins = self.smoothed.len();
        let range = self.max_db - self.min_db;
        let mut total = 0.0_f32;

        for k in 0..bins {
            let (mut re, mut im) = (0.0_f32, 0.0_f32);
            for (i, &s) in frame.iter().take(n).enumerate() {
                let x = s * self.window[i];
                let idx = (k * i) % n;
                re += x * self.cos_table[idx];
                im -= x * self.sin_table[idx];
            }
            let magnitude = (re * re + im * im).sqrt() / n as f32;

            let smoothed = self.smoothing * self.smoothed[k] + (1.0 - self.smoothing) * magnitude;
            self.smoothed[k] = smoothed;

            let db = if smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                f32::NEG_INFINITY
            };
            let byte = (255.0 * (db - self.min_db) / range).clamp(0.0, 255.0).floor();
            total += byte;
        }

        total / bins as f32 / 255.0
    }

    /// Forget smoothing history and partial frames.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
        self.pending.clear();
        self.frames_emitted = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
