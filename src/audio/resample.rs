//! Channel mixing and sample-rate conversion for device audio.
//!
//! Capture devices deliver interleaved frames at whatever rate the hardware
//! prefers (44.1 kHz and 48 kHz are common).  The level meter and the
//! transcription path both expect mono audio at the configured rate, so the
//! capture adapter runs every callback through:
//!
//! 1. [`stereo_to_mono`] — average interleaved channels.
//! 2. [`resample`] — linear interpolation to the target rate.

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// `channels == 1` copies the input; `channels == 0` yields nothing.
///
/// ```rust
/// use voice_chat::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.4, 0.2]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `source_rate` to `target_rate` Hz using
/// linear interpolation.
///
/// Equal rates return a copy; empty input or a zero rate returns an empty
/// vector.
///
/// ```rust
/// use voice_chat::audio::resample;
///
/// let hi = vec![0.5_f32; 480];
/// assert_eq!(resample(&hi, 48_000, 16_000).len(), 160);
/// ```
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }
    if samples.is_empty() || source_rate == 0 || target_rate == 0 {
        return Vec::new();
    }

    let step = source_rate as f64 / target_rate as f64;
    let output_len = (samples.len() as f64 / step).ceil() as usize;
    let last = samples.len() - 1;

    (0..output_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * frac
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_passthrough() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(stereo_to_mono(&input, 1), input);
    }

    #[test]
    fn four_channel_average() {
        let input = vec![0.4_f32, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let mono = stereo_to_mono(&input, 4);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.1).abs() < 1e-6);
        assert!((mono[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_channels_is_empty() {
        assert!(stereo_to_mono(&[0.5, 0.5], 0).is_empty());
    }

    #[test]
    fn same_rate_is_noop() {
        let input: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        assert_eq!(resample(&input, 16_000, 16_000), input);
    }

    #[test]
    fn empty_or_zero_rate() {
        assert!(resample(&[], 48_000, 16_000).is_empty());
        assert!(resample(&[0.1, 0.2], 0, 16_000).is_empty());
    }

    #[test]
    fn downsample_44100_length() {
        let input = vec![0.0_f32; 44_100];
        let out = resample(&input, 44_100, 16_000);
        assert!((out.len() as i64 - 16_000).abs() <= 1, "got {}", out.len());
    }

    #[test]
    fn constant_signal_preserved() {
        let out = resample(&vec![0.25_f32; 4_800], 48_000, 16_000);
        assert!(out.iter().all(|s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn upsample_interpolates_midpoints() {
        let out = resample(&[0.0_f32, 1.0], 8_000, 16_000);
        assert_eq!(out.len(), 4);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }
}
