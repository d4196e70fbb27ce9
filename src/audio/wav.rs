//! Minimal RIFF/WAVE encoder for mono 16-bit PCM.
//!
//! Transcription providers accept a WAV upload; the recorder holds `f32`
//! samples, so the utterance is quantised and wrapped in a 44-byte header
//! right before it leaves the process.

/// MIME type of the bytes produced by [`encode_pcm16`].
pub const WAV_MIME: &str = "audio/wav";

const HEADER_LEN: usize = 44;

/// Encode mono `f32` samples (clamped to `[-1, 1]`) as a 16-bit PCM WAV file.
///
/// ```rust
/// use voice_chat::audio::encode_pcm16;
///
/// let wav = encode_pcm16(&[0.0, 1.0, -1.0], 16_000);
/// assert_eq!(&wav[..4], b"RIFF");
/// assert_eq!(wav.len(), 44 + 3 * 2);
/// ```
pub fn encode_pcm16(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut buf = Vec::with_capacity(HEADER_LEN + data_len as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let q = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        buf.extend_from_slice(&q.to_le_bytes());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    }

    #[test]
    fn header_fields() {
        let wav = encode_pcm16(&[0.0; 100], 16_000);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32_at(&wav, 4), 36 + 200);
        assert_eq!(u32_at(&wav, 24), 16_000);
        assert_eq!(u32_at(&wav, 28), 32_000);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), 200);
    }

    #[test]
    fn samples_are_clamped() {
        let wav = encode_pcm16(&[2.0, -2.0], 8_000);
        let hi = i16::from_le_bytes([wav[44], wav[45]]);
        let lo = i16::from_le_bytes([wav[46], wav[47]]);
        assert_eq!(hi, i16::MAX);
        assert_eq!(lo, -i16::MAX);
    }

    #[test]
    fn empty_clip_is_header_only() {
        assert_eq!(encode_pcm16(&[], 16_000).len(), 44);
    }
}
