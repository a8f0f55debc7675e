//! PCM conversion and framing helpers for the microphone capture path.
//!
//! Capture devices deliver f32 samples at an arbitrary device rate; the
//! negotiated audio track carries 8 kHz G.711 µ-law frames. Everything in
//! between lives here.

use rubato::{FastFixedIn, PolynomialDegree};

/// Sample rate of the G.711 µ-law audio track sent to the peer.
pub const TRACK_SAMPLE_RATE: f64 = 8000.0;

/// Duration of one outbound audio frame in milliseconds.
pub const FRAME_DURATION_MS: u64 = 20;

/// Samples per outbound frame at the track rate.
pub const FRAME_SAMPLES: usize = (TRACK_SAMPLE_RATE as u64 * FRAME_DURATION_MS / 1000) as usize;

/// Creates a mono resampler converting between capture and track rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Converts a slice of f32 samples to i16 PCM.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Converts a slice of i16 PCM samples to normalized f32.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

/// Downmixes interleaved multi-channel f32 samples to mono by averaging.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32_635;

/// Encodes one linear PCM16 sample as G.711 µ-law.
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign: i32 = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0
    };
    if pcm > ULAW_CLIP {
        pcm = ULAW_CLIP;
    }
    pcm += ULAW_BIAS;

    let mut exponent: i32 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (pcm & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Encodes a slice of PCM16 samples as a G.711 µ-law byte buffer.
pub fn encode_ulaw(pcm16: &[i16]) -> Vec<u8> {
    pcm16.iter().map(|&s| linear_to_ulaw(s)).collect()
}

/// Decodes one G.711 µ-law byte back to linear PCM16.
pub fn ulaw_to_linear(ulaw: u8) -> i16 {
    let ulaw = !ulaw as i32;
    let sign = ulaw & 0x80;
    let exponent = (ulaw >> 4) & 0x07;
    let mantissa = ulaw & 0x0F;
    let mut pcm = ((mantissa << 3) + ULAW_BIAS) << exponent;
    pcm -= ULAW_BIAS;
    if sign != 0 { -pcm as i16 } else { pcm as i16 }
}
