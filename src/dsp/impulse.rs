//! Synthetic reverb impulse: stereo white noise under a polynomial decay.
//!
//! A fresh, unseeded buffer is produced on every call: two renders with
//! the same settings share length and envelope but not noise content.

use crate::buffer::AudioBuffer;
use crate::error::Result;

/// Amplitude envelope at sample `i` of an impulse `len` samples long.
pub fn envelope(i: usize, len: usize, decay: f64, reverse: bool) -> f64 {
    let n = if reverse { len - i } else { i };
    (1.0 - n as f64 / len as f64).powf(decay)
}

/// Generate a stereo impulse of `duration_secs` at `sample_rate`.
pub fn generate(sample_rate: u32, duration_secs: f64, decay: f64, reverse: bool) -> Result<AudioBuffer> {
    let len = (duration_secs * sample_rate as f64) as usize;
    let mut rng = fastrand::Rng::new();

    let mut left = Vec::with_capacity(len);
    let mut right = Vec::with_capacity(len);
    for i in 0..len {
        let env = envelope(i, len, decay, reverse) as f32;
        left.push((rng.f32() * 2.0 - 1.0) * env);
        right.push((rng.f32() * 2.0 - 1.0) * env);
    }

    AudioBuffer::from_channels(vec![left, right], sample_rate)
}
