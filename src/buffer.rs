//! Planar multi-channel audio buffer.
//!
//! Used for the decoded source, the synthetic impulse response, and the
//! offline render output. Layout matches WebAudio's `AudioBuffer`: one
//! `Vec<f32>` per channel, all of equal length.

use crate::error::{PlayerError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Build from planar channel data. Rejects zero channels, a zero sample
    /// rate, and channels of differing length.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if channels.is_empty() {
            return Err(PlayerError::InvalidBuffer("no channels".into()));
        }
        if sample_rate == 0 {
            return Err(PlayerError::InvalidBuffer("sample rate is zero".into()));
        }
        let len = channels[0].len();
        if let Some(i) = channels.iter().position(|c| c.len() != len) {
            return Err(PlayerError::InvalidBuffer(format!(
                "channel {i} has {} frames, expected {len}",
                channels[i].len()
            )));
        }
        Ok(AudioBuffer { sample_rate, channels })
    }

    /// Build from interleaved samples.
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Result<Self> {
        if channel_count == 0 || samples.len() % channel_count != 0 {
            return Err(PlayerError::InvalidBuffer(format!(
                "{} samples do not divide into {channel_count} channels",
                samples.len()
            )));
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, &s) in channels.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
        Self::from_channels(channels, sample_rate)
    }

    /// A silent buffer.
    pub fn silent(channel_count: usize, frames: usize, sample_rate: u32) -> Result<Self> {
        Self::from_channels(vec![vec![0.0; frames]; channel_count], sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Interleave into a single frame-major vector.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.len() * self.channel_count());
        for i in 0..self.len() {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_channels() {
        let err = AudioBuffer::from_channels(vec![vec![0.0; 4], vec![0.0; 3]], 44100);
        assert!(matches!(err, Err(PlayerError::InvalidBuffer(_))));
    }

    #[test]
    fn rejects_zero_channels_and_rate() {
        assert!(AudioBuffer::from_channels(vec![], 44100).is_err());
        assert!(AudioBuffer::from_channels(vec![vec![0.0]], 0).is_err());
    }

    #[test]
    fn interleaving_preserves_frame_order() {
        let buf = AudioBuffer::from_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2, 8000).unwrap();
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.channel(0), &[0.1, 0.2, 0.3]);
        assert_eq!(buf.channel(1), &[-0.1, -0.2, -0.3]);
        assert_eq!(buf.to_interleaved(), vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
    }

    #[test]
    fn duration_from_rate() {
        let buf = AudioBuffer::silent(1, 88200, 44100).unwrap();
        assert!((buf.duration() - 2.0).abs() < 1e-12);
    }
}
