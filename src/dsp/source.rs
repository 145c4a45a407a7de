//! Plays a decoded buffer at a variable rate.
//!
//! Rate changes speed and pitch together (no time-stretching). Fractional
//! read positions use linear interpolation; at rate 1.0 with matching
//! sample rates every read lands on an integer frame and the source
//! reproduces the buffer exactly.

use std::rc::Rc;

use crate::buffer::AudioBuffer;
use crate::error::{PlayerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Unstarted,
    Playing,
    Stopped,
    Ended,
}

#[derive(Debug)]
pub struct BufferSource {
    buffer: Rc<AudioBuffer>,
    playback_rate: f64,
    /// Buffer frames per context frame at rate 1.0.
    rate_ratio: f64,
    /// Read position in buffer frames.
    position: f64,
    state: SourceState,
}

impl BufferSource {
    pub fn new(buffer: Rc<AudioBuffer>, playback_rate: f64, context_rate: u32) -> Self {
        let rate_ratio = buffer.sample_rate() as f64 / context_rate as f64;
        BufferSource {
            buffer,
            playback_rate,
            rate_ratio,
            position: 0.0,
            state: SourceState::Unstarted,
        }
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn channel_count(&self) -> usize {
        self.buffer.channel_count()
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.playback_rate = rate;
    }

    /// Begin playback `offset_secs` into the buffer. A source starts once.
    pub fn start(&mut self, offset_secs: f64) -> Result<()> {
        if self.state != SourceState::Unstarted {
            return Err(PlayerError::InvalidState("source already started"));
        }
        self.position = offset_secs.max(0.0) * self.buffer.sample_rate() as f64;
        self.state = if self.position >= self.buffer.len() as f64 {
            SourceState::Ended
        } else {
            SourceState::Playing
        };
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.state == SourceState::Playing {
            self.state = SourceState::Stopped;
        }
    }

    /// Render `frames` frames into `out` (one slice per buffer channel).
    /// Frames past the end, or while not playing, are silent.
    pub fn render(&mut self, out: &mut [Vec<f32>], frames: usize) {
        let len = self.buffer.len();
        let step = self.playback_rate * self.rate_ratio;

        for i in 0..frames {
            if self.state != SourceState::Playing {
                for ch in out.iter_mut() {
                    ch[i] = 0.0;
                }
                continue;
            }

            let idx = self.position as usize;
            if idx >= len {
                self.state = SourceState::Ended;
                for ch in out.iter_mut() {
                    ch[i] = 0.0;
                }
                continue;
            }

            let frac = (self.position - idx as f64) as f32;
            for (ch, data) in out.iter_mut().zip(self.buffer.channels()) {
                let next = if idx + 1 < len { data[idx + 1] } else { 0.0 };
                ch[i] = if frac == 0.0 {
                    data[idx]
                } else {
                    data[idx] * (1.0 - frac) + next * frac
                };
            }
            self.position += step;
        }

        if self.state == SourceState::Playing && self.position as usize >= len {
            self.state = SourceState::Ended;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, rate: u32) -> Rc<AudioBuffer> {
        let data: Vec<f32> = (0..frames).map(|i| i as f32 / frames as f32).collect();
        Rc::new(AudioBuffer::from_channels(vec![data], rate).unwrap())
    }

    fn pull(src: &mut BufferSource, frames: usize) -> Vec<f32> {
        let mut out = vec![vec![0.0; frames]; src.channel_count()];
        src.render(&mut out, frames);
        out.swap_remove(0)
    }

    #[test]
    fn unity_rate_reproduces_buffer() {
        let buf = ramp(100, 8000);
        let mut src = BufferSource::new(buf.clone(), 1.0, 8000);
        src.start(0.0).unwrap();
        let out = pull(&mut src, 100);
        assert_eq!(out.as_slice(), buf.channel(0));
        assert_eq!(src.state(), SourceState::Ended);
    }

    #[test]
    fn half_rate_interpolates_and_lasts_twice_as_long() {
        let buf = ramp(100, 8000);
        let mut src = BufferSource::new(buf.clone(), 0.5, 8000);
        src.start(0.0).unwrap();
        let out = pull(&mut src, 200);
        assert_eq!(out[0], buf.channel(0)[0]);
        let mid = (buf.channel(0)[10] + buf.channel(0)[11]) / 2.0;
        assert!((out[21] - mid).abs() < 1e-6);
        assert_eq!(src.state(), SourceState::Ended);
    }

    #[test]
    fn start_offset_skips_ahead() {
        let buf = ramp(8000, 8000);
        let mut src = BufferSource::new(buf.clone(), 1.0, 8000);
        src.start(0.5).unwrap();
        let out = pull(&mut src, 4);
        assert_eq!(out, buf.channel(0)[4000..4004].to_vec());
    }

    #[test]
    fn double_start_is_rejected() {
        let mut src = BufferSource::new(ramp(10, 8000), 1.0, 8000);
        src.start(0.0).unwrap();
        assert!(matches!(src.start(0.0), Err(PlayerError::InvalidState(_))));
    }

    #[test]
    fn unstarted_and_stopped_sources_are_silent() {
        let mut src = BufferSource::new(ramp(10, 8000), 1.0, 8000);
        assert!(pull(&mut src, 5).iter().all(|&s| s == 0.0));
        src.start(0.0).unwrap();
        src.stop();
        assert!(pull(&mut src, 5).iter().all(|&s| s == 0.0));
        assert_eq!(src.state(), SourceState::Stopped);
    }

    #[test]
    fn offset_past_end_ends_immediately() {
        let mut src = BufferSource::new(ramp(10, 8000), 1.0, 8000);
        src.start(1.0).unwrap();
        assert_eq!(src.state(), SourceState::Ended);
    }

    #[test]
    fn buffer_rate_is_resampled_to_context_rate() {
        let buf = ramp(100, 8000);
        let mut src = BufferSource::new(buf, 1.0, 16000);
        src.start(0.0).unwrap();
        let out = pull(&mut src, 200);
        assert_eq!(out[198], 0.99);
        assert_eq!(src.state(), SourceState::Ended);
    }
}
