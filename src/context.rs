//! The clock and lifecycle every graph runs against.
//!
//! A realtime context advances as the host pulls audio out of the live
//! graph; an offline context advances as fast as the renderer can go.
//! Both are owned explicitly: created by the session (or the renderer) and
//! closed on teardown. Nothing here is global.

use std::cell::Cell;
use std::rc::Rc;

use crate::error::{PlayerError, Result};

/// Frames processed per graph pull, as in WebAudio.
pub const RENDER_QUANTUM: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    Realtime,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    Closed,
}

#[derive(Debug)]
pub struct AudioContext {
    sample_rate: u32,
    mode: ContextMode,
    frames: Cell<u64>,
    state: Cell<ContextState>,
}

impl AudioContext {
    /// Create a realtime context at the host's output rate.
    pub fn realtime(sample_rate: u32) -> Result<Rc<Self>> {
        Self::with_mode(sample_rate, ContextMode::Realtime)
    }

    /// Create an offline context.
    pub fn offline(sample_rate: u32) -> Result<Rc<Self>> {
        Self::with_mode(sample_rate, ContextMode::Offline)
    }

    fn with_mode(sample_rate: u32, mode: ContextMode) -> Result<Rc<Self>> {
        if sample_rate == 0 {
            return Err(PlayerError::InvalidState("context sample rate is zero"));
        }
        log::debug!("audio context opened ({mode:?}, {sample_rate} Hz)");
        Ok(Rc::new(AudioContext {
            sample_rate,
            mode,
            frames: Cell::new(0),
            state: Cell::new(ContextState::Running),
        }))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    pub fn state(&self) -> ContextState {
        self.state.get()
    }

    /// Seconds of audio processed since the context opened.
    pub fn current_time(&self) -> f64 {
        self.frames.get() as f64 / self.sample_rate as f64
    }

    /// Advance the clock after a graph pull.
    pub fn advance(&self, frames: usize) {
        self.frames.set(self.frames.get() + frames as u64);
    }

    /// Release the context. Idempotent.
    pub fn close(&self) {
        if self.state.replace(ContextState::Closed) == ContextState::Running {
            log::debug!("audio context closed at {:.3}s", self.current_time());
        }
    }

    pub fn ensure_running(&self) -> Result<()> {
        match self.state.get() {
            ContextState::Running => Ok(()),
            ContextState::Closed => Err(PlayerError::InvalidState("audio context is closed")),
        }
    }
}
