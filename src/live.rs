//! Live graph: the audible preview.
//!
//! Holds at most one materialized [`Graph`] on a realtime context. The host
//! pulls frames from it (an AudioWorklet callback in the browser); each pull
//! advances the context clock. Rebuilding drops the old graph before the new
//! one exists, so there is never more than one path to the output.

use std::collections::VecDeque;
use std::rc::Rc;

use crate::buffer::AudioBuffer;
use crate::context::{AudioContext, RENDER_QUANTUM};
use crate::dsp::graph::{Graph, Topology};
use crate::dsp::source::SourceState;
use crate::error::{PlayerError, Result};
use crate::params::EffectParams;

/// Frames kept by the output tap (one analyser FFT window).
pub const TAP_SIZE: usize = 256;

/// Ring of the most recent output frames, summed to mono, for a visualizer.
#[derive(Debug, Clone)]
pub struct OutputTap {
    frames: VecDeque<f32>,
}

impl Default for OutputTap {
    fn default() -> Self {
        Self {
            frames: VecDeque::from(vec![0.0; TAP_SIZE]),
        }
    }
}

impl OutputTap {
    fn push(&mut self, channels: &[Vec<f32>], frames: usize) {
        let scale = 1.0 / channels.len().max(1) as f32;
        for i in 0..frames {
            let mono: f32 = channels.iter().map(|c| c[i]).sum::<f32>() * scale;
            if self.frames.len() == TAP_SIZE {
                self.frames.pop_front();
            }
            self.frames.push_back(mono);
        }
    }

    /// Oldest-first copy of the tap.
    pub fn snapshot(&self) -> Vec<f32> {
        self.frames.iter().copied().collect()
    }
}

#[derive(Debug)]
pub struct LiveGraph {
    context: Rc<AudioContext>,
    graph: Option<Graph>,
    /// Rendered quantum not yet handed to the host.
    pending: Vec<Vec<f32>>,
    pending_pos: usize,
    tap: OutputTap,
}

impl LiveGraph {
    pub fn new(context: Rc<AudioContext>) -> Self {
        LiveGraph {
            context,
            graph: None,
            pending: vec![vec![0.0; RENDER_QUANTUM]; 2],
            pending_pos: RENDER_QUANTUM,
            tap: OutputTap::default(),
        }
    }

    pub fn context(&self) -> &Rc<AudioContext> {
        &self.context
    }

    /// Tear down the current graph and build a fresh one from `params`.
    pub fn rebuild(&mut self, source: &Rc<AudioBuffer>, params: &EffectParams) -> Result<()> {
        self.teardown();
        let topology = Topology::from_params(params);
        let graph = Graph::materialize(&topology, Rc::clone(source), &self.context)?;
        self.pending = vec![vec![0.0; RENDER_QUANTUM]; graph.output_channels()];
        self.pending_pos = RENDER_QUANTUM;
        self.graph = Some(graph);
        log::debug!("live graph rebuilt at {:.3}s", self.context.current_time());
        Ok(())
    }

    /// Stop and drop the current graph, if any.
    pub fn teardown(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            graph.stop();
        }
    }

    /// Number of source-to-output paths currently connected (0 or 1).
    pub fn active_paths(&self) -> usize {
        usize::from(self.graph.is_some())
    }

    pub fn output_channels(&self) -> usize {
        self.pending.len()
    }

    /// Start the built graph's source at `offset_secs`.
    pub fn start(&mut self, offset_secs: f64) -> Result<()> {
        match self.graph.as_mut() {
            Some(graph) => graph.start(offset_secs),
            None => Err(PlayerError::InvalidState("live graph is not built")),
        }
    }

    pub fn stop(&mut self) {
        if let Some(graph) = self.graph.as_mut() {
            graph.stop();
        }
    }

    pub fn source_state(&self) -> Option<SourceState> {
        self.graph.as_ref().map(Graph::source_state)
    }

    pub fn is_playing(&self) -> bool {
        self.source_state() == Some(SourceState::Playing)
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        if let Some(graph) = self.graph.as_mut() {
            graph.set_playback_rate(rate);
        }
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        if let Some(graph) = self.graph.as_mut() {
            graph.set_master_gain(gain);
        }
    }

    pub fn set_bass_gain_db(&mut self, gain_db: f64) {
        if let Some(graph) = self.graph.as_mut() {
            graph.set_bass_gain_db(gain_db);
        }
    }

    /// Apply a new reverb mix to the connected dry/wet gains.
    pub fn set_reverb_mix(&mut self, params: &EffectParams) {
        if let Some(graph) = self.graph.as_mut() {
            graph.set_reverb_gains(params.dry_gain(), params.wet_gain());
        }
    }

    pub fn reverb_gains(&self) -> Option<(f32, f32)> {
        self.graph.as_ref().and_then(Graph::reverb_gains)
    }

    /// Pull `frames` frames of planar output. Silence when nothing is built.
    pub fn render(&mut self, frames: usize) -> Vec<Vec<f32>> {
        let mut out = vec![Vec::with_capacity(frames); self.pending.len()];
        let mut filled = 0;
        while filled < frames {
            if self.pending_pos == RENDER_QUANTUM {
                self.pull_quantum();
            }
            let take = (frames - filled).min(RENDER_QUANTUM - self.pending_pos);
            let range = self.pending_pos..self.pending_pos + take;
            for (dst, src) in out.iter_mut().zip(&self.pending) {
                dst.extend_from_slice(&src[range.clone()]);
            }
            self.pending_pos += take;
            filled += take;
        }
        self.tap.push(&out, frames);
        out
    }

    fn pull_quantum(&mut self) {
        match self.graph.as_mut() {
            Some(graph) => graph.process_quantum(&mut self.pending),
            None => {
                for ch in &mut self.pending {
                    ch.fill(0.0);
                }
                self.context.advance(RENDER_QUANTUM);
            }
        }
        self.pending_pos = 0;
    }

    pub fn tap(&self) -> &OutputTap {
        &self.tap
    }
}
