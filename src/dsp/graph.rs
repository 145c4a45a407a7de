//! Effect graph — one topology shared by live playback and offline render.
//!
//! A [`Topology`] is an immutable, ordered description of the chain:
//!
//! ```text
//! source -> bass shelf -> { dry gain, convolver -> wet gain } -> master gain -> destination
//! ```
//!
//! [`Graph::materialize`] turns it into processing stages bound to a
//! context. Rebuilding means materializing a new graph and dropping the
//! old one; stages are never rewired in place.

use std::fmt;
use std::rc::Rc;

use crate::buffer::AudioBuffer;
use crate::context::{AudioContext, ContextMode, RENDER_QUANTUM};
use crate::error::{PlayerError, Result};
use crate::params::{BASS_SHELF_FREQUENCY, EffectParams, IMPULSE_DECAY, IMPULSE_DURATION_SECS};

use super::convolver::Convolver;
use super::filter::BiquadFilter;
use super::impulse;
use super::source::{BufferSource, SourceState};

/// One stage of the chain, with the parameter values it is built with.
#[derive(Debug, Clone, PartialEq)]
pub enum StageDescriptor {
    Source { playback_rate: f64 },
    BassShelf { frequency: f64, gain_db: f64 },
    Reverb { dry_gain: f32, wet_gain: f32, impulse_secs: f64, impulse_decay: f64 },
    MasterGain { gain: f32 },
}

/// Ordered stage list. Built from a parameter snapshot; never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    stages: Vec<StageDescriptor>,
}

impl Topology {
    pub fn from_params(params: &EffectParams) -> Self {
        Topology {
            stages: vec![
                StageDescriptor::Source { playback_rate: params.speed },
                StageDescriptor::BassShelf {
                    frequency: BASS_SHELF_FREQUENCY,
                    gain_db: params.bass_gain_db,
                },
                StageDescriptor::Reverb {
                    dry_gain: params.dry_gain(),
                    wet_gain: params.wet_gain(),
                    impulse_secs: IMPULSE_DURATION_SECS,
                    impulse_decay: IMPULSE_DECAY,
                },
                StageDescriptor::MasterGain { gain: params.master_gain() },
            ],
        }
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }
}

/// Dry/wet split and recombine around the convolver.
struct ReverbStage {
    dry_gain: f32,
    wet_gain: f32,
    convolver: Convolver,
    /// Skip convolution while the wet path is muted. Only safe when
    /// parameters cannot change mid-render.
    skip_when_dry: bool,
    wet: [Vec<f32>; 2],
}

impl ReverbStage {
    /// Mix `bus` (C channels) into max(C, 2) channels of dry + wet.
    fn process(&mut self, bus: &mut Vec<Vec<f32>>) {
        let n = RENDER_QUANTUM;
        let run_wet = !(self.skip_when_dry && self.wet_gain == 0.0);
        if run_wet {
            let [wet_l, wet_r] = &mut self.wet;
            if self.convolver.input_channels() == 1 {
                self.convolver.process(&[bus[0].as_slice()], wet_l, wet_r);
            } else {
                self.convolver.process(&[bus[0].as_slice(), bus[1].as_slice()], wet_l, wet_r);
            }
        } else {
            self.wet[0].fill(0.0);
            self.wet[1].fill(0.0);
        }

        if bus.len() == 1 {
            let up = bus[0].clone();
            bus.push(up);
        }
        for (k, ch) in bus.iter_mut().enumerate() {
            let wet = self.wet.get(k);
            for i in 0..n {
                let w = wet.map_or(0.0, |w| w[i]);
                ch[i] = ch[i] * self.dry_gain + w * self.wet_gain;
            }
        }
    }
}

enum Stage {
    Source(BufferSource),
    BassShelf(Vec<BiquadFilter>),
    Reverb(ReverbStage),
    Gain(f32),
}

/// A materialized, runnable effect graph.
pub struct Graph {
    context: Rc<AudioContext>,
    stages: Vec<Stage>,
    output_channels: usize,
    bus: Vec<Vec<f32>>,
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("stages", &self.stages.len())
            .field("output_channels", &self.output_channels)
            .field("source_state", &self.source_state())
            .finish()
    }
}

impl Graph {
    /// Build the stages described by `topology` for `source` on `context`.
    /// Each call generates a fresh reverb impulse.
    pub fn materialize(
        topology: &Topology,
        source: Rc<AudioBuffer>,
        context: &Rc<AudioContext>,
    ) -> Result<Self> {
        context.ensure_running()?;
        let rate = context.sample_rate();
        let channels = source.channel_count();
        let offline = context.mode() == ContextMode::Offline;

        let mut source = Some(source);
        let mut stages = Vec::with_capacity(topology.stages().len());
        for (i, desc) in topology.stages().iter().enumerate() {
            let stage = match *desc {
                StageDescriptor::Source { playback_rate } => {
                    let buffer = match (i, source.take()) {
                        (0, Some(buffer)) => buffer,
                        _ => return Err(PlayerError::InvalidState("source must be the first stage")),
                    };
                    Stage::Source(BufferSource::new(buffer, playback_rate, rate))
                }
                StageDescriptor::BassShelf { frequency, gain_db } => Stage::BassShelf(
                    (0..channels)
                        .map(|_| BiquadFilter::lowshelf(rate as f64, frequency, gain_db))
                        .collect(),
                ),
                StageDescriptor::Reverb { dry_gain, wet_gain, impulse_secs, impulse_decay } => {
                    let ir = impulse::generate(rate, impulse_secs, impulse_decay, false)?;
                    Stage::Reverb(ReverbStage {
                        dry_gain,
                        wet_gain,
                        convolver: Convolver::new(&ir, channels.min(2), RENDER_QUANTUM, true)?,
                        skip_when_dry: offline,
                        wet: [vec![0.0; RENDER_QUANTUM], vec![0.0; RENDER_QUANTUM]],
                    })
                }
                StageDescriptor::MasterGain { gain } => Stage::Gain(gain),
            };
            stages.push(stage);
        }
        if source.is_some() {
            return Err(PlayerError::InvalidState("topology has no source stage"));
        }

        log::debug!(
            "materialized {} stage graph ({channels} ch, {rate} Hz, {:?})",
            stages.len(),
            context.mode()
        );

        Ok(Graph {
            context: Rc::clone(context),
            stages,
            output_channels: channels,
            bus: vec![vec![0.0; RENDER_QUANTUM]; channels],
        })
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    fn source(&self) -> Option<&BufferSource> {
        self.stages.iter().find_map(|s| match s {
            Stage::Source(src) => Some(src),
            _ => None,
        })
    }

    fn source_mut(&mut self) -> Option<&mut BufferSource> {
        self.stages.iter_mut().find_map(|s| match s {
            Stage::Source(src) => Some(src),
            _ => None,
        })
    }

    pub fn source_state(&self) -> SourceState {
        self.source().map_or(SourceState::Ended, |s| s.state())
    }

    /// Start the source `offset_secs` into the buffer.
    pub fn start(&mut self, offset_secs: f64) -> Result<()> {
        self.context.ensure_running()?;
        match self.source_mut() {
            Some(src) => src.start(offset_secs),
            None => Err(PlayerError::InvalidState("graph has no source")),
        }
    }

    pub fn stop(&mut self) {
        if let Some(src) = self.source_mut() {
            src.stop();
        }
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        if let Some(src) = self.source_mut() {
            src.set_playback_rate(rate);
        }
    }

    pub fn set_bass_gain_db(&mut self, gain_db: f64) {
        for stage in &mut self.stages {
            if let Stage::BassShelf(filters) = stage {
                for f in filters.iter_mut() {
                    f.set_gain_db(gain_db);
                }
            }
        }
    }

    /// Set dry/wet gains on the already-built reverb stage.
    pub fn set_reverb_gains(&mut self, dry_gain: f32, wet_gain: f32) {
        for stage in &mut self.stages {
            if let Stage::Reverb(reverb) = stage {
                reverb.dry_gain = dry_gain;
                reverb.wet_gain = wet_gain;
            }
        }
    }

    pub fn reverb_gains(&self) -> Option<(f32, f32)> {
        self.stages.iter().find_map(|s| match s {
            Stage::Reverb(r) => Some((r.dry_gain, r.wet_gain)),
            _ => None,
        })
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        for stage in &mut self.stages {
            if let Stage::Gain(g) = stage {
                *g = gain;
            }
        }
    }

    /// Render one quantum into `out` (`output_channels` slices of at least
    /// [`RENDER_QUANTUM`] frames) and advance the context clock.
    pub fn process_quantum(&mut self, out: &mut [Vec<f32>]) {
        let n = RENDER_QUANTUM;
        self.bus.truncate(self.output_channels);
        for ch in &mut self.bus {
            ch.fill(0.0);
        }

        for stage in &mut self.stages {
            match stage {
                Stage::Source(src) => src.render(&mut self.bus, n),
                Stage::BassShelf(filters) => {
                    for (f, ch) in filters.iter_mut().zip(self.bus.iter_mut()) {
                        f.process_block(&mut ch[..n]);
                    }
                }
                Stage::Reverb(reverb) => reverb.process(&mut self.bus),
                Stage::Gain(g) => {
                    for ch in &mut self.bus {
                        for s in &mut ch[..n] {
                            *s *= *g;
                        }
                    }
                }
            }
        }

        // Destination: fold the stereo wet mix back onto a mono output.
        if self.output_channels == 1 && self.bus.len() == 2 {
            for i in 0..n {
                out[0][i] = 0.5 * (self.bus[0][i] + self.bus[1][i]);
            }
        } else {
            for (dst, ch) in out.iter_mut().zip(&self.bus) {
                dst[..n].copy_from_slice(&ch[..n]);
            }
        }

        self.context.advance(n);
    }
}
