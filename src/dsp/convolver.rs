//! Convolution reverb — uniformly partitioned overlap-save FFT convolution.
//!
//! The impulse is split into partitions of one render quantum; each block
//! of input is transformed once, pushed into a frequency-domain delay line,
//! and multiplied against every partition spectrum. Block size equals the
//! partition size, so the convolver adds no latency as long as it is fed
//! whole quanta.
//!
//! Channel handling follows WebAudio's `ConvolverNode` with a stereo
//! impulse: mono input is convolved with both impulse channels, stereo
//! input channel-by-channel. Output is always stereo.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::buffer::AudioBuffer;
use crate::error::{PlayerError, Result};

// WebAudio impulse normalization constants.
const GAIN_CALIBRATION_DB: f32 = -58.0;
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44100.0;
const MIN_POWER: f32 = 0.000125;

const ZERO: Complex<f32> = Complex { re: 0.0, im: 0.0 };

/// Scale applied to an impulse so that wet level roughly matches dry level,
/// as WebAudio does when `ConvolverNode.normalize` is true.
pub fn normalization_scale(impulse: &AudioBuffer) -> f32 {
    let channels = impulse.channel_count();
    let len = impulse.len();
    let sum_sq: f64 = impulse
        .channels()
        .iter()
        .flat_map(|c| c.iter())
        .map(|&s| s as f64 * s as f64)
        .sum();

    let mut power = (sum_sq / (channels * len.max(1)) as f64).sqrt() as f32;
    if !power.is_finite() || power < MIN_POWER {
        power = MIN_POWER;
    }

    let mut scale = 1.0 / power;
    scale *= 10.0_f32.powf(GAIN_CALIBRATION_DB * 0.05);
    scale *= GAIN_CALIBRATION_SAMPLE_RATE / impulse.sample_rate() as f32;
    if channels == 4 {
        scale *= 0.5;
    }
    scale
}

/// One input channel's sliding window and frequency-domain delay line.
struct Lane {
    window: Vec<f32>,
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_pos: usize,
}

impl Lane {
    fn new(partitions: usize, fft_size: usize, bins: usize) -> Self {
        Lane {
            window: vec![0.0; fft_size],
            fdl: vec![vec![ZERO; bins]; partitions],
            fdl_pos: 0,
        }
    }
}

/// Stereo-impulse convolver operating on fixed-size blocks.
///
/// Real-input transforms: every spectrum holds `block_size + 1` bins.
pub struct Convolver {
    block_size: usize,
    /// Partition spectra for the left and right impulse channels.
    partitions: [Vec<Vec<Complex<f32>>>; 2],
    lanes: Vec<Lane>,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    time: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    acc: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

fn fft_failure(e: realfft::FftError) -> PlayerError {
    PlayerError::RenderFailure(format!("convolver fft: {e}"))
}

impl Convolver {
    /// Prepare a convolver for `input_channels` (1 or 2) against a stereo
    /// impulse. `normalize` applies [`normalization_scale`].
    pub fn new(impulse: &AudioBuffer, input_channels: usize, block_size: usize, normalize: bool) -> Result<Self> {
        let fft_size = block_size * 2;
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);
        let mut scratch = vec![ZERO; forward.get_scratch_len().max(inverse.get_scratch_len())];
        let mut time = forward.make_input_vec();

        let scale = if normalize { normalization_scale(impulse) } else { 1.0 };
        let right_index = if impulse.channel_count() > 1 { 1 } else { 0 };
        let mut split = |ir: &[f32]| -> Result<Vec<Vec<Complex<f32>>>> {
            ir.chunks(block_size)
                .map(|segment| {
                    time.fill(0.0);
                    for (dst, &s) in time.iter_mut().zip(segment) {
                        *dst = s * scale;
                    }
                    let mut spectrum = forward.make_output_vec();
                    forward
                        .process_with_scratch(&mut time, &mut spectrum, &mut scratch)
                        .map_err(fft_failure)?;
                    Ok(spectrum)
                })
                .collect()
        };
        let partitions = [split(impulse.channel(0))?, split(impulse.channel(right_index))?];

        let bins = forward.complex_len();
        let count = partitions[0].len();
        let lanes = (0..input_channels.clamp(1, 2))
            .map(|_| Lane::new(count, fft_size, bins))
            .collect();

        Ok(Convolver {
            block_size,
            partitions,
            lanes,
            time,
            spectrum: forward.make_output_vec(),
            acc: forward.make_output_vec(),
            forward,
            inverse,
            scratch,
        })
    }

    /// Number of input lanes (1 = mono-to-stereo, 2 = stereo).
    pub fn input_channels(&self) -> usize {
        self.lanes.len()
    }

    /// Convolve one block. `inputs` holds one slice per lane, each exactly
    /// `block_size` long; results are written to `out_left`/`out_right`.
    pub fn process(&mut self, inputs: &[&[f32]], out_left: &mut [f32], out_right: &mut [f32]) {
        let b = self.block_size;
        debug_assert_eq!(inputs.len(), self.lanes.len());
        if self.partitions[0].is_empty() {
            out_left[..b].fill(0.0);
            out_right[..b].fill(0.0);
            return;
        }

        for (lane, input) in self.lanes.iter_mut().zip(inputs) {
            lane.window.copy_within(b.., 0);
            lane.window[b..].copy_from_slice(&input[..b]);

            // Buffer lengths are fixed at construction, so the transforms cannot fail.
            self.time.copy_from_slice(&lane.window);
            self.forward
                .process_with_scratch(&mut self.time, &mut self.spectrum, &mut self.scratch)
                .ok();

            let count = lane.fdl.len();
            lane.fdl_pos = (lane.fdl_pos + count - 1) % count;
            lane.fdl[lane.fdl_pos].copy_from_slice(&self.spectrum);
        }

        let mono = self.lanes.len() == 1;
        for (side, out) in [out_left, out_right].into_iter().enumerate() {
            let lane = if mono { &self.lanes[0] } else { &self.lanes[side] };
            let count = lane.fdl.len();

            self.acc.fill(ZERO);
            for (p, h) in self.partitions[side].iter().enumerate() {
                let x = &lane.fdl[(lane.fdl_pos + p) % count];
                for ((acc, &xk), &hk) in self.acc.iter_mut().zip(x).zip(h) {
                    *acc += xk * hk;
                }
            }
            // DC and Nyquist bins of a real signal are real.
            let last = self.acc.len() - 1;
            self.acc[0].im = 0.0;
            self.acc[last].im = 0.0;
            self.inverse
                .process_with_scratch(&mut self.acc, &mut self.time, &mut self.scratch)
                .ok();

            let norm = 1.0 / (2 * b) as f32;
            for (dst, &s) in out[..b].iter_mut().zip(&self.time[b..]) {
                *dst = s * norm;
            }
        }
    }
}
