//! Low-shelf biquad — matches WebAudio BiquadFilterNode "lowshelf" coefficients.

use std::f64::consts::PI;

/// A low-shelf biquad IIR filter (2nd order, shelf slope S = 1).
///
/// Implements the standard Direct Form II Transposed structure.
/// Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson),
/// in the form WebAudio uses for `lowshelf`.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub frequency: f64,
    pub gain_db: f64,

    // Coefficients
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State (Direct Form II Transposed)
    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn lowshelf(sample_rate: f64, frequency: f64, gain_db: f64) -> Self {
        let mut f = BiquadFilter {
            frequency,
            gain_db,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        let nyquist = self.sample_rate / 2.0;
        let normalized = (self.frequency / nyquist).clamp(0.0, 1.0);
        let a = 10.0_f64.powf(self.gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = if normalized == 1.0 {
            // Shelf covers the whole band: a plain gain of A^2.
            (a * a, 0.0, 0.0, 1.0, 0.0, 0.0)
        } else if normalized > 0.0 {
            let w0 = PI * normalized;
            let alpha = 0.5 * w0.sin() * 2.0_f64.sqrt();
            let k = w0.cos();
            let k2 = 2.0 * a.sqrt() * alpha;
            let a_plus_one = a + 1.0;
            let a_minus_one = a - 1.0;

            let b0 = a * (a_plus_one - a_minus_one * k + k2);
            let b1 = 2.0 * a * (a_minus_one - a_plus_one * k);
            let b2 = a * (a_plus_one - a_minus_one * k - k2);
            let a0 = a_plus_one + a_minus_one * k + k2;
            let a1 = -2.0 * (a_minus_one + a_plus_one * k);
            let a2 = a_plus_one + a_minus_one * k - k2;
            (b0, b1, b2, a0, a1, a2)
        } else {
            // Zero corner: nothing below it, unity response.
            (1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
        };

        // Normalize by a0
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        self.dirty = false;
    }

    /// Process a single sample through the filter.
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }

        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    /// Filter a block in place.
    pub fn process_block(&mut self, block: &mut [f32]) {
        for s in block.iter_mut() {
            *s = self.process(*s as f64) as f32;
        }
    }

    /// Set shelf gain and mark coefficients dirty.
    pub fn set_gain_db(&mut self, gain_db: f64) {
        self.gain_db = gain_db;
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_state_amplitude(f: &mut BiquadFilter, freq: f64, sample_rate: f64) -> f64 {
        let mut max_out = 0.0_f64;
        for i in 0..8820 {
            let t = i as f64 / sample_rate;
            let out = f.process((2.0 * PI * freq * t).sin());
            if i > 4410 {
                max_out = max_out.max(out.abs());
            }
        }
        max_out
    }

    #[test]
    fn zero_gain_is_transparent() {
        let mut f = BiquadFilter::lowshelf(44100.0, 200.0, 0.0);
        for i in 0..1000 {
            let input = ((i * 7919) % 2001) as f64 / 1000.0 - 1.0;
            let out = f.process(input);
            assert!((out - input).abs() < 1e-12, "sample {i}: {out} != {input}");
        }
    }

    #[test]
    fn boost_raises_dc_by_gain() {
        let mut f = BiquadFilter::lowshelf(44100.0, 200.0, 10.0);
        let mut output = 0.0;
        for _ in 0..20000 {
            output = f.process(1.0);
        }
        let expected = 10.0_f64.powf(10.0 / 20.0);
        assert!(
            (output - expected).abs() < 1e-3,
            "DC gain should be {expected}, got {output}"
        );
    }

    #[test]
    fn cut_leaves_high_frequencies_alone() {
        let mut f = BiquadFilter::lowshelf(44100.0, 200.0, -10.0);
        let amp = steady_state_amplitude(&mut f, 8000.0, 44100.0);
        assert!((amp - 1.0).abs() < 0.02, "8kHz should pass at unity, got {amp}");
    }

    #[test]
    fn cut_attenuates_low_frequencies() {
        let mut f = BiquadFilter::lowshelf(44100.0, 200.0, -10.0);
        let amp = steady_state_amplitude(&mut f, 30.0, 44100.0);
        assert!(amp < 0.5, "30Hz should be cut by ~10dB, got {amp}");
    }

    #[test]
    fn gain_change_takes_effect_on_next_sample() {
        let mut f = BiquadFilter::lowshelf(44100.0, 200.0, 0.0);
        f.set_gain_db(6.0);
        let mut output = 0.0;
        for _ in 0..20000 {
            output = f.process(1.0);
        }
        assert!(output > 1.9, "expected ~+6dB at DC, got {output}");
    }

    #[test]
    fn filter_output_finite() {
        let mut f = BiquadFilter::lowshelf(8000.0, 200.0, 10.0);
        for i in 0..10000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            let out = f.process(input);
            assert!(out.is_finite(), "Filter output not finite at sample {i}");
        }
    }
}
