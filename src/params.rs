//! Effect parameters and render options shared by the live and offline graphs.
//!
//! Values arrive from the UI as JS objects or JSON (camelCase field names).
//! Every setter snaps to the slider grid and clamps to range, so a graph
//! never sees an out-of-range value.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Corner frequency of the bass low-shelf filter, in Hz.
pub const BASS_SHELF_FREQUENCY: f64 = 200.0;
/// Length of the synthetic reverb impulse, in seconds.
pub const IMPULSE_DURATION_SECS: f64 = 3.0;
/// Decay exponent of the synthetic reverb impulse envelope.
pub const IMPULSE_DECAY: f64 = 2.0;
/// Transport skip distance, in seconds.
pub const SKIP_SECONDS: f64 = 10.0;

/// Inclusive range and step of one slider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParamRange {
    /// Snap `value` to the nearest step and clamp it into range.
    /// NaN falls back to `fallback`.
    pub fn snap(&self, value: f64, fallback: f64) -> f64 {
        if value.is_nan() {
            return fallback;
        }
        let steps = ((value - self.min) / self.step).round();
        let snapped = self.min + steps * self.step;
        // Two decimals is enough for every grid in use (0.05 is the finest).
        ((snapped * 100.0).round() / 100.0).clamp(self.min, self.max)
    }
}

pub const SPEED: ParamRange = ParamRange { min: 0.5, max: 1.5, step: 0.05 };
pub const VOLUME: ParamRange = ParamRange { min: 0.0, max: 100.0, step: 1.0 };
pub const REVERB_MIX: ParamRange = ParamRange { min: 0.0, max: 100.0, step: 1.0 };
pub const BASS_GAIN_DB: ParamRange = ParamRange { min: -10.0, max: 10.0, step: 1.0 };

/// The four user-facing effect controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectParams {
    /// Playback-rate multiplier (pitch follows speed).
    pub speed: f64,
    /// Master volume, 0..=100.
    pub volume: f64,
    /// Reverb wet share, 0..=100.
    pub reverb_mix: f64,
    /// Low-shelf gain in dB.
    pub bass_gain_db: f64,
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            speed: 1.0,
            volume: 50.0,
            reverb_mix: 0.0,
            bass_gain_db: 0.0,
        }
    }
}

impl EffectParams {
    /// Parse from a JSON object; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: EffectParams = serde_json::from_str(json)?;
        Ok(params.normalized())
    }

    /// Copy with every field snapped and clamped to its slider.
    pub fn normalized(self) -> Self {
        let d = Self::default();
        Self {
            speed: SPEED.snap(self.speed, d.speed),
            volume: VOLUME.snap(self.volume, d.volume),
            reverb_mix: REVERB_MIX.snap(self.reverb_mix, d.reverb_mix),
            bass_gain_db: BASS_GAIN_DB.snap(self.bass_gain_db, d.bass_gain_db),
        }
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.speed = SPEED.snap(speed, self.speed);
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.volume = VOLUME.snap(volume, self.volume);
    }

    pub fn set_reverb_mix(&mut self, mix: f64) {
        self.reverb_mix = REVERB_MIX.snap(mix, self.reverb_mix);
    }

    pub fn set_bass_gain_db(&mut self, gain_db: f64) {
        self.bass_gain_db = BASS_GAIN_DB.snap(gain_db, self.bass_gain_db);
    }

    /// Master gain, volume mapped linearly onto 0.0..=1.0.
    pub fn master_gain(&self) -> f32 {
        (self.volume / 100.0) as f32
    }

    /// Gain of the unprocessed path.
    pub fn dry_gain(&self) -> f32 {
        1.0 - self.wet_gain()
    }

    /// Gain of the convolution path.
    pub fn wet_gain(&self) -> f32 {
        (self.reverb_mix / 100.0) as f32
    }
}

/// How long the offline render runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderLength {
    /// Same frame count as the source; slowed audio is cut at the source length.
    #[default]
    Source,
    /// Source length divided by speed, so the whole track is kept.
    Stretched,
}

/// Options for the offline render.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    pub length: RenderLength,
}

impl RenderOptions {
    /// Output frame count for a source of `source_frames` played at `speed`.
    pub fn output_frames(&self, source_frames: usize, speed: f64) -> usize {
        match self.length {
            RenderLength::Source => source_frames,
            RenderLength::Stretched => (source_frames as f64 / speed).ceil() as usize,
        }
    }
}
