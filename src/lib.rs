pub mod buffer;
pub mod context;
pub mod decode;
pub mod dsp;
pub mod error;
pub mod live;
pub mod params;
pub mod session;
pub mod transport;

use crate::buffer::AudioBuffer;
use crate::error::PlayerError;
use crate::params::{EffectParams, RenderLength, RenderOptions};
use crate::session::Session;
use crate::transport::TaskHandle;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the slowed-reverb-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: whether a picked file should be handed to the decoder.
#[wasm_bindgen]
pub fn is_supported_file(mime: &str, file_name: &str) -> bool {
    decode::is_supported(mime, file_name)
}

fn js_err(e: PlayerError) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

/// Handle for the per-animation-frame position callback.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug)]
pub struct FrameHandle(TaskHandle);

#[wasm_bindgen]
impl FrameHandle {
    #[wasm_bindgen(getter)]
    pub fn id(&self) -> f64 {
        self.0.id() as f64
    }
}

/// WASM-exposed player: one session on the page's output sample rate.
#[wasm_bindgen]
pub struct Player {
    session: Session,
}

#[wasm_bindgen]
impl Player {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: u32) -> Result<Player, JsValue> {
        let session = Session::new(sample_rate).map_err(js_err)?;
        Ok(Player { session })
    }

    /// Load interleaved samples produced by the host's `decodeAudioData`.
    pub fn load_decoded(
        &mut self,
        file_name: &str,
        samples: &[f32],
        channels: u32,
        sample_rate: u32,
    ) -> Result<(), JsValue> {
        let buffer = AudioBuffer::from_interleaved(samples, channels as usize, sample_rate).map_err(js_err)?;
        self.session.load_decoded(file_name, buffer).map_err(js_err)
    }

    /// Report that `decodeAudioData` rejected the file. Always returns the
    /// decode error; the previous track is unloaded.
    pub fn decode_failed(&mut self, file_name: &str, reason: &str) -> Result<(), JsValue> {
        self.session.fail_import(file_name, reason).map_err(js_err)
    }

    /// Decode and load an MP3 file in-process.
    #[cfg(feature = "mp3")]
    pub fn import_mp3(&mut self, file_name: &str, mime: &str, bytes: &[u8]) -> Result<(), JsValue> {
        self.session
            .import(file_name, mime, bytes, &decode::Mp3Decoder)
            .map_err(js_err)
    }

    /// Returns a frame handle when playback starts, nothing when it pauses.
    pub fn toggle_play(&mut self) -> Result<Option<FrameHandle>, JsValue> {
        let handle = self.session.toggle_play().map_err(js_err)?;
        Ok(handle.map(FrameHandle))
    }

    /// Call once per animation frame. `undefined` means the task is over.
    pub fn on_frame(&mut self, handle: &FrameHandle) -> Option<f64> {
        self.session.on_frame(handle.0)
    }

    pub fn skip_backward(&mut self) -> Result<(), JsValue> {
        self.session.skip_backward().map_err(js_err)
    }

    pub fn skip_forward(&mut self) -> Result<(), JsValue> {
        self.session.skip_forward().map_err(js_err)
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.session.set_speed(speed);
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.session.set_volume(volume);
    }

    pub fn set_reverb_mix(&mut self, mix: f64) {
        self.session.set_reverb_mix(mix);
    }

    pub fn set_bass_gain_db(&mut self, gain_db: f64) {
        self.session.set_bass_gain_db(gain_db);
    }

    /// Replace all parameters from a `{ speed, volume, reverbMix, bassGainDb }` object.
    pub fn set_params(&mut self, params: JsValue) -> Result<(), JsValue> {
        let params: EffectParams =
            serde_wasm_bindgen::from_value(params).map_err(|e| JsValue::from_str(&format!("{e}")))?;
        self.session.set_params(params);
        Ok(())
    }

    /// Same as `set_params`, from a JSON string.
    pub fn set_params_json(&mut self, json: &str) -> Result<(), JsValue> {
        let params = EffectParams::from_json(json).map_err(js_err)?;
        self.session.set_params(params);
        Ok(())
    }

    pub fn params(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.session.params()).map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    /// Render the whole slowed duration instead of the source duration.
    pub fn set_render_stretched(&mut self, stretched: bool) {
        let length = if stretched { RenderLength::Stretched } else { RenderLength::Source };
        self.session.set_render_options(RenderOptions { length });
    }

    /// Pull `frames` frames of interleaved live output (AudioWorklet callback).
    pub fn process(&mut self, frames: usize) -> Vec<f32> {
        let planar = self.session.render_frames(frames);
        let channels = planar.len();
        let mut out = vec![0.0; frames * channels];
        for (c, ch) in planar.iter().enumerate() {
            for (i, &s) in ch.iter().enumerate() {
                out[i * channels + c] = s;
            }
        }
        out
    }

    pub fn output_channels(&self) -> usize {
        self.session.live().output_channels()
    }

    /// Render the processed track and return the WAV file bytes.
    pub fn render_wav(&mut self) -> Result<Vec<u8>, JsValue> {
        let download = self.session.render_download().map_err(js_err)?;
        Ok(download.bytes)
    }

    pub fn download_file_name(&self) -> String {
        session::download_name(self.session.track_name())
    }

    /// Most recent output frames for the visualizer.
    pub fn tap(&self) -> Vec<f32> {
        self.session.tap().snapshot()
    }

    #[wasm_bindgen(getter)]
    pub fn track_name(&self) -> String {
        self.session.track_name().to_string()
    }

    #[wasm_bindgen(getter)]
    pub fn duration(&self) -> f64 {
        self.session.duration()
    }

    #[wasm_bindgen(getter)]
    pub fn current_time(&self) -> f64 {
        self.session.current_time()
    }

    #[wasm_bindgen(getter)]
    pub fn is_playing(&self) -> bool {
        self.session.is_playing()
    }

    #[wasm_bindgen(getter)]
    pub fn is_rendering(&self) -> bool {
        self.session.is_rendering()
    }

    /// Release the graph and close the context. The player is unusable after.
    pub fn teardown(&mut self) {
        self.session.teardown();
    }
}
