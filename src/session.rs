//! Player session. Owns the context, the loaded track, the parameter
//! state and the transport, and keeps the live graph in step with them.
//!
//! Ordering rules: stop before rebuild, rebuild before start, render
//! before encode. At most one offline render is in flight.

use std::rc::Rc;

use crate::buffer::AudioBuffer;
use crate::context::AudioContext;
use crate::decode::{self, Decode};
use crate::dsp::renderer;
use crate::error::{DecodeError, PlayerError, Result};
use crate::live::{LiveGraph, OutputTap};
use crate::params::{EffectParams, RenderOptions, SKIP_SECONDS};
use crate::transport::{FrameTask, PlaybackPosition, TaskHandle};

/// Track label before anything is imported.
pub const NO_TRACK: &str = "No track selected";
/// Appended to the track's base name for the downloaded file.
pub const DOWNLOAD_SUFFIX: &str = "-Slowed_And_Reverb.wav";

/// A rendered file ready to hand to the download collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Download {
    pub const MIME: &'static str = "audio/wav";
}

/// `"<name without extension>-Slowed_And_Reverb.wav"`.
pub fn download_name(track_name: &str) -> String {
    let base = match track_name.rsplit_once('.') {
        Some((base, _)) if !base.is_empty() => base,
        _ => track_name,
    };
    format!("{base}{DOWNLOAD_SUFFIX}")
}

/// Everything an offline render needs, detached from the session so the
/// host can run it as a separate step.
#[derive(Debug, Clone)]
pub struct RenderJob {
    source: Rc<AudioBuffer>,
    params: EffectParams,
    options: RenderOptions,
    file_name: String,
}

impl RenderJob {
    pub fn run(&self) -> Result<Download> {
        let bytes = renderer::render_wav(Some(&self.source), &self.params, &self.options)?;
        Ok(Download {
            file_name: self.file_name.clone(),
            bytes,
        })
    }
}

#[derive(Debug)]
pub struct Session {
    live: LiveGraph,
    params: EffectParams,
    render_options: RenderOptions,
    source: Option<Rc<AudioBuffer>>,
    track_name: String,
    position: PlaybackPosition,
    current_time: f64,
    playing: bool,
    frame_task: FrameTask,
    rendering: bool,
}

impl Session {
    /// Open a session with a realtime context at the host's output rate.
    pub fn new(sample_rate: u32) -> Result<Self> {
        let context = AudioContext::realtime(sample_rate)?;
        Ok(Session {
            live: LiveGraph::new(context),
            params: EffectParams::default(),
            render_options: RenderOptions::default(),
            source: None,
            track_name: NO_TRACK.to_string(),
            position: PlaybackPosition::default(),
            current_time: 0.0,
            playing: false,
            frame_task: FrameTask::default(),
            rendering: false,
        })
    }

    fn context(&self) -> &Rc<AudioContext> {
        self.live.context()
    }

    fn now(&self) -> f64 {
        self.context().current_time()
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn params(&self) -> &EffectParams {
        &self.params
    }

    pub fn render_options(&self) -> &RenderOptions {
        &self.render_options
    }

    pub fn set_render_options(&mut self, options: RenderOptions) {
        self.render_options = options;
    }

    pub fn track_name(&self) -> &str {
        &self.track_name
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<&Rc<AudioBuffer>> {
        self.source.as_ref()
    }

    /// Track duration in seconds (0 when nothing is loaded).
    pub fn duration(&self) -> f64 {
        self.source.as_ref().map_or(0.0, |s| s.duration())
    }

    /// Last displayed position, updated by frame ticks and transport actions.
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn position(&self) -> &PlaybackPosition {
        &self.position
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    pub fn live(&self) -> &LiveGraph {
        &self.live
    }

    pub fn tap(&self) -> &OutputTap {
        self.live.tap()
    }

    /// Pull `frames` frames of live output for the audio device.
    pub fn render_frames(&mut self, frames: usize) -> Vec<Vec<f32>> {
        self.live.render(frames)
    }

    // ── Import ──────────────────────────────────────────────

    /// Check the file type, decode it with `decoder`, and load the result.
    /// A failed decode leaves no track loaded.
    pub fn import(&mut self, file_name: &str, mime: &str, bytes: &[u8], decoder: &dyn Decode) -> Result<()> {
        if !decode::is_supported(mime, file_name) {
            log::warn!("rejected import of '{file_name}' ({mime})");
            return Err(PlayerError::UnsupportedFormat { mime: mime.to_string() });
        }
        self.context().ensure_running()?;
        self.halt();
        self.track_name = file_name.to_string();

        match decoder.decode(bytes) {
            Ok(buffer) => self.load_decoded(file_name, buffer),
            Err(e) => {
                log::warn!("decode of '{file_name}' failed: {e}");
                self.unload();
                Err(e.into())
            }
        }
    }

    /// Record that the host's decoder rejected `file_name`. Playback stops
    /// and the previous track is unloaded, as for a failed in-process decode.
    pub fn fail_import(&mut self, file_name: &str, reason: &str) -> Result<()> {
        self.halt();
        self.track_name = file_name.to_string();
        self.unload();
        log::warn!("host decode of '{file_name}' failed: {reason}");
        Err(DecodeError::Host(reason.to_string()).into())
    }

    /// Load a buffer the host already decoded.
    pub fn load_decoded(&mut self, file_name: &str, buffer: AudioBuffer) -> Result<()> {
        self.context().ensure_running()?;
        self.halt();
        if buffer.is_empty() {
            self.unload();
            return Err(PlayerError::InvalidBuffer("decoded audio has no frames".into()));
        }

        log::info!(
            "loaded '{file_name}': {:.2}s, {} ch @ {} Hz",
            buffer.duration(),
            buffer.channel_count(),
            buffer.sample_rate()
        );
        let source = Rc::new(buffer);
        self.track_name = file_name.to_string();
        self.position.reset();
        self.current_time = 0.0;
        if let Err(e) = self.live.rebuild(&source, &self.params) {
            self.unload();
            return Err(e);
        }
        self.source = Some(source);
        Ok(())
    }

    fn unload(&mut self) {
        self.live.teardown();
        self.source = None;
        self.position.reset();
        self.current_time = 0.0;
    }

    /// Stop playback without touching the loaded track.
    fn halt(&mut self) {
        if self.playing {
            self.pause_at(self.now());
        }
    }

    // ── Transport ───────────────────────────────────────────

    /// Toggle play/pause. Returns the frame-task handle when playback starts.
    pub fn toggle_play(&mut self) -> Result<Option<TaskHandle>> {
        if self.playing {
            self.pause()?;
            Ok(None)
        } else {
            self.play().map(Some)
        }
    }

    /// Rebuild the live graph and start it at the paused position.
    pub fn play(&mut self) -> Result<TaskHandle> {
        let source = self.source.clone().ok_or(PlayerError::NoSourceLoaded)?;
        if self.playing {
            return self
                .frame_task
                .active()
                .ok_or(PlayerError::InvalidState("playing without a frame task"));
        }
        if self.position.paused_at() >= self.duration() {
            self.position.seek(self.now(), 0.0);
        }

        self.live.rebuild(&source, &self.params)?;
        let offset = self.position.paused_at();
        self.live.start(offset)?;
        self.position.begin(self.now(), self.params.speed);
        self.current_time = offset;
        self.playing = true;
        log::info!("play from {offset:.3}s at {:.2}x", self.params.speed);
        Ok(self.frame_task.schedule())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.source.is_none() {
            return Err(PlayerError::NoSourceLoaded);
        }
        if self.playing {
            self.pause_at(self.now());
        }
        Ok(())
    }

    fn pause_at(&mut self, now: f64) {
        self.frame_task.cancel();
        self.live.stop();
        self.position.freeze(now);
        self.current_time = self.position.paused_at().min(self.duration());
        self.playing = false;
        log::info!("paused at {:.3}s", self.current_time);
    }

    /// Per-animation-frame position update. A stale `handle` is ignored.
    /// Returns the new displayed position.
    pub fn on_frame(&mut self, handle: TaskHandle) -> Option<f64> {
        if !self.frame_task.is_live(handle) || !self.playing {
            return None;
        }
        let now = self.now();
        let duration = self.duration();
        let t = self.position.elapsed(now);
        if t <= duration {
            self.current_time = t;
        } else {
            self.frame_task.cancel();
            self.live.stop();
            self.position.freeze(now);
            self.position.seek(now, duration);
            self.current_time = duration;
            self.playing = false;
            log::debug!("reached end of track");
        }
        Some(self.current_time)
    }

    pub fn skip_backward(&mut self) -> Result<()> {
        self.skip_by(-SKIP_SECONDS)
    }

    pub fn skip_forward(&mut self) -> Result<()> {
        self.skip_by(SKIP_SECONDS)
    }

    fn skip_by(&mut self, delta: f64) -> Result<()> {
        let source = self.source.clone().ok_or(PlayerError::NoSourceLoaded)?;
        let now = self.now();
        let from = self.position.elapsed(now).min(self.duration());
        let to = (from + delta).clamp(0.0, self.duration());

        if self.playing {
            self.live.stop();
            self.live.rebuild(&source, &self.params)?;
            self.live.start(to)?;
        }
        self.position.seek(now, to);
        self.current_time = to;
        Ok(())
    }

    // ── Parameters ──────────────────────────────────────────

    pub fn set_speed(&mut self, speed: f64) {
        self.params.set_speed(speed);
        let speed = self.params.speed;
        self.live.set_playback_rate(speed);
        let now = self.now();
        self.position.set_rate(now, speed);
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.params.set_volume(volume);
        self.live.set_master_gain(self.params.master_gain());
    }

    pub fn set_reverb_mix(&mut self, mix: f64) {
        self.params.set_reverb_mix(mix);
        self.live.set_reverb_mix(&self.params);
    }

    pub fn set_bass_gain_db(&mut self, gain_db: f64) {
        self.params.set_bass_gain_db(gain_db);
        self.live.set_bass_gain_db(self.params.bass_gain_db);
    }

    /// Replace all four parameters at once.
    pub fn set_params(&mut self, params: EffectParams) {
        let params = params.normalized();
        self.set_speed(params.speed);
        self.set_volume(params.volume);
        self.set_reverb_mix(params.reverb_mix);
        self.set_bass_gain_db(params.bass_gain_db);
    }

    // ── Offline render ──────────────────────────────────────

    /// Snapshot the track and parameters for a render and mark the session
    /// busy. Must be paired with [`Session::finish_render`].
    pub fn begin_render(&mut self) -> Result<RenderJob> {
        let source = self.source.clone().ok_or(PlayerError::NoSourceLoaded)?;
        if self.rendering {
            return Err(PlayerError::RenderInProgress);
        }
        self.rendering = true;
        Ok(RenderJob {
            source,
            params: self.params,
            options: self.render_options,
            file_name: download_name(&self.track_name),
        })
    }

    /// Clear the busy flag and pass the render outcome through.
    pub fn finish_render(&mut self, result: Result<Download>) -> Result<Download> {
        self.rendering = false;
        match &result {
            Ok(d) => log::info!("rendered '{}' ({} bytes)", d.file_name, d.bytes.len()),
            Err(e) => log::warn!("render failed: {e}"),
        }
        result
    }

    /// Render the processed track to a downloadable WAV.
    pub fn render_download(&mut self) -> Result<Download> {
        let job = self.begin_render()?;
        let result = job.run();
        self.finish_render(result)
    }

    // ── Lifecycle ───────────────────────────────────────────

    /// Cancel the frame task, disconnect the graph and close the context.
    pub fn teardown(&mut self) {
        self.frame_task.cancel();
        self.live.teardown();
        self.playing = false;
        self.context().close();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8000;

    struct FakeDecoder(Option<AudioBuffer>);

    impl Decode for FakeDecoder {
        fn decode(&self, _bytes: &[u8]) -> std::result::Result<AudioBuffer, DecodeError> {
            self.0.clone().ok_or(DecodeError::Host("EncodingError".into()))
        }
    }

    fn track(secs: f64) -> AudioBuffer {
        let frames = (secs * RATE as f64) as usize;
        let data = (0..frames).map(|i| ((i % 80) as f32 / 80.0) - 0.5).collect();
        AudioBuffer::from_channels(vec![data], RATE).unwrap()
    }

    fn loaded(secs: f64) -> Session {
        let mut s = Session::new(RATE).unwrap();
        s.import("song.mp3", "audio/mpeg", b"id3", &FakeDecoder(Some(track(secs)))).unwrap();
        s
    }

    /// Advance the realtime clock by pulling live audio.
    fn advance(s: &mut Session, secs: f64) {
        s.render_frames((secs * RATE as f64) as usize);
    }

    #[test]
    fn download_name_strips_extension() {
        assert_eq!(download_name("song.mp3"), "song-Slowed_And_Reverb.wav");
        assert_eq!(download_name("my.band - tune.mp3"), "my.band - tune-Slowed_And_Reverb.wav");
        assert_eq!(download_name("noext"), "noext-Slowed_And_Reverb.wav");
        assert_eq!(download_name(".hidden"), ".hidden-Slowed_And_Reverb.wav");
    }

    #[test]
    fn import_rejects_wrong_type() {
        let mut s = Session::new(RATE).unwrap();
        let err = s
            .import("clip.wav", "audio/wav", b"", &FakeDecoder(Some(track(1.0))))
            .unwrap_err();
        assert!(matches!(err, PlayerError::UnsupportedFormat { .. }));
        assert!(!s.has_source());
        assert_eq!(s.track_name(), NO_TRACK);
    }

    #[test]
    fn failed_decode_clears_previous_track() {
        let mut s = loaded(1.0);
        let err = s.import("bad.mp3", "audio/mpeg", b"", &FakeDecoder(None)).unwrap_err();
        assert!(matches!(err, PlayerError::DecodeFailure(_)));
        assert!(!s.has_source());
        assert_eq!(s.duration(), 0.0);
        assert_eq!(s.live().active_paths(), 0);
    }

    #[test]
    fn host_decode_failure_unloads_track() {
        let mut s = loaded(1.0);
        s.play().unwrap();
        let err = s.fail_import("broken.mp3", "EncodingError").unwrap_err();
        assert!(matches!(err, PlayerError::DecodeFailure(DecodeError::Host(_))));
        assert!(!s.has_source());
        assert!(!s.is_playing());
        assert_eq!(s.live().active_paths(), 0);
        assert_eq!(s.track_name(), "broken.mp3");
        assert!(matches!(s.toggle_play(), Err(PlayerError::NoSourceLoaded)));
    }

    #[test]
    fn import_while_playing_stops_first() {
        let mut s = loaded(5.0);
        let handle = s.play().unwrap();
        advance(&mut s, 1.0);
        s.import("next.mp3", "audio/mpeg", b"id3", &FakeDecoder(Some(track(3.0)))).unwrap();

        assert!(!s.is_playing());
        assert_eq!(s.on_frame(handle), None);
        assert_eq!(s.track_name(), "next.mp3");
        assert!((s.duration() - 3.0).abs() < 1e-12);
        assert_eq!(s.position().paused_at(), 0.0);
        assert_eq!(s.current_time(), 0.0);
        assert_eq!(s.live().active_paths(), 1);
        assert!(!s.live().is_playing());
    }

    #[test]
    fn empty_decoded_buffer_is_rejected() {
        let mut s = loaded(1.0);
        let empty = AudioBuffer::silent(2, 0, RATE).unwrap();
        let err = s.load_decoded("empty.mp3", empty).unwrap_err();
        assert!(matches!(err, PlayerError::InvalidBuffer(_)));
        assert!(!s.has_source());
        assert_eq!(s.live().active_paths(), 0);
    }

    #[test]
    fn import_builds_live_graph() {
        let s = loaded(2.0);
        assert!(s.has_source());
        assert_eq!(s.track_name(), "song.mp3");
        assert!((s.duration() - 2.0).abs() < 1e-12);
        assert_eq!(s.live().active_paths(), 1);
        assert!(!s.is_playing());
    }

    #[test]
    fn transport_without_track_fails() {
        let mut s = Session::new(RATE).unwrap();
        assert!(matches!(s.toggle_play(), Err(PlayerError::NoSourceLoaded)));
        assert!(matches!(s.skip_forward(), Err(PlayerError::NoSourceLoaded)));
        assert!(matches!(s.render_download(), Err(PlayerError::NoSourceLoaded)));
        assert!(!s.is_rendering());
    }

    #[test]
    fn pause_resumes_from_frozen_position() {
        let mut s = loaded(5.0);
        let handle = s.toggle_play().unwrap().unwrap();
        advance(&mut s, 1.0);
        let t = s.on_frame(handle).unwrap();
        assert!((t - 1.0).abs() < 0.02);

        assert_eq!(s.toggle_play().unwrap(), None);
        let paused = s.position().paused_at();
        assert!((paused - 1.0).abs() < 0.02);
        assert_eq!(s.position().start_time(), None);

        advance(&mut s, 1.0);
        assert_eq!(s.on_frame(handle), None, "cancelled handle must not update");
        assert_eq!(s.position().paused_at(), paused);

        let handle = s.toggle_play().unwrap().unwrap();
        advance(&mut s, 0.5);
        let t = s.on_frame(handle).unwrap();
        assert!((t - (paused + 0.5)).abs() < 0.02);
    }

    #[test]
    fn position_tracks_playback_rate() {
        let mut s = loaded(5.0);
        s.set_speed(0.5);
        let handle = s.play().unwrap();
        advance(&mut s, 2.0);
        let t = s.on_frame(handle).unwrap();
        assert!((t - 1.0).abs() < 0.02, "2s at 0.5x is 1s of track, got {t}");
    }

    #[test]
    fn reaching_the_end_stops_playback() {
        let mut s = loaded(1.0);
        let handle = s.play().unwrap();
        advance(&mut s, 1.5);
        assert_eq!(s.on_frame(handle), Some(1.0));
        assert!(!s.is_playing());
        assert_eq!(s.current_time(), 1.0);
        assert_eq!(s.on_frame(handle), None);

        // Playing again starts over.
        let handle = s.play().unwrap();
        advance(&mut s, 0.25);
        let t = s.on_frame(handle).unwrap();
        assert!(t < 0.5);
    }

    #[test]
    fn skip_clamps_to_track() {
        let mut s = loaded(15.0);
        s.skip_forward().unwrap();
        assert_eq!(s.current_time(), 10.0);
        s.skip_forward().unwrap();
        assert_eq!(s.current_time(), 15.0);
        s.skip_backward().unwrap();
        assert_eq!(s.current_time(), 5.0);
        s.skip_backward().unwrap();
        assert_eq!(s.current_time(), 0.0);
    }

    #[test]
    fn skip_while_playing_restarts_source() {
        let mut s = loaded(15.0);
        let handle = s.play().unwrap();
        s.skip_forward().unwrap();
        assert!(s.live().is_playing());
        assert_eq!(s.live().active_paths(), 1);
        advance(&mut s, 0.5);
        let t = s.on_frame(handle).unwrap();
        assert!((t - 10.5).abs() < 0.02);
    }

    #[test]
    fn reverb_mix_reaches_running_graph() {
        let mut s = loaded(2.0);
        s.play().unwrap();
        s.set_reverb_mix(60.0);
        let (dry, wet) = s.live().reverb_gains().unwrap();
        assert!((dry - 0.4).abs() < 1e-6);
        assert!((wet - 0.6).abs() < 1e-6);
        assert_eq!(s.live().active_paths(), 1);
    }

    #[test]
    fn render_download_names_and_sizes_file() {
        let mut s = loaded(0.5);
        s.set_params(EffectParams { speed: 1.0, volume: 100.0, reverb_mix: 0.0, bass_gain_db: 0.0 });
        let dl = s.render_download().unwrap();
        assert_eq!(dl.file_name, "song-Slowed_And_Reverb.wav");
        assert_eq!(dl.bytes.len(), 44 + 4000 * 2);
        assert!(!s.is_rendering());
    }

    #[test]
    fn overlapping_renders_are_rejected() {
        let mut s = loaded(0.25);
        let job = s.begin_render().unwrap();
        assert!(s.is_rendering());
        assert!(matches!(s.begin_render(), Err(PlayerError::RenderInProgress)));
        let first = s.finish_render(job.run());
        assert!(first.is_ok());
        assert!(s.begin_render().is_ok());
    }

    #[test]
    fn failed_render_resets_busy_flag() {
        let mut s = loaded(0.25);
        s.begin_render().unwrap();
        let err = s.finish_render(Err(PlayerError::RenderFailure("boom".into())));
        assert!(err.is_err());
        assert!(!s.is_rendering());
        assert!(s.render_download().is_ok());
    }

    #[test]
    fn teardown_stops_everything() {
        let mut s = loaded(2.0);
        let handle = s.play().unwrap();
        s.teardown();
        assert!(!s.is_playing());
        assert_eq!(s.on_frame(handle), None);
        assert_eq!(s.live().active_paths(), 0);
        assert!(matches!(s.play(), Err(PlayerError::InvalidState(_))));
    }
}
