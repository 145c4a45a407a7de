//! Playback position tracking and the per-frame update task.

/// Where playback is within the source, measured in source seconds.
///
/// While a segment is running, position = `paused_at + (now - start_time) * rate`.
/// Scaling by rate keeps the display in step with the audio at non-unity
/// speed; a rate change mid-segment folds the elapsed time into
/// `paused_at` and opens a new segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackPosition {
    paused_at: f64,
    start_time: Option<f64>,
    rate: f64,
}

impl Default for PlaybackPosition {
    fn default() -> Self {
        Self {
            paused_at: 0.0,
            start_time: None,
            rate: 1.0,
        }
    }
}

impl PlaybackPosition {
    pub fn paused_at(&self) -> f64 {
        self.paused_at
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    pub fn is_running(&self) -> bool {
        self.start_time.is_some()
    }

    /// Open a segment at context time `now`.
    pub fn begin(&mut self, now: f64, rate: f64) {
        self.start_time = Some(now);
        self.rate = rate;
    }

    /// Source position at context time `now`, unclamped.
    pub fn elapsed(&self, now: f64) -> f64 {
        match self.start_time {
            Some(start) => self.paused_at + (now - start).max(0.0) * self.rate,
            None => self.paused_at,
        }
    }

    /// Close the running segment: freeze the position and clear the start time.
    pub fn freeze(&mut self, now: f64) {
        self.paused_at = self.elapsed(now);
        self.start_time = None;
    }

    /// Change rate without losing the time already played.
    pub fn set_rate(&mut self, now: f64, rate: f64) {
        if self.is_running() {
            self.paused_at = self.elapsed(now);
            self.start_time = Some(now);
        }
        self.rate = rate;
    }

    /// Jump to `position` seconds. A running segment restarts from there at `now`.
    pub fn seek(&mut self, now: f64, position: f64) {
        self.paused_at = position.max(0.0);
        if self.is_running() {
            self.start_time = Some(now);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Identifies one scheduling of the frame task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A cancellable per-animation-frame task.
///
/// The host calls back with the handle it was given; a callback carrying a
/// handle that is no longer live must not touch any state.
#[derive(Debug, Default)]
pub struct FrameTask {
    next_id: u64,
    active: Option<TaskHandle>,
}

impl FrameTask {
    /// Schedule the task, replacing any previous scheduling.
    pub fn schedule(&mut self) -> TaskHandle {
        self.next_id += 1;
        let handle = TaskHandle(self.next_id);
        self.active = Some(handle);
        handle
    }

    /// Cancel the task. Returns whether anything was scheduled.
    pub fn cancel(&mut self) -> bool {
        self.active.take().is_some()
    }

    pub fn is_live(&self, handle: TaskHandle) -> bool {
        self.active == Some(handle)
    }

    pub fn active(&self) -> Option<TaskHandle> {
        self.active
    }
}
