//! Transport clock
//!
//! Time is derived from rendered frames, so the same command sequence gives
//! the same positions in real-time and offline rendering.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transport {
    playing: bool,
    /// Engine time at which position zero would have started
    start_time: f64,
    /// Position held while paused
    pause_time: f64,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Start at the paused position. Returns the playback offset, or `None`
    /// when already playing.
    pub fn play(&mut self, now: f64) -> Option<f64> {
        if self.playing {
            return None;
        }
        self.start_time = now - self.pause_time;
        self.playing = true;
        Some(self.pause_time)
    }

    /// Stop and hold the position. Returns false when already paused.
    pub fn pause(&mut self, now: f64) -> bool {
        if !self.playing {
            return false;
        }
        self.pause_time = now - self.start_time;
        self.playing = false;
        true
    }

    /// Move the held position; callers restart playback around it
    pub fn set_position(&mut self, time: f64) {
        self.pause_time = time.max(0.0);
    }

    pub fn current_time(&self, now: f64) -> f64 {
        if self.playing {
            now - self.start_time
        } else {
            self.pause_time
        }
    }
}
