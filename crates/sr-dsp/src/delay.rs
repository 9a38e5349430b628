//! Circular delay line with linear interpolation, and the feedback delay built on it

use sr_core::Sample;

use crate::{Processor, ProcessorConfig, StereoProcessor};

/// Fixed-size circular delay buffer.
///
/// `write` stores then advances; `read(d)` looks `d` samples back from the
/// write position, so `read(1.0)` right after a write returns that sample.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<Sample>,
    write_index: usize,
}

impl DelayLine {
    /// Buffer of `ceil(max_seconds * sample_rate)` samples (at least one)
    pub fn new(max_seconds: f64, sample_rate: f64) -> Self {
        let size = (max_seconds * sample_rate).ceil().max(1.0) as usize;
        Self::with_len(size)
    }

    pub fn with_len(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            write_index: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn write(&mut self, input: Sample) {
        self.buffer[self.write_index] = input;
        self.write_index = (self.write_index + 1) % self.buffer.len();
    }

    /// Interpolated read `delay_samples` behind the write position
    #[inline]
    pub fn read(&self, delay_samples: f64) -> Sample {
        let size = self.buffer.len();
        let read_ptr = (self.write_index as f64 - delay_samples).rem_euclid(size as f64);
        let i = read_ptr.floor();
        let frac = read_ptr - i;
        let i1 = (i as usize) % size;
        let i2 = (i1 + 1) % size;
        let s1 = self.buffer[i1];
        let s2 = self.buffer[i2];
        s1 + frac * (s2 - s1)
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_index = 0;
    }
}

/// Maximum feedback delay time (seconds)
pub const MAX_FEEDBACK_DELAY_SECS: f64 = 2.0;

/// Stereo feedback delay, one independent line per channel
#[derive(Debug, Clone)]
pub struct FeedbackDelay {
    lines: [DelayLine; 2],
    delay_time: f64,
    feedback: f64,
    wet: f64,
    sample_rate: f64,
}

impl FeedbackDelay {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            lines: [
                DelayLine::new(MAX_FEEDBACK_DELAY_SECS, sample_rate),
                DelayLine::new(MAX_FEEDBACK_DELAY_SECS, sample_rate),
            ],
            delay_time: 0.5,
            feedback: 0.3,
            wet: 0.5,
            sample_rate,
        }
    }

    /// Delay time in seconds
    pub fn set_delay_time(&mut self, seconds: f64) {
        self.delay_time = seconds.clamp(0.0, MAX_FEEDBACK_DELAY_SECS);
    }

    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = feedback;
    }

    pub fn set_wet(&mut self, wet: f64) {
        self.wet = wet;
    }

    #[inline]
    fn tick(&mut self, ch: usize, x: Sample) -> Sample {
        let line = &mut self.lines[ch];
        let delayed = line.read(self.delay_time * self.sample_rate);
        line.write(x + delayed * self.feedback);
        x * (1.0 - self.wet) + delayed * self.wet
    }
}

impl Processor for FeedbackDelay {
    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
    }
}

impl StereoProcessor for FeedbackDelay {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        (self.tick(0, left), self.tick(1, right))
    }
}

impl ProcessorConfig for FeedbackDelay {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.lines = [
            DelayLine::new(MAX_FEEDBACK_DELAY_SECS, sample_rate),
            DelayLine::new(MAX_FEEDBACK_DELAY_SECS, sample_rate),
        ];
    }
}
