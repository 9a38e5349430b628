//! Loudness and level metering
//!
//! Momentary (400 ms) and short-term (3 s) loudness from K-weighted energy
//! held in fixed windows with running sums, so every sample costs O(1).

use sr_core::Sample;

use crate::biquad::{Biquad, FilterType};
use crate::{MonoProcessor, Processor, ProcessorConfig, StereoProcessor};

/// Reported loudness when the window holds (near) silence
pub const LOUDNESS_FLOOR: f64 = -100.0;

/// Offset of the loudness formula
const LUFS_OFFSET: f64 = 0.691;

/// Mean energy below which the floor is reported
const ENERGY_EPSILON: f64 = 1e-9;

pub const MOMENTARY_WINDOW_SECS: f64 = 0.4;
pub const SHORT_TERM_WINDOW_SECS: f64 = 3.0;

// ============ K-weighting ============

/// High-shelf pre-filter (+4 dB at 1.5 kHz) followed by the RLB high-pass (100 Hz)
#[derive(Debug, Clone)]
pub struct KWeightingFilter {
    shelf: Biquad,
    highpass: Biquad,
}

impl KWeightingFilter {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            shelf: Biquad::new(FilterType::HighShelf, 1500.0, 4.0, 0.707, sample_rate),
            highpass: Biquad::new(FilterType::Highpass, 100.0, 0.0, 1.0, sample_rate),
        }
    }
}

impl Processor for KWeightingFilter {
    fn reset(&mut self) {
        Processor::reset(&mut self.shelf);
        Processor::reset(&mut self.highpass);
    }
}

impl MonoProcessor for KWeightingFilter {
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let x = self.shelf.process_sample(input);
        self.highpass.process_sample(x)
    }
}

impl ProcessorConfig for KWeightingFilter {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.shelf.set_sample_rate(sample_rate);
        self.highpass.set_sample_rate(sample_rate);
    }
}

// ============ Energy window ============

#[derive(Debug, Clone)]
struct EnergyWindow {
    buffer: Vec<f64>,
    pos: usize,
    sum: f64,
}

impl EnergyWindow {
    fn new(seconds: f64, sample_rate: f64) -> Self {
        let len = ((seconds * sample_rate).floor() as usize).max(1);
        Self {
            buffer: vec![0.0; len],
            pos: 0,
            sum: 0.0,
        }
    }

    #[inline]
    fn push(&mut self, energy: f64) {
        self.sum -= self.buffer[self.pos];
        self.buffer[self.pos] = energy;
        self.sum += energy;
        self.pos += 1;
        if self.pos == self.buffer.len() {
            self.pos = 0;
        }
    }

    fn loudness(&self) -> f64 {
        // Running sums drift; never let rounding go negative
        let mean = self.sum.max(0.0) / self.buffer.len() as f64;
        if mean > ENERGY_EPSILON {
            10.0 * mean.log10() - LUFS_OFFSET
        } else {
            LOUDNESS_FLOOR
        }
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
        self.sum = 0.0;
    }
}

// ============ Loudness meter ============

/// Momentary and short-term loudness; audio passes through unchanged
#[derive(Debug, Clone)]
pub struct LoudnessMeter {
    filters: [KWeightingFilter; 2],
    momentary: EnergyWindow,
    short_term: EnergyWindow,
    sample_rate: f64,
}

impl LoudnessMeter {
    pub fn new(sample_rate: f64) -> Self {
        let filter = KWeightingFilter::new(sample_rate);
        Self {
            filters: [filter.clone(), filter],
            momentary: EnergyWindow::new(MOMENTARY_WINDOW_SECS, sample_rate),
            short_term: EnergyWindow::new(SHORT_TERM_WINDOW_SECS, sample_rate),
            sample_rate,
        }
    }

    /// Feed one stereo frame
    #[inline]
    pub fn measure(&mut self, left: Sample, right: Sample) {
        let kl = self.filters[0].process_sample(left);
        let kr = self.filters[1].process_sample(right);
        let energy = kl * kl + kr * kr;
        self.momentary.push(energy);
        self.short_term.push(energy);
    }

    pub fn measure_block(&mut self, left: &[Sample], right: &[Sample]) {
        for (&l, &r) in left.iter().zip(right) {
            self.measure(l, r);
        }
    }

    /// Loudness over the last 400 ms (LUFS)
    pub fn momentary(&self) -> f64 {
        self.momentary.loudness()
    }

    /// Loudness over the last 3 s (LUFS)
    pub fn short_term(&self) -> f64 {
        self.short_term.loudness()
    }
}

impl Processor for LoudnessMeter {
    fn reset(&mut self) {
        for f in &mut self.filters {
            f.reset();
        }
        self.momentary.clear();
        self.short_term.clear();
    }
}

impl StereoProcessor for LoudnessMeter {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        self.measure(left, right);
        (left, right)
    }
}

impl ProcessorConfig for LoudnessMeter {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        if (sample_rate - self.sample_rate).abs() > f64::EPSILON {
            *self = Self::new(sample_rate);
        }
    }
}

// ============ Level meter ============

/// Peak and RMS accumulated between reads
#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    peak: f64,
    sum_sq: f64,
    count: usize,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn process(&mut self, left: Sample, right: Sample) {
        self.peak = self.peak.max(left.abs()).max(right.abs());
        self.sum_sq += 0.5 * (left * left + right * right);
        self.count += 1;
    }

    pub fn process_block(&mut self, left: &[Sample], right: &[Sample]) {
        for (&l, &r) in left.iter().zip(right) {
            self.process(l, r);
        }
    }

    /// Linear peak since the last `take`
    pub fn peak(&self) -> f64 {
        self.peak
    }

    /// Linear RMS since the last `take`
    pub fn rms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_sq / self.count as f64).sqrt()
        }
    }

    /// Read (peak, rms) and start a new measurement period
    pub fn take(&mut self) -> (f64, f64) {
        let reading = (self.peak, self.rms());
        self.reset();
        reading
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
