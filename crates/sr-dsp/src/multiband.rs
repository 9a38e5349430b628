//! Three-band compressor on the phase-compensated LR4 split

use sr_core::Sample;

use crate::crossover::ThreeBandSplitter;
use crate::dynamics::VcaCore;
use crate::{Processor, ProcessorConfig, StereoProcessor};

/// Band index into the splitter output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Low = 0,
    Mid = 1,
    High = 2,
}

#[derive(Debug, Clone)]
struct MultibandChannel {
    splitter: ThreeBandSplitter,
    cores: [VcaCore; 3],
}

/// Low/mid/high compressor, one VCA core per band and channel
#[derive(Debug, Clone)]
pub struct MultibandCompressor {
    channels: [MultibandChannel; 2],
    bypass: bool,
}

impl MultibandCompressor {
    pub fn new(sample_rate: f64) -> Self {
        let channel = MultibandChannel {
            splitter: ThreeBandSplitter::new(150.0, 2500.0, sample_rate),
            cores: [
                VcaCore::new(sample_rate),
                VcaCore::new(sample_rate),
                VcaCore::new(sample_rate),
            ],
        };
        Self {
            channels: [channel.clone(), channel],
            bypass: false,
        }
    }

    /// Crossover points (Hz)
    pub fn set_crossovers(&mut self, low_freq: f64, high_freq: f64) {
        for ch in &mut self.channels {
            ch.splitter.set_frequencies(low_freq, high_freq);
        }
    }

    pub fn set_low_crossover(&mut self, hz: f64) {
        let high = self.channels[0].splitter.high_freq();
        self.set_crossovers(hz, high);
    }

    pub fn set_high_crossover(&mut self, hz: f64) {
        let low = self.channels[0].splitter.low_freq();
        self.set_crossovers(low, hz);
    }

    fn for_band(&mut self, band: Band, f: impl Fn(&mut VcaCore)) {
        for ch in &mut self.channels {
            f(&mut ch.cores[band as usize]);
        }
    }

    pub fn set_threshold(&mut self, band: Band, db: f64) {
        self.for_band(band, |c| c.set_threshold(db));
    }

    pub fn set_ratio(&mut self, band: Band, ratio: f64) {
        self.for_band(band, |c| c.set_ratio(ratio));
    }

    pub fn set_attack(&mut self, band: Band, seconds: f64) {
        self.for_band(band, |c| c.set_attack(seconds));
    }

    pub fn set_release(&mut self, band: Band, seconds: f64) {
        self.for_band(band, |c| c.set_release(seconds));
    }

    /// Band makeup gain (dB)
    pub fn set_makeup(&mut self, band: Band, db: f64) {
        self.for_band(band, |c| c.set_makeup(db));
    }

    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    /// Current gain reduction of a band, max over channels (dB)
    pub fn gain_reduction(&self, band: Band) -> f64 {
        self.channels
            .iter()
            .map(|ch| ch.cores[band as usize].gain_reduction())
            .fold(0.0, f64::max)
    }

    #[inline]
    fn tick(&mut self, ch: usize, x: Sample) -> Sample {
        let state = &mut self.channels[ch];
        let bands = state.splitter.process(x);
        bands
            .iter()
            .zip(state.cores.iter_mut())
            .map(|(&b, core)| core.process(b))
            .sum()
    }
}

impl Processor for MultibandCompressor {
    fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.splitter.reset();
            for core in &mut ch.cores {
                core.reset();
            }
        }
    }
}

impl StereoProcessor for MultibandCompressor {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        if self.bypass {
            return (left, right);
        }
        (self.tick(0, left), self.tick(1, right))
    }
}

impl ProcessorConfig for MultibandCompressor {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        for ch in &mut self.channels {
            ch.splitter.set_sample_rate(sample_rate);
            for core in &mut ch.cores {
                core.set_sample_rate(sample_rate);
            }
        }
    }
}
