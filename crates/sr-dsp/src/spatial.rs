//! Stereo field: 3-band imager and equal-power panner

use sr_core::{Sample, StereoSample};
use std::f64::consts::FRAC_PI_2;

use crate::crossover::ThreeBandSplitter;
use crate::{Processor, ProcessorConfig, StereoProcessor};

/// Mid/side width per band on the compensated three-band split
#[derive(Debug, Clone)]
pub struct StereoImager {
    splitters: [ThreeBandSplitter; 2],
    widths: [f64; 3],
    bypass: bool,
}

impl StereoImager {
    pub fn new(sample_rate: f64) -> Self {
        let splitter = ThreeBandSplitter::new(150.0, 2500.0, sample_rate);
        Self {
            splitters: [splitter.clone(), splitter],
            widths: [0.0, 1.0, 1.2],
            bypass: false,
        }
    }

    pub fn set_low_crossover(&mut self, hz: f64) {
        for s in &mut self.splitters {
            let high = s.high_freq();
            s.set_frequencies(hz, high);
        }
    }

    pub fn set_high_crossover(&mut self, hz: f64) {
        for s in &mut self.splitters {
            let low = s.low_freq();
            s.set_frequencies(low, hz);
        }
    }

    /// Width of band 0 (low), 1 (mid) or 2 (high); 0 = mono, 1 = unchanged
    pub fn set_width(&mut self, band: usize, width: f64) {
        if let Some(w) = self.widths.get_mut(band) {
            *w = width;
        }
    }

    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    pub fn widths(&self) -> [f64; 3] {
        self.widths
    }
}

impl Processor for StereoImager {
    fn reset(&mut self) {
        for s in &mut self.splitters {
            s.reset();
        }
    }
}

impl StereoProcessor for StereoImager {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        if self.bypass {
            return (left, right);
        }
        let l_bands = self.splitters[0].process(left);
        let r_bands = self.splitters[1].process(right);

        let mut out_l = 0.0;
        let mut out_r = 0.0;
        for band in 0..3 {
            let mut ms = StereoSample::new(l_bands[band], r_bands[band]).to_mid_side();
            ms.side *= self.widths[band];
            let s = ms.to_stereo();
            out_l += s.left;
            out_r += s.right;
        }
        (out_l, out_r)
    }
}

impl ProcessorConfig for StereoImager {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        for s in &mut self.splitters {
            s.set_sample_rate(sample_rate);
        }
    }
}

/// Equal-power stereo panner for stereo input.
///
/// Panning left folds part of the right channel into the left and
/// attenuates the right, and the mirror for panning right.
#[derive(Debug, Clone, Copy)]
pub struct StereoPanner {
    pan: f64,
    gain_a: f64,
    gain_b: f64,
}

impl Default for StereoPanner {
    fn default() -> Self {
        Self::new()
    }
}

impl StereoPanner {
    pub fn new() -> Self {
        let mut panner = Self {
            pan: 0.0,
            gain_a: 0.0,
            gain_b: 1.0,
        };
        panner.set_pan(0.0);
        panner
    }

    /// Pan position in [-1, 1]
    pub fn set_pan(&mut self, pan: f64) {
        self.pan = pan.clamp(-1.0, 1.0);
        let x = if self.pan <= 0.0 { self.pan + 1.0 } else { self.pan };
        self.gain_a = (x * FRAC_PI_2).cos();
        self.gain_b = (x * FRAC_PI_2).sin();
    }

    pub fn pan(&self) -> f64 {
        self.pan
    }

    #[inline]
    pub fn process(&self, left: Sample, right: Sample) -> (Sample, Sample) {
        if self.pan <= 0.0 {
            (left + right * self.gain_a, right * self.gain_b)
        } else {
            (left * self.gain_a, right + left * self.gain_b)
        }
    }

    pub fn process_block(&self, left: &mut [Sample], right: &mut [Sample]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process(*l, *r);
        }
    }
}
