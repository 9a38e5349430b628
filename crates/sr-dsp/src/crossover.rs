//! Linkwitz-Riley 4th-order crossover and the three-band splitter
//!
//! Each LR4 band is a squared 2nd-order Butterworth section (Q = 1/sqrt 2).
//! The two bands are in phase at every frequency and sum to a 2nd-order
//! all-pass, so their magnitudes add to unity.
//!
//! The three-band splitter cascades two crossovers; the low band is passed
//! through the all-pass of the upper crossover so all three bands share the
//! same phase and the unprocessed sum stays magnitude-flat.

use num_complex::Complex64;
use sr_core::Sample;
use std::f64::consts::FRAC_1_SQRT_2;

use crate::biquad::{Biquad, BiquadCoeffs, FilterType};
use crate::{MonoProcessor, Processor, ProcessorConfig};

/// Butterworth Q for each LR4 section
pub const BUTTERWORTH_Q: f64 = FRAC_1_SQRT_2;

/// LR4 crossover at a single cutoff
#[derive(Debug, Clone)]
pub struct LinkwitzRiley4 {
    lp1: Biquad,
    lp2: Biquad,
    hp1: Biquad,
    hp2: Biquad,
    cutoff: f64,
    sample_rate: f64,
}

impl LinkwitzRiley4 {
    pub fn new(cutoff: f64, sample_rate: f64) -> Self {
        let lp = Biquad::new(FilterType::Lowpass, cutoff, 0.0, BUTTERWORTH_Q, sample_rate);
        let hp = Biquad::new(FilterType::Highpass, cutoff, 0.0, BUTTERWORTH_Q, sample_rate);
        Self {
            lp1: lp.clone(),
            lp2: lp,
            hp1: hp.clone(),
            hp2: hp,
            cutoff,
            sample_rate,
        }
    }

    #[inline]
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Move the cutoff; filter history is kept
    pub fn set_cutoff(&mut self, cutoff: f64) {
        self.cutoff = cutoff;
        for f in [&mut self.lp1, &mut self.lp2, &mut self.hp1, &mut self.hp2] {
            f.update_base(cutoff, BUTTERWORTH_Q);
        }
    }

    /// Split one sample into (low, high)
    #[inline]
    pub fn process(&mut self, input: Sample) -> (Sample, Sample) {
        let low = self.lp2.process_sample(self.lp1.process_sample(input));
        let high = self.hp2.process_sample(self.hp1.process_sample(input));
        (low, high)
    }

    /// Analytic (low, high) response at `freq`
    pub fn response(&self, freq: f64) -> (Complex64, Complex64) {
        let lp = self.lp1.coeffs().response(freq, self.sample_rate);
        let hp = self.hp1.coeffs().response(freq, self.sample_rate);
        (lp * lp, hp * hp)
    }
}

impl Processor for LinkwitzRiley4 {
    fn reset(&mut self) {
        for f in [&mut self.lp1, &mut self.lp2, &mut self.hp1, &mut self.hp2] {
            Processor::reset(f);
        }
    }
}

impl ProcessorConfig for LinkwitzRiley4 {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for f in [&mut self.lp1, &mut self.lp2, &mut self.hp1, &mut self.hp2] {
            f.set_sample_rate(sample_rate);
        }
    }
}

/// Low / mid / high split from two cascaded LR4 crossovers
#[derive(Debug, Clone)]
pub struct ThreeBandSplitter {
    low_xover: LinkwitzRiley4,
    high_xover: LinkwitzRiley4,
    /// All-pass at the upper cutoff applied to the low band
    low_phase: Biquad,
    sample_rate: f64,
}

impl ThreeBandSplitter {
    pub fn new(low_freq: f64, high_freq: f64, sample_rate: f64) -> Self {
        Self {
            low_xover: LinkwitzRiley4::new(low_freq, sample_rate),
            high_xover: LinkwitzRiley4::new(high_freq, sample_rate),
            low_phase: Biquad::new(
                FilterType::Allpass,
                high_freq,
                0.0,
                BUTTERWORTH_Q,
                sample_rate,
            ),
            sample_rate,
        }
    }

    pub fn low_freq(&self) -> f64 {
        self.low_xover.cutoff()
    }

    pub fn high_freq(&self) -> f64 {
        self.high_xover.cutoff()
    }

    /// Update crossover points; sections are only re-designed when a value changes
    pub fn set_frequencies(&mut self, low_freq: f64, high_freq: f64) {
        if low_freq != self.low_xover.cutoff() {
            self.low_xover.set_cutoff(low_freq);
        }
        if high_freq != self.high_xover.cutoff() {
            self.high_xover.set_cutoff(high_freq);
            self.low_phase.update_base(high_freq, BUTTERWORTH_Q);
        }
    }

    /// Split one sample into [low, mid, high]
    #[inline]
    pub fn process(&mut self, input: Sample) -> [Sample; 3] {
        let (low, rest) = self.low_xover.process(input);
        let (mid, high) = self.high_xover.process(rest);
        [self.low_phase.process_sample(low), mid, high]
    }

    /// Analytic [low, mid, high] response at `freq`
    pub fn response(&self, freq: f64) -> [Complex64; 3] {
        let (l1, h1) = self.low_xover.response(freq);
        let (l2, h2) = self.high_xover.response(freq);
        let ap = BiquadCoeffs::allpass(self.high_freq(), BUTTERWORTH_Q, self.sample_rate)
            .response(freq, self.sample_rate);
        [l1 * ap, h1 * l2, h1 * h2]
    }
}

impl Processor for ThreeBandSplitter {
    fn reset(&mut self) {
        self.low_xover.reset();
        self.high_xover.reset();
        Processor::reset(&mut self.low_phase);
    }
}

impl ProcessorConfig for ThreeBandSplitter {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.low_xover.set_sample_rate(sample_rate);
        self.high_xover.set_sample_rate(sample_rate);
        self.low_phase.set_sample_rate(sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;
    const TEST_FREQS: [f64; 9] = [
        20.0, 80.0, 150.0, 500.0, 1000.0, 2500.0, 6000.0, 12000.0, 20000.0,
    ];

    #[test]
    fn test_lr4_sums_to_unity_in_phase() {
        let xover = LinkwitzRiley4::new(1000.0, SR);
        for f in TEST_FREQS {
            let (low, high) = xover.response(f);
            assert!(((low + high).norm() - 1.0).abs() < 1e-9, "sum at {f} Hz");
            // In phase: the product has no imaginary part relative to its size
            let cross = low * high.conj();
            assert!(cross.im.abs() <= 1e-9 * cross.norm().max(1e-30), "phase at {f} Hz");
        }
    }

    #[test]
    fn test_lr4_minus_6db_at_cutoff() {
        let xover = LinkwitzRiley4::new(2500.0, SR);
        let (low, high) = xover.response(2500.0);
        assert!((low.norm() - 0.5).abs() < 1e-9);
        assert!((high.norm() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_three_band_sum_is_flat() {
        let split = ThreeBandSplitter::new(150.0, 2500.0, SR);
        for f in TEST_FREQS {
            let [l, m, h] = split.response(f);
            assert!(((l + m + h).norm() - 1.0).abs() < 1e-9, "3-band sum at {f} Hz");
        }
    }

    #[test]
    fn test_three_band_time_domain_energy() {
        let mut split = ThreeBandSplitter::new(150.0, 2500.0, SR);
        let mut e_in = 0.0;
        let mut e_out = 0.0;
        for i in 0..48000 {
            let t = i as f64 / SR;
            let x = 0.3 * (std::f64::consts::TAU * 90.0 * t).sin()
                + 0.3 * (std::f64::consts::TAU * 1200.0 * t).sin()
                + 0.3 * (std::f64::consts::TAU * 7000.0 * t).sin();
            let [l, m, h] = split.process(x);
            if i >= 4800 {
                e_in += x * x;
                e_out += (l + m + h).powi(2);
            }
        }
        assert!((e_out / e_in - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_set_frequencies_redesigns() {
        let mut split = ThreeBandSplitter::new(150.0, 2500.0, SR);
        split.set_frequencies(300.0, 5000.0);
        assert_eq!(split.low_freq(), 300.0);
        assert_eq!(split.high_freq(), 5000.0);
        for f in TEST_FREQS {
            let [l, m, h] = split.response(f);
            assert!(((l + m + h).norm() - 1.0).abs() < 1e-9);
        }
    }
}
