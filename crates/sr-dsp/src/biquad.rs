//! RBJ biquad filter, direct form I
//!
//! Coefficients follow the Audio EQ Cookbook. The intermediate terms
//! (`cos w0`, `alpha`) are cached so gain can be re-evaluated per sample
//! without touching the trig functions, which the dynamic EQ relies on.

use num_complex::Complex64;
use sr_core::Sample;
use std::f64::consts::PI;

use crate::{MonoProcessor, Processor, ProcessorConfig};

/// Biquad filter types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    /// Constant 0 dB peak gain
    Bandpass,
    Peaking,
    LowShelf,
    HighShelf,
    Allpass,
}

/// Normalized biquad coefficients (a0 = 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::bypass()
    }
}

impl BiquadCoeffs {
    /// Unity gain, no filtering
    pub const fn bypass() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    /// Design from frequency (Hz), gain (dB), Q and sample rate
    pub fn design(
        filter_type: FilterType,
        freq: f64,
        gain_db: f64,
        q: f64,
        sample_rate: f64,
    ) -> Self {
        let base = BaseTerms::new(freq, q, sample_rate);
        Self::from_terms(filter_type, base, gain_db)
    }

    pub fn lowpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        Self::design(FilterType::Lowpass, freq, 0.0, q, sample_rate)
    }

    pub fn highpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        Self::design(FilterType::Highpass, freq, 0.0, q, sample_rate)
    }

    pub fn bandpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        Self::design(FilterType::Bandpass, freq, 0.0, q, sample_rate)
    }

    pub fn allpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        Self::design(FilterType::Allpass, freq, 0.0, q, sample_rate)
    }

    pub fn peaking(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self::design(FilterType::Peaking, freq, gain_db, q, sample_rate)
    }

    pub fn low_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self::design(FilterType::LowShelf, freq, gain_db, q, sample_rate)
    }

    pub fn high_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self::design(FilterType::HighShelf, freq, gain_db, q, sample_rate)
    }

    fn from_terms(filter_type: FilterType, base: BaseTerms, gain_db: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let BaseTerms { cos_w0: c, alpha } = base;

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::Lowpass => (
                (1.0 - c) / 2.0,
                1.0 - c,
                (1.0 - c) / 2.0,
                1.0 + alpha,
                -2.0 * c,
                1.0 - alpha,
            ),
            FilterType::Highpass => (
                (1.0 + c) / 2.0,
                -(1.0 + c),
                (1.0 + c) / 2.0,
                1.0 + alpha,
                -2.0 * c,
                1.0 - alpha,
            ),
            FilterType::Bandpass => (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * c, 1.0 - alpha),
            FilterType::Allpass => (
                1.0 - alpha,
                -2.0 * c,
                1.0 + alpha,
                1.0 + alpha,
                -2.0 * c,
                1.0 - alpha,
            ),
            FilterType::Peaking => (
                1.0 + alpha * a,
                -2.0 * c,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * c,
                1.0 - alpha / a,
            ),
            FilterType::LowShelf => {
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * c + k),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * c),
                    a * ((a + 1.0) - (a - 1.0) * c - k),
                    (a + 1.0) + (a - 1.0) * c + k,
                    -2.0 * ((a - 1.0) + (a + 1.0) * c),
                    (a + 1.0) + (a - 1.0) * c - k,
                )
            }
            FilterType::HighShelf => {
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * c + k),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * c),
                    a * ((a + 1.0) + (a - 1.0) * c - k),
                    (a + 1.0) - (a - 1.0) * c + k,
                    2.0 * ((a - 1.0) - (a + 1.0) * c),
                    (a + 1.0) - (a - 1.0) * c - k,
                )
            }
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Complex response H(e^jw) at `freq`
    pub fn response(&self, freq: f64, sample_rate: f64) -> Complex64 {
        let w = 2.0 * PI * freq / sample_rate;
        let z1 = Complex64::from_polar(1.0, -w);
        let z2 = z1 * z1;
        let num = self.b0 + z1 * self.b1 + z2 * self.b2;
        let den = 1.0 + z1 * self.a1 + z2 * self.a2;
        num / den
    }

    /// Magnitude response in dB at `freq`
    pub fn magnitude_db(&self, freq: f64, sample_rate: f64) -> f64 {
        20.0 * self.response(freq, sample_rate).norm().log10()
    }
}

/// Cached frequency/Q dependent terms
#[derive(Debug, Clone, Copy)]
struct BaseTerms {
    cos_w0: f64,
    alpha: f64,
}

impl BaseTerms {
    fn new(freq: f64, q: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * PI * freq / sample_rate;
        Self {
            cos_w0: w0.cos(),
            alpha: w0.sin() / (2.0 * q),
        }
    }
}

/// Direct form I biquad with non-finite self-healing
#[derive(Debug, Clone)]
pub struct Biquad {
    filter_type: FilterType,
    base: BaseTerms,
    coeffs: BiquadCoeffs,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
    freq: f64,
    q: f64,
    gain_db: f64,
    sample_rate: f64,
}

impl Biquad {
    pub fn new(filter_type: FilterType, freq: f64, gain_db: f64, q: f64, sample_rate: f64) -> Self {
        let base = BaseTerms::new(freq, q, sample_rate);
        Self {
            filter_type,
            base,
            coeffs: BiquadCoeffs::from_terms(filter_type, base, gain_db),
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
            freq,
            q,
            gain_db,
            sample_rate,
        }
    }

    /// Set every design parameter at once
    pub fn set_params(&mut self, filter_type: FilterType, freq: f64, gain_db: f64, q: f64) {
        self.filter_type = filter_type;
        self.update_base(freq, q);
        self.set_gain(gain_db);
    }

    /// Recompute the frequency/Q terms; gain is re-applied
    pub fn update_base(&mut self, freq: f64, q: f64) {
        self.freq = freq;
        self.q = q;
        self.base = BaseTerms::new(freq, q, self.sample_rate);
        self.coeffs = BiquadCoeffs::from_terms(self.filter_type, self.base, self.gain_db);
    }

    /// Re-evaluate coefficients for a new gain from the cached base terms
    #[inline]
    pub fn set_gain(&mut self, gain_db: f64) {
        self.gain_db = gain_db;
        self.coeffs = BiquadCoeffs::from_terms(self.filter_type, self.base, gain_db);
    }

    #[inline]
    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn frequency(&self) -> f64 {
        self.freq
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    /// Last output sample; part of the filter state
    pub fn last_output(&self) -> f64 {
        self.y1
    }
}

impl Processor for Biquad {
    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

impl MonoProcessor for Biquad {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let c = &self.coeffs;
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        if !output.is_finite() {
            self.reset();
            return 0.0;
        }

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

impl ProcessorConfig for Biquad {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_base(self.freq, self.q);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    const ALL_TYPES: [FilterType; 7] = [
        FilterType::Lowpass,
        FilterType::Highpass,
        FilterType::Bandpass,
        FilterType::Peaking,
        FilterType::LowShelf,
        FilterType::HighShelf,
        FilterType::Allpass,
    ];

    #[test]
    fn test_lowpass_dc() {
        let mut filter = Biquad::new(FilterType::Lowpass, 1000.0, 0.0, 0.707, SR);
        for _ in 0..1000 {
            filter.process_sample(1.0);
        }
        assert!((filter.process_sample(1.0) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_highpass_dc() {
        let mut filter = Biquad::new(FilterType::Highpass, 1000.0, 0.0, 0.707, SR);
        for _ in 0..1000 {
            filter.process_sample(1.0);
        }
        assert!(filter.process_sample(1.0).abs() < 0.01);
    }

    #[test]
    fn test_peaking_center_gain() {
        let coeffs = BiquadCoeffs::peaking(1000.0, 1.0, 6.0, SR);
        assert!((coeffs.magnitude_db(1000.0, SR) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_gain_shelves_are_unity() {
        for coeffs in [
            BiquadCoeffs::low_shelf(100.0, 0.707, 0.0, SR),
            BiquadCoeffs::high_shelf(8000.0, 0.707, 0.0, SR),
        ] {
            for f in [50.0, 1000.0, 12000.0] {
                assert!(coeffs.magnitude_db(f, SR).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_bandpass_peak_is_unity() {
        let coeffs = BiquadCoeffs::bandpass(2000.0, 2.0, SR);
        assert!(coeffs.magnitude_db(2000.0, SR).abs() < 1e-9);
    }

    #[test]
    fn test_allpass_is_flat() {
        let coeffs = BiquadCoeffs::allpass(3000.0, std::f64::consts::FRAC_1_SQRT_2, SR);
        for f in [20.0, 500.0, 3000.0, 15000.0] {
            assert!((coeffs.response(f, SR).norm() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_set_gain_matches_full_design() {
        let mut filter = Biquad::new(FilterType::Peaking, 2500.0, 0.0, 1.4, SR);
        filter.set_gain(-7.5);
        let direct = BiquadCoeffs::peaking(2500.0, 1.4, -7.5, SR);
        assert!((filter.coeffs().b0 - direct.b0).abs() < 1e-12);
        assert!((filter.coeffs().a2 - direct.a2).abs() < 1e-12);
    }

    #[test]
    fn test_stays_finite_over_sustained_run() {
        for filter_type in ALL_TYPES {
            for &(freq, q, gain) in &[(20.0, 0.1, -24.0), (1000.0, 1.0, 0.0), (20000.0, 10.0, 24.0)] {
                let mut filter = Biquad::new(filter_type, freq, gain, q, SR);
                let mut phase: f64 = 0.0;
                for _ in 0..20000 {
                    phase += 0.173;
                    let out = filter.process_sample(phase.sin() * 0.9);
                    assert!(out.is_finite(), "{filter_type:?} at {freq} Hz produced {out}");
                }
            }
        }
    }

    #[test]
    fn test_non_finite_self_heals() {
        let mut filter = Biquad::new(FilterType::Lowpass, 1000.0, 0.0, 0.707, SR);
        filter.process_sample(0.5);
        assert_eq!(filter.process_sample(f64::NAN), 0.0);
        assert_eq!(filter.last_output(), 0.0);
        assert!(filter.process_sample(0.5).is_finite());
    }
}
