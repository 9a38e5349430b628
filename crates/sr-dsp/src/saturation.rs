//! Waveshaping and quantization: saturator, distortion, bitcrusher, TPDF dither

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sr_core::{Sample, db_to_gain};
use std::f64::consts::FRAC_2_PI;

use crate::{Processor, StereoProcessor};

// ============ Saturator ============

/// Analog-flavoured transfer curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaturationType {
    /// Symmetric tanh
    Tape,
    /// tanh above zero, `x / (1 + |x|)` below
    #[default]
    Tube,
    /// Hard clip at +/-1
    Fuzz,
}

impl SaturationType {
    /// 0 = tape, 1 = tube, 2 = fuzz (rounded); anything else is tape
    pub fn from_index(value: f64) -> Self {
        match value.round() as i64 {
            1 => SaturationType::Tube,
            2 => SaturationType::Fuzz,
            _ => SaturationType::Tape,
        }
    }

    #[inline]
    pub fn shape(self, x: f64) -> f64 {
        match self {
            SaturationType::Tape => x.tanh(),
            SaturationType::Tube => {
                if x >= 0.0 {
                    x.tanh()
                } else {
                    x / (1.0 + x.abs())
                }
            }
            SaturationType::Fuzz => x.clamp(-1.0, 1.0),
        }
    }
}

/// Drive -> curve -> output gain -> dry/wet
#[derive(Debug, Clone)]
pub struct Saturator {
    drive: f64,
    kind: SaturationType,
    output_gain: f64,
    mix: f64,
}

impl Default for Saturator {
    fn default() -> Self {
        Self::new()
    }
}

impl Saturator {
    pub fn new() -> Self {
        Self {
            drive: 0.5,
            kind: SaturationType::Tube,
            output_gain: 1.0,
            mix: 1.0,
        }
    }

    /// Drive amount; the input is scaled by `1 + drive`
    pub fn set_drive(&mut self, drive: f64) {
        self.drive = drive;
    }

    pub fn set_type(&mut self, kind: SaturationType) {
        self.kind = kind;
    }

    /// Output gain (dB)
    pub fn set_output_gain(&mut self, db: f64) {
        self.output_gain = db_to_gain(db);
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix;
    }

    #[inline]
    fn tick(&self, x: Sample) -> Sample {
        let wet = self.kind.shape(x * (1.0 + self.drive)) * self.output_gain;
        x * (1.0 - self.mix) + wet * self.mix
    }
}

impl Processor for Saturator {
    fn reset(&mut self) {}
}

impl StereoProcessor for Saturator {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        (self.tick(left), self.tick(right))
    }
}

// ============ Distortion ============

/// Distortion transfer curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistortionShape {
    #[default]
    Tanh,
    /// `(2/pi) * atan(x)`
    Atan,
    /// `x - x^3/3` inside +/-1.5, saturated outside
    Cubic,
}

impl DistortionShape {
    pub fn from_index(value: f64) -> Self {
        match value.round() as i64 {
            0 => DistortionShape::Tanh,
            1 => DistortionShape::Atan,
            _ => DistortionShape::Cubic,
        }
    }

    #[inline]
    pub fn shape(self, x: f64) -> f64 {
        match self {
            DistortionShape::Tanh => x.tanh(),
            DistortionShape::Atan => FRAC_2_PI * x.atan(),
            DistortionShape::Cubic => {
                if x > -1.5 && x < 1.5 {
                    x - x * x * x / 3.0
                } else if x > 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

/// Waveshaper evaluated at the sample and at the midpoint to the previous
/// sample, then averaged (2x oversampling by linear interpolation)
#[derive(Debug, Clone)]
pub struct Distortion {
    last: [Sample; 2],
    drive: f64,
    wet: f64,
    shape: DistortionShape,
    output_gain: f64,
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new()
    }
}

impl Distortion {
    pub fn new() -> Self {
        Self {
            last: [0.0; 2],
            drive: 1.0,
            wet: 1.0,
            shape: DistortionShape::Tanh,
            output_gain: 1.0,
        }
    }

    /// Linear drive multiplier
    pub fn set_drive(&mut self, drive: f64) {
        self.drive = drive;
    }

    pub fn set_wet(&mut self, wet: f64) {
        self.wet = wet;
    }

    pub fn set_shape(&mut self, shape: DistortionShape) {
        self.shape = shape;
    }

    /// Output gain (dB)
    pub fn set_output_gain(&mut self, db: f64) {
        self.output_gain = db_to_gain(db);
    }

    #[inline]
    fn tick(&mut self, ch: usize, x: Sample) -> Sample {
        let mid = 0.5 * (x + self.last[ch]);
        self.last[ch] = x;
        let shaped = 0.5 * (self.shape.shape(x * self.drive) + self.shape.shape(mid * self.drive));
        (shaped * self.wet + x * (1.0 - self.wet)) * self.output_gain
    }
}

impl Processor for Distortion {
    fn reset(&mut self) {
        self.last = [0.0; 2];
    }
}

impl StereoProcessor for Distortion {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        (self.tick(0, left), self.tick(1, right))
    }
}

// ============ Bitcrusher ============

/// Sample-and-hold downsampler with bit-depth truncation
#[derive(Debug, Clone)]
pub struct BitCrusher {
    phasor: f64,
    held: [Sample; 2],
    step: f64,
    norm_freq: f64,
    mix: f64,
}

impl Default for BitCrusher {
    fn default() -> Self {
        Self::new()
    }
}

impl BitCrusher {
    pub fn new() -> Self {
        Self {
            phasor: 0.0,
            held: [0.0; 2],
            step: 256.0,
            norm_freq: 1.0,
            mix: 1.0,
        }
    }

    /// Quantizer resolution in bits
    pub fn set_bits(&mut self, bits: f64) {
        self.step = 2.0_f64.powf(bits);
    }

    /// Hold rate as a fraction of the sample rate (1 = every sample)
    pub fn set_norm_freq(&mut self, norm_freq: f64) {
        self.norm_freq = norm_freq;
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix;
    }
}

impl Processor for BitCrusher {
    fn reset(&mut self) {
        self.phasor = 0.0;
        self.held = [0.0; 2];
    }
}

impl StereoProcessor for BitCrusher {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        self.phasor += self.norm_freq;
        if self.phasor >= 1.0 {
            self.phasor -= 1.0;
            self.held = [
                (left * self.step).floor() / self.step,
                (right * self.step).floor() / self.step,
            ];
        }
        (
            self.held[0] * self.mix + left * (1.0 - self.mix),
            self.held[1] * self.mix + right * (1.0 - self.mix),
        )
    }
}

// ============ Dither ============

/// Bit depths at or above this pass through untouched
pub const DITHER_BYPASS_BITS: f64 = 32.0;

/// TPDF dither and requantization to `bits`, hard-clipped to [-1, 1]
#[derive(Debug, Clone)]
pub struct Dither {
    rng: ChaCha8Rng,
    bits: f64,
    scale: f64,
}

impl Default for Dither {
    fn default() -> Self {
        Self::new()
    }
}

impl Dither {
    /// Seeded from the thread RNG
    pub fn new() -> Self {
        Self::with_rng(ChaCha8Rng::from_rng(&mut rand::rng()))
    }

    /// Deterministic noise sequence
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(rng: ChaCha8Rng) -> Self {
        let mut dither = Self {
            rng,
            bits: 24.0,
            scale: 1.0,
        };
        dither.set_bit_depth(24.0);
        dither
    }

    pub fn set_bit_depth(&mut self, bits: f64) {
        self.bits = bits;
        self.scale = 2.0_f64.powf(bits - 1.0);
    }

    pub fn bit_depth(&self) -> f64 {
        self.bits
    }

    #[inline]
    fn tick(&mut self, x: Sample) -> Sample {
        if self.bits >= DITHER_BYPASS_BITS {
            return x;
        }
        let noise = self.rng.random::<f64>() - self.rng.random::<f64>();
        ((x * self.scale + noise).round() / self.scale).clamp(-1.0, 1.0)
    }
}

impl Processor for Dither {
    fn reset(&mut self) {}
}

impl StereoProcessor for Dither {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        (self.tick(left), self.tick(right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturation_curves() {
        assert!((SaturationType::Tape.shape(0.5) - 0.5_f64.tanh()).abs() < 1e-15);
        assert!((SaturationType::Tube.shape(-1.0) + 0.5).abs() < 1e-15);
        assert_eq!(SaturationType::Fuzz.shape(3.0), 1.0);
        assert_eq!(SaturationType::Fuzz.shape(-3.0), -1.0);
        assert_eq!(SaturationType::from_index(7.0), SaturationType::Tape);
    }

    #[test]
    fn test_saturator_mix_and_gain() {
        let mut sat = Saturator::new();
        sat.set_mix(0.0);
        assert_eq!(sat.process_sample(0.3, -0.3), (0.3, -0.3));

        let mut sat = Saturator::new();
        sat.set_type(SaturationType::Fuzz);
        sat.set_drive(9.0);
        sat.set_output_gain(-6.0);
        let (l, _) = sat.process_sample(0.5, 0.5);
        assert!((l - db_to_gain(-6.0)).abs() < 1e-12);
    }

    #[test]
    fn test_distortion_cubic_limits() {
        assert_eq!(DistortionShape::Cubic.shape(2.0), 1.0);
        assert_eq!(DistortionShape::Cubic.shape(-2.0), -1.0);
        assert!((DistortionShape::Cubic.shape(1.0) - 2.0 / 3.0).abs() < 1e-15);
        assert!(DistortionShape::Atan.shape(1e9) < 1.0);
    }

    #[test]
    fn test_distortion_dry_path() {
        let mut dist = Distortion::new();
        dist.set_wet(0.0);
        dist.set_output_gain(6.0);
        let (l, _) = dist.process_sample(0.25, 0.25);
        assert!((l - 0.25 * db_to_gain(6.0)).abs() < 1e-12);
    }

    #[test]
    fn test_distortion_channels_independent() {
        let mut dist = Distortion::new();
        dist.process_sample(1.0, 0.0);
        // Right channel midpoint must not see the left history
        let (_, r) = dist.process_sample(0.0, 0.0);
        assert_eq!(r, 0.0);
    }

    #[test]
    fn test_bitcrusher_quantizes_and_holds() {
        let mut crusher = BitCrusher::new();
        crusher.set_bits(2.0);
        let (l, _) = crusher.process_sample(0.6, 0.6);
        assert_eq!(l, 0.5);

        crusher.set_norm_freq(0.25);
        crusher.reset();
        let outs: Vec<f64> = (0..8)
            .map(|i| crusher.process_sample(i as f64 / 10.0, 0.0).0)
            .collect();
        // Latches on every fourth sample
        assert_eq!(outs[0], 0.0);
        assert_eq!(outs[3], 0.25);
        assert_eq!(outs[6], 0.25);
        assert_eq!(outs[7], 0.5);
    }

    #[test]
    fn test_dither_statistic_on_silence() {
        let mut dither = Dither::with_seed(7);
        dither.set_bit_depth(16.0);
        let n = 4000;
        let nonzero = (0..n)
            .filter(|_| dither.process_sample(0.0, 0.0).0 != 0.0)
            .count();
        let fraction = nonzero as f64 / n as f64;
        assert!((0.18..=0.32).contains(&fraction), "fraction {fraction}");
    }

    #[test]
    fn test_dither_clips_and_bypasses() {
        let mut dither = Dither::with_seed(1);
        dither.set_bit_depth(16.0);
        for _ in 0..100 {
            let (l, r) = dither.process_sample(1.7, -4.0);
            assert!((-1.0..=1.0).contains(&l));
            assert!((-1.0..=1.0).contains(&r));
        }
        dither.set_bit_depth(32.0);
        assert_eq!(dither.process_sample(1.7, -0.1234), (1.7, -0.1234));
    }
}
