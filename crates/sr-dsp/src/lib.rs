//! sr-dsp: DSP processors for SonicRack
//!
//! Per-sample, allocation-free processing. Every buffer is sized at
//! construction; nothing here allocates once a processor is built.
//!
//! ## Modules
//! - `biquad` - RBJ biquad (direct form I) with analytic frequency response
//! - `delay` - Interpolating delay line and feedback delay
//! - `modulation` - LFO, one-pole all-pass, chorus, phaser, tremolo, auto-wah
//! - `crossover` - Linkwitz-Riley 4th-order crossover and the compensated 3-band split
//! - `dynamics` - Envelope follower, compressor (VCA/FET/Opto/VarMu), lookahead limiter,
//!   dynamic EQ, de-esser, transient shaper
//! - `multiband` - 3-band compressor
//! - `eq` - Parametric and mid/side EQ
//! - `saturation` - Saturator, distortion, bitcrusher, TPDF dither
//! - `spatial` - 3-band stereo imager, equal-power panner
//! - `convolution` - Partitioned FFT convolution and cabinet simulator
//! - `metering` - K-weighting, momentary/short-term loudness, level meter
//! - `automation` - Block-rate or per-sample parameter input

pub mod automation;
pub mod biquad;
pub mod convolution;
pub mod crossover;
pub mod delay;
pub mod dynamics;
pub mod eq;
pub mod metering;
pub mod modulation;
pub mod multiband;
pub mod saturation;
pub mod spatial;

pub use automation::ParamInput;
pub use biquad::{Biquad, BiquadCoeffs, FilterType};
pub use convolution::{CabSimulator, Convolver};
pub use crossover::{LinkwitzRiley4, ThreeBandSplitter};
pub use delay::{DelayLine, FeedbackDelay};
pub use dynamics::{
    Compressor, CompressorMode, DeEsser, DynamicEq, EnvelopeFollower, Limiter, TransientShaper,
    VcaCore,
};
pub use eq::{EqBand, MidSideEq, ParametricEq};
pub use metering::{KWeightingFilter, LevelMeter, LoudnessMeter};
pub use modulation::{AutoWah, Chorus, Lfo, LfoWaveform, OnePoleAllPass, Phaser, Tremolo};
pub use multiband::{Band, MultibandCompressor};
pub use saturation::{BitCrusher, Distortion, DistortionShape, Dither, SaturationType, Saturator};
pub use spatial::{StereoImager, StereoPanner};

use sr_core::Sample;

/// Trait for all DSP processors
pub trait Processor: Send {
    /// Reset processor state
    fn reset(&mut self);

    /// Get latency in samples
    fn latency(&self) -> usize {
        0
    }
}

/// Mono processor trait
pub trait MonoProcessor: Processor {
    /// Process a single sample
    fn process_sample(&mut self, input: Sample) -> Sample;

    /// Process a block of samples
    fn process_block(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}

/// Stereo processor trait
pub trait StereoProcessor: Processor {
    /// Process a stereo sample pair
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample);

    /// Process stereo blocks
    fn process_block(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        debug_assert_eq!(left.len(), right.len());
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process_sample(*l, *r);
        }
    }
}

/// Processor configuration for sample rate changes
pub trait ProcessorConfig {
    fn set_sample_rate(&mut self, sample_rate: f64);
}
