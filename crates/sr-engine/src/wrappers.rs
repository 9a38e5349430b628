//! DSP processor wrappers
//!
//! [`RackProcessor`] implementations for the sr-dsp processors. Each DSP type
//! gets a name -> setter mapping ([`NamedParameters`]); dynamics processors
//! additionally post gain reduction on a throttle.

use std::sync::Arc;

use sr_core::{AudioBuffer, Sample};
use sr_dsp::dynamics::{Compressor, CompressorMode, DeEsser, DynamicEq, Limiter, TransientShaper};
use sr_dsp::eq::{EqBand, MidSideEq, ParametricEq};
use sr_dsp::modulation::{AutoWah, Chorus, LfoWaveform, Phaser, Tremolo};
use sr_dsp::multiband::{Band, MultibandCompressor};
use sr_dsp::saturation::{BitCrusher, Distortion, DistortionShape, Dither, SaturationType, Saturator};
use sr_dsp::spatial::StereoImager;
use sr_dsp::{CabSimulator, FeedbackDelay, LoudnessMeter, Processor, StereoProcessor};

use crate::node::RackProcessor;
use crate::registry::IR_ASSET_PARAM;
use crate::telemetry::{ModuleMeter, Throttle};

#[inline]
fn flag(value: f64) -> bool {
    value >= 0.5
}

// ============ Parameter mapping ============

/// Name-based parameter mapping onto a DSP processor
pub trait NamedParameters {
    /// Apply a parameter by its rack name. Returns false for an unknown name.
    fn set_named(&mut self, name: &str, value: f64) -> bool;
}

impl NamedParameters for Compressor {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "threshold" => self.set_threshold(value),
            "ratio" => self.set_ratio(value),
            "attack" => self.set_attack(value),
            "release" => self.set_release(value),
            "knee" => self.set_knee(value),
            "makeupGain" => self.set_makeup(value),
            "mode" => self.set_mode(CompressorMode::from_index(value)),
            "mix" => self.set_mix(value),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for Limiter {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "threshold" => self.set_threshold(value),
            "ceiling" => self.set_ceiling(value),
            "release" => self.set_release(value),
            "lookahead" => self.set_lookahead(value),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for DynamicEq {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "frequency" => self.set_frequency(value),
            "Q" => self.set_q(value),
            "gain" => self.set_gain(value),
            "threshold" => self.set_threshold(value),
            "ratio" => self.set_ratio(value),
            "attack" => self.set_attack(value),
            "release" => self.set_release(value),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for DeEsser {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "frequency" => self.set_frequency(value),
            "threshold" => self.set_threshold(value),
            "ratio" => self.set_ratio(value),
            "attack" => self.set_attack(value),
            "release" => self.set_release(value),
            "monitor" => self.set_monitor(flag(value)),
            "bypass" => self.set_bypass(flag(value)),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for TransientShaper {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "attackGain" => self.set_attack_gain(value),
            "sustainGain" => self.set_sustain_gain(value),
            "mix" => self.set_mix(value),
            _ => return false,
        }
        true
    }
}

/// Split "threshLow" into ("thresh", Band::Low)
fn band_param(name: &str) -> Option<(&str, Band)> {
    [("Low", Band::Low), ("Mid", Band::Mid), ("High", Band::High)]
        .into_iter()
        .find_map(|(suffix, band)| name.strip_suffix(suffix).map(|stem| (stem, band)))
}

impl NamedParameters for MultibandCompressor {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "lowFreq" => self.set_low_crossover(value),
            "highFreq" => self.set_high_crossover(value),
            "bypass" => self.set_bypass(flag(value)),
            _ => match band_param(name) {
                Some(("thresh", band)) => self.set_threshold(band, value),
                Some(("ratio", band)) => self.set_ratio(band, value),
                Some(("att", band)) => self.set_attack(band, value),
                Some(("rel", band)) => self.set_release(band, value),
                Some(("gain", band)) => self.set_makeup(band, value),
                _ => return false,
            },
        }
        true
    }
}

impl NamedParameters for ParametricEq {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "lowFreq" => self.set_frequency(EqBand::LowShelf, value),
            "lowGain" => self.set_gain(EqBand::LowShelf, value),
            "midFreq" => self.set_frequency(EqBand::Mid, value),
            "midGain" => self.set_gain(EqBand::Mid, value),
            "midQ" => self.set_mid_q(value),
            "highFreq" => self.set_frequency(EqBand::HighShelf, value),
            "highGain" => self.set_gain(EqBand::HighShelf, value),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for MidSideEq {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "midGain" => self.set_mid_gain(value),
            "midFreq" => self.set_mid_frequency(value),
            "sideGain" => self.set_side_gain(value),
            "sideFreq" => self.set_side_frequency(value),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for StereoImager {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "lowFreq" => self.set_low_crossover(value),
            "highFreq" => self.set_high_crossover(value),
            "widthLow" => self.set_width(0, value),
            "widthMid" => self.set_width(1, value),
            "widthHigh" => self.set_width(2, value),
            "bypass" => self.set_bypass(flag(value)),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for Saturator {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "drive" => self.set_drive(value),
            "type" => self.set_type(SaturationType::from_index(value)),
            "outputGain" => self.set_output_gain(value),
            "mix" => self.set_mix(value),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for Distortion {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "drive" => self.set_drive(value),
            "wet" => self.set_wet(value),
            "type" => self.set_shape(DistortionShape::from_index(value)),
            "outputGain" => self.set_output_gain(value),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for BitCrusher {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "bits" => self.set_bits(value),
            "normFreq" => self.set_norm_freq(value),
            "mix" => self.set_mix(value),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for Dither {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "bitDepth" => self.set_bit_depth(value),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for Chorus {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "frequency" => self.set_rate(value),
            "delayTime" => self.set_delay_time(value),
            "depth" => self.set_depth(value),
            "feedback" => self.set_feedback(value),
            "wet" => self.set_wet(value),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for Phaser {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "stages" => self.set_stages(value),
            "frequency" => self.set_rate(value),
            "baseFrequency" => self.set_base_frequency(value),
            "octaves" => self.set_octaves(value),
            "wet" => self.set_wet(value),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for Tremolo {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "frequency" => self.set_rate(value),
            "depth" => self.set_depth(value),
            "spread" => self.set_spread(value),
            "waveform" => self.set_waveform(LfoWaveform::from_index(value)),
            "mix" => self.set_mix(value),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for AutoWah {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "baseFrequency" => self.set_base_frequency(value),
            "sensitivity" => self.set_sensitivity(value),
            "octaves" => self.set_octaves(value),
            "Q" => self.set_q(value),
            "attack" => self.set_attack(value),
            "release" => self.set_release(value),
            "wet" => self.set_wet(value),
            _ => return false,
        }
        true
    }
}

impl NamedParameters for FeedbackDelay {
    fn set_named(&mut self, name: &str, value: f64) -> bool {
        match name {
            "delayTime" => self.set_delay_time(value),
            "feedback" => self.set_feedback(value),
            "wet" => self.set_wet(value),
            _ => return false,
        }
        true
    }
}

// ============ Effect node ============

/// Wrapper for processors without telemetry
pub struct EffectNode<P> {
    name: &'static str,
    inner: P,
}

impl<P> EffectNode<P> {
    pub fn new(name: &'static str, inner: P) -> Self {
        Self { name, inner }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: StereoProcessor + NamedParameters> RackProcessor for EffectNode<P> {
    fn name(&self) -> &str {
        self.name
    }

    fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        self.inner.process_block(left, right);
    }

    fn apply_parameter(&mut self, name: &str, value: f64) -> bool {
        self.inner.set_named(name, value)
    }

    fn latency(&self) -> usize {
        self.inner.latency()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

// ============ Dynamics node ============

/// Source of the peak gain reduction since the last read (dB)
pub trait ReductionSource {
    fn take_reduction(&mut self) -> f64;
}

impl ReductionSource for Compressor {
    fn take_reduction(&mut self) -> f64 {
        self.take_peak_reduction()
    }
}

impl ReductionSource for Limiter {
    fn take_reduction(&mut self) -> f64 {
        self.take_peak_reduction()
    }
}

impl ReductionSource for DynamicEq {
    fn take_reduction(&mut self) -> f64 {
        self.take_peak_reduction()
    }
}

impl ReductionSource for DeEsser {
    fn take_reduction(&mut self) -> f64 {
        self.take_peak_reduction()
    }
}

impl ReductionSource for MultibandCompressor {
    // Instantaneous reading of the most reduced band
    fn take_reduction(&mut self) -> f64 {
        [Band::Low, Band::Mid, Band::High]
            .into_iter()
            .map(|band| self.gain_reduction(band))
            .fold(0.0, f64::max)
    }
}

/// Wrapper for dynamics processors that post gain reduction
pub struct DynamicsNode<P> {
    name: &'static str,
    inner: P,
    meter: Arc<ModuleMeter>,
    throttle: Throttle,
}

impl<P> DynamicsNode<P> {
    pub(crate) fn new(name: &'static str, inner: P, throttle: Throttle) -> Self {
        Self {
            name,
            inner,
            meter: Arc::new(ModuleMeter::new()),
            throttle,
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: StereoProcessor + NamedParameters + ReductionSource> RackProcessor for DynamicsNode<P> {
    fn name(&self) -> &str {
        self.name
    }

    fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        self.inner.process_block(left, right);
        if self.throttle.tick(left.len()) {
            self.meter.publish_gain_reduction(self.inner.take_reduction());
        }
    }

    fn apply_parameter(&mut self, name: &str, value: f64) -> bool {
        self.inner.set_named(name, value)
    }

    fn latency(&self) -> usize {
        self.inner.latency()
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.throttle.reset();
    }

    fn meter(&self) -> Option<&Arc<ModuleMeter>> {
        Some(&self.meter)
    }
}

// ============ Loudness node ============

/// Loudness meter: audio passes through, readings are posted on a throttle
pub struct LoudnessNode {
    loudness: LoudnessMeter,
    meter: Arc<ModuleMeter>,
    throttle: Throttle,
}

impl LoudnessNode {
    pub(crate) fn new(sample_rate: f64, interval_samples: usize) -> Self {
        Self {
            loudness: LoudnessMeter::new(sample_rate),
            meter: Arc::new(ModuleMeter::new()),
            throttle: Throttle::samples(interval_samples),
        }
    }
}

impl RackProcessor for LoudnessNode {
    fn name(&self) -> &str {
        "Loudness Meter"
    }

    fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        self.loudness.measure_block(left, right);
        if self.throttle.tick(left.len()) {
            self.meter
                .publish_loudness(self.loudness.momentary(), self.loudness.short_term());
        }
    }

    fn apply_parameter(&mut self, _name: &str, _value: f64) -> bool {
        false
    }

    fn reset(&mut self) {
        self.loudness.reset();
        self.throttle.reset();
    }

    fn meter(&self) -> Option<&Arc<ModuleMeter>> {
        Some(&self.meter)
    }
}

// ============ Cabinet node ============

/// Convolution cabinet with an internal dry/wet summing stage
pub struct CabSimNode {
    cab: CabSimulator,
    /// Buffer the convolvers were built from
    ir: Option<Arc<AudioBuffer>>,
}

impl CabSimNode {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            cab: CabSimulator::new(sample_rate),
            ir: None,
        }
    }

    pub fn has_impulse_response(&self) -> bool {
        self.cab.has_impulse_response()
    }

    /// (dry, wet) gains
    pub fn gains(&self) -> (f64, f64) {
        self.cab.gains()
    }
}

impl RackProcessor for CabSimNode {
    fn name(&self) -> &str {
        "Cab Sim"
    }

    fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        self.cab.process_block(left, right);
    }

    fn apply_parameter(&mut self, name: &str, value: f64) -> bool {
        match name {
            "mix" => self.cab.set_mix(value),
            _ => return false,
        }
        true
    }

    fn attach_asset(&mut self, name: &str, asset: Option<&Arc<AudioBuffer>>) -> bool {
        if name != IR_ASSET_PARAM {
            return false;
        }
        // Same buffer: keep the convolution tail
        let unchanged = match (&self.ir, asset) {
            (Some(current), Some(next)) => Arc::ptr_eq(current, next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return true;
        }
        match asset {
            Some(ir) => self.cab.load_impulse_response(ir),
            None => self.cab.clear_impulse_response(),
        }
        self.ir = asset.cloned();
        true
    }

    fn latency(&self) -> usize {
        self.cab.latency()
    }

    fn reset(&mut self) {
        self.cab.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    #[test]
    fn test_compressor_names() {
        let mut comp = Compressor::new(SR);
        for name in [
            "threshold",
            "ratio",
            "attack",
            "release",
            "knee",
            "makeupGain",
            "mode",
            "mix",
        ] {
            assert!(comp.set_named(name, 1.0), "{name}");
        }
        assert!(!comp.set_named("makeup", 1.0));
        assert_eq!(comp.mode(), CompressorMode::from_index(1.0));
    }

    #[test]
    fn test_band_param_split() {
        assert_eq!(band_param("threshLow"), Some(("thresh", Band::Low)));
        assert_eq!(band_param("relMid"), Some(("rel", Band::Mid)));
        assert_eq!(band_param("gainHigh"), Some(("gain", Band::High)));
        assert_eq!(band_param("lowFreq"), None);

        let mut mb = MultibandCompressor::new(SR);
        assert!(mb.set_named("attHigh", 0.002));
        assert!(!mb.set_named("kneeLow", 3.0));
    }

    #[test]
    fn test_imager_widths_by_name() {
        let mut imager = StereoImager::new(SR);
        assert!(imager.set_named("widthLow", 0.5));
        assert!(imager.set_named("widthHigh", 2.0));
        assert_eq!(imager.widths(), [0.5, 1.0, 2.0]);
    }

    #[test]
    fn test_dynamics_node_posts_on_throttle() {
        let mut comp = Compressor::new(SR);
        comp.set_threshold(-40.0);
        let mut node = DynamicsNode::new("Compressor", comp, Throttle::blocks(4));
        let meter = Arc::clone(node.meter().unwrap());

        let mut left = vec![0.5; 128];
        let mut right = vec![0.5; 128];
        for _ in 0..3 {
            node.process(&mut left, &mut right);
        }
        assert_eq!(meter.updates(), 0);
        node.process(&mut left, &mut right);
        assert_eq!(meter.updates(), 1);
        assert!(meter.gain_reduction.load() > 10.0);
    }

    #[test]
    fn test_loudness_node_passes_audio() {
        let mut node = LoudnessNode::new(SR, 256);
        let meter = Arc::clone(node.meter().unwrap());
        let mut left: Vec<f64> = (0..512)
            .map(|i| 0.3 * (std::f64::consts::TAU * 1000.0 * i as f64 / SR).sin())
            .collect();
        let mut right = left.clone();
        let original = left.clone();
        node.process(&mut left, &mut right);
        assert_eq!(left, original);
        assert_eq!(meter.updates(), 1);
        assert!(meter.momentary.load() > -100.0);
    }

    #[test]
    fn test_cab_node_asset_attach_and_detach() {
        let mut node = CabSimNode::new(SR);
        assert!(!node.has_impulse_response());
        let ir = Arc::new(AudioBuffer::mono(SR, vec![1.0, 0.5, 0.25]).unwrap());
        assert!(node.attach_asset(IR_ASSET_PARAM, Some(&ir)));
        assert!(node.has_impulse_response());
        assert!(node.attach_asset(IR_ASSET_PARAM, None));
        assert!(!node.has_impulse_response());
        assert!(!node.attach_asset("otherAsset", Some(&ir)));

        assert!(node.apply_parameter("mix", 0.25));
        assert_eq!(node.gains(), (0.75, 0.25));
    }

    #[test]
    fn test_cab_node_reattach_keeps_tail() {
        let decay: Vec<f64> = (0..2048).map(|i| 0.999_f64.powi(i)).collect();
        let ir = Arc::new(AudioBuffer::mono(SR, decay.clone()).unwrap());
        let mut node = CabSimNode::new(SR);
        node.apply_parameter("mix", 1.0);
        node.attach_asset(IR_ASSET_PARAM, Some(&ir));

        let mut left = vec![0.0; 256];
        let mut right = vec![0.0; 256];
        left[0] = 1.0;
        right[0] = 1.0;
        node.process(&mut left, &mut right);

        // Same Arc again: no reload
        assert!(node.attach_asset(IR_ASSET_PARAM, Some(&ir)));
        left.fill(0.0);
        right.fill(0.0);
        node.process(&mut left, &mut right);
        assert!(left.iter().any(|x| x.abs() > 0.1), "tail was cut");

        // A different buffer with the same contents is a new IR
        let copy = Arc::new(AudioBuffer::mono(SR, decay).unwrap());
        node.attach_asset(IR_ASSET_PARAM, Some(&copy));
        left.fill(0.0);
        right.fill(0.0);
        node.process(&mut left, &mut right);
        assert!(left.iter().all(|x| x.abs() < 1e-9));
    }
}
