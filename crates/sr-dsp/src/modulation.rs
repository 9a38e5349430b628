//! Modulation: LFO, one-pole all-pass, chorus, phaser, tremolo, auto-wah

use sr_core::Sample;
use std::f64::consts::{FRAC_2_PI, FRAC_PI_2, PI, TAU};

use crate::biquad::{Biquad, FilterType};
use crate::delay::DelayLine;
use crate::dynamics::EnvelopeFollower;
use crate::{MonoProcessor, Processor, ProcessorConfig, StereoProcessor};

// ============ LFO ============

/// LFO output shape; all shapes share one phase accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LfoWaveform {
    #[default]
    Sine,
    Triangle,
    Saw,
    Square,
}

impl LfoWaveform {
    /// 0 = sine, 1 = triangle, 2 = saw, 3 = square (rounded)
    pub fn from_index(value: f64) -> Self {
        match value.round() as i64 {
            1 => LfoWaveform::Triangle,
            2 => LfoWaveform::Saw,
            3 => LfoWaveform::Square,
            _ => LfoWaveform::Sine,
        }
    }
}

/// Phase accumulator oscillator, output in [-1, 1]
#[derive(Debug, Clone, Default)]
pub struct Lfo {
    phase: f64,
}

impl Lfo {
    pub fn new() -> Self {
        Self { phase: 0.0 }
    }

    pub fn with_phase(phase: f64) -> Self {
        Self { phase }
    }

    #[inline]
    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn set_phase(&mut self, phase: f64) {
        self.phase = phase.rem_euclid(TAU);
    }

    /// Advance by one sample and return `sin(phase)`
    #[inline]
    pub fn process(&mut self, freq: f64, sample_rate: f64) -> f64 {
        self.advance(freq, sample_rate);
        self.phase.sin()
    }

    #[inline]
    pub fn advance(&mut self, freq: f64, sample_rate: f64) {
        self.phase += TAU * freq / sample_rate;
        if self.phase > TAU {
            self.phase -= TAU;
        }
    }

    /// Current value for a waveform without advancing
    #[inline]
    pub fn value(&self, waveform: LfoWaveform) -> f64 {
        let s = self.phase.sin();
        match waveform {
            LfoWaveform::Sine => s,
            LfoWaveform::Triangle => FRAC_2_PI * s.asin(),
            LfoWaveform::Saw => self.phase / PI - 1.0,
            LfoWaveform::Square => {
                if s >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

// ============ One-pole all-pass ============

/// First-order all-pass: `y = a*x + x[n-1] - a*y[n-1]`
#[derive(Debug, Clone, Copy, Default)]
pub struct OnePoleAllPass {
    x1: f64,
    y1: f64,
}

impl OnePoleAllPass {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn process(&mut self, input: Sample, alpha: f64) -> Sample {
        let output = alpha * input + self.x1 - alpha * self.y1;
        self.x1 = input;
        self.y1 = output;
        output
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

// ============ Chorus ============

/// Longest modulated delay (seconds)
const CHORUS_BUFFER_SECS: f64 = 0.5;

/// Stereo chorus: LFO-modulated delay read with feedback.
/// The right LFO runs a quarter cycle ahead.
#[derive(Debug, Clone)]
pub struct Chorus {
    lines: [DelayLine; 2],
    lfos: [Lfo; 2],
    rate: f64,
    delay_time: f64,
    depth: f64,
    feedback: f64,
    wet: f64,
    sample_rate: f64,
}

impl Chorus {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            lines: [
                DelayLine::new(CHORUS_BUFFER_SECS, sample_rate),
                DelayLine::new(CHORUS_BUFFER_SECS, sample_rate),
            ],
            lfos: [Lfo::new(), Lfo::with_phase(FRAC_PI_2)],
            rate: 1.5,
            delay_time: 0.03,
            depth: 0.002,
            feedback: 0.0,
            wet: 0.5,
            sample_rate,
        }
    }

    /// LFO rate (Hz)
    pub fn set_rate(&mut self, hz: f64) {
        self.rate = hz;
    }

    /// Base delay (seconds)
    pub fn set_delay_time(&mut self, seconds: f64) {
        self.delay_time = seconds;
    }

    /// Modulation depth (seconds)
    pub fn set_depth(&mut self, seconds: f64) {
        self.depth = seconds;
    }

    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = feedback;
    }

    pub fn set_wet(&mut self, wet: f64) {
        self.wet = wet;
    }

    #[inline]
    fn tick(&mut self, ch: usize, x: Sample) -> Sample {
        let lfo = self.lfos[ch].process(self.rate, self.sample_rate);
        let mod_delay = (self.delay_time + self.depth * lfo) * self.sample_rate;
        let line = &mut self.lines[ch];
        let delayed = line.read(mod_delay);
        line.write(x + delayed * self.feedback);
        x * (1.0 - self.wet) + delayed * self.wet
    }
}

impl Processor for Chorus {
    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
        self.lfos = [Lfo::new(), Lfo::with_phase(FRAC_PI_2)];
    }
}

impl StereoProcessor for Chorus {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        (self.tick(0, left), self.tick(1, right))
    }
}

impl ProcessorConfig for Chorus {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.lines = [
            DelayLine::new(CHORUS_BUFFER_SECS, sample_rate),
            DelayLine::new(CHORUS_BUFFER_SECS, sample_rate),
        ];
    }
}

// ============ Phaser ============

pub const MAX_PHASER_STAGES: usize = 12;

/// All-pass cascade swept by one shared LFO
#[derive(Debug, Clone)]
pub struct Phaser {
    stages: [[OnePoleAllPass; MAX_PHASER_STAGES]; 2],
    lfo: Lfo,
    num_stages: usize,
    rate: f64,
    base_freq: f64,
    octaves: f64,
    wet: f64,
    sample_rate: f64,
}

impl Phaser {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            stages: [[OnePoleAllPass::new(); MAX_PHASER_STAGES]; 2],
            lfo: Lfo::new(),
            num_stages: 4,
            rate: 0.5,
            base_freq: 1000.0,
            octaves: 2.0,
            wet: 0.5,
            sample_rate,
        }
    }

    /// Stage count, rounded and limited to the pre-allocated cascade
    pub fn set_stages(&mut self, stages: f64) {
        self.num_stages = (stages.round().max(0.0) as usize).min(MAX_PHASER_STAGES);
    }

    pub fn set_rate(&mut self, hz: f64) {
        self.rate = hz;
    }

    pub fn set_base_frequency(&mut self, hz: f64) {
        self.base_freq = hz;
    }

    pub fn set_octaves(&mut self, octaves: f64) {
        self.octaves = octaves;
    }

    pub fn set_wet(&mut self, wet: f64) {
        self.wet = wet;
    }

    pub fn num_stages(&self) -> usize {
        self.num_stages
    }

    /// All-pass coefficient for the current sweep position
    #[inline]
    fn alpha(&self, lfo: f64) -> f64 {
        let freq = (self.base_freq * 2.0_f64.powf(lfo * self.octaves))
            .clamp(20.0, self.sample_rate / 2.1);
        let t = (PI * freq / self.sample_rate).tan();
        (t - 1.0) / (t + 1.0)
    }
}

impl Processor for Phaser {
    fn reset(&mut self) {
        for channel in &mut self.stages {
            for stage in channel.iter_mut() {
                stage.reset();
            }
        }
        self.lfo.reset();
    }
}

impl StereoProcessor for Phaser {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let lfo = self.lfo.process(self.rate, self.sample_rate);
        let alpha = self.alpha(lfo);
        let n = self.num_stages;
        let wet = self.wet;

        let mut out = [left, right];
        for (ch, sample) in out.iter_mut().enumerate() {
            let dry = *sample;
            let mut s = dry;
            for stage in &mut self.stages[ch][..n] {
                s = stage.process(s, alpha);
            }
            *sample = dry * (1.0 - wet) + s * wet;
        }
        (out[0], out[1])
    }
}

impl ProcessorConfig for Phaser {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }
}

// ============ Tremolo ============

/// Amplitude modulation, `gain = 1 - depth + depth * lfo`.
///
/// At depth above 0.5 the gain swings negative, inverting the signal at
/// the LFO trough.
#[derive(Debug, Clone)]
pub struct Tremolo {
    lfo: Lfo,
    rate: f64,
    depth: f64,
    spread: f64,
    waveform: LfoWaveform,
    mix: f64,
    sample_rate: f64,
}

impl Tremolo {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            lfo: Lfo::new(),
            rate: 4.0,
            depth: 0.5,
            spread: 0.0,
            waveform: LfoWaveform::Sine,
            mix: 1.0,
            sample_rate,
        }
    }

    pub fn set_rate(&mut self, hz: f64) {
        self.rate = hz;
    }

    pub fn set_depth(&mut self, depth: f64) {
        self.depth = depth;
    }

    /// Channel spread; |spread| >= 0.9 inverts the right channel's LFO
    pub fn set_spread(&mut self, spread: f64) {
        self.spread = spread;
    }

    pub fn set_waveform(&mut self, waveform: LfoWaveform) {
        self.waveform = waveform;
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix;
    }
}

impl Processor for Tremolo {
    fn reset(&mut self) {
        self.lfo.reset();
    }
}

impl StereoProcessor for Tremolo {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        self.lfo.advance(self.rate, self.sample_rate);
        let mod_l = self.lfo.value(self.waveform);
        let mod_r = if self.spread.abs() >= 0.9 { -mod_l } else { mod_l };

        let apply = |x: Sample, m: f64| {
            let gain = 1.0 - self.depth + self.depth * m;
            x * (1.0 - self.mix) + x * gain * self.mix
        };
        (apply(left, mod_l), apply(right, mod_r))
    }
}

impl ProcessorConfig for Tremolo {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }
}

// ============ Auto-wah ============

/// Envelope-controlled bandpass, `cutoff = base * 2^(env * sensitivity * octaves)`
#[derive(Debug, Clone)]
pub struct AutoWah {
    followers: [EnvelopeFollower; 2],
    filters: [Biquad; 2],
    base_freq: f64,
    sensitivity: f64,
    octaves: f64,
    q: f64,
    wet: f64,
    sample_rate: f64,
}

impl AutoWah {
    pub fn new(sample_rate: f64) -> Self {
        let follower = EnvelopeFollower::new(0.01, 0.1, sample_rate);
        let filter = Biquad::new(FilterType::Bandpass, 100.0, 0.0, 2.0, sample_rate);
        Self {
            followers: [follower.clone(), follower],
            filters: [filter.clone(), filter],
            base_freq: 100.0,
            sensitivity: 0.5,
            octaves: 4.0,
            q: 2.0,
            wet: 1.0,
            sample_rate,
        }
    }

    pub fn set_base_frequency(&mut self, hz: f64) {
        self.base_freq = hz;
    }

    pub fn set_sensitivity(&mut self, sensitivity: f64) {
        self.sensitivity = sensitivity;
    }

    pub fn set_octaves(&mut self, octaves: f64) {
        self.octaves = octaves;
    }

    pub fn set_q(&mut self, q: f64) {
        self.q = q;
    }

    /// Follower attack (seconds)
    pub fn set_attack(&mut self, seconds: f64) {
        for f in &mut self.followers {
            f.set_attack(seconds);
        }
    }

    /// Follower release (seconds)
    pub fn set_release(&mut self, seconds: f64) {
        for f in &mut self.followers {
            f.set_release(seconds);
        }
    }

    pub fn set_wet(&mut self, wet: f64) {
        self.wet = wet;
    }

    #[inline]
    fn tick(&mut self, ch: usize, x: Sample) -> Sample {
        let env = self.followers[ch].process(x);
        let cutoff = (self.base_freq * 2.0_f64.powf(env * self.sensitivity * self.octaves))
            .min(self.sample_rate / 2.1);
        let filter = &mut self.filters[ch];
        filter.set_params(FilterType::Bandpass, cutoff, 0.0, self.q);
        let band = filter.process_sample(x);
        x * (1.0 - self.wet) + band * self.wet
    }
}

impl Processor for AutoWah {
    fn reset(&mut self) {
        for f in &mut self.followers {
            f.reset();
        }
        for f in &mut self.filters {
            Processor::reset(f);
        }
    }
}

impl StereoProcessor for AutoWah {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        (self.tick(0, left), self.tick(1, right))
    }
}

impl ProcessorConfig for AutoWah {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for f in &mut self.followers {
            f.set_sample_rate(sample_rate);
        }
        for f in &mut self.filters {
            f.set_sample_rate(sample_rate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lfo_range_and_period() {
        let sr = 1000.0;
        let mut lfo = Lfo::new();
        let first = lfo.process(10.0, sr);
        assert!((first - (TAU * 10.0 / sr).sin()).abs() < 1e-12);
        for _ in 0..98 {
            let v = lfo.process(10.0, sr);
            assert!((-1.0..=1.0).contains(&v));
        }
        // 100 samples per cycle
        assert!(lfo.process(10.0, sr).abs() < 1e-9);
    }

    #[test]
    fn test_lfo_waveforms_bounded() {
        let mut lfo = Lfo::new();
        for _ in 0..2000 {
            lfo.advance(3.0, 1000.0);
            for w in [
                LfoWaveform::Sine,
                LfoWaveform::Triangle,
                LfoWaveform::Saw,
                LfoWaveform::Square,
            ] {
                let v = lfo.value(w);
                assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&v), "{w:?} = {v}");
            }
        }
    }

    #[test]
    fn test_one_pole_allpass_preserves_energy() {
        let mut ap = OnePoleAllPass::new();
        let mut e_in = 0.0;
        let mut e_out = 0.0;
        for i in 0..20000 {
            let x = (i as f64 * 0.37).sin() * 0.5 + (i as f64 * 0.05).cos() * 0.3;
            let y = ap.process(x, 0.5);
            e_in += x * x;
            e_out += y * y;
        }
        assert!((e_out / e_in - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_tremolo_gain_range() {
        let mut trem = Tremolo::new(1000.0);
        trem.set_rate(10.0);
        trem.set_depth(1.0);
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for _ in 0..1000 {
            let (l, _) = trem.process_sample(1.0, 1.0);
            min = min.min(l);
            max = max.max(l);
        }
        // Full depth inverts at the trough
        assert!((max - 1.0).abs() < 1e-3);
        assert!((min + 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_tremolo_spread_inverts_right() {
        let mut trem = Tremolo::new(1000.0);
        trem.set_depth(0.5);
        trem.set_spread(1.0);
        for _ in 0..100 {
            let (l, r) = trem.process_sample(1.0, 1.0);
            // gain_l + gain_r = 2 * (1 - depth)
            assert!((l + r - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_phaser_dry_passthrough_at_zero_wet() {
        let mut phaser = Phaser::new(48000.0);
        phaser.set_wet(0.0);
        phaser.set_stages(8.0);
        assert_eq!(phaser.num_stages(), 8);
        for i in 0..256 {
            let x = (i as f64 * 0.1).sin();
            let (l, r) = phaser.process_sample(x, -x);
            assert_eq!(l, x);
            assert_eq!(r, -x);
        }
    }

    #[test]
    fn test_phaser_stage_limit() {
        let mut phaser = Phaser::new(48000.0);
        phaser.set_stages(40.0);
        assert_eq!(phaser.num_stages(), MAX_PHASER_STAGES);
    }

    #[test]
    fn test_chorus_is_finite_with_feedback() {
        let mut chorus = Chorus::new(48000.0);
        chorus.set_feedback(0.95);
        chorus.set_wet(1.0);
        for i in 0..48000 {
            let x = (i as f64 * 0.05).sin();
            let (l, r) = chorus.process_sample(x, x);
            assert!(l.is_finite() && r.is_finite());
        }
    }

    #[test]
    fn test_autowah_zero_wet_is_dry() {
        let mut wah = AutoWah::new(48000.0);
        wah.set_wet(0.0);
        for i in 0..512 {
            let x = (i as f64 * 0.2).sin() * 0.8;
            let (l, _) = wah.process_sample(x, x);
            assert!((l - x).abs() < 1e-15);
        }
    }
}
