//! Dynamics processors: compressor, limiter, dynamic EQ, de-esser, transient shaper
//!
//! - Four compressor topologies (VCA, FET, Opto, VarMu), dual-mono
//! - Lookahead limiter with a guaranteed output ceiling
//! - Sidechain-driven dynamic EQ band with block-rate or per-sample automation
//! - Split-band-detect de-esser with sidechain monitor
//! - Two-follower transient shaper

use std::collections::VecDeque;

use sr_core::{Sample, db_to_gain, level_db};

use crate::biquad::{Biquad, FilterType};
use crate::delay::DelayLine;
use crate::{MonoProcessor, ParamInput, Processor, ProcessorConfig, StereoProcessor};

/// Minimum follower time constant (seconds)
const FOLLOWER_MIN_TIME: f64 = 0.001;

#[inline]
fn time_coeff(seconds: f64, floor: f64, sample_rate: f64) -> f64 {
    (-1.0 / (seconds.max(floor) * sample_rate)).exp()
}

// ============ Envelope follower ============

/// One-pole asymmetric peak follower on `|x|`
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    attack: f64,
    release: f64,
    attack_coeff: f64,
    release_coeff: f64,
    envelope: f64,
    sample_rate: f64,
}

impl EnvelopeFollower {
    /// Attack and release in seconds
    pub fn new(attack: f64, release: f64, sample_rate: f64) -> Self {
        let mut follower = Self {
            attack,
            release,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
            sample_rate,
        };
        follower.update_coeffs();
        follower
    }

    fn update_coeffs(&mut self) {
        self.attack_coeff = time_coeff(self.attack, FOLLOWER_MIN_TIME, self.sample_rate);
        self.release_coeff = time_coeff(self.release, FOLLOWER_MIN_TIME, self.sample_rate);
    }

    /// Set attack and release times in seconds
    pub fn set_times(&mut self, attack: f64, release: f64) {
        self.attack = attack;
        self.release = release;
        self.update_coeffs();
    }

    pub fn set_attack(&mut self, attack: f64) {
        self.attack = attack;
        self.attack_coeff = time_coeff(attack, FOLLOWER_MIN_TIME, self.sample_rate);
    }

    pub fn set_release(&mut self, release: f64) {
        self.release = release;
        self.release_coeff = time_coeff(release, FOLLOWER_MIN_TIME, self.sample_rate);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coeffs();
    }

    #[inline(always)]
    pub fn process(&mut self, input: Sample) -> f64 {
        let abs_input = input.abs();
        let coeff = if abs_input > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = abs_input + coeff * (self.envelope - abs_input);
        self.envelope
    }

    #[inline]
    pub fn envelope(&self) -> f64 {
        self.envelope
    }

    pub fn set_envelope(&mut self, value: f64) {
        self.envelope = value;
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

// ============ Compressor ============

/// Compressor topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressorMode {
    /// Feed-forward, detector = input
    #[default]
    Vca,
    /// Feedback, detector = previous output
    Fet,
    /// Program-dependent release
    Opto,
    /// Ratio grows with overshoot
    VarMu,
}

impl CompressorMode {
    /// 0 = VCA, 1 = FET, 2 = Opto, 3 = VarMu (rounded)
    pub fn from_index(value: f64) -> Self {
        match value.round() as i64 {
            1 => CompressorMode::Fet,
            2 => CompressorMode::Opto,
            3 => CompressorMode::VarMu,
            _ => CompressorMode::Vca,
        }
    }
}

const COMP_MIN_ATTACK: f64 = 0.0001;
const COMP_MIN_RELEASE: f64 = 0.001;

/// Per-channel gain computer state
#[derive(Debug, Clone, Copy, Default)]
struct CompressorChannel {
    /// Smoothed gain reduction (dB)
    gr: f64,
    /// Last processed (pre-mix) output, the FET detector
    last_output: f64,
}

/// Feed-forward VCA gain computer with exponential ballistics.
///
/// Shared by the multiband compressor bands.
#[derive(Debug, Clone)]
pub struct VcaCore {
    threshold_db: f64,
    ratio: f64,
    attack_coeff: f64,
    release_coeff: f64,
    makeup: f64,
    gr: f64,
    attack: f64,
    release: f64,
    sample_rate: f64,
}

impl VcaCore {
    pub fn new(sample_rate: f64) -> Self {
        let mut core = Self {
            threshold_db: -24.0,
            ratio: 4.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            makeup: 1.0,
            gr: 0.0,
            attack: 0.01,
            release: 0.1,
            sample_rate,
        };
        core.update_coeffs();
        core
    }

    fn update_coeffs(&mut self) {
        self.attack_coeff = time_coeff(self.attack, COMP_MIN_ATTACK, self.sample_rate);
        self.release_coeff = time_coeff(self.release, COMP_MIN_RELEASE, self.sample_rate);
    }

    pub fn set_threshold(&mut self, db: f64) {
        self.threshold_db = db;
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio;
    }

    pub fn set_attack(&mut self, seconds: f64) {
        self.attack = seconds;
        self.update_coeffs();
    }

    pub fn set_release(&mut self, seconds: f64) {
        self.release = seconds;
        self.update_coeffs();
    }

    /// Makeup gain (dB)
    pub fn set_makeup(&mut self, db: f64) {
        self.makeup = db_to_gain(db);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coeffs();
    }

    #[inline]
    pub fn gain_reduction(&self) -> f64 {
        self.gr
    }

    #[inline]
    pub fn process(&mut self, input: Sample) -> Sample {
        let overshoot = level_db(input) - self.threshold_db;
        let target = if overshoot > 0.0 {
            overshoot * (1.0 - 1.0 / self.ratio.max(1.0))
        } else {
            0.0
        };
        let coeff = if target > self.gr {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.gr = coeff * self.gr + (1.0 - coeff) * target;
        input * db_to_gain(-self.gr) * self.makeup
    }

    pub fn reset(&mut self) {
        self.gr = 0.0;
    }
}

/// Dual-mono compressor with selectable topology
#[derive(Debug, Clone)]
pub struct Compressor {
    channels: [CompressorChannel; 2],
    mode: CompressorMode,
    threshold_db: f64,
    ratio: f64,
    attack: f64,
    release: f64,
    knee: f64,
    makeup: f64,
    mix: f64,
    attack_coeff: f64,
    release_coeff: f64,
    peak_reduction: f64,
    sample_rate: f64,
}

impl Compressor {
    pub fn new(sample_rate: f64) -> Self {
        let mut comp = Self {
            channels: [CompressorChannel::default(); 2],
            mode: CompressorMode::Vca,
            threshold_db: -24.0,
            ratio: 4.0,
            attack: 0.01,
            release: 0.1,
            knee: 5.0,
            makeup: 1.0,
            mix: 1.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            peak_reduction: 0.0,
            sample_rate,
        };
        comp.update_coeffs();
        comp
    }

    fn update_coeffs(&mut self) {
        self.attack_coeff = time_coeff(self.attack, COMP_MIN_ATTACK, self.sample_rate);
        self.release_coeff = time_coeff(self.release, COMP_MIN_RELEASE, self.sample_rate);
    }

    pub fn set_mode(&mut self, mode: CompressorMode) {
        self.mode = mode;
    }

    pub fn set_threshold(&mut self, db: f64) {
        self.threshold_db = db;
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio;
    }

    /// Attack (seconds)
    pub fn set_attack(&mut self, seconds: f64) {
        self.attack = seconds;
        self.update_coeffs();
    }

    /// Release (seconds)
    pub fn set_release(&mut self, seconds: f64) {
        self.release = seconds;
        self.update_coeffs();
    }

    /// VarMu ratio slope
    pub fn set_knee(&mut self, knee: f64) {
        self.knee = knee;
    }

    /// Makeup gain (dB)
    pub fn set_makeup(&mut self, db: f64) {
        self.makeup = db_to_gain(db);
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix;
    }

    pub fn mode(&self) -> CompressorMode {
        self.mode
    }

    /// Current gain reduction of a channel (dB)
    pub fn gain_reduction(&self, channel: usize) -> f64 {
        self.channels.get(channel).map_or(0.0, |c| c.gr)
    }

    /// Largest gain reduction since the last call (dB)
    pub fn take_peak_reduction(&mut self) -> f64 {
        std::mem::take(&mut self.peak_reduction)
    }

    #[inline]
    fn tick(&mut self, ch: usize, x: Sample) -> Sample {
        let state = &mut self.channels[ch];

        let detector = match self.mode {
            CompressorMode::Fet => state.last_output,
            _ => x,
        };
        let abs_in = detector.abs();
        let overshoot = level_db(abs_in) - self.threshold_db;

        let target = if overshoot > 0.0 {
            let ratio = match self.mode {
                CompressorMode::VarMu => 1.0 + overshoot * self.knee * 0.1,
                _ => self.ratio,
            };
            overshoot * (1.0 - 1.0 / ratio.max(1.0))
        } else {
            0.0
        };

        let release_coeff = match self.mode {
            CompressorMode::Opto => self.release_coeff * (1.0 - abs_in.min(1.0)),
            _ => self.release_coeff,
        };

        let coeff = if target > state.gr {
            self.attack_coeff
        } else {
            release_coeff
        };
        state.gr = coeff * state.gr + (1.0 - coeff) * target;
        if state.gr > self.peak_reduction {
            self.peak_reduction = state.gr;
        }

        let processed = x * db_to_gain(-state.gr) * self.makeup;
        state.last_output = processed;
        x * (1.0 - self.mix) + processed * self.mix
    }
}

impl Processor for Compressor {
    fn reset(&mut self) {
        self.channels = [CompressorChannel::default(); 2];
        self.peak_reduction = 0.0;
    }
}

impl StereoProcessor for Compressor {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        (self.tick(0, left), self.tick(1, right))
    }
}

impl ProcessorConfig for Compressor {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coeffs();
    }
}

// ============ Limiter ============

/// Delay buffer length (seconds); bounds the lookahead
const LIMITER_BUFFER_SECS: f64 = 0.05;
pub const LIMITER_MAX_LOOKAHEAD_MS: f64 = 20.0;
const LIMITER_ATTACK: f64 = 0.001;

/// Sliding maximum of `|x|` over the last `window` samples.
///
/// Monotonic deque; capacity is reserved up front so pushes never reallocate
/// while `window` stays within the reserved size.
#[derive(Debug, Clone)]
struct SlidingPeak {
    queue: VecDeque<(u64, f64)>,
    counter: u64,
}

impl SlidingPeak {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity + 1),
            counter: 0,
        }
    }

    /// Push a sample, return the peak over the last `window` samples
    #[inline]
    fn push(&mut self, value: f64, window: usize) -> f64 {
        let v = value.abs();
        while let Some(&(_, back)) = self.queue.back() {
            if back <= v {
                self.queue.pop_back();
            } else {
                break;
            }
        }
        self.queue.push_back((self.counter, v));
        let oldest = self.counter.saturating_sub(window.saturating_sub(1) as u64);
        while let Some(&(idx, _)) = self.queue.front() {
            if idx < oldest {
                self.queue.pop_front();
            } else {
                break;
            }
        }
        self.counter += 1;
        self.queue.front().map_or(0.0, |&(_, p)| p)
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.counter = 0;
    }
}

#[derive(Debug, Clone)]
struct LimiterChannel {
    delay: DelayLine,
    follower: EnvelopeFollower,
    window: SlidingPeak,
}

impl LimiterChannel {
    fn new(sample_rate: f64, release: f64) -> Self {
        let delay = DelayLine::new(LIMITER_BUFFER_SECS, sample_rate);
        let window = SlidingPeak::with_capacity(delay.len());
        Self {
            delay,
            follower: EnvelopeFollower::new(LIMITER_ATTACK, release, sample_rate),
            window,
        }
    }
}

/// Lookahead peak limiter.
///
/// The audio path is delayed by the lookahead while the detector runs on the
/// undelayed input, so gain reduction is already in place when a peak reaches
/// the output. The detector level never drops below the peak still held in
/// the lookahead window, which keeps every output sample at or under the
/// ceiling.
#[derive(Debug, Clone)]
pub struct Limiter {
    channels: [LimiterChannel; 2],
    threshold_db: f64,
    ceiling_db: f64,
    threshold_lin: f64,
    makeup: f64,
    release: f64,
    lookahead_samples: usize,
    lookahead_ms: f64,
    peak_reduction: f64,
    sample_rate: f64,
}

impl Limiter {
    pub fn new(sample_rate: f64) -> Self {
        let release = 0.05;
        let mut limiter = Self {
            channels: [
                LimiterChannel::new(sample_rate, release),
                LimiterChannel::new(sample_rate, release),
            ],
            threshold_db: -6.0,
            ceiling_db: -0.1,
            threshold_lin: 1.0,
            makeup: 1.0,
            release,
            lookahead_samples: 0,
            lookahead_ms: 5.0,
            peak_reduction: 0.0,
            sample_rate,
        };
        limiter.update_gains();
        limiter.set_lookahead(5.0);
        limiter
    }

    fn update_gains(&mut self) {
        self.threshold_lin = db_to_gain(self.threshold_db);
        self.makeup = db_to_gain(self.ceiling_db) / self.threshold_lin;
    }

    pub fn set_threshold(&mut self, db: f64) {
        self.threshold_db = db;
        self.update_gains();
    }

    pub fn set_ceiling(&mut self, db: f64) {
        self.ceiling_db = db;
        self.update_gains();
    }

    /// Release (seconds)
    pub fn set_release(&mut self, seconds: f64) {
        self.release = seconds;
        for ch in &mut self.channels {
            ch.follower.set_release(seconds);
        }
    }

    /// Lookahead in milliseconds, 0..=20, floored to whole samples
    pub fn set_lookahead(&mut self, ms: f64) {
        self.lookahead_ms = ms.clamp(0.0, LIMITER_MAX_LOOKAHEAD_MS);
        let samples = (self.lookahead_ms / 1000.0 * self.sample_rate).floor() as usize;
        let max = self.channels[0].delay.len() - 1;
        self.lookahead_samples = samples.min(max);
    }

    pub fn ceiling_linear(&self) -> f64 {
        db_to_gain(self.ceiling_db)
    }

    /// Largest gain reduction since the last call (dB)
    pub fn take_peak_reduction(&mut self) -> f64 {
        std::mem::take(&mut self.peak_reduction)
    }

    #[inline]
    fn tick(&mut self, ch: usize, x: Sample) -> Sample {
        let lookahead = self.lookahead_samples;
        let state = &mut self.channels[ch];

        let delayed = if lookahead == 0 {
            x
        } else {
            state.delay.read(lookahead as f64)
        };
        state.delay.write(x);

        let env = state.follower.process(x);
        let held_peak = state.window.push(x, lookahead + 1);
        let level = env.max(held_peak);

        let limiting = if level > self.threshold_lin {
            self.threshold_lin / level
        } else {
            1.0
        };
        let gr = -20.0 * limiting.log10();
        if gr > self.peak_reduction {
            self.peak_reduction = gr;
        }

        delayed * limiting * self.makeup
    }
}

impl Processor for Limiter {
    fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.delay.clear();
            ch.follower.reset();
            ch.window.clear();
        }
        self.peak_reduction = 0.0;
    }

    fn latency(&self) -> usize {
        self.lookahead_samples
    }
}

impl StereoProcessor for Limiter {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        (self.tick(0, left), self.tick(1, right))
    }
}

impl ProcessorConfig for Limiter {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.channels = [
            LimiterChannel::new(sample_rate, self.release),
            LimiterChannel::new(sample_rate, self.release),
        ];
        self.set_lookahead(self.lookahead_ms);
    }
}

// ============ Dynamic EQ ============

#[derive(Debug, Clone)]
struct DynamicEqChannel {
    sidechain: Biquad,
    main: Biquad,
    follower: EnvelopeFollower,
}

/// Peaking band whose gain drops as its own band level exceeds a threshold
#[derive(Debug, Clone)]
pub struct DynamicEq {
    channels: [DynamicEqChannel; 2],
    frequency: f64,
    q: f64,
    gain_db: f64,
    threshold_db: f64,
    ratio: f64,
    peak_reduction: f64,
    sample_rate: f64,
}

impl DynamicEq {
    pub fn new(sample_rate: f64) -> Self {
        let (frequency, q) = (1000.0, 1.0);
        let channel = DynamicEqChannel {
            sidechain: Biquad::new(FilterType::Bandpass, frequency, 0.0, q, sample_rate),
            main: Biquad::new(FilterType::Peaking, frequency, 0.0, q, sample_rate),
            follower: EnvelopeFollower::new(0.01, 0.1, sample_rate),
        };
        Self {
            channels: [channel.clone(), channel],
            frequency,
            q,
            gain_db: 0.0,
            threshold_db: -20.0,
            ratio: 2.0,
            peak_reduction: 0.0,
            sample_rate,
        }
    }

    /// Centre frequency for block-rate processing
    pub fn set_frequency(&mut self, hz: f64) {
        self.frequency = hz;
        self.rebase(hz, self.q);
    }

    pub fn set_q(&mut self, q: f64) {
        self.q = q;
        self.rebase(self.frequency, q);
    }

    /// Static band gain (dB)
    pub fn set_gain(&mut self, db: f64) {
        self.gain_db = db;
    }

    pub fn set_threshold(&mut self, db: f64) {
        self.threshold_db = db;
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio;
    }

    pub fn set_attack(&mut self, seconds: f64) {
        for ch in &mut self.channels {
            ch.follower.set_attack(seconds);
        }
    }

    pub fn set_release(&mut self, seconds: f64) {
        for ch in &mut self.channels {
            ch.follower.set_release(seconds);
        }
    }

    /// Largest gain reduction since the last call (dB)
    pub fn take_peak_reduction(&mut self) -> f64 {
        std::mem::take(&mut self.peak_reduction)
    }

    fn rebase(&mut self, freq: f64, q: f64) {
        for ch in &mut self.channels {
            ch.sidechain.update_base(freq, q);
            ch.main.update_base(freq, q);
        }
    }

    #[inline]
    fn tick(&mut self, ch: usize, x: Sample) -> Sample {
        let state = &mut self.channels[ch];
        let band = state.sidechain.process_sample(x);
        let env_db = level_db(state.follower.process(band));

        let reduction = if env_db > self.threshold_db {
            (env_db - self.threshold_db) * (1.0 - 1.0 / self.ratio)
        } else {
            0.0
        };
        if reduction > self.peak_reduction {
            self.peak_reduction = reduction;
        }

        state.main.set_gain(self.gain_db - reduction);
        state.main.process_sample(x)
    }

    /// Process a block with frequency and Q supplied as block values or lanes.
    ///
    /// Constant inputs re-base the filters once; lanes re-base every sample.
    pub fn process_block_automated(
        &mut self,
        left: &mut [Sample],
        right: &mut [Sample],
        frequency: ParamInput<'_>,
        q: ParamInput<'_>,
    ) {
        debug_assert_eq!(left.len(), right.len());
        if frequency.is_constant() && q.is_constant() {
            let (f, q) = (frequency.first(), q.first());
            if f != self.frequency || q != self.q {
                self.frequency = f;
                self.q = q;
                self.rebase(f, q);
            }
            StereoProcessor::process_block(self, left, right);
            return;
        }

        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            self.rebase(frequency.at(i), q.at(i));
            *l = self.tick(0, *l);
            *r = self.tick(1, *r);
        }
        let last = left.len().saturating_sub(1);
        self.frequency = frequency.at(last);
        self.q = q.at(last);
    }
}

impl Processor for DynamicEq {
    fn reset(&mut self) {
        for ch in &mut self.channels {
            Processor::reset(&mut ch.sidechain);
            Processor::reset(&mut ch.main);
            ch.follower.reset();
        }
        self.peak_reduction = 0.0;
    }
}

impl StereoProcessor for DynamicEq {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        (self.tick(0, left), self.tick(1, right))
    }
}

impl ProcessorConfig for DynamicEq {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for ch in &mut self.channels {
            ch.sidechain.set_sample_rate(sample_rate);
            ch.main.set_sample_rate(sample_rate);
            ch.follower.set_sample_rate(sample_rate);
        }
    }
}

// ============ De-esser ============

const DEESSER_SIDECHAIN_Q: f64 = 2.0;

#[derive(Debug, Clone)]
struct DeEsserChannel {
    sidechain: Biquad,
    follower: EnvelopeFollower,
}

/// Broadband gain reduction keyed from a sibilance-band sidechain
#[derive(Debug, Clone)]
pub struct DeEsser {
    channels: [DeEsserChannel; 2],
    threshold_db: f64,
    ratio: f64,
    monitor: bool,
    bypass: bool,
    peak_reduction: f64,
    sample_rate: f64,
}

impl DeEsser {
    pub fn new(sample_rate: f64) -> Self {
        let channel = DeEsserChannel {
            sidechain: Biquad::new(
                FilterType::Bandpass,
                6000.0,
                0.0,
                DEESSER_SIDECHAIN_Q,
                sample_rate,
            ),
            follower: EnvelopeFollower::new(0.005, 0.05, sample_rate),
        };
        Self {
            channels: [channel.clone(), channel],
            threshold_db: -20.0,
            ratio: 4.0,
            monitor: false,
            bypass: false,
            peak_reduction: 0.0,
            sample_rate,
        }
    }

    pub fn set_frequency(&mut self, hz: f64) {
        for ch in &mut self.channels {
            ch.sidechain.update_base(hz, DEESSER_SIDECHAIN_Q);
        }
    }

    pub fn set_threshold(&mut self, db: f64) {
        self.threshold_db = db;
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio;
    }

    pub fn set_attack(&mut self, seconds: f64) {
        for ch in &mut self.channels {
            ch.follower.set_attack(seconds);
        }
    }

    pub fn set_release(&mut self, seconds: f64) {
        for ch in &mut self.channels {
            ch.follower.set_release(seconds);
        }
    }

    /// Route the sidechain to the output
    pub fn set_monitor(&mut self, monitor: bool) {
        self.monitor = monitor;
    }

    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    pub fn take_peak_reduction(&mut self) -> f64 {
        std::mem::take(&mut self.peak_reduction)
    }

    #[inline]
    fn tick(&mut self, ch: usize, x: Sample) -> Sample {
        if self.bypass {
            return x;
        }
        let state = &mut self.channels[ch];
        let sidechain = state.sidechain.process_sample(x);
        let env_db = level_db(state.follower.process(sidechain));

        let reduction = if env_db > self.threshold_db {
            (env_db - self.threshold_db) * (1.0 - 1.0 / self.ratio)
        } else {
            0.0
        };
        if reduction > self.peak_reduction {
            self.peak_reduction = reduction;
        }

        if self.monitor {
            sidechain
        } else {
            x * db_to_gain(-reduction)
        }
    }
}

impl Processor for DeEsser {
    fn reset(&mut self) {
        for ch in &mut self.channels {
            Processor::reset(&mut ch.sidechain);
            ch.follower.reset();
        }
        self.peak_reduction = 0.0;
    }
}

impl StereoProcessor for DeEsser {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        (self.tick(0, left), self.tick(1, right))
    }
}

impl ProcessorConfig for DeEsser {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for ch in &mut self.channels {
            ch.sidechain.set_sample_rate(sample_rate);
            ch.follower.set_sample_rate(sample_rate);
        }
    }
}

// ============ Transient shaper ============

const TRANSIENT_FAST: f64 = 0.010;
const TRANSIENT_SLOW: f64 = 0.100;

/// Attack/sustain shaper driven by the difference of a fast and a slow follower
#[derive(Debug, Clone)]
pub struct TransientShaper {
    fast: [EnvelopeFollower; 2],
    slow: [EnvelopeFollower; 2],
    attack_gain: f64,
    sustain_gain: f64,
    mix: f64,
}

impl TransientShaper {
    pub fn new(sample_rate: f64) -> Self {
        let fast = EnvelopeFollower::new(TRANSIENT_FAST, TRANSIENT_FAST, sample_rate);
        let slow = EnvelopeFollower::new(TRANSIENT_SLOW, TRANSIENT_SLOW, sample_rate);
        Self {
            fast: [fast.clone(), fast],
            slow: [slow.clone(), slow],
            attack_gain: 0.0,
            sustain_gain: 0.0,
            mix: 1.0,
        }
    }

    /// Attack emphasis (dB per unit of envelope difference, halved)
    pub fn set_attack_gain(&mut self, db: f64) {
        self.attack_gain = db;
    }

    pub fn set_sustain_gain(&mut self, db: f64) {
        self.sustain_gain = db;
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix;
    }

    #[inline]
    fn tick(&mut self, ch: usize, x: Sample) -> Sample {
        let fast = self.fast[ch].process(x);
        let slow = self.slow[ch].process(x);
        let delta = fast - slow;
        let gain_db = if delta > 0.0 {
            delta * self.attack_gain * 2.0
        } else {
            delta.abs() * self.sustain_gain * 2.0
        };
        x * (1.0 - self.mix) + x * db_to_gain(gain_db) * self.mix
    }
}

impl Processor for TransientShaper {
    fn reset(&mut self) {
        for f in self.fast.iter_mut().chain(self.slow.iter_mut()) {
            f.reset();
        }
    }
}

impl StereoProcessor for TransientShaper {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        (self.tick(0, left), self.tick(1, right))
    }
}

impl ProcessorConfig for TransientShaper {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        for f in self.fast.iter_mut().chain(self.slow.iter_mut()) {
            f.set_sample_rate(sample_rate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    const SR: f64 = 48000.0;

    fn sine(freq: f64, amp: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| amp * (TAU * freq * i as f64 / SR).sin()).collect()
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|s| s * s).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn test_envelope_attack_and_release() {
        let mut env = EnvelopeFollower::new(0.01, 0.1, 44100.0);
        let out = env.process(1.0);
        assert!(out > 0.0 && out < 1.0);

        let mut env = EnvelopeFollower::new(0.001, 0.1, 44100.0);
        env.set_envelope(1.0);
        let out = env.process(0.0);
        assert!(out < 1.0 && out > 0.9);
    }

    #[test]
    fn test_envelope_time_floor() {
        let mut a = EnvelopeFollower::new(0.0, 0.0, SR);
        let mut b = EnvelopeFollower::new(0.001, 0.001, SR);
        assert_eq!(a.process(0.7), b.process(0.7));
    }

    #[test]
    fn test_compressor_below_threshold_is_transparent() {
        let mut comp = Compressor::new(SR);
        comp.set_threshold(-24.0);
        let input = 0.01; // -40 dB
        for _ in 0..4800 {
            let (l, _) = comp.process_sample(input, input);
            assert!((l - input).abs() < 1e-12);
        }
        assert_eq!(comp.gain_reduction(0), 0.0);
    }

    #[test]
    fn test_compressor_steady_state_reduction() {
        let mut comp = Compressor::new(SR);
        comp.set_threshold(-24.0);
        comp.set_ratio(4.0);
        comp.set_attack(0.005);
        let level = 0.5;
        for _ in 0..48000 {
            comp.process_sample(level, level);
        }
        let expected = (level_db(level) + 24.0) * 0.75;
        assert!((comp.gain_reduction(0) - expected).abs() < 1e-6);
        assert!((comp.take_peak_reduction() - expected).abs() < 1e-6);
        assert_eq!(comp.take_peak_reduction(), 0.0);
    }

    #[test]
    fn test_compressor_mix_zero_is_dry() {
        let mut comp = Compressor::new(SR);
        comp.set_mix(0.0);
        for x in sine(1000.0, 0.9, 2048) {
            let (l, _) = comp.process_sample(x, x);
            assert!((l - x).abs() < 1e-15);
        }
    }

    #[test]
    fn test_compressor_modes_stay_finite() {
        for mode in [
            CompressorMode::Vca,
            CompressorMode::Fet,
            CompressorMode::Opto,
            CompressorMode::VarMu,
        ] {
            let mut comp = Compressor::new(SR);
            comp.set_mode(mode);
            comp.set_knee(20.0);
            let input = sine(440.0, 1.0, 9600);
            let mut out_energy = 0.0;
            for x in &input {
                let (l, r) = comp.process_sample(*x, *x);
                assert!(l.is_finite() && r.is_finite());
                out_energy += l * l;
            }
            let in_energy: f64 = input.iter().map(|x| x * x).sum();
            assert!(out_energy < in_energy, "{mode:?} did not compress");
        }
    }

    #[test]
    fn test_compressor_mode_index() {
        assert_eq!(CompressorMode::from_index(0.0), CompressorMode::Vca);
        assert_eq!(CompressorMode::from_index(1.2), CompressorMode::Fet);
        assert_eq!(CompressorMode::from_index(2.0), CompressorMode::Opto);
        assert_eq!(CompressorMode::from_index(3.0), CompressorMode::VarMu);
        assert_eq!(CompressorMode::from_index(9.0), CompressorMode::Vca);
    }

    #[test]
    fn test_limiter_never_exceeds_ceiling() {
        let mut limiter = Limiter::new(SR);
        limiter.set_threshold(-6.0);
        limiter.set_ceiling(-1.0);
        limiter.set_release(0.05);
        let ceiling = limiter.ceiling_linear();

        for lookahead in [0.0, 1.0, 5.0, 20.0] {
            limiter.set_lookahead(lookahead);
            limiter.reset();
            for i in 0..24000 {
                let t = i as f64;
                // Sine bed with sparse hard spikes
                let mut x = 0.8 * (t * 0.031).sin() + 0.3 * (t * 0.0071).sin();
                if i % 997 == 0 {
                    x = 4.0;
                }
                if i % 1601 == 0 {
                    x = -3.0;
                }
                let (l, r) = limiter.process_sample(x, -x);
                assert!(l.abs() <= ceiling + 1e-12, "lookahead {lookahead}: {l}");
                assert!(r.abs() <= ceiling + 1e-12);
            }
        }
        assert!(limiter.take_peak_reduction() > 0.0);
    }

    #[test]
    fn test_limiter_latency_matches_lookahead() {
        let mut limiter = Limiter::new(SR);
        limiter.set_lookahead(5.0);
        assert_eq!(limiter.latency(), 240);
        limiter.set_threshold(0.0);
        limiter.set_ceiling(0.0);
        let mut first_nonzero = None;
        for i in 0..400 {
            let x = if i == 0 { 0.5 } else { 0.0 };
            let (l, _) = limiter.process_sample(x, x);
            if l != 0.0 && first_nonzero.is_none() {
                first_nonzero = Some(i);
            }
        }
        assert_eq!(first_nonzero, Some(240));
    }

    #[test]
    fn test_limiter_lookahead_clamped() {
        let mut limiter = Limiter::new(SR);
        limiter.set_lookahead(100.0);
        assert_eq!(limiter.latency(), 960);
    }

    #[test]
    fn test_dynamic_eq_quiet_signal_passes() {
        let mut eq = DynamicEq::new(SR);
        eq.set_threshold(0.0);
        let input = sine(1000.0, 0.1, 4800);
        for x in &input {
            let (l, _) = eq.process_sample(*x, *x);
            assert!((l - x).abs() < 1e-9);
        }
        assert_eq!(eq.take_peak_reduction(), 0.0);
    }

    #[test]
    fn test_dynamic_eq_cuts_loud_band() {
        let mut eq = DynamicEq::new(SR);
        eq.set_threshold(-40.0);
        eq.set_ratio(4.0);
        let input = sine(1000.0, 0.5, 24000);
        let mut left = input.clone();
        let mut right = input.clone();
        StereoProcessor::process_block(&mut eq, &mut left, &mut right);
        let tail = 12000..24000;
        assert!(rms(&left[tail.clone()]) < 0.5 * rms(&input[tail]));
        assert!(eq.take_peak_reduction() > 10.0);
    }

    #[test]
    fn test_dynamic_eq_automated_matches_block_rate() {
        let input = sine(800.0, 0.5, 512);
        let mut a = DynamicEq::new(SR);
        let mut b = DynamicEq::new(SR);
        a.set_threshold(-30.0);
        b.set_threshold(-30.0);

        let (mut al, mut ar) = (input.clone(), input.clone());
        a.process_block_automated(&mut al, &mut ar, ParamInput::Block(2000.0), ParamInput::Block(1.0));

        let lane = vec![2000.0; input.len()];
        let (mut bl, mut br) = (input.clone(), input.clone());
        b.process_block_automated(
            &mut bl,
            &mut br,
            ParamInput::PerSample(&lane),
            ParamInput::Block(1.0),
        );
        for (x, y) in al.iter().zip(&bl) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_deesser_ignores_low_content() {
        let mut deesser = DeEsser::new(SR);
        for x in sine(200.0, 0.5, 9600) {
            let (l, _) = deesser.process_sample(x, x);
            assert_eq!(l, x);
        }
    }

    #[test]
    fn test_deesser_reduces_sibilance() {
        let mut deesser = DeEsser::new(SR);
        let input = sine(6000.0, 0.5, 9600);
        let out: Vec<f64> = input.iter().map(|&x| deesser.process_sample(x, x).0).collect();
        assert!(rms(&out[4800..]) < 0.6 * rms(&input[4800..]));
    }

    #[test]
    fn test_deesser_monitor_and_bypass() {
        let mut deesser = DeEsser::new(SR);
        deesser.set_bypass(true);
        assert_eq!(deesser.process_sample(0.3, -0.3), (0.3, -0.3));

        let mut monitor = DeEsser::new(SR);
        monitor.set_monitor(true);
        let mut reference = Biquad::new(FilterType::Bandpass, 6000.0, 0.0, 2.0, SR);
        for x in sine(5000.0, 0.4, 256) {
            let (l, _) = monitor.process_sample(x, x);
            assert!((l - reference.process_sample(x)).abs() < 1e-15);
        }
    }

    #[test]
    fn test_transient_shaper_neutral_is_identity() {
        let mut shaper = TransientShaper::new(SR);
        for x in sine(300.0, 0.7, 4800) {
            let (l, r) = shaper.process_sample(x, -x);
            assert_eq!(l, x);
            assert_eq!(r, -x);
        }
    }

    #[test]
    fn test_transient_shaper_boosts_onset() {
        let mut shaper = TransientShaper::new(SR);
        shaper.set_attack_gain(12.0);
        // Step onset: fast follower leads the slow one
        for _ in 0..48 {
            let (l, _) = shaper.process_sample(0.5, 0.5);
            assert!(l >= 0.5);
        }
        let (l, _) = shaper.process_sample(0.5, 0.5);
        assert!(l > 0.5);
    }
}
