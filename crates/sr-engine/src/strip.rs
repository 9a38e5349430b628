//! Track and bus strips
//!
//! Signal flow per strip:
//!
//! ```text
//! source -> input gain -> [rack chain] -> output gain (fader) -> analyser -> panner
//! ```
//!
//! The rack chain is an explicit wiring graph: one outgoing edge per endpoint,
//! stored as handles into the strip's [`NodeArena`]. Rendering follows the
//! edges from the input stage to the output stage.
//!
//! ## Reconciliation
//!
//! [`TrackStrip::update_rack`] turns a desired module list into the minimal
//! set of edge operations:
//! - identical wired ids: parameters re-applied, no rewiring
//! - divergence at index `k`: everything before `k` stays connected, the
//!   chain is rebuilt from `k`
//! - predecessor of `k` missing from the arena: full rebuild from the input
//!
//! Instances are cached by module id, so a module that survives an edit keeps
//! its filter, delay and envelope state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sr_core::{AudioBuffer, ParamValue, RackModule, Sample};
use sr_dsp::metering::LevelMeter;
use sr_dsp::spatial::StereoPanner;

use crate::arena::{NodeArena, NodeHandle};
use crate::assets::AssetTable;
use crate::context::ProcessingContext;
use crate::factory::create_processor;
use crate::node::{PassThrough, RackProcessor, apply_parameter_value, apply_parameters};
use crate::telemetry::{MeterData, MeterEvent, MeterKey, MeterPublisher};

/// Fader and pan glide time constant (seconds)
const GAIN_TIME_CONSTANT: f64 = 0.01;

// ============ Wiring ============

/// Connection point in a strip's graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Output of the input gain stage
    Input,
    Node(NodeHandle),
    /// Fader input
    Output,
}

/// Edge operation counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WiringStats {
    pub connects: u64,
    pub disconnects: u64,
}

/// Path taken by a rack update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Same wired chain; parameters re-applied only
    Unchanged,
    /// Chain rebuilt from the divergence index
    Partial { from: usize },
    /// Chain rebuilt from the input stage
    FullRebuild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripKind {
    Track,
    Bus,
}

// ============ Smoothing ============

/// One-pole glide toward a target
#[derive(Debug, Clone)]
struct Smoothed {
    current: f64,
    target: f64,
    coeff: f64,
}

impl Smoothed {
    fn new(value: f64, sample_rate: f64) -> Self {
        Self {
            current: value,
            target: value,
            coeff: (-1.0 / (GAIN_TIME_CONSTANT * sample_rate)).exp(),
        }
    }

    fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    #[inline]
    fn is_settled(&self) -> bool {
        self.current == self.target
    }

    #[inline]
    fn next(&mut self) -> f64 {
        if !self.is_settled() {
            self.current = self.target + (self.current - self.target) * self.coeff;
            if (self.current - self.target).abs() < 1e-9 {
                self.current = self.target;
            }
        }
        self.current
    }
}

// ============ Source playback ============

#[derive(Debug, Default)]
struct SourcePlayer {
    buffer: Option<Arc<AudioBuffer>>,
    position: usize,
    playing: bool,
}

impl SourcePlayer {
    /// Copy the next frames into the block; the rest is silence
    fn fill(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        left.fill(0.0);
        right.fill(0.0);
        if !self.playing {
            return;
        }
        let Some(buffer) = &self.buffer else {
            self.playing = false;
            return;
        };

        let pos = self.position;
        let n = buffer.len().saturating_sub(pos).min(left.len());
        let src_l = buffer.channel(0);
        let src_r = if buffer.num_channels() > 1 {
            buffer.channel(1)
        } else {
            src_l
        };
        left[..n].copy_from_slice(&src_l[pos..pos + n]);
        right[..n].copy_from_slice(&src_r[pos..pos + n]);

        self.position += n;
        if self.position >= buffer.len() {
            self.playing = false;
        }
    }
}

// ============ Strip ============

/// Mixer strip: a track with a source, or a bus fed by other strips
pub struct TrackStrip {
    id: String,
    kind: StripKind,
    input_gain: f64,
    fader: Smoothed,
    pan: Smoothed,
    panner: StereoPanner,
    analyser: LevelMeter,
    meter: Arc<MeterData>,

    arena: NodeArena,
    edges: HashMap<Endpoint, Endpoint>,
    wired: Vec<String>,
    rack: Vec<RackModule>,
    stats: WiringStats,
    /// Meter registrations not yet handed to the publisher
    meter_events: Vec<MeterEvent>,

    player: SourcePlayer,
    scratch_l: Vec<Sample>,
    scratch_r: Vec<Sample>,
}

impl TrackStrip {
    fn new(id: impl Into<String>, kind: StripKind, ctx: &ProcessingContext) -> Self {
        let mut strip = Self {
            id: id.into(),
            kind,
            input_gain: 1.0,
            fader: Smoothed::new(1.0, ctx.sample_rate),
            pan: Smoothed::new(0.0, ctx.sample_rate),
            panner: StereoPanner::new(),
            analyser: LevelMeter::new(),
            meter: Arc::new(MeterData::new()),
            arena: NodeArena::new(),
            edges: HashMap::new(),
            wired: Vec::new(),
            rack: Vec::new(),
            stats: WiringStats::default(),
            meter_events: Vec::new(),
            player: SourcePlayer::default(),
            scratch_l: vec![0.0; ctx.block_size],
            scratch_r: vec![0.0; ctx.block_size],
        };
        // Empty rack: input straight into the fader
        strip.connect(Endpoint::Input, Endpoint::Output);
        strip
    }

    pub fn track(id: impl Into<String>, ctx: &ProcessingContext) -> Self {
        Self::new(id, StripKind::Track, ctx)
    }

    pub fn bus(id: impl Into<String>, ctx: &ProcessingContext) -> Self {
        Self::new(id, StripKind::Bus, ctx)
    }

    /// Publish post-fader levels into an existing meter
    pub fn with_meter(mut self, meter: Arc<MeterData>) -> Self {
        self.meter = meter;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StripKind {
        self.kind
    }

    pub fn meter(&self) -> &Arc<MeterData> {
        &self.meter
    }

    // ============ Fader, pan, input ============

    /// Fader gain (linear), glides with a 10 ms time constant
    pub fn set_volume(&mut self, gain: f64) {
        self.fader.set_target(gain.max(0.0));
    }

    pub fn volume(&self) -> f64 {
        self.fader.target
    }

    /// Pan in [-1, 1], glides with a 10 ms time constant
    pub fn set_pan(&mut self, pan: f64) {
        self.pan.set_target(pan.clamp(-1.0, 1.0));
    }

    pub fn pan(&self) -> f64 {
        self.pan.target
    }

    pub fn set_input_gain(&mut self, gain: f64) {
        self.input_gain = gain.max(0.0);
    }

    // ============ Source ============

    pub fn set_source(&mut self, buffer: Arc<AudioBuffer>, ctx: &ProcessingContext) {
        if self.kind == StripKind::Bus {
            log::warn!("{}: cannot set a source on a bus", self.id);
            return;
        }
        if (buffer.sample_rate() - ctx.sample_rate).abs() > 0.5 {
            log::warn!(
                "{}: source at {} Hz played at {} Hz without resampling",
                self.id,
                buffer.sample_rate(),
                ctx.sample_rate
            );
        }
        self.player.buffer = Some(buffer);
        self.player.position = 0;
        self.player.playing = false;
    }

    pub fn has_source(&self) -> bool {
        self.player.buffer.is_some()
    }

    /// Start the source at `offset` seconds into it. A playing source restarts.
    pub fn play(&mut self, offset: f64) {
        if self.kind == StripKind::Bus {
            return;
        }
        let Some(buffer) = &self.player.buffer else {
            return;
        };
        let position = (offset.max(0.0) * buffer.sample_rate()).round() as usize;
        self.player.position = position;
        self.player.playing = position < buffer.len();
    }

    pub fn stop(&mut self) {
        self.player.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.player.playing
    }

    // ============ Rack management ============

    /// Reconcile the wired chain with `rack`
    pub fn update_rack(
        &mut self,
        rack: Vec<RackModule>,
        ctx: &ProcessingContext,
        assets: &AssetTable,
    ) -> Reconciliation {
        self.rack = rack;
        let next_ids: Vec<&str> = self
            .rack
            .iter()
            .filter(|m| !m.bypassed)
            .map(|m| m.id.as_str())
            .collect();

        let len = self.wired.len().max(next_ids.len());
        let divergence =
            (0..len).find(|&i| self.wired.get(i).map(String::as_str) != next_ids.get(i).copied());

        let result = match divergence {
            None if self.wired.iter().any(|id| !self.arena.contains(id)) => {
                log::warn!("{}: wired module without instance, rebuilding chain", self.id);
                let rack = std::mem::take(&mut self.rack);
                self.full_rebuild(rack, ctx, assets)
            }
            None => {
                self.sync_params(assets);
                self.purge_instances();
                log::debug!("{}: rack unchanged, parameters synced", self.id);
                Reconciliation::Unchanged
            }
            Some(start) => self.partial_rebuild(start, ctx, assets),
        };
        self.instantiate_missing(ctx, assets);
        result
    }

    /// Append a module to the rack
    pub fn add_module(
        &mut self,
        module: RackModule,
        ctx: &ProcessingContext,
        assets: &AssetTable,
    ) -> Reconciliation {
        let mut rack = self.rack.clone();
        if let Some(existing) = rack.iter_mut().find(|m| m.id == module.id) {
            log::warn!("{}: module '{}' already in rack, replacing", self.id, module.id);
            *existing = module;
        } else {
            rack.push(module);
        }
        self.update_rack(rack, ctx, assets)
    }

    pub fn remove_module(
        &mut self,
        id: &str,
        ctx: &ProcessingContext,
        assets: &AssetTable,
    ) -> Reconciliation {
        let rack = self.rack.iter().filter(|m| m.id != id).cloned().collect();
        self.update_rack(rack, ctx, assets)
    }

    /// Toggle bypass of one module. Returns None when the id is not in the rack.
    pub fn set_bypass(
        &mut self,
        id: &str,
        bypassed: bool,
        ctx: &ProcessingContext,
        assets: &AssetTable,
    ) -> Option<Reconciliation> {
        let mut rack = self.rack.clone();
        rack.iter_mut().find(|m| m.id == id)?.bypassed = bypassed;
        Some(self.update_rack(rack, ctx, assets))
    }

    /// Record one parameter in the rack and apply it to the instance.
    ///
    /// Bypassed modules keep the value for when they are wired again.
    /// Returns false when `id` is not in this strip's rack.
    pub fn update_module_param(
        &mut self,
        id: &str,
        param: &str,
        value: &ParamValue,
        assets: &AssetTable,
    ) -> bool {
        let Some(module) = self.rack.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        module.set_param(param, value.clone());
        if let Some(processor) = self.arena.processor_mut(id) {
            apply_parameter_value(processor, param, value, assets);
        }
        true
    }

    /// Drop the cached instance for `id` without touching the wiring.
    ///
    /// A later structural update that needs it as an anchor falls back to a
    /// full rebuild and instantiates it afresh.
    pub fn evict(&mut self, id: &str) -> bool {
        self.release(id)
    }

    /// Tear down the chain and release every instance
    pub fn disconnect(&mut self, ctx: &ProcessingContext) {
        self.stop();
        self.full_rebuild(Vec::new(), ctx, &AssetTable::new());
    }

    fn partial_rebuild(
        &mut self,
        start: usize,
        ctx: &ProcessingContext,
        assets: &AssetTable,
    ) -> Reconciliation {
        let mut previous = if start == 0 {
            Endpoint::Input
        } else {
            match self.arena.handle_of(&self.wired[start - 1]) {
                Some(handle) => Endpoint::Node(handle),
                None => {
                    log::warn!(
                        "{}: predecessor '{}' missing, rebuilding chain",
                        self.id,
                        self.wired[start - 1]
                    );
                    let rack = std::mem::take(&mut self.rack);
                    return self.full_rebuild(rack, ctx, assets);
                }
            }
        };
        log::debug!("{}: rewiring from index {}", self.id, start);

        self.disconnect_from(previous);
        for i in start..self.wired.len() {
            if let Some(handle) = self.arena.handle_of(&self.wired[i]) {
                self.disconnect_from(Endpoint::Node(handle));
            }
        }
        self.purge_instances();

        let mut active: Vec<String> = self.wired[..start].to_vec();
        let last_stable = start.checked_sub(1).map(|i| self.wired[i].clone());
        let mut found_start = last_stable.is_none();

        let rack = std::mem::take(&mut self.rack);
        for module in &rack {
            if !found_start {
                found_start = last_stable.as_deref() == Some(module.id.as_str());
                continue;
            }
            let handle = self.instance_for(module, ctx, assets);
            if !module.bypassed {
                self.connect(previous, Endpoint::Node(handle));
                previous = Endpoint::Node(handle);
                active.push(module.id.clone());
            }
        }
        self.rack = rack;

        self.connect(previous, Endpoint::Output);
        self.wired = active;
        Reconciliation::Partial { from: start }
    }

    fn full_rebuild(
        &mut self,
        rack: Vec<RackModule>,
        ctx: &ProcessingContext,
        assets: &AssetTable,
    ) -> Reconciliation {
        let sources: Vec<Endpoint> = self.edges.keys().copied().collect();
        for source in sources {
            self.disconnect_from(source);
        }
        self.rack = rack;
        self.purge_instances();

        let mut previous = Endpoint::Input;
        let mut active = Vec::new();
        let rack = std::mem::take(&mut self.rack);
        for module in &rack {
            let handle = self.instance_for(module, ctx, assets);
            if !module.bypassed {
                self.connect(previous, Endpoint::Node(handle));
                previous = Endpoint::Node(handle);
                active.push(module.id.clone());
            }
        }
        self.rack = rack;

        self.connect(previous, Endpoint::Output);
        self.wired = active;
        log::debug!("{}: full rebuild, {} modules wired", self.id, self.wired.len());
        Reconciliation::FullRebuild
    }

    /// Cached instance with the module's parameters applied, or a new one
    fn instance_for(
        &mut self,
        module: &RackModule,
        ctx: &ProcessingContext,
        assets: &AssetTable,
    ) -> NodeHandle {
        if let Some(handle) = self.arena.handle_of(&module.id) {
            if let Some(entry) = self.arena.get_mut(handle) {
                apply_parameters(entry.processor.as_mut(), &module.parameters, assets);
            }
            return handle;
        }

        let processor: Box<dyn RackProcessor> = match create_processor(module, ctx, assets) {
            Some(processor) => processor,
            None => {
                log::warn!(
                    "{}: no processor for {} '{}', using pass-through",
                    self.id,
                    module.module_type,
                    module.id
                );
                Box::new(PassThrough::new(module.module_type))
            }
        };
        if let Some(meter) = processor.meter() {
            self.meter_events.push(MeterEvent::Register(
                MeterKey::new(&self.id, &module.id),
                Arc::clone(meter),
            ));
        }
        self.arena.insert(&module.id, module.module_type, processor)
    }

    /// Cache an instance for every rack module, bypassed ones included
    fn instantiate_missing(&mut self, ctx: &ProcessingContext, assets: &AssetTable) {
        let rack = std::mem::take(&mut self.rack);
        for module in &rack {
            if !self.arena.contains(&module.id) {
                self.instance_for(module, ctx, assets);
            }
        }
        self.rack = rack;
    }

    fn sync_params(&mut self, assets: &AssetTable) {
        for module in &self.rack {
            if let Some(processor) = self.arena.processor_mut(&module.id) {
                apply_parameters(processor, &module.parameters, assets);
            }
        }
    }

    /// Drop instances whose ids left the rack
    fn purge_instances(&mut self) {
        let keep: HashSet<&str> = self.rack.iter().map(|m| m.id.as_str()).collect();
        let stale: Vec<String> = self
            .arena
            .ids()
            .filter(|id| !keep.contains(id))
            .map(str::to_string)
            .collect();
        for id in stale {
            self.release(&id);
        }
    }

    /// Drop one instance along with its meter
    fn release(&mut self, id: &str) -> bool {
        let Some(entry) = self.arena.remove(id) else {
            return false;
        };
        if entry.processor.meter().is_some() {
            self.meter_events
                .push(MeterEvent::Unregister(MeterKey::new(&self.id, id)));
        }
        true
    }

    /// Hand queued meter registrations to the control plane
    pub fn drain_meter_events(&mut self, publisher: &mut MeterPublisher) {
        if !self.meter_events.is_empty() {
            publisher.publish(self.meter_events.drain(..));
        }
    }

    fn connect(&mut self, source: Endpoint, destination: Endpoint) {
        self.edges.insert(source, destination);
        self.stats.connects += 1;
    }

    fn disconnect_from(&mut self, source: Endpoint) {
        if self.edges.remove(&source).is_some() {
            self.stats.disconnects += 1;
        }
    }

    // ============ Introspection ============

    /// Ids of the modules currently in the audio path, in order
    pub fn wired_ids(&self) -> &[String] {
        &self.wired
    }

    /// Module ids reached by following the edges from the input stage
    pub fn traced_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut cursor = Endpoint::Input;
        for _ in 0..=self.edges.len() {
            match self.edges.get(&cursor) {
                Some(&Endpoint::Node(handle)) => {
                    if let Some(entry) = self.arena.get(handle) {
                        chain.push(entry.id.clone());
                    }
                    cursor = Endpoint::Node(handle);
                }
                _ => break,
            }
        }
        chain
    }

    pub fn rack(&self) -> &[RackModule] {
        &self.rack
    }

    pub fn stats(&self) -> WiringStats {
        self.stats
    }

    pub fn handle_of(&self, id: &str) -> Option<NodeHandle> {
        self.arena.handle_of(id)
    }

    pub fn has_module(&self, id: &str) -> bool {
        self.arena.contains(id)
    }

    /// Live instance of a module
    pub fn module(&self, id: &str) -> Option<&dyn RackProcessor> {
        let handle = self.arena.handle_of(id)?;
        let entry = self.arena.get(handle)?;
        Some(entry.processor.as_ref())
    }

    /// Number of cached instances, wired or bypassed
    pub fn instance_count(&self) -> usize {
        self.arena.len()
    }

    /// Summed latency of the wired chain (samples)
    pub fn latency(&self) -> usize {
        self.wired
            .iter()
            .filter_map(|id| self.module(id))
            .map(|p| p.latency())
            .sum()
    }

    // ============ Rendering ============

    /// Render this track's source through the strip and add it to the outputs
    pub fn render_into(&mut self, out_l: &mut [Sample], out_r: &mut [Sample]) {
        let n = out_l.len().min(out_r.len()).min(self.scratch_l.len());
        let mut left = std::mem::take(&mut self.scratch_l);
        let mut right = std::mem::take(&mut self.scratch_r);

        self.player.fill(&mut left[..n], &mut right[..n]);
        self.process(&mut left[..n], &mut right[..n]);
        for i in 0..n {
            out_l[i] += left[i];
            out_r[i] += right[i];
        }

        self.scratch_l = left;
        self.scratch_r = right;
    }

    /// Run a block through input gain, the chain and the output stage in place
    pub fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        if self.input_gain != 1.0 {
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                *l *= self.input_gain;
                *r *= self.input_gain;
            }
        }

        self.process_chain(left, right);

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let gain = self.fader.next();
            *l *= gain;
            *r *= gain;
            self.analyser.process(*l, *r);

            if !self.pan.is_settled() {
                self.panner.set_pan(self.pan.next());
            }
            (*l, *r) = self.panner.process(*l, *r);
        }

        let (peak, rms) = self.analyser.take();
        self.meter.publish(peak, rms);
    }

    fn process_chain(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let mut cursor = Endpoint::Input;
        // Bounded walk; a consistent graph reaches Output in wired.len() + 1 steps
        for _ in 0..=self.edges.len() {
            match self.edges.get(&cursor) {
                Some(&Endpoint::Output) => return,
                Some(&Endpoint::Node(handle)) => {
                    if let Some(entry) = self.arena.get_mut(handle) {
                        entry.processor.process(left, right);
                    }
                    cursor = Endpoint::Node(handle);
                }
                _ => break,
            }
        }
        // Nothing reaches the fader
        left.fill(0.0);
        right.fill(0.0);
    }

    /// Reset every cached processor
    pub fn reset(&mut self) {
        for id in self.wired.clone() {
            if let Some(processor) = self.arena.processor_mut(&id) {
                processor.reset();
            }
        }
        self.analyser.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::create_default_module;
    use crate::telemetry::MeterBridge;
    use sr_core::ModuleType;

    const SR: f64 = 48000.0;

    fn ctx() -> ProcessingContext {
        ProcessingContext::new(SR, 128).unwrap()
    }

    fn module(id: &str, t: ModuleType) -> RackModule {
        create_default_module(t, id)
    }

    fn ids(strip: &TrackStrip) -> Vec<&str> {
        strip.wired_ids().iter().map(String::as_str).collect()
    }

    #[test]
    fn test_empty_strip_is_unity() {
        let ctx = ctx();
        let mut strip = TrackStrip::track("t1", &ctx);
        let mut left = vec![0.5; 128];
        let mut right = vec![-0.25; 128];
        strip.process(&mut left, &mut right);
        assert!(left.iter().all(|&x| (x - 0.5).abs() < 1e-12));
        assert!(right.iter().all(|&x| (x + 0.25).abs() < 1e-12));
    }

    #[test]
    fn test_bypassed_modules_are_not_wired() {
        let ctx = ctx();
        let assets = AssetTable::new();
        let mut strip = TrackStrip::track("t1", &ctx);
        let rack = vec![
            module("eq", ModuleType::ParametricEq),
            module("comp", ModuleType::Compressor).with_bypass(true),
            module("lim", ModuleType::Limiter),
        ];
        strip.update_rack(rack, &ctx, &assets);
        assert_eq!(ids(&strip), ["eq", "lim"]);
        assert_eq!(strip.traced_chain(), strip.wired_ids());
        // Bypassed instances are still cached
        assert_eq!(strip.instance_count(), 3);
    }

    #[test]
    fn test_same_rack_twice_is_unchanged() {
        let ctx = ctx();
        let assets = AssetTable::new();
        let mut strip = TrackStrip::track("t1", &ctx);
        let rack = vec![
            module("eq", ModuleType::ParametricEq),
            module("comp", ModuleType::Compressor),
        ];
        assert_eq!(
            strip.update_rack(rack.clone(), &ctx, &assets),
            Reconciliation::Partial { from: 0 }
        );
        let stats = strip.stats();
        let handles = (strip.handle_of("eq"), strip.handle_of("comp"));

        assert_eq!(strip.update_rack(rack, &ctx, &assets), Reconciliation::Unchanged);
        assert_eq!(strip.stats(), stats);
        assert_eq!((strip.handle_of("eq"), strip.handle_of("comp")), handles);
    }

    #[test]
    fn test_removal_keeps_upstream_edges() {
        let ctx = ctx();
        let assets = AssetTable::new();
        let mut strip = TrackStrip::track("t1", &ctx);
        strip.update_rack(
            vec![
                module("a", ModuleType::ParametricEq),
                module("b", ModuleType::Saturation),
                module("c", ModuleType::Chorus),
            ],
            &ctx,
            &assets,
        );
        let a = strip.handle_of("a");
        let before = strip.stats();

        let result = strip.remove_module("c", &ctx, &assets);
        assert_eq!(result, Reconciliation::Partial { from: 2 });
        assert_eq!(ids(&strip), ["a", "b"]);
        assert_eq!(strip.handle_of("a"), a);
        assert!(!strip.has_module("c"));
        // b -> c and c -> output removed; b -> output added
        let after = strip.stats();
        assert_eq!(after.disconnects - before.disconnects, 2);
        assert_eq!(after.connects - before.connects, 1);
    }

    #[test]
    fn test_reorder_rewires_from_divergence() {
        let ctx = ctx();
        let assets = AssetTable::new();
        let mut strip = TrackStrip::track("t1", &ctx);
        let a = module("a", ModuleType::ParametricEq);
        let b = module("b", ModuleType::Saturation);
        let c = module("c", ModuleType::Chorus);
        strip.update_rack(vec![a.clone(), b.clone(), c.clone()], &ctx, &assets);
        let handles: Vec<_> = ["a", "b", "c"].iter().map(|id| strip.handle_of(id)).collect();

        let result = strip.update_rack(vec![a, c, b], &ctx, &assets);
        assert_eq!(result, Reconciliation::Partial { from: 1 });
        assert_eq!(ids(&strip), ["a", "c", "b"]);
        assert_eq!(strip.traced_chain(), ["a", "c", "b"]);
        // Same instances, new order
        let after: Vec<_> = ["a", "b", "c"].iter().map(|id| strip.handle_of(id)).collect();
        assert_eq!(after, handles);
    }

    #[test]
    fn test_missing_predecessor_falls_back_to_full_rebuild() {
        let ctx = ctx();
        let assets = AssetTable::new();
        let mut strip = TrackStrip::track("t1", &ctx);
        strip.update_rack(
            vec![module("a", ModuleType::ParametricEq), module("b", ModuleType::Saturation)],
            &ctx,
            &assets,
        );
        let a = strip.handle_of("a");
        // "b" anchors the append below
        assert!(strip.evict("b"));

        let result = strip.add_module(module("c", ModuleType::Chorus), &ctx, &assets);
        assert_eq!(result, Reconciliation::FullRebuild);
        assert_eq!(ids(&strip), ["a", "b", "c"]);
        assert_eq!(strip.traced_chain(), ["a", "b", "c"]);
        assert!(strip.has_module("b"));
        assert_eq!(strip.handle_of("a"), a);
    }

    #[test]
    fn test_unknown_type_gets_cached_pass_through() {
        let ctx = ctx();
        let assets = AssetTable::new();
        let mut strip = TrackStrip::track("t1", &ctx);
        strip.update_rack(
            vec![RackModule::new("x", ModuleType::SpectralDenoise)],
            &ctx,
            &assets,
        );
        assert_eq!(ids(&strip), ["x"]);
        let handle = strip.handle_of("x");
        assert!(handle.is_some());
        strip.add_module(module("eq", ModuleType::ParametricEq), &ctx, &assets);
        assert_eq!(strip.handle_of("x"), handle);

        let mut left = vec![0.3; 64];
        let mut right = vec![0.3; 64];
        strip.process(&mut left, &mut right);
        assert!((left[63] - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_param_update_reaches_rack() {
        let ctx = ctx();
        let assets = AssetTable::new();
        let mut strip = TrackStrip::track("t1", &ctx);
        strip.add_module(module("comp", ModuleType::Compressor), &ctx, &assets);

        assert!(strip.update_module_param("comp", "ratio", &ParamValue::Number(8.0), &assets));
        assert_eq!(strip.rack()[0].number("ratio"), Some(8.0));
        assert_eq!(strip.module("comp").unwrap().name(), "Compressor");
        assert!(!strip.update_module_param("nope", "ratio", &ParamValue::Number(8.0), &assets));
    }

    #[test]
    fn test_module_meters_follow_instances() {
        let ctx = ctx();
        let assets = AssetTable::new();
        let (bridge, mut publisher) = MeterBridge::channel();
        let mut strip = TrackStrip::track("t1", &ctx);
        strip.add_module(module("lim", ModuleType::Limiter), &ctx, &assets);
        // Nothing is visible until the strip's events are published
        assert!(bridge.module("t1", "lim").is_none());
        strip.drain_meter_events(&mut publisher);
        assert!(bridge.module("t1", "lim").is_some());

        strip.remove_module("lim", &ctx, &assets);
        strip.drain_meter_events(&mut publisher);
        assert!(bridge.module("t1", "lim").is_none());
    }

    #[test]
    fn test_bypassed_addition_gets_instance() {
        let ctx = ctx();
        let assets = AssetTable::new();
        let mut strip = TrackStrip::track("t1", &ctx);
        let eq = module("eq", ModuleType::ParametricEq);
        strip.update_rack(vec![eq.clone()], &ctx, &assets);

        let comp = module("comp", ModuleType::Compressor).with_bypass(true);
        let result = strip.update_rack(vec![eq, comp.clone()], &ctx, &assets);
        assert_eq!(result, Reconciliation::Unchanged);
        assert!(strip.has_module("comp"));

        // Stored while bypassed, live once wired
        assert!(strip.update_module_param("comp", "ratio", &ParamValue::Number(8.0), &assets));
        assert!(strip.set_bypass("comp", false, &ctx, &assets).is_some());
        assert_eq!(ids(&strip), ["eq", "comp"]);
        assert_eq!(strip.rack()[1].number("ratio"), Some(8.0));
    }

    #[test]
    fn test_bypassed_module_ahead_of_divergence_gets_instance() {
        let ctx = ctx();
        let assets = AssetTable::new();
        let mut strip = TrackStrip::track("t1", &ctx);
        let a = module("a", ModuleType::ParametricEq);
        let b = module("b", ModuleType::Saturation);
        strip.update_rack(vec![a.clone(), b.clone()], &ctx, &assets);

        let x = module("x", ModuleType::Chorus).with_bypass(true);
        let c = module("c", ModuleType::Tremolo);
        let result = strip.update_rack(vec![x, a, b, c], &ctx, &assets);
        assert_eq!(result, Reconciliation::Partial { from: 2 });
        assert_eq!(ids(&strip), ["a", "b", "c"]);
        assert_eq!(strip.instance_count(), 4);
        assert!(strip.has_module("x"));
    }

    #[test]
    fn test_same_rack_keeps_cab_tail() {
        let ctx = ctx();
        let mut assets = AssetTable::new();
        let decay: Vec<f64> = (0..4096).map(|i| 0.999_f64.powi(i)).collect();
        assets.insert("ir", AudioBuffer::mono(SR, decay).unwrap());
        let rack = vec![
            module("cab", ModuleType::CabSim)
                .with_param("irAssetId", "ir")
                .with_param("mix", 1.0),
            module("eq", ModuleType::ParametricEq),
        ];

        let mut reference = TrackStrip::track("ref", &ctx);
        let mut resynced = TrackStrip::track("t1", &ctx);
        reference.update_rack(rack.clone(), &ctx, &assets);
        resynced.update_rack(rack.clone(), &ctx, &assets);

        let mut max_diff: f64 = 0.0;
        for block in 0..8 {
            if block == 4 {
                assert_eq!(
                    resynced.update_rack(rack.clone(), &ctx, &assets),
                    Reconciliation::Unchanged
                );
            }
            let mut ref_l = vec![0.0; 128];
            let mut ref_r = vec![0.0; 128];
            if block == 0 {
                ref_l[0] = 1.0;
                ref_r[0] = 1.0;
            }
            let mut l = ref_l.clone();
            let mut r = ref_r.clone();
            reference.process(&mut ref_l, &mut ref_r);
            resynced.process(&mut l, &mut r);
            for i in 0..128 {
                max_diff = max_diff.max((ref_l[i] - l[i]).abs());
            }
            if block >= 4 {
                assert!(ref_l.iter().any(|x| x.abs() > 0.1));
            }
        }
        assert!(max_diff < 1e-12, "max diff {max_diff}");
    }

    #[test]
    fn test_source_plays_from_offset_and_stops_at_end() {
        let ctx = ctx();
        let mut strip = TrackStrip::track("t1", &ctx);
        let samples: Vec<f64> = (0..200).map(|i| i as f64 / 1000.0).collect();
        strip.set_source(Arc::new(AudioBuffer::mono(SR, samples).unwrap()), &ctx);

        strip.play(100.0 / SR);
        assert!(strip.is_playing());
        let mut out_l = vec![0.0; 128];
        let mut out_r = vec![0.0; 128];
        strip.render_into(&mut out_l, &mut out_r);

        assert!((out_l[0] - 0.1).abs() < 1e-12);
        assert!((out_r[99] - 0.199).abs() < 1e-12);
        assert_eq!(out_l[100], 0.0);
        assert!(!strip.is_playing());
    }

    #[test]
    fn test_bus_ignores_source() {
        let ctx = ctx();
        let mut bus = TrackStrip::bus("MASTER", &ctx);
        bus.set_source(Arc::new(AudioBuffer::mono(SR, vec![1.0; 10]).unwrap()), &ctx);
        assert!(!bus.has_source());
        bus.play(0.0);
        assert!(!bus.is_playing());
    }

    #[test]
    fn test_fader_glides() {
        let ctx = ctx();
        let mut strip = TrackStrip::track("t1", &ctx);
        strip.set_volume(0.0);
        let mut left = vec![1.0; 480];
        let mut right = vec![1.0; 480];
        strip.process(&mut left, &mut right);
        // One time constant after the change
        assert!(left[0] > 0.99);
        assert!((left[479] - (-1.0_f64).exp()).abs() < 0.01);
    }

    #[test]
    fn test_disconnect_releases_everything() {
        let ctx = ctx();
        let assets = AssetTable::new();
        let mut strip = TrackStrip::track("t1", &ctx);
        strip.add_module(module("comp", ModuleType::Compressor), &ctx, &assets);
        strip.disconnect(&ctx);
        assert_eq!(strip.instance_count(), 0);
        assert!(strip.wired_ids().is_empty());
        assert!(strip.traced_chain().is_empty());

        let (bridge, mut publisher) = MeterBridge::channel();
        strip.drain_meter_events(&mut publisher);
        assert!(bridge.module("t1", "comp").is_none());
        assert!(bridge.module_keys().is_empty());
    }
}
