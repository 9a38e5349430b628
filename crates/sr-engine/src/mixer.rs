//! Mixer orchestrator
//!
//! Owns the track strips, the master bus, the asset table and the transport.
//! Control-plane commands arrive through a lock-free queue and are applied at
//! the top of each render block:
//!
//! ```text
//! EngineHandle --(rtrb)--> MixerEngine::render_block
//!                            1. drain commands (structural changes)
//!                            2. tracks -> mix bus -> master strip
//!                            3. publish transport position
//! ```
//!
//! Module meters registered by structural changes go back the other way
//! through the [`MeterPublisher`] queue; the render path never takes a lock.

use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};
use sr_core::{EngineConfig, ModuleType, ParamValue, RackModule, Sample};

use crate::assets::AssetTable;
use crate::context::ProcessingContext;
use crate::error::{EngineError, EngineResult};
use crate::protocol::{EngineCommand, MASTER_ID};
use crate::registry::create_default_module;
use crate::strip::TrackStrip;
use crate::telemetry::{MeterBridge, MeterPublisher};
use crate::transport::Transport;

// ============ Engine ============

pub struct MixerEngine {
    ctx: ProcessingContext,
    tracks: Vec<TrackStrip>,
    master: TrackStrip,
    assets: AssetTable,
    transport: Transport,
    frames_rendered: u64,
    command_rx: Consumer<EngineCommand>,
    meters: Arc<MeterBridge>,
    meter_tx: MeterPublisher,
    mix_l: Vec<Sample>,
    mix_r: Vec<Sample>,
}

impl MixerEngine {
    /// Create an engine and the handle that feeds it
    pub fn new(config: &EngineConfig, assets: AssetTable) -> EngineResult<(Self, EngineHandle)> {
        let ctx = ProcessingContext::from_config(config)?;
        let (command_tx, command_rx) = RingBuffer::new(config.command_queue_capacity);
        let (meters, meter_tx) = MeterBridge::channel();

        let master = TrackStrip::bus(MASTER_ID, &ctx).with_meter(Arc::clone(&meters.master));
        let block_size = ctx.block_size;

        log::info!(
            "Mixer engine: {} Hz, {} frames per block, {} assets",
            ctx.sample_rate,
            block_size,
            assets.len()
        );

        let engine = Self {
            ctx,
            tracks: Vec::new(),
            master,
            assets,
            transport: Transport::new(),
            frames_rendered: 0,
            command_rx,
            meters: Arc::clone(&meters),
            meter_tx,
            mix_l: vec![0.0; block_size],
            mix_r: vec![0.0; block_size],
        };

        Ok((engine, EngineHandle::new(command_tx, meters)))
    }

    /// Apply every queued command
    pub fn process_commands(&mut self) {
        while let Ok(cmd) = self.command_rx.pop() {
            self.dispatch(cmd);
        }
    }

    /// Apply one command, logging rather than returning failures
    pub fn dispatch(&mut self, cmd: EngineCommand) {
        log::trace!("command {}", cmd.kind());
        let kind = cmd.kind();
        if let Err(e) = self.handle_command(cmd) {
            log::warn!("{kind} ignored: {e}");
        }
    }

    /// Apply one command
    pub fn handle_command(&mut self, cmd: EngineCommand) -> EngineResult<()> {
        let result = self.apply_command(cmd);
        self.publish_meters();
        result
    }

    fn apply_command(&mut self, cmd: EngineCommand) -> EngineResult<()> {
        match cmd {
            EngineCommand::TrackAdd { id, name } => {
                self.add_track(id, &name);
            }
            EngineCommand::TrackRemove { id } => {
                let index = self
                    .tracks
                    .iter()
                    .position(|t| t.id() == id)
                    .ok_or_else(|| EngineError::UnknownTrack(id.clone()))?;
                let mut track = self.tracks.remove(index);
                track.disconnect(&self.ctx);
                track.drain_meter_events(&mut self.meter_tx);
                log::info!("Removed track '{id}'");
            }
            EngineCommand::ModuleAdd {
                track_id,
                module_id,
                module_type,
            } => {
                self.add_module(&track_id, module_id, module_type)?;
            }
            EngineCommand::ModuleRemove {
                track_id,
                module_id,
            } => {
                let strip = find_strip(&mut self.master, &mut self.tracks, &track_id)?;
                if !strip.rack().iter().any(|m| m.id == module_id) {
                    return Err(EngineError::UnknownModule(module_id));
                }
                strip.remove_module(&module_id, &self.ctx, &self.assets);
            }
            EngineCommand::ParamSet {
                module_id,
                param,
                value,
            } => {
                self.set_param(&module_id, &param, &value)?;
            }
            EngineCommand::TransportPlay => self.play(),
            EngineCommand::TransportPause => self.pause(),
            EngineCommand::TransportSeek { time } => self.seek(time),
            EngineCommand::RackUpdate { track_id, modules } => {
                self.update_rack(&track_id, modules)?;
            }
            EngineCommand::ModuleBypass {
                track_id,
                module_id,
                bypassed,
            } => {
                let strip = find_strip(&mut self.master, &mut self.tracks, &track_id)?;
                strip
                    .set_bypass(&module_id, bypassed, &self.ctx, &self.assets)
                    .ok_or(EngineError::UnknownModule(module_id))?;
            }
            EngineCommand::TrackVolume { id, value } => {
                find_strip(&mut self.master, &mut self.tracks, &id)?.set_volume(value);
            }
            EngineCommand::TrackPan { id, value } => {
                find_strip(&mut self.master, &mut self.tracks, &id)?.set_pan(value);
            }
            EngineCommand::TrackSource { id, asset_id } => {
                let buffer = self
                    .assets
                    .get(&asset_id)
                    .cloned()
                    .ok_or(EngineError::UnknownAsset(asset_id))?;
                let position = self.current_time();
                let playing = self.transport.is_playing();
                let strip = find_strip(&mut self.master, &mut self.tracks, &id)?;
                strip.set_source(buffer, &self.ctx);
                if playing {
                    strip.play(position);
                }
            }
        }
        Ok(())
    }

    // ============ Structure ============

    /// Add a track; an existing id is left untouched
    pub fn add_track(&mut self, id: impl Into<String>, name: &str) -> bool {
        let id = id.into();
        if id == MASTER_ID || self.tracks.iter().any(|t| t.id() == id) {
            log::debug!("Track '{id}' already exists");
            return false;
        }
        log::info!("Added track '{id}' ({name})");
        self.tracks.push(TrackStrip::track(id, &self.ctx));
        true
    }

    /// Append a module with registry defaults
    pub fn add_module(
        &mut self,
        track_id: &str,
        module_id: impl Into<String>,
        module_type: ModuleType,
    ) -> EngineResult<()> {
        let module = create_default_module(module_type, module_id);
        let strip = find_strip(&mut self.master, &mut self.tracks, track_id)?;
        strip.add_module(module, &self.ctx, &self.assets);
        self.publish_meters();
        Ok(())
    }

    pub fn update_rack(&mut self, track_id: &str, modules: Vec<RackModule>) -> EngineResult<()> {
        let strip = find_strip(&mut self.master, &mut self.tracks, track_id)?;
        strip.update_rack(modules, &self.ctx, &self.assets);
        self.publish_meters();
        Ok(())
    }

    /// Queue meter registrations from every strip for the control plane
    fn publish_meters(&mut self) {
        for strip in std::iter::once(&mut self.master).chain(self.tracks.iter_mut()) {
            strip.drain_meter_events(&mut self.meter_tx);
        }
        self.meter_tx.flush();
    }

    /// Route a parameter to whichever rack holds the module, master first
    pub fn set_param(&mut self, module_id: &str, param: &str, value: &ParamValue) -> EngineResult<()> {
        if self.master.update_module_param(module_id, param, value, &self.assets) {
            return Ok(());
        }
        for track in &mut self.tracks {
            if track.update_module_param(module_id, param, value, &self.assets) {
                return Ok(());
            }
        }
        Err(EngineError::UnknownModule(module_id.to_string()))
    }

    // ============ Transport ============

    pub fn play(&mut self) {
        let now = self.now();
        if let Some(offset) = self.transport.play(now) {
            for track in &mut self.tracks {
                track.play(offset);
            }
            log::debug!("Play from {offset:.3}s");
        }
    }

    pub fn pause(&mut self) {
        let now = self.now();
        if self.transport.pause(now) {
            for track in &mut self.tracks {
                track.stop();
            }
            log::debug!("Paused at {:.3}s", self.transport.current_time(now));
        }
    }

    /// Move the playhead, restarting playback there when playing
    pub fn seek(&mut self, time: f64) {
        let was_playing = self.transport.is_playing();
        if was_playing {
            self.pause();
        }
        self.transport.set_position(time);
        if was_playing {
            self.play();
        }
    }

    /// Transport position (seconds)
    pub fn current_time(&self) -> f64 {
        self.transport.current_time(self.now())
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    /// Engine clock: rendered frames in seconds
    fn now(&self) -> f64 {
        self.frames_rendered as f64 / self.ctx.sample_rate
    }

    // ============ Rendering ============

    /// Drain commands, then render `left.len()` frames of the master output
    pub fn render_block(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        self.process_commands();

        let frames = left.len().min(right.len());
        let mut offset = 0;
        while offset < frames {
            let n = (frames - offset).min(self.ctx.block_size);
            let mix_l = &mut self.mix_l[..n];
            let mix_r = &mut self.mix_r[..n];
            mix_l.fill(0.0);
            mix_r.fill(0.0);

            for track in &mut self.tracks {
                track.render_into(mix_l, mix_r);
            }
            self.master.process(mix_l, mix_r);

            left[offset..offset + n].copy_from_slice(mix_l);
            right[offset..offset + n].copy_from_slice(mix_r);

            offset += n;
            self.frames_rendered += n as u64;
        }

        self.meters.position.store(self.current_time());
    }

    // ============ Accessors ============

    pub fn context(&self) -> &ProcessingContext {
        &self.ctx
    }

    pub fn meters(&self) -> &Arc<MeterBridge> {
        &self.meters
    }

    pub fn assets(&self) -> &AssetTable {
        &self.assets
    }

    pub fn track(&self, id: &str) -> Option<&TrackStrip> {
        if id == MASTER_ID {
            return Some(&self.master);
        }
        self.tracks.iter().find(|t| t.id() == id)
    }

    pub fn master(&self) -> &TrackStrip {
        &self.master
    }

    /// Track ids in creation order (master excluded)
    pub fn track_ids(&self) -> Vec<&str> {
        self.tracks.iter().map(TrackStrip::id).collect()
    }

    /// Wired module ids per strip, master included
    pub fn wired_chains(&self) -> Vec<(String, Vec<String>)> {
        std::iter::once(&self.master)
            .chain(&self.tracks)
            .map(|t| (t.id().to_string(), t.wired_ids().to_vec()))
            .collect()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}

fn find_strip<'a>(
    master: &'a mut TrackStrip,
    tracks: &'a mut [TrackStrip],
    id: &str,
) -> EngineResult<&'a mut TrackStrip> {
    if id == MASTER_ID {
        return Ok(master);
    }
    tracks
        .iter_mut()
        .find(|t| t.id() == id)
        .ok_or_else(|| EngineError::UnknownTrack(id.to_string()))
}

// ============ Handle ============

/// Control-plane side of the engine
pub struct EngineHandle {
    command_tx: Producer<EngineCommand>,
    meters: Arc<MeterBridge>,
}

impl EngineHandle {
    pub fn new(command_tx: Producer<EngineCommand>, meters: Arc<MeterBridge>) -> Self {
        Self { command_tx, meters }
    }

    /// Queue a command for the next render block
    pub fn send(&mut self, cmd: EngineCommand) -> EngineResult<()> {
        self.command_tx.push(cmd).map_err(|_| EngineError::QueueFull)
    }

    pub fn add_track(&mut self, id: &str, name: &str) -> EngineResult<()> {
        self.send(EngineCommand::TrackAdd {
            id: id.to_string(),
            name: name.to_string(),
        })
    }

    pub fn add_module(&mut self, track_id: &str, module_id: &str, module_type: ModuleType) -> EngineResult<()> {
        self.send(EngineCommand::ModuleAdd {
            track_id: track_id.to_string(),
            module_id: module_id.to_string(),
            module_type,
        })
    }

    pub fn set_param(&mut self, module_id: &str, param: &str, value: impl Into<ParamValue>) -> EngineResult<()> {
        self.send(EngineCommand::ParamSet {
            module_id: module_id.to_string(),
            param: param.to_string(),
            value: value.into(),
        })
    }

    pub fn play(&mut self) -> EngineResult<()> {
        self.send(EngineCommand::TransportPlay)
    }

    pub fn pause(&mut self) -> EngineResult<()> {
        self.send(EngineCommand::TransportPause)
    }

    pub fn seek(&mut self, time: f64) -> EngineResult<()> {
        self.send(EngineCommand::TransportSeek { time })
    }

    pub fn meters(&self) -> &Arc<MeterBridge> {
        &self.meters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_core::AudioBuffer;

    fn engine() -> (MixerEngine, EngineHandle) {
        MixerEngine::new(&EngineConfig::default(), AssetTable::new()).unwrap()
    }

    fn render(engine: &mut MixerEngine, frames: usize) -> (Vec<f64>, Vec<f64>) {
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        engine.render_block(&mut left, &mut right);
        (left, right)
    }

    #[test]
    fn test_track_add_is_idempotent() {
        let (mut engine, _) = engine();
        assert!(engine.add_track("t1", "Drums"));
        assert!(!engine.add_track("t1", "Drums again"));
        assert!(!engine.add_track(MASTER_ID, "Master"));
        assert_eq!(engine.track_ids(), vec!["t1"]);
    }

    #[test]
    fn test_commands_apply_at_block_start() {
        let (mut engine, mut handle) = engine();
        handle.add_track("t1", "Bass").unwrap();
        handle.add_module("t1", "eq", ModuleType::ParametricEq).unwrap();
        assert!(engine.track("t1").is_none());

        render(&mut engine, 128);
        let track = engine.track("t1").unwrap();
        assert_eq!(track.wired_ids(), ["eq".to_string()]);
    }

    #[test]
    fn test_master_module_routing() {
        let (mut engine, _) = engine();
        engine.add_track("t1", "Vox");
        engine.add_module(MASTER_ID, "lim", ModuleType::Limiter).unwrap();
        engine.add_module("t1", "comp", ModuleType::Compressor).unwrap();

        engine.set_param("lim", "lookahead", &ParamValue::Number(10.0)).unwrap();
        assert_eq!(engine.master().latency(), 480);
        assert_eq!(engine.master().rack()[0].number("lookahead"), Some(10.0));

        engine.set_param("comp", "ratio", &ParamValue::Number(8.0)).unwrap();
        assert_eq!(engine.track("t1").unwrap().rack()[0].number("ratio"), Some(8.0));

        assert!(matches!(
            engine.set_param("nope", "ratio", &ParamValue::Number(1.0)),
            Err(EngineError::UnknownModule(_))
        ));
    }

    #[test]
    fn test_unknown_targets_are_errors() {
        let (mut engine, _) = engine();
        let add = EngineCommand::ModuleAdd {
            track_id: "ghost".into(),
            module_id: "m".into(),
            module_type: ModuleType::Chorus,
        };
        assert!(matches!(engine.handle_command(add), Err(EngineError::UnknownTrack(_))));

        engine.add_track("t1", "");
        let source = EngineCommand::TrackSource {
            id: "t1".into(),
            asset_id: "missing".into(),
        };
        assert!(matches!(engine.handle_command(source), Err(EngineError::UnknownAsset(_))));

        let remove = EngineCommand::ModuleRemove {
            track_id: "t1".into(),
            module_id: "m".into(),
        };
        assert!(matches!(engine.handle_command(remove), Err(EngineError::UnknownModule(_))));

        // Dispatch logs instead of failing
        engine.dispatch(EngineCommand::TrackRemove { id: "ghost".into() });
        assert_eq!(engine.track_ids(), vec!["t1"]);
    }

    #[test]
    fn test_transport_follows_rendered_frames() {
        let (mut engine, _) = engine();
        assert_eq!(engine.current_time(), 0.0);

        engine.play();
        render(&mut engine, 4800);
        assert!((engine.current_time() - 0.1).abs() < 1e-12);
        assert!((engine.meters().position.load() - 0.1).abs() < 1e-12);

        engine.pause();
        render(&mut engine, 4800);
        assert!((engine.current_time() - 0.1).abs() < 1e-12);

        engine.seek(2.0);
        assert!(!engine.is_playing());
        assert_eq!(engine.current_time(), 2.0);

        engine.play();
        render(&mut engine, 2400);
        assert!((engine.current_time() - 2.05).abs() < 1e-12);

        engine.seek(1.0);
        assert!(engine.is_playing());
        assert!((engine.current_time() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_source_plays_into_master() {
        let mut assets = AssetTable::new();
        assets.insert("dc", AudioBuffer::mono(48000.0, vec![0.5; 48000]).unwrap());
        let (mut engine, _) = MixerEngine::new(&EngineConfig::default(), assets).unwrap();

        engine.add_track("t1", "DC");
        engine
            .handle_command(EngineCommand::TrackSource {
                id: "t1".into(),
                asset_id: "dc".into(),
            })
            .unwrap();

        // Stopped transport renders silence
        let (left, _) = render(&mut engine, 256);
        assert!(left.iter().all(|&x| x == 0.0));

        engine.play();
        let (left, right) = render(&mut engine, 256);
        assert!(engine.track("t1").unwrap().is_playing());
        assert!((left[255] - 0.5).abs() < 1e-9);
        assert!((right[255] - 0.5).abs() < 1e-9);
        assert!(engine.meters().master.peak.load() > -7.0);
    }

    #[test]
    fn test_track_remove_unregisters_meters() {
        let (mut engine, _) = engine();
        engine.add_track("t1", "");
        engine.add_module("t1", "comp", ModuleType::Compressor).unwrap();
        assert!(engine.meters().module("t1", "comp").is_some());

        engine
            .handle_command(EngineCommand::TrackRemove { id: "t1".into() })
            .unwrap();
        assert!(engine.meters().module("t1", "comp").is_none());
        assert!(engine.track_ids().is_empty());
    }

    #[test]
    fn test_meters_are_per_strip() {
        let (mut engine, _) = engine();
        engine.add_track("t1", "");
        engine.add_track("t2", "");
        engine.add_module("t1", "comp", ModuleType::Compressor).unwrap();
        engine.add_module("t2", "comp", ModuleType::Compressor).unwrap();
        let t1 = engine.meters().module("t1", "comp").unwrap();
        let t2 = engine.meters().module("t2", "comp").unwrap();
        assert!(!Arc::ptr_eq(&t1, &t2));

        engine
            .handle_command(EngineCommand::ModuleRemove {
                track_id: "t1".into(),
                module_id: "comp".into(),
            })
            .unwrap();
        assert!(engine.meters().module("t1", "comp").is_none());
        assert!(engine.meters().module("t2", "comp").is_some());
    }

    #[test]
    fn test_param_for_bypassed_module_is_kept() {
        let (mut engine, _) = engine();
        engine.add_track("t1", "");
        let modules = vec![
            create_default_module(ModuleType::ParametricEq, "eq"),
            create_default_module(ModuleType::Compressor, "comp").with_bypass(true),
        ];
        engine.update_rack("t1", vec![modules[0].clone()]).unwrap();
        engine.update_rack("t1", modules).unwrap();

        engine.set_param("comp", "ratio", &ParamValue::Number(6.0)).unwrap();
        engine
            .handle_command(EngineCommand::ModuleBypass {
                track_id: "t1".into(),
                module_id: "comp".into(),
                bypassed: false,
            })
            .unwrap();
        let track = engine.track("t1").unwrap();
        assert_eq!(track.wired_ids(), ["eq".to_string(), "comp".to_string()]);
        assert_eq!(track.rack()[1].number("ratio"), Some(6.0));
    }

    #[test]
    fn test_queue_full_is_reported() {
        let config = EngineConfig {
            command_queue_capacity: 2,
            ..EngineConfig::default()
        };
        let (_engine, mut handle) = MixerEngine::new(&config, AssetTable::new()).unwrap();
        handle.play().unwrap();
        handle.pause().unwrap();
        assert!(matches!(handle.play(), Err(EngineError::QueueFull)));
    }
}
