//! Offline rendering
//!
//! Builds a [`MixerEngine`] from a command list through the same dispatch
//! and reconciliation code as the real-time path, then renders synchronously.

use std::collections::BTreeMap;

use sr_core::{AudioBuffer, EngineConfig};

use crate::assets::AssetTable;
use crate::error::{EngineError, EngineResult};
use crate::mixer::MixerEngine;
use crate::protocol::EngineCommand;

pub struct OfflineRenderer {
    engine: MixerEngine,
}

impl OfflineRenderer {
    /// Apply `commands` in order to a fresh engine
    pub fn from_commands(
        config: &EngineConfig,
        assets: AssetTable,
        commands: impl IntoIterator<Item = EngineCommand>,
    ) -> EngineResult<Self> {
        let (mut engine, _handle) = MixerEngine::new(config, assets)?;
        let mut count = 0usize;
        for cmd in commands {
            engine.dispatch(cmd);
            count += 1;
        }
        log::info!("Offline graph built from {count} commands");
        Ok(Self { engine })
    }

    /// Render `duration` seconds of the master output
    pub fn render(&mut self, duration: f64) -> EngineResult<AudioBuffer> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(EngineError::Render(format!("invalid duration {duration}")));
        }
        let ctx = self.engine.context();
        let sample_rate = ctx.sample_rate;
        let frames = ctx.seconds_to_frames(duration);

        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        self.engine.render_block(&mut left, &mut right);

        log::info!("Rendered {frames} frames ({duration:.2}s) offline");
        Ok(AudioBuffer::stereo(sample_rate, left, right)?)
    }

    /// Wired module ids per strip
    pub fn wired_chains(&self) -> BTreeMap<String, Vec<String>> {
        self.engine.wired_chains().into_iter().collect()
    }

    pub fn engine(&self) -> &MixerEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut MixerEngine {
        &mut self.engine
    }
}
