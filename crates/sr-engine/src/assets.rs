//! Asset table: decoded audio buffers by id
//!
//! Loaded by the control plane; processors only read from it. A missing
//! asset is an `Option::None`, never an error on the render path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use sr_core::AudioBuffer;

use crate::error::EngineResult;
use crate::export::read_wav;

#[derive(Debug, Clone, Default)]
pub struct AssetTable {
    buffers: HashMap<String, Arc<AudioBuffer>>,
}

impl AssetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, buffer: AudioBuffer) -> Arc<AudioBuffer> {
        let buffer = Arc::new(buffer);
        self.buffers.insert(id.into(), Arc::clone(&buffer));
        buffer
    }

    /// Decode a WAV file and store it under `id`
    pub fn load_wav(&mut self, id: impl Into<String>, path: impl AsRef<Path>) -> EngineResult<Arc<AudioBuffer>> {
        let id = id.into();
        let buffer = read_wav(path.as_ref())?;
        log::info!(
            "loaded asset '{}' ({} ch, {:.2} s) from {}",
            id,
            buffer.num_channels(),
            buffer.duration_secs(),
            path.as_ref().display()
        );
        Ok(self.insert(id, buffer))
    }

    pub fn get(&self, id: &str) -> Option<&Arc<AudioBuffer>> {
        self.buffers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.buffers.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<AudioBuffer>> {
        self.buffers.remove(id)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
