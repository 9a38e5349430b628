//! Processing context
//!
//! Built once per engine from [`EngineConfig`] and passed by reference to
//! the factory and the strips. There is no process-wide context.

use sr_core::{EngineConfig, SrResult, TelemetryConfig};

#[derive(Debug, Clone)]
pub struct ProcessingContext {
    pub sample_rate: f64,
    pub block_size: usize,
    pub telemetry: TelemetryConfig,
}

impl ProcessingContext {
    /// Validate the config and build a context
    pub fn from_config(config: &EngineConfig) -> SrResult<Self> {
        config.validate()?;
        Ok(Self {
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            telemetry: config.telemetry.clone(),
        })
    }

    /// Context with default telemetry
    pub fn new(sample_rate: f64, block_size: usize) -> SrResult<Self> {
        Self::from_config(
            &EngineConfig::default()
                .with_sample_rate(sample_rate)
                .with_block_size(block_size),
        )
    }

    /// Seconds to samples at this context's rate
    #[inline]
    pub fn seconds_to_frames(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate).round() as usize
    }
}
