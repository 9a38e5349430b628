//! Engine configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{SrError, SrResult};

/// Throttle periods for render-path telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelemetryConfig {
    /// Compressor gain-reduction post period
    pub compressor_interval_ms: f64,
    /// Limiter gain-reduction post period (render blocks)
    pub limiter_interval_blocks: u32,
    /// Dynamic EQ gain-reduction post period (render blocks)
    pub dynamic_eq_interval_blocks: u32,
    /// Loudness meter post period (samples)
    pub loudness_interval_samples: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            compressor_interval_ms: 100.0,
            limiter_interval_blocks: 60,
            dynamic_eq_interval_blocks: 60,
            loudness_interval_samples: 2048,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Processing sample rate (Hz)
    pub sample_rate: f64,
    /// Render block size (samples per block)
    pub block_size: usize,
    /// Capacity of the control-plane command queue
    pub command_queue_capacity: usize,
    /// Telemetry throttling
    pub telemetry: TelemetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_size: 128,
            command_queue_capacity: 1024,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> SrResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> SrResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> SrResult<()> {
        if self.sample_rate.is_nan() || self.sample_rate <= 0.0 {
            return Err(SrError::InvalidConfig(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.block_size == 0 {
            return Err(SrError::InvalidConfig("block size must be non-zero".into()));
        }
        if self.command_queue_capacity == 0 {
            return Err(SrError::InvalidConfig(
                "command queue capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Set sample rate
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set block size
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set command queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.command_queue_capacity = capacity;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = telemetry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.telemetry.limiter_interval_blocks, 60);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "sampleRate": 44100, "blockSize": 256 }"#)
            .unwrap();
        assert_eq!(config.sample_rate, 44100.0);
        assert_eq!(config.block_size, 256);
        assert_eq!(config.command_queue_capacity, 1024);
        assert_eq!(config.telemetry.loudness_interval_samples, 2048);
    }

    #[test]
    fn test_rejects_zero_block() {
        let err = EngineConfig::from_json_str(r#"{ "blockSize": 0 }"#).unwrap_err();
        assert!(matches!(err, SrError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            EngineConfig::from_json_str("not json"),
            Err(SrError::Serialization(_))
        ));
    }
}
