//! Rack processor capability
//!
//! Every node in a track's chain implements [`RackProcessor`]. Parameters are
//! applied by name, one key at a time, so the caller never needs to know which
//! module type it is talking to.

use std::sync::Arc;

use sr_core::{AudioBuffer, ParamMap, ParamValue, Sample};

use crate::assets::AssetTable;
use crate::telemetry::ModuleMeter;

/// A processor that can sit in a rack
pub trait RackProcessor: Send {
    /// Display name
    fn name(&self) -> &str;

    /// Process stereo audio in place
    fn process(&mut self, left: &mut [Sample], right: &mut [Sample]);

    /// Apply one numeric parameter. Returns false for an unknown name.
    fn apply_parameter(&mut self, name: &str, value: f64) -> bool;

    /// Attach (or detach, with `None`) an asset-valued parameter.
    /// Returns false when the processor has no such parameter.
    ///
    /// Called on every parameter sync; re-attaching the buffer already held
    /// must leave processor state untouched.
    fn attach_asset(&mut self, _name: &str, _asset: Option<&Arc<AudioBuffer>>) -> bool {
        false
    }

    /// Latency in samples
    fn latency(&self) -> usize {
        0
    }

    /// Reset processor state
    fn reset(&mut self);

    /// Telemetry posted by this processor, if any
    fn meter(&self) -> Option<&Arc<ModuleMeter>> {
        None
    }
}

/// Apply a (partial) parameter map to a processor.
///
/// Numbers go through `apply_parameter`; text values name an asset and go
/// through `attach_asset`. A missing asset leaves the processor without one.
pub fn apply_parameters(
    processor: &mut dyn RackProcessor,
    params: &ParamMap,
    assets: &AssetTable,
) {
    for (name, value) in params {
        apply_parameter_value(processor, name, value, assets);
    }
}

/// Apply one parameter value
pub fn apply_parameter_value(
    processor: &mut dyn RackProcessor,
    name: &str,
    value: &ParamValue,
    assets: &AssetTable,
) {
    let known = match value {
        ParamValue::Number(v) => processor.apply_parameter(name, *v),
        ParamValue::Text(asset_id) => {
            let asset = assets.get(asset_id);
            if asset.is_none() && !asset_id.is_empty() {
                log::warn!(
                    "{}: asset '{}' for '{}' not loaded, wet path silent",
                    processor.name(),
                    asset_id,
                    name
                );
            }
            processor.attach_asset(name, asset)
        }
    };
    if !known {
        log::warn!("{}: unknown parameter '{}'", processor.name(), name);
    }
}

// ============ Pass-through ============

/// Unity gain stage standing in for modules without a processor
#[derive(Debug, Clone)]
pub struct PassThrough {
    name: String,
}

impl PassThrough {
    pub fn new(module_type: impl std::fmt::Display) -> Self {
        Self {
            name: format!("Pass-through ({module_type})"),
        }
    }
}

impl RackProcessor for PassThrough {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, _left: &mut [Sample], _right: &mut [Sample]) {}

    // Parameters of unknown modules are kept in the rack but have nothing to drive.
    fn apply_parameter(&mut self, _name: &str, _value: f64) -> bool {
        true
    }

    fn attach_asset(&mut self, _name: &str, _asset: Option<&Arc<AudioBuffer>>) -> bool {
        true
    }

    fn reset(&mut self) {}
}
