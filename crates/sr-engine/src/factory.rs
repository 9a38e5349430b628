//! Processor factory
//!
//! Maps a rack module to a concrete processor. Types without an
//! implementation yield `None`; the strip substitutes a pass-through.

use sr_core::{ModuleType, RackModule};
use sr_dsp::dynamics::{Compressor, DeEsser, DynamicEq, Limiter, TransientShaper};
use sr_dsp::eq::{MidSideEq, ParametricEq};
use sr_dsp::modulation::{AutoWah, Chorus, Phaser, Tremolo};
use sr_dsp::multiband::MultibandCompressor;
use sr_dsp::saturation::{BitCrusher, Distortion, Dither, Saturator};
use sr_dsp::spatial::StereoImager;
use sr_dsp::FeedbackDelay;

use crate::assets::AssetTable;
use crate::context::ProcessingContext;
use crate::node::{RackProcessor, apply_parameters};
use crate::telemetry::Throttle;
use crate::wrappers::{CabSimNode, DynamicsNode, EffectNode, LoudnessNode};

/// Create a processor for a module with its parameters applied
pub fn create_processor(
    module: &RackModule,
    ctx: &ProcessingContext,
    assets: &AssetTable,
) -> Option<Box<dyn RackProcessor>> {
    let sr = ctx.sample_rate;
    let telemetry = &ctx.telemetry;

    let mut processor: Box<dyn RackProcessor> = match module.module_type {
        // Dynamics
        ModuleType::Compressor => Box::new(DynamicsNode::new(
            "Compressor",
            Compressor::new(sr),
            Throttle::millis(telemetry.compressor_interval_ms, sr),
        )),
        ModuleType::Limiter => Box::new(DynamicsNode::new(
            "Limiter",
            Limiter::new(sr),
            Throttle::blocks(telemetry.limiter_interval_blocks),
        )),
        ModuleType::DynamicEq => Box::new(DynamicsNode::new(
            "Dynamic EQ",
            DynamicEq::new(sr),
            Throttle::blocks(telemetry.dynamic_eq_interval_blocks),
        )),
        ModuleType::DeEsser => Box::new(DynamicsNode::new(
            "De-Esser",
            DeEsser::new(sr),
            Throttle::blocks(telemetry.dynamic_eq_interval_blocks),
        )),
        ModuleType::MultibandCompressor => Box::new(DynamicsNode::new(
            "Multiband Compressor",
            MultibandCompressor::new(sr),
            Throttle::blocks(telemetry.limiter_interval_blocks),
        )),
        ModuleType::TransientShaper => {
            Box::new(EffectNode::new("Transient Shaper", TransientShaper::new(sr)))
        }

        // Tone
        ModuleType::ParametricEq => Box::new(EffectNode::new("Parametric EQ", ParametricEq::new(sr))),
        ModuleType::MidsideEq => Box::new(EffectNode::new("Mid/Side EQ", MidSideEq::new(sr))),
        ModuleType::StereoImager => Box::new(EffectNode::new("Stereo Imager", StereoImager::new(sr))),
        ModuleType::Saturation => Box::new(EffectNode::new("Saturation", Saturator::new())),
        ModuleType::Distortion => Box::new(EffectNode::new("Distortion", Distortion::new())),
        ModuleType::Bitcrusher => Box::new(EffectNode::new("Bitcrusher", BitCrusher::new())),
        ModuleType::Dithering => Box::new(EffectNode::new("Dithering", Dither::new())),

        // Modulation and time
        ModuleType::Chorus => Box::new(EffectNode::new("Chorus", Chorus::new(sr))),
        ModuleType::Phaser => Box::new(EffectNode::new("Phaser", Phaser::new(sr))),
        ModuleType::Tremolo => Box::new(EffectNode::new("Tremolo", Tremolo::new(sr))),
        ModuleType::Autowah => Box::new(EffectNode::new("Auto-Wah", AutoWah::new(sr))),
        ModuleType::FeedbackDelay => {
            Box::new(EffectNode::new("Feedback Delay", FeedbackDelay::new(sr)))
        }

        // Convolution and metering
        ModuleType::CabSim => Box::new(CabSimNode::new(sr)),
        ModuleType::LoudnessMeter => {
            Box::new(LoudnessNode::new(sr, telemetry.loudness_interval_samples))
        }

        _ => return None,
    };

    apply_parameters(processor.as_mut(), &module.parameters, assets);
    Some(processor)
}
