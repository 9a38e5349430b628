//! Module registry
//!
//! Static parameter tables for every processing module type. The registry is
//! the single source of default values: [`create_default_module`] fills a new
//! module from it. Ranges are the contract the control plane validates
//! against; the render path does not re-check them.

use sr_core::{ModuleType, ParamValue, RackModule};

/// One declared parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDescriptor {
    pub name: &'static str,
    pub default_value: f64,
    pub min_value: f64,
    pub max_value: f64,
}

impl ParamDescriptor {
    const fn new(name: &'static str, default_value: f64, min_value: f64, max_value: f64) -> Self {
        Self {
            name,
            default_value,
            min_value,
            max_value,
        }
    }

    /// Clamp a control value into the declared range
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            self.default_value
        } else {
            value.clamp(self.min_value, self.max_value)
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min_value && value <= self.max_value
    }
}

const fn p(name: &'static str, default_value: f64, min_value: f64, max_value: f64) -> ParamDescriptor {
    ParamDescriptor::new(name, default_value, min_value, max_value)
}

/// Text parameter naming the impulse-response asset of the cabinet simulator
pub const IR_ASSET_PARAM: &str = "irAssetId";

// ============ Parameter tables ============

const COMPRESSOR: &[ParamDescriptor] = &[
    p("threshold", -24.0, -60.0, 0.0),
    p("ratio", 4.0, 1.0, 20.0),
    p("attack", 0.01, 0.0001, 1.0),
    p("release", 0.1, 0.001, 2.0),
    p("knee", 5.0, 0.0, 20.0),
    p("makeupGain", 0.0, 0.0, 24.0),
    p("mode", 0.0, 0.0, 3.0),
    p("mix", 1.0, 0.0, 1.0),
];

const SATURATION: &[ParamDescriptor] = &[
    p("drive", 0.5, 0.0, 1.0),
    p("type", 1.0, 0.0, 2.0),
    p("outputGain", 0.0, -24.0, 24.0),
    p("mix", 1.0, 0.0, 1.0),
];

const PARAMETRIC_EQ: &[ParamDescriptor] = &[
    p("lowFreq", 250.0, 20.0, 1000.0),
    p("lowGain", 0.0, -24.0, 24.0),
    p("midFreq", 1000.0, 200.0, 5000.0),
    p("midGain", 0.0, -24.0, 24.0),
    p("midQ", 1.0, 0.1, 10.0),
    p("highFreq", 4000.0, 2000.0, 20000.0),
    p("highGain", 0.0, -24.0, 24.0),
];

const LIMITER: &[ParamDescriptor] = &[
    p("threshold", -6.0, -60.0, 0.0),
    p("ceiling", -0.1, -12.0, 0.0),
    p("release", 0.05, 0.001, 2.0),
    p("lookahead", 5.0, 0.0, 20.0),
];

const TREMOLO: &[ParamDescriptor] = &[
    p("frequency", 4.0, 0.1, 20.0),
    p("depth", 0.5, 0.0, 1.0),
    p("spread", 0.0, -1.0, 1.0),
    p("waveform", 0.0, 0.0, 3.0),
    p("mix", 1.0, 0.0, 1.0),
];

const BITCRUSHER: &[ParamDescriptor] = &[
    p("bits", 8.0, 1.0, 16.0),
    p("normFreq", 1.0, 0.01, 1.0),
    p("mix", 1.0, 0.0, 1.0),
];

const CHORUS: &[ParamDescriptor] = &[
    p("frequency", 1.5, 0.1, 10.0),
    p("delayTime", 0.03, 0.0, 0.1),
    p("depth", 0.002, 0.0, 0.01),
    p("feedback", 0.0, 0.0, 0.95),
    p("wet", 0.5, 0.0, 1.0),
];

const DISTORTION: &[ParamDescriptor] = &[
    p("drive", 1.0, 0.0, 10.0),
    p("wet", 1.0, 0.0, 1.0),
    p("type", 0.0, 0.0, 2.0),
    p("outputGain", 0.0, -24.0, 24.0),
];

const FEEDBACK_DELAY: &[ParamDescriptor] = &[
    p("delayTime", 0.5, 0.0, 2.0),
    p("feedback", 0.3, 0.0, 0.95),
    p("wet", 0.5, 0.0, 1.0),
];

const AUTOWAH: &[ParamDescriptor] = &[
    p("baseFrequency", 100.0, 20.0, 5000.0),
    p("sensitivity", 0.5, 0.0, 1.0),
    p("octaves", 4.0, 0.0, 8.0),
    p("Q", 2.0, 0.1, 20.0),
    p("attack", 0.01, 0.001, 1.0),
    p("release", 0.1, 0.01, 2.0),
    p("wet", 1.0, 0.0, 1.0),
];

const PHASER: &[ParamDescriptor] = &[
    p("stages", 4.0, 2.0, 12.0),
    p("frequency", 0.5, 0.1, 20.0),
    p("baseFrequency", 1000.0, 20.0, 5000.0),
    p("octaves", 2.0, 0.0, 8.0),
    p("wet", 0.5, 0.0, 1.0),
];

const STEREO_IMAGER: &[ParamDescriptor] = &[
    p("lowFreq", 150.0, 20.0, 1000.0),
    p("highFreq", 2500.0, 1000.0, 20000.0),
    p("widthLow", 0.0, 0.0, 2.0),
    p("widthMid", 1.0, 0.0, 2.0),
    p("widthHigh", 1.2, 0.0, 2.0),
    p("bypass", 0.0, 0.0, 1.0),
];

const TRANSIENT_SHAPER: &[ParamDescriptor] = &[
    p("attackGain", 0.0, -24.0, 24.0),
    p("sustainGain", 0.0, -24.0, 24.0),
    p("mix", 1.0, 0.0, 1.0),
];

const MIDSIDE_EQ: &[ParamDescriptor] = &[
    p("midGain", 0.0, -24.0, 24.0),
    p("midFreq", 1000.0, 20.0, 20000.0),
    p("sideGain", 0.0, -24.0, 24.0),
    p("sideFreq", 1000.0, 20.0, 20000.0),
];

const DYNAMIC_EQ: &[ParamDescriptor] = &[
    p("frequency", 1000.0, 20.0, 20000.0),
    p("Q", 1.0, 0.1, 10.0),
    p("gain", 0.0, -24.0, 24.0),
    p("threshold", -20.0, -60.0, 0.0),
    p("ratio", 2.0, 1.0, 20.0),
    p("attack", 0.01, 0.001, 1.0),
    p("release", 0.1, 0.01, 2.0),
];

const DE_ESSER: &[ParamDescriptor] = &[
    p("frequency", 6000.0, 2000.0, 10000.0),
    p("threshold", -20.0, -60.0, 0.0),
    p("ratio", 4.0, 1.0, 20.0),
    p("attack", 0.005, 0.001, 0.1),
    p("release", 0.05, 0.01, 0.5),
    p("monitor", 0.0, 0.0, 1.0),
    p("bypass", 0.0, 0.0, 1.0),
];

const MULTIBAND_COMPRESSOR: &[ParamDescriptor] = &[
    p("lowFreq", 150.0, 20.0, 1000.0),
    p("highFreq", 2500.0, 1000.0, 20000.0),
    p("threshLow", -24.0, -60.0, 0.0),
    p("ratioLow", 4.0, 1.0, 20.0),
    p("attLow", 0.01, 0.0001, 1.0),
    p("relLow", 0.1, 0.001, 2.0),
    p("gainLow", 0.0, -24.0, 24.0),
    p("threshMid", -24.0, -60.0, 0.0),
    p("ratioMid", 4.0, 1.0, 20.0),
    p("attMid", 0.01, 0.0001, 1.0),
    p("relMid", 0.1, 0.001, 2.0),
    p("gainMid", 0.0, -24.0, 24.0),
    p("threshHigh", -24.0, -60.0, 0.0),
    p("ratioHigh", 4.0, 1.0, 20.0),
    p("attHigh", 0.01, 0.0001, 1.0),
    p("relHigh", 0.1, 0.001, 2.0),
    p("gainHigh", 0.0, -24.0, 24.0),
    p("bypass", 0.0, 0.0, 1.0),
];

const CAB_SIM: &[ParamDescriptor] = &[p("mix", 1.0, 0.0, 1.0)];

const DITHERING: &[ParamDescriptor] = &[p("bitDepth", 24.0, 8.0, 32.0)];

/// Declared parameters of a module type, in display order.
///
/// Reserved and unsupported types declare nothing.
pub fn descriptors(module_type: ModuleType) -> &'static [ParamDescriptor] {
    match module_type {
        ModuleType::Compressor => COMPRESSOR,
        ModuleType::Saturation => SATURATION,
        ModuleType::ParametricEq => PARAMETRIC_EQ,
        ModuleType::Limiter => LIMITER,
        ModuleType::Tremolo => TREMOLO,
        ModuleType::Bitcrusher => BITCRUSHER,
        ModuleType::Chorus => CHORUS,
        ModuleType::Distortion => DISTORTION,
        ModuleType::FeedbackDelay => FEEDBACK_DELAY,
        ModuleType::Autowah => AUTOWAH,
        ModuleType::Phaser => PHASER,
        ModuleType::StereoImager => STEREO_IMAGER,
        ModuleType::TransientShaper => TRANSIENT_SHAPER,
        ModuleType::MidsideEq => MIDSIDE_EQ,
        ModuleType::DynamicEq => DYNAMIC_EQ,
        ModuleType::DeEsser => DE_ESSER,
        ModuleType::MultibandCompressor => MULTIBAND_COMPRESSOR,
        ModuleType::CabSim => CAB_SIM,
        ModuleType::Dithering => DITHERING,
        _ => &[],
    }
}

/// Look up one parameter of a type
pub fn descriptor(module_type: ModuleType, name: &str) -> Option<&'static ParamDescriptor> {
    descriptors(module_type).iter().find(|d| d.name == name)
}

/// New module with every declared parameter at its default
pub fn create_default_module(module_type: ModuleType, id: impl Into<String>) -> RackModule {
    let mut module = RackModule::new(id, module_type);
    for d in descriptors(module_type) {
        module.set_param(d.name, d.default_value);
    }
    if module_type == ModuleType::CabSim {
        module.set_param(IR_ASSET_PARAM, ParamValue::Text(String::new()));
    }
    module
}
