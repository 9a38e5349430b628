//! Rack data model: module types, module descriptors, parameter values

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Module type tag. Immutable once a module is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleType {
    DynamicEq,
    TransientShaper,
    Limiter,
    MidsideEq,
    CabSim,
    LoudnessMeter,
    Saturation,
    Dithering,
    ParametricEq,
    Distortion,
    Bitcrusher,
    Chorus,
    Phaser,
    Tremolo,
    Autowah,
    FeedbackDelay,
    Compressor,
    DeEsser,
    StereoImager,
    MultibandCompressor,

    // Reserved tags found in saved projects; no processor exists for them yet.
    DeClip,
    PhaseRotation,
    SpectralDenoise,
    MonoBass,
    PlosiveGuard,
    VoiceIsolate,
    SmartLevel,
    DeBleed,
    TapeStabilizer,
    EchoVanish,

    /// Any tag this build does not know
    #[serde(other)]
    Unsupported,
}

impl ModuleType {
    /// Every type that has a processor implementation
    pub const PROCESSING: [ModuleType; 20] = [
        ModuleType::DynamicEq,
        ModuleType::TransientShaper,
        ModuleType::Limiter,
        ModuleType::MidsideEq,
        ModuleType::CabSim,
        ModuleType::LoudnessMeter,
        ModuleType::Saturation,
        ModuleType::Dithering,
        ModuleType::ParametricEq,
        ModuleType::Distortion,
        ModuleType::Bitcrusher,
        ModuleType::Chorus,
        ModuleType::Phaser,
        ModuleType::Tremolo,
        ModuleType::Autowah,
        ModuleType::FeedbackDelay,
        ModuleType::Compressor,
        ModuleType::DeEsser,
        ModuleType::StereoImager,
        ModuleType::MultibandCompressor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleType::DynamicEq => "DYNAMIC_EQ",
            ModuleType::TransientShaper => "TRANSIENT_SHAPER",
            ModuleType::Limiter => "LIMITER",
            ModuleType::MidsideEq => "MIDSIDE_EQ",
            ModuleType::CabSim => "CAB_SIM",
            ModuleType::LoudnessMeter => "LOUDNESS_METER",
            ModuleType::Saturation => "SATURATION",
            ModuleType::Dithering => "DITHERING",
            ModuleType::ParametricEq => "PARAMETRIC_EQ",
            ModuleType::Distortion => "DISTORTION",
            ModuleType::Bitcrusher => "BITCRUSHER",
            ModuleType::Chorus => "CHORUS",
            ModuleType::Phaser => "PHASER",
            ModuleType::Tremolo => "TREMOLO",
            ModuleType::Autowah => "AUTOWAH",
            ModuleType::FeedbackDelay => "FEEDBACK_DELAY",
            ModuleType::Compressor => "COMPRESSOR",
            ModuleType::DeEsser => "DE_ESSER",
            ModuleType::StereoImager => "STEREO_IMAGER",
            ModuleType::MultibandCompressor => "MULTIBAND_COMPRESSOR",
            ModuleType::DeClip => "DE_CLIP",
            ModuleType::PhaseRotation => "PHASE_ROTATION",
            ModuleType::SpectralDenoise => "SPECTRAL_DENOISE",
            ModuleType::MonoBass => "MONO_BASS",
            ModuleType::PlosiveGuard => "PLOSIVE_GUARD",
            ModuleType::VoiceIsolate => "VOICE_ISOLATE",
            ModuleType::SmartLevel => "SMART_LEVEL",
            ModuleType::DeBleed => "DE_BLEED",
            ModuleType::TapeStabilizer => "TAPE_STABILIZER",
            ModuleType::EchoVanish => "ECHO_VANISH",
            ModuleType::Unsupported => "UNSUPPORTED",
        }
    }

    /// True when a processor implementation exists for this tag
    pub fn is_processing(self) -> bool {
        Self::PROCESSING.contains(&self)
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single parameter value. Everything is numeric except asset references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(v) => Some(*v),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            ParamValue::Number(_) => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

/// Parameter map of one module, ordered by name
pub type ParamMap = BTreeMap<String, ParamValue>;

/// One entry of a rack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RackModule {
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    #[serde(rename = "bypass", default)]
    pub bypassed: bool,
    #[serde(default)]
    pub parameters: ParamMap,
}

impl RackModule {
    /// Module with no parameters set
    pub fn new(id: impl Into<String>, module_type: ModuleType) -> Self {
        Self {
            id: id.into(),
            module_type,
            bypassed: false,
            parameters: ParamMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn with_bypass(mut self, bypassed: bool) -> Self {
        self.bypassed = bypassed;
        self
    }

    pub fn set_param(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.parameters.insert(name.to_string(), value.into());
    }

    /// Numeric parameter lookup
    pub fn number(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).and_then(ParamValue::as_number)
    }
}
