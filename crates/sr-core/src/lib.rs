//! sr-core: Shared types, rack data model and configuration for SonicRack
//!
//! This crate provides the foundational types used across all SonicRack crates.

mod buffer;
mod config;
mod error;
mod rack;
mod sample;

pub use buffer::*;
pub use config::*;
pub use error::*;
pub use rack::*;
pub use sample::*;

/// Decibel value wrapper
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Decibels(pub f64);

impl Decibels {
    pub const ZERO: Self = Self(0.0);
    pub const NEG_INF: Self = Self(f64::NEG_INFINITY);

    #[inline]
    pub fn from_gain(gain: f64) -> Self {
        if gain <= 0.0 {
            Self::NEG_INF
        } else {
            Self(20.0 * gain.log10())
        }
    }

    #[inline]
    pub fn to_gain(self) -> f64 {
        if self.0 <= -144.0 {
            0.0
        } else {
            10.0_f64.powf(self.0 / 20.0)
        }
    }
}

impl Default for Decibels {
    fn default() -> Self {
        Self::ZERO
    }
}

/// dB to linear gain, no floor
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Linear amplitude to dB with the detector offset used by all dynamics stages
#[inline]
pub fn level_db(amplitude: f64) -> f64 {
    20.0 * (amplitude.abs() + 1e-6).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decibels_roundtrip_unity() {
        assert_eq!(Decibels::from_gain(1.0), Decibels::ZERO);
        assert!((Decibels(-6.0).to_gain() - 0.501187).abs() < 1e-6);
        assert_eq!(Decibels::from_gain(0.0), Decibels::NEG_INF);
        assert_eq!(Decibels(-200.0).to_gain(), 0.0);
    }

    #[test]
    fn test_level_db_silence_is_finite() {
        let db = level_db(0.0);
        assert!(db.is_finite());
        assert!((db + 120.0).abs() < 1e-9);
    }
}
