//! Sample types

/// Type alias for audio samples (always f64 for maximum precision)
pub type Sample = f64;

/// Stereo sample pair
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub const fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub const fn mono(value: Sample) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    #[inline]
    pub fn to_mid_side(self) -> MidSideSample {
        MidSideSample {
            mid: (self.left + self.right) * 0.5,
            side: (self.left - self.right) * 0.5,
        }
    }
}

/// Mid/Side sample pair
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct MidSideSample {
    pub mid: Sample,
    pub side: Sample,
}

impl MidSideSample {
    #[inline]
    pub fn to_stereo(self) -> StereoSample {
        StereoSample {
            left: self.mid + self.side,
            right: self.mid - self.side,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mid_side_roundtrip() {
        let s = StereoSample::new(0.8, -0.2);
        let ms = s.to_mid_side();
        assert!((ms.mid - 0.3).abs() < 1e-12);
        assert!((ms.side - 0.5).abs() < 1e-12);
        let back = ms.to_stereo();
        assert!((back.left - s.left).abs() < 1e-12);
        assert!((back.right - s.right).abs() < 1e-12);
    }
}
