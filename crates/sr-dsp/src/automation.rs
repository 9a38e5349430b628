//! Block-rate or per-sample parameter input
//!
//! A parameter arrives either as one scalar for the whole block or as a
//! per-sample lane. Processors branch once per block on `is_constant()`
//! and keep the inner loop free of per-sample dispatch.

use sr_core::Sample;

/// Parameter value for one render block
#[derive(Debug, Clone, Copy)]
pub enum ParamInput<'a> {
    /// One value for the whole block
    Block(f64),
    /// One value per sample; shorter lanes hold their last value
    PerSample(&'a [Sample]),
}

impl ParamInput<'_> {
    #[inline]
    pub fn is_constant(&self) -> bool {
        match self {
            ParamInput::Block(_) => true,
            ParamInput::PerSample(lane) => lane.len() <= 1,
        }
    }

    /// Value at sample `index`
    #[inline]
    pub fn at(&self, index: usize) -> f64 {
        match self {
            ParamInput::Block(v) => *v,
            ParamInput::PerSample(lane) => match lane.get(index) {
                Some(v) => *v,
                None => lane.last().copied().unwrap_or(0.0),
            },
        }
    }

    /// First value of the block
    #[inline]
    pub fn first(&self) -> f64 {
        self.at(0)
    }
}

impl From<f64> for ParamInput<'_> {
    fn from(value: f64) -> Self {
        ParamInput::Block(value)
    }
}

impl<'a> From<&'a [Sample]> for ParamInput<'a> {
    fn from(lane: &'a [Sample]) -> Self {
        ParamInput::PerSample(lane)
    }
}
