//! Parametric (shelf / peak / shelf) and mid-side equalizers

use sr_core::{Sample, StereoSample};

use crate::biquad::{Biquad, FilterType};
use crate::{MonoProcessor, Processor, ProcessorConfig, StereoProcessor};

const SHELF_Q: f64 = 0.707;
const MIDSIDE_Q: f64 = 1.0;

/// One channel of the three-band EQ
#[derive(Debug, Clone)]
struct EqChannel {
    low: Biquad,
    mid: Biquad,
    high: Biquad,
}

impl EqChannel {
    #[inline]
    fn process(&mut self, x: Sample) -> Sample {
        let x = self.low.process_sample(x);
        let x = self.mid.process_sample(x);
        self.high.process_sample(x)
    }

    fn filters(&mut self) -> [&mut Biquad; 3] {
        [&mut self.low, &mut self.mid, &mut self.high]
    }
}

/// Band selector for [`ParametricEq`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqBand {
    LowShelf,
    Mid,
    HighShelf,
}

/// Low shelf -> peaking mid -> high shelf, in series
#[derive(Debug, Clone)]
pub struct ParametricEq {
    channels: [EqChannel; 2],
}

impl ParametricEq {
    pub fn new(sample_rate: f64) -> Self {
        let channel = EqChannel {
            low: Biquad::new(FilterType::LowShelf, 250.0, 0.0, SHELF_Q, sample_rate),
            mid: Biquad::new(FilterType::Peaking, 1000.0, 0.0, 1.0, sample_rate),
            high: Biquad::new(FilterType::HighShelf, 4000.0, 0.0, SHELF_Q, sample_rate),
        };
        Self {
            channels: [channel.clone(), channel],
        }
    }

    fn band_mut(&mut self, band: EqBand) -> impl Iterator<Item = &mut Biquad> {
        self.channels.iter_mut().map(move |ch| match band {
            EqBand::LowShelf => &mut ch.low,
            EqBand::Mid => &mut ch.mid,
            EqBand::HighShelf => &mut ch.high,
        })
    }

    pub fn set_frequency(&mut self, band: EqBand, hz: f64) {
        for f in self.band_mut(band) {
            let q = f.q();
            f.update_base(hz, q);
        }
    }

    pub fn set_gain(&mut self, band: EqBand, db: f64) {
        for f in self.band_mut(band) {
            f.set_gain(db);
        }
    }

    /// Q of the mid band; the shelves keep a fixed slope
    pub fn set_mid_q(&mut self, q: f64) {
        for f in self.band_mut(EqBand::Mid) {
            let freq = f.frequency();
            f.update_base(freq, q);
        }
    }

    /// Filters of one channel (low, mid, high)
    pub fn channel_filters(&self, channel: usize) -> Option<[&Biquad; 3]> {
        self.channels
            .get(channel)
            .map(|ch| [&ch.low, &ch.mid, &ch.high])
    }
}

impl Processor for ParametricEq {
    fn reset(&mut self) {
        for ch in &mut self.channels {
            for f in ch.filters() {
                Processor::reset(f);
            }
        }
    }
}

impl StereoProcessor for ParametricEq {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        (self.channels[0].process(left), self.channels[1].process(right))
    }
}

impl ProcessorConfig for ParametricEq {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        for ch in &mut self.channels {
            for f in ch.filters() {
                f.set_sample_rate(sample_rate);
            }
        }
    }
}

/// Independent peaking bands on the mid and side signals
#[derive(Debug, Clone)]
pub struct MidSideEq {
    mid: Biquad,
    side: Biquad,
}

impl MidSideEq {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            mid: Biquad::new(FilterType::Peaking, 1000.0, 0.0, MIDSIDE_Q, sample_rate),
            side: Biquad::new(FilterType::Peaking, 1000.0, 0.0, MIDSIDE_Q, sample_rate),
        }
    }

    pub fn set_mid_gain(&mut self, db: f64) {
        self.mid.set_gain(db);
    }

    pub fn set_mid_frequency(&mut self, hz: f64) {
        self.mid.update_base(hz, MIDSIDE_Q);
    }

    pub fn set_side_gain(&mut self, db: f64) {
        self.side.set_gain(db);
    }

    pub fn set_side_frequency(&mut self, hz: f64) {
        self.side.update_base(hz, MIDSIDE_Q);
    }
}

impl Processor for MidSideEq {
    fn reset(&mut self) {
        Processor::reset(&mut self.mid);
        Processor::reset(&mut self.side);
    }
}

impl StereoProcessor for MidSideEq {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let mut ms = StereoSample::new(left, right).to_mid_side();
        ms.mid = self.mid.process_sample(ms.mid);
        ms.side = self.side.process_sample(ms.side);
        let out = ms.to_stereo();
        (out.left, out.right)
    }
}

impl ProcessorConfig for MidSideEq {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.mid.set_sample_rate(sample_rate);
        self.side.set_sample_rate(sample_rate);
    }
}
