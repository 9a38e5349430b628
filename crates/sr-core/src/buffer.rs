//! Decoded audio buffers (track sources and impulse responses)

use crate::{Sample, SrError, SrResult};

/// Planar mono or stereo audio held in memory.
///
/// The engine is strictly mono/stereo, so construction rejects anything
/// with zero or more than two channels.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: f64,
    channels: Vec<Vec<Sample>>,
}

impl AudioBuffer {
    pub fn new(sample_rate: f64, channels: Vec<Vec<Sample>>) -> SrResult<Self> {
        if sample_rate.is_nan() || sample_rate <= 0.0 {
            return Err(SrError::InvalidBuffer(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        match channels.len() {
            1 => {}
            2 => {
                if channels[0].len() != channels[1].len() {
                    return Err(SrError::InvalidBuffer(format!(
                        "channel length mismatch: {} vs {}",
                        channels[0].len(),
                        channels[1].len()
                    )));
                }
            }
            n => {
                return Err(SrError::InvalidBuffer(format!(
                    "expected 1 or 2 channels, got {n}"
                )));
            }
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    pub fn mono(sample_rate: f64, samples: Vec<Sample>) -> SrResult<Self> {
        Self::new(sample_rate, vec![samples])
    }

    pub fn stereo(sample_rate: f64, left: Vec<Sample>, right: Vec<Sample>) -> SrResult<Self> {
        Self::new(sample_rate, vec![left, right])
    }

    /// Build from interleaved frames
    pub fn from_interleaved(sample_rate: f64, num_channels: usize, data: &[Sample]) -> SrResult<Self> {
        if num_channels == 0 || num_channels > 2 {
            return Err(SrError::InvalidBuffer(format!(
                "expected 1 or 2 channels, got {num_channels}"
            )));
        }
        let frames = data.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(frames); num_channels];
        for frame in data.chunks_exact(num_channels) {
            for (ch, &s) in frame.iter().enumerate() {
                channels[ch].push(s);
            }
        }
        Self::new(sample_rate, channels)
    }

    /// Silent stereo buffer of `frames` length
    pub fn silent_stereo(sample_rate: f64, frames: usize) -> SrResult<Self> {
        Self::stereo(sample_rate, vec![0.0; frames], vec![0.0; frames])
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate
    }

    /// Channel data; a mono buffer answers channel 1 with its only channel
    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        let index = index.min(self.channels.len() - 1);
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [Sample]> {
        self.channels.get_mut(index).map(|c| c.as_mut_slice())
    }

    /// Absolute peak across all channels
    pub fn peak(&self) -> Sample {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0, |acc: Sample, s| acc.max(s.abs()))
    }

    /// Interleaved copy (mono stays one channel)
    pub fn to_interleaved(&self) -> Vec<Sample> {
        let mut out = Vec::with_capacity(self.len() * self.num_channels());
        for i in 0..self.len() {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }
}
