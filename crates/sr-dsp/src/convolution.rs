//! Uniformly partitioned FFT convolution and the cabinet simulator
//!
//! Overlap-save with a frequency-domain delay line:
//! - Partition size B = 256, FFT size N = 2B
//! - Each block: FFT of the last 2B inputs, multiply-accumulate against every
//!   IR partition spectrum, inverse FFT, keep the last B samples
//! - Latency is exactly one partition
//!
//! All buffers are sized when the IR is loaded; processing never allocates.

use std::sync::Arc;

use num_complex::Complex64;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use sr_core::{AudioBuffer, Sample};

use crate::{Processor, ProcessorConfig, StereoProcessor};

// ============ Constants ============

/// Samples per partition; also the processing latency
pub const PARTITION_SIZE: usize = 256;

const FFT_SIZE: usize = PARTITION_SIZE * 2;
const SPECTRUM_LEN: usize = FFT_SIZE / 2 + 1;

// ============ Convolver ============

/// Mono partitioned convolver
#[derive(Clone)]
pub struct Convolver {
    fft: Arc<dyn RealToComplex<f64>>,
    ifft: Arc<dyn ComplexToReal<f64>>,
    /// IR partition spectra
    partitions: Vec<Vec<Complex64>>,
    /// Input spectra, newest at `fdl_pos`
    fdl: Vec<Vec<Complex64>>,
    fdl_pos: usize,
    /// Previous block followed by the block being filled
    input_frame: Vec<f64>,
    /// Output of the last completed block
    output_block: Vec<f64>,
    block_pos: usize,
    time_scratch: Vec<f64>,
    accumulator: Vec<Complex64>,
    fft_scratch: Vec<Complex64>,
    ifft_scratch: Vec<Complex64>,
}

impl std::fmt::Debug for Convolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Convolver")
            .field("partitions", &self.partitions.len())
            .field("block_pos", &self.block_pos)
            .finish()
    }
}

impl Convolver {
    /// Build from an impulse response; an empty IR convolves to silence
    pub fn new(ir: &[f64]) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let ifft = planner.plan_fft_inverse(FFT_SIZE);

        let num_partitions = ir.len().div_ceil(PARTITION_SIZE).max(1);
        let mut padded = fft.make_input_vec();
        let mut fft_scratch = fft.make_scratch_vec();
        let partitions = (0..num_partitions)
            .map(|p| {
                padded.fill(0.0);
                let start = p * PARTITION_SIZE;
                if start < ir.len() {
                    let end = (start + PARTITION_SIZE).min(ir.len());
                    padded[..end - start].copy_from_slice(&ir[start..end]);
                }
                let mut spectrum = fft.make_output_vec();
                fft.process_with_scratch(&mut padded, &mut spectrum, &mut fft_scratch)
                    .ok();
                spectrum
            })
            .collect();

        Self {
            partitions,
            fdl: vec![vec![Complex64::new(0.0, 0.0); SPECTRUM_LEN]; num_partitions],
            fdl_pos: 0,
            input_frame: vec![0.0; FFT_SIZE],
            output_block: vec![0.0; PARTITION_SIZE],
            block_pos: 0,
            time_scratch: vec![0.0; FFT_SIZE],
            accumulator: vec![Complex64::new(0.0, 0.0); SPECTRUM_LEN],
            ifft_scratch: ifft.make_scratch_vec(),
            fft_scratch,
            fft,
            ifft,
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Push one sample, get the output delayed by one partition
    #[inline]
    pub fn process(&mut self, input: Sample) -> Sample {
        let out = self.output_block[self.block_pos];
        self.input_frame[PARTITION_SIZE + self.block_pos] = input;
        self.block_pos += 1;
        if self.block_pos == PARTITION_SIZE {
            self.process_partition();
            self.block_pos = 0;
        }
        out
    }

    fn process_partition(&mut self) {
        let count = self.partitions.len();

        self.time_scratch.copy_from_slice(&self.input_frame);
        self.fft
            .process_with_scratch(
                &mut self.time_scratch,
                &mut self.fdl[self.fdl_pos],
                &mut self.fft_scratch,
            )
            .ok();

        // Y = sum over p of X[k - p] * H[p]
        self.accumulator.fill(Complex64::new(0.0, 0.0));
        for (p, h) in self.partitions.iter().enumerate() {
            let x = &self.fdl[(self.fdl_pos + count - p) % count];
            for ((acc, xi), hi) in self.accumulator.iter_mut().zip(x).zip(h) {
                *acc += xi * hi;
            }
        }
        // DC and Nyquist bins of a real signal carry no imaginary part
        self.accumulator[0].im = 0.0;
        self.accumulator[SPECTRUM_LEN - 1].im = 0.0;

        self.ifft
            .process_with_scratch(
                &mut self.accumulator,
                &mut self.time_scratch,
                &mut self.ifft_scratch,
            )
            .ok();

        let norm = 1.0 / FFT_SIZE as f64;
        for (out, &y) in self
            .output_block
            .iter_mut()
            .zip(&self.time_scratch[PARTITION_SIZE..])
        {
            *out = y * norm;
        }

        self.input_frame.copy_within(PARTITION_SIZE.., 0);
        self.fdl_pos = (self.fdl_pos + 1) % count;
    }

    pub fn reset(&mut self) {
        for slot in &mut self.fdl {
            slot.fill(Complex64::new(0.0, 0.0));
        }
        self.fdl_pos = 0;
        self.input_frame.fill(0.0);
        self.output_block.fill(0.0);
        self.block_pos = 0;
    }
}

// ============ Cabinet simulator ============

/// Impulse-response convolver with parallel dry and wet gains.
///
/// Without an IR the wet path is silent; the dry path is delayed to stay
/// aligned with the wet path, so the whole node has one partition of latency.
#[derive(Debug, Clone)]
pub struct CabSimulator {
    convolvers: Option<[Convolver; 2]>,
    dry_delay: [Vec<Sample>; 2],
    dry_pos: usize,
    dry_gain: f64,
    wet_gain: f64,
    sample_rate: f64,
}

impl CabSimulator {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            convolvers: None,
            dry_delay: [vec![0.0; PARTITION_SIZE], vec![0.0; PARTITION_SIZE]],
            dry_pos: 0,
            dry_gain: 0.0,
            wet_gain: 1.0,
            sample_rate,
        }
    }

    /// Linear crossfade: wet = mix, dry = 1 - mix
    pub fn set_mix(&mut self, mix: f64) {
        self.wet_gain = mix;
        self.dry_gain = 1.0 - mix;
    }

    pub fn gains(&self) -> (f64, f64) {
        (self.dry_gain, self.wet_gain)
    }

    pub fn has_impulse_response(&self) -> bool {
        self.convolvers.is_some()
    }

    pub fn load_ir_mono(&mut self, ir: &[f64]) {
        let conv = Convolver::new(ir);
        self.convolvers = Some([conv.clone(), conv]);
    }

    pub fn load_ir_stereo(&mut self, left: &[f64], right: &[f64]) {
        self.convolvers = Some([Convolver::new(left), Convolver::new(right)]);
    }

    /// First channel feeds the left convolver, second (or first again) the right
    pub fn load_impulse_response(&mut self, ir: &AudioBuffer) {
        if (ir.sample_rate() - self.sample_rate).abs() > 0.5 {
            log::warn!(
                "impulse response at {} Hz used at {} Hz without resampling",
                ir.sample_rate(),
                self.sample_rate
            );
        }
        if ir.num_channels() >= 2 {
            self.load_ir_stereo(ir.channel(0), ir.channel(1));
        } else {
            self.load_ir_mono(ir.channel(0));
        }
    }

    pub fn clear_impulse_response(&mut self) {
        self.convolvers = None;
    }
}

impl Processor for CabSimulator {
    fn reset(&mut self) {
        if let Some(convs) = &mut self.convolvers {
            for c in convs {
                c.reset();
            }
        }
        for d in &mut self.dry_delay {
            d.fill(0.0);
        }
        self.dry_pos = 0;
    }

    fn latency(&self) -> usize {
        PARTITION_SIZE
    }
}

impl StereoProcessor for CabSimulator {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let dry_l = std::mem::replace(&mut self.dry_delay[0][self.dry_pos], left);
        let dry_r = std::mem::replace(&mut self.dry_delay[1][self.dry_pos], right);
        self.dry_pos = (self.dry_pos + 1) % PARTITION_SIZE;

        let (wet_l, wet_r) = match &mut self.convolvers {
            Some([cl, cr]) => (cl.process(left), cr.process(right)),
            None => (0.0, 0.0),
        };
        (
            dry_l * self.dry_gain + wet_l * self.wet_gain,
            dry_r * self.dry_gain + wet_r * self.wet_gain,
        )
    }
}

impl ProcessorConfig for CabSimulator {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }
}
