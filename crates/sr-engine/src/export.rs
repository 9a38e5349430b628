//! WAV import and export

use std::path::Path;

use sr_core::{AudioBuffer, Sample};

use crate::error::{EngineError, EngineResult};

/// Output sample format for export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Pcm16,
    Pcm24,
    Float32,
}

impl ExportFormat {
    /// Format for a bit depth given on the command line
    pub fn from_bits(bits: u16) -> EngineResult<Self> {
        match bits {
            16 => Ok(ExportFormat::Pcm16),
            24 => Ok(ExportFormat::Pcm24),
            32 => Ok(ExportFormat::Float32),
            other => Err(EngineError::Wav(format!("unsupported bit depth: {other}"))),
        }
    }

    pub fn bits_per_sample(self) -> u16 {
        match self {
            ExportFormat::Pcm16 => 16,
            ExportFormat::Pcm24 => 24,
            ExportFormat::Float32 => 32,
        }
    }
}

/// Decode a WAV file into a buffer at the file's own rate
pub fn read_wav(path: &Path) -> EngineResult<AudioBuffer> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<Sample> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .into_samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f64 / max_val)
                .collect()
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .filter_map(|s| s.ok())
            .map(|s| s as f64)
            .collect(),
    };

    Ok(AudioBuffer::from_interleaved(
        spec.sample_rate as f64,
        spec.channels as usize,
        &interleaved,
    )?)
}

/// Write a buffer to a WAV file; samples are clipped to [-1, 1]
pub fn write_wav(path: &Path, buffer: &AudioBuffer, format: ExportFormat) -> EngineResult<()> {
    let spec = hound::WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate: buffer.sample_rate().round() as u32,
        bits_per_sample: format.bits_per_sample(),
        sample_format: match format {
            ExportFormat::Float32 => hound::SampleFormat::Float,
            _ => hound::SampleFormat::Int,
        },
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let scale = match format {
        ExportFormat::Pcm16 => i16::MAX as f64,
        ExportFormat::Pcm24 => 8_388_607.0,
        ExportFormat::Float32 => 1.0,
    };

    for sample in buffer.to_interleaved() {
        let clipped = sample.clamp(-1.0, 1.0);
        match format {
            ExportFormat::Pcm16 => writer.write_sample((clipped * scale).round() as i16)?,
            ExportFormat::Pcm24 => writer.write_sample((clipped * scale).round() as i32)?,
            ExportFormat::Float32 => writer.write_sample(clipped as f32)?,
        }
    }

    writer.finalize()?;
    log::info!(
        "wrote {} frames ({} bit) to {}",
        buffer.len(),
        format.bits_per_sample(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("sr-engine-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_pcm24_file_preserves_levels() {
        let path = temp_path("levels.wav");
        let left: Vec<f64> = (0..480).map(|i| (i as f64 / 480.0) - 0.5).collect();
        let right = vec![0.25; 480];
        let buffer = AudioBuffer::stereo(48000.0, left.clone(), right).unwrap();

        write_wav(&path, &buffer, ExportFormat::Pcm24).unwrap();
        let decoded = read_wav(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(decoded.num_channels(), 2);
        assert_eq!(decoded.len(), 480);
        assert_eq!(decoded.sample_rate(), 48000.0);
        for (a, b) in decoded.channel(0).iter().zip(&left) {
            assert!((a - b).abs() < 1e-6);
        }
        assert!((decoded.channel(1)[100] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_export_clips() {
        let path = temp_path("clip.wav");
        let buffer = AudioBuffer::mono(44100.0, vec![2.0, -3.0]).unwrap();
        write_wav(&path, &buffer, ExportFormat::Pcm16).unwrap();
        let decoded = read_wav(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(decoded.channel(0)[0] <= 1.0);
        assert!(decoded.channel(0)[1] >= -1.0);
    }

    #[test]
    fn test_bit_depths() {
        assert_eq!(ExportFormat::from_bits(24).unwrap(), ExportFormat::Pcm24);
        assert!(ExportFormat::from_bits(12).is_err());
    }
}
