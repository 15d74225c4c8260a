use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader};
use tracing::debug;

use crate::error::{AudioError, AudioResult};

/// Rate the mel extractor expects.
pub const SAMPLE_RATE: u32 = 16_000;

/// Loads a WAV file as mono `f32` samples in `[-1, 1]` at [`SAMPLE_RATE`].
pub fn load_wav(path: &Path) -> AudioResult<Vec<f32>> {
    let file = File::open(path).map_err(hound::Error::IoError)?;
    read_wav(BufReader::new(file))
}

pub fn read_wav<R: Read>(reader: R) -> AudioResult<Vec<f32>> {
    let mut reader = WavReader::new(reader)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    if interleaved.is_empty() {
        return Err(AudioError::Empty);
    }

    let channels = usize::from(spec.channels.max(1));
    let mono: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    debug!(
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        samples = mono.len(),
        "decoded wav"
    );

    Ok(resample_linear(&mono, spec.sample_rate, SAMPLE_RATE))
}

/// Linear-interpolation resampler.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = (source_pos - source_idx as f64) as f32;
            match (samples.get(source_idx), samples.get(source_idx + 1)) {
                (Some(left), Some(right)) => left + (right - left) * fraction,
                (Some(left), None) => *left,
                _ => samples[samples.len() - 1],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use hound::{WavSpec, WavWriter};

    use super::*;

    fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for sample in samples {
            writer.write_sample(*sample).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn mono_16k_is_scaled_only() {
        let data = wav_bytes(16_000, 1, &[0, 16_384, -32_768]);
        let samples = read_wav(Cursor::new(data)).unwrap();
        assert_eq!(samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn stereo_is_averaged() {
        let data = wav_bytes(16_000, 2, &[16_384, 0, -16_384, -16_384]);
        let samples = read_wav(Cursor::new(data)).unwrap();
        assert_eq!(samples, vec![0.25, -0.5]);
    }

    #[test]
    fn higher_rates_are_downsampled() {
        let data = wav_bytes(32_000, 1, &[0; 3200]);
        let samples = read_wav(Cursor::new(data)).unwrap();
        assert_eq!(samples.len(), 1600);
    }

    #[test]
    fn empty_audio_is_rejected() {
        let data = wav_bytes(16_000, 1, &[]);
        assert!(matches!(
            read_wav(Cursor::new(data)),
            Err(AudioError::Empty)
        ));
    }

    #[test]
    fn resample_interpolates() {
        let out = resample_linear(&[0.0, 1.0], 1, 2);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        std::fs::write(&path, wav_bytes(8_000, 1, &[1000; 800])).unwrap();
        let samples = load_wav(&path).unwrap();
        assert_eq!(samples.len(), 1600);
        assert!(samples.iter().all(|s| (s - 1000.0 / 32768.0).abs() < 1e-6));
    }
}
