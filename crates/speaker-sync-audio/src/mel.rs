use std::f32::consts::PI;
use std::sync::Arc;

use ndarray::Array2;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::{AudioError, AudioResult};
use crate::wav::SAMPLE_RATE;

/// Log-mel spectrogram hyper-parameters the lip-sync generator was trained
/// with.
#[derive(Debug, Clone, PartialEq)]
pub struct MelConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub win_length: usize,
    pub n_mels: usize,
    pub fmin: f32,
    pub fmax: f32,
    pub preemphasis: f32,
    pub ref_level_db: f32,
    pub min_level_db: f32,
    pub max_abs_value: f32,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            n_fft: 800,
            hop_length: 200,
            win_length: 800,
            n_mels: 80,
            fmin: 55.0,
            fmax: 7600.0,
            preemphasis: 0.97,
            ref_level_db: 20.0,
            min_level_db: -100.0,
            max_abs_value: 4.0,
        }
    }
}

impl MelConfig {
    fn validate(&self) -> AudioResult<()> {
        if self.n_fft == 0 || self.hop_length == 0 || self.n_mels == 0 {
            return Err(AudioError::Configuration(
                "n_fft, hop_length and n_mels must be positive".into(),
            ));
        }
        if self.win_length == 0 || self.win_length > self.n_fft {
            return Err(AudioError::Configuration(format!(
                "win_length {} must be in 1..={}",
                self.win_length, self.n_fft
            )));
        }
        if !(self.fmin >= 0.0 && self.fmax > self.fmin) {
            return Err(AudioError::Configuration(format!(
                "invalid mel frequency range {}..{}",
                self.fmin, self.fmax
            )));
        }
        Ok(())
    }
}

/// Computes normalised log-mel spectrograms (`n_mels x columns`).
pub struct MelExtractor {
    config: MelConfig,
    window: Vec<f32>,
    filterbank: Array2<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl MelExtractor {
    pub fn new(config: MelConfig) -> AudioResult<Self> {
        config.validate()?;
        let window = centered_window(config.n_fft, config.win_length);
        let filterbank = mel_filterbank(&config);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(config.n_fft);
        Ok(Self {
            config,
            window,
            filterbank,
            fft,
        })
    }

    pub fn config(&self) -> &MelConfig {
        &self.config
    }

    pub fn extract(&self, samples: &[f32]) -> AudioResult<Array2<f32>> {
        if samples.is_empty() {
            return Err(AudioError::Empty);
        }
        let emphasized = preemphasis(samples, self.config.preemphasis);
        let magnitudes = self.stft_magnitude(&emphasized);
        let mel = self.filterbank.dot(&magnitudes);
        ensure_finite(&mel)?;

        let min_level = 10f32.powf(self.config.min_level_db / 20.0);
        let max_abs = self.config.max_abs_value;
        let min_db = self.config.min_level_db;
        let ref_db = self.config.ref_level_db;
        let normalized = mel.mapv(|value| {
            let db = 20.0 * value.max(min_level).log10() - ref_db;
            ((2.0 * max_abs) * ((db - min_db) / -min_db) - max_abs).clamp(-max_abs, max_abs)
        });
        ensure_finite(&normalized)?;
        Ok(normalized)
    }

    fn stft_magnitude(&self, signal: &[f32]) -> Array2<f32> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let padded = reflect_pad(signal, n_fft / 2);
        let columns = (padded.len() - n_fft) / hop + 1;
        let bins = n_fft / 2 + 1;

        let mut spectrum = Array2::<f32>::zeros((bins, columns));
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
        for column in 0..columns {
            let start = column * hop;
            for (slot, (sample, weight)) in buffer
                .iter_mut()
                .zip(padded[start..start + n_fft].iter().zip(&self.window))
            {
                *slot = Complex::new(sample * weight, 0.0);
            }
            self.fft.process(&mut buffer);
            for bin in 0..bins {
                spectrum[[bin, column]] = buffer[bin].norm();
            }
        }
        spectrum
    }
}

fn ensure_finite(matrix: &Array2<f32>) -> AudioResult<()> {
    match matrix.indexed_iter().find(|(_, value)| !value.is_finite()) {
        Some(((bin, column), _)) => Err(AudioError::NonFinite { bin, column }),
        None => Ok(()),
    }
}

fn preemphasis(samples: &[f32], coefficient: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(samples.len());
    let mut previous = 0.0f32;
    for sample in samples {
        out.push(sample - coefficient * previous);
        previous = *sample;
    }
    out
}

/// Periodic Hann window of `win_length`, zero-padded to `n_fft` and centred.
fn centered_window(n_fft: usize, win_length: usize) -> Vec<f32> {
    let offset = (n_fft - win_length) / 2;
    let mut window = vec![0.0f32; n_fft];
    for i in 0..win_length {
        window[offset + i] = 0.5 - 0.5 * ((2.0 * PI * i as f32) / win_length as f32).cos();
    }
    window
}

/// Mirrors `pad` samples on both sides without repeating the edge sample.
fn reflect_pad(signal: &[f32], pad: usize) -> Vec<f32> {
    let len = signal.len();
    let mut out = Vec::with_capacity(len + 2 * pad);
    let at = |offset: isize| -> f32 {
        if len == 1 {
            return signal[0];
        }
        let period = 2 * (len as isize - 1);
        let mut index = offset.rem_euclid(period);
        if index >= len as isize {
            index = period - index;
        }
        signal[index as usize]
    };
    for offset in -(pad as isize)..(len + pad) as isize {
        out.push(at(offset));
    }
    out
}

fn hz_to_mel(hz: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;
    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

/// Slaney-normalised triangular filterbank, `n_mels x (n_fft / 2 + 1)`.
fn mel_filterbank(config: &MelConfig) -> Array2<f32> {
    let bins = config.n_fft / 2 + 1;
    let n_mels = config.n_mels;
    let mut filterbank = Array2::<f32>::zeros((n_mels, bins));

    let fft_freqs: Vec<f64> = (0..bins)
        .map(|k| k as f64 * f64::from(config.sample_rate) / config.n_fft as f64)
        .collect();
    let mel_min = hz_to_mel(f64::from(config.fmin));
    let mel_max = hz_to_mel(f64::from(config.fmax));
    let edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect();

    for m in 0..n_mels {
        let lower_width = edges[m + 1] - edges[m];
        let upper_width = edges[m + 2] - edges[m + 1];
        let enorm = 2.0 / (edges[m + 2] - edges[m]);
        for (k, freq) in fft_freqs.iter().enumerate() {
            let lower = (freq - edges[m]) / lower_width;
            let upper = (edges[m + 2] - freq) / upper_width;
            filterbank[[m, k]] = (lower.min(upper).max(0.0) * enorm) as f32;
        }
    }
    filterbank
}
