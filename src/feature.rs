use std::sync::Arc;

use burn::config::Config;
use ndarray::{Array2, Array3};
use rand::Rng;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::Error;
use crate::mask::SpecAugmentConfig;

#[derive(Config, Debug)]
pub struct MelSpectrogramConfig {
    #[config(default = 44100)]
    pub sample_rate: u32,
    #[config(default = 1024)]
    pub n_fft: usize,
    #[config(default = 512)]
    pub hop_length: usize,
    #[config(default = 128)]
    pub n_mels: usize,
    #[config(default = 0.0)]
    pub f_min: f32,
    #[config(default = 11025.0)]
    pub f_max: f32,
}

impl MelSpectrogramConfig {
    pub fn init(&self) -> MelSpectrogram {
        let fft = FftPlanner::new().plan_fft_forward(self.n_fft);
        let window = hann_window(self.n_fft);
        let filterbank = mel_filterbank(self.sample_rate, self.n_fft, self.n_mels, self.f_min, self.f_max);

        MelSpectrogram {
            config: self.clone(),
            fft,
            window,
            filterbank,
        }
    }

    pub fn num_frames(&self, num_samples: usize) -> usize {
        1 + num_samples / self.hop_length
    }
}

/// Power mel spectrogram over a centered, reflect-padded STFT.
#[derive(Clone)]
pub struct MelSpectrogram {
    config: MelSpectrogramConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    // n_mels x (n_fft / 2 + 1)
    filterbank: Array2<f32>,
}

impl MelSpectrogram {
    pub fn config(&self) -> &MelSpectrogramConfig {
        &self.config
    }

    pub fn forward(&self, waveform: &[f32]) -> crate::error::Result<Array2<f32>> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let pad = n_fft / 2;

        if waveform.len() <= pad {
            return Err(Error::ClipTooShort {
                len: waveform.len(),
                min: pad,
            });
        }

        let padded = reflect_pad(waveform, pad);
        let n_frames = self.config.num_frames(waveform.len());
        let n_freqs = n_fft / 2 + 1;

        let mut power = Array2::<f32>::zeros((n_freqs, n_frames));
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];

        for frame in 0..n_frames {
            let start = frame * hop;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex::new(padded[start + i] * self.window[i], 0.0);
            }

            self.fft.process(&mut buffer);

            for (freq, bin) in buffer.iter().take(n_freqs).enumerate() {
                power[[freq, frame]] = bin.norm_sqr();
            }
        }

        let mel = self.filterbank.dot(&power);

        Ok(mel)
    }
}

fn hann_window(len: usize) -> Vec<f32> {
    // periodic
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / len as f32).cos())
        .collect()
}

fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f32> {
    let len = samples.len();
    let left = (1..=pad).rev().map(|i| samples[i]);
    let right = (1..=pad).map(|i| samples[len - 1 - i]);

    left.chain(samples.iter().copied()).chain(right).collect()
}

fn hz_to_mel(freq: f64) -> f64 {
    2595.0 * (1.0 + freq / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// HTK-scale triangular filters, unnormalized, shaped `[n_mels, n_fft / 2 + 1]`.
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize, f_min: f32, f_max: f32) -> Array2<f32> {
    let n_freqs = n_fft / 2 + 1;
    let nyquist = sample_rate as f64 / 2.0;
    let bin_freq = |k: usize| k as f64 * nyquist / (n_freqs - 1) as f64;

    let mel_min = hz_to_mel(f_min as f64);
    let mel_max = hz_to_mel(f_max as f64);
    let points = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect::<Vec<_>>();

    Array2::from_shape_fn((n_mels, n_freqs), |(m, k)| {
        let freq = bin_freq(k);
        let down = (freq - points[m]) / (points[m + 1] - points[m]);
        let up = (points[m + 2] - freq) / (points[m + 2] - points[m + 1]);

        down.min(up).max(0.0) as f32
    })
}

pub fn amplitude_to_db(spec: Array2<f32>) -> Array2<f32> {
    spec.mapv_into(|power| 10.0 * power.max(1e-10).log10())
}

/// Waveform to `[1, n_mels, frames]` log-mel features; masking only when
/// built for training.
#[derive(Clone)]
pub struct FeatureTransform {
    mel: MelSpectrogram,
    augment: Option<SpecAugmentConfig>,
}

impl FeatureTransform {
    pub fn training(mel: &MelSpectrogramConfig, augment: SpecAugmentConfig) -> Self {
        Self {
            mel: mel.init(),
            augment: Some(augment),
        }
    }

    pub fn validation(mel: &MelSpectrogramConfig) -> Self {
        Self {
            mel: mel.init(),
            augment: None,
        }
    }

    pub fn is_augmented(&self) -> bool {
        self.augment.is_some()
    }

    pub fn n_mels(&self) -> usize {
        self.mel.config().n_mels
    }

    pub fn apply<R: Rng + ?Sized>(&self, waveform: &[f32], rng: &mut R) -> crate::error::Result<Array3<f32>> {
        let spec = self.mel.forward(waveform)?;
        let mut spec = amplitude_to_db(spec);

        if let Some(augment) = &self.augment {
            augment.apply(&mut spec, rng);
        }

        let features = spec.insert_axis(ndarray::Axis(0));

        Ok(features)
    }
}

#[test]
fn test_filterbank_shape_and_range() {
    let config = MelSpectrogramConfig::new();
    let fb = mel_filterbank(config.sample_rate, config.n_fft, config.n_mels, config.f_min, config.f_max);

    assert_eq!(fb.dim(), (128, 513));
    assert!(fb.iter().all(|w| (0.0..=1.0).contains(w)));
    // nothing above f_max contributes
    let cutoff_bin = (11025.0 / (22050.0 / 512.0)) as usize + 1;
    assert!(fb.column(cutoff_bin + 1).iter().all(|w| *w == 0.0));
}

#[test]
fn test_frame_count_is_centered() {
    let config = MelSpectrogramConfig::new();
    let mel = config.init();
    let waveform = crate::util::sine(440.0, 220_500, 44_100);

    let spec = mel.forward(&waveform).unwrap();

    assert_eq!(spec.dim(), (128, 431));
}

#[test]
fn test_sine_energy_lands_near_its_frequency() {
    let config = MelSpectrogramConfig::new();
    let mel = config.init();
    let waveform = crate::util::sine(1_000.0, 22_050, 44_100);

    let spec = amplitude_to_db(mel.forward(&waveform).unwrap());
    let frame = spec.column(spec.ncols() / 2);
    let (peak, _) = frame
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |best, (i, v)| if *v > best.1 { (i, *v) } else { best });

    let center_of = |m: usize| {
        let lo = hz_to_mel(0.0);
        let hi = hz_to_mel(11025.0);
        mel_to_hz(lo + (hi - lo) * (m + 1) as f64 / 129.0)
    };
    assert!((center_of(peak) - 1_000.0).abs() < 150.0, "peak band {peak} at {} Hz", center_of(peak));
}

#[test]
fn test_validation_transform_is_deterministic() {
    use rand::SeedableRng;

    let transform = FeatureTransform::validation(&MelSpectrogramConfig::new());
    let waveform = crate::util::sample_sequence(11_025, 5);

    let a = transform.apply(&waveform, &mut rand::rngs::StdRng::seed_from_u64(1)).unwrap();
    let b = transform.apply(&waveform, &mut rand::rngs::StdRng::seed_from_u64(2)).unwrap();

    assert_eq!(a.dim(), (1, 128, 22));
    assert!(a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-6));
}

#[test]
fn test_training_transform_masks() {
    use rand::SeedableRng;

    let transform = FeatureTransform::training(
        &MelSpectrogramConfig::new(),
        SpecAugmentConfig::new().with_mask_value(f32::NAN),
    );
    let waveform = crate::util::sample_sequence(44_100, 9);
    let mut rng = rand::rngs::StdRng::seed_from_u64(4);

    let masked = (0..20)
        .map(|_| transform.apply(&waveform, &mut rng).unwrap())
        .filter(|features| features.iter().any(|v| v.is_nan()))
        .count();

    assert!(masked > 0);
}

#[test]
fn test_short_clip_is_rejected() {
    let mel = MelSpectrogramConfig::new().init();

    assert!(matches!(mel.forward(&[0.0; 100]), Err(Error::ClipTooShort { .. })));
}
