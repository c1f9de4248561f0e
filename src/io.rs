use std::path::Path;

use itertools::Itertools;

use crate::error::{Error, Result};

/// A mono waveform at the clip's native sample rate.
#[derive(Debug, Clone)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

pub fn read_wav(path: &Path) -> Result<Waveform> {
    let decode_error = |e: wavers::WaversError| Error::Wav {
        path: path.to_path_buf(),
        message: format!("{e:?}"),
    };

    let mut wav = wavers::Wav::<f32>::from_path(path).map_err(decode_error)?;
    let channels = wav.n_channels() as usize;
    let sample_rate = wav.sample_rate() as u32;
    let samples = wav.read().map_err(decode_error)?;

    tracing::trace!(path = %path.display(), channels, sample_rate, "decoded clip");

    Ok(Waveform {
        samples: downmix(&samples, channels),
        sample_rate,
    })
}

/// Averages interleaved channels into one.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect_vec()
}

#[test]
fn test_downmix_two_channels_is_mean() {
    let left = 0.25f32;
    let right = -0.75f32;
    let interleaved = std::iter::repeat([left, right]).take(100).flatten().collect_vec();

    let mono = downmix(&interleaved, 2);

    assert_eq!(mono.len(), 100);
    assert!(mono.iter().all(|s| (s - (left + right) / 2.0).abs() < 1e-7));
}

#[test]
fn test_downmix_mono_is_identity() {
    let samples = vec![0.1, 0.2, 0.3];

    assert_eq!(downmix(&samples, 1), samples);
}

#[test]
fn test_read_wav_downmixes_stereo_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stereo.wav");
    crate::util::write_wav(&path, &[8192, -8192], 2, 1_000, 44_100);

    let waveform = read_wav(&path).unwrap();

    assert_eq!(waveform.sample_rate, 44_100);
    assert_eq!(waveform.samples.len(), 1_000);
    assert!(waveform.samples.iter().all(|s| s.abs() < 1e-4));
}

#[test]
fn test_read_wav_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.wav");
    std::fs::write(&path, b"definitely not a riff header").unwrap();

    assert!(matches!(read_wav(&path), Err(Error::Wav { .. })));
}
