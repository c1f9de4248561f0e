use std::f32::consts::PI;
use std::fs;
use std::path::Path;

use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub(crate) const FIXTURE_SAMPLE_RATE: u32 = 44_100;

pub(crate) fn sample_sequence(len: usize, seed: u64) -> Vec<f32> {
    let seq = StdRng::seed_from_u64(seed)
        .sample_iter(rand::distributions::Uniform::new(-0.5, 0.5))
        .take(len)
        .collect_vec();

    seq
}

pub(crate) fn sine(freq: f32, len: usize, sample_rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
        .collect_vec()
}

/// Writes `num_frames` frames of 16-bit PCM, each frame holding `frame`.
pub(crate) fn write_wav(path: &Path, frame: &[i16], channels: u16, num_frames: usize, sample_rate: u32) {
    assert_eq!(frame.len(), channels as usize);

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..num_frames {
        for sample in frame {
            writer.write_sample(*sample).unwrap();
        }
    }
    writer.finalize().unwrap();
}

pub(crate) fn write_mono(path: &Path, samples: &[f32], sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Lays out a miniature ESC-50 tree: two categories, one clip of each per
/// fold, `clip_len` samples per clip.
pub(crate) fn synthetic_esc50(root: &Path, clip_len: usize) {
    fs::create_dir_all(root.join("audio")).unwrap();
    fs::create_dir_all(root.join("meta")).unwrap();

    let mut rows = vec!["filename,fold,target,category,esc10,src_file,take".to_string()];
    for fold in 1..=5u32 {
        let tone = format!("{fold}-100{fold}-A-0.wav");
        write_mono(
            &root.join("audio").join(&tone),
            &sine(220.0 * fold as f32, clip_len, FIXTURE_SAMPLE_RATE),
            FIXTURE_SAMPLE_RATE,
        );
        rows.push(format!("{tone},{fold},0,dog,True,100{fold},A"));

        let noise = format!("{fold}-200{fold}-A-10.wav");
        write_mono(
            &root.join("audio").join(&noise),
            &sample_sequence(clip_len, fold as u64),
            FIXTURE_SAMPLE_RATE,
        );
        rows.push(format!("{noise},{fold},10,rain,True,200{fold},A"));
    }

    fs::write(root.join("meta").join("esc50.csv"), rows.join("\n") + "\n").unwrap();
}
