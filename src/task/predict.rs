use std::path::Path;

use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::softmax;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::data::batcher::SpectrogramBatcher;
use crate::data::Sample;
use crate::error::{Error, Result};
use crate::feature::FeatureTransform;
use crate::io::read_wav;
use crate::model::AudioCnn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub class: String,
    pub confidence: f32,
}

/// The `k` most probable classes for one row of logits, best first.
pub fn top_predictions<B: Backend>(logits: Tensor<B, 1>, classes: &[String], k: usize) -> Result<Vec<Prediction>> {
    let [num_logits] = logits.dims();
    if num_logits != classes.len() {
        return Err(Error::ShapeMismatch {
            expected: vec![classes.len()],
            found: vec![num_logits],
        });
    }

    let probabilities = softmax(logits, 0).into_data().iter::<f32>().collect_vec();

    let predictions = probabilities
        .into_iter()
        .zip(classes)
        .sorted_by(|a, b| b.0.total_cmp(&a.0))
        .take(k)
        .map(|(confidence, class)| Prediction {
            class: class.clone(),
            confidence,
        })
        .collect_vec();

    Ok(predictions)
}

/// Runs one WAV file through `model` with the validation transform.
pub fn classify_clip<B: Backend>(
    model: &AudioCnn<B>,
    transform: &FeatureTransform,
    path: &Path,
    classes: &[String],
    k: usize,
    device: &B::Device,
) -> Result<Vec<Prediction>> {
    let waveform = read_wav(path)?;
    let features = transform.apply(&waveform.samples, &mut StdRng::seed_from_u64(0))?;

    let batch = SpectrogramBatcher::<B>::new(device.clone()).batch(vec![Sample {
        features: features.into_dyn(),
        label: 0,
    }])?;
    let logits = model.forward(batch.features);
    let [_, num_classes] = logits.dims();

    top_predictions(logits.reshape([num_classes]), classes, k)
}

#[test]
fn test_predictions_are_ranked() {
    use burn::backend::NdArray;

    let device = Default::default();
    let classes = ["crow", "dog", "rain", "siren"].map(String::from);
    let logits = Tensor::<NdArray, 1>::from_floats([0.5, 3.0, -1.0, 2.0], &device);

    let top = top_predictions(logits, &classes, 3).unwrap();

    assert_eq!(top.iter().map(|p| p.class.as_str()).collect_vec(), vec!["dog", "siren", "crow"]);
    assert!(top.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    assert!(top.iter().all(|p| p.confidence > 0.0 && p.confidence < 1.0));
}

#[test]
fn test_class_count_must_match() {
    use burn::backend::NdArray;

    let device = Default::default();
    let logits = Tensor::<NdArray, 1>::from_floats([0.5, 3.0], &device);

    let result = top_predictions(logits, &["dog".to_string()], 1);

    assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
}

#[test]
fn test_classify_clip() {
    use burn::backend::NdArray;

    use crate::feature::MelSpectrogramConfig;
    use crate::model::AudioCnnConfig;
    use crate::util::{sine, write_mono, FIXTURE_SAMPLE_RATE};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.wav");
    write_mono(&path, &sine(440.0, 11_025, FIXTURE_SAMPLE_RATE), FIXTURE_SAMPLE_RATE);

    let device = Default::default();
    let model = AudioCnnConfig::tiny(2).init::<NdArray>(&device);
    let transform = FeatureTransform::validation(&MelSpectrogramConfig::new());
    let classes = ["dog".to_string(), "rain".to_string()];

    let top = classify_clip(&model, &transform, &path, &classes, 3, &device).unwrap();

    assert_eq!(top.len(), 2);
    let total: f32 = top.iter().map(|p| p.confidence).sum();
    assert!((total - 1.0).abs() < 1e-4);
}
