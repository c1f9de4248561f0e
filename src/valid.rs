use burn::data::dataset::Dataset;
use burn::nn::loss::CrossEntropyLoss;
use burn::prelude::{Backend, ElementConversion};
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::batcher::SpectrogramBatcher;
use crate::data::esc50::Esc50Dataset;
use crate::error::{Error, Result};
use crate::model::AudioCnn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Mean of the per-batch losses.
    pub loss: f64,
    /// Top-1 accuracy in percent.
    pub accuracy: f64,
    pub correct: usize,
    pub total: usize,
}

/// Runs `model` once over `dataset` in order. Pass an inference-mode model
/// (`AutodiffModule::valid`) so dropout and batch norm use their eval paths.
pub fn evaluate<B: Backend>(
    model: &AudioCnn<B>,
    dataset: &Esc50Dataset,
    batcher: &SpectrogramBatcher<B>,
    criterion: &CrossEntropyLoss<B>,
    batch_size: usize,
) -> Result<Evaluation> {
    if dataset.is_empty() {
        return Err(Error::EmptySplit(dataset.split().name()));
    }
    if batch_size == 0 {
        return Err(Error::Config("batch_size must be at least 1".into()));
    }

    // only consumed by augmenting transforms
    let mut rng = StdRng::seed_from_u64(0);

    let indices = (0..dataset.len()).collect_vec();
    let mut loss_sum = 0.0;
    let mut num_batches = 0;
    let mut correct = 0;

    for chunk in indices.chunks(batch_size) {
        let batch = batcher.load(dataset, chunk, &mut rng)?;
        let logits = model.forward(batch.features);

        let loss = criterion.forward(logits.clone(), batch.targets.clone());
        loss_sum += loss.into_scalar().elem::<f64>();
        num_batches += 1;

        let predicted = logits.argmax(1).squeeze::<1>(1);
        let hits = predicted.equal(batch.targets).int().sum().into_scalar().elem::<i64>();
        correct += hits as usize;
    }

    let total = dataset.len();
    let evaluation = Evaluation {
        loss: loss_sum / num_batches as f64,
        accuracy: 100.0 * correct as f64 / total as f64,
        correct,
        total,
    };
    tracing::debug!(?evaluation, "validation pass");

    Ok(evaluation)
}

#[test]
fn test_evaluate_counts_every_clip() {
    use burn::backend::NdArray;

    use crate::data::{read_metadata, ClassVocabulary, Split};
    use crate::feature::{FeatureTransform, MelSpectrogramConfig};
    use crate::model::AudioCnnConfig;
    use crate::train::TrainingConfig;

    let dir = tempfile::tempdir().unwrap();
    crate::util::synthetic_esc50(dir.path(), 11_025);
    let records = read_metadata(&dir.path().join("meta").join("esc50.csv")).unwrap();
    let vocabulary = ClassVocabulary::from_records(&records);
    let transform = FeatureTransform::validation(&MelSpectrogramConfig::new());
    let valid = Esc50Dataset::new(dir.path(), &records, Split::Validation, &vocabulary, Some(transform)).unwrap();

    let device = Default::default();
    let config = TrainingConfig::new(AudioCnnConfig::tiny(vocabulary.len()));
    let model = config.model.init::<NdArray>(&device);
    let criterion = config.criterion::<NdArray>(&device);
    let batcher = SpectrogramBatcher::<NdArray>::new(device);

    let first = evaluate(&model, &valid, &batcher, &criterion, 1).unwrap();
    let second = evaluate(&model, &valid, &batcher, &criterion, 32).unwrap();

    assert_eq!(first.total, 2);
    assert!(first.loss.is_finite());
    assert!((0.0..=100.0).contains(&first.accuracy));
    assert_eq!(first.correct, second.correct);
    assert!(matches!(evaluate(&model, &valid, &batcher, &criterion, 0), Err(Error::Config(_))));
}
