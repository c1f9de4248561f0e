use std::fs;

use burn::config::Config;
use burn::data::dataset::Dataset;
use burn::tensor::backend::AutodiffBackend;

use crate::checkpoint::CheckpointManager;
use crate::config::RunPaths;
use crate::data::batcher::SpectrogramBatcher;
use crate::data::esc50::Esc50Dataset;
use crate::data::{read_metadata, ClassVocabulary, Split};
use crate::error::Result;
use crate::feature::FeatureTransform;
use crate::metric::{EpochMetrics, MetricsLogger};
use crate::model::AudioCnn;
use crate::train::{TrainSession, TrainingConfig};
use crate::valid::evaluate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub best_accuracy: f64,
    pub epochs: usize,
    pub steps: usize,
}

/// Trains on folds 1-4, validates on fold 5 after every epoch and keeps the
/// best model. `configure` receives the number of classes in the metadata.
pub fn run<B: AutodiffBackend>(
    device: B::Device,
    paths: &RunPaths,
    configure: impl FnOnce(usize) -> TrainingConfig,
) -> Result<RunSummary> {
    let records = read_metadata(&paths.metadata())?;
    let vocabulary = ClassVocabulary::from_records(&records);
    let config = configure(vocabulary.len());

    let train = Esc50Dataset::new(
        &paths.dataset_root,
        &records,
        Split::Train,
        &vocabulary,
        Some(FeatureTransform::training(&config.mel, config.augment.clone())),
    )?;
    let valid = Esc50Dataset::new(
        &paths.dataset_root,
        &records,
        Split::Validation,
        &vocabulary,
        Some(FeatureTransform::validation(&config.mel)),
    )?;
    tracing::info!(
        train = train.len(),
        validation = valid.len(),
        classes = vocabulary.len(),
        "loaded ESC-50"
    );

    fs::create_dir_all(&paths.artifact_dir)?;
    let mut metrics = MetricsLogger::open(&paths.metrics_root())?;
    config.save(metrics.run_dir().join("config.json"))?;
    let mut checkpoints = CheckpointManager::new(paths.checkpoint());

    let model = config.model.init::<B>(&device);
    let optim = config.optimizer().init::<B, AudioCnn<B>>();
    let batches_per_epoch = config.batches_per_epoch(train.len())?;
    let mut session = TrainSession::new(model, optim, &config, batches_per_epoch, &device)?;

    let valid_batcher = SpectrogramBatcher::<B::InnerBackend>::new(device.clone());
    let valid_criterion = config.criterion::<B::InnerBackend>(&device);

    tracing::info!(epochs = config.num_epochs, batches_per_epoch, "starting training");

    for epoch in 0..config.num_epochs {
        let (next, summary) = session.train_epoch(&train)?;
        session = next;

        let model = session.valid_model();
        let evaluation = evaluate(&model, &valid, &valid_batcher, &valid_criterion, config.batch_size)?;
        let improved = checkpoints.observe(&model, epoch, evaluation.accuracy, vocabulary.classes())?;

        metrics.record_epoch(
            epoch + 1,
            &EpochMetrics {
                train_loss: summary.loss,
                learning_rate: summary.learning_rate,
                valid_loss: evaluation.loss,
                valid_accuracy: evaluation.accuracy,
            },
        );

        tracing::info!(
            "Epoch {}/{} loss: {:.4}, val loss: {:.4}, accuracy: {:.2}%",
            epoch + 1,
            config.num_epochs,
            summary.loss,
            evaluation.loss,
            evaluation.accuracy,
        );
        if improved {
            tracing::info!("New best model saved: {:.2}%", evaluation.accuracy);
        }
    }

    metrics.close();

    let summary = RunSummary {
        best_accuracy: checkpoints.best_accuracy(),
        epochs: session.epoch(),
        steps: session.steps(),
    };
    tracing::info!("Training completed! Best accuracy: {:.2}%", summary.best_accuracy);

    Ok(summary)
}

#[test]
fn test_synthetic_run() {
    use burn::backend::{Autodiff, NdArray};

    use crate::metric::{TRAIN_LOSS, VALID_ACCURACY};
    use crate::model::AudioCnnConfig;

    let dir = tempfile::tempdir().unwrap();
    let dataset_root = dir.path().join("esc50");
    crate::util::synthetic_esc50(&dataset_root, 11_025);
    let paths = RunPaths::new(&dataset_root, dir.path().join("models"));

    let summary = run::<Autodiff<NdArray>>(Default::default(), &paths, |num_classes| {
        assert_eq!(num_classes, 2);
        TrainingConfig::new(AudioCnnConfig::tiny(num_classes))
            .with_num_epochs(1)
            .with_batch_size(4)
    })
    .unwrap();

    assert_eq!(summary.epochs, 1);
    assert_eq!(summary.steps, 2);
    assert!((0.0..=100.0).contains(&summary.best_accuracy));
    assert_eq!(paths.checkpoint().exists(), summary.best_accuracy > 0.0);

    let runs = fs::read_dir(paths.metrics_root()).unwrap().map(|e| e.unwrap().path()).collect::<Vec<_>>();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].join("config.json").is_file());
    assert!(runs[0].join("epoch-1").join(format!("{TRAIN_LOSS}.log")).is_file());
    assert!(runs[0].join("epoch-1").join(format!("{VALID_ACCURACY}.log")).is_file());
}
