use burn::config::Config;
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::{Backend, ElementConversion};
use burn::tensor::backend::AutodiffBackend;
use burn::LearningRate;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::batcher::{SpectrogramBatch, SpectrogramBatcher};
use crate::data::esc50::Esc50Dataset;
use crate::error::Error;
use crate::feature::MelSpectrogramConfig;
use crate::lr::{OneCycleConfig, OneCycleLr};
use crate::mask::SpecAugmentConfig;
use crate::mixup::{Mixup, MixupConfig};
use crate::model::{AudioCnn, AudioCnnConfig};

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub model: AudioCnnConfig,
    #[config(default = "MelSpectrogramConfig::new()")]
    pub mel: MelSpectrogramConfig,
    #[config(default = "SpecAugmentConfig::new()")]
    pub augment: SpecAugmentConfig,
    #[config(default = "MixupConfig::new()")]
    pub mixup: MixupConfig,
    #[config(default = "OneCycleConfig::new()")]
    pub schedule: OneCycleConfig,
    #[config(default = 100)]
    pub num_epochs: usize,
    #[config(default = 32)]
    pub batch_size: usize,
    /// Nominal optimizer rate; every step runs at the one-cycle rate instead.
    #[config(default = 0.005)]
    pub learning_rate: f64,
    #[config(default = 0.01)]
    pub weight_decay: f64,
    #[config(default = 0.1)]
    pub label_smoothing: f32,
    #[config(default = 42)]
    pub seed: u64,
}

impl TrainingConfig {
    /// Adam with torch's epsilon; burn defaults to 1e-5. Beta 1 stays fixed
    /// at 0.9 while the rate cycles.
    pub fn optimizer(&self) -> AdamConfig {
        AdamConfig::new()
            .with_epsilon(1e-8)
            .with_weight_decay(Some(WeightDecayConfig::new(self.weight_decay)))
    }

    pub fn criterion<B: Backend>(&self, device: &B::Device) -> CrossEntropyLoss<B> {
        CrossEntropyLossConfig::new()
            .with_smoothing(Some(self.label_smoothing))
            .init(device)
    }

    pub fn batches_per_epoch(&self, num_clips: usize) -> crate::error::Result<usize> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }

        Ok(num_clips.div_ceil(self.batch_size))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub loss: f64,
    pub learning_rate: LearningRate,
    pub batches: usize,
}

/// Everything a training run mutates. Steps take the session by value and
/// hand it back, the way burn optimizers take and return the model.
pub struct TrainSession<B: AutodiffBackend, O> {
    model: AudioCnn<B>,
    optim: O,
    scheduler: OneCycleLr,
    mixup: Mixup,
    criterion: CrossEntropyLoss<B>,
    batcher: SpectrogramBatcher<B>,
    rng: StdRng,
    batch_size: usize,
    epoch: usize,
}

impl<B, O> TrainSession<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<AudioCnn<B>, B>,
{
    pub fn new(
        model: AudioCnn<B>,
        optim: O,
        config: &TrainingConfig,
        batches_per_epoch: usize,
        device: &B::Device,
    ) -> crate::error::Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        let scheduler = config.schedule.init(config.num_epochs * batches_per_epoch)?;

        Ok(Self {
            model,
            optim,
            scheduler,
            mixup: config.mixup.init()?,
            criterion: config.criterion(device),
            batcher: SpectrogramBatcher::new(device.clone()),
            rng: StdRng::seed_from_u64(config.seed),
            batch_size: config.batch_size,
            epoch: 0,
        })
    }

    pub fn train_batch(mut self, batch: SpectrogramBatch<B>) -> crate::error::Result<(Self, f64)> {
        let lr = self.scheduler.checked_step()?;

        let loss = if self.mixup.activate(&mut self.rng) {
            let draw = self.mixup.draw(batch.len(), &mut self.rng);
            let logits = self.model.forward(draw.mix_inputs(batch.features));
            draw.loss(&self.criterion, logits, batch.targets)
        } else {
            let logits = self.model.forward(batch.features);
            self.criterion.forward(logits, batch.targets)
        };
        let value = loss.clone().into_scalar().elem::<f64>();

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optim.step(lr, self.model, grads);

        Ok((self, value))
    }

    /// One shuffled pass over `dataset`. The reported loss is the mean of
    /// the per-batch losses.
    pub fn train_epoch(mut self, dataset: &Esc50Dataset) -> crate::error::Result<(Self, EpochSummary)> {
        let mut indices = (0..dataset.len()).collect_vec();
        indices.shuffle(&mut self.rng);
        let chunks = indices.chunks(self.batch_size).collect_vec();

        let bar = ProgressBar::new(chunks.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("  epoch {prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        bar.set_prefix(format!("{}", self.epoch + 1));

        let mut total = 0.0;
        for chunk in &chunks {
            let batch = self.batcher.load(dataset, chunk, &mut self.rng)?;
            let (session, loss) = self.train_batch(batch)?;
            self = session;

            total += loss;
            bar.set_message(format!("loss {loss:.4}"));
            bar.inc(1);
        }
        bar.finish_and_clear();

        let summary = EpochSummary {
            epoch: self.epoch,
            loss: total / chunks.len() as f64,
            learning_rate: self.scheduler.current_lr(),
            batches: chunks.len(),
        };
        tracing::debug!(?summary, "finished training epoch");
        self.epoch += 1;

        Ok((self, summary))
    }

    pub fn model(&self) -> &AudioCnn<B> {
        &self.model
    }

    /// Inference copy of the current weights.
    pub fn valid_model(&self) -> AudioCnn<B::InnerBackend> {
        self.model.valid()
    }

    pub fn steps(&self) -> usize {
        self.scheduler.steps_taken()
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn into_model(self) -> AudioCnn<B> {
        self.model
    }
}

#[test]
fn test_scheduler_steps_once_per_batch() {
    use burn::backend::{Autodiff, NdArray};

    use crate::data::{read_metadata, ClassVocabulary, Split};
    use crate::feature::FeatureTransform;

    type B = Autodiff<NdArray>;

    let dir = tempfile::tempdir().unwrap();
    crate::util::synthetic_esc50(dir.path(), 11_025);
    let records = read_metadata(&dir.path().join("meta").join("esc50.csv")).unwrap();
    let vocabulary = ClassVocabulary::from_records(&records);
    let config = TrainingConfig::new(AudioCnnConfig::tiny(vocabulary.len()))
        .with_num_epochs(3)
        .with_batch_size(2);
    let transform = FeatureTransform::training(&config.mel, config.augment.clone());
    let train = Esc50Dataset::new(dir.path(), &records, Split::Train, &vocabulary, Some(transform)).unwrap();

    let device = Default::default();
    let model = config.model.init::<B>(&device);
    let optim = config.optimizer().init::<B, AudioCnn<B>>();
    let batches = config.batches_per_epoch(train.len()).unwrap();
    let mut session = TrainSession::new(model, optim, &config, batches, &device).unwrap();

    let mut losses = vec![];
    for _ in 0..3 {
        let (next, summary) = session.train_epoch(&train).unwrap();
        session = next;
        losses.push(summary.loss);
        assert_eq!(summary.batches, 4);
    }

    assert_eq!(batches, 4);
    assert_eq!(session.steps(), 12);
    assert_eq!(session.epoch(), 3);
    assert!(losses.iter().all(|l| l.is_finite()));
    assert!(matches!(session.train_epoch(&train), Err(Error::Schedule(12))));
}

#[test]
fn test_zero_batch_size_is_rejected() {
    use burn::backend::{Autodiff, NdArray};

    type B = Autodiff<NdArray>;

    let config = TrainingConfig::new(AudioCnnConfig::tiny(2)).with_batch_size(0);
    assert!(matches!(config.batches_per_epoch(10), Err(Error::Config(_))));

    let device = Default::default();
    let model = config.model.init::<B>(&device);
    let optim = config.optimizer().init::<B, AudioCnn<B>>();
    assert!(matches!(TrainSession::new(model, optim, &config, 1, &device), Err(Error::Config(_))));
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let config = TrainingConfig::new(AudioCnnConfig::new(50))
        .with_weight_decay(0.05)
        .with_num_epochs(7);

    config.save(&path).unwrap();
    let loaded = TrainingConfig::load(&path).unwrap();

    assert_eq!(loaded.weight_decay, 0.05);
    assert_eq!(loaded.num_epochs, 7);
    assert_eq!(loaded.model.stage_blocks, vec![3, 4, 6, 3]);
    assert_eq!(loaded.schedule.max_lr, 0.002);
    assert_eq!(loaded.mixup.alpha, config.mixup.alpha);
}

#[test]
fn test_optimizer_uses_torch_epsilon() {
    let optimizer = TrainingConfig::new(AudioCnnConfig::new(50)).optimizer();
    let value = serde_json::to_value(&optimizer).unwrap();

    let epsilon = value["epsilon"].as_f64().unwrap();
    assert!((epsilon - 1e-8).abs() < 1e-12);
    assert_eq!(value["beta_1"].as_f64().unwrap() as f32, 0.9);
    let penalty = value["weight_decay"]["penalty"].as_f64().unwrap();
    assert!((penalty - 0.01).abs() < 1e-6);
}
