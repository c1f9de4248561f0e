use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder};

use crate::error::{Error, Result};
use crate::model::{AudioCnn, AudioCnnRecord};

pub const CHECKPOINT_FILE: &str = "best_model.mpk";

#[derive(Record)]
pub struct CheckpointRecord<B: Backend> {
    pub model: AudioCnnRecord<B>,
    /// Zero-based epoch the weights come from.
    pub epoch: usize,
    pub accuracy: f64,
    /// Class names in label order.
    pub classes: Vec<String>,
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Keeps a single checkpoint file holding the most accurate model seen.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    path: PathBuf,
    best_accuracy: f64,
}

impl CheckpointManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            best_accuracy: 0.0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn best_accuracy(&self) -> f64 {
        self.best_accuracy
    }

    /// Writes the checkpoint if `accuracy` beats every earlier one. Ties
    /// keep the older file.
    pub fn observe<B: Backend>(
        &mut self,
        model: &AudioCnn<B>,
        epoch: usize,
        accuracy: f64,
        classes: &[String],
    ) -> Result<bool> {
        if accuracy <= self.best_accuracy {
            return Ok(false);
        }

        let record = CheckpointRecord::<B> {
            model: model.clone().into_record(),
            epoch,
            accuracy,
            classes: classes.to_vec(),
        };
        Recorder::<B>::record(&recorder(), record, self.path.clone()).map_err(Error::Checkpoint)?;

        tracing::info!(epoch, accuracy, path = %self.path.display(), "saved new best model");
        self.best_accuracy = accuracy;

        Ok(true)
    }
}

pub fn load_checkpoint<B: Backend>(path: &Path, device: &B::Device) -> Result<CheckpointRecord<B>> {
    let record = Recorder::<B>::load(&recorder(), path.to_path_buf(), device).map_err(Error::Checkpoint)?;

    Ok(record)
}

#[test]
fn test_only_strict_improvement_writes() {
    use burn::backend::NdArray;

    use crate::model::AudioCnnConfig;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CHECKPOINT_FILE);
    let device = Default::default();
    let model = AudioCnnConfig::tiny(2).init::<NdArray>(&device);
    let classes = vec!["dog".to_string(), "rain".to_string()];
    let mut manager = CheckpointManager::new(&path);

    assert!(!manager.observe(&model, 0, 0.0, &classes).unwrap());
    assert!(!path.exists());

    assert!(manager.observe(&model, 1, 50.0, &classes).unwrap());
    assert!(path.exists());
    let written = std::fs::metadata(&path).unwrap().modified().unwrap();

    assert!(!manager.observe(&model, 2, 50.0, &classes).unwrap());
    assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), written);
    assert_eq!(load_checkpoint::<NdArray>(&path, &device).unwrap().epoch, 1);

    assert!(manager.observe(&model, 3, 75.0, &classes).unwrap());
    let record = load_checkpoint::<NdArray>(&path, &device).unwrap();
    assert_eq!(record.epoch, 3);
    assert_eq!(record.accuracy, 75.0);
    assert_eq!(record.classes, classes);
    assert_eq!(manager.best_accuracy(), 75.0);
}

#[test]
fn test_restored_model_matches() {
    use burn::backend::NdArray;
    use burn::prelude::Tensor;

    use crate::model::AudioCnnConfig;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CHECKPOINT_FILE);
    let device = Default::default();
    let config = AudioCnnConfig::tiny(2);
    let model = config.init::<NdArray>(&device);
    let mut manager = CheckpointManager::new(&path);
    manager.observe(&model, 0, 10.0, &["a".to_string(), "b".to_string()]).unwrap();

    let record = load_checkpoint::<NdArray>(&path, &device).unwrap();
    let restored = config.init::<NdArray>(&device).load_record(record.model);

    let x = Tensor::<NdArray, 4>::ones([1, 1, 128, 22], &device);
    let expected = model.forward(x.clone()).into_data().to_vec::<f32>().unwrap();
    let actual = restored.forward(x).into_data().to_vec::<f32>().unwrap();
    assert!(expected.iter().zip(&actual).all(|(a, b)| (a - b).abs() < 1e-5));
}
