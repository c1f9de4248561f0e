use std::path::PathBuf;

pub mod esc50;

pub const DATASET_ROOT: &str = "/opt/esc50-data";
pub const ARTIFACT_DIR: &str = "/models";

/// Where a run reads clips from and writes its outputs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub dataset_root: PathBuf,
    pub artifact_dir: PathBuf,
}

impl Default for RunPaths {
    fn default() -> Self {
        Self::new(DATASET_ROOT, ARTIFACT_DIR)
    }
}

impl RunPaths {
    pub fn new(dataset_root: impl Into<PathBuf>, artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            dataset_root: dataset_root.into(),
            artifact_dir: artifact_dir.into(),
        }
    }

    pub fn metadata(&self) -> PathBuf {
        self.dataset_root.join("meta").join("esc50.csv")
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.artifact_dir.join(crate::checkpoint::CHECKPOINT_FILE)
    }

    pub fn metrics_root(&self) -> PathBuf {
        self.artifact_dir.join("tensorboard-logs")
    }
}

#[test]
fn test_default_layout() {
    let paths = RunPaths::default();

    assert_eq!(paths.metadata(), PathBuf::from("/opt/esc50-data/meta/esc50.csv"));
    assert_eq!(paths.checkpoint(), PathBuf::from("/models/best_model.mpk"));
    assert_eq!(paths.metrics_root(), PathBuf::from("/models/tensorboard-logs"));
}
