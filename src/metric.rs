use std::fs;
use std::path::{Path, PathBuf};

use burn::train::logger::{FileMetricLogger, MetricLogger};
use burn::train::metric::state::{FormatOptions, NumericMetricState};
use chrono::Local;

use crate::error::Result;

pub const TRAIN_LOSS: &str = "train_loss";
pub const LEARNING_RATE: &str = "learning_rate";
pub const VALID_LOSS: &str = "valid_loss";
pub const VALID_ACCURACY: &str = "valid_accuracy";

/// The four scalars written after every epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics {
    pub train_loss: f64,
    pub learning_rate: f64,
    pub valid_loss: f64,
    pub valid_accuracy: f64,
}

impl EpochMetrics {
    fn series(&self) -> [(&'static str, f64, usize); 4] {
        [
            (TRAIN_LOSS, self.train_loss, 4),
            (LEARNING_RATE, self.learning_rate, 8),
            (VALID_LOSS, self.valid_loss, 4),
            (VALID_ACCURACY, self.valid_accuracy, 2),
        ]
    }
}

/// Append-only per-epoch scalar log on top of a burn [`MetricLogger`].
pub struct MetricsLogger<L = FileMetricLogger> {
    logger: L,
    run_dir: PathBuf,
}

impl MetricsLogger<FileMetricLogger> {
    /// Starts a new run directory `root/run_<YYYYmmdd-HHMMSS>`.
    pub fn open(root: &Path) -> Result<Self> {
        let run_dir = root.join(format!("run_{}", Local::now().format("%Y%m%d-%H%M%S")));
        fs::create_dir_all(&run_dir)?;
        tracing::info!(dir = %run_dir.display(), "logging metrics");

        let logger = FileMetricLogger::new(&*run_dir.to_string_lossy());

        Ok(Self::with_logger(logger, run_dir))
    }
}

impl<L: MetricLogger> MetricsLogger<L> {
    pub fn with_logger(logger: L, run_dir: PathBuf) -> Self {
        Self { logger, run_dir }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// `epoch` is one-based, matching burn's `epoch-N` directories.
    pub fn record_epoch(&mut self, epoch: usize, metrics: &EpochMetrics) {
        for (name, value, precision) in metrics.series() {
            let mut state = NumericMetricState::default();
            let entry = state.update(value, 1, FormatOptions::new(name).precision(precision));
            self.logger.log(&entry);
        }

        self.logger.end_epoch(epoch);
    }

    /// Ends the run; file loggers flush when dropped.
    pub fn close(self) -> PathBuf {
        tracing::debug!(dir = %self.run_dir.display(), "closing metrics");

        self.run_dir
    }
}

#[cfg(test)]
#[derive(Default, Clone)]
struct RecordingLogger {
    entries: std::sync::Arc<std::sync::Mutex<Vec<(usize, String)>>>,
    epochs: std::sync::Arc<std::sync::Mutex<Vec<usize>>>,
}

#[cfg(test)]
impl MetricLogger for RecordingLogger {
    fn log(&mut self, item: &burn::train::metric::MetricEntry) {
        let epoch = self.epochs.lock().unwrap().len() + 1;
        self.entries.lock().unwrap().push((epoch, item.name.clone()));
    }

    fn end_epoch(&mut self, epoch: usize) {
        self.epochs.lock().unwrap().push(epoch);
    }

    fn read_numeric(&mut self, _name: &str, _epoch: usize) -> std::result::Result<Vec<burn::train::metric::NumericEntry>, String> {
        Ok(vec![])
    }
}

#[test]
fn test_each_series_once_per_epoch() {
    let recording = RecordingLogger::default();
    let mut metrics = MetricsLogger::with_logger(recording.clone(), PathBuf::from("unused"));
    let values = EpochMetrics {
        train_loss: 2.5,
        learning_rate: 8e-5,
        valid_loss: 2.1,
        valid_accuracy: 50.0,
    };

    metrics.record_epoch(1, &values);
    metrics.record_epoch(2, &values);
    metrics.close();

    let entries = recording.entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 8);
    for epoch in [1, 2] {
        let names = entries.iter().filter(|(e, _)| *e == epoch).map(|(_, n)| n.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec![TRAIN_LOSS, LEARNING_RATE, VALID_LOSS, VALID_ACCURACY]);
    }
    assert_eq!(*recording.epochs.lock().unwrap(), vec![1, 2]);
}

#[test]
fn test_file_logger_layout() {
    let dir = tempfile::tempdir().unwrap();

    let mut metrics = MetricsLogger::open(dir.path()).unwrap();
    let run_dir = metrics.run_dir().to_path_buf();
    metrics.record_epoch(
        1,
        &EpochMetrics {
            train_loss: 1.0,
            learning_rate: 0.002,
            valid_loss: 1.5,
            valid_accuracy: 25.0,
        },
    );
    metrics.close();

    assert!(run_dir.file_name().unwrap().to_string_lossy().starts_with("run_"));
    for name in [TRAIN_LOSS, LEARNING_RATE, VALID_LOSS, VALID_ACCURACY] {
        assert!(run_dir.join("epoch-1").join(format!("{name}.log")).is_file(), "{name}");
    }
}
