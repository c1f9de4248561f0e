use std::path::{Path, PathBuf};

use itertools::Itertools;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod batcher;
pub mod esc50;

pub const VALIDATION_FOLD: u32 = 5;
pub const NUM_FOLDS: u32 = 5;

/// One row of `meta/esc50.csv`. Columns not named here are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub filename: String,
    pub fold: u32,
    pub category: String,
}

pub fn read_metadata(path: &Path) -> Result<Vec<MetadataRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader
        .deserialize::<MetadataRecord>()
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if let Some(bad) = records.iter().find(|r| !(1..=NUM_FOLDS).contains(&r.fold)) {
        return Err(Error::InvalidFold {
            filename: bad.filename.clone(),
            fold: bad.fold,
        });
    }

    tracing::debug!(rows = records.len(), path = %path.display(), "read metadata");

    Ok(records)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Validation,
}

impl Split {
    pub fn of_fold(fold: u32) -> Self {
        if fold == VALIDATION_FOLD {
            Split::Validation
        } else {
            Split::Train
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "validation",
        }
    }

    pub fn select<'a>(&self, records: &'a [MetadataRecord]) -> Vec<&'a MetadataRecord> {
        records
            .iter()
            .filter(|record| Split::of_fold(record.fold) == *self)
            .collect_vec()
    }
}

/// Sorted category names; a category's index is its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassVocabulary {
    classes: Vec<String>,
}

impl ClassVocabulary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a MetadataRecord>) -> Self {
        let classes = records
            .into_iter()
            .map(|record| record.category.clone())
            .sorted()
            .dedup()
            .collect_vec();

        Self { classes }
    }

    pub fn index_of(&self, category: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|class| class.as_str().cmp(category))
            .map_err(|_| Error::UnknownCategory(category.to_string()))
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// A clip resolved against the dataset root, before any audio is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipItem {
    pub path: PathBuf,
    pub category: String,
    pub label: usize,
}

/// Features are `[1, n_mels, frames]` after a feature transform, or the raw
/// `[1, samples]` waveform when the split has none.
#[derive(Debug, Clone)]
pub struct Sample {
    pub features: ArrayD<f32>,
    pub label: usize,
}

#[cfg(test)]
fn record(filename: &str, fold: u32, category: &str) -> MetadataRecord {
    MetadataRecord {
        filename: filename.to_string(),
        fold,
        category: category.to_string(),
    }
}

#[test]
fn test_split_is_a_function_of_fold() {
    let records = (1..=NUM_FOLDS)
        .flat_map(|fold| (0..3).map(move |i| record(&format!("{fold}-{i}.wav"), fold, "dog")))
        .collect_vec();

    let train = Split::Train.select(&records);
    let valid = Split::Validation.select(&records);

    assert_eq!(train.len() + valid.len(), records.len());
    assert!(train.iter().all(|r| r.fold != VALIDATION_FOLD));
    assert!(valid.iter().all(|r| r.fold == VALIDATION_FOLD));
    for r in &records {
        let in_train = train.contains(&r);
        let in_valid = valid.contains(&r);
        assert!(in_train ^ in_valid);
    }
}

#[test]
fn test_vocabulary_is_sorted_and_stable() {
    let records = vec![
        record("a.wav", 1, "rooster"),
        record("b.wav", 2, "dog"),
        record("c.wav", 3, "rain"),
        record("d.wav", 4, "dog"),
    ];

    let first = ClassVocabulary::from_records(&records);
    let second = ClassVocabulary::from_records(&records);

    assert_eq!(first.classes(), &["dog", "rain", "rooster"]);
    assert_eq!(first, second);
    assert_eq!(first.index_of("dog").unwrap(), 0);
    assert_eq!(first.index_of("rooster").unwrap(), 2);
    assert!(matches!(first.index_of("cat"), Err(Error::UnknownCategory(_))));
}

#[test]
fn test_read_metadata_ignores_extra_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("esc50.csv");
    std::fs::write(
        &path,
        "filename,fold,target,category,esc10,src_file,take\n1-100032-A-0.wav,1,0,dog,True,100032,A\n5-9032-A-0.wav,5,0,dog,True,9032,A\n",
    )
    .unwrap();

    let records = read_metadata(&path).unwrap();

    assert_eq!(records, vec![record("1-100032-A-0.wav", 1, "dog"), record("5-9032-A-0.wav", 5, "dog")]);
}

#[test]
fn test_read_metadata_rejects_out_of_range_fold() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("esc50.csv");
    std::fs::write(&path, "filename,fold,category\nx.wav,6,dog\n").unwrap();

    assert!(matches!(read_metadata(&path), Err(Error::InvalidFold { fold: 6, .. })));
}
