use std::path::Path;

use burn::data::dataset::Dataset;
use ndarray::{Array1, Axis};
use rand::Rng;

use crate::data::{ClassVocabulary, ClipItem, MetadataRecord, Sample, Split};
use crate::error::{Error, Result};
use crate::feature::FeatureTransform;
use crate::io::read_wav;

/// One split of an ESC-50 tree: `<root>/audio/*.wav` described by
/// `<root>/meta/esc50.csv`.
pub struct Esc50Dataset {
    split: Split,
    items: Vec<ClipItem>,
    transform: Option<FeatureTransform>,
}

impl Esc50Dataset {
    pub fn new(
        root: &Path,
        records: &[MetadataRecord],
        split: Split,
        vocabulary: &ClassVocabulary,
        transform: Option<FeatureTransform>,
    ) -> Result<Self> {
        let audio_dir = root.join("audio");

        let items = split
            .select(records)
            .into_iter()
            .map(|record| {
                let path = audio_dir.join(&record.filename);
                if !path.is_file() {
                    return Err(Error::MissingAudio(path));
                }

                Ok(ClipItem {
                    path,
                    category: record.category.clone(),
                    label: vocabulary.index_of(&record.category)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if items.is_empty() {
            return Err(Error::EmptySplit(split.name()));
        }

        tracing::info!(split = split.name(), clips = items.len(), "dataset ready");

        Ok(Self {
            split,
            items,
            transform,
        })
    }

    pub fn split(&self) -> Split {
        self.split
    }

    /// Reads and transforms one clip. Masking draws come from `rng`.
    pub fn sample<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Sample> {
        let item = self.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.len(),
        })?;

        let waveform = read_wav(&item.path)?;

        let features = match &self.transform {
            Some(transform) => transform.apply(&waveform.samples, rng)?.into_dyn(),
            None => Array1::from(waveform.samples).insert_axis(Axis(0)).into_dyn(),
        };

        Ok(Sample {
            features,
            label: item.label,
        })
    }
}

impl Dataset<ClipItem> for Esc50Dataset {
    fn get(&self, index: usize) -> Option<ClipItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
fn fixture(clip_len: usize) -> (tempfile::TempDir, Vec<MetadataRecord>, ClassVocabulary) {
    let dir = tempfile::tempdir().unwrap();
    crate::util::synthetic_esc50(dir.path(), clip_len);
    let records = crate::data::read_metadata(&dir.path().join("meta").join("esc50.csv")).unwrap();
    let vocabulary = ClassVocabulary::from_records(&records);

    (dir, records, vocabulary)
}

#[test]
fn test_splits_partition_the_folds() {
    let (dir, records, vocabulary) = fixture(2_048);

    let train = Esc50Dataset::new(dir.path(), &records, Split::Train, &vocabulary, None).unwrap();
    let valid = Esc50Dataset::new(dir.path(), &records, Split::Validation, &vocabulary, None).unwrap();

    assert_eq!(train.len(), 8);
    assert_eq!(valid.len(), 2);
    assert!(valid.iter().all(|item| item.path.file_name().unwrap().to_str().unwrap().starts_with("5-")));
    assert_eq!(vocabulary.classes(), &["dog", "rain"]);
}

#[test]
fn test_sample_without_transform_is_raw_waveform() {
    use rand::SeedableRng;

    let (dir, records, vocabulary) = fixture(2_048);
    let valid = Esc50Dataset::new(dir.path(), &records, Split::Validation, &vocabulary, None).unwrap();

    let sample = valid.sample(1, &mut rand::rngs::StdRng::seed_from_u64(0)).unwrap();

    assert_eq!(sample.features.shape(), &[1, 2_048]);
    assert_eq!(sample.label, vocabulary.index_of("rain").unwrap());
}

#[test]
fn test_sample_with_transform_is_log_mel() {
    use rand::SeedableRng;

    use crate::feature::MelSpectrogramConfig;

    let (dir, records, vocabulary) = fixture(11_025);
    let transform = FeatureTransform::validation(&MelSpectrogramConfig::new());
    let valid = Esc50Dataset::new(dir.path(), &records, Split::Validation, &vocabulary, Some(transform)).unwrap();

    let sample = valid.sample(0, &mut rand::rngs::StdRng::seed_from_u64(0)).unwrap();

    assert_eq!(sample.features.shape(), &[1, 128, 22]);
}

#[test]
fn test_missing_audio_fails_construction() {
    let (dir, records, vocabulary) = fixture(2_048);
    std::fs::remove_file(dir.path().join("audio").join(&records[0].filename)).unwrap();

    let result = Esc50Dataset::new(dir.path(), &records, Split::Train, &vocabulary, None);

    assert!(matches!(result, Err(Error::MissingAudio(_))));
}

#[test]
fn test_corrupt_audio_fails_sample() {
    use rand::SeedableRng;

    let (dir, records, vocabulary) = fixture(2_048);
    let valid = Esc50Dataset::new(dir.path(), &records, Split::Validation, &vocabulary, None).unwrap();
    std::fs::write(valid.get(0).unwrap().path, b"garbage").unwrap();

    let result = valid.sample(0, &mut rand::rngs::StdRng::seed_from_u64(0));

    assert!(matches!(result, Err(Error::Wav { .. })));
}
