use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::TensorData;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::data::esc50::Esc50Dataset;
use crate::data::Sample;
use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct SpectrogramBatch<B: Backend> {
    // B x 1 x n_mels x T
    pub features: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> SpectrogramBatch<B> {
    pub fn len(&self) -> usize {
        self.targets.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug)]
pub struct SpectrogramBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> SpectrogramBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn batch(&self, samples: Vec<Sample>) -> Result<SpectrogramBatch<B>> {
        let expected = samples.first().ok_or(Error::EmptyBatch)?.features.shape().to_vec();

        let [channels, n_mels, frames] = match expected.as_slice() {
            &[channels, n_mels, frames] => [channels, n_mels, frames],
            _ => return Err(Error::FeatureRank(expected.clone())),
        };

        if let Some(other) = samples.iter().find(|s| s.features.shape() != expected.as_slice()) {
            return Err(Error::ShapeMismatch {
                expected,
                found: other.features.shape().to_vec(),
            });
        }

        let batch_size = samples.len();
        let labels = samples.iter().map(|s| s.label as i64).collect_vec();
        let mut values = Vec::with_capacity(batch_size * channels * n_mels * frames);
        for sample in &samples {
            values.extend(sample.features.iter().copied());
        }

        let features = Tensor::<B, 4>::from_data(
            TensorData::new(values, [batch_size, channels, n_mels, frames]),
            &self.device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [batch_size]), &self.device);

        Ok(SpectrogramBatch { features, targets })
    }

    /// Reads the clips at `indices` in parallel. Each clip gets its own
    /// generator seeded from `rng`, so the batch only depends on `rng`.
    pub fn load<R: Rng + ?Sized>(
        &self,
        dataset: &Esc50Dataset,
        indices: &[usize],
        rng: &mut R,
    ) -> Result<SpectrogramBatch<B>> {
        let seeds = indices.iter().map(|_| rng.gen::<u64>()).collect_vec();

        let samples = indices
            .par_iter()
            .zip(seeds)
            .map(|(&index, seed)| dataset.sample(index, &mut StdRng::seed_from_u64(seed)))
            .collect::<Result<Vec<_>>>()?;

        self.batch(samples)
    }
}

#[cfg(test)]
fn spectrogram_sample(frames: usize, label: usize, fill: f32) -> Sample {
    Sample {
        features: ndarray::ArrayD::from_elem(vec![1, 4, frames], fill),
        label,
    }
}

#[test]
fn test_batch_stacks_samples() {
    use burn::backend::NdArray;

    let batcher = SpectrogramBatcher::<NdArray>::new(Default::default());

    let batch = batcher
        .batch(vec![spectrogram_sample(6, 0, 1.0), spectrogram_sample(6, 1, 2.0)])
        .unwrap();

    assert_eq!(batch.features.dims(), [2, 1, 4, 6]);
    assert_eq!(batch.targets.into_data().to_vec::<i64>().unwrap(), vec![0, 1]);
    let values = batch.features.into_data().to_vec::<f32>().unwrap();
    assert!(values[..24].iter().all(|v| *v == 1.0));
    assert!(values[24..].iter().all(|v| *v == 2.0));
}

#[test]
fn test_batch_rejects_ragged_frames() {
    use burn::backend::NdArray;

    let batcher = SpectrogramBatcher::<NdArray>::new(Default::default());

    let result = batcher.batch(vec![spectrogram_sample(6, 0, 1.0), spectrogram_sample(7, 1, 1.0)]);

    assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
}

#[test]
fn test_batch_rejects_raw_waveforms() {
    use burn::backend::NdArray;

    let batcher = SpectrogramBatcher::<NdArray>::new(Default::default());
    let raw = Sample {
        features: ndarray::ArrayD::zeros(vec![1, 100]),
        label: 0,
    };

    assert!(matches!(batcher.batch(vec![raw]), Err(Error::FeatureRank(_))));
}

#[test]
fn test_load_is_reproducible_for_a_seed() {
    use burn::backend::NdArray;

    use crate::data::{read_metadata, ClassVocabulary, Split};
    use crate::feature::{FeatureTransform, MelSpectrogramConfig};
    use crate::mask::SpecAugmentConfig;

    let dir = tempfile::tempdir().unwrap();
    crate::util::synthetic_esc50(dir.path(), 11_025);
    let records = read_metadata(&dir.path().join("meta").join("esc50.csv")).unwrap();
    let vocabulary = ClassVocabulary::from_records(&records);
    let transform = FeatureTransform::training(&MelSpectrogramConfig::new(), SpecAugmentConfig::new());
    let train = Esc50Dataset::new(dir.path(), &records, Split::Train, &vocabulary, Some(transform)).unwrap();
    let batcher = SpectrogramBatcher::<NdArray>::new(Default::default());

    let a = batcher.load(&train, &[0, 3, 5], &mut StdRng::seed_from_u64(21)).unwrap();
    let b = batcher.load(&train, &[0, 3, 5], &mut StdRng::seed_from_u64(21)).unwrap();

    assert_eq!(a.features.dims(), [3, 1, 128, 22]);
    assert_eq!(
        a.features.into_data().to_vec::<f32>().unwrap(),
        b.features.into_data().to_vec::<f32>().unwrap()
    );
}
