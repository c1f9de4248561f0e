use burn::config::Config;
use burn::nn::loss::CrossEntropyLoss;
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::TensorData;
use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Beta, Distribution};

use crate::error::Error;

// keeps lambda strictly inside (0, 1) when Beta(a, a) rounds to an endpoint
const LAMBDA_EPS: f64 = 1e-6;

#[derive(Config, Debug)]
pub struct MixupConfig {
    /// Chance that a training batch is mixed.
    #[config(default = 0.3)]
    pub prob: f64,
    /// Both shape parameters of the Beta distribution lambda is drawn from.
    #[config(default = 0.2)]
    pub alpha: f64,
}

impl MixupConfig {
    pub fn init(&self) -> crate::error::Result<Mixup> {
        if !(0.0..=1.0).contains(&self.prob) {
            return Err(Error::Config(format!("mixup probability {} is not in [0, 1]", self.prob)));
        }

        let beta = Beta::new(self.alpha, self.alpha)
            .map_err(|e| Error::Config(format!("mixup alpha {}: {e}", self.alpha)))?;

        Ok(Mixup { prob: self.prob, beta })
    }
}

#[derive(Debug, Clone)]
pub struct Mixup {
    prob: f64,
    beta: Beta<f64>,
}

impl Mixup {
    pub fn activate<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.gen_bool(self.prob)
    }

    pub fn draw<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> MixupDraw {
        let lambda = self.beta.sample(rng).clamp(LAMBDA_EPS, 1.0 - LAMBDA_EPS);

        let mut permutation = (0..batch_size).collect_vec();
        permutation.shuffle(rng);

        MixupDraw { lambda, permutation }
    }
}

/// A mixing coefficient and the partner of every batch row.
#[derive(Debug, Clone, PartialEq)]
pub struct MixupDraw {
    pub lambda: f64,
    pub permutation: Vec<usize>,
}

impl MixupDraw {
    fn index<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1, Int> {
        let index = self.permutation.iter().map(|&i| i as i64).collect_vec();

        Tensor::from_data(TensorData::new(index, [self.permutation.len()]), device)
    }

    /// `lambda * x + (1 - lambda) * x[permutation]` along the batch dim.
    pub fn mix_inputs<B: Backend, const D: usize>(&self, inputs: Tensor<B, D>) -> Tensor<B, D> {
        let index = self.index::<B>(&inputs.device());
        let partners = inputs.clone().select(0, index);

        inputs.mul_scalar(self.lambda) + partners.mul_scalar(1.0 - self.lambda)
    }

    pub fn permute_targets<B: Backend>(&self, targets: Tensor<B, 1, Int>) -> Tensor<B, 1, Int> {
        let index = self.index::<B>(&targets.device());

        targets.select(0, index)
    }

    /// Targets stay hard; the two losses are blended instead.
    pub fn loss<B: Backend>(
        &self,
        criterion: &CrossEntropyLoss<B>,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        let partner_targets = self.permute_targets(targets.clone());

        let own = criterion.forward(logits.clone(), targets);
        let partner = criterion.forward(logits, partner_targets);

        own.mul_scalar(self.lambda) + partner.mul_scalar(1.0 - self.lambda)
    }
}

#[test]
fn test_lambda_in_open_interval_and_permutation_valid() {
    use rand::SeedableRng;

    let mixup = MixupConfig::new().init().unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);

    for batch_size in [1, 2, 7, 32] {
        for _ in 0..2_000 {
            let draw = mixup.draw(batch_size, &mut rng);
            assert!(draw.lambda > 0.0 && draw.lambda < 1.0);
            assert_eq!(draw.permutation.iter().copied().sorted().collect_vec(), (0..batch_size).collect_vec());
        }
    }
}

#[test]
fn test_beta_mass_sits_near_the_ends() {
    use rand::SeedableRng;

    let mixup = MixupConfig::new().init().unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(1);

    let draws = (0..10_000).map(|_| mixup.draw(4, &mut rng).lambda).collect_vec();
    let extreme = draws.iter().filter(|l| **l < 0.1 || **l > 0.9).count();

    assert!(extreme > 5_000);
}

#[test]
fn test_activation_rate() {
    use rand::SeedableRng;

    let mixup = MixupConfig::new().init().unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(2);

    let active = (0..20_000).filter(|_| mixup.activate(&mut rng)).count();
    let rate = active as f64 / 20_000.0;

    assert!((rate - 0.3).abs() < 0.02, "rate {rate}");
}

#[test]
fn test_invalid_config_is_rejected() {
    assert!(MixupConfig::new().with_prob(1.5).init().is_err());
    assert!(MixupConfig::new().with_alpha(0.0).init().is_err());
}

#[test]
fn test_lambda_one_is_identity() {
    use burn::backend::NdArray;
    use burn::nn::loss::CrossEntropyLossConfig;

    let device = Default::default();
    let draw = MixupDraw {
        lambda: 1.0,
        permutation: vec![2, 0, 1],
    };
    let inputs = Tensor::<NdArray, 2>::from_floats([[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]], &device);
    let logits = Tensor::<NdArray, 2>::from_floats([[2.0, -1.0], [0.5, 0.5], [-3.0, 1.0]], &device);
    let targets = Tensor::<NdArray, 1, Int>::from_ints([0, 1, 1], &device);
    let criterion = CrossEntropyLossConfig::new().with_smoothing(Some(0.1)).init(&device);

    let mixed = draw.mix_inputs(inputs.clone());
    let mixed_loss = draw.loss(&criterion, logits.clone(), targets.clone());
    let plain_loss = criterion.forward(logits, targets);

    assert_eq!(
        mixed.into_data().to_vec::<f32>().unwrap(),
        inputs.into_data().to_vec::<f32>().unwrap()
    );
    let mixed_loss = mixed_loss.into_scalar();
    let plain_loss = plain_loss.into_scalar();
    assert!((mixed_loss - plain_loss).abs() < 1e-6);
}

#[test]
fn test_blend_with_partner() {
    use burn::backend::NdArray;

    let device = Default::default();
    let draw = MixupDraw {
        lambda: 0.25,
        permutation: vec![1, 0],
    };
    let inputs = Tensor::<NdArray, 2>::from_floats([[1.0], [3.0]], &device);

    let mixed = draw.mix_inputs(inputs).into_data().to_vec::<f32>().unwrap();

    assert!((mixed[0] - 2.5).abs() < 1e-6);
    assert!((mixed[1] - 1.5).abs() < 1e-6);
}

#[test]
fn test_blended_loss_is_convex_combination() {
    use burn::backend::NdArray;
    use burn::nn::loss::CrossEntropyLossConfig;

    let device = Default::default();
    let draw = MixupDraw {
        lambda: 0.7,
        permutation: vec![1, 0],
    };
    let logits = Tensor::<NdArray, 2>::from_floats([[2.0, -1.0], [0.5, 1.5]], &device);
    let targets = Tensor::<NdArray, 1, Int>::from_ints([0, 1], &device);
    let swapped = Tensor::<NdArray, 1, Int>::from_ints([1, 0], &device);
    let criterion = CrossEntropyLossConfig::new().with_smoothing(Some(0.1)).init(&device);

    let blended = draw.loss(&criterion, logits.clone(), targets.clone()).into_scalar();
    let own = criterion.forward(logits.clone(), targets).into_scalar();
    let partner = criterion.forward(logits, swapped).into_scalar();

    assert!((blended - (0.7 * own + 0.3 * partner)).abs() < 1e-5);
}
