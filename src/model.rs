use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::relu;

use crate::model::residual::{ResidualBlock, ResidualBlockConfig};

pub mod residual;

/// Residual CNN over `[batch, 1, n_mels, frames]` spectrograms. The default
/// stage layout is the 34-layer ResNet one.
#[derive(Config, Debug)]
pub struct AudioCnnConfig {
    pub num_classes: usize,
    #[config(default = 64)]
    pub stem_channels: usize,
    #[config(default = "vec![64, 128, 256, 512]")]
    pub stage_channels: Vec<usize>,
    #[config(default = "vec![3, 4, 6, 3]")]
    pub stage_blocks: Vec<usize>,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl AudioCnnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AudioCnn<B> {
        // first stage keeps resolution, every later one halves it
        let mut channels_in = self.stem_channels;
        let mut blocks = vec![];
        for (stage, (&channels_out, &num_blocks)) in self.stage_channels.iter().zip(&self.stage_blocks).enumerate() {
            let stride = if stage == 0 { 1 } else { 2 };
            for block in 0..num_blocks {
                let block_stride = if block == 0 { stride } else { 1 };
                blocks.push(
                    ResidualBlockConfig::new(channels_in, channels_out)
                        .with_stride(block_stride)
                        .init(device),
                );
                channels_in = channels_out;
            }
        }

        AudioCnn {
            stem_conv: Conv2dConfig::new([1, self.stem_channels], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_bias(false)
                .init(device),
            stem_norm: BatchNormConfig::new(self.stem_channels).init(device),
            stem_down: Conv2dConfig::new([self.stem_channels, self.stem_channels], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            stem_down_norm: BatchNormConfig::new(self.stem_channels).init(device),
            blocks,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            head: LinearConfig::new(channels_in, self.num_classes).init(device),
        }
    }

    #[cfg(test)]
    pub(crate) fn tiny(num_classes: usize) -> Self {
        Self::new(num_classes)
            .with_stem_channels(4)
            .with_stage_channels(vec![4, 8])
            .with_stage_blocks(vec![1, 1])
    }
}

#[derive(Module, Debug)]
pub struct AudioCnn<B: Backend> {
    stem_conv: Conv2d<B>,
    stem_norm: BatchNorm<B, 2>,
    // strided conv in place of the usual 3x3 max-pool
    stem_down: Conv2d<B>,
    stem_down_norm: BatchNorm<B, 2>,
    blocks: Vec<ResidualBlock<B>>,
    pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    head: Linear<B>,
}

impl<B: Backend> AudioCnn<B> {
    /// Returns unnormalized class logits, `[batch, num_classes]`.
    pub fn forward(&self, spectrograms: Tensor<B, 4>) -> Tensor<B, 2> {
        let hidden = self.stem_conv.forward(spectrograms);
        let hidden = relu(self.stem_norm.forward(hidden));
        let hidden = self.stem_down.forward(hidden);
        let mut hidden = relu(self.stem_down_norm.forward(hidden));

        for block in &self.blocks {
            hidden = block.forward(hidden);
        }

        let pooled = self.pool.forward(hidden);
        let [batch, channels, _, _] = pooled.dims();
        let pooled = pooled.reshape([batch, channels]);
        let pooled = self.dropout.forward(pooled);

        self.head.forward(pooled)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

#[test]
fn test_default_layout_has_sixteen_blocks() {
    let config = AudioCnnConfig::new(50);

    assert_eq!(config.stage_blocks.iter().sum::<usize>(), 16);
    assert_eq!(config.stage_channels, vec![64, 128, 256, 512]);
}

#[test]
fn test_logits_shape() {
    use burn::backend::NdArray;

    let device = Default::default();
    let model = AudioCnnConfig::tiny(3).init::<NdArray>(&device);

    let x = Tensor::<NdArray, 4>::random([2, 1, 128, 22], burn::tensor::Distribution::Default, &device);
    let logits = model.forward(x);

    assert_eq!(logits.dims(), [2, 3]);
    assert_eq!(model.num_blocks(), 2);
}

#[test]
fn test_backward_on_non_square_input() {
    use burn::backend::{Autodiff, NdArray};

    type B = Autodiff<NdArray>;

    let device = Default::default();
    let model = AudioCnnConfig::tiny(3).init::<B>(&device);

    let x = Tensor::<B, 4>::random([2, 1, 128, 22], burn::tensor::Distribution::Default, &device);
    let loss = model.forward(x).sum();
    let grads = loss.backward();

    let stem = model.stem_conv.weight.val().grad(&grads).unwrap();
    assert_eq!(stem.dims(), [4, 1, 7, 7]);
    let down = model.stem_down.weight.val().grad(&grads).unwrap();
    assert_eq!(down.dims(), [4, 4, 3, 3]);
}
