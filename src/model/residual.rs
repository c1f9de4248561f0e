use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::relu;

/// 1x1 projection used when a block changes width or stride.
#[derive(Module, Debug)]
pub struct Shortcut<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
}

impl<B: Backend> Shortcut<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        self.norm.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    shortcut: Option<Shortcut<B>>,
}

#[derive(Config, Debug)]
pub struct ResidualBlockConfig {
    pub channels_in: usize,
    pub channels_out: usize,
    #[config(default = 1)]
    pub stride: usize,
}

impl ResidualBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResidualBlock<B> {
        let conv3x3 = |channels_in, stride| {
            Conv2dConfig::new([channels_in, self.channels_out], [3, 3])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device)
        };

        let shortcut = (self.stride != 1 || self.channels_in != self.channels_out).then(|| Shortcut {
            conv: Conv2dConfig::new([self.channels_in, self.channels_out], [1, 1])
                .with_stride([self.stride, self.stride])
                .with_bias(false)
                .init(device),
            norm: BatchNormConfig::new(self.channels_out).init(device),
        });

        ResidualBlock {
            conv1: conv3x3(self.channels_in, self.stride),
            norm1: BatchNormConfig::new(self.channels_out).init(device),
            conv2: conv3x3(self.channels_out, 1),
            norm2: BatchNormConfig::new(self.channels_out).init(device),
            shortcut,
        }
    }
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let residual = match &self.shortcut {
            Some(shortcut) => shortcut.forward(x.clone()),
            None => x.clone(),
        };

        let hidden = self.conv1.forward(x);
        let hidden = relu(self.norm1.forward(hidden));
        let hidden = self.conv2.forward(hidden);
        let hidden = self.norm2.forward(hidden);

        relu(hidden + residual)
    }
}

#[test]
fn test_strided_block_halves_resolution() {
    use burn::backend::NdArray;

    let device = Default::default();
    let block = ResidualBlockConfig::new(4, 8).with_stride(2).init::<NdArray>(&device);

    let x = Tensor::<NdArray, 4>::ones([2, 4, 16, 10], &device);
    let y = block.forward(x);

    assert_eq!(y.dims(), [2, 8, 8, 5]);
    assert!(block.shortcut.is_some());
}

#[test]
fn test_identity_block_keeps_shape() {
    use burn::backend::NdArray;

    let device = Default::default();
    let block = ResidualBlockConfig::new(8, 8).init::<NdArray>(&device);

    let x = Tensor::<NdArray, 4>::ones([1, 8, 5, 5], &device);

    assert_eq!(block.forward(x).dims(), [1, 8, 5, 5]);
    assert!(block.shortcut.is_none());
}
