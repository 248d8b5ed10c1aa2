//! EfficientNet-B0 feature extractor.
//!
//! Stem convolution, seven stages of MBConv blocks (inverted bottleneck with
//! a depthwise convolution and squeeze-and-excitation), a 1x1 head
//! convolution and global average pooling. The classification layer of the
//! original network is not part of this module; see `classifier.rs`.
//!
//! Width and depth multipliers implement EfficientNet's compound scaling, so
//! the same code builds B0 (`1.0`, `1.0`) or smaller variants.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    tensor::{
        activation::{sigmoid, silu},
        backend::Backend,
        Tensor,
    },
};

/// One row of the B0 stage table
#[derive(Debug, Clone, Copy)]
struct StageSpec {
    expand_ratio: usize,
    kernel_size: usize,
    stride: usize,
    in_channels: usize,
    out_channels: usize,
    repeats: usize,
}

const fn stage(
    expand_ratio: usize,
    kernel_size: usize,
    stride: usize,
    in_channels: usize,
    out_channels: usize,
    repeats: usize,
) -> StageSpec {
    StageSpec {
        expand_ratio,
        kernel_size,
        stride,
        in_channels,
        out_channels,
        repeats,
    }
}

/// EfficientNet-B0 stages before scaling
const B0_STAGES: [StageSpec; 7] = [
    stage(1, 3, 1, 32, 16, 1),
    stage(6, 3, 2, 16, 24, 2),
    stage(6, 5, 2, 24, 40, 2),
    stage(6, 3, 2, 40, 80, 3),
    stage(6, 5, 1, 80, 112, 3),
    stage(6, 5, 2, 112, 192, 4),
    stage(6, 3, 1, 192, 320, 1),
];

const STEM_CHANNELS: usize = 32;
const HEAD_CHANNELS: usize = 1280;
const BN_EPSILON: f64 = 1e-3;

/// Configuration for the EfficientNet backbone
#[derive(Config, Debug)]
pub struct EfficientNetConfig {
    /// Channel multiplier (1.0 for B0)
    #[config(default = "1.0")]
    pub width_multiplier: f64,

    /// Block-repeat multiplier (1.0 for B0)
    #[config(default = "1.0")]
    pub depth_multiplier: f64,

    /// Squeeze-and-excitation bottleneck, relative to the block input
    #[config(default = "0.25")]
    pub se_ratio: f64,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,
}

/// Scale a channel count and round it to a multiple of 8
pub fn round_filters(channels: usize, width_multiplier: f64) -> usize {
    make_divisible(channels as f64 * width_multiplier, 8)
}

/// Scale a repeat count, never below one
pub fn round_repeats(repeats: usize, depth_multiplier: f64) -> usize {
    ((repeats as f64 * depth_multiplier).ceil() as usize).max(1)
}

fn make_divisible(value: f64, divisor: usize) -> usize {
    let d = divisor as f64;
    let mut rounded = (((value + d / 2.0) / d).floor() * d).max(d);
    // Never round down by more than 10%
    if rounded < 0.9 * value {
        rounded += d;
    }
    rounded as usize
}

/// Convolution followed by batch norm, activation left to the caller
#[derive(Module, Debug)]
pub struct ConvNorm<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> ConvNorm<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
        device: &B::Device,
    ) -> Self {
        let padding = kernel_size / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(out_channels)
            .with_epsilon(BN_EPSILON)
            .init(device);

        Self { conv, bn }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Channel attention: pool, bottleneck, sigmoid gate
#[derive(Module, Debug)]
pub struct SqueezeExcite<B: Backend> {
    pub pool: AdaptiveAvgPool2d,
    pub reduce: Conv2d<B>,
    pub expand: Conv2d<B>,
}

impl<B: Backend> SqueezeExcite<B> {
    fn new(channels: usize, squeezed: usize, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: Conv2dConfig::new([channels, squeezed], [1, 1]).init(device),
            expand: Conv2dConfig::new([squeezed, channels], [1, 1]).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let scale = self.pool.forward(x.clone());
        let scale = silu(self.reduce.forward(scale));
        let scale = sigmoid(self.expand.forward(scale));
        x * scale
    }
}

/// Mobile inverted bottleneck block
#[derive(Module, Debug)]
pub struct MbConvBlock<B: Backend> {
    /// 1x1 expansion, absent when the expansion ratio is 1
    pub expand: Option<ConvNorm<B>>,
    pub depthwise: ConvNorm<B>,
    pub se: SqueezeExcite<B>,
    pub project: ConvNorm<B>,
}

impl<B: Backend> MbConvBlock<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        expand_ratio: usize,
        kernel_size: usize,
        stride: usize,
        se_ratio: f64,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expand_ratio;
        let expand = (expand_ratio != 1)
            .then(|| ConvNorm::new(in_channels, hidden, 1, 1, 1, device));
        let depthwise = ConvNorm::new(hidden, hidden, kernel_size, stride, hidden, device);
        let squeezed = ((in_channels as f64 * se_ratio) as usize).max(1);
        let se = SqueezeExcite::new(hidden, squeezed, device);
        let project = ConvNorm::new(hidden, out_channels, 1, 1, 1, device);

        Self {
            expand,
            depthwise,
            se,
            project,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => silu(expand.forward(input.clone())),
            None => input.clone(),
        };
        let x = silu(self.depthwise.forward(x));
        let x = self.se.forward(x);
        let x = self.project.forward(x);

        // Identity skip when stride is 1 and channels are unchanged
        if x.dims() == input.dims() {
            x + input
        } else {
            x
        }
    }
}

/// EfficientNet feature extractor producing `[batch, feature_dim]`
#[derive(Module, Debug)]
pub struct EfficientNet<B: Backend> {
    pub stem: ConvNorm<B>,
    pub blocks: Vec<MbConvBlock<B>>,
    pub head: ConvNorm<B>,
    pub pool: AdaptiveAvgPool2d,
    feature_dim: usize,
}

impl EfficientNetConfig {
    /// Number of features the backbone emits per image
    pub fn feature_dim(&self) -> usize {
        round_filters(HEAD_CHANNELS, self.width_multiplier)
    }

    /// Total number of MBConv blocks after depth scaling
    pub fn block_count(&self) -> usize {
        B0_STAGES
            .iter()
            .map(|s| round_repeats(s.repeats, self.depth_multiplier))
            .sum()
    }

    /// Initialize a backbone with freshly initialized weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> EfficientNet<B> {
        let width = self.width_multiplier;
        let stem_channels = round_filters(STEM_CHANNELS, width);
        let stem = ConvNorm::new(self.in_channels, stem_channels, 3, 2, 1, device);

        let mut blocks = Vec::with_capacity(self.block_count());
        for spec in B0_STAGES.iter() {
            let in_channels = round_filters(spec.in_channels, width);
            let out_channels = round_filters(spec.out_channels, width);
            let repeats = round_repeats(spec.repeats, self.depth_multiplier);

            for i in 0..repeats {
                // Only the first block of a stage changes resolution and width
                let (block_in, stride) = if i == 0 {
                    (in_channels, spec.stride)
                } else {
                    (out_channels, 1)
                };
                blocks.push(MbConvBlock::new(
                    block_in,
                    out_channels,
                    spec.expand_ratio,
                    spec.kernel_size,
                    stride,
                    self.se_ratio,
                    device,
                ));
            }
        }

        let last_channels = round_filters(B0_STAGES[B0_STAGES.len() - 1].out_channels, width);
        let feature_dim = self.feature_dim();
        let head = ConvNorm::new(last_channels, feature_dim, 1, 1, 1, device);

        EfficientNet {
            stem,
            blocks,
            head,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            feature_dim,
        }
    }
}

impl<B: Backend> EfficientNet<B> {
    /// `[batch, 3, H, W]` -> `[batch, feature_dim]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = silu(self.stem.forward(x));
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = silu(self.head.forward(x));
        let x = self.pool.forward(x);

        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_round_filters_b0_is_identity() {
        for c in [16, 24, 32, 40, 80, 112, 192, 320, 1280] {
            assert_eq!(round_filters(c, 1.0), c);
        }
    }

    #[test]
    fn test_round_filters_scaled() {
        assert_eq!(round_filters(32, 0.25), 8);
        assert_eq!(round_filters(1280, 0.25), 320);
        assert_eq!(round_filters(40, 1.1), 48);
        assert_eq!(round_filters(16, 0.1), 8);
    }

    #[test]
    fn test_round_repeats() {
        assert_eq!(round_repeats(4, 1.0), 4);
        assert_eq!(round_repeats(4, 0.25), 1);
        assert_eq!(round_repeats(3, 1.2), 4);
        assert_eq!(round_repeats(1, 0.1), 1);
    }

    #[test]
    fn test_b0_block_count() {
        assert_eq!(EfficientNetConfig::new().block_count(), 16);
        assert_eq!(EfficientNetConfig::new().feature_dim(), 1280);
    }

    #[test]
    fn test_scaled_backbone_output_shape() {
        let device = Default::default();
        let config = EfficientNetConfig::new()
            .with_width_multiplier(0.25)
            .with_depth_multiplier(0.25);
        let backbone = config.init::<TestBackend>(&device);
        assert_eq!(backbone.blocks.len(), 7);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        let output = backbone.forward(input);
        assert_eq!(output.dims(), [2, config.feature_dim()]);
    }
}
