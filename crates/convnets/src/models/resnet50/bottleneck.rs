//! # ResNet-50 Bottleneck Block
//!
//! ```text
//! out = relu(bn3(conv3(relu(bn2(conv2(relu(bn1(conv1(x)))))))) + shortcut(x))
//! ```
//!
//! The stride sits on the 3x3 ``conv2`` (torchvision "v1.5").
//! Activations are functional, so [`BottleneckRecord`] matches the
//! torchvision checkpoint layout once ``downsample.{0,1}`` are remapped
//! to ``downsample.{conv,bn}``.

use crate::layers::util::same_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::relu;

/// Channel expansion of the last 1x1 conv.
pub const BOTTLENECK_EXPANSION: usize = 4;

/// He init over fan-out, as torchvision initializes its ResNets.
pub const BOTTLENECK_INITIALIZER: Initializer = Initializer::KaimingNormal {
    gain: std::f64::consts::SQRT_2,
    fan_out_only: true,
};

/// [`Bottleneck`] Meta trait.
pub trait BottleneckMeta {
    /// Number of input planes.
    fn in_planes(&self) -> usize;

    /// Width of the inner 1x1 / 3x3 convs.
    fn planes(&self) -> usize;

    /// Number of output planes.
    fn out_planes(&self) -> usize {
        self.planes() * BOTTLENECK_EXPANSION
    }

    /// Stride of the 3x3 conv and of the downsample.
    fn stride(&self) -> usize;

    /// Does the shortcut need a downsample projection?
    fn has_downsample(&self) -> bool {
        self.stride() != 1 || self.in_planes() != self.out_planes()
    }

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        same_output_resolution(input_resolution, self.stride())
    }
}

/// [`Bottleneck`] Config.
#[derive(Config, Debug)]
pub struct BottleneckConfig {
    /// Number of input planes.
    pub in_planes: usize,

    /// Width of the inner convs.
    pub planes: usize,

    /// Stride of the 3x3 conv.
    #[config(default = 1)]
    pub stride: usize,
}

impl BottleneckMeta for BottleneckConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn planes(&self) -> usize {
        self.planes
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

fn conv<B: Backend>(
    channels: [usize; 2],
    kernel_size: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    let pad = kernel_size / 2;
    Conv2dConfig::new(channels, [kernel_size, kernel_size])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(pad, pad))
        .with_bias(false)
        .with_initializer(BOTTLENECK_INITIALIZER)
        .init(device)
}

impl BottleneckConfig {
    /// Initialize a [`Bottleneck`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Bottleneck<B> {
        let out_planes = self.out_planes();

        let downsample = if self.has_downsample() {
            Some(Downsample {
                conv: conv([self.in_planes, out_planes], 1, self.stride, device),
                bn: BatchNormConfig::new(out_planes).init(device),
            })
        } else {
            None
        };

        Bottleneck {
            conv1: conv([self.in_planes, self.planes], 1, 1, device),
            bn1: BatchNormConfig::new(self.planes).init(device),
            conv2: conv([self.planes, self.planes], 3, self.stride, device),
            bn2: BatchNormConfig::new(self.planes).init(device),
            conv3: conv([self.planes, out_planes], 1, 1, device),
            bn3: BatchNormConfig::new(out_planes).init(device),
            downsample,
        }
    }
}

/// Projection shortcut.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    /// Strided 1x1 conv.
    pub conv: Conv2d<B>,

    /// Norm.
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    /// Forward pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(input))
    }
}

/// Bottleneck residual block.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    /// 1x1 reduce.
    pub conv1: Conv2d<B>,
    /// Norm for `conv1`.
    pub bn1: BatchNorm<B, 2>,
    /// Strided 3x3.
    pub conv2: Conv2d<B>,
    /// Norm for `conv2`.
    pub bn2: BatchNorm<B, 2>,
    /// 1x1 expand.
    pub conv3: Conv2d<B>,
    /// Norm for `conv3`.
    pub bn3: BatchNorm<B, 2>,
    /// Optional projection shortcut.
    pub downsample: Option<Downsample<B>>,
}

impl<B: Backend> BottleneckMeta for Bottleneck<B> {
    fn in_planes(&self) -> usize {
        self.conv1.weight.shape().dims[1]
    }

    fn planes(&self) -> usize {
        self.conv1.weight.shape().dims[0]
    }

    fn out_planes(&self) -> usize {
        self.conv3.weight.shape().dims[0]
    }

    fn stride(&self) -> usize {
        self.conv2.stride[0]
    }

    fn has_downsample(&self) -> bool {
        self.downsample.is_some()
    }
}

impl<B: Backend> Bottleneck<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, ceil(in_height / stride), ceil(in_width / stride)]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_planes", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_planes", self.in_planes())],
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let shortcut = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = relu(self.bn1.forward(self.conv1.forward(input)));
        let x = relu(self.bn2.forward(self.conv2.forward(x)));
        let x = self.bn3.forward(self.conv3.forward(x));
        let x = relu(x + shortcut);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_bottleneck_config() {
        let config = BottleneckConfig::new(64, 64);
        assert_eq!(config.out_planes(), 256);
        assert!(config.has_downsample());

        let config = BottleneckConfig::new(256, 64);
        assert!(!config.has_downsample());

        let config = BottleneckConfig::new(256, 128).with_stride(2);
        assert_eq!(config.out_planes(), 512);
        assert!(config.has_downsample());
        assert_eq!(config.output_resolution([56, 56]), [28, 28]);
        assert_eq!(config.output_resolution([7, 7]), [4, 4]);
    }

    #[test]
    fn test_bottleneck_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: Bottleneck<B> = BottleneckConfig::new(8, 4).with_stride(2).init(&device);
        assert_eq!(block.in_planes(), 8);
        assert_eq!(block.planes(), 4);
        assert_eq!(block.out_planes(), 16);
        assert_eq!(block.stride(), 2);
        assert!(block.has_downsample());

        let output = block.forward(Tensor::ones([2, 8, 9, 9], &device));
        assert_eq!(output.dims(), [2, 16, 5, 5]);

        // relu output.
        let min = output.min().into_scalar();
        assert!(min >= 0.0, "min: {min}");
    }

    #[test]
    fn test_bottleneck_identity_shortcut() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: Bottleneck<B> = BottleneckConfig::new(16, 4).init(&device);
        assert!(block.downsample.is_none());

        let output = block.forward(Tensor::ones([1, 16, 6, 6], &device));
        assert_eq!(output.dims(), [1, 16, 6, 6]);
    }
}
