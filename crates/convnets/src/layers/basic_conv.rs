//! # `BasicConv2d` Module
//!
//! ``Conv2d(bias = false) -> BatchNorm(eps = 1e-3) -> ReLU``.
//!
//! Field names follow the ``conv`` / ``bn`` layout of the published
//! Inception checkpoints, and the activation is functional, so the
//! record holds only checkpoint tensors and loads without remapping.

use crate::layers::util::padded_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::relu;

/// [`BasicConv2d`] Meta.
pub trait BasicConv2dMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Kernel size.
    fn kernel_size(&self) -> [usize; 2];

    /// Stride.
    fn stride(&self) -> [usize; 2];

    /// Symmetric zero padding.
    fn padding(&self) -> [usize; 2];

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        padded_output_resolution(
            input_resolution,
            self.kernel_size(),
            self.stride(),
            self.padding(),
        )
    }
}

/// [`BasicConv2d`] Config.
#[derive(Config, Debug)]
pub struct BasicConv2dConfig {
    /// Number of input channels.
    pub in_channels: usize,

    /// Number of output channels.
    pub out_channels: usize,

    /// Kernel size.
    pub kernel_size: [usize; 2],

    /// Stride.
    #[config(default = "[1, 1]")]
    pub stride: [usize; 2],

    /// Symmetric zero padding.
    #[config(default = "[0, 0]")]
    pub padding: [usize; 2],
}

impl BasicConv2dMeta for BasicConv2dConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn kernel_size(&self) -> [usize; 2] {
        self.kernel_size
    }

    fn stride(&self) -> [usize; 2] {
        self.stride
    }

    fn padding(&self) -> [usize; 2] {
        self.padding
    }
}

impl BasicConv2dConfig {
    /// Square-kernel shorthand.
    pub fn square(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
    ) -> Self {
        Self::new(in_channels, out_channels, [kernel_size, kernel_size])
    }

    /// Initialize a [`BasicConv2d`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BasicConv2d<B> {
        BasicConv2d {
            conv: Conv2dConfig::new([self.in_channels, self.out_channels], self.kernel_size)
                .with_stride(self.stride)
                .with_padding(PaddingConfig2d::Explicit(self.padding[0], self.padding[1]))
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(self.out_channels)
                .with_epsilon(1e-3)
                .init(device),
        }
    }
}

/// Conv, norm, relu.
#[derive(Module, Debug)]
pub struct BasicConv2d<B: Backend> {
    /// Internal conv layer.
    pub conv: Conv2d<B>,

    /// Internal norm layer.
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> BasicConv2dMeta for BasicConv2d<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1]
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn kernel_size(&self) -> [usize; 2] {
        self.conv.kernel_size
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }

    fn padding(&self) -> [usize; 2] {
        match &self.conv.padding.0 {
            PaddingConfig2d::Explicit(h, w) => [*h, *w],
            _ => [0, 0],
        }
    }
}

impl<B: Backend> BasicConv2d<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_channels", self.in_channels())],
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let x = self.conv.forward(input);
        let x = self.bn.forward(x);
        let x = relu(x);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
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
    fn test_basic_conv_config() {
        let config = BasicConv2dConfig::square(3, 32, 3).with_stride([2, 2]);
        assert_eq!(config.kernel_size(), [3, 3]);
        assert_eq!(config.output_resolution([299, 299]), [149, 149]);

        let config = BasicConv2dConfig::new(128, 128, [1, 7]).with_padding([0, 3]);
        assert_eq!(config.output_resolution([17, 17]), [17, 17]);
    }

    #[test]
    fn test_basic_conv_meta_and_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let config = BasicConv2dConfig::new(4, 6, [7, 1]).with_padding([3, 0]);
        let layer: BasicConv2d<B> = config.init(&device);

        assert_eq!(layer.in_channels(), 4);
        assert_eq!(layer.out_channels(), 6);
        assert_eq!(layer.kernel_size(), [7, 1]);
        assert_eq!(layer.stride(), [1, 1]);
        assert_eq!(layer.padding(), [3, 0]);
        assert!(layer.conv.bias.is_none());

        let output = layer.forward(Tensor::ones([1, 4, 9, 9], &device));
        assert_eq!(output.dims(), [1, 6, 9, 9]);
    }
}
