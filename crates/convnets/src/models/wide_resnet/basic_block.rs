//! # Pre-Activation Basic Block for `WideResNet`
//!
//! [`WideBasicBlock`] is the core convolution unit of the wide residual network:
//!
//! ```text
//! pre      = bnrelu(x)
//! residual = conv3x3(stride) -> bnrelu -> conv3x3(1)     (applied to pre)
//! shortcut = conv1x1(stride)(pre)   if the shape changes
//!          = x                      otherwise
//! out      = residual + shortcut
//! ```
//!
//! [`WideBasicBlockMeta`] defines a common meta API for [`WideBasicBlock`]
//! and [`WideBasicBlockConfig`].

use crate::layers::bn_relu::{BnRelu, BnReluConfig};
use crate::layers::util::{CONV_INTO_RELU_INITIALIZER, same_output_resolution};
use bimm_contracts::{
    assert_shape_contract_periodically, define_shape_contract, unpack_shape_contract,
};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Initializer, PaddingConfig2d};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`WideBasicBlock`] Meta trait.
pub trait WideBasicBlockMeta {
    /// The size of the in channels dimension.
    fn in_planes(&self) -> usize;

    /// The size of the out channels dimension.
    fn out_planes(&self) -> usize;

    /// The stride of the first conv, and of the projection shortcut.
    fn stride(&self) -> usize;

    /// Does the shortcut need a 1x1 projection?
    ///
    /// True when the block changes the channel count or the resolution.
    fn has_projection(&self) -> bool {
        self.in_planes() != self.out_planes() || self.stride() != 1
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Returns
    ///
    /// ``[ceil(height / stride), ceil(width / stride)]``
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        same_output_resolution(input_resolution, self.stride())
    }
}

/// [`WideBasicBlock`] Config.
#[derive(Config, Debug)]
pub struct WideBasicBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The size of the out channels dimension.
    pub out_planes: usize,

    /// The stride of the first conv.
    #[config(default = 1)]
    pub stride: usize,

    /// The [`Conv2d`] initializer.
    #[config(default = "CONV_INTO_RELU_INITIALIZER")]
    pub initializer: Initializer,
}

impl WideBasicBlockMeta for WideBasicBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn out_planes(&self) -> usize {
        self.out_planes
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl WideBasicBlockConfig {
    /// Initialize a [`WideBasicBlock`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> WideBasicBlock<B> {
        let stride = self.stride;

        let conv1 = Conv2dConfig::new([self.in_planes, self.out_planes], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(self.initializer.clone());

        let conv2 = Conv2dConfig::new([self.out_planes, self.out_planes], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(self.initializer.clone());

        let projection = if self.has_projection() {
            Conv2dConfig::new([self.in_planes, self.out_planes], [1, 1])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(0, 0))
                .with_bias(false)
                .with_initializer(self.initializer.clone())
                .into()
        } else {
            None
        };

        WideBasicBlock {
            pre_act: BnReluConfig::new(self.in_planes).init(device),
            conv1: conv1.init(device),
            mid_act: BnReluConfig::new(self.out_planes).init(device),
            conv2: conv2.init(device),
            projection: projection.map(|cfg: Conv2dConfig| cfg.init(device)),
        }
    }
}

/// Pre-activation basic block.
#[derive(Module, Debug)]
pub struct WideBasicBlock<B: Backend> {
    /// Pre-activation, shared by the residual and a projected shortcut.
    pub pre_act: BnRelu<B>,

    /// First 3x3 conv; carries the stride.
    pub conv1: Conv2d<B>,

    /// Inner activation.
    pub mid_act: BnRelu<B>,

    /// Second 3x3 conv.
    pub conv2: Conv2d<B>,

    /// Optional 1x1 projection for the shortcut.
    pub projection: Option<Conv2d<B>>,
}

impl<B: Backend> WideBasicBlockMeta for WideBasicBlock<B> {
    fn in_planes(&self) -> usize {
        self.conv1.weight.shape().dims[1]
    }

    fn out_planes(&self) -> usize {
        self.conv2.weight.shape().dims[0]
    }

    fn stride(&self) -> usize {
        self.conv1.stride[0]
    }

    fn has_projection(&self) -> bool {
        self.projection.is_some()
    }
}

impl<B: Backend> WideBasicBlock<B> {
    /// Forward Pass.
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

        define_shape_contract!(
            OUT_CONTRACT,
            ["batch", "out_planes", "out_height", "out_width"]
        );
        let bindings = [
            ("batch", batch),
            ("out_planes", self.out_planes()),
            ("out_height", out_height),
            ("out_width", out_width),
        ];

        let (pre, shortcut) = match &self.projection {
            Some(projection) => {
                let pre = self.pre_act.forward(input);
                let shortcut = projection.forward(pre.clone());
                (pre, shortcut)
            }
            None => (self.pre_act.forward(input.clone()), input),
        };
        assert_shape_contract_periodically!(OUT_CONTRACT, &shortcut, &bindings);

        let x = self.conv1.forward(pre);
        let x = self.mid_act.forward(x);
        let x = self.conv2.forward(x);

        let x = x + shortcut;

        assert_shape_contract_periodically!(OUT_CONTRACT, &x, &bindings);
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};

    #[test]
    fn test_wide_basic_block_config() {
        let config = WideBasicBlockConfig::new(16, 16);
        assert_eq!(config.in_planes(), 16);
        assert_eq!(config.out_planes(), 16);
        assert_eq!(config.stride(), 1);
        assert!(!config.has_projection());
        assert_eq!(config.output_resolution([32, 32]), [32, 32]);

        let config = WideBasicBlockConfig::new(16, 32).with_stride(2);
        assert!(config.has_projection());
        assert_eq!(config.output_resolution([32, 32]), [16, 16]);
        assert_eq!(config.output_resolution([7, 7]), [4, 4]);

        // A strided block needs a projection even when widths match.
        let config = WideBasicBlockConfig::new(16, 16).with_stride(2);
        assert!(config.has_projection());
    }

    #[test]
    fn test_wide_basic_block_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: WideBasicBlock<B> = WideBasicBlockConfig::new(4, 8)
            .with_stride(2)
            .init(&device);

        assert_eq!(block.in_planes(), 4);
        assert_eq!(block.out_planes(), 8);
        assert_eq!(block.stride(), 2);
        assert!(block.has_projection());
        assert!(block.conv1.bias.is_none());
        assert!(block.conv2.bias.is_none());

        let block: WideBasicBlock<B> = WideBasicBlockConfig::new(8, 8).init(&device);
        assert!(!block.has_projection());
    }

    #[test]
    fn test_wide_basic_block_identity_forward_autodiff() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let block: WideBasicBlock<B> = WideBasicBlockConfig::new(4, 4).init(&device);

        let input = Tensor::ones([2, 4, 8, 8], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("out_planes", 4),
                ("out_height", 8),
                ("out_width", 8)
            ],
        );
    }

    #[test]
    fn test_wide_basic_block_projection_forward_odd_resolution() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: WideBasicBlock<B> = WideBasicBlockConfig::new(4, 12)
            .with_stride(2)
            .init(&device);

        let input = Tensor::ones([1, 4, 9, 7], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", 1),
                ("out_planes", 12),
                ("out_height", 5),
                ("out_width", 4)
            ],
        );
    }

    #[test]
    fn test_wide_basic_block_zero_residual_is_identity() {
        type B = NdArray<f32>;
        let device = Default::default();

        let mut block: WideBasicBlock<B> = WideBasicBlockConfig::new(3, 3).init(&device);
        block.conv2.weight = block.conv2.weight.map(|w| w.zeros_like());

        let input = Tensor::random(
            [1, 3, 5, 5],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let output = block.forward(input.clone());

        let max_diff = (output - input).abs().max().into_scalar();
        assert!(max_diff < 1e-6, "max diff: {max_diff}");
    }
}
