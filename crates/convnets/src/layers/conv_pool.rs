//! # `ConvBnReluPool` Block
//!
//! ``Conv2d(same) -> BatchNorm -> ReLU -> MaxPool``; the feature block of the simple CNN.

use crate::layers::util::{CONV_INTO_RELU_INITIALIZER, batch_norm_config, zero_conv_bias};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, Initializer, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};

/// [`ConvBnReluPool`] Meta.
pub trait ConvBnReluPoolMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Size (and stride) of the square max pool.
    fn pool_size(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// ``[height / pool_size, width / pool_size]``, rounded down.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let pool = self.pool_size();
        [input_resolution[0] / pool, input_resolution[1] / pool]
    }
}

/// [`ConvBnReluPool`] Config.
#[derive(Config, Debug)]
pub struct ConvBnReluPoolConfig {
    /// Number of input channels.
    pub in_channels: usize,

    /// Number of output channels.
    pub out_channels: usize,

    /// Square conv kernel size; must be odd.
    #[config(default = 3)]
    pub kernel_size: usize,

    /// Size (and stride) of the square max pool.
    #[config(default = 2)]
    pub pool_size: usize,

    /// The [`Conv2d`] initializer.
    #[config(default = "CONV_INTO_RELU_INITIALIZER")]
    pub initializer: Initializer,
}

impl ConvBnReluPoolMeta for ConvBnReluPoolConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl ConvBnReluPoolConfig {
    /// Initialize a [`ConvBnReluPool`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ConvBnReluPool<B> {
        assert!(
            self.kernel_size % 2 == 1,
            "same padding requires an odd kernel: {}",
            self.kernel_size
        );
        let pad = self.kernel_size / 2;

        ConvBnReluPool {
            conv: zero_conv_bias(
                Conv2dConfig::new(
                    [self.in_channels, self.out_channels],
                    [self.kernel_size, self.kernel_size],
                )
                .with_padding(PaddingConfig2d::Explicit(pad, pad))
                .with_initializer(self.initializer.clone())
                .init(device),
            ),
            norm: batch_norm_config(self.out_channels).init(device),
            act: Relu::new(),
            pool: MaxPool2dConfig::new([self.pool_size, self.pool_size])
                .with_strides([self.pool_size, self.pool_size])
                .init(),
        }
    }
}

/// Conv, norm, relu, and max pool.
#[derive(Module, Debug)]
pub struct ConvBnReluPool<B: Backend> {
    /// Internal conv layer.
    pub conv: Conv2d<B>,

    /// Internal norm layer.
    pub norm: BatchNorm<B, 2>,

    /// Activation.
    pub act: Relu,

    /// Downsampling pool.
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBnReluPoolMeta for ConvBnReluPool<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1]
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn pool_size(&self) -> usize {
        self.pool.stride[0]
    }
}

impl<B: Backend> ConvBnReluPool<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, in_height / pool, in_width / pool]`` tensor.
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
        let x = self.norm.forward(x);
        let x = self.act.forward(x);
        let x = self.pool.forward(x);

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
