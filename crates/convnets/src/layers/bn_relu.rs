//! # `BnRelu` Module
//!
//! A [`BnRelu`] is a [`BatchNorm`] layer followed by a [`Relu`];
//! the pre-activation unit of the wide residual blocks.

use crate::layers::util::batch_norm_config;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::{BatchNorm, Relu};
use burn::prelude::{Backend, Tensor};

/// [`BnRelu`] Meta.
pub trait BnReluMeta {
    /// Number of normalized channels.
    fn num_features(&self) -> usize;
}

/// [`BnRelu`] Config.
#[derive(Config, Debug)]
pub struct BnReluConfig {
    /// Number of normalized channels.
    pub num_features: usize,
}

impl BnReluMeta for BnReluConfig {
    fn num_features(&self) -> usize {
        self.num_features
    }
}

impl BnReluConfig {
    /// Initialize a [`BnRelu`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BnRelu<B> {
        BnRelu {
            norm: batch_norm_config(self.num_features).init(device),
            act: Relu::new(),
        }
    }
}

/// Batch norm followed by a relu.
#[derive(Module, Debug)]
pub struct BnRelu<B: Backend> {
    /// Internal norm layer.
    pub norm: BatchNorm<B, 2>,

    /// Activation.
    pub act: Relu,
}

impl<B: Backend> BnReluMeta for BnRelu<B> {
    fn num_features(&self) -> usize {
        self.norm.gamma.shape().dims[0]
    }
}

impl<B: Backend> BnRelu<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]``.
    ///
    /// # Returns
    ///
    /// A tensor of the same shape.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "channels", "height", "width"],
            &input,
            &["batch", "height", "width"],
            &[("channels", self.num_features())],
        );

        let x = self.norm.forward(input);
        let x = self.act.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "channels", "height", "width"],
            &x,
            &[
                ("batch", batch),
                ("channels", self.num_features()),
                ("height", height),
                ("width", width)
            ],
        );

        x
    }
}
