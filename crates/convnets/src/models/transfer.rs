//! # Transfer-Learning Heads
//!
//! A [`TransferHead`] is a fresh classifier over a frozen, pretrained
//! feature extractor: global average pool, dense, and an optional ReLU
//! on the logits.

use crate::layers::util::{CLASSIFIER_INITIALIZER, zero_linear_bias};
use crate::models::try_check_input_shape;
use anyhow::bail;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::{Backend, Tensor};

/// Channels expected by the ImageNet backbones.
pub const PRETRAINED_IN_CHANNELS: usize = 3;

/// Check an input shape against a pretrained RGB backbone.
pub fn try_check_pretrained_input(
    input_shape: [usize; 3],
    min_resolution: [usize; 2],
) -> anyhow::Result<[usize; 3]> {
    let input_shape = try_check_input_shape(input_shape, min_resolution)?;
    if input_shape[0] != PRETRAINED_IN_CHANNELS {
        bail!(
            "pretrained backbones take {PRETRAINED_IN_CHANNELS} channels, got {}",
            input_shape[0]
        );
    }
    Ok(input_shape)
}

/// [`TransferHead`] Config.
#[derive(Config, Debug)]
pub struct TransferHeadConfig {
    /// Channels of the backbone features.
    pub in_features: usize,

    /// Number of classification classes.
    pub num_classes: usize,

    /// Apply a ReLU to the logits.
    #[config(default = false)]
    pub relu_logits: bool,
}

impl TransferHeadConfig {
    /// Initialize a [`TransferHead`].
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> anyhow::Result<TransferHead<B>> {
        if self.in_features == 0 || self.num_classes == 0 {
            bail!("in_features and num_classes must be >= 1: {self:?}");
        }
        Ok(TransferHead {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: zero_linear_bias(
                LinearConfig::new(self.in_features, self.num_classes)
                    .with_initializer(CLASSIFIER_INITIALIZER)
                    .init(device),
            ),
            act: self.relu_logits.then(Relu::new),
        })
    }
}

/// Pool, dense, optional relu.
#[derive(Module, Debug)]
pub struct TransferHead<B: Backend> {
    /// Global average pool.
    pub pool: AdaptiveAvgPool2d,

    /// Classifier.
    pub fc: Linear<B>,

    /// Optional activation on the logits.
    pub act: Option<Relu>,
}

impl<B: Backend> TransferHead<B> {
    /// Number of feature channels.
    pub fn in_features(&self) -> usize {
        self.fc.weight.shape().dims[0]
    }

    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.fc.weight.shape().dims[1]
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `features`: ``[batch, in_features, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    pub fn forward(
        &self,
        features: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_features", "height", "width"],
            &features,
            &["batch"],
            &[("in_features", self.in_features())],
        );

        let x = self.pool.forward(features).flatten::<2>(1, 3);
        let x = self.fc.forward(x);
        let x = match &self.act {
            Some(act) => act.forward(x),
            None => x,
        };

        assert_shape_contract_periodically!(
            ["batch", "num_classes"],
            &x,
            &[("batch", batch), ("num_classes", self.num_classes())],
        );
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_try_check_pretrained_input() {
        assert!(try_check_pretrained_input([3, 224, 224], [32, 32]).is_ok());
        assert!(try_check_pretrained_input([1, 224, 224], [32, 32]).is_err());
        assert!(try_check_pretrained_input([3, 16, 224], [32, 32]).is_err());
    }

    #[test]
    fn test_transfer_head() {
        type B = NdArray<f32>;
        let device = Default::default();

        let head: TransferHead<B> = TransferHeadConfig::new(8, 3).try_init(&device).unwrap();
        assert_eq!(head.in_features(), 8);
        assert_eq!(head.num_classes(), 3);
        assert!(head.act.is_none());
        let bias = head.fc.bias.clone().unwrap().val();
        assert_eq!(bias.abs().sum().into_scalar(), 0.0);

        let output = head.forward(Tensor::ones([2, 8, 3, 3], &device));
        assert_eq!(output.dims(), [2, 3]);

        assert!(TransferHeadConfig::new(8, 0).try_init::<B>(&device).is_err());
    }

    #[test]
    fn test_transfer_head_relu_logits() {
        type B = NdArray<f32>;
        let device = Default::default();

        let head: TransferHead<B> = TransferHeadConfig::new(4, 5)
            .with_relu_logits(true)
            .try_init(&device)
            .unwrap();
        assert!(head.act.is_some());

        let features = Tensor::random(
            [3, 4, 2, 2],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let min = head.forward(features).min().into_scalar();
        assert!(min >= 0.0, "min: {min}");
    }
}
