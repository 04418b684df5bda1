//! # Inception-V3 Transfer Model
//!
//! A frozen ImageNet [`InceptionV3Backbone`] under a trainable
//! [`TransferHead`]. The head applies a ReLU to its logits before the
//! softmax.

pub mod backbone;
pub mod blocks;
pub mod pretrained;

pub use backbone::*;

use crate::cache::disk::DiskCacheConfig;
use crate::cache::weights::{INCEPTION_V3_TV_IN1K, PretrainedWeights};
use crate::models::regularization::Regularized;
use crate::models::transfer::{PRETRAINED_IN_CHANNELS, TransferHead, TransferHeadConfig};
use bimm_contracts::assert_shape_contract_periodically;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::softmax;

/// [`InceptionV3Classifier`] Config.
#[derive(Config, Debug)]
pub struct InceptionV3ClassifierConfig {
    /// Number of classification classes.
    pub num_classes: usize,

    /// Apply a ReLU to the logits.
    #[config(default = true)]
    pub relu_logits: bool,
}

impl InceptionV3ClassifierConfig {
    /// Initialize an [`InceptionV3Classifier`].
    ///
    /// Backbone weights are resolved through `disk_cache`; the backbone is
    /// frozen whatever the weight source.
    pub fn try_init<B: Backend>(
        &self,
        weights: &PretrainedWeights,
        disk_cache: &DiskCacheConfig,
        device: &B::Device,
    ) -> anyhow::Result<InceptionV3Classifier<B>> {
        let head = TransferHeadConfig::new(INCEPTION_V3_OUT_CHANNELS, self.num_classes)
            .with_relu_logits(self.relu_logits)
            .try_init(device)?;

        let checkpoint = weights.try_resolve(&INCEPTION_V3_TV_IN1K, disk_cache)?;
        let mut backbone = InceptionV3BackboneConfig::new().try_init(device)?;
        if let Some(path) = checkpoint {
            tracing::info!(path = %path.display(), "loading inception_v3 backbone weights");
            backbone = backbone.try_load_pytorch_weights(&path)?;
        }

        Ok(InceptionV3Classifier {
            backbone: backbone.no_grad(),
            head,
        })
    }
}

/// Inception-V3 transfer classifier.
#[derive(Module, Debug)]
pub struct InceptionV3Classifier<B: Backend> {
    /// Frozen feature extractor.
    pub backbone: InceptionV3Backbone<B>,

    /// Trainable head.
    pub head: TransferHead<B>,
}

impl<B: Backend> InceptionV3Classifier<B> {
    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, 3, height, width]``, at least 75x75.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits, after the head's ReLU.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        assert_shape_contract_periodically!(
            ["batch", "channels", "height", "width"],
            &input,
            &[("channels", PRETRAINED_IN_CHANNELS)],
        );
        self.head.forward(self.backbone.forward(input))
    }

    /// Forward pass, with softmax class probabilities.
    pub fn forward_softmax(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        softmax(self.forward(input), 1)
    }
}

/// Build an Inception-V3 transfer classifier.
///
/// # Arguments
///
/// - `n_classes`: number of output classes.
/// - `weight_decay`: L2 coefficient; only the head is trainable.
/// - `weights`: backbone weight source.
/// - `device`: the device to build on.
#[tracing::instrument(skip(device))]
pub fn load_inception_imagenet<B: Backend>(
    n_classes: usize,
    weight_decay: f64,
    weights: &PretrainedWeights,
    device: &B::Device,
) -> anyhow::Result<Regularized<InceptionV3Classifier<B>>> {
    let model = InceptionV3ClassifierConfig::new(n_classes).try_init(
        weights,
        &DiskCacheConfig::default(),
        device,
    )?;
    Regularized::try_new(model, weight_decay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use hamcrest::prelude::*;

    #[test]
    fn test_load_inception_imagenet() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let built = load_inception_imagenet::<B>(5, 1e-4, &PretrainedWeights::None, &device).unwrap();
        assert_that!(built.weight_decay, is(close_to(1e-4, 1e-12)));

        let model = built.into_model();
        assert_eq!(model.num_classes(), 5);
        assert!(model.head.act.is_some());
        assert!(!model.backbone.conv2d_1a_3x3.conv.weight.is_require_grad());
        assert!(!model.backbone.mixed_7c.branch_pool.bn.gamma.is_require_grad());
        assert!(model.head.fc.weight.is_require_grad());

        let logits = model.forward(Tensor::ones([2, 3, 75, 75], &device));
        assert_eq!(logits.dims(), [2, 5]);
        let min = logits.min().into_scalar();
        assert!(min >= 0.0, "min: {min}");
    }

    #[test]
    fn test_load_inception_imagenet_missing_file() {
        type B = NdArray<f32>;
        let device = Default::default();

        let weights = PretrainedWeights::File("/nonexistent/inception.pth".into());
        let err = load_inception_imagenet::<B>(5, 1e-4, &weights, &device).unwrap_err();
        assert!(err.to_string().contains("weights file not found"), "{err}");
    }
}
