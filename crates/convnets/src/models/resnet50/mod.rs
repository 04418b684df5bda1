//! # ResNet-50 Transfer Model
//!
//! A frozen ImageNet [`ResNet50Backbone`] under a trainable [`TransferHead`].

pub mod backbone;
pub mod bottleneck;
pub mod pretrained;

pub use backbone::*;

use crate::cache::disk::DiskCacheConfig;
use crate::cache::weights::{PretrainedWeights, RESNET50_TV_IN1K};
use crate::models::regularization::Regularized;
use crate::models::transfer::{PRETRAINED_IN_CHANNELS, TransferHead, TransferHeadConfig};
use bimm_contracts::assert_shape_contract_periodically;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::softmax;

/// [`ResNet50Classifier`] Config.
#[derive(Config, Debug)]
pub struct ResNet50ClassifierConfig {
    /// Number of classification classes.
    pub num_classes: usize,

    /// Backbone structure.
    #[config(default = "ResNet50BackboneConfig::new()")]
    pub backbone: ResNet50BackboneConfig,
}

impl ResNet50ClassifierConfig {
    /// Initialize a [`ResNet50Classifier`].
    ///
    /// Backbone weights are resolved through `disk_cache`; the backbone is
    /// frozen whatever the weight source.
    pub fn try_init<B: Backend>(
        &self,
        weights: &PretrainedWeights,
        disk_cache: &DiskCacheConfig,
        device: &B::Device,
    ) -> anyhow::Result<ResNet50Classifier<B>> {
        let head = TransferHeadConfig::new(RESNET50_OUT_CHANNELS, self.num_classes)
            .try_init(device)?;

        let checkpoint = weights.try_resolve(&RESNET50_TV_IN1K, disk_cache)?;
        let mut backbone = self.backbone.try_init(device)?;
        if let Some(path) = checkpoint {
            tracing::info!(path = %path.display(), "loading resnet50 backbone weights");
            backbone = backbone.try_load_pytorch_weights(&path)?;
        }

        Ok(ResNet50Classifier {
            backbone: backbone.no_grad(),
            head,
        })
    }
}

/// ResNet-50 transfer classifier.
#[derive(Module, Debug)]
pub struct ResNet50Classifier<B: Backend> {
    /// Frozen feature extractor.
    pub backbone: ResNet50Backbone<B>,

    /// Trainable head.
    pub head: TransferHead<B>,
}

impl<B: Backend> ResNet50Classifier<B> {
    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, 3, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
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

/// Build a ResNet-50 transfer classifier.
///
/// # Arguments
///
/// - `n_classes`: number of output classes.
/// - `weight_decay`: L2 coefficient; only the head is trainable.
/// - `weights`: backbone weight source.
/// - `device`: the device to build on.
#[tracing::instrument(skip(device))]
pub fn load_resnet50_imagenet<B: Backend>(
    n_classes: usize,
    weight_decay: f64,
    weights: &PretrainedWeights,
    device: &B::Device,
) -> anyhow::Result<Regularized<ResNet50Classifier<B>>> {
    let model = ResNet50ClassifierConfig::new(n_classes).try_init(
        weights,
        &DiskCacheConfig::default(),
        device,
    )?;
    Regularized::try_new(model, weight_decay)
}
