//! # Model Factory
//!
//! [`load_model`] selects a classifier by its [`NetType`] tag;
//! [`ClassifierConfig`] is the same selection as a saveable [`Config`].

use crate::cache::disk::DiskCacheConfig;
use crate::cache::weights::PretrainedWeights;
use crate::models::inception_v3::{
    INCEPTION_V3_MIN_RESOLUTION, InceptionV3Classifier, InceptionV3ClassifierConfig,
};
use crate::models::regularization::{Regularized, weight_decay_config};
use crate::models::resnet50::{ResNet50Classifier, ResNet50ClassifierConfig};
use crate::models::simple_cnn::{SimpleCnn, load_simple_cnn};
use crate::models::transfer::try_check_pretrained_input;
use crate::models::wide_resnet::{WideResNet, load_resnet};
use anyhow::bail;
use burn::config::Config;
use burn::module::Module;
use burn::optim::decay::WeightDecayConfig;
use burn::prelude::{Backend, Tensor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Smallest input accepted by the ResNet-50 transfer model.
pub const RESNET50_MIN_RESOLUTION: [usize; 2] = [32, 32];

/// Network type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetType {
    /// [`SimpleCnn`].
    #[serde(rename = "simple")]
    Simple,

    /// [`WideResNet`].
    #[serde(rename = "resnet")]
    ResNet,

    /// [`ResNet50Classifier`].
    #[serde(rename = "resnet50imagenet")]
    ResNet50ImageNet,

    /// [`InceptionV3Classifier`].
    #[serde(rename = "inceptionv3")]
    InceptionV3,
}

impl NetType {
    /// Every net type.
    pub const ALL: [NetType; 4] = [
        NetType::Simple,
        NetType::ResNet,
        NetType::ResNet50ImageNet,
        NetType::InceptionV3,
    ];

    /// The tag string.
    pub fn as_str(&self) -> &'static str {
        match self {
            NetType::Simple => "simple",
            NetType::ResNet => "resnet",
            NetType::ResNet50ImageNet => "resnet50imagenet",
            NetType::InceptionV3 => "inceptionv3",
        }
    }

    /// Does this net type use a pretrained backbone?
    pub fn is_transfer(&self) -> bool {
        matches!(self, NetType::ResNet50ImageNet | NetType::InceptionV3)
    }
}

impl fmt::Display for NetType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match NetType::ALL.iter().find(|t| t.as_str() == s) {
            Some(t) => Ok(*t),
            None => bail!("Invalid net_type: {s:?}"),
        }
    }
}

/// Classifier selection and hyper-parameters.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Which network to build.
    pub net_type: NetType,

    /// ``[channels, height, width]`` of the input images.
    pub input_shape: [usize; 3],

    /// Number of classification classes.
    pub num_classes: usize,

    /// [`WideResNet`] depth; ``6n + 4``.
    #[config(default = 28)]
    pub depth: usize,

    /// L2 weight decay coefficient.
    #[config(default = "5e-4")]
    pub weight_decay: f64,

    /// [`WideResNet`] widen factor.
    #[config(default = 1)]
    pub widen: usize,

    /// Backbone weights for the transfer models.
    #[config(default = "PretrainedWeights::ImageNet")]
    pub weights: PretrainedWeights,

    /// Where downloaded backbone weights are cached.
    #[config(default = "DiskCacheConfig::new()")]
    pub cache: DiskCacheConfig,
}

impl ClassifierConfig {
    /// The optimizer decay config matching `weight_decay`.
    pub fn weight_decay_config(&self) -> Option<WeightDecayConfig> {
        weight_decay_config(self.weight_decay)
    }

    /// Build the classifier.
    ///
    /// Parameters the selected network does not use are ignored.
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> anyhow::Result<Regularized<ClassifierModel<B>>> {
        let wd = self.weight_decay;
        Ok(match self.net_type {
            NetType::Simple => load_simple_cnn(self.input_shape, self.num_classes, wd, device)?
                .map(ClassifierModel::Simple),
            NetType::ResNet => load_resnet(
                self.input_shape,
                self.num_classes,
                self.depth,
                wd,
                self.widen,
                device,
            )?
            .map(ClassifierModel::ResNet),
            NetType::ResNet50ImageNet => {
                try_check_pretrained_input(self.input_shape, RESNET50_MIN_RESOLUTION)?;
                let model = ResNet50ClassifierConfig::new(self.num_classes).try_init(
                    &self.weights,
                    &self.cache,
                    device,
                )?;
                Regularized::try_new(ClassifierModel::ResNet50(model), wd)?
            }
            NetType::InceptionV3 => {
                try_check_pretrained_input(self.input_shape, INCEPTION_V3_MIN_RESOLUTION)?;
                let model = InceptionV3ClassifierConfig::new(self.num_classes).try_init(
                    &self.weights,
                    &self.cache,
                    device,
                )?;
                Regularized::try_new(ClassifierModel::InceptionV3(model), wd)?
            }
        })
    }

    /// Build the classifier, discarding the weight decay pairing.
    ///
    /// # Panics
    ///
    /// If the config is invalid or weights cannot be loaded.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ClassifierModel<B> {
        match self.try_init(device) {
            Ok(built) => built.into_model(),
            Err(err) => panic!("{err:#}"),
        }
    }
}

/// Any of the factory's classifiers.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ClassifierModel<B: Backend> {
    /// See [`NetType::Simple`].
    Simple(SimpleCnn<B>),

    /// See [`NetType::ResNet`].
    ResNet(WideResNet<B>),

    /// See [`NetType::ResNet50ImageNet`].
    ResNet50(ResNet50Classifier<B>),

    /// See [`NetType::InceptionV3`].
    InceptionV3(InceptionV3Classifier<B>),
}

impl<B: Backend> ClassifierModel<B> {
    /// The net type of this model.
    pub fn net_type(&self) -> NetType {
        match self {
            ClassifierModel::Simple(_) => NetType::Simple,
            ClassifierModel::ResNet(_) => NetType::ResNet,
            ClassifierModel::ResNet50(_) => NetType::ResNet50ImageNet,
            ClassifierModel::InceptionV3(_) => NetType::InceptionV3,
        }
    }

    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        match self {
            ClassifierModel::Simple(m) => m.num_classes(),
            ClassifierModel::ResNet(m) => m.num_classes(),
            ClassifierModel::ResNet50(m) => m.num_classes(),
            ClassifierModel::InceptionV3(m) => m.num_classes(),
        }
    }

    /// Forward pass.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        match self {
            ClassifierModel::Simple(m) => m.forward(input),
            ClassifierModel::ResNet(m) => m.forward(input),
            ClassifierModel::ResNet50(m) => m.forward(input),
            ClassifierModel::InceptionV3(m) => m.forward(input),
        }
    }

    /// Forward pass, with softmax class probabilities.
    pub fn forward_softmax(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        match self {
            ClassifierModel::Simple(m) => m.forward_softmax(input),
            ClassifierModel::ResNet(m) => m.forward_softmax(input),
            ClassifierModel::ResNet50(m) => m.forward_softmax(input),
            ClassifierModel::InceptionV3(m) => m.forward_softmax(input),
        }
    }
}

/// Build a classifier by net type tag.
///
/// # Arguments
///
/// - `net_type`: one of ``simple``, ``resnet``, ``resnet50imagenet``, ``inceptionv3``.
/// - `input_shape`: ``[channels, height, width]``.
/// - `n_classes`: number of output classes.
/// - `depth`: `resnet` depth.
/// - `weight_decay`: L2 coefficient.
/// - `widen`: `resnet` widen factor.
/// - `device`: the device to build on.
///
/// The transfer models load ImageNet weights through the default disk cache;
/// use [`ClassifierConfig`] to choose otherwise.
#[tracing::instrument(skip(device))]
pub fn load_model<B: Backend>(
    net_type: &str,
    input_shape: [usize; 3],
    n_classes: usize,
    depth: usize,
    weight_decay: f64,
    widen: usize,
    device: &B::Device,
) -> anyhow::Result<Regularized<ClassifierModel<B>>> {
    let config = ClassifierConfig::new(net_type.parse()?, input_shape, n_classes)
        .with_depth(depth)
        .with_weight_decay(weight_decay)
        .with_widen(widen);

    let built = config.try_init(device)?;
    tracing::info!(
        net_type = %config.net_type,
        num_params = built.model.num_params(),
        "built classifier"
    );
    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use hamcrest::prelude::*;

    type B = NdArray<f32>;

    #[test]
    fn test_net_type_tags() {
        for t in NetType::ALL {
            assert_eq!(t.as_str().parse::<NetType>().unwrap(), t);
            assert_eq!(t.to_string(), t.as_str());
            assert_eq!(
                serde_json::to_string(&t).unwrap(),
                format!("\"{}\"", t.as_str())
            );
        }
        assert!(NetType::InceptionV3.is_transfer());
        assert!(!NetType::ResNet.is_transfer());

        let err = "vgg".parse::<NetType>().unwrap_err();
        assert!(err.to_string().starts_with("Invalid net_type"), "{err}");
    }

    #[test]
    fn test_load_model_invalid_net_type() {
        let device = Default::default();
        let err = load_model::<B>("ResNet", [3, 32, 32], 10, 28, 5e-4, 1, &device).unwrap_err();
        assert!(err.to_string().contains("Invalid net_type"), "{err}");
    }

    #[test]
    fn test_load_model_simple() {
        let device = Default::default();
        let built = load_model::<B>("simple", [3, 32, 32], 10, 0, 5e-4, 0, &device).unwrap();
        assert!(built.weight_decay_config().is_some());

        let model = built.into_model();
        assert_eq!(model.net_type(), NetType::Simple);
        assert_eq!(model.num_classes(), 10);

        let output = model.forward(Tensor::ones([2, 3, 32, 32], &device));
        assert_eq!(output.dims(), [2, 10]);
    }

    #[test]
    fn test_load_model_resnet() {
        let device = Default::default();
        let model = load_model::<B>("resnet", [1, 16, 16], 3, 10, 0.0, 2, &device)
            .unwrap()
            .into_model();
        assert_eq!(model.net_type(), NetType::ResNet);

        let probs = model.forward_softmax(Tensor::ones([2, 1, 16, 16], &device));
        assert_eq!(probs.dims(), [2, 3]);
        for sum in probs.sum_dim(1).into_data().to_vec::<f32>().unwrap() {
            assert_that!(sum, is(close_to(1.0, 1e-5)));
        }

        let model = load_model::<B>("resnet", [1, 16, 16], 3, 4, 0.0, 1, &device)
            .unwrap()
            .into_model();
        match model {
            ClassifierModel::ResNet(net) => assert_eq!(net.blocks_per_stage(), vec![1, 1, 1]),
            other => panic!("unexpected model: {:?}", other.net_type()),
        }

        let err = load_model::<B>("resnet", [1, 16, 16], 3, 12, 0.0, 1, &device).unwrap_err();
        assert!(err.to_string().contains("depth must be 6n+4"), "{err}");
    }

    #[test]
    fn test_transfer_input_checks() {
        let device = Default::default();
        for (net_type, shape) in [
            (NetType::ResNet50ImageNet, [1, 224, 224]),
            (NetType::ResNet50ImageNet, [3, 16, 16]),
            (NetType::InceptionV3, [3, 64, 64]),
        ] {
            let config = ClassifierConfig::new(net_type, shape, 5)
                .with_weights(PretrainedWeights::None);
            assert!(config.try_init::<B>(&device).is_err(), "{config:?}");
        }
    }

    #[test]
    fn test_resnet50_without_weights() {
        let device = Default::default();
        let config = ClassifierConfig::new(NetType::ResNet50ImageNet, [3, 32, 32], 5)
            .with_weights(PretrainedWeights::None);

        let model: ClassifierModel<B> = config.init(&device);
        assert_eq!(model.net_type(), NetType::ResNet50ImageNet);

        let output = model.forward(Tensor::ones([1, 3, 32, 32], &device));
        assert_eq!(output.dims(), [1, 5]);
    }

    #[test]
    fn test_classifier_config_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.json");

        let config = ClassifierConfig::new(NetType::ResNet, [3, 32, 32], 100)
            .with_depth(16)
            .with_widen(8)
            .with_weight_decay(1e-4)
            .with_weights(PretrainedWeights::File("/weights/r50.pth".into()));
        config.save(&path).unwrap();

        let loaded = ClassifierConfig::load(&path).unwrap();
        assert_eq!(loaded.net_type, NetType::ResNet);
        assert_eq!(loaded.input_shape, [3, 32, 32]);
        assert_eq!(loaded.num_classes, 100);
        assert_eq!(loaded.depth, 16);
        assert_eq!(loaded.widen, 8);
        assert_that!(loaded.weight_decay, is(close_to(1e-4, 1e-12)));
        assert_eq!(loaded.weights, config.weights);
        assert_eq!(loaded.cache.root_cache_key, "convnets");

        let penalty = loaded.weight_decay_config().unwrap().penalty;
        assert_that!(penalty, is(close_to(2e-4, 1e-9)));
    }

    #[test]
    fn test_classifier_config_defaults() {
        let config = ClassifierConfig::new(NetType::Simple, [3, 32, 32], 10);
        assert_eq!(config.depth, 28);
        assert_eq!(config.widen, 1);
        assert_eq!(config.weights, PretrainedWeights::ImageNet);
        assert_that!(config.weight_decay, is(close_to(5e-4, 1e-12)));

        let config = config.with_weight_decay(0.0);
        assert!(config.weight_decay_config().is_none());
    }
}
