//! # Simple CNN
//!
//! Three ``conv -> bn -> relu -> maxpool`` blocks, then a
//! ``dense -> bn -> relu -> dropout -> dense`` classifier.

use crate::layers::conv_pool::{ConvBnReluPool, ConvBnReluPoolConfig, ConvBnReluPoolMeta};
use crate::layers::util::{CLASSIFIER_INITIALIZER, batch_norm_config, zero_linear_bias};
use crate::models::regularization::Regularized;
use crate::models::try_check_input_shape;
use anyhow::bail;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::{BatchNorm, Dropout, DropoutConfig, Linear, LinearConfig, Relu};
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::softmax;

/// [`SimpleCnn`] Config.
#[derive(Config, Debug)]
pub struct SimpleCnnConfig {
    /// ``[channels, height, width]`` of the input images.
    pub input_shape: [usize; 3],

    /// Number of classification classes.
    pub num_classes: usize,

    /// Channels of every conv block.
    #[config(default = 64)]
    pub filters: usize,

    /// Number of conv blocks; each halves the resolution.
    #[config(default = 3)]
    pub num_blocks: usize,

    /// Width of the hidden dense layer.
    #[config(default = 512)]
    pub hidden: usize,

    /// Dropout probability before the classifier.
    #[config(default = "0.5")]
    pub dropout: f64,
}

impl SimpleCnnConfig {
    /// The per-block configs.
    pub fn block_configs(&self) -> Vec<ConvBnReluPoolConfig> {
        (0..self.num_blocks)
            .map(|idx| {
                let in_channels = if idx == 0 {
                    self.input_shape[0]
                } else {
                    self.filters
                };
                ConvBnReluPoolConfig::new(in_channels, self.filters)
            })
            .collect()
    }

    /// Resolution of the feature map fed to the classifier.
    pub fn feature_resolution(&self) -> [usize; 2] {
        self.block_configs()
            .iter()
            .fold([self.input_shape[1], self.input_shape[2]], |res, block| {
                block.output_resolution(res)
            })
    }

    /// Width of the flattened feature map.
    pub fn flat_features(&self) -> usize {
        let [height, width] = self.feature_resolution();
        self.filters * height * width
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> anyhow::Result<()> {
        if self.num_blocks == 0 || self.filters == 0 || self.hidden == 0 {
            bail!("num_blocks, filters, and hidden must be >= 1: {self:?}");
        }
        // Each block halves the resolution.
        let Some(min_side) = u32::try_from(self.num_blocks)
            .ok()
            .and_then(|shift| 1usize.checked_shl(shift))
        else {
            bail!("num_blocks too large: {}", self.num_blocks);
        };
        try_check_input_shape(self.input_shape, [min_side, min_side])?;
        if self.num_classes == 0 {
            bail!("num_classes must be >= 1");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            bail!("dropout must be in [0, 1): {}", self.dropout);
        }
        Ok(())
    }

    /// Initialize a [`SimpleCnn`].
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> anyhow::Result<SimpleCnn<B>> {
        self.try_validate()?;

        Ok(SimpleCnn {
            blocks: self
                .block_configs()
                .iter()
                .map(|block| block.init(device))
                .collect(),
            fc1: LinearConfig::new(self.flat_features(), self.hidden)
                .with_bias(false)
                .with_initializer(CLASSIFIER_INITIALIZER)
                .init(device),
            norm: batch_norm_config(self.hidden).init(device),
            act: Relu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc2: zero_linear_bias(
                LinearConfig::new(self.hidden, self.num_classes)
                    .with_initializer(CLASSIFIER_INITIALIZER)
                    .init(device),
            ),
        })
    }
}

/// Simple CNN classifier.
#[derive(Module, Debug)]
pub struct SimpleCnn<B: Backend> {
    /// Feature blocks.
    pub blocks: Vec<ConvBnReluPool<B>>,

    /// Hidden dense layer.
    pub fc1: Linear<B>,

    /// Hidden norm; applied over ``[batch, hidden, 1]``.
    pub norm: BatchNorm<B, 1>,

    /// Hidden activation.
    pub act: Relu,

    /// Hidden dropout.
    pub dropout: Dropout,

    /// Classifier.
    pub fc2: Linear<B>,
}

impl<B: Backend> SimpleCnn<B> {
    /// Number of input image channels.
    pub fn in_channels(&self) -> usize {
        self.blocks[0].in_channels()
    }

    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.fc2.weight.shape().dims[1]
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``; the resolution must
    ///   match the configured input shape.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())],
        );

        let x = self.blocks.iter().fold(input, |x, block| block.forward(x));
        let x = x.flatten::<2>(1, 3);

        let x = self.fc1.forward(x);
        let x = self.norm.forward(x.unsqueeze_dim::<3>(2)).squeeze::<2>(2);
        let x = self.act.forward(x);
        let x = self.dropout.forward(x);
        let x = self.fc2.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "num_classes"],
            &x,
            &[("batch", batch), ("num_classes", self.num_classes())],
        );

        x
    }

    /// Forward pass, with softmax class probabilities.
    pub fn forward_softmax(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        softmax(self.forward(input), 1)
    }
}

/// Build a [`SimpleCnn`] classifier.
///
/// # Arguments
///
/// - `input_shape`: ``[channels, height, width]``; height and width must be at least 8.
/// - `n_classes`: number of output classes.
/// - `weight_decay`: L2 coefficient for the optimizer.
/// - `device`: the device to build on.
#[tracing::instrument(skip(device))]
pub fn load_simple_cnn<B: Backend>(
    input_shape: [usize; 3],
    n_classes: usize,
    weight_decay: f64,
    device: &B::Device,
) -> anyhow::Result<Regularized<SimpleCnn<B>>> {
    let config = SimpleCnnConfig::new(input_shape, n_classes);
    tracing::debug!(flat_features = config.flat_features(), "building simple cnn");

    Regularized::try_new(config.try_init(device)?, weight_decay)
}
