//! # `WideResNet` Core Model
//!
//! [`WideResNet`] is a pre-activation residual network with a channel
//! widen factor and a ``6n + 4`` depth rule.
//!
//! [`WideResNetAbstractConfig`] implements [`Config`], and provides
//! a high-level configuration interface (depth, widen).
//! It provides [`WideResNetAbstractConfig::try_to_structure`] to convert
//! to a [`WideResNetConfig`].
//!
//! [`WideResNetConfig`] implements [`Config`], and provides
//! [`WideResNetConfig::init`] to initialize a [`WideResNet`].

use crate::layers::bn_relu::{BnRelu, BnReluConfig};
use crate::layers::util::{
    CLASSIFIER_INITIALIZER, CONV_INTO_RELU_INITIALIZER, zero_linear_bias,
};
use crate::models::wide_resnet::stage::{WideStage, WideStageConfig, WideStageMeta};
use anyhow::bail;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d};
use burn::prelude::{Backend, Config, Tensor};
use burn::tensor::activation::softmax;

/// Width of the stem convolution.
pub const STEM_WIDTH: usize = 16;

/// Base widths of the three residual stages, before widening.
pub const STAGE_BASE_WIDTHS: [usize; 3] = [16, 32, 64];

/// Strides of the three residual stages.
pub const STAGE_STRIDES: [usize; 3] = [1, 2, 2];

/// High-level `WideResNet` model configuration.
#[derive(Config, Debug)]
pub struct WideResNetAbstractConfig {
    /// Number of input image channels.
    pub in_channels: usize,

    /// Number of classification classes.
    pub num_classes: usize,

    /// Network depth; must be ``6n + 4``.
    #[config(default = 28)]
    pub depth: usize,

    /// Channel widen factor for the residual stages.
    #[config(default = 1)]
    pub widen: usize,
}

impl WideResNetAbstractConfig {
    /// The number of blocks in each stage.
    ///
    /// ``max((depth - 4) / 6, 1)``; every stage keeps its first block,
    /// so depth 4 builds one block per stage.
    pub fn try_blocks_per_stage(&self) -> anyhow::Result<usize> {
        if self.depth < 4 || (self.depth - 4) % 6 != 0 {
            bail!("depth must be 6n+4: {}", self.depth);
        }
        Ok(((self.depth - 4) / 6).max(1))
    }

    /// The stem width followed by the widened stage widths.
    ///
    /// ``[16, 16 * widen, 32 * widen, 64 * widen]``
    pub fn stage_widths(&self) -> [usize; 4] {
        [
            STEM_WIDTH,
            STAGE_BASE_WIDTHS[0] * self.widen,
            STAGE_BASE_WIDTHS[1] * self.widen,
            STAGE_BASE_WIDTHS[2] * self.widen,
        ]
    }

    /// Convert to a [`WideResNetConfig`].
    pub fn try_to_structure(&self) -> anyhow::Result<WideResNetConfig> {
        let n_block = self.try_blocks_per_stage()?;
        if self.widen == 0 {
            bail!("widen must be >= 1");
        }
        if self.num_classes == 0 {
            bail!("num_classes must be >= 1");
        }
        if self.in_channels == 0 {
            bail!("in_channels must be >= 1");
        }

        let widths = self.stage_widths();
        let stages = (0..STAGE_STRIDES.len())
            .map(|idx| {
                WideStageConfig::build(n_block, widths[idx], widths[idx + 1], STAGE_STRIDES[idx])
            })
            .collect();

        Ok(WideResNetConfig::new(
            Conv2dConfig::new([self.in_channels, STEM_WIDTH], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .with_initializer(CONV_INTO_RELU_INITIALIZER),
            stages,
            self.num_classes,
        ))
    }
}

/// [`WideResNet`] Structure Config.
///
/// This config defines the structure of a `WideResNet` model.
/// It is not a semantic configuration; [`WideResNetConfig::init`]
/// only checks that adjacent widths agree.
#[derive(Config, Debug)]
pub struct WideResNetConfig {
    /// The stem conv configuration.
    pub stem: Conv2dConfig,

    /// The residual stages.
    pub stages: Vec<WideStageConfig>,

    /// The number of classes.
    pub num_classes: usize,
}

impl WideResNetConfig {
    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.stages.is_empty() {
            return Err("stages is empty".to_string());
        }
        let mut planes = self.stem.channels[1];
        for (idx, stage) in self.stages.iter().enumerate() {
            stage
                .try_validate()
                .map_err(|err| format!("stage[{idx}]: {err}"))?;
            if stage.in_planes() != planes {
                return Err(format!(
                    "stage[{idx}].in_planes({}) != {planes}",
                    stage.in_planes()
                ));
            }
            planes = stage.out_planes();
        }
        Ok(())
    }

    /// Initialize a [`WideResNet`] model.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> WideResNet<B> {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }

        let head_planes = self.stages[self.stages.len() - 1].out_planes();

        WideResNet {
            stem: self.stem.init(device),
            stages: self.stages.iter().map(|s| s.init(device)).collect(),
            head_act: BnReluConfig::new(head_planes).init(device),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: zero_linear_bias(
                LinearConfig::new(head_planes, self.num_classes)
                    .with_initializer(CLASSIFIER_INITIALIZER)
                    .init(device),
            ),
        }
    }
}

/// `WideResNet` model.
#[derive(Module, Debug)]
pub struct WideResNet<B: Backend> {
    /// Stem conv.
    pub stem: Conv2d<B>,

    /// Residual stages.
    pub stages: Vec<WideStage<B>>,

    /// Final pre-activation before pooling.
    pub head_act: BnRelu<B>,

    /// Global average pool.
    pub pool: AdaptiveAvgPool2d,

    /// Classifier.
    pub fc: Linear<B>,
}

impl<B: Backend> WideResNet<B> {
    /// Number of input image channels.
    pub fn in_channels(&self) -> usize {
        self.stem.weight.shape().dims[1]
    }

    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.fc.weight.shape().dims[1]
    }

    /// Number of residual blocks in each stage.
    pub fn blocks_per_stage(&self) -> Vec<usize> {
        self.stages.iter().map(|s| s.len()).collect()
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
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

        let x = self.stem.forward(input);
        let x = self.stages.iter().fold(x, |x, stage| stage.forward(x));

        let x = self.head_act.forward(x);
        let x = self.pool.forward(x);
        // [B, C, 1, 1] -> [B, C]
        let x = x.flatten::<2>(1, 3);
        let x = self.fc.forward(x);

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
