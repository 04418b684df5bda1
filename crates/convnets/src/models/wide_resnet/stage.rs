//! # `WideResNet` Stage
//!
//! A [`WideStage`] is a sequence of [`WideBasicBlock`]s.
//!
//! [`WideStageMeta`] defines a common meta API for [`WideStage`]
//! and [`WideStageConfig`].
//!
//! [`WideStageConfig`] implements [`Config`], and provides
//! [`WideStageConfig::init`] to initialize a [`WideStage`].

use crate::layers::util::same_output_resolution;
use crate::models::wide_resnet::basic_block::{
    WideBasicBlock, WideBasicBlockConfig, WideBasicBlockMeta,
};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// [`WideStage`] Meta API.
pub trait WideStageMeta {
    /// The number of blocks.
    fn len(&self) -> usize;

    /// Check if the stage is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// Get the effective stride of the stage.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        same_output_resolution(input_resolution, self.stride())
    }
}

/// [`WideStage`] Configuration.
#[derive(Config, Debug)]
pub struct WideStageConfig {
    /// The component blocks.
    pub blocks: Vec<WideBasicBlockConfig>,
}

impl From<Vec<WideBasicBlockConfig>> for WideStageConfig {
    fn from(blocks: Vec<WideBasicBlockConfig>) -> Self {
        Self { blocks }
    }
}

impl WideStageMeta for WideStageConfig {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }
}

impl WideStageConfig {
    /// Build a stage config.
    ///
    /// The first block maps ``in_planes -> out_planes`` with ``stride``;
    /// the remaining ``num_blocks - 1`` blocks keep ``out_planes`` at stride 1.
    pub fn build(
        num_blocks: usize,
        in_planes: usize,
        out_planes: usize,
        stride: usize,
    ) -> Self {
        let blocks = (0..num_blocks)
            .map(|b| {
                if b == 0 {
                    WideBasicBlockConfig::new(in_planes, out_planes).with_stride(stride)
                } else {
                    WideBasicBlockConfig::new(out_planes, out_planes)
                }
            })
            .collect();

        Self { blocks }
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("blocks is empty".to_string());
        }

        for idx in 1..self.blocks.len() {
            let prev = &self.blocks[idx - 1];
            let curr = &self.blocks[idx];
            if prev.out_planes() != curr.in_planes() {
                return Err(format!(
                    "block[{}].out_planes({}) != block[{}].in_planes({})",
                    idx - 1,
                    prev.out_planes(),
                    idx,
                    curr.in_planes(),
                ));
            }
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a new [`WideStage`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> WideStage<B> {
        self.expect_valid();

        WideStage {
            blocks: self.blocks.iter().map(|block| block.init(device)).collect(),
        }
    }
}

/// Stage of pre-activation residual blocks.
#[derive(Module, Debug)]
pub struct WideStage<B: Backend> {
    /// Internal blocks.
    pub blocks: Vec<WideBasicBlock<B>>,
}

impl<B: Backend> WideStageMeta for WideStage<B> {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }
}

impl<B: Backend> WideStage<B> {
    /// Apply the stage.
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

        let x = self.blocks.iter().fold(input, |x, block| block.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
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
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    #[test]
    fn test_wide_stage_config_build() {
        let config = WideStageConfig::build(3, 16, 32, 2);
        config.expect_valid();
        assert_eq!(config.len(), 3);
        assert_eq!(config.in_planes(), 16);
        assert_eq!(config.out_planes(), 32);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_resolution([32, 32]), [16, 16]);

        let first = &config.blocks[0];
        assert_eq!(first.in_planes(), 16);
        assert_eq!(first.out_planes(), 32);
        assert_eq!(first.stride(), 2);
        assert!(first.has_projection());

        for block in &config.blocks[1..] {
            assert_eq!(block.in_planes(), 32);
            assert_eq!(block.out_planes(), 32);
            assert_eq!(block.stride(), 1);
            assert!(!block.has_projection());
        }
    }

    #[test]
    fn test_wide_stage_config_validate() {
        assert_eq!(
            WideStageConfig::from(Vec::<WideBasicBlockConfig>::new()).try_validate(),
            Err("blocks is empty".to_string())
        );

        let config = WideStageConfig::from(vec![
            WideBasicBlockConfig::new(4, 8),
            WideBasicBlockConfig::new(16, 16),
        ]);
        assert_eq!(
            config.try_validate(),
            Err("block[0].out_planes(8) != block[1].in_planes(16)".to_string())
        );
    }

    #[test]
    #[should_panic(expected = "blocks is empty")]
    fn test_wide_stage_init_empty() {
        type B = NdArray<f32>;
        let device = Default::default();
        let _stage: WideStage<B> = WideStageConfig::from(Vec::<WideBasicBlockConfig>::new()).init(&device);
    }

    #[test]
    fn test_wide_stage_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let stage: WideStage<B> = WideStageConfig::build(2, 4, 8, 2).init(&device);
        assert_eq!(stage.len(), 2);
        assert_eq!(stage.in_planes(), 4);
        assert_eq!(stage.out_planes(), 8);
        assert_eq!(stage.stride(), 2);

        let input = Tensor::ones([2, 4, 10, 10], &device);
        let output = stage.forward(input.clone());

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("out_planes", 8),
                ("out_height", 5),
                ("out_width", 5)
            ],
        );

        let mut expected = input;
        for block in stage.blocks.iter() {
            expected = block.forward(expected);
        }
        output.to_data().assert_eq(&expected.to_data(), true);
    }
}
