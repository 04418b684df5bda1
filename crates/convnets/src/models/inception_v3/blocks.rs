//! # Inception Mixed Blocks
//!
//! Each block runs parallel [`BasicConv2d`] branches and concatenates them
//! along the channel axis:
//!
//! * [`InceptionA`] - 1x1, 5x5, double 3x3, and pooled 1x1 branches (35x35).
//! * [`InceptionB`] - strided 3x3 and double 3x3 branches, plus max pool (35 -> 17).
//! * [`InceptionC`] - factorized 7x7 branches (17x17).
//! * [`InceptionD`] - strided 3x3 and 7x7x3 branches, plus max pool (17 -> 8).
//! * [`InceptionE`] - expanded 1x3 / 3x1 branches (8x8).
//!
//! Branch field names follow the torchvision module tree.

use crate::layers::basic_conv::{BasicConv2d, BasicConv2dConfig};
use crate::layers::util::padded_output_resolution;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};
use burn::tensor::module::{avg_pool2d, max_pool2d};

/// Common meta API of the mixed blocks and their configs.
pub trait InceptionBlockMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Is this a grid-reduction block?
    fn is_reduction(&self) -> bool {
        false
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// Reduction blocks apply an unpadded 3x3 stride-2 window.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        if self.is_reduction() {
            padded_output_resolution(input_resolution, [3, 3], [2, 2], [0, 0])
        } else {
            input_resolution
        }
    }
}

/// 3x3 stride-1 average pool, zero padded, counting the padding.
fn pool_same<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    avg_pool2d(x, [3, 3], [1, 1], [1, 1], true)
}

/// 3x3 stride-2 max pool, unpadded.
fn pool_reduce<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    max_pool2d(x, [3, 3], [2, 2], [0, 0], [1, 1])
}

/// Conv, ``1 x 7`` or ``7 x 1``, with matching padding.
fn factorized(
    in_channels: usize,
    out_channels: usize,
    kernel_size: [usize; 2],
) -> BasicConv2dConfig {
    BasicConv2dConfig::new(in_channels, out_channels, kernel_size)
        .with_padding([kernel_size[0] / 2, kernel_size[1] / 2])
}

/// [`InceptionA`] Config.
#[derive(Config, Debug)]
pub struct InceptionAConfig {
    /// Number of input channels.
    pub in_channels: usize,

    /// Channels of the pooled branch.
    pub pool_features: usize,
}

impl InceptionBlockMeta for InceptionAConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        64 + 64 + 96 + self.pool_features
    }
}

impl InceptionAConfig {
    /// Initialize an [`InceptionA`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> InceptionA<B> {
        let c = self.in_channels;
        InceptionA {
            branch1x1: BasicConv2dConfig::square(c, 64, 1).init(device),
            branch5x5_1: BasicConv2dConfig::square(c, 48, 1).init(device),
            branch5x5_2: BasicConv2dConfig::square(48, 64, 5)
                .with_padding([2, 2])
                .init(device),
            branch3x3dbl_1: BasicConv2dConfig::square(c, 64, 1).init(device),
            branch3x3dbl_2: BasicConv2dConfig::square(64, 96, 3)
                .with_padding([1, 1])
                .init(device),
            branch3x3dbl_3: BasicConv2dConfig::square(96, 96, 3)
                .with_padding([1, 1])
                .init(device),
            branch_pool: BasicConv2dConfig::square(c, self.pool_features, 1).init(device),
        }
    }
}

/// 35x35 mixed block.
#[derive(Module, Debug)]
#[allow(missing_docs)]
pub struct InceptionA<B: Backend> {
    pub branch1x1: BasicConv2d<B>,
    pub branch5x5_1: BasicConv2d<B>,
    pub branch5x5_2: BasicConv2d<B>,
    pub branch3x3dbl_1: BasicConv2d<B>,
    pub branch3x3dbl_2: BasicConv2d<B>,
    pub branch3x3dbl_3: BasicConv2d<B>,
    pub branch_pool: BasicConv2d<B>,
}

impl<B: Backend> InceptionBlockMeta for InceptionA<B> {
    fn in_channels(&self) -> usize {
        self.branch1x1.conv.weight.shape().dims[1]
    }

    fn out_channels(&self) -> usize {
        64 + 64 + 96 + self.branch_pool.conv.weight.shape().dims[0]
    }
}

impl<B: Backend> InceptionA<B> {
    /// Forward pass.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());

        let b5 = self.branch5x5_1.forward(x.clone());
        let b5 = self.branch5x5_2.forward(b5);

        let b3 = self.branch3x3dbl_1.forward(x.clone());
        let b3 = self.branch3x3dbl_2.forward(b3);
        let b3 = self.branch3x3dbl_3.forward(b3);

        let bp = self.branch_pool.forward(pool_same(x));

        Tensor::cat(vec![b1, b5, b3, bp], 1)
    }
}

/// [`InceptionB`] Config.
#[derive(Config, Debug)]
pub struct InceptionBConfig {
    /// Number of input channels.
    pub in_channels: usize,
}

impl InceptionBlockMeta for InceptionBConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        384 + 96 + self.in_channels
    }

    fn is_reduction(&self) -> bool {
        true
    }
}

impl InceptionBConfig {
    /// Initialize an [`InceptionB`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> InceptionB<B> {
        let c = self.in_channels;
        InceptionB {
            branch3x3: BasicConv2dConfig::square(c, 384, 3)
                .with_stride([2, 2])
                .init(device),
            branch3x3dbl_1: BasicConv2dConfig::square(c, 64, 1).init(device),
            branch3x3dbl_2: BasicConv2dConfig::square(64, 96, 3)
                .with_padding([1, 1])
                .init(device),
            branch3x3dbl_3: BasicConv2dConfig::square(96, 96, 3)
                .with_stride([2, 2])
                .init(device),
        }
    }
}

/// 35x35 -> 17x17 reduction block.
#[derive(Module, Debug)]
#[allow(missing_docs)]
pub struct InceptionB<B: Backend> {
    pub branch3x3: BasicConv2d<B>,
    pub branch3x3dbl_1: BasicConv2d<B>,
    pub branch3x3dbl_2: BasicConv2d<B>,
    pub branch3x3dbl_3: BasicConv2d<B>,
}

impl<B: Backend> InceptionBlockMeta for InceptionB<B> {
    fn in_channels(&self) -> usize {
        self.branch3x3.conv.weight.shape().dims[1]
    }

    fn out_channels(&self) -> usize {
        384 + 96 + self.in_channels()
    }

    fn is_reduction(&self) -> bool {
        true
    }
}

impl<B: Backend> InceptionB<B> {
    /// Forward pass.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let b3 = self.branch3x3.forward(x.clone());

        let bd = self.branch3x3dbl_1.forward(x.clone());
        let bd = self.branch3x3dbl_2.forward(bd);
        let bd = self.branch3x3dbl_3.forward(bd);

        let bp = pool_reduce(x);

        Tensor::cat(vec![b3, bd, bp], 1)
    }
}

/// [`InceptionC`] Config.
#[derive(Config, Debug)]
pub struct InceptionCConfig {
    /// Number of input channels.
    pub in_channels: usize,

    /// Inner width of the 7x7 branches.
    pub channels_7x7: usize,
}

impl InceptionBlockMeta for InceptionCConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        4 * 192
    }
}

impl InceptionCConfig {
    /// Initialize an [`InceptionC`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> InceptionC<B> {
        let c = self.in_channels;
        let c7 = self.channels_7x7;
        InceptionC {
            branch1x1: BasicConv2dConfig::square(c, 192, 1).init(device),
            branch7x7_1: BasicConv2dConfig::square(c, c7, 1).init(device),
            branch7x7_2: factorized(c7, c7, [1, 7]).init(device),
            branch7x7_3: factorized(c7, 192, [7, 1]).init(device),
            branch7x7dbl_1: BasicConv2dConfig::square(c, c7, 1).init(device),
            branch7x7dbl_2: factorized(c7, c7, [7, 1]).init(device),
            branch7x7dbl_3: factorized(c7, c7, [1, 7]).init(device),
            branch7x7dbl_4: factorized(c7, c7, [7, 1]).init(device),
            branch7x7dbl_5: factorized(c7, 192, [1, 7]).init(device),
            branch_pool: BasicConv2dConfig::square(c, 192, 1).init(device),
        }
    }
}

/// 17x17 mixed block.
#[derive(Module, Debug)]
#[allow(missing_docs)]
pub struct InceptionC<B: Backend> {
    pub branch1x1: BasicConv2d<B>,
    pub branch7x7_1: BasicConv2d<B>,
    pub branch7x7_2: BasicConv2d<B>,
    pub branch7x7_3: BasicConv2d<B>,
    pub branch7x7dbl_1: BasicConv2d<B>,
    pub branch7x7dbl_2: BasicConv2d<B>,
    pub branch7x7dbl_3: BasicConv2d<B>,
    pub branch7x7dbl_4: BasicConv2d<B>,
    pub branch7x7dbl_5: BasicConv2d<B>,
    pub branch_pool: BasicConv2d<B>,
}

impl<B: Backend> InceptionBlockMeta for InceptionC<B> {
    fn in_channels(&self) -> usize {
        self.branch1x1.conv.weight.shape().dims[1]
    }

    fn out_channels(&self) -> usize {
        4 * 192
    }
}

impl<B: Backend> InceptionC<B> {
    /// Inner width of the 7x7 branches.
    pub fn channels_7x7(&self) -> usize {
        self.branch7x7_1.conv.weight.shape().dims[0]
    }

    /// Forward pass.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());

        let b7 = self.branch7x7_1.forward(x.clone());
        let b7 = self.branch7x7_2.forward(b7);
        let b7 = self.branch7x7_3.forward(b7);

        let bd = [
            &self.branch7x7dbl_1,
            &self.branch7x7dbl_2,
            &self.branch7x7dbl_3,
            &self.branch7x7dbl_4,
            &self.branch7x7dbl_5,
        ]
        .into_iter()
        .fold(x.clone(), |x, conv| conv.forward(x));

        let bp = self.branch_pool.forward(pool_same(x));

        Tensor::cat(vec![b1, b7, bd, bp], 1)
    }
}

/// [`InceptionD`] Config.
#[derive(Config, Debug)]
pub struct InceptionDConfig {
    /// Number of input channels.
    pub in_channels: usize,
}

impl InceptionBlockMeta for InceptionDConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        320 + 192 + self.in_channels
    }

    fn is_reduction(&self) -> bool {
        true
    }
}

impl InceptionDConfig {
    /// Initialize an [`InceptionD`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> InceptionD<B> {
        let c = self.in_channels;
        InceptionD {
            branch3x3_1: BasicConv2dConfig::square(c, 192, 1).init(device),
            branch3x3_2: BasicConv2dConfig::square(192, 320, 3)
                .with_stride([2, 2])
                .init(device),
            branch7x7x3_1: BasicConv2dConfig::square(c, 192, 1).init(device),
            branch7x7x3_2: factorized(192, 192, [1, 7]).init(device),
            branch7x7x3_3: factorized(192, 192, [7, 1]).init(device),
            branch7x7x3_4: BasicConv2dConfig::square(192, 192, 3)
                .with_stride([2, 2])
                .init(device),
        }
    }
}

/// 17x17 -> 8x8 reduction block.
#[derive(Module, Debug)]
#[allow(missing_docs)]
pub struct InceptionD<B: Backend> {
    pub branch3x3_1: BasicConv2d<B>,
    pub branch3x3_2: BasicConv2d<B>,
    pub branch7x7x3_1: BasicConv2d<B>,
    pub branch7x7x3_2: BasicConv2d<B>,
    pub branch7x7x3_3: BasicConv2d<B>,
    pub branch7x7x3_4: BasicConv2d<B>,
}

impl<B: Backend> InceptionBlockMeta for InceptionD<B> {
    fn in_channels(&self) -> usize {
        self.branch3x3_1.conv.weight.shape().dims[1]
    }

    fn out_channels(&self) -> usize {
        320 + 192 + self.in_channels()
    }

    fn is_reduction(&self) -> bool {
        true
    }
}

impl<B: Backend> InceptionD<B> {
    /// Forward pass.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let b3 = self.branch3x3_1.forward(x.clone());
        let b3 = self.branch3x3_2.forward(b3);

        let b7 = [
            &self.branch7x7x3_1,
            &self.branch7x7x3_2,
            &self.branch7x7x3_3,
            &self.branch7x7x3_4,
        ]
        .into_iter()
        .fold(x.clone(), |x, conv| conv.forward(x));

        let bp = pool_reduce(x);

        Tensor::cat(vec![b3, b7, bp], 1)
    }
}

/// [`InceptionE`] Config.
#[derive(Config, Debug)]
pub struct InceptionEConfig {
    /// Number of input channels.
    pub in_channels: usize,
}

impl InceptionBlockMeta for InceptionEConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        320 + 2 * 384 + 2 * 384 + 192
    }
}

impl InceptionEConfig {
    /// Initialize an [`InceptionE`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> InceptionE<B> {
        let c = self.in_channels;
        InceptionE {
            branch1x1: BasicConv2dConfig::square(c, 320, 1).init(device),
            branch3x3_1: BasicConv2dConfig::square(c, 384, 1).init(device),
            branch3x3_2a: factorized(384, 384, [1, 3]).init(device),
            branch3x3_2b: factorized(384, 384, [3, 1]).init(device),
            branch3x3dbl_1: BasicConv2dConfig::square(c, 448, 1).init(device),
            branch3x3dbl_2: BasicConv2dConfig::square(448, 384, 3)
                .with_padding([1, 1])
                .init(device),
            branch3x3dbl_3a: factorized(384, 384, [1, 3]).init(device),
            branch3x3dbl_3b: factorized(384, 384, [3, 1]).init(device),
            branch_pool: BasicConv2dConfig::square(c, 192, 1).init(device),
        }
    }
}

/// 8x8 expanded mixed block.
#[derive(Module, Debug)]
#[allow(missing_docs)]
pub struct InceptionE<B: Backend> {
    pub branch1x1: BasicConv2d<B>,
    pub branch3x3_1: BasicConv2d<B>,
    pub branch3x3_2a: BasicConv2d<B>,
    pub branch3x3_2b: BasicConv2d<B>,
    pub branch3x3dbl_1: BasicConv2d<B>,
    pub branch3x3dbl_2: BasicConv2d<B>,
    pub branch3x3dbl_3a: BasicConv2d<B>,
    pub branch3x3dbl_3b: BasicConv2d<B>,
    pub branch_pool: BasicConv2d<B>,
}

impl<B: Backend> InceptionBlockMeta for InceptionE<B> {
    fn in_channels(&self) -> usize {
        self.branch1x1.conv.weight.shape().dims[1]
    }

    fn out_channels(&self) -> usize {
        320 + 2 * 384 + 2 * 384 + 192
    }
}

impl<B: Backend> InceptionE<B> {
    /// Forward pass.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());

        let b3 = self.branch3x3_1.forward(x.clone());
        let b3 = Tensor::cat(
            vec![
                self.branch3x3_2a.forward(b3.clone()),
                self.branch3x3_2b.forward(b3),
            ],
            1,
        );

        let bd = self.branch3x3dbl_1.forward(x.clone());
        let bd = self.branch3x3dbl_2.forward(bd);
        let bd = Tensor::cat(
            vec![
                self.branch3x3dbl_3a.forward(bd.clone()),
                self.branch3x3dbl_3b.forward(bd),
            ],
            1,
        );

        let bp = self.branch_pool.forward(pool_same(x));

        Tensor::cat(vec![b1, b3, bd, bp], 1)
    }
}
