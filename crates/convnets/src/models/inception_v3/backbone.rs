//! # Inception-V3 Backbone
//!
//! The ImageNet Inception-V3 feature extractor, without the auxiliary
//! head or classifier top. Inputs are expected scaled to ``[-1, 1]``.

use crate::layers::basic_conv::{BasicConv2d, BasicConv2dConfig, BasicConv2dMeta};
use crate::layers::util::padded_output_resolution;
use crate::models::inception_v3::blocks::{
    InceptionA, InceptionAConfig, InceptionB, InceptionBConfig, InceptionBlockMeta, InceptionC,
    InceptionCConfig, InceptionD, InceptionDConfig, InceptionE, InceptionEConfig,
};
use anyhow::bail;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};
use burn::tensor::module::max_pool2d;

/// Smallest accepted ``[height, width]``.
pub const INCEPTION_V3_MIN_RESOLUTION: [usize; 2] = [75, 75];

/// Channels of the backbone output.
pub const INCEPTION_V3_OUT_CHANNELS: usize = 2048;

/// [`InceptionV3Backbone`] Config.
#[derive(Config, Debug)]
pub struct InceptionV3BackboneConfig {
    /// Number of input channels.
    #[config(default = 3)]
    pub in_channels: usize,
}

impl InceptionV3BackboneConfig {
    /// The stem convs, in order.
    fn stem_configs(&self) -> [BasicConv2dConfig; 5] {
        [
            BasicConv2dConfig::square(self.in_channels, 32, 3).with_stride([2, 2]),
            BasicConv2dConfig::square(32, 32, 3),
            BasicConv2dConfig::square(32, 64, 3).with_padding([1, 1]),
            BasicConv2dConfig::square(64, 80, 1),
            BasicConv2dConfig::square(80, 192, 3),
        ]
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Panics
    ///
    /// If the input is smaller than [`INCEPTION_V3_MIN_RESOLUTION`].
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        inception_v3_output_resolution(input_resolution)
    }

    /// Initialize an [`InceptionV3Backbone`].
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> anyhow::Result<InceptionV3Backbone<B>> {
        if self.in_channels == 0 {
            bail!("in_channels must be >= 1");
        }
        let [c1a, c2a, c2b, c3b, c4a] = self.stem_configs().map(|c| c.init(device));

        Ok(InceptionV3Backbone {
            conv2d_1a_3x3: c1a,
            conv2d_2a_3x3: c2a,
            conv2d_2b_3x3: c2b,
            conv2d_3b_1x1: c3b,
            conv2d_4a_3x3: c4a,
            mixed_5b: InceptionAConfig::new(192, 32).init(device),
            mixed_5c: InceptionAConfig::new(256, 64).init(device),
            mixed_5d: InceptionAConfig::new(288, 64).init(device),
            mixed_6a: InceptionBConfig::new(288).init(device),
            mixed_6b: InceptionCConfig::new(768, 128).init(device),
            mixed_6c: InceptionCConfig::new(768, 160).init(device),
            mixed_6d: InceptionCConfig::new(768, 160).init(device),
            mixed_6e: InceptionCConfig::new(768, 192).init(device),
            mixed_7a: InceptionDConfig::new(768).init(device),
            mixed_7b: InceptionEConfig::new(1280).init(device),
            mixed_7c: InceptionEConfig::new(2048).init(device),
        })
    }
}

/// Output resolution of the backbone.
///
/// Unpadded 3x3 convs and pools shrink the grid; ``299 -> 8``, ``75 -> 1``.
pub fn inception_v3_output_resolution(input_resolution: [usize; 2]) -> [usize; 2] {
    let reduce = |res| padded_output_resolution(res, [3, 3], [2, 2], [0, 0]);
    let valid = |res| padded_output_resolution(res, [3, 3], [1, 1], [0, 0]);

    // conv2d_1a, conv2d_2a, pool, conv2d_4a, pool, mixed_6a, mixed_7a
    let res = valid(reduce(input_resolution));
    let res = valid(reduce(res));
    reduce(reduce(reduce(res)))
}

/// Inception-V3 feature extractor.
#[derive(Module, Debug)]
#[allow(missing_docs)]
pub struct InceptionV3Backbone<B: Backend> {
    pub conv2d_1a_3x3: BasicConv2d<B>,
    pub conv2d_2a_3x3: BasicConv2d<B>,
    pub conv2d_2b_3x3: BasicConv2d<B>,
    pub conv2d_3b_1x1: BasicConv2d<B>,
    pub conv2d_4a_3x3: BasicConv2d<B>,
    pub mixed_5b: InceptionA<B>,
    pub mixed_5c: InceptionA<B>,
    pub mixed_5d: InceptionA<B>,
    pub mixed_6a: InceptionB<B>,
    pub mixed_6b: InceptionC<B>,
    pub mixed_6c: InceptionC<B>,
    pub mixed_6d: InceptionC<B>,
    pub mixed_6e: InceptionC<B>,
    pub mixed_7a: InceptionD<B>,
    pub mixed_7b: InceptionE<B>,
    pub mixed_7c: InceptionE<B>,
}

impl<B: Backend> InceptionV3Backbone<B> {
    /// Number of input channels.
    pub fn in_channels(&self) -> usize {
        self.conv2d_1a_3x3.in_channels()
    }

    /// Number of output channels.
    pub fn out_channels(&self) -> usize {
        self.mixed_7c.out_channels()
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``, at least 75x75.
    ///
    /// # Returns
    ///
    /// ``[batch, 2048, out_height, out_width]`` features;
    /// see [`inception_v3_output_resolution`].
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch", "height", "width"],
            &[("in_channels", self.in_channels())],
        );
        assert!(
            height >= INCEPTION_V3_MIN_RESOLUTION[0] && width >= INCEPTION_V3_MIN_RESOLUTION[1],
            "input {height}x{width} is smaller than {INCEPTION_V3_MIN_RESOLUTION:?}"
        );
        let [out_height, out_width] = inception_v3_output_resolution([height, width]);

        let x = self.conv2d_1a_3x3.forward(input);
        let x = self.conv2d_2a_3x3.forward(x);
        let x = self.conv2d_2b_3x3.forward(x);
        let x = max_pool2d(x, [3, 3], [2, 2], [0, 0], [1, 1]);
        let x = self.conv2d_3b_1x1.forward(x);
        let x = self.conv2d_4a_3x3.forward(x);
        let x = max_pool2d(x, [3, 3], [2, 2], [0, 0], [1, 1]);

        let x = self.mixed_5b.forward(x);
        let x = self.mixed_5c.forward(x);
        let x = self.mixed_5d.forward(x);
        let x = self.mixed_6a.forward(x);
        let x = self.mixed_6b.forward(x);
        let x = self.mixed_6c.forward(x);
        let x = self.mixed_6d.forward(x);
        let x = self.mixed_6e.forward(x);
        let x = self.mixed_7a.forward(x);
        let x = self.mixed_7b.forward(x);
        let x = self.mixed_7c.forward(x);

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
