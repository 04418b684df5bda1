//! # ResNet-50 Backbone
//!
//! The ImageNet ResNet-50 feature extractor with the classifier top removed.
//! Field names follow the torchvision module tree.

use crate::layers::util::padded_output_resolution;
use crate::models::resnet50::bottleneck::{
    BOTTLENECK_EXPANSION, BOTTLENECK_INITIALIZER, Bottleneck, BottleneckConfig, BottleneckMeta,
};
use anyhow::bail;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::relu;
use burn::tensor::module::max_pool2d;

/// Blocks per layer of ResNet-50.
pub const RESNET50_LAYERS: [usize; 4] = [3, 4, 6, 3];

/// Inner widths of the four layers.
pub const RESNET50_PLANES: [usize; 4] = [64, 128, 256, 512];

/// Strides of the four layers.
pub const RESNET50_STRIDES: [usize; 4] = [1, 2, 2, 2];

/// Width of the stem.
pub const RESNET50_STEM_WIDTH: usize = 64;

/// Channels of the backbone output.
pub const RESNET50_OUT_CHANNELS: usize = 512 * BOTTLENECK_EXPANSION;

/// [`ResNet50Backbone`] Config.
#[derive(Config, Debug)]
pub struct ResNet50BackboneConfig {
    /// Number of input channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Blocks per layer.
    #[config(default = "RESNET50_LAYERS")]
    pub layers: [usize; 4],
}

impl ResNet50BackboneConfig {
    /// Block configs of each layer.
    pub fn layer_configs(&self) -> [Vec<BottleneckConfig>; 4] {
        let mut in_planes = RESNET50_STEM_WIDTH;
        std::array::from_fn(|idx| {
            let planes = RESNET50_PLANES[idx];
            (0..self.layers[idx])
                .map(|b| {
                    let block = if b == 0 {
                        BottleneckConfig::new(in_planes, planes).with_stride(RESNET50_STRIDES[idx])
                    } else {
                        BottleneckConfig::new(in_planes, planes)
                    };
                    in_planes = block.out_planes();
                    block
                })
                .collect()
        })
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> anyhow::Result<()> {
        if self.in_channels == 0 {
            bail!("in_channels must be >= 1");
        }
        if self.layers.contains(&0) {
            bail!("every layer needs at least one block: {:?}", self.layers);
        }
        Ok(())
    }

    /// Get the output resolution for a given input resolution.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        resnet50_output_resolution(input_resolution)
    }

    /// Initialize a [`ResNet50Backbone`].
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> anyhow::Result<ResNet50Backbone<B>> {
        self.try_validate()?;

        let [layer1, layer2, layer3, layer4] = self
            .layer_configs()
            .map(|blocks| blocks.iter().map(|b| b.init(device)).collect::<Vec<_>>());

        Ok(ResNet50Backbone {
            conv1: Conv2dConfig::new([self.in_channels, RESNET50_STEM_WIDTH], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_bias(false)
                .with_initializer(BOTTLENECK_INITIALIZER)
                .init(device),
            bn1: BatchNormConfig::new(RESNET50_STEM_WIDTH).init(device),
            layer1,
            layer2,
            layer3,
            layer4,
        })
    }
}

/// Output resolution of the backbone.
///
/// The 7x7/2 stem conv and 3x3/2 max pool, then three stride-2 layers.
pub fn resnet50_output_resolution(input_resolution: [usize; 2]) -> [usize; 2] {
    let res = padded_output_resolution(input_resolution, [7, 7], [2, 2], [3, 3]);
    let res = padded_output_resolution(res, [3, 3], [2, 2], [1, 1]);
    RESNET50_STRIDES
        .iter()
        .fold(res, |[h, w], &s| [h.div_ceil(s), w.div_ceil(s)])
}

/// ResNet-50 feature extractor.
#[derive(Module, Debug)]
pub struct ResNet50Backbone<B: Backend> {
    /// Stem conv.
    pub conv1: Conv2d<B>,
    /// Stem norm.
    pub bn1: BatchNorm<B, 2>,
    /// 56x56 layer.
    pub layer1: Vec<Bottleneck<B>>,
    /// 28x28 layer.
    pub layer2: Vec<Bottleneck<B>>,
    /// 14x14 layer.
    pub layer3: Vec<Bottleneck<B>>,
    /// 7x7 layer.
    pub layer4: Vec<Bottleneck<B>>,
}

impl<B: Backend> ResNet50Backbone<B> {
    /// Number of input channels.
    pub fn in_channels(&self) -> usize {
        self.conv1.weight.shape().dims[1]
    }

    /// Number of output channels.
    pub fn out_channels(&self) -> usize {
        self.layer4[self.layer4.len() - 1].out_planes()
    }

    /// Blocks per layer.
    pub fn layer_sizes(&self) -> [usize; 4] {
        [
            self.layer1.len(),
            self.layer2.len(),
            self.layer3.len(),
            self.layer4.len(),
        ]
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, 2048, out_height, out_width]`` features;
    /// see [`resnet50_output_resolution`].
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
        let [out_height, out_width] = resnet50_output_resolution([height, width]);

        let x = relu(self.bn1.forward(self.conv1.forward(input)));
        let x = max_pool2d(x, [3, 3], [2, 2], [1, 1], [1, 1]);

        let x = [&self.layer1, &self.layer2, &self.layer3, &self.layer4]
            .into_iter()
            .flatten()
            .fold(x, |x, block| block.forward(x));

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

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_layer_configs() {
        let config = ResNet50BackboneConfig::new();
        let layers = config.layer_configs();

        assert_eq!(layers.each_ref().map(|l| l.len()), RESNET50_LAYERS);

        let firsts = layers.each_ref().map(|l| {
            let b = &l[0];
            (b.in_planes(), b.planes(), b.stride(), b.has_downsample())
        });
        assert_eq!(
            firsts,
            [
                (64, 64, 1, true),
                (256, 128, 2, true),
                (512, 256, 2, true),
                (1024, 512, 2, true),
            ]
        );

        for layer in &layers {
            for block in &layer[1..] {
                assert_eq!(block.stride(), 1);
                assert!(!block.has_downsample());
            }
        }
        assert_eq!(layers[3][2].out_planes(), RESNET50_OUT_CHANNELS);
    }

    #[test]
    fn test_output_resolution() {
        assert_eq!(resnet50_output_resolution([224, 224]), [7, 7]);
        assert_eq!(resnet50_output_resolution([32, 32]), [1, 1]);
        assert_eq!(resnet50_output_resolution([299, 299]), [10, 10]);
    }

    #[test]
    fn test_validate() {
        assert!(ResNet50BackboneConfig::new().try_validate().is_ok());
        assert!(
            ResNet50BackboneConfig::new()
                .with_layers([1, 0, 1, 1])
                .try_validate()
                .is_err()
        );
        assert!(
            ResNet50BackboneConfig::new()
                .with_in_channels(0)
                .try_validate()
                .is_err()
        );
    }

    #[test]
    fn test_resnet50_structure() {
        type B = NdArray<f32>;
        let device = Default::default();

        let backbone: ResNet50Backbone<B> =
            ResNet50BackboneConfig::new().try_init(&device).unwrap();
        assert_eq!(backbone.in_channels(), 3);
        assert_eq!(backbone.layer_sizes(), RESNET50_LAYERS);
        assert_eq!(backbone.out_channels(), RESNET50_OUT_CHANNELS);

        assert_eq!(backbone.conv1.weight.dims(), [64, 3, 7, 7]);
        assert_eq!(backbone.layer4[0].conv2.weight.dims(), [512, 512, 3, 3]);
        assert_eq!(
            backbone.layer3[0]
                .downsample
                .as_ref()
                .map(|d| d.conv.weight.dims()),
            Some([1024, 512, 1, 1])
        );
    }

    #[test]
    fn test_small_backbone_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let backbone: ResNet50Backbone<B> = ResNet50BackboneConfig::new()
            .with_layers([1, 1, 1, 1])
            .try_init(&device)
            .unwrap();

        let output = backbone.forward(Tensor::ones([1, 3, 40, 48], &device));
        assert_eq!(output.dims(), [1, 2048, 2, 2]);
    }
}
