//! # ResNet-50 Checkpoint Loading

use crate::models::resnet50::backbone::{ResNet50Backbone, ResNet50BackboneRecord};
use crate::utility::pytorch::{KeyRemap, load_pytorch_record};
use anyhow::Context;
use burn::module::Module;
use burn::prelude::Backend;
use std::path::Path;

/// torchvision names the projection shortcut ``downsample.{0,1}``.
pub const RESNET50_KEY_REMAPS: [KeyRemap; 2] = [
    (r"downsample\.0", "downsample.conv"),
    (r"downsample\.1", "downsample.bn"),
];

/// Load a [`ResNet50BackboneRecord`] from a torchvision checkpoint.
///
/// The checkpoint's ``fc`` tensors are ignored.
#[tracing::instrument(skip(device))]
pub fn load_resnet50_backbone_record<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<ResNet50BackboneRecord<B>> {
    load_pytorch_record::<B, _>(path, &RESNET50_KEY_REMAPS, device)
        .context("resnet50 backbone checkpoint")
}

impl<B: Backend> ResNet50Backbone<B> {
    /// Load weights from a torchvision checkpoint onto this backbone.
    pub fn try_load_pytorch_weights(
        self,
        path: &Path,
    ) -> anyhow::Result<Self> {
        let device = self
            .devices()
            .into_iter()
            .next()
            .context("backbone has no device")?;
        let record = load_resnet50_backbone_record::<B>(path, &device)?;
        Ok(self.load_record(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnet50::bottleneck::{Bottleneck, BottleneckConfig, BottleneckRecord};
    use burn::backend::NdArray;
    use burn::prelude::Tensor;
    use std::path::PathBuf;

    fn fixture() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("testdata")
            .join("resnet50_bottleneck.pt")
    }

    fn values<const D: usize>(tensor: Tensor<NdArray<f32>, D>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_load_bottleneck_with_downsample_remap() {
        type B = NdArray<f32>;
        let device = Default::default();

        let record: BottleneckRecord<B> =
            load_pytorch_record::<B, _>(&fixture(), &RESNET50_KEY_REMAPS, &device).unwrap();
        let block: Bottleneck<B> = BottleneckConfig::new(4, 2)
            .init(&device)
            .load_record(record);

        assert_eq!(values(block.conv1.weight.val()), vec![0.125; 2 * 4]);
        assert_eq!(values(block.conv2.weight.val()), vec![0.0625; 2 * 2 * 9]);
        assert_eq!(values(block.conv3.weight.val()), vec![0.25; 8 * 2]);

        let downsample = block.downsample.unwrap();
        assert_eq!(downsample.conv.weight.dims(), [8, 4, 1, 1]);
        assert_eq!(values(downsample.conv.weight.val()), vec![0.5; 8 * 4]);
        assert_eq!(values(downsample.bn.gamma.val()), vec![1.5; 8]);
        assert_eq!(values(downsample.bn.beta.val()), vec![0.75; 8]);
        assert_eq!(values(downsample.bn.running_mean.value()), vec![0.25; 8]);
        assert_eq!(values(downsample.bn.running_var.value()), vec![2.0; 8]);
    }

    #[test]
    fn test_load_bottleneck_without_remap_fails() {
        type B = NdArray<f32>;
        let device = Default::default();

        let result = load_pytorch_record::<B, BottleneckRecord<B>>(&fixture(), &[], &device);
        assert!(result.is_err());
    }
}
