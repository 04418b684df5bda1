//! # Inception-V3 Checkpoint Loading

use crate::models::inception_v3::backbone::{InceptionV3Backbone, InceptionV3BackboneRecord};
use crate::utility::pytorch::{KeyRemap, load_pytorch_record};
use anyhow::Context;
use burn::module::Module;
use burn::prelude::Backend;
use std::path::Path;

/// ``Conv2d_*`` / ``Mixed_*`` keys map to the snake-case fields.
pub const INCEPTION_V3_KEY_REMAPS: [KeyRemap; 2] =
    [("^Conv2d_", "conv2d_"), ("^Mixed_", "mixed_")];

/// Load an [`InceptionV3BackboneRecord`] from a torchvision checkpoint.
///
/// ``AuxLogits`` and ``fc`` tensors are ignored.
#[tracing::instrument(skip(device))]
pub fn load_inception_v3_backbone_record<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<InceptionV3BackboneRecord<B>> {
    load_pytorch_record::<B, _>(path, &INCEPTION_V3_KEY_REMAPS, device)
        .context("inception_v3 backbone checkpoint")
}

impl<B: Backend> InceptionV3Backbone<B> {
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
        let record = load_inception_v3_backbone_record::<B>(path, &device)?;
        Ok(self.load_record(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::basic_conv::{BasicConv2d, BasicConv2dConfig};
    use burn::backend::NdArray;
    use burn::prelude::Tensor;

    /// The stem conv and one mixed-block branch, named as in the backbone.
    #[derive(Module, Debug)]
    struct StemAndBranch<B: Backend> {
        conv2d_1a_3x3: BasicConv2d<B>,
        mixed_5b: Branch<B>,
    }

    #[derive(Module, Debug)]
    struct Branch<B: Backend> {
        branch1x1: BasicConv2d<B>,
    }

    fn values<const D: usize>(tensor: Tensor<NdArray<f32>, D>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_load_with_torchvision_casing() {
        type B = NdArray<f32>;
        let device = Default::default();

        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("testdata")
            .join("inception_v3_stem.pt");
        let record: StemAndBranchRecord<B> =
            load_pytorch_record::<B, _>(&path, &INCEPTION_V3_KEY_REMAPS, &device).unwrap();

        let module = StemAndBranch {
            conv2d_1a_3x3: BasicConv2dConfig::new(1, 2, [3, 3]).init::<B>(&device),
            mixed_5b: Branch {
                branch1x1: BasicConv2dConfig::new(2, 3, [1, 1]).init(&device),
            },
        }
        .load_record(record);

        let stem = &module.conv2d_1a_3x3;
        assert_eq!(values(stem.conv.weight.val()), vec![0.5; 2 * 9]);
        assert_eq!(values(stem.bn.gamma.val()), vec![1.25; 2]);
        assert_eq!(values(stem.bn.beta.val()), vec![0.5; 2]);
        assert_eq!(values(stem.bn.running_mean.value()), vec![0.125; 2]);
        assert_eq!(values(stem.bn.running_var.value()), vec![4.0; 2]);

        let branch = &module.mixed_5b.branch1x1;
        assert_eq!(values(branch.conv.weight.val()), vec![-0.25; 3 * 2]);
        assert_eq!(values(branch.bn.gamma.val()), vec![0.75; 3]);
        assert_eq!(values(branch.bn.beta.val()), vec![-0.5; 3]);
    }
}
