//! # Pretrained Weights

use crate::cache::disk::DiskCacheConfig;
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const X25: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_SDLC);

/// Build a cache key (bare cache file name) from a name and URL.
///
/// The key is ``{name}-{url crc hash}-{url basename}``.
pub fn url_to_cache_key(
    name: Option<&str>,
    url: &str,
) -> anyhow::Result<String> {
    let hash = X25.checksum(url.as_bytes()).to_string();
    let base_name = match url.rsplit_once('/') {
        Some((_, base)) if !base.is_empty() => base,
        _ => bail!("url has no file name: {url}"),
    };
    Ok(match name {
        Some(n) => format!("{n}-{hash}-{base_name}"),
        None => format!("{hash}-{base_name}"),
    })
}

/// Get the cache resource key for a pretrained weights file.
pub fn pretrained_weights_resource_key(cache_key: &str) -> Vec<String> {
    vec!["weights".to_string(), cache_key.to_string()]
}

/// Static descriptor of a published weights file.
#[derive(Debug)]
pub struct StaticPretrainedWeightsDescriptor<'a> {
    /// Name of the weights; ``{model}.{tag}``.
    pub name: &'a str,

    /// Description of the weights.
    pub description: &'a str,

    /// License.
    pub license: Option<&'a str>,

    /// Source URL.
    pub origin: Option<&'a str>,

    /// URL to download the weights from.
    pub url: &'a str,
}

impl StaticPretrainedWeightsDescriptor<'_> {
    /// The disk cache key.
    pub fn cache_key(&self) -> anyhow::Result<String> {
        url_to_cache_key(Some(self.name), self.url)
    }

    /// Read-through cache the weights.
    ///
    /// # Returns
    ///
    /// The disk location of the cached weights.
    pub fn fetch_weights_to_disk_cache(
        &self,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<PathBuf> {
        let resource = pretrained_weights_resource_key(&self.cache_key()?);
        disk_cache.fetch_resource(self.url, &resource)
    }
}

/// ResNet-50 torchvision ImageNet-1k weights (``IMAGENET1K_V2``).
pub static RESNET50_TV_IN1K: StaticPretrainedWeightsDescriptor = StaticPretrainedWeightsDescriptor {
    name: "resnet50.tv_in1k",
    description: "ResNet-50 pretrained on ImageNet-1k",
    license: Some("bsd-3-clause"),
    origin: Some("https://github.com/pytorch/vision"),
    url: "https://download.pytorch.org/models/resnet50-0676ba61.pth",
};

/// Inception-V3 torchvision ImageNet-1k weights, ported from TensorFlow.
pub static INCEPTION_V3_TV_IN1K: StaticPretrainedWeightsDescriptor =
    StaticPretrainedWeightsDescriptor {
        name: "inception_v3.tv_in1k",
        description: "Inception-V3 pretrained on ImageNet-1k",
        license: Some("apache-2.0"),
        origin: Some("https://github.com/pytorch/vision"),
        url: "https://download.pytorch.org/models/inception_v3_google-0cc3c7bd.pth",
    };

/// Source of backbone weights for the transfer models.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PretrainedWeights {
    /// The published ImageNet weights, through the disk cache.
    #[default]
    ImageNet,

    /// A local torch checkpoint.
    File(PathBuf),

    /// Random initialization; no I/O.
    None,
}

impl PretrainedWeights {
    /// Resolve to a local checkpoint path.
    ///
    /// # Arguments
    ///
    /// - `descriptor`: the published weights for [`PretrainedWeights::ImageNet`].
    /// - `disk_cache`: the cache to download through.
    ///
    /// # Returns
    ///
    /// `None` for [`PretrainedWeights::None`].
    pub fn try_resolve(
        &self,
        descriptor: &StaticPretrainedWeightsDescriptor,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<Option<PathBuf>> {
        match self {
            Self::ImageNet => Ok(Some(descriptor.fetch_weights_to_disk_cache(disk_cache)?)),
            Self::File(path) => {
                if !path.is_file() {
                    bail!("weights file not found: {}", path.display());
                }
                Ok(Some(path.clone()))
            }
            Self::None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hamcrest::prelude::*;

    #[test]
    fn test_url_to_cache_key() {
        let url = "https://download.pytorch.org/models/resnet50-0676ba61.pth";
        let hash = X25.checksum(url.as_bytes());

        assert_that!(
            url_to_cache_key(Some("resnet50.tv_in1k"), url).unwrap(),
            is(equal_to(format!("resnet50.tv_in1k-{hash}-resnet50-0676ba61.pth")))
        );
        assert_that!(
            url_to_cache_key(None, url).unwrap(),
            is(equal_to(format!("{hash}-resnet50-0676ba61.pth")))
        );

        assert!(url_to_cache_key(None, "no-slash").is_err());
        assert!(url_to_cache_key(None, "https://host/dir/").is_err());
    }

    #[test]
    fn test_static_descriptors() {
        for desc in [&RESNET50_TV_IN1K, &INCEPTION_V3_TV_IN1K] {
            let key = desc.cache_key().unwrap();
            assert!(key.starts_with(desc.name), "{key}");
            assert!(key.ends_with(".pth"), "{key}");
        }
        assert_ne!(
            RESNET50_TV_IN1K.cache_key().unwrap(),
            INCEPTION_V3_TV_IN1K.cache_key().unwrap()
        );
    }

    #[test]
    fn test_pretrained_weights_resolve_local() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCacheConfig::new().with_cache_dir(Some(dir.path().to_path_buf()));

        assert_eq!(
            PretrainedWeights::None
                .try_resolve(&RESNET50_TV_IN1K, &cache)
                .unwrap(),
            None
        );

        let missing = PretrainedWeights::File(dir.path().join("missing.pth"));
        assert!(missing.try_resolve(&RESNET50_TV_IN1K, &cache).is_err());

        let path = dir.path().join("local.pth");
        std::fs::write(&path, b"").unwrap();
        assert_eq!(
            PretrainedWeights::File(path.clone())
                .try_resolve(&RESNET50_TV_IN1K, &cache)
                .unwrap(),
            Some(path)
        );
    }

    #[test]
    fn test_pretrained_weights_resolve_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCacheConfig::new().with_cache_dir(Some(dir.path().to_path_buf()));

        // Pre-seed the cache so no download is attempted.
        let resource =
            pretrained_weights_resource_key(&INCEPTION_V3_TV_IN1K.cache_key().unwrap());
        let seeded = cache.ensure_resource_parent_dir(&resource).unwrap();
        std::fs::write(&seeded, b"").unwrap();

        assert_eq!(
            PretrainedWeights::ImageNet
                .try_resolve(&INCEPTION_V3_TV_IN1K, &cache)
                .unwrap(),
            Some(seeded)
        );
    }

    #[test]
    fn test_pretrained_weights_serde() {
        let json = serde_json::to_string(&PretrainedWeights::ImageNet).unwrap();
        assert_eq!(json, "\"ImageNet\"");
        let back: PretrainedWeights =
            serde_json::from_str(r#"{"File":"/tmp/w.pth"}"#).unwrap();
        assert_eq!(back, PretrainedWeights::File(PathBuf::from("/tmp/w.pth")));
    }
}
