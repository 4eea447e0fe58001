// Copyright The imgcrypt-rs Authors.
// SPDX-License-Identifier: Apache-2.0

use oci_spec::image::Platform;

/// LayerInfo holds information about an image layer
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerInfo {
    /// The index of the layer starting at 0
    pub id: u32,

    pub digest: String,

    pub size: u64,

    /// Key wrapping schemes the layer key is wrapped with, e.g. `jwe`
    pub encryption: Vec<String>,

    /// Informational recipients reported by the schemes
    pub recipients: Vec<String>,
}

impl LayerInfo {
    pub fn is_encrypted(&self) -> bool {
        !self.encryption.is_empty()
    }
}

/// LayerFilter holds criteria for which layer to select
#[derive(Clone, Debug, Default)]
pub struct LayerFilter {
    /// Indices of layers to touch; may be negative to count from the
    /// topmost layer (-1). Empty means all layers.
    pub layers: Vec<i32>,

    /// Platforms to touch; empty means all platforms
    pub platforms: Vec<Platform>,
}

impl LayerFilter {
    /// Whether the layer at `index` of an image with `total` layers is
    /// selected.
    pub fn is_layer_selected(&self, index: usize, total: usize) -> bool {
        if self.layers.is_empty() {
            return true;
        }

        self.layers.iter().any(|&layer| {
            let resolved = if layer < 0 {
                total as i64 + layer as i64
            } else {
                layer as i64
            };
            resolved == index as i64
        })
    }

    /// Whether layers of `platform` are selected. A filter platform without
    /// a variant matches every variant.
    pub fn is_platform_selected(&self, platform: &Platform) -> bool {
        if self.platforms.is_empty() {
            return true;
        }

        self.platforms.iter().any(|wanted| {
            wanted.os() == platform.os()
                && wanted.architecture() == platform.architecture()
                && (wanted.variant().is_none() || wanted.variant() == platform.variant())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oci_spec::image::{Arch, Os, PlatformBuilder};
    use rstest::rstest;

    fn platform(arch: Arch, variant: Option<&str>) -> Platform {
        let mut builder = PlatformBuilder::default().os(Os::Linux).architecture(arch);
        if let Some(variant) = variant {
            builder = builder.variant(variant);
        }
        builder.build().unwrap()
    }

    #[rstest]
    #[case(vec![], 0, true)]
    #[case(vec![], 4, true)]
    #[case(vec![0], 0, true)]
    #[case(vec![0], 1, false)]
    #[case(vec![-1], 4, true)]
    #[case(vec![-1], 3, false)]
    #[case(vec![-5], 0, true)]
    #[case(vec![-6], 0, false)]
    #[case(vec![1, -2], 3, true)]
    #[case(vec![7], 4, false)]
    fn test_layer_selection(#[case] layers: Vec<i32>, #[case] index: usize, #[case] selected: bool) {
        let filter = LayerFilter {
            layers,
            ..Default::default()
        };
        assert_eq!(filter.is_layer_selected(index, 5), selected);
    }

    #[test]
    fn test_platform_selection() {
        let amd64 = platform(Arch::Amd64, None);
        let arm_v7 = platform(Arch::ARM, Some("v7"));
        let arm_v6 = platform(Arch::ARM, Some("v6"));

        assert!(LayerFilter::default().is_platform_selected(&amd64));

        let filter = LayerFilter {
            platforms: vec![amd64.clone(), arm_v7.clone()],
            ..Default::default()
        };
        assert!(filter.is_platform_selected(&amd64));
        assert!(filter.is_platform_selected(&arm_v7));
        assert!(!filter.is_platform_selected(&arm_v6));

        let filter = LayerFilter {
            platforms: vec![platform(Arch::ARM, None)],
            ..Default::default()
        };
        assert!(filter.is_platform_selected(&arm_v6));
        assert!(!filter.is_platform_selected(&amd64));
    }

    #[test]
    fn test_layer_info() {
        let mut info = LayerInfo::default();
        assert!(!info.is_encrypted());
        info.encryption.push("jwe".to_string());
        assert!(info.is_encrypted());
    }
}
