use anyhow::Result;
use hf_hub::api::tokio::Api;
use tracing::info;

use crate::{Loader, ModelLike, PipelineOptions, Placement, StableDiffusionLoader};
use std::sync::Arc;

use crate::stable_diffusion::StableDiffusionVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    StableDiffusion(StableDiffusionVersion),
}

impl ModelVariant {
    /// Detect model variant from model name
    pub fn from_name(model_name: &str) -> Option<Self> {
        let name_upper = model_name.to_uppercase();

        let version = if name_upper.contains("TURBO") {
            StableDiffusionVersion::Turbo
        } else if name_upper.contains("XL") {
            StableDiffusionVersion::Xl
        } else if name_upper.contains("2-1") || name_upper.contains("2.1") {
            StableDiffusionVersion::V2_1
        } else if name_upper.contains("1-5") || name_upper.contains("1.5") {
            StableDiffusionVersion::V1_5
        } else {
            return None;
        };
        Some(ModelVariant::StableDiffusion(version))
    }
}

/// Load a model variant at one placement.
pub async fn load_model(
    variant: ModelVariant,
    api: Api,
    placement: Placement,
    options: PipelineOptions,
) -> Result<Arc<dyn ModelLike>> {
    info!(?variant, %placement, "loading model");

    match variant {
        ModelVariant::StableDiffusion(_) => {
            let model = StableDiffusionLoader::load(variant, api, placement, options).await?;
            Ok(Arc::new(model))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_versions_from_names() {
        let cases = [
            ("stabilityai/sdxl-turbo", StableDiffusionVersion::Turbo),
            ("SDXL-Turbo", StableDiffusionVersion::Turbo),
            ("stabilityai/stable-diffusion-xl-base-1.0", StableDiffusionVersion::Xl),
            ("stabilityai/stable-diffusion-2-1", StableDiffusionVersion::V2_1),
            ("benjamin-paine/stable-diffusion-v1-5", StableDiffusionVersion::V1_5),
        ];
        for (name, version) in cases {
            assert_eq!(
                ModelVariant::from_name(name),
                Some(ModelVariant::StableDiffusion(version)),
                "{name}"
            );
        }
    }

    #[test]
    fn unknown_names_are_unsupported() {
        assert_eq!(ModelVariant::from_name("black-forest-labs/FLUX.1-schnell"), None);
        assert_eq!(ModelVariant::from_name(""), None);
    }
}
