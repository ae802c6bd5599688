use candle_transformers::models::stable_diffusion::StableDiffusionConfig;

use crate::Precision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StableDiffusionVersion {
    V1_5,
    V2_1,
    Xl,
    Turbo,
}

impl StableDiffusionVersion {
    pub fn repo(&self) -> &'static str {
        match self {
            Self::Turbo => "stabilityai/sdxl-turbo",
            Self::Xl => "stabilityai/stable-diffusion-xl-base-1.0",
            Self::V2_1 => "stabilityai/stable-diffusion-2-1",
            Self::V1_5 => "benjamin-paine/stable-diffusion-v1-5",
        }
    }

    /// SDXL-family checkpoints condition on two text encoders.
    pub fn is_xl(&self) -> bool {
        matches!(self, Self::Xl | Self::Turbo)
    }

    pub fn vae_scale(&self) -> f64 {
        match self {
            Self::V1_5 | Self::V2_1 | Self::Xl => 0.18215,
            Self::Turbo => 0.13025,
        }
    }

    pub fn config(
        &self,
        sliced_attention_size: Option<usize>,
        height: Option<usize>,
        width: Option<usize>,
    ) -> StableDiffusionConfig {
        match self {
            Self::V1_5 => StableDiffusionConfig::v1_5(sliced_attention_size, height, width),
            Self::V2_1 => StableDiffusionConfig::v2_1(sliced_attention_size, height, width),
            Self::Xl => StableDiffusionConfig::sdxl(sliced_attention_size, height, width),
            Self::Turbo => StableDiffusionConfig::sdxl_turbo(sliced_attention_size, height, width),
        }
    }
}

/// A file the pipeline needs, resolved to a hub repository and path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFile {
    Tokenizer,
    Tokenizer2,
    Clip,
    Clip2,
    Unet,
    Vae,
}

impl ModelFile {
    pub fn locate(
        &self,
        version: StableDiffusionVersion,
        precision: Precision,
    ) -> (&'static str, &'static str) {
        let half = precision.is_half();
        match self {
            Self::Tokenizer => {
                let repo = if version.is_xl() {
                    "openai/clip-vit-large-patch14"
                } else {
                    "openai/clip-vit-base-patch32"
                };
                (repo, "tokenizer.json")
            }
            Self::Tokenizer2 => ("laion/CLIP-ViT-bigG-14-laion2B-39B-b160k", "tokenizer.json"),
            Self::Clip => (
                version.repo(),
                pick(half, "text_encoder/model.fp16.safetensors", "text_encoder/model.safetensors"),
            ),
            Self::Clip2 => (
                version.repo(),
                pick(
                    half,
                    "text_encoder_2/model.fp16.safetensors",
                    "text_encoder_2/model.safetensors",
                ),
            ),
            Self::Unet => (
                version.repo(),
                pick(
                    half,
                    "unet/diffusion_pytorch_model.fp16.safetensors",
                    "unet/diffusion_pytorch_model.safetensors",
                ),
            ),
            // The stock SDXL VAE overflows in f16.
            Self::Vae if half && version.is_xl() => (
                "madebyollin/sdxl-vae-fp16-fix",
                "diffusion_pytorch_model.safetensors",
            ),
            Self::Vae => (
                version.repo(),
                pick(
                    half,
                    "vae/diffusion_pytorch_model.fp16.safetensors",
                    "vae/diffusion_pytorch_model.safetensors",
                ),
            ),
        }
    }
}

fn pick(half: bool, fp16: &'static str, fp32: &'static str) -> &'static str {
    if half {
        fp16
    } else {
        fp32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turbo_half_precision_files() {
        let v = StableDiffusionVersion::Turbo;
        assert_eq!(
            ModelFile::Unet.locate(v, Precision::Half),
            ("stabilityai/sdxl-turbo", "unet/diffusion_pytorch_model.fp16.safetensors")
        );
        assert_eq!(
            ModelFile::Vae.locate(v, Precision::Half),
            ("madebyollin/sdxl-vae-fp16-fix", "diffusion_pytorch_model.safetensors")
        );
        assert_eq!(
            ModelFile::Tokenizer.locate(v, Precision::Half).0,
            "openai/clip-vit-large-patch14"
        );
    }

    #[test]
    fn turbo_full_precision_files() {
        let v = StableDiffusionVersion::Turbo;
        assert_eq!(
            ModelFile::Unet.locate(v, Precision::Full),
            ("stabilityai/sdxl-turbo", "unet/diffusion_pytorch_model.safetensors")
        );
        assert_eq!(
            ModelFile::Vae.locate(v, Precision::Full),
            ("stabilityai/sdxl-turbo", "vae/diffusion_pytorch_model.safetensors")
        );
        assert_eq!(
            ModelFile::Clip2.locate(v, Precision::Full),
            ("stabilityai/sdxl-turbo", "text_encoder_2/model.safetensors")
        );
    }

    #[test]
    fn sd15_keeps_its_own_vae_in_half_precision() {
        let v = StableDiffusionVersion::V1_5;
        assert!(!v.is_xl());
        assert_eq!(
            ModelFile::Vae.locate(v, Precision::Half).0,
            "benjamin-paine/stable-diffusion-v1-5"
        );
        assert_eq!(
            ModelFile::Tokenizer.locate(v, Precision::Half).0,
            "openai/clip-vit-base-patch32"
        );
    }

    #[test]
    fn vae_scale_per_version() {
        assert_eq!(StableDiffusionVersion::Turbo.vae_scale(), 0.13025);
        assert_eq!(StableDiffusionVersion::Xl.vae_scale(), 0.18215);
    }

    #[test]
    fn turbo_config_defaults_to_512() {
        let config = StableDiffusionVersion::Turbo.config(None, None, None);
        assert_eq!((config.height, config.width), (512, 512));
        assert!(config.clip2.is_some());
    }
}
