#[cfg(feature = "accelerate")]
extern crate accelerate_src;

#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

pub mod device_map;
pub mod encode;
pub mod handle;
pub mod loader;
mod loader_factory;
mod util;

mod stable_diffusion;

pub use device_map::*;
pub use encode::*;
pub use handle::*;
pub use loader::*;
pub use loader_factory::*;
pub use stable_diffusion::{StableDiffusionLoader, StableDiffusionModel, StableDiffusionVersion};
pub(crate) use util::*;

use anyhow::ensure;
use image::DynamicImage;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};

fn default_num_inference_steps() -> i64 {
    1
}

/// Accepts any JSON integer, plus floats with no fractional part.
fn integral<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(i64),
        Float(f64),
    }

    match Number::deserialize(deserializer)? {
        Number::Int(n) => Ok(n),
        Number::Float(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
            Ok(f as i64)
        }
        Number::Float(f) => Err(D::Error::custom(format!("expected an integer, got {f}"))),
    }
}

/// A single text-to-image generation request.
///
/// Only `prompt` is required. Omitted fields give a single step without
/// classifier-free guidance.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default = "default_num_inference_steps", deserialize_with = "integral")]
    pub num_inference_steps: i64,
    #[serde(default)]
    pub guidance_scale: f64,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            num_inference_steps: default_num_inference_steps(),
            guidance_scale: 0.0,
        }
    }

    /// The number of denoising steps, which must be at least one.
    pub fn steps(&self) -> anyhow::Result<usize> {
        let steps = self.num_inference_steps;
        ensure!(steps > 0, "num_inference_steps must be at least 1, got {steps}");
        Ok(usize::try_from(steps)?)
    }

    /// Classifier-free guidance only kicks in above a scale of 1.
    pub fn uses_guidance(&self) -> bool {
        self.guidance_scale > 1.0
    }
}

pub trait ModelLike: Send + Sync {
    fn run(&self, request: &GenerationRequest) -> anyhow::Result<DynamicImage>;
}

/// Runs `request` against `model` and returns the image as a JPEG data URL.
pub fn generate_data_url(model: &dyn ModelLike, request: &GenerationRequest) -> anyhow::Result<String> {
    let image = model.run(request)?;
    image_to_jpeg_data_url(&image)
}
