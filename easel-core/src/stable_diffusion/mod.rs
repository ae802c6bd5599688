use std::{path::PathBuf, time::Instant};

use anyhow::{ensure, Context, Error, Result};
use candle_core::{DType, Device, IndexOp, Tensor, D};
use candle_nn::Module;
use candle_transformers::models::stable_diffusion::{
    build_clip_transformer, clip, unet_2d::UNet2DConditionModel, vae::AutoEncoderKL,
    StableDiffusionConfig,
};
use hf_hub::api::tokio::Api;
use image::DynamicImage;
use tokenizers::Tokenizer;
use tracing::{debug, info};

mod files;

pub use files::StableDiffusionVersion;
use files::ModelFile;

use crate::{
    describe_device, select_device, tensor_to_image, GenerationRequest, Loader, ModelLike,
    ModelVariant, PipelineOptions, Placement, Precision,
};

const EOS_TOKEN: &str = "<|endoftext|>";

/// A CLIP text encoder with its tokenizer.
struct TextEncoder {
    tokenizer: Tokenizer,
    model: clip::ClipTextTransformer,
    max_len: usize,
    pad_id: u32,
    eos_id: u32,
}

/// Cuts `tokens` to `max_len`, keeping the end-of-text token last, then pads.
fn fit_tokens(mut tokens: Vec<u32>, max_len: usize, eos_id: u32, pad_id: u32) -> Vec<u32> {
    if tokens.len() > max_len {
        tokens.truncate(max_len.saturating_sub(1));
        tokens.push(eos_id);
    }
    tokens.resize(max_len, pad_id);
    tokens
}

/// Combines the unconditional and text-conditioned halves of a guided batch.
fn apply_guidance(noise_pred: &Tensor, guidance_scale: f64) -> Result<Tensor> {
    let chunks = noise_pred.chunk(2, 0)?;
    let (uncond, text) = (&chunks[0], &chunks[1]);
    Ok((uncond + ((text - uncond)? * guidance_scale)?)?)
}

impl TextEncoder {
    async fn load(
        api: &Api,
        tokenizer_file: ModelFile,
        weights_file: ModelFile,
        config: &clip::Config,
        version: StableDiffusionVersion,
        device: &Device,
    ) -> Result<Self> {
        let tokenizer_filename = fetch(api, tokenizer_file, version, Precision::Full).await?;
        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(Error::msg)
            .context("failed to load CLIP tokenizer")?;
        let vocab = tokenizer.get_vocab(true);
        let eos_id = *vocab
            .get(EOS_TOKEN)
            .with_context(|| format!("{EOS_TOKEN:?} missing from the CLIP tokenizer"))?;
        let pad = config.pad_with.as_deref().unwrap_or(EOS_TOKEN);
        let pad_id = *vocab
            .get(pad)
            .with_context(|| format!("pad token {pad:?} missing from the CLIP tokenizer"))?;

        // CLIP always runs in f32.
        let weights = fetch(api, weights_file, version, Precision::Full).await?;
        let model = build_clip_transformer(config, weights, device, DType::F32)
            .context("failed to build CLIP transformer")?;

        Ok(Self {
            tokenizer,
            model,
            max_len: config.max_position_embeddings,
            pad_id,
            eos_id,
        })
    }

    fn encode(&self, prompt: &str, device: &Device) -> Result<Tensor> {
        let tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        let tokens = fit_tokens(tokens, self.max_len, self.eos_id, self.pad_id);
        let tokens = Tensor::new(tokens.as_slice(), device)?.unsqueeze(0)?;
        Ok(self.model.forward(&tokens)?)
    }
}

pub struct StableDiffusionModel {
    version: StableDiffusionVersion,
    device: Device,
    dtype: DType,
    config: StableDiffusionConfig,
    text_encoders: Vec<TextEncoder>,
    unet: UNet2DConditionModel,
    vae: AutoEncoderKL,
}

impl StableDiffusionModel {
    /// Prompt embeddings, with the empty-prompt embeddings stacked in front
    /// when classifier-free guidance is on.
    fn text_embeddings(&self, prompt: &str, use_guidance: bool) -> Result<Tensor> {
        let per_encoder = self
            .text_encoders
            .iter()
            .map(|encoder| {
                let cond = encoder.encode(prompt, &self.device)?;
                if use_guidance {
                    let uncond = encoder.encode("", &self.device)?;
                    Ok(Tensor::cat(&[uncond, cond], 0)?)
                } else {
                    Ok(cond)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Tensor::cat(&per_encoder, D::Minus1)?.to_dtype(self.dtype)?)
    }
}

impl ModelLike for StableDiffusionModel {
    fn run(&self, request: &GenerationRequest) -> Result<DynamicImage> {
        let steps = request.steps()?;
        let use_guidance = request.uses_guidance();

        let text_embeddings = self.text_embeddings(&request.prompt, use_guidance)?;

        let mut scheduler = self.config.build_scheduler(steps)?;
        let timesteps = scheduler.timesteps().to_vec();

        let latents = Tensor::randn(
            0f32,
            1f32,
            (1, 4, self.config.height / 8, self.config.width / 8),
            &self.device,
        )?;
        // scale the initial noise by the standard deviation required by the scheduler
        let mut latents = (latents * scheduler.init_noise_sigma())?.to_dtype(self.dtype)?;

        for (index, &timestep) in timesteps.iter().enumerate() {
            let start = Instant::now();
            let model_input = if use_guidance {
                Tensor::cat(&[&latents, &latents], 0)?
            } else {
                latents.clone()
            };
            let model_input = scheduler.scale_model_input(model_input, timestep)?;
            let noise_pred = self
                .unet
                .forward(&model_input, timestep as f64, &text_embeddings)?;
            let noise_pred = if use_guidance {
                apply_guidance(&noise_pred, request.guidance_scale)?
            } else {
                noise_pred
            };
            latents = scheduler.step(&noise_pred, timestep, &latents)?;
            debug!(step = index + 1, steps, elapsed = ?start.elapsed(), "denoising step done");
        }

        let image = self.vae.decode(&(&latents / self.version.vae_scale())?)?;
        let image = ((image / 2.)? + 0.5)?.to_device(&Device::Cpu)?;
        let image = (image.clamp(0f32, 1.)? * 255.)?.to_dtype(DType::U8)?.i(0)?;

        tensor_to_image(&image)
    }
}

async fn fetch(
    api: &Api,
    file: ModelFile,
    version: StableDiffusionVersion,
    precision: Precision,
) -> Result<PathBuf> {
    let (repo, path) = file.locate(version, precision);
    debug!(repo, path, "fetching weights");
    api.model(repo.to_string())
        .get(path)
        .await
        .with_context(|| format!("failed to get {path} from {repo}"))
}

pub struct StableDiffusionLoader;

impl Loader for StableDiffusionLoader {
    type Model = StableDiffusionModel;

    async fn load(
        variant: ModelVariant,
        api: Api,
        placement: Placement,
        options: PipelineOptions,
    ) -> Result<Self::Model> {
        let ModelVariant::StableDiffusion(version) = variant;

        for size in [options.height, options.width].into_iter().flatten() {
            ensure!(size % 8 == 0, "image dimensions must be multiples of 8, got {size}");
        }
        #[cfg(not(feature = "flash-attn"))]
        ensure!(
            !options.use_flash_attn,
            "flash attention requested but easel-core was built without the `flash-attn` feature"
        );

        let device = select_device(placement.device_map).context("failed to set up device")?;
        let dtype = placement.precision.dtype();
        info!(device = %describe_device(&device), ?dtype, ?version, "building pipeline");

        let config = version.config(options.sliced_attention_size, options.height, options.width);

        let mut text_encoders = vec![
            TextEncoder::load(
                &api,
                ModelFile::Tokenizer,
                ModelFile::Clip,
                &config.clip,
                version,
                &device,
            )
            .await?,
        ];
        if version.is_xl() {
            let clip2 = config
                .clip2
                .as_ref()
                .context("missing config for the second text encoder")?;
            text_encoders.push(
                TextEncoder::load(
                    &api,
                    ModelFile::Tokenizer2,
                    ModelFile::Clip2,
                    clip2,
                    version,
                    &device,
                )
                .await?,
            );
        }

        // --- Load Autoencoder ---
        let vae_weights = fetch(&api, ModelFile::Vae, version, placement.precision).await?;
        let vae = config
            .build_vae(vae_weights, &device, dtype)
            .context("failed to build autoencoder")?;

        // --- Load UNet ---
        let unet_weights = fetch(&api, ModelFile::Unet, version, placement.precision).await?;
        let unet = config
            .build_unet(unet_weights, &device, 4, options.use_flash_attn, dtype)
            .context("failed to build unet")?;

        Ok(StableDiffusionModel {
            version,
            device,
            dtype,
            config,
            text_encoders,
            unet,
            vae,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_prompt_is_padded() {
        assert_eq!(fit_tokens(vec![49406, 320, 49407], 5, 49407, 0), [49406, 320, 49407, 0, 0]);
    }

    #[test]
    fn long_prompt_keeps_end_of_text() {
        let tokens = vec![49406, 1, 2, 3, 4, 5, 49407];
        assert_eq!(fit_tokens(tokens, 4, 49407, 0), [49406, 1, 2, 49407]);
    }

    #[test]
    fn guidance_pushes_away_from_unconditional() {
        let uncond = Tensor::full(1f32, (1, 2), &Device::Cpu).unwrap();
        let text = Tensor::full(3f32, (1, 2), &Device::Cpu).unwrap();
        let batch = Tensor::cat(&[&uncond, &text], 0).unwrap();

        let guided = apply_guidance(&batch, 7.5).unwrap();
        assert_eq!(guided.dims(), [1, 2]);
        // 1 + (3 - 1) * 7.5
        assert_eq!(guided.to_vec2::<f32>().unwrap(), [[16.0, 16.0]]);
    }
}
