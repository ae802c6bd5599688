use clap::Parser;
use easel_core::{PipelineOptions, Placement};

fn multiple_of_eight(value: &str) -> Result<usize, String> {
    let size: usize = value
        .parse()
        .map_err(|e| format!("`{value}` is not a valid size: {e}"))?;
    if size == 0 || size % 8 != 0 {
        return Err(format!("{size} is not a positive multiple of 8"));
    }
    Ok(size)
}

// Define command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Easel image generation server")]
pub struct Args {
    /// Skip the accelerator and load full-precision weights on the CPU
    #[arg(long, env = "EASEL_CPU")]
    pub cpu: bool,

    /// Accelerator ordinal tried before falling back to the CPU
    #[arg(long, default_value_t = 0, env = "EASEL_DEVICE_ORDINAL")]
    pub device_ordinal: usize,

    /// Hub repository of the model to serve
    #[arg(long, default_value = "stabilityai/sdxl-turbo", env = "EASEL_MODEL")]
    pub model: String,

    /// Image height in pixels, defaults to the model's native size
    #[arg(long, value_parser = multiple_of_eight, env = "EASEL_HEIGHT")]
    pub height: Option<usize>,

    /// Image width in pixels, defaults to the model's native size
    #[arg(long, value_parser = multiple_of_eight, env = "EASEL_WIDTH")]
    pub width: Option<usize>,

    /// Size of the sliced attention, 0 for automatic slicing
    #[arg(long, env = "EASEL_SLICED_ATTENTION_SIZE")]
    pub sliced_attention_size: Option<usize>,

    /// Use flash attention in the UNet (needs the `flash-attn` feature)
    #[arg(long, env = "EASEL_USE_FLASH_ATTN")]
    pub use_flash_attn: bool,

    /// Host address to bind the server to
    #[arg(long, default_value = "0.0.0.0", env = "EASEL_HOST")]
    pub host: String,

    /// Port to bind the server to
    #[arg(long, default_value_t = 8000, env = "EASEL_PORT")]
    pub port: u16,
}

impl Args {
    pub fn placements(&self) -> Vec<Placement> {
        Placement::fallback_chain(self.cpu, self.device_ordinal)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            height: self.height,
            width: self.width,
            sliced_attention_size: self.sliced_attention_size,
            use_flash_attn: self.use_flash_attn,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["easel-server"]).unwrap();
        assert_eq!(args.model, "stabilityai/sdxl-turbo");
        assert_eq!(args.bind_address(), "0.0.0.0:8000");
        assert_eq!(
            args.placements(),
            vec![Placement::accelerator(0), Placement::cpu()]
        );
        assert_eq!(args.pipeline_options(), PipelineOptions::default());
    }

    #[test]
    fn cpu_only() {
        let args =
            Args::try_parse_from(["easel-server", "--cpu", "--port", "9000", "--host", "127.0.0.1"])
                .unwrap();
        assert_eq!(args.placements(), vec![Placement::cpu()]);
        assert_eq!(args.bind_address(), "127.0.0.1:9000");
    }

    #[test]
    fn image_size_must_be_multiple_of_eight() {
        let args =
            Args::try_parse_from(["easel-server", "--height", "768", "--width", "1024"]).unwrap();
        let options = args.pipeline_options();
        assert_eq!((options.height, options.width), (Some(768), Some(1024)));

        assert!(Args::try_parse_from(["easel-server", "--height", "500"]).is_err());
        assert!(Args::try_parse_from(["easel-server", "--width", "0"]).is_err());
    }
}
