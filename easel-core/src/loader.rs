use std::future::Future;

use anyhow::Result;
use hf_hub::api::tokio::Api;

use crate::{ModelLike, ModelVariant, Placement};

/// Pipeline knobs that stay fixed across placement attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub height: Option<usize>,
    pub width: Option<usize>,
    pub sliced_attention_size: Option<usize>,
    pub use_flash_attn: bool,
}

pub trait Loader {
    type Model: ModelLike;

    fn load(
        variant: ModelVariant,
        api: Api,
        placement: Placement,
        options: PipelineOptions,
    ) -> impl Future<Output = Result<Self::Model>>
    where
        Self: Sized;
}
