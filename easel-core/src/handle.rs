//! The process-wide pipeline handle.
//!
//! A handle is built once at startup by walking an ordered list of
//! [`Placement`]s and keeping the first pipeline that loads. If none does,
//! the handle stays [`ModelHandle::Unavailable`] for the life of the process
//! and every request observes [`ModelUnavailable`].

use std::{future::Future, sync::Arc};

use anyhow::{anyhow, Result};
use hf_hub::api::tokio::Api;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{load_model, ModelLike, ModelVariant, PipelineOptions, Placement};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Model not initialized")]
pub struct ModelUnavailable;

#[derive(Clone)]
pub enum ModelHandle {
    Ready {
        model: Arc<dyn ModelLike>,
        placement: Placement,
    },
    Unavailable {
        reason: Arc<str>,
    },
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready { placement, .. } => {
                f.debug_struct("Ready").field("placement", placement).finish()
            }
            Self::Unavailable { reason } => {
                f.debug_struct("Unavailable").field("reason", reason).finish()
            }
        }
    }
}

impl ModelHandle {
    pub fn ready(model: Arc<dyn ModelLike>, placement: Placement) -> Self {
        Self::Ready { model, placement }
    }

    pub fn unavailable(reason: impl Into<Arc<str>>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Loads `model_name` trying each placement in order.
    ///
    /// Never fails: an unsupported name, a hub client error, or every attempt
    /// failing all end in an unavailable handle.
    pub async fn initialize(
        model_name: &str,
        placements: &[Placement],
        options: PipelineOptions,
    ) -> Self {
        let Some(variant) = ModelVariant::from_name(model_name) else {
            let reason = format!("Unsupported model: {model_name}");
            error!("{reason}");
            return Self::unavailable(reason);
        };

        let api = match Api::new() {
            Ok(api) => api,
            Err(e) => {
                let reason = format!("failed to create hf hub API: {e}");
                error!("{reason}");
                return Self::unavailable(reason);
            }
        };

        Self::initialize_with(placements, |placement| {
            load_model(variant, api.clone(), placement, options)
        })
        .await
    }

    /// Walks `placements` in order, calling `load` once per placement until one
    /// succeeds.
    pub async fn initialize_with<F, Fut>(placements: &[Placement], mut load: F) -> Self
    where
        F: FnMut(Placement) -> Fut,
        Fut: Future<Output = Result<Arc<dyn ModelLike>>>,
    {
        let mut last_error = anyhow!("no placement to load the model on");

        for (attempt, &placement) in placements.iter().enumerate() {
            match load(placement).await {
                Ok(model) => {
                    info!(%placement, "model loaded");
                    return Self::ready(model, placement);
                }
                Err(e) if attempt + 1 < placements.len() => {
                    warn!(%placement, "error loading model: {e:#}; trying next placement");
                    last_error = e;
                }
                Err(e) => {
                    error!(%placement, "critical error loading model: {e:#}");
                    last_error = e;
                }
            }
        }

        Self::unavailable(format!("{last_error:#}"))
    }

    /// The loaded pipeline, or [`ModelUnavailable`].
    pub fn model(&self) -> Result<&Arc<dyn ModelLike>, ModelUnavailable> {
        match self {
            Self::Ready { model, .. } => Ok(model),
            Self::Unavailable { .. } => Err(ModelUnavailable),
        }
    }

    pub fn placement(&self) -> Option<Placement> {
        match self {
            Self::Ready { placement, .. } => Some(*placement),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}
