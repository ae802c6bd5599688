use anyhow::Result;
use clap::Parser;
use easel_core::ModelHandle;
use tokio::{self, net::TcpListener};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod args;
mod routes;

use args::Args;
use routes::{app, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // The listener is bound only once loading has finished, so no request can
    // observe a model that is still loading.
    let handle =
        ModelHandle::initialize(&args.model, &args.placements(), args.pipeline_options()).await;
    match handle.placement() {
        Some(placement) => info!(model = %args.model, %placement, "model ready"),
        None => warn!(model = %args.model, "model unavailable, generation requests will fail"),
    }

    let app = app(AppState {
        model_name: args.model.clone(),
        handle,
    });

    // --- Start the server ---
    let listener = TcpListener::bind(args.bind_address()).await?;
    info!("started server on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down");
}
