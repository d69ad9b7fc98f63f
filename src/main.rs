use std::path::PathBuf;

use argh::FromArgs;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use monokit_api::config::{Config, Context};
use monokit_api::{database, http};

/// Control-plane server for monokit-managed hosts.
#[derive(FromArgs)]
struct Args {
    /// path to the TOML config file
    #[argh(option)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    let config = Config::load(args.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log.filter.clone())),
        )
        .with(fmt::layer())
        .init();

    database::run_migrations(&config.database.url)?;

    let ctx = Context::new(config).await?;
    ctx.bootstrap().await?;

    let addr = ctx.config.http.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, http::server(ctx.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain the log buffer before the process goes away.
    ctx.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for shutdown signal: {err}");
    }
}
