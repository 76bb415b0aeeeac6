use anyhow::{Context, Result};
use clap::Parser;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod auth;
mod client;
mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use client::{
    publish::{ClientError, Publisher},
    session::OwnerSession,
    staging::{MemoryStagingCache, StagingArea, is_browser_playable},
    transcode::Passthrough,
};
use config::{AppConfig, Cli, ClientConfig, Command, ServeArgs};
use services::{catalog::create_catalog, gateway::MediaGateway, storage::create_backend};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => serve(AppConfig::from_env_and_args(args)?).await,
        Command::Publish(args) => {
            let publisher = publisher(ClientConfig::from_env_and_args(args.client))?;
            let staging = StagingArea::new(MemoryStagingCache::default(), Passthrough);
            let mut staged = staging
                .stage_file(&args.file, args.name.as_deref())
                .await
                .with_context(|| format!("staging {}", args.file.display()))?;
            if !is_browser_playable(&staged.content_type) {
                match staging.transcode(&staged.id, |percent| {
                    tracing::info!(percent, "transcoding to mp4");
                }) {
                    Ok(converted) => staged = converted,
                    Err(err) => tracing::warn!(error = %err, "publishing the original file"),
                }
            }
            let published = publisher.publish(&staged).await.map_err(explain)?;
            staging.mark_published(&staged.id, &published.url)?;
            println!("{}\t{}", published.name, published.url);
            Ok(())
        }
        Command::List(args) => {
            let publisher = publisher(ClientConfig::from_env_and_args(args))?;
            for movie in publisher.list().await.map_err(explain)? {
                println!("{}\t{}", movie.name, movie.url);
            }
            Ok(())
        }
        Command::Delete(args) => {
            let publisher = publisher(ClientConfig::from_env_and_args(args.client))?;
            publisher.delete(&args.name).await.map_err(explain)?;
            println!("deleted {}", args.name);
            Ok(())
        }
    }
}

async fn serve(cfg: AppConfig) -> Result<()> {
    tracing::info!("Starting movie host with config: {:?}", cfg);
    if cfg.owner_secret.is_none() {
        tracing::warn!("OWNER_HASH is not set; every owner request will be rejected");
    }

    // --- Storage + catalog ---
    let backend = create_backend(&cfg)
        .await
        .context("initialising storage backend")?;
    let catalog = create_catalog(&backend, cfg.catalog_file.clone());
    let state = AppState {
        gateway: Arc::new(MediaGateway::new(backend, catalog)),
        owner: auth::OwnerGuard::new(cfg.owner_secret.clone()),
        max_upload_bytes: cfg.max_upload_bytes,
    };

    // --- Build router ---
    let app = routes::routes::routes(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Client session: signed in when OWNER_PASSPHRASE or OWNER_HASH is set.
fn publisher(cfg: ClientConfig) -> Result<Publisher> {
    let mut session = OwnerSession::new(cfg.server_url);
    if let Some(passphrase) = cfg.owner_passphrase {
        session.sign_in(&passphrase);
    } else if let Some(hash) = cfg.owner_secret {
        session.sign_in_with_hash(hash);
    }
    Ok(Publisher::new(session)?)
}

fn explain(err: ClientError) -> anyhow::Error {
    match err {
        ClientError::Unauthorized => {
            anyhow::anyhow!("server rejected the owner credential; check OWNER_PASSPHRASE or OWNER_HASH")
        }
        other => other.into(),
    }
}
