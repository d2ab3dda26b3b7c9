//! repocdn - serve files committed to a GitHub repository as a CDN
//!
//! Keeps an in-memory index of the repository's files, refreshed on a
//! timer, and exposes upload, serve and admin endpoints over HTTP.

mod cache;
mod config;
mod github;
mod http;
mod service;
mod store;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cache::{CdnBase, MetadataCache, RefreshTask, ResyncOutcome, Resyncer};
use config::{Args, Backend, Command, Config};
use github::GitHubClient;
use http::AppState;
use service::CdnService;
use store::{MemoryStore, RemoteStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_args(Args::parse())?;

    let store: Arc<dyn RemoteStore> = match (config.backend, config.github.clone()) {
        (Backend::Github, Some(settings)) => {
            Arc::new(GitHubClient::new(settings).context("Failed to build GitHub client")?)
        }
        (Backend::Github, None) => anyhow::bail!("github backend selected without settings"),
        (Backend::Memory, _) => {
            warn!("Using the in-memory backend, files are lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let base = CdnBase::new(&config.cdn_domain);
    let cache = Arc::new(MetadataCache::new());
    let resyncer = Arc::new(Resyncer::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        base.clone(),
        config.sync_paths.clone(),
    ));
    let service = Arc::new(CdnService::new(
        store,
        Arc::clone(&cache),
        Arc::clone(&resyncer),
        base,
        &config.upload_dir,
    ));

    match config.command {
        Command::Serve => serve(config, service, resyncer).await,
        Command::List => {
            if service.resync().await == ResyncOutcome::Kept {
                anyhow::bail!("Could not list the remote repository");
            }
            if cache.is_empty() {
                println!("No files indexed.");
            }
            for entry in cache.list() {
                println!("{:>10}  {}  {}", entry.size, entry.path, entry.public_url);
            }
            Ok(())
        }
    }
}

async fn serve(config: Config, service: Arc<CdnService>, resyncer: Arc<Resyncer>) -> Result<()> {
    info!(
        owner = %config.owner,
        repo = %config.repo,
        cdn = %service.cdn_base().as_str(),
        sync_paths = ?resyncer.sync_paths(),
        "Starting repocdn"
    );

    // A failed first resync is not fatal; requests populate the cache on demand
    if let ResyncOutcome::Replaced(count) = service.resync().await {
        info!(files = count, "Initial resync complete");
    }
    let refresh = RefreshTask::start(resyncer, config.resync_interval);

    let state = AppState {
        service,
        owner: config.owner.clone(),
        repo: config.repo.clone(),
    };
    let app = http::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr()))?;
    info!(addr = %listener.local_addr()?, "Listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    refresh.stop().await;
    info!("Shutdown complete");
    served.context("HTTP server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Received shutdown signal");
}
