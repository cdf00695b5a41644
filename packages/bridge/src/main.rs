// packages/bridge/src/main.rs
//! VFS Bridge
//!
//! Serves a sandboxed preview from an in-memory project tree. The HTTP
//! front-end captures requests and forwards them to the resolver registered
//! with the interceptor.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vfs_bridge::observability::{init_metrics, init_tracing};
use vfs_bridge::{
    BridgeConfig, BuildInfo, HttpFrontend, Interceptor, ResolverEndpoint, SharedTree, VirtualFile,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = BridgeConfig::load().context("Failed to load configuration")?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.observability)?;
    init_metrics(&config.observability)?;

    let info = BuildInfo::current();
    info!(
        "Starting VFS Bridge v{} ({}, built with {})",
        info.version, info.git_hash, info.rustc_version
    );

    // Project tree
    let root = match &config.resolver.tree_path {
        Some(path) => {
            info!("Loading project tree from {}", path.display());
            VirtualFile::load(path)
                .with_context(|| format!("Failed to load tree from {}", path.display()))?
        }
        None => {
            info!("No tree_path configured, serving the demo project");
            VirtualFile::demo_project()
        }
    };
    let tree = Arc::new(SharedTree::new(root));

    let interceptor = Arc::new(Interceptor::new(config.interceptor.clone()));
    let shutdown = CancellationToken::new();

    // In-process resolver
    let endpoint = Arc::new(ResolverEndpoint::new(Arc::clone(&tree), config.resolver.clone()));
    let session = endpoint
        .register_with(&interceptor)
        .await
        .context("Failed to register resolver")?;
    info!("Resolver registered as {}", session.client_id());

    // Remote resolvers
    if let Some(addr) = config.server.resolver_addr()? {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind resolver listener on {}", addr))?;
        let interceptor = Arc::clone(&interceptor);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = interceptor.accept_remote_resolvers(listener, shutdown).await {
                error!("Resolver listener failed: {}", e);
            }
        });
    }

    let addr = config.server.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let frontend = Arc::new(HttpFrontend::new(Arc::clone(&interceptor)));
    let server = tokio::spawn(frontend.serve(listener, shutdown.clone()));

    // Graceful shutdown handler
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, cleaning up..."),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }
    shutdown.cancel();

    match server.await {
        Ok(Ok(())) => info!("Server stopped gracefully"),
        Ok(Err(e)) => error!("Server error: {}", e),
        Err(e) => error!("Server task failed: {}", e),
    }

    session.close().await;
    Ok(())
}
