// crates/ctxmem-server/src/cli/serve.rs
// Engine initialization and the MCP stdio main loop.

use anyhow::Result;
use ctxmem::config::EngineConfig;
use ctxmem::embedder::Embedder;
use ctxmem::graph::RelationshipGraph;
use ctxmem::mcp::ContextServer;
use ctxmem::service::ContextService;
use ctxmem::store::MessageStore;
use ctxmem::summarizer::ExtractiveSummarizer;
use ctxmem::vector::TieredVectorStore;
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(feature = "local-embedder")]
fn build_embedder(dimensions: usize) -> Arc<dyn Embedder> {
    // Loading is lazy and happens on first `embed()` call; a load failure
    // is logged there and the engine falls back to keyword search (§4.3).
    let _ = dimensions;
    Arc::new(ctxmem::embedder::LocalEmbedder::new())
}

#[cfg(not(feature = "local-embedder"))]
fn build_embedder(dimensions: usize) -> Arc<dyn Embedder> {
    info!("local-embedder feature disabled, serving in keyword-fallback mode only");
    Arc::new(ctxmem::embedder::NullEmbedder::new(dimensions))
}

/// Build every store and wire them into a `ContextService`. Shared by
/// `run_mcp_server` and `run_tool` so both paths see identical state.
pub async fn init_context_service() -> Result<ContextService> {
    let config = Arc::new(EngineConfig::load());
    info!(context_dir = %config.context_dir.display(), "starting context memory engine");

    let store = Arc::new(MessageStore::new(config.context_dir.join("messages")).await?);

    let vector = Arc::new(
        TieredVectorStore::new(
            config.context_dir.join("vectors"),
            config.vector_dimensions,
            config.vector_max_elements,
        )
        .await?,
    );

    let graph_dir = config.context_dir.join("graph");
    tokio::fs::create_dir_all(&graph_dir).await?;
    let graph = match RelationshipGraph::load(&graph_dir).await {
        Ok(graph) => graph,
        Err(e) => {
            warn!(error = %e, "no persisted relationship graph found, starting fresh");
            RelationshipGraph::new(&graph_dir)
        }
    };
    let graph = Arc::new(graph);

    let embedder = build_embedder(config.vector_dimensions);
    let summarizer = Arc::new(ExtractiveSummarizer);

    Ok(ContextService::new(
        store, vector, graph, embedder, summarizer, config,
    ))
}

/// Run the MCP server over stdio, with the optional HTTP side-channel.
pub async fn run_mcp_server() -> Result<()> {
    let service = init_context_service().await?;
    let config = service.config();

    if config.enable_http_server {
        let router = ctxmem::web::create_router(config.clone());
        let port = config.http_port;
        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
                Ok(listener) => listener,
                Err(e) => {
                    warn!("failed to bind HTTP side-channel on port {port}: {e}");
                    return;
                }
            };
            info!("HTTP side-channel listening on port {port}");
            if let Err(e) = axum::serve(listener, router).await {
                warn!("HTTP side-channel exited: {e}");
            }
        });
    }

    let server = ContextServer::new(service.clone());
    let transport = rmcp::transport::io::stdio();
    let running = rmcp::serve_server(server, transport).await?;

    tokio::select! {
        result = running.waiting() => {
            result?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, draining background tasks");
        }
    }

    service.shutdown().await;
    Ok(())
}

/// Resolves on SIGINT (all platforms) or SIGTERM (unix), whichever comes
/// first, so the server exits 0 on either (§6 "clean shutdown").
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let _ = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
