use anyhow::Context;
use memgate::api::{self, app_state::AppState};
use memgate::config::config::GatewayConfig;
use memgate::config::loader::ConfigLoader;
use memgate::engine::EngineHandle;
use memgate::observability::init_tracing;
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("invalid configuration")?;
    init_tracing(&config.logging)?;
    for warning in &config.warnings {
        warn!("{}", warning);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    info!("Starting memgate {}...", env!("CARGO_PKG_VERSION"));
    info!(
        "Engine providers: vector_store={}, llm={}, embedder={}",
        config.engine.vector_store.provider, config.engine.llm.provider, config.engine.embedder.provider
    );

    let engine = EngineHandle::start(config.engine.clone())
        .await
        .context("failed to initialize memory engine")?;
    info!("Memory engine initialized");

    let router = api::create_router(AppState::new(engine));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(
        "Server listening on {} ({} worker threads)",
        addr, config.server.workers
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
