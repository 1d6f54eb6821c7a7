use std::net::SocketAddr;
use std::sync::Arc;

use pic_relay::{create_router, AppState, BackendKind, Config, GitHubBackend, MemoryBackend, StorageBackend};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pic_relay=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    for issue in config.issues() {
        warn!("configuration issue: {}", issue);
    }

    let backend: Arc<dyn StorageBackend> = match config.server.backend {
        BackendKind::GitHub => Arc::new(GitHubBackend::new(&config.repository)?),
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
    };
    info!(
        backend = %backend.identifier(),
        repo = %format!("{}/{}@{}", config.repository.owner, config.repository.name, config.repository.branch),
        "storage backend ready"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = create_router(AppState::new(config, backend));

    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
