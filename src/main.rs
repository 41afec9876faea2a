use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ihighlight::auth::{GoogleIdentityProvider, TokenIssuer};
use ihighlight::config::{Cli, Config};
use ihighlight::graph::SqliteGraphRepository;
use ihighlight::mailer::SmtpMailer;
use ihighlight::state::AppState;
use ihighlight::{db, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let mailer = SmtpMailer::new(&config.email)?;
    let identity = GoogleIdentityProvider::new(&config.federation)?;
    if config.federation.google_client_id.is_none() {
        tracing::warn!("federation.google_client_id not set; Google sign-in will be rejected");
    }

    // Build app state
    let state = AppState {
        db: pool.clone(),
        tokens: TokenIssuer::new(&config.auth),
        graph: Arc::new(SqliteGraphRepository::new(pool)),
        mailer: Arc::new(mailer),
        identity: Arc::new(identity),
        config: config.clone(),
    };

    let app = routes::router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
