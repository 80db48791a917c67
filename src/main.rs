//! VaultKV - A Multi-Tenant In-Memory Key-Value Store
//!
//! Server binary: reads configuration from the environment, starts the
//! TCP and HTTP transports over one bucket manager, and shuts both down
//! gracefully on Ctrl+C.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info};

use vaultkv::auth::TokenAuthenticator;
use vaultkv::bucket::BucketManager;
use vaultkv::commands::CommandHandler;
use vaultkv::config::Config;
use vaultkv::connection::{ConnectionStats, TcpServer};
use vaultkv::http::{self, AppState};

/// How long shutdown waits for open connections before aborting them.
const STOP_DEADLINE: Duration = Duration::from_secs(10);

fn init_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    if config.logging.environment == "production" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}

fn print_banner(config: &Config) {
    println!(
        r#"
 __     __          _ _   _  ____   __
 \ \   / /_ _ _   _| | |_| |/ /\ \ / /
  \ \ / / _` | | | | | __| ' /  \ V /
   \ V / (_| | |_| | | |_| . \   | |
    \_/ \__,_|\__,_|_|\__|_|\_\  |_|

VaultKV v{} - Multi-Tenant In-Memory Key-Value Store
────────────────────────────────────────────────────
TCP  on port {}
HTTP on port {}

Use Ctrl+C to shut down gracefully.
"#,
        vaultkv::VERSION,
        config.server.tcp_port,
        config.server.http_port,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_logging(&config);
    print_banner(&config);

    // One bucket manager behind both transports
    let buckets = Arc::new(BucketManager::new(config.store.shard_count));
    let tokens = Arc::new(TokenAuthenticator::new(config.auth.token_secret.clone()));
    info!(
        default_shard_count = config.store.shard_count,
        "storage engine initialized"
    );

    let handler = CommandHandler::new(Arc::clone(&buckets), Some(Arc::clone(&tokens)));
    let stats = Arc::new(ConnectionStats::new());

    let tcp_addr = format!("0.0.0.0:{}", config.server.tcp_port);
    let tcp_server = TcpServer::start(&tcp_addr, handler, Arc::clone(&stats)).await?;

    let state = AppState {
        buckets: Arc::clone(&buckets),
        tokens: Some(tokens),
    };
    let app = http::router(state);
    let http_listener =
        tokio::net::TcpListener::bind(("0.0.0.0", config.server.http_port)).await?;
    info!(port = config.server.http_port, "http server listening");

    let (http_shutdown_tx, http_shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let http_task = tokio::spawn(async move {
        let serve = axum::serve(http_listener, app).with_graceful_shutdown(async {
            let _ = http_shutdown_rx.await;
        });
        if let Err(e) = serve.await {
            error!(error = %e, "http server error");
        }
    });

    signal::ctrl_c().await?;
    info!("shutdown signal received, stopping servers");

    let _ = http_shutdown_tx.send(());
    let _ = http_task.await;
    tcp_server.stop(STOP_DEADLINE).await;
    buckets.shutdown();

    info!("server shutdown complete");
    Ok(())
}
