use std::sync::Arc;

use kobodeck::auth::UserDirectory;
use kobodeck::config::{Cli, Config, default_config_path};
use kobodeck::convert::ImageConverter;
use kobodeck::handler::AppState;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("failed to load .env file: {}", e);
        }
    }

    let config_path = args
        .config_path
        .map(std::path::PathBuf::from)
        .unwrap_or_else(default_config_path);

    let cfg = Config::new(&config_path.to_string_lossy()).unwrap_or_else(|e| {
        eprintln!("failed to load config file {:?}: {:#}", config_path, e);
        std::process::exit(1);
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.app.log_level));
    tracing_subscriber::fmt().json().with_env_filter(filter).init();
    tracing::info!(config = ?config_path, "kobodeck.svc starting");

    let backend_http = reqwest::Client::builder()
        .user_agent(concat!("kobodeck/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to build readeck http client");
            std::process::exit(1);
        });
    let users = Arc::new(UserDirectory::from_config(&cfg, backend_http).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup user directory");
        std::process::exit(1);
    }));

    let image_http = reqwest::Client::builder()
        .user_agent(concat!("kobodeck/", env!("CARGO_PKG_VERSION")))
        .timeout(cfg.images.timeout())
        .build()
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to build image http client");
            std::process::exit(1);
        });
    let images = Arc::new(ImageConverter::new(image_http, cfg.images.max_bytes).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to render placeholder images");
        std::process::exit(1);
    }));

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let cancellation_token = CancellationToken::new();

    let app = kobodeck::app(AppState { users, images });

    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            return;
        }
        tracing::info!("ctrl+c signal received, preparing to shutdown");
        shutdown_token.cancel();
    });

    tracing::info!("kobodeck.svc running on {}", &address);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(cancellation_token.cancelled_owned())
        .await;
    if let Err(err) = result {
        tracing::error!(error = %err, "server exited with an error");
        std::process::exit(1);
    }

    tracing::info!("kobodeck.svc going off, graceful shutdown complete");
}
