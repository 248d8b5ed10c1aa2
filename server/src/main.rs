//! DermaCare API server

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::{info, warn};

use dermacare::utils::logging::{init_logging, LogConfig};
use dermacare::{backend::backend_name, default_device, load_predictor, InferenceBackend};
use dermacare_server::analysis::MockAnalyzer;
use dermacare_server::auth::TokenKeys;
use dermacare_server::config::Cli;
use dermacare_server::google::{GoogleJwksVerifier, GoogleVerifier};
use dermacare_server::store::MemoryStore;
use dermacare_server::{router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    init_logging(&log_config)?;

    println!("{}", "DermaCare API".green().bold());
    info!("Backend: {}", backend_name());

    let artifacts = cli.artifacts();
    let device = default_device();
    let predictor = load_predictor::<InferenceBackend>(&artifacts, &device)
        .with_context(|| format!("failed to load model from {:?}", artifacts.weights))?;

    let config = cli.server_config();
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create upload dir {:?}", config.upload_dir))?;

    let google: Option<Arc<dyn GoogleVerifier>> = match &cli.google_client_id {
        Some(client_id) => Some(Arc::new(GoogleJwksVerifier::new(client_id.clone()))),
        None => {
            warn!("GOOGLE_CLIENT_ID not set, Google sign-in disabled");
            None
        }
    };

    let state = AppState::new(
        config,
        predictor,
        Arc::new(MemoryStore::new()),
        TokenKeys::new(&cli.secret_key, cli.token_ttl_hours),
        google,
        Arc::new(MockAnalyzer),
    )
    .shared();

    let addr = cli.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
