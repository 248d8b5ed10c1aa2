//! Server configuration from flags and environment

use std::path::PathBuf;

use clap::Parser;

use dermacare::inference::loader::{LABELS_FILE, WEIGHTS_FILE};
use dermacare::ModelArtifacts;

#[derive(Parser, Debug, Clone)]
#[command(name = "dermacare-server")]
#[command(author, version, about = "DermaCare skin analysis API")]
pub struct Cli {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value = "5000")]
    pub port: u16,

    /// Model weights (.mpk)
    #[arg(long, env = "DERMACARE_MODEL", default_value = WEIGHTS_FILE)]
    pub model: PathBuf,

    /// Class names JSON written next to the weights
    #[arg(long, env = "DERMACARE_LABELS", default_value = LABELS_FILE)]
    pub labels: PathBuf,

    /// Architecture JSON; EfficientNet-B0 when omitted
    #[arg(long, env = "DERMACARE_MODEL_CONFIG")]
    pub model_config: Option<PathBuf>,

    #[arg(long, env = "DERMACARE_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// HS256 signing secret for session tokens
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// OAuth client id; Google sign-in is disabled without it
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    #[arg(long, default_value = "24")]
    pub token_ttl_hours: i64,

    /// Request body limit in megabytes
    #[arg(long, default_value = "16")]
    pub max_upload_mb: usize,

    #[arg(short, long)]
    pub verbose: bool,
}

/// Settings the running server needs after startup
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Cli {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn artifacts(&self) -> ModelArtifacts {
        let artifacts = ModelArtifacts::new(&self.model, &self.labels);
        match &self.model_config {
            Some(path) => artifacts.with_model_config(path),
            None => artifacts,
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            upload_dir: self.upload_dir.clone(),
            max_upload_bytes: self.max_upload_mb * 1024 * 1024,
        }
    }
}
