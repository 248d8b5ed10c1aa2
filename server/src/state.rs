//! Shared application state

use std::sync::{Arc, Mutex};
use std::time::Instant;

use dermacare::{InferenceBackend, Predictor};

use crate::analysis::Analyzer;
use crate::auth::TokenKeys;
use crate::config::ServerConfig;
use crate::google::GoogleVerifier;
use crate::store::Store;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: ServerConfig,
    predictor: Mutex<Predictor<InferenceBackend>>,
    pub store: Arc<dyn Store>,
    pub tokens: TokenKeys,
    /// `None` when no Google client id is configured
    pub google: Option<Arc<dyn GoogleVerifier>>,
    pub analyzer: Arc<dyn Analyzer>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        predictor: Predictor<InferenceBackend>,
        store: Arc<dyn Store>,
        tokens: TokenKeys,
        google: Option<Arc<dyn GoogleVerifier>>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            config,
            predictor: Mutex::new(predictor),
            store,
            tokens,
            google,
            analyzer,
            started_at: Instant::now(),
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }

    /// A handle to the loaded predictor for use on a blocking thread
    ///
    /// The lock is only held for the clone; the weights are shared, not copied.
    pub fn predictor(&self) -> Predictor<InferenceBackend> {
        self.predictor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
