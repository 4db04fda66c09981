use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::core::{BackupTransport, NullTransport};

/// One transport instance shared by every RPC connection. The mutex serializes
/// calls, which the protocol requires.
pub type SharedTransport = Arc<Mutex<Box<dyn BackupTransport>>>;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub transport: SharedTransport,
    pub started_at: DateTime<Utc>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        Self::with_transport(config, Box::new(NullTransport::new()))
    }

    pub fn with_transport(config: AppConfig, transport: Box<dyn BackupTransport>) -> Self {
        Self {
            config: Arc::new(config),
            transport: Arc::new(Mutex::new(transport)),
            started_at: Utc::now(),
        }
    }
}
