//! Backup enablement and transport selection.
//!
//! The settings themselves are owned by a platform service, reached through the
//! [`SettingsService`] capability. [`SettingsFacade`] reads and mutates them on
//! behalf of the user and renders the result.

mod command;
mod facade;
mod local;

use std::path::PathBuf;

use thiserror::Error;

pub use command::{PRIVILEGE_NOTICE, SettingsAction, SettingsOutcome, run};
pub use facade::{Selection, SettingsFacade, SettingsView};
pub use local::LocalSettingsService;

#[derive(Debug, Error)]
pub enum SettingsError {
    /// The caller is not allowed to perform this operation.
    #[error("not permitted to {operation}; backup settings require a privileged caller")]
    PrivilegeDenied { operation: &'static str },

    #[error("unknown backup transport: {0}")]
    UnknownTransport(String),

    #[error("settings state at {path} is invalid: {reason}")]
    InvalidState { path: PathBuf, reason: String },

    #[error("settings I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SettingsError {
    pub fn is_privilege_denied(&self) -> bool {
        matches!(self, Self::PrivilegeDenied { .. })
    }
}

/// Platform capability that owns the backup settings.
pub trait SettingsService: Send + Sync {
    fn is_backup_enabled(&self) -> Result<bool, SettingsError>;

    fn set_backup_enabled(&self, enabled: bool) -> Result<(), SettingsError>;

    fn current_transport(&self) -> Result<String, SettingsError>;

    fn list_all_transports(&self) -> Result<Vec<String>, SettingsError>;

    fn select_backup_transport(&self, name: &str) -> Result<(), SettingsError>;
}
