use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SettingsError, SettingsService};
use crate::core::NullTransport;

/// Persisted settings state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SettingsState {
    enabled: bool,
    current: String,
    transports: Vec<String>,
}

impl Default for SettingsState {
    fn default() -> Self {
        Self {
            enabled: false,
            current: NullTransport::NAME.to_string(),
            transports: vec![NullTransport::NAME.to_string()],
        }
    }
}

/// File-backed stand-in for the platform settings service.
///
/// State lives in a TOML file. Permission errors from the operating system
/// surface as [`SettingsError::PrivilegeDenied`], so an unprivileged user can
/// read defaults but not change them.
#[derive(Debug, Clone)]
pub struct LocalSettingsService {
    path: PathBuf,
}

impl LocalSettingsService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self, operation: &'static str) -> Result<SettingsState, SettingsError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SettingsState::default()),
            Err(e) => return Err(self.io_error(operation, e)),
        };

        let state: SettingsState =
            toml::from_str(&content).map_err(|e| SettingsError::InvalidState {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        if !state.transports.contains(&state.current) {
            return Err(SettingsError::InvalidState {
                path: self.path.clone(),
                reason: format!("current transport {} is not registered", state.current),
            });
        }
        Ok(state)
    }

    fn write(&self, operation: &'static str, state: &SettingsState) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(state).map_err(|e| SettingsError::InvalidState {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(operation, e))?;
        }
        std::fs::write(&self.path, content).map_err(|e| self.io_error(operation, e))?;

        debug!(path = %self.path.display(), operation, "Settings written");
        Ok(())
    }

    fn io_error(&self, operation: &'static str, source: std::io::Error) -> SettingsError {
        if source.kind() == ErrorKind::PermissionDenied {
            SettingsError::PrivilegeDenied { operation }
        } else {
            SettingsError::Io {
                path: self.path.clone(),
                source,
            }
        }
    }
}

impl SettingsService for LocalSettingsService {
    fn is_backup_enabled(&self) -> Result<bool, SettingsError> {
        Ok(self.read("read backup enablement")?.enabled)
    }

    fn set_backup_enabled(&self, enabled: bool) -> Result<(), SettingsError> {
        const OPERATION: &str = "change backup enablement";
        let mut state = self.read(OPERATION)?;
        state.enabled = enabled;
        self.write(OPERATION, &state)
    }

    fn current_transport(&self) -> Result<String, SettingsError> {
        Ok(self.read("read the current transport")?.current)
    }

    fn list_all_transports(&self) -> Result<Vec<String>, SettingsError> {
        Ok(self.read("list transports")?.transports)
    }

    fn select_backup_transport(&self, name: &str) -> Result<(), SettingsError> {
        const OPERATION: &str = "select the backup transport";
        let mut state = self.read(OPERATION)?;
        if !state.transports.iter().any(|t| t == name) {
            return Err(SettingsError::UnknownTransport(name.to_string()));
        }
        state.current = name.to_string();
        self.write(OPERATION, &state)
    }
}
