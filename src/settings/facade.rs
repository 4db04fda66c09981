use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use super::{SettingsError, SettingsService};

/// Snapshot of the backup settings as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsView {
    pub enabled: bool,
    pub current: String,
    /// All registered transports, current one first.
    pub transports: Vec<String>,
}

impl fmt::Display for SettingsView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Backup enabled:    {}",
            if self.enabled { "yes" } else { "no" }
        )?;
        writeln!(f, "Current transport: {}", self.current)?;
        writeln!(f, "Available transports:")?;
        for transport in &self.transports {
            let marker = if *transport == self.current { '*' } else { ' ' };
            writeln!(f, "  {} {}", marker, transport)?;
        }
        Ok(())
    }
}

/// Result of a transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The requested transport was already current; the service was not called.
    Unchanged,
    Changed,
}

/// Reads and changes backup settings through a [`SettingsService`].
pub struct SettingsFacade<S: SettingsService> {
    service: S,
    view: SettingsView,
}

impl<S: SettingsService> SettingsFacade<S> {
    /// Load the current settings from `service`.
    pub fn load(service: S) -> Result<Self, SettingsError> {
        let enabled = service.is_backup_enabled()?;
        let current = service.current_transport()?;
        let mut transports = service.list_all_transports()?;

        match transports.iter().position(|t| *t == current) {
            Some(index) => transports.swap(0, index),
            None => transports.insert(0, current.clone()),
        }

        debug!(enabled, current = %current, transports = ?transports, "Loaded backup settings");

        Ok(Self {
            service,
            view: SettingsView {
                enabled,
                current,
                transports,
            },
        })
    }

    pub fn view(&self) -> &SettingsView {
        &self.view
    }

    /// Turn backups on or off. The cached view only changes on success.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), SettingsError> {
        info!(enabled, "Setting backup enabled");
        self.service.set_backup_enabled(enabled)?;
        self.view.enabled = enabled;
        Ok(())
    }

    /// Make `name` the active transport.
    pub fn select(&mut self, name: &str) -> Result<Selection, SettingsError> {
        if name == self.view.current {
            debug!(transport = name, "Selected transport is already current, ignoring");
            return Ok(Selection::Unchanged);
        }

        info!(transport = name, "Selecting backup transport");
        self.service.select_backup_transport(name)?;
        self.view.current = name.to_string();
        Ok(Selection::Changed)
    }
}
