//! Per-call-pair session state.
//!
//! A `BackupSession` lives from `perform_full_backup` until `finish_backup` or
//! `cancel_full_backup`; a `RestoreSession` lives from `start_restore` until
//! `finish_restore`. Neither outlives its pair, so a fresh transport needs no
//! reset logic between uses.

use std::io::Read;

use uuid::Uuid;

use super::models::PackageInfo;

/// Byte source handed over by the orchestrator for a full-stream backup.
pub type FullBackupSocket = Box<dyn Read + Send>;

pub struct BackupSession {
    id: Uuid,
    package: PackageInfo,
    socket: FullBackupSocket,
    bytes_received: u64,
}

impl BackupSession {
    pub fn new(package: PackageInfo, socket: FullBackupSocket) -> Self {
        Self {
            id: Uuid::now_v7(),
            package,
            socket,
            bytes_received: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn package(&self) -> &PackageInfo {
        &self.package
    }

    /// Cumulative bytes announced through `send_backup_data`.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Add `num_bytes` to the running total and return the new total.
    pub fn record(&mut self, num_bytes: u64) -> u64 {
        self.bytes_received = self.bytes_received.saturating_add(num_bytes);
        self.bytes_received
    }

    pub fn socket(&mut self) -> &mut FullBackupSocket {
        &mut self.socket
    }
}

impl std::fmt::Debug for BackupSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupSession")
            .field("id", &self.id)
            .field("package", &self.package.name)
            .field("bytes_received", &self.bytes_received)
            .finish_non_exhaustive()
    }
}

/// Walk over the packages requested by `start_restore`.
#[derive(Debug, Clone)]
pub struct RestoreSession {
    token: i64,
    packages: Vec<PackageInfo>,
    /// `None` is "before first"; `Some(len)` means drained.
    cursor: Option<usize>,
}

impl RestoreSession {
    pub fn new(token: i64, packages: Vec<PackageInfo>) -> Self {
        Self {
            token,
            packages,
            cursor: None,
        }
    }

    pub fn token(&self) -> i64 {
        self.token
    }

    /// Move the cursor forward and return the package it lands on, or `None`
    /// once the list is exhausted. The cursor never moves past `len`, so a
    /// drained session stays drained.
    pub fn advance(&mut self) -> Option<&PackageInfo> {
        let next = self.cursor.map_or(0, |c| c + 1).min(self.packages.len());
        self.cursor = Some(next);
        self.packages.get(next)
    }

    /// The package the cursor currently points at.
    pub fn current(&self) -> Option<&PackageInfo> {
        self.cursor.and_then(|c| self.packages.get(c))
    }

    pub fn is_drained(&self) -> bool {
        self.cursor == Some(self.packages.len())
    }
}
