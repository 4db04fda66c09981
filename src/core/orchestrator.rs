//! Reference caller of the transport protocol.
//!
//! Drives any [`BackupTransport`] the way a backup orchestrator does: a batch
//! of key-value backups, a full-stream backup fed in chunks, and a restore
//! walk that pulls full-stream data until each package's stream ends.

use std::io::{self, Cursor, Write};

use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::core::models::{PackageInfo, RestoreDataType, RestoreStep};
use crate::core::status::{RestoreChunk, TransportStatus};
use crate::core::transport::BackupTransport;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("transport failed to initialize device: {0}")]
    Initialize(TransportStatus),

    #[error("transport refused to start restore from set {token}: {status}")]
    StartRestore { token: i64, status: TransportStatus },

    #[error("transport reported an error while iterating restore packages")]
    RestoreIteration,

    #[error("restore aborted by transport while streaming {package}")]
    RestoreAborted { package: String },
}

/// Per-package result of a key-value backup batch.
#[derive(Debug, Default)]
pub struct BackupReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, TransportStatus)>,
}

/// How a single full-stream backup ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FullBackupOutcome {
    Completed { bytes: u64 },
    /// The pre-flight size check declined the package.
    Rejected(TransportStatus),
    /// The quota was exceeded mid-stream and the session was cancelled.
    QuotaExceeded { bytes: u64 },
    Failed(TransportStatus),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Abandon a package's stream once it delivers more than this.
    pub max_package_bytes: Option<u64>,
}

#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Packages restored, with the bytes delivered for each.
    pub restored: Vec<(String, u64)>,
    /// Packages whose stream was abandoned via `abort_full_restore`.
    pub abandoned: Vec<String>,
    pub failed: Vec<(String, TransportStatus)>,
}

pub struct Orchestrator<'a, T: BackupTransport + ?Sized> {
    transport: &'a mut T,
}

impl<'a, T: BackupTransport + ?Sized> Orchestrator<'a, T> {
    pub fn new(transport: &'a mut T) -> Self {
        Self { transport }
    }

    /// Back up each package's records, then close the batch with
    /// `finish_backup`. A `NotInitialized` answer triggers one device
    /// initialization and a retry.
    pub fn backup_key_value(
        &mut self,
        items: &[(PackageInfo, Vec<u8>)],
    ) -> Result<BackupReport, OrchestratorError> {
        let mut report = BackupReport::default();

        for (package, data) in items {
            let mut status = self.transport.perform_backup(package, &mut data.as_slice());

            if status == TransportStatus::NotInitialized {
                info!(package = %package.name, "Transport not initialized, initializing device");
                let init = self.transport.initialize_device();
                if !init.is_ok() {
                    return Err(OrchestratorError::Initialize(init));
                }
                status = self.transport.perform_backup(package, &mut data.as_slice());
            }

            if status.is_ok() {
                report.succeeded.push(package.name.clone());
            } else {
                warn!(package = %package.name, %status, "Key-value backup failed");
                report.failed.push((package.name.clone(), status));
            }
        }

        let finish = self.transport.finish_backup();
        if !finish.is_ok() {
            warn!(status = %finish, "finish_backup failed");
        }

        Ok(report)
    }

    /// Stream `data` for `package` in chunks of at most `chunk_size` bytes.
    pub fn backup_full(
        &mut self,
        package: &PackageInfo,
        data: Vec<u8>,
        chunk_size: usize,
    ) -> FullBackupOutcome {
        let span = info_span!("full_backup", package = %package.name);
        let _enter = span.enter();

        let size = data.len() as i64;
        let check = self.transport.check_full_backup_size(size);
        if !check.is_ok() {
            info!(size, status = %check, "Full backup declined by pre-flight check");
            return FullBackupOutcome::Rejected(check);
        }

        let chunks: Vec<u64> = data
            .chunks(chunk_size.max(1))
            .map(|c| c.len() as u64)
            .collect();

        let start = self
            .transport
            .perform_full_backup(package, Box::new(Cursor::new(data)));
        if !start.is_ok() {
            return FullBackupOutcome::Failed(start);
        }

        let mut sent: u64 = 0;
        for len in chunks {
            sent += len;
            match self.transport.send_backup_data(len) {
                TransportStatus::Ok => {}
                TransportStatus::QuotaExceeded => {
                    warn!(bytes = sent, "Quota exceeded, cancelling full backup");
                    self.transport.cancel_full_backup();
                    return FullBackupOutcome::QuotaExceeded { bytes: sent };
                }
                status => {
                    warn!(%status, "send_backup_data failed, cancelling full backup");
                    self.transport.cancel_full_backup();
                    return FullBackupOutcome::Failed(status);
                }
            }
        }

        match self.transport.finish_backup() {
            TransportStatus::Ok => FullBackupOutcome::Completed { bytes: sent },
            status => FullBackupOutcome::Failed(status),
        }
    }

    /// Restore `packages` from `token`, writing delivered data into `out`.
    ///
    /// A negative chunk or a failed `abort_full_restore` is fatal: no further
    /// calls are issued to the transport for this restore.
    pub fn restore(
        &mut self,
        token: i64,
        packages: Vec<PackageInfo>,
        options: RestoreOptions,
        out: &mut dyn Write,
    ) -> Result<RestoreReport, OrchestratorError> {
        let span = info_span!("restore", token);
        let _enter = span.enter();

        let status = self.transport.start_restore(token, packages);
        if !status.is_ok() {
            return Err(OrchestratorError::StartRestore { token, status });
        }

        let mut report = RestoreReport::default();

        loop {
            let description = match self.transport.next_restore_package() {
                RestoreStep::Package(description) => description,
                RestoreStep::NoMorePackages => break,
                RestoreStep::Error => return Err(OrchestratorError::RestoreIteration),
            };
            let name = description.package.name.clone();
            debug!(package = %name, data_type = ?description.data_type, "Restoring package");

            match description.data_type {
                RestoreDataType::KeyValue => {
                    let mut counted = CountingWriter::new(&mut *out);
                    match self.transport.get_restore_data(&mut counted) {
                        TransportStatus::Ok => report.restored.push((name, counted.written)),
                        status => {
                            warn!(package = %name, %status, "Key-value restore failed");
                            report.failed.push((name, status));
                        }
                    }
                }
                RestoreDataType::FullStream => {
                    let mut delivered: u64 = 0;
                    loop {
                        match self.transport.get_next_full_restore_data_chunk(out) {
                            RestoreChunk::Data(n) => {
                                delivered += n as u64;
                                let over = options
                                    .max_package_bytes
                                    .is_some_and(|max| delivered > max);
                                if over {
                                    if !self.transport.abort_full_restore().is_ok() {
                                        return Err(OrchestratorError::RestoreAborted {
                                            package: name,
                                        });
                                    }
                                    report.abandoned.push(name);
                                    break;
                                }
                            }
                            RestoreChunk::EndOfStream => {
                                report.restored.push((name, delivered));
                                break;
                            }
                            RestoreChunk::Error => {
                                warn!(package = %name, "Fatal error streaming restore data");
                                return Err(OrchestratorError::RestoreAborted { package: name });
                            }
                        }
                    }
                }
            }
        }

        self.transport.finish_restore();
        info!(
            restored = report.restored.len(),
            abandoned = report.abandoned.len(),
            failed = report.failed.len(),
            "Restore finished"
        );
        Ok(report)
    }
}

/// Counts what the transport writes through to the caller's sink.
struct CountingWriter<'w> {
    inner: &'w mut dyn Write,
    written: u64,
}

impl<'w> CountingWriter<'w> {
    fn new(inner: &'w mut dyn Write) -> Self {
        Self { inner, written: 0 }
    }
}

impl Write for CountingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Run a whole simulated pass (key-value batch, full backups, restore of
/// every package) against `transport`. Used by the `simulate` command.
pub fn simulate_pass<T: BackupTransport + ?Sized>(
    transport: &mut T,
    packages: &[PackageInfo],
    full_backup_size: usize,
    chunk_size: usize,
) -> Result<SimulationReport, OrchestratorError> {
    let span = info_span!("simulate", packages = packages.len());
    let _enter = span.enter();

    let mut orchestrator = Orchestrator::new(transport);

    let items: Vec<(PackageInfo, Vec<u8>)> = packages
        .iter()
        .map(|p| (p.clone(), p.name.as_bytes().to_vec()))
        .collect();
    let key_value = orchestrator.backup_key_value(&items)?;

    let full = packages
        .iter()
        .map(|p| {
            let outcome = orchestrator.backup_full(p, vec![0u8; full_backup_size], chunk_size);
            (p.name.clone(), outcome)
        })
        .collect();

    let token = orchestrator.transport.get_current_restore_set();
    let restore = orchestrator.restore(
        token,
        packages.to_vec(),
        RestoreOptions::default(),
        &mut std::io::sink(),
    )?;

    Ok(SimulationReport {
        key_value,
        full,
        restore,
    })
}

#[derive(Debug)]
pub struct SimulationReport {
    pub key_value: BackupReport,
    pub full: Vec<(String, FullBackupOutcome)>,
    pub restore: RestoreReport,
}
