use std::io::{self, Read, Write};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{BackupTransport, FULL_BACKUP_SIZE_QUOTA};
use crate::core::models::{
    PackageInfo, RestoreDataType, RestoreDescription, RestoreSet, RestoreStep,
};
use crate::core::session::{BackupSession, FullBackupSocket, RestoreSession};
use crate::core::status::{RestoreChunk, TransportStatus};
use crate::logging::LogThrottle;

const TRANSPORT_NAME: &str = "nullbak/.NullTransport";
const TRANSPORT_DIR_NAME: &str = "nullbak.NullTransport";
const TRANSPORT_DESTINATION_STRING: &str = "Backing up to nowhere.";
const TRANSPORT_DATA_MANAGEMENT_LABEL: &str = "";
const CURRENT_RESTORE_SET: i64 = 1;

/// How often per-chunk accounting is logged during a full backup.
const SEND_LOG_INTERVAL: Duration = Duration::from_millis(500);

/// Backup transport whose destination is nowhere.
///
/// Every byte handed to it is read and discarded. The protocol state machine
/// is enforced all the same: at most one full-stream session, quota
/// accounting, and an ordered restore walk.
pub struct NullTransport {
    backup: Option<BackupSession>,
    restore: Option<RestoreSession>,
    send_throttle: LogThrottle,
}

impl Default for NullTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl NullTransport {
    /// Identity reported by [`BackupTransport::name`].
    pub const NAME: &'static str = TRANSPORT_NAME;

    pub fn new() -> Self {
        Self {
            backup: None,
            restore: None,
            send_throttle: LogThrottle::new(SEND_LOG_INTERVAL),
        }
    }

    /// The active full-stream session, if any.
    pub fn backup_session(&self) -> Option<&BackupSession> {
        self.backup.as_ref()
    }

    /// The active restore session, if any.
    pub fn restore_session(&self) -> Option<&RestoreSession> {
        self.restore.as_ref()
    }

    fn current_restore_package(&self) -> Option<&PackageInfo> {
        self.restore.as_ref().and_then(RestoreSession::current)
    }
}

impl BackupTransport for NullTransport {
    fn name(&self) -> String {
        TRANSPORT_NAME.to_string()
    }

    fn current_destination_string(&self) -> String {
        TRANSPORT_DESTINATION_STRING.to_string()
    }

    fn data_management_label(&self) -> String {
        TRANSPORT_DATA_MANAGEMENT_LABEL.to_string()
    }

    fn transport_dir_name(&self) -> String {
        TRANSPORT_DIR_NAME.to_string()
    }

    fn initialize_device(&mut self) -> TransportStatus {
        debug!("initialize_device: nothing to initialize");
        TransportStatus::Ok
    }

    fn request_backup_time(&self) -> Duration {
        // any time is a good time for no backup
        Duration::ZERO
    }

    fn request_full_backup_time(&self) -> Duration {
        Duration::ZERO
    }

    fn perform_backup(&mut self, package: &PackageInfo, data: &mut dyn Read) -> TransportStatus {
        match io::copy(data, &mut io::sink()) {
            Ok(size) => debug!(package = %package.name, size, "perform_backup"),
            Err(e) => warn!(
                package = %package.name,
                error = %e,
                "Unable to read backup data"
            ),
        }
        TransportStatus::Ok
    }

    fn clear_backup_data(&mut self, package: &PackageInfo) -> TransportStatus {
        debug!(package = %package.name, "clear_backup_data");
        TransportStatus::Ok
    }

    fn finish_backup(&mut self) -> TransportStatus {
        match self.backup.take() {
            Some(session) => debug!(
                package = %session.package().name,
                session = %session.id(),
                bytes = session.bytes_received(),
                "finish_backup: full backup complete"
            ),
            None => debug!("finish_backup"),
        }
        TransportStatus::Ok
    }

    fn check_full_backup_size(&self, size: i64) -> TransportStatus {
        // Decline zero-size "backups"
        let result = if size <= 0 {
            TransportStatus::PackageRejected
        } else if size as u64 > FULL_BACKUP_SIZE_QUOTA {
            TransportStatus::QuotaExceeded
        } else {
            TransportStatus::Ok
        };

        if !result.is_ok() {
            debug!(size, %result, "Declining full backup");
        }
        result
    }

    fn perform_full_backup(
        &mut self,
        package: &PackageInfo,
        socket: FullBackupSocket,
    ) -> TransportStatus {
        if let Some(active) = &self.backup {
            error!(
                package = %package.name,
                active = %active.package().name,
                "Attempt to initiate full backup while one is in progress"
            );
            return TransportStatus::Error;
        }

        let session = BackupSession::new(package.clone(), socket);
        info!(package = %package.name, session = %session.id(), "perform_full_backup");
        self.backup = Some(session);
        self.send_throttle.reset();
        TransportStatus::Ok
    }

    fn send_backup_data(&mut self, num_bytes: u64) -> TransportStatus {
        let Some(session) = self.backup.as_mut() else {
            warn!("Attempted send_backup_data before perform_full_backup");
            return TransportStatus::Error;
        };

        let total = session.record(num_bytes);

        // The destination is nowhere; drain what the caller announced.
        let mut announced = session.socket().take(num_bytes);
        if let Err(e) = io::copy(&mut announced, &mut io::sink()) {
            warn!(session = %session.id(), error = %e, "Unable to drain backup socket");
        }

        if self.send_throttle.should_log() {
            debug!(
                package = %session.package().name,
                bytes = total,
                quota = FULL_BACKUP_SIZE_QUOTA,
                "send_backup_data"
            );
        }

        if total > FULL_BACKUP_SIZE_QUOTA {
            warn!(
                package = %session.package().name,
                bytes = total,
                quota = FULL_BACKUP_SIZE_QUOTA,
                "Full backup exceeded quota"
            );
            return TransportStatus::QuotaExceeded;
        }
        TransportStatus::Ok
    }

    // For now we can't roll back, so just tear everything down.
    fn cancel_full_backup(&mut self) {
        match self.backup.take() {
            Some(session) => info!(
                package = %session.package().name,
                session = %session.id(),
                bytes = session.bytes_received(),
                "Canceling full backup"
            ),
            None => debug!("cancel_full_backup: no session"),
        }
    }

    fn get_backup_quota(&self, _package_name: &str, is_full_backup: bool) -> u64 {
        if is_full_backup {
            FULL_BACKUP_SIZE_QUOTA
        } else {
            u64::MAX
        }
    }

    fn get_available_restore_sets(&self) -> Vec<RestoreSet> {
        Vec::new()
    }

    fn get_current_restore_set(&self) -> i64 {
        CURRENT_RESTORE_SET
    }

    fn start_restore(&mut self, token: i64, packages: Vec<PackageInfo>) -> TransportStatus {
        debug!(token, packages = packages.len(), "start_restore");
        self.restore = Some(RestoreSession::new(token, packages));
        TransportStatus::Ok
    }

    fn next_restore_package(&mut self) -> RestoreStep {
        let Some(session) = self.restore.as_mut() else {
            warn!("next_restore_package called without a restore session");
            return RestoreStep::Error;
        };

        match session.advance() {
            Some(package) => {
                debug!(package = %package.name, "next_restore_package");
                RestoreStep::Package(RestoreDescription {
                    package: package.clone(),
                    data_type: RestoreDataType::FullStream,
                })
            }
            None => {
                debug!("no more packages to restore");
                RestoreStep::NoMorePackages
            }
        }
    }

    fn get_restore_data(&mut self, _out: &mut dyn Write) -> TransportStatus {
        match self.current_restore_package() {
            Some(package) => {
                debug!(package = %package.name, "get_restore_data: no data");
                TransportStatus::Ok
            }
            None => {
                warn!("get_restore_data called with no current package");
                TransportStatus::Error
            }
        }
    }

    fn get_next_full_restore_data_chunk(&mut self, _out: &mut dyn Write) -> RestoreChunk {
        match self.current_restore_package() {
            Some(_) => RestoreChunk::EndOfStream,
            None => {
                warn!("get_next_full_restore_data_chunk called with no current package");
                RestoreChunk::Error
            }
        }
    }

    fn abort_full_restore(&mut self) -> TransportStatus {
        debug!("abort_full_restore");
        TransportStatus::Ok
    }

    fn finish_restore(&mut self) {
        match self.restore.take() {
            Some(session) => debug!(
                token = session.token(),
                drained = session.is_drained(),
                "finish_restore"
            ),
            None => debug!("finish_restore: no session"),
        }
    }
}
