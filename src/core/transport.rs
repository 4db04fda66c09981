//! The backup transport contract.
//!
//! An orchestrator drives a transport through three phases: device
//! initialization, backup (key-value or full-stream) and restore. Calls are
//! synchronous and issued one at a time; each returns a status value and never
//! panics or propagates an error across this boundary.

mod null;

use std::io::{Read, Write};
use std::time::Duration;

use super::models::{PackageInfo, RestoreSet, RestoreStep};
use super::session::FullBackupSocket;
use super::status::{RestoreChunk, TransportStatus};

pub use null::NullTransport;

/// Maximum cumulative bytes accepted for one full-stream backup.
pub const FULL_BACKUP_SIZE_QUOTA: u64 = 25 * 1024 * 1024;

pub trait BackupTransport: Send {
    // Identity & configuration

    /// Stable identity of this transport.
    fn name(&self) -> String;

    /// Target of an "open settings" action, if the transport is configurable.
    fn configuration_intent(&self) -> Option<String> {
        None
    }

    /// Human-readable description of where data currently goes.
    fn current_destination_string(&self) -> String;

    /// Target of a "manage data" action, if the transport offers one.
    fn data_management_intent(&self) -> Option<String> {
        None
    }

    fn data_management_label(&self) -> String {
        String::new()
    }

    /// Per-device storage directory name.
    fn transport_dir_name(&self) -> String;

    // Device lifecycle

    /// Prepare the destination. Must be idempotent.
    fn initialize_device(&mut self) -> TransportStatus;

    /// Delay before the next key-value backup. Zero means no preference.
    fn request_backup_time(&self) -> Duration;

    /// Delay before the next full backup. Zero means no preference.
    fn request_full_backup_time(&self) -> Duration;

    // Key-value backup

    /// Store the data for `package`. `data` is only valid for this call.
    fn perform_backup(&mut self, package: &PackageInfo, data: &mut dyn Read) -> TransportStatus;

    /// Remove anything stored for `package`. Nothing to clear is success.
    fn clear_backup_data(&mut self, package: &PackageInfo) -> TransportStatus;

    /// End of a batch of backup calls. Ends any full-stream session as well.
    fn finish_backup(&mut self) -> TransportStatus;

    // Full-stream backup

    /// Pre-flight size check. Never mutates state.
    fn check_full_backup_size(&self, size: i64) -> TransportStatus;

    /// Open a full-stream session reading from `socket`.
    fn perform_full_backup(
        &mut self,
        package: &PackageInfo,
        socket: FullBackupSocket,
    ) -> TransportStatus;

    /// `num_bytes` more bytes are available on the session socket.
    fn send_backup_data(&mut self, num_bytes: u64) -> TransportStatus;

    /// Tear down the current full-stream session. No-op without one.
    fn cancel_full_backup(&mut self);

    fn get_backup_quota(&self, package_name: &str, is_full_backup: bool) -> u64;

    // Restore

    /// Snapshots available to restore from, recomputed on every call.
    fn get_available_restore_sets(&self) -> Vec<RestoreSet>;

    /// Token of the restore set this device last backed up to.
    fn get_current_restore_set(&self) -> i64;

    /// Begin a restore of `packages` from the set identified by `token`.
    fn start_restore(&mut self, token: i64, packages: Vec<PackageInfo>) -> TransportStatus;

    fn next_restore_package(&mut self) -> RestoreStep;

    /// Write the current key-value package's data into `out`.
    ///
    /// Only valid after `next_restore_package` has returned a package. Called
    /// before that, or after the walk is exhausted, this is a protocol
    /// violation and answers `Error`.
    fn get_restore_data(&mut self, out: &mut dyn Write) -> TransportStatus;

    /// Write the next chunk of the current full-stream package into `out`.
    ///
    /// Same precondition as `get_restore_data`. Without a current package the
    /// answer is [`RestoreChunk::Error`], which ends the whole restore.
    fn get_next_full_restore_data_chunk(&mut self, out: &mut dyn Write) -> RestoreChunk;

    /// Abandon the current package's stream.
    fn abort_full_restore(&mut self) -> TransportStatus;

    /// End the restore session. No-op without one.
    fn finish_restore(&mut self);
}
