pub mod models;
pub mod orchestrator;
pub mod session;
pub mod status;
pub mod transport;

pub use models::{PackageInfo, RestoreDataType, RestoreDescription, RestoreSet, RestoreStep};
pub use orchestrator::{FullBackupOutcome, Orchestrator, OrchestratorError, RestoreOptions};
pub use session::{BackupSession, FullBackupSocket, RestoreSession};
pub use status::{RestoreChunk, TransportStatus};
pub use transport::{BackupTransport, FULL_BACKUP_SIZE_QUOTA, NullTransport};
