//! Result values returned across the transport protocol boundary.
//!
//! The orchestrator branches on these, so quota and rejection outcomes are
//! their own variants rather than being folded into `Error`.

use serde::{Deserialize, Serialize};

/// Outcome of a transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportStatus {
    Ok,
    /// Generic failure, including calls issued in a phase that disallows them.
    Error,
    /// The transport has not been initialized for this device.
    NotInitialized,
    /// Input validation failure, e.g. a non-positive full backup size.
    PackageRejected,
    /// The package would exceed the transport's quota.
    QuotaExceeded,
}

impl TransportStatus {
    pub const OK_CODE: i32 = 0;
    pub const ERROR_CODE: i32 = -1000;
    pub const NOT_INITIALIZED_CODE: i32 = -1001;
    pub const PACKAGE_REJECTED_CODE: i32 = -1002;
    pub const QUOTA_EXCEEDED_CODE: i32 = -1005;

    /// Stable integer code used on the wire.
    pub fn code(self) -> i32 {
        match self {
            Self::Ok => Self::OK_CODE,
            Self::Error => Self::ERROR_CODE,
            Self::NotInitialized => Self::NOT_INITIALIZED_CODE,
            Self::PackageRejected => Self::PACKAGE_REJECTED_CODE,
            Self::QuotaExceeded => Self::QUOTA_EXCEEDED_CODE,
        }
    }

    /// Map a wire code back to a status. Unknown codes are treated as `Error`.
    pub fn from_code(code: i32) -> Self {
        match code {
            Self::OK_CODE => Self::Ok,
            Self::NOT_INITIALIZED_CODE => Self::NotInitialized,
            Self::PACKAGE_REJECTED_CODE => Self::PackageRejected,
            Self::QUOTA_EXCEEDED_CODE => Self::QuotaExceeded,
            _ => Self::Error,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::NotInitialized => "not_initialized",
            Self::PackageRejected => "package_rejected",
            Self::QuotaExceeded => "quota_exceeded",
        }
    }
}

impl std::fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of asking for the next chunk of a full-stream restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreChunk {
    /// This many bytes were written to the sink; the caller must read exactly
    /// that many before asking again.
    Data(usize),
    /// The current package's stream is exhausted.
    EndOfStream,
    /// Fatal: the whole restore operation stops.
    Error,
}

impl RestoreChunk {
    /// Raw wire value: positive byte count, zero, or negative on error.
    pub fn as_raw(self) -> i64 {
        match self {
            Self::Data(n) => n as i64,
            Self::EndOfStream => 0,
            Self::Error => -1,
        }
    }

    pub fn from_raw(raw: i64) -> Self {
        match raw {
            0 => Self::EndOfStream,
            n if n > 0 => Self::Data(n as usize),
            _ => Self::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(TransportStatus::Ok.code(), 0);
        assert_eq!(TransportStatus::Error.code(), -1000);
        assert_eq!(TransportStatus::NotInitialized.code(), -1001);
        assert_eq!(TransportStatus::PackageRejected.code(), -1002);
        assert_eq!(TransportStatus::QuotaExceeded.code(), -1005);
    }

    #[test]
    fn test_unknown_code_is_error() {
        assert_eq!(TransportStatus::from_code(42), TransportStatus::Error);
        assert_eq!(
            TransportStatus::from_code(-1005),
            TransportStatus::QuotaExceeded
        );
    }

    #[test]
    fn test_any_negative_chunk_is_error() {
        assert_eq!(RestoreChunk::from_raw(-1), RestoreChunk::Error);
        assert_eq!(RestoreChunk::from_raw(-1000), RestoreChunk::Error);
        assert_eq!(RestoreChunk::from_raw(0), RestoreChunk::EndOfStream);
        assert_eq!(RestoreChunk::from_raw(512), RestoreChunk::Data(512));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TransportStatus::QuotaExceeded).unwrap();
        assert_eq!(json, r#""quota_exceeded""#);
    }
}
