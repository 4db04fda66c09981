use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to an application whose data is being backed up or restored.
///
/// The transport treats it as opaque apart from `name`, which is used for
/// logging and accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_code: Option<i64>,
}

impl PackageInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version_code: None,
        }
    }
}

/// A named, timestamped snapshot the orchestrator can restore from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreSet {
    pub name: String,
    pub device: String,
    pub token: i64,
    pub created_at: DateTime<Utc>,
}

/// How a package's restore data is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreDataType {
    /// Discrete records, delivered in one `get_restore_data` call.
    KeyValue,
    /// Unstructured byte stream, pulled chunk by chunk.
    FullStream,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreDescription {
    pub package: PackageInfo,
    pub data_type: RestoreDataType,
}

/// Answer to `next_restore_package`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RestoreStep {
    Package(RestoreDescription),
    NoMorePackages,
    /// No restore session is open.
    Error,
}
