//! RPC method handlers.
//!
//! Each method maps to exactly one transport call. The transport lock is held
//! for the duration of that call only, so calls from concurrent connections
//! are applied one at a time.
//!
//! Payload bytes travel base64-encoded in `data` fields: key-value records on
//! `backup.perform`, stream chunks on `full.send`, and whatever the transport
//! writes on `restore.data` and `restore.next_chunk`.

use std::collections::VecDeque;
use std::io::{self, Cursor, Read};
use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::context::AppContext;
use crate::core::{PackageInfo, RestoreChunk, TransportStatus};

use super::protocol::{Request, Response};

#[derive(Debug, Error)]
enum MethodError {
    #[error("method not found")]
    NotFound,
    #[error("{0}")]
    InvalidParams(String),
    #[error("{0}")]
    Internal(String),
}

/// Result shape of every call that answers with a transport status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: TransportStatus,
    pub code: i32,
}

impl From<TransportStatus> for StatusReply {
    fn from(status: TransportStatus) -> Self {
        Self {
            status,
            code: status.code(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportInfo {
    pub name: String,
    pub destination: String,
    pub dir_name: String,
    pub data_management_label: String,
    pub configuration_intent: Option<String>,
    pub data_management_intent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub uptime_secs: i64,
    pub rpc_bind: String,
    pub transport: String,
}

/// Byte pipe behind the socket of a full backup opened over RPC.
///
/// `full.send` pushes its payload in and the transport drains it. Reads never
/// block: an empty pipe reads as end of input.
#[derive(Clone, Default)]
struct SocketFeed(Arc<Mutex<VecDeque<u8>>>);

impl SocketFeed {
    fn push(&self, bytes: &[u8]) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(bytes);
    }

    fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Read for SocketFeed {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut queue = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let n = queue.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

/// Handles RPC method dispatch and execution.
pub struct MethodHandler {
    ctx: AppContext,
    feed: SocketFeed,
}

impl MethodHandler {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            feed: SocketFeed::default(),
        }
    }

    /// Handle an RPC request and return a response.
    pub async fn handle(&self, request: Request) -> Response {
        let id = request.id.clone().unwrap_or(Value::Null);
        let params = request.params.unwrap_or(Value::Null);

        match self.dispatch(&request.method, params).await {
            Ok(result) => Response::success(id, result),
            Err(MethodError::NotFound) => Response::method_not_found(id, &request.method),
            Err(MethodError::InvalidParams(details)) => Response::invalid_params(id, details),
            Err(MethodError::Internal(details)) => Response::internal_error(id, details),
        }
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, MethodError> {
        debug!(method, "Dispatching transport call");

        match method {
            "daemon.status" => self.daemon_status().await,
            "transport.info" => {
                let t = self.ctx.transport.lock().await;
                reply(TransportInfo {
                    name: t.name(),
                    destination: t.current_destination_string(),
                    dir_name: t.transport_dir_name(),
                    data_management_label: t.data_management_label(),
                    configuration_intent: t.configuration_intent(),
                    data_management_intent: t.data_management_intent(),
                })
            }

            "device.initialize" => {
                status(self.ctx.transport.lock().await.initialize_device())
            }
            "schedule.backup_time" => {
                let delay = self.ctx.transport.lock().await.request_backup_time();
                reply(DelayReply::from(delay))
            }
            "schedule.full_backup_time" => {
                let delay = self.ctx.transport.lock().await.request_full_backup_time();
                reply(DelayReply::from(delay))
            }

            "backup.perform" => {
                let p: PerformBackupParams = parse(params)?;
                let bytes = match p.data.as_deref() {
                    Some(encoded) => decode(encoded)?,
                    None => Vec::new(),
                };
                let mut data = Cursor::new(bytes);
                let mut t = self.ctx.transport.lock().await;
                status(t.perform_backup(&p.package, &mut data))
            }
            "backup.clear" => {
                let p: PackageParams = parse(params)?;
                status(self.ctx.transport.lock().await.clear_backup_data(&p.package))
            }
            "backup.finish" => {
                let result = self.ctx.transport.lock().await.finish_backup();
                self.feed.clear();
                status(result)
            }
            "backup.quota" => {
                let p: QuotaParams = parse(params)?;
                let quota = self
                    .ctx
                    .transport
                    .lock()
                    .await
                    .get_backup_quota(&p.package_name, p.is_full_backup);
                reply(QuotaReply { quota })
            }

            "full.check_size" => {
                let p: SizeParams = parse(params)?;
                status(self.ctx.transport.lock().await.check_full_backup_size(p.size))
            }
            "full.perform" => {
                let p: PackageParams = parse(params)?;
                let mut t = self.ctx.transport.lock().await;
                let result = t.perform_full_backup(&p.package, Box::new(self.feed.clone()));
                if result.is_ok() {
                    self.feed.clear();
                }
                status(result)
            }
            "full.send" => {
                let p: SendParams = parse(params)?;
                let payload = p.data.as_deref().map(decode).transpose()?;
                let num_bytes = match (&payload, p.num_bytes) {
                    (Some(bytes), Some(n)) if n != bytes.len() as u64 => {
                        return Err(MethodError::InvalidParams(format!(
                            "num_bytes {} does not match {} bytes of data",
                            n,
                            bytes.len()
                        )));
                    }
                    (Some(bytes), _) => bytes.len() as u64,
                    (None, Some(n)) => n,
                    (None, None) => {
                        return Err(MethodError::InvalidParams(
                            "num_bytes or data is required".to_string(),
                        ));
                    }
                };

                let mut t = self.ctx.transport.lock().await;
                if let Some(bytes) = &payload {
                    self.feed.push(bytes);
                }
                status(t.send_backup_data(num_bytes))
            }
            "full.cancel" => {
                self.ctx.transport.lock().await.cancel_full_backup();
                self.feed.clear();
                Ok(Value::Null)
            }

            "restore.sets" => reply(
                self.ctx
                    .transport
                    .lock()
                    .await
                    .get_available_restore_sets(),
            ),
            "restore.current_set" => {
                let token = self.ctx.transport.lock().await.get_current_restore_set();
                reply(TokenReply { token })
            }
            "restore.start" => {
                let p: StartRestoreParams = parse(params)?;
                status(
                    self.ctx
                        .transport
                        .lock()
                        .await
                        .start_restore(p.token, p.packages),
                )
            }
            "restore.next" => reply(self.ctx.transport.lock().await.next_restore_package()),
            "restore.data" => {
                let mut out = Vec::new();
                let result = self.ctx.transport.lock().await.get_restore_data(&mut out);
                reply(RestoreDataReply {
                    status: result,
                    code: result.code(),
                    bytes: out.len(),
                    data: STANDARD.encode(&out),
                })
            }
            "restore.next_chunk" => {
                let mut out = Vec::new();
                let chunk = self
                    .ctx
                    .transport
                    .lock()
                    .await
                    .get_next_full_restore_data_chunk(&mut out);
                reply(ChunkReply {
                    chunk: chunk.as_raw(),
                    bytes: out.len(),
                    data: STANDARD.encode(&out),
                })
            }
            "restore.abort_full" => status(self.ctx.transport.lock().await.abort_full_restore()),
            "restore.finish" => {
                self.ctx.transport.lock().await.finish_restore();
                Ok(Value::Null)
            }

            _ => Err(MethodError::NotFound),
        }
    }

    async fn daemon_status(&self) -> Result<Value, MethodError> {
        let transport = self.ctx.transport.lock().await.name();
        let uptime_secs = (chrono::Utc::now() - self.ctx.started_at).num_seconds();

        reply(DaemonStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: self.ctx.started_at,
            uptime_secs,
            rpc_bind: self.ctx.config.rpc_bind.to_string(),
            transport,
        })
    }
}

#[derive(Deserialize)]
struct PackageParams {
    package: PackageInfo,
}

#[derive(Deserialize)]
struct PerformBackupParams {
    package: PackageInfo,
    /// Base64-encoded records.
    #[serde(default)]
    data: Option<String>,
}

#[derive(Deserialize)]
struct QuotaParams {
    package_name: String,
    is_full_backup: bool,
}

#[derive(Deserialize)]
struct SizeParams {
    size: i64,
}

#[derive(Deserialize)]
struct SendParams {
    #[serde(default)]
    num_bytes: Option<u64>,
    /// Base64-encoded chunk, fed to the session socket before the call.
    #[serde(default)]
    data: Option<String>,
}

#[derive(Deserialize)]
struct StartRestoreParams {
    token: i64,
    #[serde(default)]
    packages: Vec<PackageInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DelayReply {
    pub delay_ms: u64,
}

impl From<std::time::Duration> for DelayReply {
    fn from(delay: std::time::Duration) -> Self {
        Self {
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuotaReply {
    pub quota: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenReply {
    pub token: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestoreDataReply {
    pub status: TransportStatus,
    pub code: i32,
    pub bytes: usize,
    /// Base64 of the bytes the transport wrote.
    pub data: String,
}

impl RestoreDataReply {
    pub fn payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkReply {
    /// Positive byte count, zero at end of stream, negative on fatal error.
    pub chunk: i64,
    pub bytes: usize,
    /// Base64 of the chunk itself.
    pub data: String,
}

impl ChunkReply {
    pub fn as_chunk(&self) -> RestoreChunk {
        RestoreChunk::from_raw(self.chunk)
    }

    pub fn payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, MethodError> {
    serde_json::from_value(params).map_err(|e| MethodError::InvalidParams(e.to_string()))
}

fn decode(encoded: &str) -> Result<Vec<u8>, MethodError> {
    STANDARD
        .decode(encoded)
        .map_err(|e| MethodError::InvalidParams(format!("data is not valid base64: {}", e)))
}

fn reply(result: impl Serialize) -> Result<Value, MethodError> {
    serde_json::to_value(result).map_err(|e| MethodError::Internal(e.to_string()))
}

fn status(status: TransportStatus) -> Result<Value, MethodError> {
    reply(StatusReply::from(status))
}
