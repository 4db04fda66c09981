//! RPC client for driving a remote transport.

use std::net::SocketAddr;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::methods::{DaemonStatus, StatusReply, TransportInfo};
use super::protocol::{Request, Response, RpcError};
use crate::core::TransportStatus;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to transport server: {0}")]
    Connect(#[source] std::io::Error),
    #[error("Communication error: {0}")]
    Io(#[source] std::io::Error),
    #[error("Failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Failed to parse response: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("Server closed the connection without a response")]
    NoResponse,
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(RpcError),
}

pub struct RpcClient {
    addr: SocketAddr,
}

impl RpcClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Call an RPC method and return the result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, ClientError> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .map_err(ClientError::Connect)?;

        let request = Request::new(method, params, 1);
        let mut request_json = serde_json::to_string(&request).map_err(ClientError::Serialize)?;
        request_json.push('\n');

        stream
            .write_all(request_json.as_bytes())
            .await
            .map_err(ClientError::Io)?;

        let mut reader = BufReader::new(stream);
        let mut response_line = String::new();
        let read = reader
            .read_line(&mut response_line)
            .await
            .map_err(ClientError::Io)?;
        if read == 0 {
            return Err(ClientError::NoResponse);
        }

        let response: Response =
            serde_json::from_str(&response_line).map_err(ClientError::Parse)?;

        if let Some(error) = response.error {
            return Err(ClientError::Rpc(error));
        }

        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(ClientError::Parse)
    }

    pub async fn call_no_params<T: DeserializeOwned>(
        &self,
        method: &str,
    ) -> Result<T, ClientError> {
        self.call(method, None).await
    }

    /// Call a method that answers with a transport status. The numeric code
    /// is authoritative.
    pub async fn call_status(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<TransportStatus, ClientError> {
        let reply: StatusReply = self.call(method, params).await?;
        Ok(TransportStatus::from_code(reply.code))
    }

    pub async fn daemon_status(&self) -> Result<DaemonStatus, ClientError> {
        self.call_no_params("daemon.status").await
    }

    pub async fn transport_info(&self) -> Result<TransportInfo, ClientError> {
        self.call_no_params("transport.info").await
    }

    pub async fn check_full_backup_size(&self, size: i64) -> Result<TransportStatus, ClientError> {
        self.call_status("full.check_size", Some(json!({ "size": size })))
            .await
    }
}
