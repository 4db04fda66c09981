//! RPC host for the transport.
//!
//! Exposes every transport call as a JSON-RPC 2.0 method over TCP, so an
//! orchestrator in another process can drive the transport.
//!
//! ## Architecture
//!
//! - `protocol`: JSON-RPC 2.0 request/response types
//! - `listener`: TCP listener with newline-delimited JSON framing
//! - `methods`: one method per transport call
//! - `client`: client for connecting to the server
//!
//! ## Methods
//!
//! | Method | Transport call |
//! |---|---|
//! | `transport.info` | identity and configuration queries |
//! | `device.initialize` | `initialize_device` |
//! | `schedule.backup_time`, `schedule.full_backup_time` | scheduling hints |
//! | `backup.perform`, `backup.clear`, `backup.finish`, `backup.quota` | key-value backup |
//! | `full.check_size`, `full.perform`, `full.send`, `full.cancel` | full-stream backup |
//! | `restore.sets`, `restore.current_set`, `restore.start`, `restore.next` | restore walk |
//! | `restore.data`, `restore.next_chunk`, `restore.abort_full`, `restore.finish` | restore data |
//! | `daemon.status` | server health |

pub mod client;
pub mod methods;
mod listener;
mod protocol;

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::context::AppContext;
use listener::Listener;

pub use client::{ClientError, RpcClient};
pub use methods::{MethodHandler, StatusReply};
pub use protocol::{Request, Response, RpcError};

/// RPC server driving one shared transport.
pub struct RpcServer {
    listener: Listener,
    shutdown_tx: broadcast::Sender<()>,
    /// Subscribed at bind time so a shutdown sent before `start` is kept.
    shutdown_rx: Mutex<Option<broadcast::Receiver<()>>>,
}

impl RpcServer {
    /// Bind the server to `bind_addr`. Port 0 picks a free port.
    pub async fn bind(ctx: AppContext, bind_addr: SocketAddr) -> anyhow::Result<Self> {
        let handler = MethodHandler::new(ctx);
        let listener = Listener::bind(bind_addr, handler).await?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        Ok(Self {
            listener,
            shutdown_tx,
            shutdown_rx: Mutex::new(Some(shutdown_rx)),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run until shutdown() is called.
    pub async fn start(&self) -> anyhow::Result<()> {
        let shutdown_rx = self
            .shutdown_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| self.shutdown_tx.subscribe());
        self.listener.serve(shutdown_rx).await
    }

    /// Signal the server to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
