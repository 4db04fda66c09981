//! Payload bytes cross the RPC boundary in both directions.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nullbak::config::AppConfig;
use nullbak::context::AppContext;
use nullbak::core::{
    BackupTransport, FullBackupSocket, PackageInfo, RestoreChunk, RestoreDataType,
    RestoreDescription, RestoreSet, RestoreStep, TransportStatus,
};
use nullbak::rpc::methods::{ChunkReply, RestoreDataReply};
use nullbak::rpc::{MethodHandler, Request, StatusReply};
use serde_json::{Value, json};

/// What the transport saw from the caller.
#[derive(Default)]
struct Received {
    records: Vec<u8>,
    stream: Vec<u8>,
}

/// Transport that keeps every byte it is given and replays scripted chunks.
struct LoopbackTransport {
    received: Arc<Mutex<Received>>,
    socket: Option<FullBackupSocket>,
    chunks: VecDeque<&'static [u8]>,
}

impl LoopbackTransport {
    fn new(received: Arc<Mutex<Received>>, chunks: &[&'static [u8]]) -> Self {
        Self {
            received,
            socket: None,
            chunks: chunks.iter().copied().collect(),
        }
    }
}

impl BackupTransport for LoopbackTransport {
    fn name(&self) -> String {
        "loopback".to_string()
    }

    fn current_destination_string(&self) -> String {
        "memory".to_string()
    }

    fn transport_dir_name(&self) -> String {
        "loopback".to_string()
    }

    fn initialize_device(&mut self) -> TransportStatus {
        TransportStatus::Ok
    }

    fn request_backup_time(&self) -> Duration {
        Duration::ZERO
    }

    fn request_full_backup_time(&self) -> Duration {
        Duration::ZERO
    }

    fn perform_backup(&mut self, _package: &PackageInfo, data: &mut dyn Read) -> TransportStatus {
        let mut received = self.received.lock().unwrap();
        data.read_to_end(&mut received.records).unwrap();
        TransportStatus::Ok
    }

    fn clear_backup_data(&mut self, _package: &PackageInfo) -> TransportStatus {
        TransportStatus::Ok
    }

    fn finish_backup(&mut self) -> TransportStatus {
        self.socket = None;
        TransportStatus::Ok
    }

    fn check_full_backup_size(&self, _size: i64) -> TransportStatus {
        TransportStatus::Ok
    }

    fn perform_full_backup(
        &mut self,
        _package: &PackageInfo,
        socket: FullBackupSocket,
    ) -> TransportStatus {
        self.socket = Some(socket);
        TransportStatus::Ok
    }

    fn send_backup_data(&mut self, num_bytes: u64) -> TransportStatus {
        let Some(socket) = self.socket.as_mut() else {
            return TransportStatus::Error;
        };
        let mut received = self.received.lock().unwrap();
        socket
            .take(num_bytes)
            .read_to_end(&mut received.stream)
            .unwrap();
        TransportStatus::Ok
    }

    fn cancel_full_backup(&mut self) {
        self.socket = None;
    }

    fn get_backup_quota(&self, _package_name: &str, _is_full_backup: bool) -> u64 {
        u64::MAX
    }

    fn get_available_restore_sets(&self) -> Vec<RestoreSet> {
        Vec::new()
    }

    fn get_current_restore_set(&self) -> i64 {
        1
    }

    fn start_restore(&mut self, _token: i64, _packages: Vec<PackageInfo>) -> TransportStatus {
        TransportStatus::Ok
    }

    fn next_restore_package(&mut self) -> RestoreStep {
        RestoreStep::Package(RestoreDescription {
            package: PackageInfo::new("a"),
            data_type: RestoreDataType::FullStream,
        })
    }

    fn get_restore_data(&mut self, out: &mut dyn Write) -> TransportStatus {
        out.write_all(b"key=value").unwrap();
        TransportStatus::Ok
    }

    fn get_next_full_restore_data_chunk(&mut self, out: &mut dyn Write) -> RestoreChunk {
        match self.chunks.pop_front() {
            Some(chunk) => {
                out.write_all(chunk).unwrap();
                RestoreChunk::Data(chunk.len())
            }
            None => RestoreChunk::EndOfStream,
        }
    }

    fn abort_full_restore(&mut self) -> TransportStatus {
        TransportStatus::Ok
    }

    fn finish_restore(&mut self) {}
}

fn handler(chunks: &[&'static [u8]]) -> (MethodHandler, Arc<Mutex<Received>>) {
    let received = Arc::new(Mutex::new(Received::default()));
    let transport = LoopbackTransport::new(received.clone(), chunks);
    let ctx = AppContext::with_transport(AppConfig::default(), Box::new(transport));
    (MethodHandler::new(ctx), received)
}

async fn call(handler: &MethodHandler, method: &str, params: Option<Value>) -> Value {
    let resp = handler.handle(Request::new(method, params, 1)).await;
    assert!(resp.error.is_none(), "{} failed: {:?}", method, resp.error);
    resp.result.unwrap()
}

fn status(result: Value) -> TransportStatus {
    serde_json::from_value::<StatusReply>(result).unwrap().status
}

#[tokio::test]
async fn test_restore_chunks_carry_their_bytes() {
    let (handler, _) = handler(&[&b"hello"[..], &b", world"[..]]);
    call(&handler, "restore.start", Some(json!({ "token": 1 }))).await;
    call(&handler, "restore.next", None).await;

    let mut restored = Vec::new();
    loop {
        let result = call(&handler, "restore.next_chunk", None).await;
        let reply: ChunkReply = serde_json::from_value(result).unwrap();
        match reply.as_chunk() {
            RestoreChunk::Data(n) => {
                let payload = reply.payload().unwrap();
                assert_eq!(payload.len(), n);
                restored.extend(payload);
            }
            RestoreChunk::EndOfStream => break,
            RestoreChunk::Error => panic!("unexpected error chunk"),
        }
    }

    assert_eq!(restored, b"hello, world");
}

#[tokio::test]
async fn test_key_value_restore_carries_bytes() {
    let (handler, _) = handler(&[]);

    let result = call(&handler, "restore.data", None).await;
    let reply: RestoreDataReply = serde_json::from_value(result).unwrap();

    assert_eq!(reply.status, TransportStatus::Ok);
    assert_eq!(reply.bytes, 9);
    assert_eq!(reply.payload().unwrap(), b"key=value");
}

#[tokio::test]
async fn test_key_value_backup_accepts_binary_records() {
    let (handler, received) = handler(&[]);
    let records = [0u8, 159, 146, 150, 255];

    let params = json!({
        "package": { "name": "a" },
        "data": STANDARD.encode(records),
    });
    assert_eq!(
        status(call(&handler, "backup.perform", Some(params)).await),
        TransportStatus::Ok
    );

    assert_eq!(received.lock().unwrap().records, records);
}

#[tokio::test]
async fn test_full_send_feeds_session_socket() {
    let (handler, received) = handler(&[]);

    let params = json!({ "package": { "name": "a" } });
    assert_eq!(
        status(call(&handler, "full.perform", Some(params)).await),
        TransportStatus::Ok
    );

    for chunk in [&b"first "[..], &b"second"[..]] {
        let params = json!({ "data": STANDARD.encode(chunk) });
        assert_eq!(
            status(call(&handler, "full.send", Some(params)).await),
            TransportStatus::Ok
        );
    }

    assert_eq!(received.lock().unwrap().stream, b"first second");
}

#[tokio::test]
async fn test_bytes_sent_without_session_are_dropped() {
    let (handler, received) = handler(&[]);

    let params = json!({ "data": STANDARD.encode(b"stale") });
    assert_eq!(
        status(call(&handler, "full.send", Some(params)).await),
        TransportStatus::Error
    );

    let package = json!({ "package": { "name": "a" } });
    call(&handler, "full.perform", Some(package)).await;
    let params = json!({ "data": STANDARD.encode(b"fresh") });
    call(&handler, "full.send", Some(params)).await;

    assert_eq!(received.lock().unwrap().stream, b"fresh");
}
