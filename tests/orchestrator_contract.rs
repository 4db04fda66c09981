//! Caller-side contract of the transport protocol, checked against a
//! scripted transport that records every call it receives.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

use nullbak::core::{
    BackupTransport, FullBackupOutcome, FullBackupSocket, Orchestrator, OrchestratorError,
    PackageInfo, RestoreChunk, RestoreDataType, RestoreDescription, RestoreOptions, RestoreSet,
    RestoreStep, TransportStatus,
};

#[derive(Default)]
struct ScriptedTransport {
    calls: Vec<String>,
    packages: VecDeque<PackageInfo>,
    chunks: VecDeque<RestoreChunk>,
    perform_backup: VecDeque<TransportStatus>,
    send_results: VecDeque<TransportStatus>,
    abort_result: Option<TransportStatus>,
    /// Packages restored as key-value data rather than a stream.
    key_value: Vec<&'static str>,
    restore_data: VecDeque<TransportStatus>,
}

impl ScriptedTransport {
    fn called(&self, name: &str) -> usize {
        self.calls.iter().filter(|c| *c == name).count()
    }
}

impl BackupTransport for ScriptedTransport {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn current_destination_string(&self) -> String {
        String::new()
    }

    fn transport_dir_name(&self) -> String {
        "scripted".to_string()
    }

    fn initialize_device(&mut self) -> TransportStatus {
        self.calls.push("initialize_device".into());
        TransportStatus::Ok
    }

    fn request_backup_time(&self) -> Duration {
        Duration::ZERO
    }

    fn request_full_backup_time(&self) -> Duration {
        Duration::ZERO
    }

    fn perform_backup(&mut self, _package: &PackageInfo, _data: &mut dyn Read) -> TransportStatus {
        self.calls.push("perform_backup".into());
        self.perform_backup.pop_front().unwrap_or(TransportStatus::Ok)
    }

    fn clear_backup_data(&mut self, _package: &PackageInfo) -> TransportStatus {
        self.calls.push("clear_backup_data".into());
        TransportStatus::Ok
    }

    fn finish_backup(&mut self) -> TransportStatus {
        self.calls.push("finish_backup".into());
        TransportStatus::Ok
    }

    fn check_full_backup_size(&self, _size: i64) -> TransportStatus {
        TransportStatus::Ok
    }

    fn perform_full_backup(
        &mut self,
        _package: &PackageInfo,
        _socket: FullBackupSocket,
    ) -> TransportStatus {
        self.calls.push("perform_full_backup".into());
        TransportStatus::Ok
    }

    fn send_backup_data(&mut self, _num_bytes: u64) -> TransportStatus {
        self.calls.push("send_backup_data".into());
        self.send_results.pop_front().unwrap_or(TransportStatus::Ok)
    }

    fn cancel_full_backup(&mut self) {
        self.calls.push("cancel_full_backup".into());
    }

    fn get_backup_quota(&self, _package_name: &str, _is_full_backup: bool) -> u64 {
        u64::MAX
    }

    fn get_available_restore_sets(&self) -> Vec<RestoreSet> {
        Vec::new()
    }

    fn get_current_restore_set(&self) -> i64 {
        7
    }

    fn start_restore(&mut self, _token: i64, packages: Vec<PackageInfo>) -> TransportStatus {
        self.calls.push("start_restore".into());
        self.packages = packages.into();
        TransportStatus::Ok
    }

    fn next_restore_package(&mut self) -> RestoreStep {
        self.calls.push("next_restore_package".into());
        match self.packages.pop_front() {
            Some(package) => {
                let data_type = if self.key_value.iter().any(|k| *k == package.name) {
                    RestoreDataType::KeyValue
                } else {
                    RestoreDataType::FullStream
                };
                RestoreStep::Package(RestoreDescription { package, data_type })
            }
            None => RestoreStep::NoMorePackages,
        }
    }

    fn get_restore_data(&mut self, out: &mut dyn Write) -> TransportStatus {
        self.calls.push("get_restore_data".into());
        let status = self.restore_data.pop_front().unwrap_or(TransportStatus::Ok);
        if status.is_ok() {
            out.write_all(b"kv-data").unwrap();
        }
        status
    }

    fn get_next_full_restore_data_chunk(&mut self, out: &mut dyn Write) -> RestoreChunk {
        self.calls.push("get_next_full_restore_data_chunk".into());
        let chunk = self.chunks.pop_front().unwrap_or(RestoreChunk::EndOfStream);
        if let RestoreChunk::Data(n) = chunk {
            out.write_all(&vec![0u8; n]).unwrap();
        }
        chunk
    }

    fn abort_full_restore(&mut self) -> TransportStatus {
        self.calls.push("abort_full_restore".into());
        self.abort_result.unwrap_or(TransportStatus::Ok)
    }

    fn finish_restore(&mut self) {
        self.calls.push("finish_restore".into());
    }
}

fn packages(names: &[&str]) -> Vec<PackageInfo> {
    names.iter().map(|n| PackageInfo::new(*n)).collect()
}

#[test]
fn test_end_of_stream_advances_to_next_package() {
    let mut transport = ScriptedTransport {
        chunks: VecDeque::from([
            RestoreChunk::Data(100),
            RestoreChunk::Data(50),
            RestoreChunk::EndOfStream,
            RestoreChunk::EndOfStream,
        ]),
        ..Default::default()
    };
    let mut out = Vec::new();

    let report = Orchestrator::new(&mut transport)
        .restore(7, packages(&["a", "b"]), RestoreOptions::default(), &mut out)
        .unwrap();

    assert_eq!(
        report.restored,
        vec![("a".to_string(), 150), ("b".to_string(), 0)]
    );
    assert_eq!(out.len(), 150);
    assert_eq!(
        transport.calls,
        vec![
            "start_restore",
            "next_restore_package",
            "get_next_full_restore_data_chunk",
            "get_next_full_restore_data_chunk",
            "get_next_full_restore_data_chunk",
            "next_restore_package",
            "get_next_full_restore_data_chunk",
            "next_restore_package",
            "finish_restore",
        ]
    );
}

#[test]
fn test_key_value_packages_restore_through_get_restore_data() {
    let mut transport = ScriptedTransport {
        key_value: vec!["kv", "broken"],
        restore_data: VecDeque::from([TransportStatus::Ok, TransportStatus::Error]),
        ..Default::default()
    };
    let mut out = Vec::new();

    let report = Orchestrator::new(&mut transport)
        .restore(
            7,
            packages(&["kv", "broken", "stream"]),
            RestoreOptions::default(),
            &mut out,
        )
        .unwrap();

    assert_eq!(
        report.restored,
        vec![("kv".to_string(), 7), ("stream".to_string(), 0)]
    );
    assert_eq!(
        report.failed,
        vec![("broken".to_string(), TransportStatus::Error)]
    );
    assert_eq!(out, b"kv-data");
    assert_eq!(transport.called("get_restore_data"), 2);
    assert_eq!(transport.called("get_next_full_restore_data_chunk"), 1);
    assert_eq!(transport.called("finish_restore"), 1);
}

#[test]
fn test_negative_chunk_stops_all_further_calls() {
    let mut transport = ScriptedTransport {
        chunks: VecDeque::from([RestoreChunk::Data(10), RestoreChunk::Error]),
        ..Default::default()
    };

    let err = Orchestrator::new(&mut transport)
        .restore(
            7,
            packages(&["a", "b", "c"]),
            RestoreOptions::default(),
            &mut std::io::sink(),
        )
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::RestoreAborted { ref package } if package == "a"));
    assert_eq!(
        transport.calls.last().map(String::as_str),
        Some("get_next_full_restore_data_chunk")
    );
    assert_eq!(transport.called("next_restore_package"), 1);
    assert_eq!(transport.called("finish_restore"), 0);
}

#[test]
fn test_oversized_package_is_abandoned_and_restore_continues() {
    let mut transport = ScriptedTransport {
        chunks: VecDeque::from([
            RestoreChunk::Data(600),
            RestoreChunk::Data(600),
            RestoreChunk::EndOfStream,
        ]),
        ..Default::default()
    };
    let options = RestoreOptions {
        max_package_bytes: Some(1000),
    };

    let report = Orchestrator::new(&mut transport)
        .restore(7, packages(&["big", "small"]), options, &mut std::io::sink())
        .unwrap();

    assert_eq!(report.abandoned, vec!["big".to_string()]);
    assert_eq!(report.restored, vec![("small".to_string(), 0)]);
    assert_eq!(transport.called("abort_full_restore"), 1);
    assert_eq!(transport.called("finish_restore"), 1);
}

#[test]
fn test_failed_abort_is_fatal() {
    let mut transport = ScriptedTransport {
        chunks: VecDeque::from([RestoreChunk::Data(2000)]),
        abort_result: Some(TransportStatus::Error),
        ..Default::default()
    };
    let options = RestoreOptions {
        max_package_bytes: Some(1000),
    };

    let err = Orchestrator::new(&mut transport)
        .restore(7, packages(&["big", "next"]), options, &mut std::io::sink())
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::RestoreAborted { .. }));
    assert_eq!(transport.calls.last().map(String::as_str), Some("abort_full_restore"));
    assert_eq!(transport.called("next_restore_package"), 1);
}

#[test]
fn test_quota_exceeded_cancels_session() {
    let mut transport = ScriptedTransport {
        send_results: VecDeque::from([TransportStatus::Ok, TransportStatus::QuotaExceeded]),
        ..Default::default()
    };

    let outcome =
        Orchestrator::new(&mut transport).backup_full(&PackageInfo::new("a"), vec![0u8; 300], 100);

    assert_eq!(outcome, FullBackupOutcome::QuotaExceeded { bytes: 200 });
    assert_eq!(
        transport.calls,
        vec![
            "perform_full_backup",
            "send_backup_data",
            "send_backup_data",
            "cancel_full_backup",
        ]
    );
}

#[test]
fn test_not_initialized_triggers_initialize_and_retry() {
    let mut transport = ScriptedTransport {
        perform_backup: VecDeque::from([TransportStatus::NotInitialized, TransportStatus::Ok]),
        ..Default::default()
    };
    let items = vec![(PackageInfo::new("a"), b"records".to_vec())];

    let report = Orchestrator::new(&mut transport)
        .backup_key_value(&items)
        .unwrap();

    assert_eq!(report.succeeded, vec!["a".to_string()]);
    assert_eq!(
        transport.calls,
        vec![
            "perform_backup",
            "initialize_device",
            "perform_backup",
            "finish_backup",
        ]
    );
}

#[test]
fn test_key_value_failures_are_reported_per_package() {
    let mut transport = ScriptedTransport {
        perform_backup: VecDeque::from([TransportStatus::Ok, TransportStatus::Error]),
        ..Default::default()
    };
    let items = vec![
        (PackageInfo::new("a"), Vec::new()),
        (PackageInfo::new("b"), Vec::new()),
    ];

    let report = Orchestrator::new(&mut transport)
        .backup_key_value(&items)
        .unwrap();

    assert_eq!(report.succeeded, vec!["a".to_string()]);
    assert_eq!(report.failed, vec![("b".to_string(), TransportStatus::Error)]);
    assert_eq!(transport.called("finish_backup"), 1);
}
