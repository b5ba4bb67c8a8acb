//! A real fatal signal reaches the installed handler and leaves a marker
//!
//! The test re-runs its own binary as a child process. The child installs
//! the handler and aborts; the parent checks how the child died and what the
//! marker says afterwards.

#![cfg(unix)]

use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use logvault_core::{CallSite, LogRecord, Severity};
use logvault_crash::{CrashPreserver, PreserverConfig, RecoverySource, install_crash_handler};
use tempfile::TempDir;

const CHILD_DIR_ENV: &str = "LOGVAULT_ABORTING_CHILD_DIR";
const SIGABRT: i32 = 6;

async fn abort_with_handler(dir: &Path) {
    let preserver = Arc::new(CrashPreserver::new(PreserverConfig::in_dir(dir)).unwrap());
    preserver.record(LogRecord::new(
        Severity::Error,
        "last words",
        "Child",
        CallSite::default(),
    ));
    preserver.persist().await.unwrap();
    install_crash_handler(preserver).unwrap();
    std::process::abort()
}

#[tokio::test]
async fn test_abort_marks_crash_and_reraises() {
    if let Some(dir) = std::env::var_os(CHILD_DIR_ENV) {
        abort_with_handler(Path::new(&dir)).await;
        return;
    }

    let dir = TempDir::new().unwrap();
    let status = Command::new(std::env::current_exe().unwrap())
        .args([
            "--exact",
            "test_abort_marks_crash_and_reraises",
            "--test-threads=1",
        ])
        .env(CHILD_DIR_ENV, dir.path())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap();

    // the default disposition ran after the handler
    assert_eq!(status.signal(), Some(SIGABRT), "child exited with {status:?}");

    let preserver = CrashPreserver::new(PreserverConfig::in_dir(dir.path())).unwrap();
    assert!(preserver.has_crash_data());
    let report = preserver.crash_report().unwrap();
    assert_eq!(report.signal, Some(SIGABRT));
    assert_eq!(report.generation, 1);
    assert_eq!(report.pending_records, 1);

    let recovery = preserver.recover().await.unwrap().unwrap();
    assert_eq!(recovery.source, RecoverySource::Snapshot);
    assert_eq!(recovery.records[0].message(), "last words");
    assert!(!preserver.has_crash_data());
}
