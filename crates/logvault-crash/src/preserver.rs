//! Crash-surviving ring of recent log records
//!
//! Every record the facade accepts is pushed into a fixed-size ring. The
//! ring is written to a JSON snapshot on request ([`CrashPreserver::persist`])
//! and read back on the next launch ([`CrashPreserver::recover`]). When the
//! process dies before it can persist, the crash path only flips a marker in
//! a memory-mapped file; recovery reports it alongside whatever snapshot is
//! available.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use logvault_core::{LogRecord, Ring};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::error::PreserveError;
use crate::marker::{DEFAULT_REGION_LEN, MarkerRegion, MarkerState};

pub const DEFAULT_CAPACITY: usize = 50;
pub const SNAPSHOT_VERSION: u32 = 1;

/// Where and how much to preserve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreserverConfig {
    /// Number of most recent records retained
    pub capacity: usize,
    /// JSON snapshot written by `persist`
    pub snapshot_path: PathBuf,
    /// Memory-mapped marker; defaults to the snapshot path with `.mmap`
    pub marker_path: Option<PathBuf>,
    /// Size of the marker mapping, header included
    pub marker_len: usize,
}

impl Default for PreserverConfig {
    fn default() -> Self {
        Self::new("./data/crash/crash_logs.json")
    }
}

impl PreserverConfig {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            snapshot_path: snapshot_path.into(),
            marker_path: None,
            marker_len: DEFAULT_REGION_LEN,
        }
    }

    /// Snapshot and marker inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join("crash_logs.json"))
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_marker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.marker_path = Some(path.into());
        self
    }

    pub fn with_marker_len(mut self, len: usize) -> Self {
        self.marker_len = len;
        self
    }

    pub fn resolved_marker_path(&self) -> PathBuf {
        self.marker_path
            .clone()
            .unwrap_or_else(|| self.snapshot_path.with_extension("mmap"))
    }
}

/// What the crash marker said about the previous run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    /// Number of crash-path writes ever made to this marker
    pub generation: u64,
    /// Fatal signal, when the marker was written from a signal handler
    pub signal: Option<i32>,
    /// Ring occupancy at the time of the crash
    pub pending_records: u64,
    pub crashed_at: Option<DateTime<Utc>>,
}

impl CrashReport {
    fn from_state(state: &MarkerState) -> Self {
        let crashed_at = match state.crashed_at_millis {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms as i64).single(),
        };
        Self {
            generation: state.generation,
            signal: (state.signal != 0).then_some(state.signal),
            pending_records: state.pending,
            crashed_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySource {
    /// The JSON snapshot file
    Snapshot,
    /// The copy staged inside the marker mapping
    Marker,
    /// Only the crash marker was found
    None,
}

/// Records carried over from the previous run
#[derive(Debug, Clone, PartialEq)]
pub struct Recovery {
    pub records: Vec<LogRecord>,
    pub crash: Option<CrashReport>,
    pub source: RecoverySource,
}

impl Recovery {
    pub fn crashed(&self) -> bool {
        self.crash.is_some()
    }
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    written_at: DateTime<Utc>,
    records: &'a [LogRecord],
}

#[derive(Deserialize)]
struct SnapshotIn {
    #[serde(default)]
    version: u32,
    records: Vec<LogRecord>,
}

/// Fixed-capacity record history with crash-safe persistence
pub struct CrashPreserver {
    ring: Mutex<Ring<LogRecord>>,
    snapshot_path: PathBuf,
    marker_path: PathBuf,
    marker: MarkerRegion,
    /// Serializes snapshot I/O and payload staging
    io_lock: tokio::sync::Mutex<()>,
}

impl CrashPreserver {
    /// Create a preserver and map its crash marker
    ///
    /// A marker that cannot be mapped is logged and skipped; the snapshot
    /// path still works.
    pub fn new(config: PreserverConfig) -> Result<Self, PreserveError> {
        let ring = Ring::new(config.capacity)?;
        let marker_path = config.resolved_marker_path();

        let marker = match MarkerRegion::open(&marker_path, config.marker_len) {
            Ok(region) => region,
            Err(e) => {
                warn!(path = %marker_path.display(), error = %e, "Crash marker unavailable");
                MarkerRegion::unmapped()
            }
        };

        debug!(
            capacity = config.capacity,
            snapshot = %config.snapshot_path.display(),
            marker = %marker_path.display(),
            "Crash preserver ready"
        );

        Ok(Self {
            ring: Mutex::new(ring),
            snapshot_path: config.snapshot_path,
            marker_path,
            marker,
            io_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    /// Remember a record, evicting the oldest when full
    pub fn record(&self, record: LogRecord) {
        let len = {
            let mut ring = self.ring.lock();
            ring.push(record);
            ring.len()
        };
        self.marker.set_pending(len as u64);
    }

    /// Retained records, oldest first
    pub fn current_records(&self) -> Vec<LogRecord> {
        self.ring.lock().snapshot()
    }

    /// Write the ring to the snapshot file
    ///
    /// Does nothing when the ring is empty. The file is replaced atomically
    /// (write to a temporary sibling, then rename), and a copy is staged in
    /// the marker mapping when it fits.
    #[instrument(skip_all, fields(path = %self.snapshot_path.display()))]
    pub async fn persist(&self) -> Result<(), PreserveError> {
        let records = self.current_records();
        if records.is_empty() {
            return Ok(());
        }

        let encoded = serde_json::to_vec(&SnapshotOut {
            version: SNAPSHOT_VERSION,
            written_at: Utc::now(),
            records: &records,
        })
        .map_err(|e| PreserveError::encode(e.to_string()))?;

        let _guard = self.io_lock.lock().await;

        if let Some(parent) = self.snapshot_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.snapshot_path.with_extension("json.tmp");
        {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(&encoded).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp_path, &self.snapshot_path).await?;

        let staged = self.marker.stage_payload(&encoded);
        debug!(
            records = records.len(),
            bytes = encoded.len(),
            staged,
            "Crash snapshot written"
        );
        Ok(())
    }

    /// Read back what the previous run left behind
    ///
    /// Returns `None` when there is neither a snapshot nor a crash marker.
    /// A crash marker is cleared once recovery succeeds. An undecodable
    /// snapshot is a `Decode` error unless the marker reports a crash, in
    /// which case the staged copy (or no records) is returned with the report.
    #[instrument(skip_all, fields(path = %self.snapshot_path.display()))]
    pub async fn recover(&self) -> Result<Option<Recovery>, PreserveError> {
        let _guard = self.io_lock.lock().await;

        let crash = self
            .marker
            .state()
            .filter(|state| state.crashed)
            .map(|state| CrashReport::from_state(&state));

        let mut source = RecoverySource::None;
        let mut records = match tokio::fs::read(&self.snapshot_path).await {
            Ok(bytes) if bytes.is_empty() => Vec::new(),
            Ok(bytes) => match decode_snapshot(&bytes) {
                Ok(records) => records,
                // The crash itself must still be reported
                Err(e) if crash.is_some() => {
                    warn!(error = %e, "Unreadable snapshot after a crash");
                    Vec::new()
                }
                Err(e) => return Err(e),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if !records.is_empty() {
            source = RecoverySource::Snapshot;
        }

        if records.is_empty() && crash.is_some() {
            if let Some(payload) = self.marker.read_payload() {
                match decode_snapshot(&payload) {
                    Ok(staged) if !staged.is_empty() => {
                        records = staged;
                        source = RecoverySource::Marker;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Ignoring unreadable staged snapshot"),
                }
            }
        }

        if records.is_empty() && crash.is_none() {
            return Ok(None);
        }

        if let Some(report) = &crash {
            info!(
                generation = report.generation,
                signal = ?report.signal,
                pending = report.pending_records,
                recovered = records.len(),
                "Recovered from crash"
            );
            self.marker.clear_crash();
        } else {
            debug!(recovered = records.len(), "Recovered persisted records");
        }

        Ok(Some(Recovery {
            records,
            crash,
            source,
        }))
    }

    /// Delete the snapshot and forget every retained record
    #[instrument(skip_all, fields(path = %self.snapshot_path.display()))]
    pub async fn clear(&self) -> Result<(), PreserveError> {
        let _guard = self.io_lock.lock().await;
        match tokio::fs::remove_file(&self.snapshot_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.ring.lock().clear();
        self.marker.set_pending(0);
        self.marker.clear_payload();
        debug!("Crash snapshot cleared");
        Ok(())
    }

    /// Crash-path write: mark the marker as crashed
    ///
    /// Async-signal-safe: no allocation, no locks, no logging. Safe to call
    /// concurrently from any number of threads, and a no-op after
    /// [`cleanup`](Self::cleanup).
    pub fn persist_sync(&self) {
        self.marker.mark_crashed(0);
    }

    /// [`persist_sync`](Self::persist_sync) tagged with the fatal signal
    pub fn persist_sync_with_signal(&self, signal: i32) {
        self.marker.mark_crashed(signal);
    }

    /// Whether the marker says the previous (or current) run crashed
    pub fn has_crash_data(&self) -> bool {
        self.marker.is_crashed()
    }

    /// The crash marker as it stands, without clearing it
    pub fn crash_report(&self) -> Option<CrashReport> {
        self.marker
            .state()
            .filter(|state| state.crashed)
            .map(|state| CrashReport::from_state(&state))
    }

    /// Reset the crash flag, keeping the mapping and generation counter
    pub fn clear_mmap_data(&self) {
        self.marker.clear_crash();
    }

    /// Unmap the marker; crash-path calls become no-ops afterwards
    pub fn cleanup(&self) {
        self.marker.close();
    }

    /// Persist, giving up after `timeout`
    pub async fn persist_within(&self, timeout: Duration) -> Result<(), PreserveError> {
        match tokio::time::timeout(timeout, self.persist()).await {
            Ok(result) => result,
            Err(_) => Err(PreserveError::Io(format!(
                "persist timed out after {:?}",
                timeout
            ))),
        }
    }
}

impl std::fmt::Debug for CrashPreserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashPreserver")
            .field("snapshot_path", &self.snapshot_path)
            .field("marker", &self.marker)
            .finish_non_exhaustive()
    }
}

fn decode_snapshot(bytes: &[u8]) -> Result<Vec<LogRecord>, PreserveError> {
    // Bare arrays are accepted as well as the versioned envelope
    if bytes.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'[') {
        return serde_json::from_slice(bytes).map_err(|e| PreserveError::decode(e.to_string()));
    }
    let snapshot: SnapshotIn =
        serde_json::from_slice(bytes).map_err(|e| PreserveError::decode(e.to_string()))?;
    if snapshot.version > SNAPSHOT_VERSION {
        return Err(PreserveError::decode(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }
    Ok(snapshot.records)
}
