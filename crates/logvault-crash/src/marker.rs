//! Memory-mapped crash marker
//!
//! A small file mapped `MAP_SHARED` so that stores made from a fatal-signal
//! handler reach the page cache without any system call other than `msync`.
//! The header is a fixed block of atomics at aligned offsets; everything
//! after it is an inline copy of the last persisted snapshot.
//!
//! ```text
//! 0   magic        u32
//! 4   version      u32
//! 8   generation   u64   bumped on every crash-path write
//! 16  crashed      u32   0 or 1
//! 20  signal       u32   signal number, 0 when written explicitly
//! 24  pending      u64   ring occupancy at the last record()
//! 32  crashed_at   u64   unix millis
//! 40  payload_len  u64
//! 64  payload      [u8]
//! ```
//!
//! The crash-safe operations (`mark_crashed`, `is_crashed`) perform no
//! allocation, take no locks and never log. Unmapping waits until every
//! in-flight writer has left the region.

use std::fs::OpenOptions;
use std::num::NonZeroUsize;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use nix::sys::mman::{MapFlags, MsFlags, ProtFlags, mmap, msync, munmap};

/// "LVCM" in little-endian byte order
pub const MARKER_MAGIC: u32 = u32::from_le_bytes(*b"LVCM");
pub const MARKER_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 64;
pub const DEFAULT_REGION_LEN: usize = 64 * 1024;

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 4;
const OFF_GENERATION: usize = 8;
const OFF_CRASHED: usize = 16;
const OFF_SIGNAL: usize = 20;
const OFF_PENDING: usize = 24;
const OFF_CRASHED_AT: usize = 32;
const OFF_PAYLOAD_LEN: usize = 40;

/// Header contents read in normal context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerState {
    pub generation: u64,
    pub crashed: bool,
    pub signal: i32,
    pub pending: u64,
    pub crashed_at_millis: u64,
    pub payload_len: usize,
}

pub struct MarkerRegion {
    base: AtomicPtr<u8>,
    len: usize,
    in_flight: AtomicUsize,
}

/// Keeps the mapping alive while a caller touches it
struct Access<'a> {
    region: &'a MarkerRegion,
    base: NonNull<u8>,
}

impl Drop for Access<'_> {
    fn drop(&mut self) {
        self.region.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Access<'_> {
    fn u32_at(&self, offset: usize) -> &AtomicU32 {
        // SAFETY: the mapping is page aligned, offsets are 4-byte aligned and
        // inside the header, and the region stays mapped while `self` lives.
        unsafe { &*(self.base.as_ptr().add(offset) as *const AtomicU32) }
    }

    fn u64_at(&self, offset: usize) -> &AtomicU64 {
        // SAFETY: as above, with 8-byte aligned offsets.
        unsafe { &*(self.base.as_ptr().add(offset) as *const AtomicU64) }
    }

    fn stamp(&self) {
        self.u32_at(OFF_MAGIC).store(MARKER_MAGIC, Ordering::Relaxed);
        self.u32_at(OFF_VERSION).store(MARKER_VERSION, Ordering::Relaxed);
    }

    fn is_valid(&self) -> bool {
        self.u32_at(OFF_MAGIC).load(Ordering::Acquire) == MARKER_MAGIC
            && self.u32_at(OFF_VERSION).load(Ordering::Acquire) == MARKER_VERSION
    }

    fn sync(&self, len: usize, flags: MsFlags) {
        // SAFETY: base is the start of a live mapping of at least `len` bytes.
        let _ = unsafe { msync(self.base.cast(), len, flags) };
    }
}

impl MarkerRegion {
    /// Map `path`, creating it with `len` bytes if needed
    ///
    /// An existing file of the right size keeps its contents so a marker
    /// written by a previous process survives into this one.
    pub fn open(path: &Path, len: usize) -> std::io::Result<Self> {
        let len = len.max(HEADER_LEN);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() != len as u64 {
            file.set_len(len as u64)?;
        }

        let size = NonZeroUsize::new(len)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty region"))?;
        // SAFETY: fresh shared mapping of a file we just sized to `len`.
        let mapped = unsafe {
            mmap(
                None,
                size,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &file,
                0,
            )
        }
        .map_err(std::io::Error::from)?;

        let region = Self {
            base: AtomicPtr::new(mapped.as_ptr() as *mut u8),
            len,
            in_flight: AtomicUsize::new(0),
        };
        region.reset_if_foreign();
        Ok(region)
    }

    /// A region with nothing mapped; every operation is a no-op
    pub fn unmapped() -> Self {
        Self {
            base: AtomicPtr::new(ptr::null_mut()),
            len: 0,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn is_mapped(&self) -> bool {
        !self.base.load(Ordering::SeqCst).is_null()
    }

    /// Bytes available for the inline payload
    pub fn payload_capacity(&self) -> usize {
        self.len.saturating_sub(HEADER_LEN)
    }

    fn access(&self) -> Option<Access<'_>> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        match NonNull::new(self.base.load(Ordering::SeqCst)) {
            Some(base) => Some(Access { region: self, base }),
            None => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                None
            }
        }
    }

    fn reset_if_foreign(&self) {
        let Some(access) = self.access() else { return };
        if access.is_valid() {
            return;
        }
        // SAFETY: the header lies inside the live mapping.
        unsafe { ptr::write_bytes(access.base.as_ptr(), 0, HEADER_LEN) };
        access.sync(HEADER_LEN, MsFlags::MS_SYNC);
    }

    /// Record that the process is going down
    ///
    /// Async-signal-safe. Each field is a single atomic store, so any
    /// interleaving of concurrent callers leaves a valid crashed marker.
    pub fn mark_crashed(&self, signal: i32) {
        let Some(access) = self.access() else { return };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        access.stamp();
        access.u64_at(OFF_GENERATION).fetch_add(1, Ordering::SeqCst);
        access.u32_at(OFF_SIGNAL).store(signal as u32, Ordering::Relaxed);
        access.u64_at(OFF_CRASHED_AT).store(now, Ordering::Relaxed);
        access.u32_at(OFF_CRASHED).store(1, Ordering::Release);
        access.sync(HEADER_LEN, MsFlags::MS_SYNC);
    }

    /// Async-signal-safe
    pub fn is_crashed(&self) -> bool {
        match self.access() {
            Some(access) => access.is_valid() && access.u32_at(OFF_CRASHED).load(Ordering::Acquire) == 1,
            None => false,
        }
    }

    pub fn clear_crash(&self) {
        let Some(access) = self.access() else { return };
        access.u32_at(OFF_CRASHED).store(0, Ordering::Release);
        access.u32_at(OFF_SIGNAL).store(0, Ordering::Relaxed);
        access.u64_at(OFF_CRASHED_AT).store(0, Ordering::Relaxed);
        access.sync(HEADER_LEN, MsFlags::MS_SYNC);
    }

    pub fn set_pending(&self, pending: u64) {
        if let Some(access) = self.access() {
            access.u64_at(OFF_PENDING).store(pending, Ordering::Relaxed);
        }
    }

    pub fn state(&self) -> Option<MarkerState> {
        let access = self.access()?;
        if !access.is_valid() {
            return None;
        }
        Some(MarkerState {
            generation: access.u64_at(OFF_GENERATION).load(Ordering::Acquire),
            crashed: access.u32_at(OFF_CRASHED).load(Ordering::Acquire) == 1,
            signal: access.u32_at(OFF_SIGNAL).load(Ordering::Relaxed) as i32,
            pending: access.u64_at(OFF_PENDING).load(Ordering::Relaxed),
            crashed_at_millis: access.u64_at(OFF_CRASHED_AT).load(Ordering::Relaxed),
            payload_len: access.u64_at(OFF_PAYLOAD_LEN).load(Ordering::Acquire) as usize,
        })
    }

    /// Copy an encoded snapshot behind the header
    ///
    /// Returns false (and leaves no payload) when it does not fit. Callers
    /// must serialize staging against [`read_payload`](Self::read_payload).
    pub fn stage_payload(&self, bytes: &[u8]) -> bool {
        let Some(access) = self.access() else { return false };
        let length = access.u64_at(OFF_PAYLOAD_LEN);
        length.store(0, Ordering::Release);
        access.stamp();
        if bytes.len() > self.payload_capacity() {
            return false;
        }

        // SAFETY: the payload area starts at HEADER_LEN and holds
        // payload_capacity() bytes; `bytes` cannot alias the mapping.
        unsafe {
            ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                access.base.as_ptr().add(HEADER_LEN),
                bytes.len(),
            );
        }
        length.store(bytes.len() as u64, Ordering::Release);
        access.sync(self.len, MsFlags::MS_ASYNC);
        true
    }

    pub fn read_payload(&self) -> Option<Vec<u8>> {
        let access = self.access()?;
        if !access.is_valid() {
            return None;
        }
        let len = access.u64_at(OFF_PAYLOAD_LEN).load(Ordering::Acquire) as usize;
        if len == 0 || len > self.payload_capacity() {
            return None;
        }
        let mut out = vec![0u8; len];
        // SAFETY: bounds checked against the payload area above.
        unsafe {
            ptr::copy_nonoverlapping(access.base.as_ptr().add(HEADER_LEN), out.as_mut_ptr(), len);
        }
        Some(out)
    }

    pub fn clear_payload(&self) {
        if let Some(access) = self.access() {
            access.u64_at(OFF_PAYLOAD_LEN).store(0, Ordering::Release);
        }
    }

    /// Unmap the region; idempotent
    ///
    /// Waits for in-flight accesses to finish before releasing the pages.
    pub fn close(&self) {
        let old = self.base.swap(ptr::null_mut(), Ordering::SeqCst);
        let Some(base) = NonNull::new(old) else { return };
        while self.in_flight.load(Ordering::SeqCst) != 0 {
            std::thread::yield_now();
        }
        // SAFETY: `base`/`len` came from mmap, and no accessor can reach the
        // pointer any more.
        let _ = unsafe { munmap(base.cast(), self.len) };
    }
}

impl Drop for MarkerRegion {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MarkerRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerRegion")
            .field("len", &self.len)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn open(dir: &TempDir) -> MarkerRegion {
        MarkerRegion::open(&dir.path().join("marker.mmap"), 4096).unwrap()
    }

    #[test]
    fn test_fresh_region_is_clean() {
        let dir = TempDir::new().unwrap();
        let region = open(&dir);
        assert!(region.is_mapped());
        assert!(!region.is_crashed());
        assert!(region.state().is_none());
    }

    #[test]
    fn test_mark_and_clear() {
        let dir = TempDir::new().unwrap();
        let region = open(&dir);

        region.set_pending(7);
        region.mark_crashed(6);
        let state = region.state().unwrap();
        assert!(state.crashed);
        assert_eq!(state.signal, 6);
        assert_eq!(state.pending, 7);
        assert_eq!(state.generation, 1);
        assert!(state.crashed_at_millis > 0);

        region.clear_crash();
        assert!(!region.is_crashed());
        assert_eq!(region.state().unwrap().generation, 1);
    }

    #[test]
    fn test_marker_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let region = open(&dir);
            region.mark_crashed(11);
        }
        let region = open(&dir);
        assert!(region.is_crashed());
        assert_eq!(region.state().unwrap().signal, 11);
    }

    #[test]
    fn test_payload_roundtrip_and_overflow() {
        let dir = TempDir::new().unwrap();
        let region = open(&dir);

        assert!(region.stage_payload(b"[1,2,3]"));
        assert_eq!(region.read_payload().unwrap(), b"[1,2,3]");

        let too_big = vec![b'x'; region.payload_capacity() + 1];
        assert!(!region.stage_payload(&too_big));
        assert!(region.read_payload().is_none());
    }

    #[test]
    fn test_close_is_idempotent_and_disables_access() {
        let dir = TempDir::new().unwrap();
        let region = open(&dir);
        region.close();
        region.close();

        assert!(!region.is_mapped());
        region.mark_crashed(6);
        assert!(!region.is_crashed());
        assert!(region.state().is_none());
    }
}
