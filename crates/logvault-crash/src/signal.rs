//! Fatal-signal integration
//!
//! Routes SIGABRT, SIGSEGV, SIGBUS, SIGFPE, SIGILL and SIGTRAP to
//! [`CrashPreserver::persist_sync_with_signal`], then lets the default
//! disposition terminate the process.

use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use nix::libc::c_int;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, raise, sigaction};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::PreserveError;
use crate::preserver::CrashPreserver;

pub const FATAL_SIGNALS: [Signal; 6] = [
    Signal::SIGABRT,
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGFPE,
    Signal::SIGILL,
    Signal::SIGTRAP,
];

static INSTALLED: AtomicPtr<CrashPreserver> = AtomicPtr::new(ptr::null_mut());
/// Handlers currently between loading `INSTALLED` and finishing the write
static IN_HANDLER: AtomicUsize = AtomicUsize::new(0);
static PREVIOUS: Mutex<Vec<(Signal, SigAction)>> = parking_lot::const_mutex(Vec::new());

extern "C" fn on_fatal_signal(signo: c_int) {
    // Counted before the load so release_installed can wait for us
    IN_HANDLER.fetch_add(1, Ordering::SeqCst);
    let preserver = INSTALLED.load(Ordering::SeqCst);
    if !preserver.is_null() {
        // SAFETY: the pointer came from Arc::into_raw, and release_installed
        // does not drop it while IN_HANDLER is non-zero.
        unsafe { (*preserver).persist_sync_with_signal(signo) };
    }
    IN_HANDLER.fetch_sub(1, Ordering::SeqCst);
    // SA_RESETHAND already restored the default action
    if let Ok(signal) = Signal::try_from(signo) {
        let _ = raise(signal);
    }
}

/// Install the crash handler for every fatal signal
///
/// Only one preserver can be installed at a time.
pub fn install_crash_handler(preserver: Arc<CrashPreserver>) -> Result<(), PreserveError> {
    let raw = Arc::into_raw(preserver) as *mut CrashPreserver;
    if INSTALLED
        .compare_exchange(ptr::null_mut(), raw, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        // SAFETY: `raw` was produced above and never published.
        drop(unsafe { Arc::from_raw(raw) });
        return Err(PreserveError::Signal("crash handler already installed".into()));
    }

    let action = SigAction::new(
        SigHandler::Handler(on_fatal_signal),
        SaFlags::SA_RESETHAND | SaFlags::SA_NODEFER,
        SigSet::empty(),
    );

    let mut previous = PREVIOUS.lock();
    for signal in FATAL_SIGNALS {
        // SAFETY: the handler only touches atomics and the marker mapping.
        match unsafe { sigaction(signal, &action) } {
            Ok(old) => previous.push((signal, old)),
            Err(e) => {
                restore(&mut previous);
                drop(previous);
                release_installed();
                return Err(e.into());
            }
        }
    }

    info!(signals = FATAL_SIGNALS.len(), "Crash handler installed");
    Ok(())
}

/// Restore the previous dispositions and release the preserver
///
/// A handler already running on another thread finishes its marker write
/// before the preserver is dropped.
pub fn uninstall_crash_handler() {
    let mut previous = PREVIOUS.lock();
    restore(&mut previous);
    drop(previous);
    if release_installed() {
        debug!("Crash handler removed");
    }
}

pub fn is_installed() -> bool {
    !INSTALLED.load(Ordering::SeqCst).is_null()
}

fn restore(previous: &mut Vec<(Signal, SigAction)>) {
    for (signal, action) in previous.drain(..) {
        // SAFETY: reinstating a disposition that was active before.
        let _ = unsafe { sigaction(signal, &action) };
    }
}

fn release_installed() -> bool {
    let raw = INSTALLED.swap(ptr::null_mut(), Ordering::SeqCst);
    if raw.is_null() {
        return false;
    }
    // Handlers that loaded `raw` before the swap are still counted
    while IN_HANDLER.load(Ordering::SeqCst) != 0 {
        std::thread::yield_now();
    }
    // SAFETY: `raw` came from Arc::into_raw in install_crash_handler, and no
    // handler can still observe it.
    drop(unsafe { Arc::from_raw(raw) });
    true
}
