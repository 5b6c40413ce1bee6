//! Signal handling
//!
//! Two asynchronous events drive the server: termination signals
//! (`SIGTERM`, `SIGINT`) and the announcement alarm (`SIGALRM`). Handlers
//! do exactly one thing — an atomic store into the shared [`SignalFlags`] —
//! and are registered *without* `SA_RESTART`, so a signal arriving while
//! the command loop is blocked in a receive surfaces as `EINTR` and hands
//! control back to the loop.
//!
//! The flags are owned by an `Arc` shared between the handlers and the
//! loop. A handler cannot capture the `Arc` directly, so a process-wide
//! `OnceLock` holds a clone; `OnceLock::get` is a lock-free atomic load and
//! safe in signal context.

use crate::error::{PulseAgentError, Result};
use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// The coordination point between asynchronous signals and the command loop
#[derive(Debug, Default)]
pub struct SignalFlags {
    /// Set once by a termination signal; read by the loop on every
    /// iteration. The sole writer is the signal path.
    pub terminate: AtomicBool,
    /// Set by the announcement alarm; swapped off by the loop when it
    /// emits the announcement.
    pub announce: AtomicBool,
}

impl SignalFlags {
    /// Fresh flags, nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Has a termination signal been observed?
    pub fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    /// Consume a pending announcement request, if any
    pub fn take_announce(&self) -> bool {
        self.announce.swap(false, Ordering::SeqCst)
    }
}

static INSTALLED: OnceLock<Arc<SignalFlags>> = OnceLock::new();

extern "C" fn on_terminate(_signum: libc::c_int) {
    if let Some(flags) = INSTALLED.get() {
        flags.terminate.store(true, Ordering::SeqCst);
    }
}

extern "C" fn on_alarm(_signum: libc::c_int) {
    if let Some(flags) = INSTALLED.get() {
        flags.announce.store(true, Ordering::SeqCst);
    }
}

/// Install the handlers for `SIGTERM`, `SIGINT` and `SIGALRM`.
///
/// May be called once per process; the flags live for the process lifetime.
pub fn install(flags: Arc<SignalFlags>) -> Result<()> {
    INSTALLED.set(flags).map_err(|_| PulseAgentError::ChannelSetup {
        op: "install signal handlers",
        source: io::Error::new(
            io::ErrorKind::AlreadyExists,
            "signal handlers already installed",
        ),
    })?;

    register(libc::SIGTERM, on_terminate)?;
    register(libc::SIGINT, on_terminate)?;
    register(libc::SIGALRM, on_alarm)?;
    debug!("signal handlers installed");
    Ok(())
}

fn register(signum: libc::c_int, handler: extern "C" fn(libc::c_int)) -> Result<()> {
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = handler as libc::sighandler_t;
    // No SA_RESTART: blocking receives must return EINTR so the loop can
    // re-check the flags.
    action.sa_flags = 0;
    unsafe {
        libc::sigemptyset(&mut action.sa_mask);
    }

    if unsafe { libc::sigaction(signum, &action, ptr::null_mut()) } < 0 {
        return Err(PulseAgentError::ChannelSetup {
            op: "sigaction",
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_flags_start_clear() {
        let flags = SignalFlags::new();
        assert!(!flags.terminate_requested());
        assert!(!flags.take_announce());
    }

    #[test]
    fn test_take_announce_consumes() {
        let flags = SignalFlags::new();
        flags.announce.store(true, Ordering::SeqCst);
        assert!(flags.take_announce());
        assert!(!flags.take_announce());
    }

    // Handler registration is process-global, so every test that raises
    // real signals shares this one.
    #[test]
    #[serial]
    fn test_handlers_set_flags() {
        let flags = Arc::new(SignalFlags::new());
        install(flags.clone()).expect("first install must succeed");

        unsafe {
            libc::raise(libc::SIGALRM);
        }
        assert!(flags.take_announce());
        assert!(!flags.terminate_requested());

        unsafe {
            libc::raise(libc::SIGTERM);
        }
        assert!(flags.terminate_requested());

        // A second install in the same process is rejected
        assert!(install(Arc::new(SignalFlags::new())).is_err());
    }
}
