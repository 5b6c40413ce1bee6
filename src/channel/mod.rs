//! Control channel lifecycle management
//!
//! This module owns the named channel resource from creation to teardown.
//! One interface, four interchangeable transports: a FIFO, a POSIX message
//! queue, a POSIX shared-memory block with a semaphore handshake, and a
//! UNIX-domain datagram socket. The command loop never sees which transport
//! is configured.
//!
//! Exclusivity is enforced with each transport's native create-if-absent
//! primitive (`O_EXCL`, `EADDRINUSE`), never with a check-then-create
//! sequence. The process that created the resource is its owner and is the
//! only one that unlinks it; owners are move-only values whose drop releases
//! the resource exactly once.

mod fifo;
pub mod framing;
mod mqueue;
mod shmem;
mod socket;

pub use fifo::{FifoChannel, FifoSender};
pub use mqueue::{MessageQueueChannel, MessageQueueSender};
pub use shmem::{SharedMemoryChannel, SharedMemorySender};
pub use socket::{DatagramChannel, DatagramSender};

use crate::config::{ChannelConfig, Transport};
use crate::error::{PulseAgentError, Result};
use std::io;

/// Default FIFO path
pub const DEFAULT_FIFO_PATH: &str = "/tmp/pulse-agent.fifo";

/// Default UNIX datagram socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/pulse-agent.sock";

/// Default POSIX message queue name
pub const DEFAULT_QUEUE_NAME: &str = "/pulse-agent";

/// Default POSIX shared memory object name
pub const DEFAULT_SHM_NAME: &str = "/pulse-agent";

/// Outcome of one blocking receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A complete command payload, delimiter excluded
    Message(Vec<u8>),
    /// The last writer closed its end; the caller should re-block.
    /// Message-oriented transports never report this.
    Disconnected,
}

/// Server side of a control channel.
///
/// Implementations are created through [`create_exclusive`] and own the
/// named resource: dropping one (or calling [`ControlChannel::release`])
/// closes the local handle and unlinks the name so no future process can
/// attach.
#[cfg_attr(test, mockall::automock)]
pub trait ControlChannel {
    /// Block until a complete command arrives.
    ///
    /// Returns [`PulseAgentError::Interrupted`] when an asynchronous signal
    /// interrupted the wait; the caller re-checks its termination flag and
    /// retries. Any other error is a genuine transport failure and fatal.
    fn receive(&mut self) -> Result<Received>;

    /// Tear the channel down: close the handle and unlink the named
    /// resource. Idempotent; also invoked from drop.
    fn release(&mut self);

    /// The channel's configured name
    fn name(&self) -> &str;
}

/// Controller side of a control channel
pub trait ControlSender {
    /// Deliver one command payload to the server.
    ///
    /// Interruptions are retried internally; they never surface to the
    /// controller.
    fn send(&mut self, payload: &[u8]) -> Result<()>;
}

/// Create the named channel exclusively, claiming ownership.
///
/// Fails with [`PulseAgentError::AlreadyRunning`] if another creator holds
/// the name; this is fatal and never retried.
pub fn create_exclusive(config: &ChannelConfig) -> Result<Box<dyn ControlChannel>> {
    match config.transport {
        Transport::Fifo => Ok(Box::new(FifoChannel::create(&config.name)?)),
        Transport::Mqueue => Ok(Box::new(MessageQueueChannel::create(&config.name)?)),
        Transport::Shmem => Ok(Box::new(SharedMemoryChannel::create(&config.name)?)),
        Transport::Socket => Ok(Box::new(DatagramChannel::create(&config.name)?)),
    }
}

/// Attach to a channel a server already created.
///
/// Fails with [`PulseAgentError::NotRunning`] when the name does not exist,
/// so the caller can report "server not running" rather than a generic
/// failure.
pub fn open_existing(config: &ChannelConfig) -> Result<Box<dyn ControlSender>> {
    match config.transport {
        Transport::Fifo => Ok(Box::new(FifoSender::open(&config.name)?)),
        Transport::Mqueue => Ok(Box::new(MessageQueueSender::open(&config.name)?)),
        Transport::Shmem => Ok(Box::new(SharedMemorySender::open(&config.name)?)),
        Transport::Socket => Ok(Box::new(DatagramSender::open(&config.name)?)),
    }
}

/// Unlink an orphaned channel artifact left behind by a dead owner.
///
/// Returns `true` if an artifact existed and was removed. Only the stale
/// recovery path calls this; a live owner's resource is never touched.
pub fn remove_artifact(config: &ChannelConfig) -> Result<bool> {
    let removed = match config.transport {
        Transport::Fifo => fifo::unlink(&config.name),
        Transport::Mqueue => mqueue::unlink(&config.name),
        Transport::Shmem => shmem::unlink(&config.name),
        Transport::Socket => socket::unlink(&config.name),
    };
    match removed {
        Ok(removed) => Ok(removed),
        Err(e) => Err(PulseAgentError::ChannelSetup {
            op: "remove stale artifact",
            source: e,
        }),
    }
}

/// Does the named channel resource currently exist?
pub fn probe(config: &ChannelConfig) -> bool {
    match config.transport {
        Transport::Fifo => fifo::exists(&config.name),
        Transport::Mqueue => mqueue::exists(&config.name),
        Transport::Shmem => shmem::exists(&config.name),
        Transport::Socket => socket::exists(&config.name),
    }
}

// ---- shared helpers for the transport implementations ----

/// Channel names cross the FFI boundary as C strings
pub(crate) fn name_cstring(name: &str) -> Result<std::ffi::CString> {
    std::ffi::CString::new(name.as_bytes()).map_err(|_| {
        PulseAgentError::Config(format!("channel name '{}' contains a NUL byte", name))
    })
}

/// Capture errno from the last failed libc call
pub(crate) fn last_os_error() -> io::Error {
    io::Error::last_os_error()
}

pub(crate) fn is_interrupted(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Interrupted
}

/// Map a creation failure: an existing claim becomes `AlreadyRunning`,
/// anything else is a setup failure.
pub(crate) fn map_create_error(name: &str, op: &'static str, err: io::Error) -> PulseAgentError {
    if err.kind() == io::ErrorKind::AlreadyExists || err.kind() == io::ErrorKind::AddrInUse {
        PulseAgentError::AlreadyRunning {
            resource: name.to_string(),
        }
    } else {
        PulseAgentError::ChannelSetup { op, source: err }
    }
}

/// Map an attach failure: a missing name means the server is not running.
pub(crate) fn map_open_error(name: &str, op: &'static str, err: io::Error) -> PulseAgentError {
    if err.kind() == io::ErrorKind::NotFound {
        PulseAgentError::NotRunning {
            name: name.to_string(),
        }
    } else {
        PulseAgentError::ChannelSetup { op, source: err }
    }
}
