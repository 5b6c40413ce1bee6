//! pulse-agent: single-instance control-channel daemon
//!
//! This library implements a long-running server that owns a named,
//! process-unique control channel. Exactly one controller at a time can
//! attach to the channel and send short text commands (principally `QUIT`),
//! while the server concurrently announces the wall-clock time on a periodic
//! alarm. The channel is transport-agnostic: the same command loop runs over
//! a FIFO, a POSIX message queue, a shared-memory block with a semaphore
//! handshake, or a UNIX-domain datagram socket, selected by configuration.
//!
//! # Architecture
//!
//! The server claims single-instance ownership through a pid file, creates
//! the named channel with the transport's exclusive-create primitive, and
//! blocks in a receive loop. Termination signals and the announcement alarm
//! interrupt the blocking receive; the loop re-checks a shared atomic flag
//! after every interruption and tears the channel down on every exit path.
//!
//! # Modules
//!
//! - `announce`: periodic wall-clock announcement driven by `SIGALRM`
//! - `channel`: channel lifecycle manager and the four transports
//! - `config`: configuration parsing and validation
//! - `control`: command wire format, command loop, and controller
//! - `error`: error types and exit-code mapping
//! - `pidfile`: single-instance arbiter with stale-owner recovery
//! - `signal`: signal handler installation and the shared flags

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod announce;
pub mod channel;
pub mod config;
pub mod control;
pub mod error;
pub mod pidfile;
pub mod signal;

// Re-export commonly used types
pub use error::{PulseAgentError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
