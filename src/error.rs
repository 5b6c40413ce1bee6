//! Error types for pulse-agent
//!
//! This module defines the error types used throughout the application.
//! We use `thiserror` for ergonomic error definitions and `anyhow` for
//! error propagation at the binary boundary. Each fatal class maps to its
//! own process exit code so callers and scripts can tell the failure modes
//! apart.

use std::io;
use thiserror::Error;

/// Main error type for pulse-agent operations
#[derive(Error, Debug)]
pub enum PulseAgentError {
    /// The named resource is already claimed by another instance.
    ///
    /// Creation is never retried: a second creator losing the race is a
    /// single-instance-server violation, not a contended resource.
    #[error("another instance already holds '{resource}'")]
    AlreadyRunning {
        /// Name of the contested resource (channel name or pid file path)
        resource: String,
    },

    /// A controller tried to attach to a channel that does not exist
    #[error("no server is running at control channel '{name}'")]
    NotRunning {
        /// Name of the channel the controller tried to open
        name: String,
    },

    /// Creating or opening the named resource failed for a reason other
    /// than exclusivity
    #[error("channel setup failed in {op}: {source}")]
    ChannelSetup {
        /// The operation that failed (e.g. "mkfifo", "shm_open")
        op: &'static str,
        /// The originating OS error
        #[source]
        source: io::Error,
    },

    /// A send or receive failed for a reason other than interruption
    #[error("transport I/O failed in {op}: {source}")]
    Transport {
        /// The operation that failed (e.g. "read", "mq_receive")
        op: &'static str,
        /// The originating OS error
        #[source]
        source: io::Error,
    },

    /// A blocking call was interrupted by an asynchronous signal.
    ///
    /// Always handled locally: the caller re-checks the termination flag and
    /// either retries the call or stops cleanly. Never surfaces to the user.
    #[error("blocking call interrupted by signal")]
    Interrupted,

    /// Configuration-related errors
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias using PulseAgentError
pub type Result<T> = std::result::Result<T, PulseAgentError>;

impl PulseAgentError {
    /// Process exit code for this error class.
    ///
    /// Codes are distinct per failure class and stable; the exact values
    /// carry no meaning beyond that.
    pub fn exit_code(&self) -> i32 {
        match self {
            PulseAgentError::AlreadyRunning { .. } => 2,
            PulseAgentError::NotRunning { .. } => 3,
            PulseAgentError::ChannelSetup { .. } => 4,
            PulseAgentError::Transport { .. } => 5,
            PulseAgentError::Config(_) => 6,
            PulseAgentError::Interrupted => 1,
        }
    }
}

impl From<toml::de::Error> for PulseAgentError {
    fn from(err: toml::de::Error) -> Self {
        PulseAgentError::Config(err.to_string())
    }
}
