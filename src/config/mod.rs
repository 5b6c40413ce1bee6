//! Configuration management
//!
//! This module handles parsing and validation of the agent configuration
//! from a TOML file. Every field has a default, and a missing file falls
//! back to the built-in defaults so the server can run unconfigured.

mod validation;

use crate::error::{PulseAgentError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Control channel selection and naming
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Daemon bookkeeping (pid file, staleness policy)
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Periodic announcement settings
    #[serde(default)]
    pub announce: AnnounceConfig,
}

/// Which IPC transport backs the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Named pipe (FIFO) with newline-delimited commands
    Fifo,
    /// POSIX message queue, one command per message
    Mqueue,
    /// POSIX shared memory with a two-semaphore handshake
    Shmem,
    /// UNIX-domain datagram socket, one command per datagram
    Socket,
}

/// Configuration for the control channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Transport backing the channel
    #[serde(default = "default_transport")]
    pub transport: Transport,

    /// Name of the channel resource: a filesystem path for `fifo` and
    /// `socket`, a `/name` identifier for `mqueue` and `shmem`. An empty
    /// name resolves to the per-transport default.
    #[serde(default)]
    pub name: String,
}

/// Daemon bookkeeping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path of the pid file used for single-instance arbitration
    #[serde(default = "default_pidfile")]
    pub pidfile: PathBuf,

    /// Probe `/proc/<pid>` of a pre-existing pid file's holder and reclaim
    /// the instance claim when the holder is dead
    #[serde(default = "default_stale_check")]
    pub stale_check: bool,
}

/// Periodic announcement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnounceConfig {
    /// Seconds between wall-clock announcements
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u32,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error: the built-in defaults apply, so a
    /// freshly installed agent runs without any configuration present.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::parse(&fs::read_to_string(path).map_err(|e| {
                PulseAgentError::Config(format!("failed to read config file {:?}: {}", path, e))
            })?)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Config::default()
        };
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml)
            .map_err(|e| PulseAgentError::Config(format!("failed to parse TOML config: {}", e)))
    }

    /// Resolve empty fields to their defaults
    fn normalize(&mut self) {
        if self.channel.name.is_empty() {
            self.channel.name = default_channel_name(self.channel.transport).to_string();
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_channel_name(self.channel.transport, &self.channel.name)?;
        validation::validate_pidfile(&self.daemon.pidfile)?;
        validation::validate_interval(self.announce.interval_secs)?;
        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            name: String::new(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pidfile: default_pidfile(),
            stale_check: default_stale_check(),
        }
    }
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

/// Built-in channel name for a transport
pub fn default_channel_name(transport: Transport) -> &'static str {
    match transport {
        Transport::Fifo => crate::channel::DEFAULT_FIFO_PATH,
        Transport::Mqueue => crate::channel::DEFAULT_QUEUE_NAME,
        Transport::Shmem => crate::channel::DEFAULT_SHM_NAME,
        Transport::Socket => crate::channel::DEFAULT_SOCKET_PATH,
    }
}

// Default value functions for serde
fn default_transport() -> Transport {
    Transport::Fifo
}

fn default_pidfile() -> PathBuf {
    PathBuf::from("/tmp/pulse-agent.pid")
}

fn default_stale_check() -> bool {
    true
}

fn default_interval_secs() -> u32 {
    5
}
