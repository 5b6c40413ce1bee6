//! Configuration validation
//!
//! Per-transport rules for channel names plus the generic daemon settings.
//! POSIX object names (`mqueue`, `shmem`) must look like `/name`; filesystem
//! endpoints (`fifo`, `socket`) must be absolute paths, and socket paths
//! must additionally fit in `sockaddr_un.sun_path`.

use super::Transport;
use crate::error::{PulseAgentError, Result};
use std::path::Path;

/// Longest socket path accepted: sun_path is 108 bytes including the NUL.
const MAX_SOCKET_PATH_LEN: usize = 107;

/// Longest POSIX object name accepted (NAME_MAX, minus the leading slash)
const MAX_OBJECT_NAME_LEN: usize = 254;

/// Validate a channel name for the given transport
pub fn validate_channel_name(transport: Transport, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PulseAgentError::Config(
            "channel name must not be empty".to_string(),
        ));
    }

    match transport {
        Transport::Mqueue | Transport::Shmem => validate_object_name(name),
        Transport::Fifo => validate_path_name(name),
        Transport::Socket => {
            validate_path_name(name)?;
            if name.len() > MAX_SOCKET_PATH_LEN {
                return Err(PulseAgentError::Config(format!(
                    "socket path '{}' exceeds the {} byte sun_path limit",
                    name, MAX_SOCKET_PATH_LEN
                )));
            }
            Ok(())
        }
    }
}

/// Validate the pid file location
pub fn validate_pidfile(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(PulseAgentError::Config(format!(
            "pid file path '{}' must be absolute",
            path.display()
        )));
    }
    Ok(())
}

/// Validate the announcement interval
pub fn validate_interval(interval_secs: u32) -> Result<()> {
    if interval_secs == 0 {
        return Err(PulseAgentError::Config(
            "announce interval must be at least 1 second".to_string(),
        ));
    }
    Ok(())
}

// A POSIX IPC object name: exactly one slash, at the front.
fn validate_object_name(name: &str) -> Result<()> {
    if !name.starts_with('/') || name.len() < 2 || name[1..].contains('/') {
        return Err(PulseAgentError::Config(format!(
            "object name '{}' must have the form /name with no interior slash",
            name
        )));
    }
    if name.len() - 1 > MAX_OBJECT_NAME_LEN {
        return Err(PulseAgentError::Config(format!(
            "object name '{}' exceeds NAME_MAX",
            name
        )));
    }
    Ok(())
}

fn validate_path_name(name: &str) -> Result<()> {
    if !Path::new(name).is_absolute() {
        return Err(PulseAgentError::Config(format!(
            "channel path '{}' must be absolute",
            name
        )));
    }
    Ok(())
}
