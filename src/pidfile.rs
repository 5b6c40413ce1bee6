//! Pid-file single-instance arbiter
//!
//! The server records its pid in a file created with exclusive semantics
//! before touching the channel. A pre-existing pid file normally means
//! another instance is running; with stale checking enabled, the recorded
//! pid is probed via `/proc/<pid>` and a provably dead holder's claim is
//! reclaimed — once. An unreadable or garbage pid file is treated as a live
//! holder: a pre-existing claim is rejected unless proven stale.

use crate::error::{PulseAgentError, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An acquired instance claim; removing the file on drop, once.
pub struct PidFile {
    path: Option<PathBuf>,
    reclaimed_stale: bool,
}

impl PidFile {
    /// Claim single-instance ownership.
    ///
    /// Fails with [`PulseAgentError::AlreadyRunning`] when the file exists
    /// and its holder is alive (or cannot be proven dead).
    pub fn acquire(path: &Path, stale_check: bool) -> Result<Self> {
        match try_create(path) {
            Ok(()) => Ok(Self {
                path: Some(path.to_path_buf()),
                reclaimed_stale: false,
            }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if stale_check && !holder_alive(path) {
                    warn!(pidfile = %path.display(), "removing pid file left by a dead process");
                    fs::remove_file(path).map_err(|e| PulseAgentError::ChannelSetup {
                        op: "remove stale pid file",
                        source: e,
                    })?;
                    // One retry; losing again means a live competitor won
                    // the race.
                    match try_create(path) {
                        Ok(()) => Ok(Self {
                            path: Some(path.to_path_buf()),
                            reclaimed_stale: true,
                        }),
                        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                            Err(PulseAgentError::AlreadyRunning {
                                resource: path.display().to_string(),
                            })
                        }
                        Err(e) => Err(PulseAgentError::ChannelSetup {
                            op: "create pid file",
                            source: e,
                        }),
                    }
                } else {
                    Err(PulseAgentError::AlreadyRunning {
                        resource: path.display().to_string(),
                    })
                }
            }
            Err(e) => Err(PulseAgentError::ChannelSetup {
                op: "create pid file",
                source: e,
            }),
        }
    }

    /// Did acquisition reclaim a dead holder's claim?
    ///
    /// When true, the previous owner crashed without cleanup and its channel
    /// artifact may still be lying around.
    pub fn reclaimed_stale(&self) -> bool {
        self.reclaimed_stale
    }

    /// Remove the pid file. Idempotent; also invoked from drop.
    pub fn release(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(pidfile = %path.display(), error = %e, "failed to remove pid file");
                }
            }
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        self.release();
    }
}

/// Read the pid recorded in a pid file, if it parses
pub fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn try_create(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{}", std::process::id())
}

// True unless the recorded pid provably no longer exists.
fn holder_alive(path: &Path) -> bool {
    match read_pid(path) {
        Some(pid) => {
            let alive = Path::new(&format!("/proc/{pid}")).exists();
            debug!(pid, alive, "probed pid file holder");
            alive
        }
        // Can't prove anything about a garbled pid file
        None => true,
    }
}
