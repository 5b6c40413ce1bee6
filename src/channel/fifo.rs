//! FIFO (named pipe) transport
//!
//! The server creates the FIFO with `mkfifo`, which fails with `EEXIST` if
//! the path is already claimed, and opens it read+write: holding a write
//! end means a departing controller never flips the pipe into a permanent
//! end-of-file state, the read simply blocks again. Commands are
//! newline-delimited lines read through the bounded framer.

use super::framing::LineFramer;
use super::{ControlChannel, ControlSender, Received};
use crate::error::{PulseAgentError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Server end of a FIFO control channel
pub struct FifoChannel {
    name: String,
    reader: BufReader<File>,
    framer: LineFramer,
    // Present until release; taking it makes teardown idempotent.
    unlink_path: Option<PathBuf>,
}

impl FifoChannel {
    /// Create the FIFO exclusively and open it for reading
    pub fn create(name: &str) -> Result<Self> {
        let c_path = super::name_cstring(name)?;
        if unsafe { libc::mkfifo(c_path.as_ptr(), 0o666) } < 0 {
            return Err(super::map_create_error(name, "mkfifo", super::last_os_error()));
        }

        // Read+write so the server's own write end keeps the pipe open
        let file = match OpenOptions::new().read(true).write(true).open(name) {
            Ok(file) => file,
            Err(e) => {
                // The FIFO is ours; do not leave it behind on a failed open
                let _ = fs::remove_file(name);
                return Err(PulseAgentError::ChannelSetup {
                    op: "open fifo",
                    source: e,
                });
            }
        };

        debug!(path = name, "created control fifo");
        Ok(Self {
            name: name.to_string(),
            reader: BufReader::new(file),
            framer: LineFramer::new(),
            unlink_path: Some(PathBuf::from(name)),
        })
    }
}

impl ControlChannel for FifoChannel {
    fn receive(&mut self) -> Result<Received> {
        loop {
            let (consumed, complete) = {
                let available = match self.reader.fill_buf() {
                    Ok(available) => available,
                    Err(e) if super::is_interrupted(&e) => return Err(PulseAgentError::Interrupted),
                    Err(e) => {
                        return Err(PulseAgentError::Transport {
                            op: "read fifo",
                            source: e,
                        })
                    }
                };
                if available.is_empty() {
                    // No writer left. Flush a partial line if one was pending.
                    return Ok(if self.framer.is_empty() {
                        Received::Disconnected
                    } else {
                        Received::Message(self.framer.take())
                    });
                }
                self.framer.feed(available)
            };
            self.reader.consume(consumed);
            if complete {
                return Ok(Received::Message(self.framer.take()));
            }
        }
    }

    fn release(&mut self) {
        if let Some(path) = self.unlink_path.take() {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to unlink control fifo");
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for FifoChannel {
    fn drop(&mut self) {
        self.release();
    }
}

/// Controller end of a FIFO control channel
pub struct FifoSender {
    file: File,
}

impl FifoSender {
    /// Open an existing FIFO for writing.
    ///
    /// Blocks until the server holds the read end; with the server's
    /// read+write open that is immediate.
    pub fn open(name: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .open(name)
            .map_err(|e| super::map_open_error(name, "open fifo", e))?;
        Ok(Self { file })
    }
}

impl ControlSender for FifoSender {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        let mut line = Vec::with_capacity(payload.len() + 1);
        line.extend_from_slice(payload);
        line.push(b'\n');
        loop {
            match self.file.write_all(&line).and_then(|_| self.file.flush()) {
                Ok(()) => return Ok(()),
                Err(e) if super::is_interrupted(&e) => continue,
                Err(e) => {
                    return Err(PulseAgentError::Transport {
                        op: "write fifo",
                        source: e,
                    })
                }
            }
        }
    }
}

pub(super) fn unlink(name: &str) -> io::Result<bool> {
    match fs::remove_file(name) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

pub(super) fn exists(name: &str) -> bool {
    Path::new(name).exists()
}
