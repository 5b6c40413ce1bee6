//! UNIX-domain datagram socket transport
//!
//! Datagram sockets preserve message boundaries, so each command is one
//! datagram and no framing is needed. Binding the socket path is the
//! exclusivity primitive: a second bind on the same path fails with
//! `EADDRINUSE`. Receives are truncated by the kernel to the command
//! buffer, which matches the truncate-and-continue policy for oversized
//! payloads.

use super::{ControlChannel, ControlSender, Received};
use crate::control::command::MAX_COMMAND_SIZE;
use crate::error::{PulseAgentError, Result};
use std::fs;
use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Server end of a datagram-socket control channel
pub struct DatagramChannel {
    name: String,
    socket: UnixDatagram,
    unlink_path: Option<PathBuf>,
}

impl DatagramChannel {
    /// Bind the socket path, claiming ownership
    pub fn create(name: &str) -> Result<Self> {
        let socket = UnixDatagram::bind(name)
            .map_err(|e| super::map_create_error(name, "bind", e))?;

        debug!(path = name, "bound control socket");
        Ok(Self {
            name: name.to_string(),
            socket,
            unlink_path: Some(PathBuf::from(name)),
        })
    }
}

impl ControlChannel for DatagramChannel {
    fn receive(&mut self) -> Result<Received> {
        let mut buf = [0u8; MAX_COMMAND_SIZE];
        match self.socket.recv(&mut buf) {
            Ok(received) => Ok(Received::Message(buf[..received].to_vec())),
            Err(e) if super::is_interrupted(&e) => Err(PulseAgentError::Interrupted),
            Err(e) => Err(PulseAgentError::Transport {
                op: "recv",
                source: e,
            }),
        }
    }

    fn release(&mut self) {
        if let Some(path) = self.unlink_path.take() {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to unlink control socket");
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for DatagramChannel {
    fn drop(&mut self) {
        self.release();
    }
}

/// Controller end of a datagram-socket control channel
pub struct DatagramSender {
    socket: UnixDatagram,
    server_path: PathBuf,
    name: String,
}

impl DatagramSender {
    /// Create an unbound socket aimed at an existing server path
    pub fn open(name: &str) -> Result<Self> {
        if !Path::new(name).exists() {
            return Err(PulseAgentError::NotRunning {
                name: name.to_string(),
            });
        }
        let socket = UnixDatagram::unbound().map_err(|e| PulseAgentError::ChannelSetup {
            op: "socket",
            source: e,
        })?;
        Ok(Self {
            socket,
            server_path: PathBuf::from(name),
            name: name.to_string(),
        })
    }
}

impl ControlSender for DatagramSender {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        let payload = &payload[..payload.len().min(MAX_COMMAND_SIZE)];
        loop {
            match self.socket.send_to(payload, &self.server_path) {
                Ok(_) => return Ok(()),
                Err(e) if super::is_interrupted(&e) => continue,
                Err(e)
                    if e.kind() == io::ErrorKind::NotFound
                        || e.kind() == io::ErrorKind::ConnectionRefused =>
                {
                    // The server vanished between open and send
                    return Err(PulseAgentError::NotRunning {
                        name: self.name.clone(),
                    });
                }
                Err(e) => {
                    return Err(PulseAgentError::Transport {
                        op: "sendto",
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn socket_path(dir: &TempDir) -> String {
        dir.path().join("ctl.sock").to_str().unwrap().to_string()
    }

    #[test]
    fn test_bind_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let path = socket_path(&dir);

        let first = DatagramChannel::create(&path).unwrap();
        let second = DatagramChannel::create(&path);
        assert!(matches!(
            second,
            Err(PulseAgentError::AlreadyRunning { .. })
        ));
        assert!(Path::new(&path).exists());
        drop(first);
        assert!(!Path::new(&path).exists());
    }

    #[test]
    fn test_send_and_receive_datagram() {
        let dir = TempDir::new().unwrap();
        let path = socket_path(&dir);

        let mut server = DatagramChannel::create(&path).unwrap();
        let mut sender = DatagramSender::open(&path).unwrap();
        sender.send(b"QUIT").unwrap();

        assert_eq!(server.receive().unwrap(), Received::Message(b"QUIT".to_vec()));
    }

    #[test]
    fn test_oversized_datagram_truncated() {
        let dir = TempDir::new().unwrap();
        let path = socket_path(&dir);

        let mut server = DatagramChannel::create(&path).unwrap();
        // Bypass the sender's own truncation to exercise the receive side
        let raw = UnixDatagram::unbound().unwrap();
        raw.send_to(&vec![b'y'; MAX_COMMAND_SIZE + 20], &path).unwrap();

        match server.receive().unwrap() {
            Received::Message(m) => assert_eq!(m.len(), MAX_COMMAND_SIZE),
            other => panic!("unexpected receive result: {other:?}"),
        }
    }

    #[test]
    fn test_release_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = socket_path(&dir);

        let mut channel = DatagramChannel::create(&path).unwrap();
        channel.release();
        assert!(!Path::new(&path).exists());
        channel.release();
        drop(channel);
    }

    #[test]
    fn test_sender_not_running() {
        let dir = TempDir::new().unwrap();
        let path = socket_path(&dir);
        assert!(matches!(
            DatagramSender::open(&path),
            Err(PulseAgentError::NotRunning { .. })
        ));
    }
}
