//! POSIX message queue transport
//!
//! Each command travels as one whole message, so no framing is needed. The
//! server creates the queue with `O_CREAT | O_EXCL` and an explicit
//! attribute block sized to the command limit; `mq_receive` requires a
//! buffer at least as large as the queue's `mq_msgsize`, so the receive
//! buffer is sized from `mq_getattr` rather than assumed.

use super::{ControlChannel, ControlSender, Received};
use crate::control::command::MAX_COMMAND_SIZE;
use crate::error::{PulseAgentError, Result};
use std::io;
use std::mem;
use std::ptr;
use tracing::{debug, warn};

/// Server end of a message-queue control channel
pub struct MessageQueueChannel {
    name: String,
    mqd: libc::mqd_t,
    msg_size: usize,
    released: bool,
}

impl MessageQueueChannel {
    /// Create the queue exclusively and open it for receiving
    pub fn create(name: &str) -> Result<Self> {
        let c_name = super::name_cstring(name)?;

        let mut attr: libc::mq_attr = unsafe { mem::zeroed() };
        attr.mq_maxmsg = 8;
        attr.mq_msgsize = MAX_COMMAND_SIZE as libc::c_long;

        let mqd = unsafe {
            libc::mq_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDONLY,
                0o666 as libc::c_uint,
                &mut attr as *mut libc::mq_attr,
            )
        };
        if mqd == -1 {
            return Err(super::map_create_error(name, "mq_open", super::last_os_error()));
        }

        // The kernel may round attributes; size the receive buffer from the
        // queue itself.
        let mut actual: libc::mq_attr = unsafe { mem::zeroed() };
        if unsafe { libc::mq_getattr(mqd, &mut actual) } < 0 {
            let err = super::last_os_error();
            unsafe {
                libc::mq_close(mqd);
                libc::mq_unlink(c_name.as_ptr());
            }
            return Err(PulseAgentError::ChannelSetup {
                op: "mq_getattr",
                source: err,
            });
        }

        debug!(queue = name, msg_size = actual.mq_msgsize, "created control queue");
        Ok(Self {
            name: name.to_string(),
            mqd,
            msg_size: actual.mq_msgsize as usize,
            released: false,
        })
    }
}

impl ControlChannel for MessageQueueChannel {
    fn receive(&mut self) -> Result<Received> {
        let mut buf = vec![0u8; self.msg_size];
        let received = unsafe {
            libc::mq_receive(
                self.mqd,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                ptr::null_mut(),
            )
        };
        if received < 0 {
            let err = super::last_os_error();
            return if super::is_interrupted(&err) {
                Err(PulseAgentError::Interrupted)
            } else {
                Err(PulseAgentError::Transport {
                    op: "mq_receive",
                    source: err,
                })
            };
        }
        buf.truncate(received as usize);
        Ok(Received::Message(buf))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        unsafe {
            libc::mq_close(self.mqd);
        }
        if let Ok(c_name) = super::name_cstring(&self.name) {
            if unsafe { libc::mq_unlink(c_name.as_ptr()) } < 0 {
                let err = super::last_os_error();
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(queue = %self.name, error = %err, "failed to unlink control queue");
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for MessageQueueChannel {
    fn drop(&mut self) {
        self.release();
    }
}

/// Controller end of a message-queue control channel
pub struct MessageQueueSender {
    mqd: libc::mqd_t,
}

impl MessageQueueSender {
    /// Open an existing queue for sending
    pub fn open(name: &str) -> Result<Self> {
        let c_name = super::name_cstring(name)?;
        let mqd = unsafe { libc::mq_open(c_name.as_ptr(), libc::O_WRONLY) };
        if mqd == -1 {
            return Err(super::map_open_error(name, "mq_open", super::last_os_error()));
        }
        Ok(Self { mqd })
    }
}

impl ControlSender for MessageQueueSender {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        // The queue was created with mq_msgsize == MAX_COMMAND_SIZE;
        // anything longer would be rejected with EMSGSIZE.
        let payload = &payload[..payload.len().min(MAX_COMMAND_SIZE)];
        loop {
            let rc = unsafe {
                libc::mq_send(self.mqd, payload.as_ptr() as *const libc::c_char, payload.len(), 0)
            };
            if rc == 0 {
                return Ok(());
            }
            let err = super::last_os_error();
            if super::is_interrupted(&err) {
                continue;
            }
            return Err(PulseAgentError::Transport {
                op: "mq_send",
                source: err,
            });
        }
    }
}

impl Drop for MessageQueueSender {
    fn drop(&mut self) {
        unsafe {
            libc::mq_close(self.mqd);
        }
    }
}

pub(super) fn unlink(name: &str) -> io::Result<bool> {
    let c_name = match super::name_cstring(name) {
        Ok(c_name) => c_name,
        Err(_) => return Ok(false),
    };
    if unsafe { libc::mq_unlink(c_name.as_ptr()) } == 0 {
        Ok(true)
    } else {
        let err = super::last_os_error();
        if err.kind() == io::ErrorKind::NotFound {
            Ok(false)
        } else {
            Err(err)
        }
    }
}

pub(super) fn exists(name: &str) -> bool {
    let c_name = match super::name_cstring(name) {
        Ok(c_name) => c_name,
        Err(_) => return false,
    };
    let mqd = unsafe { libc::mq_open(c_name.as_ptr(), libc::O_WRONLY) };
    if mqd == -1 {
        return false;
    }
    unsafe {
        libc::mq_close(mqd);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    // Per-test queue names; POSIX queue names are system-global.
    fn queue_name(tag: &str) -> String {
        format!("/pulse-agent-test-{}-{}", tag, std::process::id())
    }

    // Message queues can be unavailable in minimal containers; skip rather
    // than fail when the kernel refuses the very first create.
    fn create_or_skip(name: &str) -> Option<MessageQueueChannel> {
        match MessageQueueChannel::create(name) {
            Ok(channel) => Some(channel),
            Err(PulseAgentError::ChannelSetup { source, .. }) => {
                eprintln!("skipping mqueue test: {source}");
                None
            }
            Err(e) => panic!("unexpected mqueue create error: {e}"),
        }
    }

    #[test]
    fn test_create_is_exclusive() {
        let name = queue_name("excl");
        let Some(first) = create_or_skip(&name) else { return };

        let second = MessageQueueChannel::create(&name);
        assert!(matches!(
            second,
            Err(PulseAgentError::AlreadyRunning { .. })
        ));
        assert!(exists(&name));
        drop(first);
        assert!(!exists(&name));
    }

    #[test]
    fn test_send_and_receive() {
        let name = queue_name("roundtrip");
        let Some(mut server) = create_or_skip(&name) else { return };

        let mut sender = MessageQueueSender::open(&name).unwrap();
        sender.send(b"QUIT").unwrap();
        assert_eq!(server.receive().unwrap(), Received::Message(b"QUIT".to_vec()));
    }

    #[test]
    fn test_oversized_send_truncated() {
        let name = queue_name("trunc");
        let Some(mut server) = create_or_skip(&name) else { return };

        let mut sender = MessageQueueSender::open(&name).unwrap();
        sender.send(&vec![b'z'; MAX_COMMAND_SIZE + 50]).unwrap();
        match server.receive().unwrap() {
            Received::Message(m) => assert_eq!(m.len(), MAX_COMMAND_SIZE),
            other => panic!("unexpected receive result: {other:?}"),
        }
    }

    #[test]
    fn test_release_idempotent() {
        let name = queue_name("release");
        let Some(mut channel) = create_or_skip(&name) else { return };

        channel.release();
        assert!(!exists(&name));
        channel.release();
        drop(channel);
    }

    #[test]
    fn test_sender_not_running() {
        let name = queue_name("absent");
        assert!(matches!(
            MessageQueueSender::open(&name),
            Err(PulseAgentError::NotRunning { .. })
        ));
    }
}
