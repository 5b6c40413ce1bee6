//! POSIX shared memory transport
//!
//! The channel is a fixed `repr(C)` control block mapped by both parties:
//! two process-shared semaphores, a length field, and a fixed command
//! buffer. The handshake alternates strictly between exactly two parties:
//! `empty` (initially 1) grants the controller the right to write, `ready`
//! (initially 0) tells the server a command is waiting. The server creates
//! the object with `O_CREAT | O_EXCL` and is the only party that unlinks it.

use super::{ControlChannel, ControlSender, Received};
use crate::control::command::MAX_COMMAND_SIZE;
use crate::error::{PulseAgentError, Result};
use std::io;
use std::mem;
use std::ptr;
use tracing::{debug, warn};

/// Shared control block layout; identical in every attached process.
#[repr(C)]
struct ControlBlock {
    empty: libc::sem_t,
    ready: libc::sem_t,
    len: u32,
    buf: [u8; MAX_COMMAND_SIZE],
}

const BLOCK_SIZE: usize = mem::size_of::<ControlBlock>();

/// Server end of a shared-memory control channel
pub struct SharedMemoryChannel {
    name: String,
    fd: libc::c_int,
    block: *mut ControlBlock,
    released: bool,
}

impl SharedMemoryChannel {
    /// Create the shared memory object exclusively and initialize the
    /// semaphore pair
    pub fn create(name: &str) -> Result<Self> {
        let c_name = super::name_cstring(name)?;

        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o666,
            )
        };
        if fd < 0 {
            return Err(super::map_create_error(name, "shm_open", super::last_os_error()));
        }

        // A fresh object has size zero; extend it to the block size before
        // mapping.
        if unsafe { libc::ftruncate(fd, BLOCK_SIZE as libc::off_t) } < 0 {
            let err = super::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
            }
            return Err(PulseAgentError::ChannelSetup {
                op: "ftruncate",
                source: err,
            });
        }

        let block = match map_block(fd) {
            Ok(block) => block,
            Err(err) => {
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(c_name.as_ptr());
                }
                return Err(PulseAgentError::ChannelSetup { op: "mmap", source: err });
            }
        };

        // pshared = 1: the semaphores synchronize across processes
        let rc = unsafe {
            let empty = ptr::addr_of_mut!((*block).empty);
            let ready = ptr::addr_of_mut!((*block).ready);
            if libc::sem_init(empty, 1, 1) < 0 {
                -1
            } else {
                libc::sem_init(ready, 1, 0)
            }
        };
        if rc < 0 {
            let err = super::last_os_error();
            unsafe {
                libc::munmap(block as *mut libc::c_void, BLOCK_SIZE);
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
            }
            return Err(PulseAgentError::ChannelSetup {
                op: "sem_init",
                source: err,
            });
        }

        debug!(object = name, size = BLOCK_SIZE, "created control shared memory");
        Ok(Self {
            name: name.to_string(),
            fd,
            block,
            released: false,
        })
    }
}

impl ControlChannel for SharedMemoryChannel {
    fn receive(&mut self) -> Result<Received> {
        let ready = unsafe { ptr::addr_of_mut!((*self.block).ready) };
        if unsafe { libc::sem_wait(ready) } < 0 {
            let err = super::last_os_error();
            return if super::is_interrupted(&err) {
                Err(PulseAgentError::Interrupted)
            } else {
                Err(PulseAgentError::Transport {
                    op: "sem_wait",
                    source: err,
                })
            };
        }

        // A hostile writer could store any length; clamp to the buffer.
        let len = unsafe { ptr::addr_of!((*self.block).len).read() } as usize;
        let len = len.min(MAX_COMMAND_SIZE);
        let mut payload = vec![0u8; len];
        unsafe {
            ptr::copy_nonoverlapping(
                ptr::addr_of!((*self.block).buf) as *const u8,
                payload.as_mut_ptr(),
                len,
            );
        }

        // Hand the buffer back for the next command
        let empty = unsafe { ptr::addr_of_mut!((*self.block).empty) };
        if unsafe { libc::sem_post(empty) } < 0 {
            return Err(PulseAgentError::Transport {
                op: "sem_post",
                source: super::last_os_error(),
            });
        }

        Ok(Received::Message(payload))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        unsafe {
            libc::sem_destroy(ptr::addr_of_mut!((*self.block).ready));
            libc::sem_destroy(ptr::addr_of_mut!((*self.block).empty));
            libc::munmap(self.block as *mut libc::c_void, BLOCK_SIZE);
            libc::close(self.fd);
        }
        if let Ok(c_name) = super::name_cstring(&self.name) {
            if unsafe { libc::shm_unlink(c_name.as_ptr()) } < 0 {
                let err = super::last_os_error();
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(object = %self.name, error = %err, "failed to unlink control shared memory");
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SharedMemoryChannel {
    fn drop(&mut self) {
        self.release();
    }
}

/// Controller end of a shared-memory control channel.
///
/// Attaching never mutates the object's existence: drop unmaps and closes
/// but does not unlink.
pub struct SharedMemorySender {
    fd: libc::c_int,
    block: *mut ControlBlock,
}

impl SharedMemorySender {
    /// Attach to an existing shared memory object
    pub fn open(name: &str) -> Result<Self> {
        let c_name = super::name_cstring(name)?;

        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            return Err(super::map_open_error(name, "shm_open", super::last_os_error()));
        }

        let block = match map_block(fd) {
            Ok(block) => block,
            Err(err) => {
                unsafe { libc::close(fd) };
                return Err(PulseAgentError::ChannelSetup { op: "mmap", source: err });
            }
        };

        Ok(Self { fd, block })
    }
}

impl ControlSender for SharedMemorySender {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        let payload = &payload[..payload.len().min(MAX_COMMAND_SIZE)];

        // Wait for the buffer to be free
        let empty = unsafe { ptr::addr_of_mut!((*self.block).empty) };
        loop {
            if unsafe { libc::sem_wait(empty) } == 0 {
                break;
            }
            let err = super::last_os_error();
            if super::is_interrupted(&err) {
                continue;
            }
            return Err(PulseAgentError::Transport {
                op: "sem_wait",
                source: err,
            });
        }

        unsafe {
            ptr::copy_nonoverlapping(
                payload.as_ptr(),
                ptr::addr_of_mut!((*self.block).buf) as *mut u8,
                payload.len(),
            );
            ptr::addr_of_mut!((*self.block).len).write(payload.len() as u32);
        }

        // Tell the server a command is waiting
        let ready = unsafe { ptr::addr_of_mut!((*self.block).ready) };
        if unsafe { libc::sem_post(ready) } < 0 {
            return Err(PulseAgentError::Transport {
                op: "sem_post",
                source: super::last_os_error(),
            });
        }
        Ok(())
    }
}

impl Drop for SharedMemorySender {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.block as *mut libc::c_void, BLOCK_SIZE);
            libc::close(self.fd);
        }
    }
}

fn map_block(fd: libc::c_int) -> io::Result<*mut ControlBlock> {
    let mapped = unsafe {
        libc::mmap(
            ptr::null_mut(),
            BLOCK_SIZE,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if mapped == libc::MAP_FAILED {
        Err(io::Error::last_os_error())
    } else {
        Ok(mapped as *mut ControlBlock)
    }
}

pub(super) fn unlink(name: &str) -> io::Result<bool> {
    let c_name = match super::name_cstring(name) {
        Ok(c_name) => c_name,
        Err(_) => return Ok(false),
    };
    if unsafe { libc::shm_unlink(c_name.as_ptr()) } == 0 {
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
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
    if fd < 0 {
        return false;
    }
    unsafe {
        libc::close(fd);
    }
    true
}
