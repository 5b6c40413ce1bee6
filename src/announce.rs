//! Periodic wall-clock announcement
//!
//! While the server waits for commands it announces the current time every
//! few seconds. The alarm handler only sets a flag (nothing non-reentrant
//! runs in signal context); the command loop emits the announcement after
//! the alarm's `EINTR` wakes it, then re-arms the alarm here.

use std::mem;
use std::ptr;
use tracing::info;

/// Arms the interval alarm and formats announcements
#[derive(Debug, Clone)]
pub struct Announcer {
    interval_secs: u32,
}

impl Announcer {
    /// Announcer with the given interval in seconds
    pub fn new(interval_secs: u32) -> Self {
        Self { interval_secs }
    }

    /// Schedule the next `SIGALRM`
    pub fn arm(&self) {
        unsafe {
            libc::alarm(self.interval_secs);
        }
    }

    /// Cancel any pending alarm
    pub fn disarm(&self) {
        unsafe {
            libc::alarm(0);
        }
    }

    /// Emit the announcement and schedule the next one
    pub fn announce(&self) {
        info!("current time: {}", current_time_string());
        self.arm();
    }
}

/// Local wall-clock time, formatted with the reentrant libc path
fn current_time_string() -> String {
    let now = unsafe { libc::time(ptr::null_mut()) };
    let mut tm: libc::tm = unsafe { mem::zeroed() };
    if unsafe { libc::localtime_r(&now, &mut tm) }.is_null() {
        return format!("{now} (epoch)");
    }

    let mut buf = [0u8; 64];
    let written = unsafe {
        libc::strftime(
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            b"%a %b %e %H:%M:%S %Y\0".as_ptr() as *const libc::c_char,
            &tm,
        )
    };
    String::from_utf8_lossy(&buf[..written]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_time_string_is_nonempty() {
        let text = current_time_string();
        assert!(!text.is_empty());
        // strftime with %Y always yields a year
        assert!(text.chars().any(|c| c.is_ascii_digit()));
    }

    // alarm() is process-wide; serialize with other alarm-touching tests
    #[test]
    #[serial]
    fn test_disarm_cancels_pending_alarm() {
        let announcer = Announcer::new(3600);
        announcer.arm();
        announcer.disarm();
        // alarm(0) returns the remaining time of the cancelled alarm; after
        // disarm there is nothing left to cancel.
        let remaining = unsafe { libc::alarm(0) };
        assert_eq!(remaining, 0);
    }
}
