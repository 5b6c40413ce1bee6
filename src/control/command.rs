//! Command wire format
//!
//! Commands are single short ASCII/UTF-8 tokens, one per line or datagram,
//! compared case-sensitively for exact equality. Only `QUIT` is recognized
//! today; unrecognized tokens are logged and ignored by the loop, which
//! leaves room for more commands without changing the framing.

/// Maximum command payload size in bytes; longer input is truncated
pub const MAX_COMMAND_SIZE: usize = 100;

/// The shutdown command token
pub const QUIT_COMMAND: &str = "QUIT";

/// A classified control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Stop the server and tear the channel down
    Quit,
    /// Anything else; carried for logging
    Unknown(String),
}

impl Command {
    /// Classify a received payload.
    ///
    /// At most one trailing line delimiter (`\n` or `\r\n`) is stripped —
    /// stream transports deliver it, message transports do not. After that
    /// the comparison is exact and case-sensitive: `"quit"`, `"QUIT "` and
    /// `"QUITX"` are all unknown.
    pub fn parse(payload: &[u8]) -> Command {
        let text = String::from_utf8_lossy(payload);
        let trimmed = strip_delimiter(&text);
        if trimmed == QUIT_COMMAND {
            Command::Quit
        } else {
            Command::Unknown(trimmed.to_string())
        }
    }
}

fn strip_delimiter(text: &str) -> &str {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.strip_suffix('\r').unwrap_or(text)
}
