//! The controller
//!
//! A controller attaches to a channel some server already created and sends
//! it commands. It never owns the named resource: dropping a controller
//! leaves the server's channel untouched.

use crate::channel::{self, ControlSender};
use crate::config::ChannelConfig;
use crate::control::command::{MAX_COMMAND_SIZE, QUIT_COMMAND};
use crate::error::Result;
use tracing::{debug, warn};

/// A connected controller for a running server
pub struct Controller {
    sender: Box<dyn ControlSender>,
    name: String,
}

impl Controller {
    /// Attach to the configured channel.
    ///
    /// Fails with [`crate::PulseAgentError::NotRunning`] when no server has
    /// created the channel.
    pub fn connect(config: &ChannelConfig) -> Result<Self> {
        let sender = channel::open_existing(config)?;
        debug!(channel = %config.name, "controller attached");
        Ok(Self {
            sender,
            name: config.name.clone(),
        })
    }

    /// Send one command token.
    ///
    /// Payloads beyond the wire limit are truncated, matching what the
    /// server would keep anyway.
    pub fn send_command(&mut self, command: &str) -> Result<()> {
        let payload = command.as_bytes();
        if payload.len() > MAX_COMMAND_SIZE {
            warn!(
                limit = MAX_COMMAND_SIZE,
                len = payload.len(),
                "command truncated to the wire limit"
            );
        }
        let payload = &payload[..payload.len().min(MAX_COMMAND_SIZE)];
        self.sender.send(payload)
    }

    /// Ask the server to shut down
    pub fn shutdown_server(&mut self) -> Result<()> {
        self.send_command(QUIT_COMMAND)
    }

    /// The channel this controller is attached to
    pub fn channel_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ControlChannel, Received};
    use crate::config::Transport;
    use crate::error::PulseAgentError;
    use tempfile::TempDir;

    fn socket_config(dir: &TempDir) -> ChannelConfig {
        ChannelConfig {
            transport: Transport::Socket,
            name: dir.path().join("ctl.sock").to_str().unwrap().to_string(),
        }
    }

    #[test]
    fn test_connect_requires_server() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Controller::connect(&socket_config(&dir)),
            Err(PulseAgentError::NotRunning { .. })
        ));
    }

    #[test]
    fn test_shutdown_sends_quit() {
        let dir = TempDir::new().unwrap();
        let config = socket_config(&dir);

        let mut server = channel::create_exclusive(&config).unwrap();
        let mut controller = Controller::connect(&config).unwrap();
        controller.shutdown_server().unwrap();

        assert_eq!(
            server.receive().unwrap(),
            Received::Message(QUIT_COMMAND.as_bytes().to_vec())
        );
    }

    #[test]
    fn test_long_command_truncated() {
        let dir = TempDir::new().unwrap();
        let config = socket_config(&dir);

        let mut server = channel::create_exclusive(&config).unwrap();
        let mut controller = Controller::connect(&config).unwrap();
        controller.send_command(&"x".repeat(MAX_COMMAND_SIZE + 30)).unwrap();

        match server.receive().unwrap() {
            Received::Message(m) => assert_eq!(m.len(), MAX_COMMAND_SIZE),
            other => panic!("unexpected receive result: {other:?}"),
        }
    }
}
