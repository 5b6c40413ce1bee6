//! The command loop
//!
//! Single-threaded, blocking: the loop waits on the channel, classifies
//! each payload, and keeps running until it sees `QUIT` or the termination
//! flag. Concurrency enters only through signals interrupting the blocking
//! receive; the loop re-checks the flag after every interruption, and also
//! before dispatching any message, so a message racing with a stop is
//! dropped rather than acted on.

use crate::announce::Announcer;
use crate::channel::{ControlChannel, Received};
use crate::control::command::Command;
use crate::error::{PulseAgentError, Result};
use crate::signal::SignalFlags;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Observable loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Blocked in receive
    Waiting,
    /// Evaluating a received payload
    Dispatching,
    /// Flag or QUIT observed, tearing down
    Stopping,
    /// Terminal
    Stopped,
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A `QUIT` command arrived over the channel
    Quit,
    /// A termination signal set the flag
    Signal,
}

/// The server's command loop over an owned control channel
pub struct CommandLoop {
    channel: Box<dyn ControlChannel>,
    flags: Arc<SignalFlags>,
    announcer: Announcer,
    state: LoopState,
}

impl CommandLoop {
    /// Build a loop over a freshly created channel
    pub fn new(channel: Box<dyn ControlChannel>, flags: Arc<SignalFlags>, announcer: Announcer) -> Self {
        Self {
            channel,
            flags,
            announcer,
            state: LoopState::Waiting,
        }
    }

    /// Current state
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until `QUIT` or a termination signal, then tear the channel down.
    ///
    /// Transport failures other than interruption are fatal and propagate;
    /// the channel is still released before returning.
    pub fn run(&mut self) -> Result<StopReason> {
        info!(channel = self.channel.name(), "listening for control commands");

        let outcome = self.serve();
        self.state = LoopState::Stopping;
        self.announcer.disarm();
        self.channel.release();
        self.state = LoopState::Stopped;

        match &outcome {
            Ok(StopReason::Quit) => info!("shutdown command received, goodbye"),
            Ok(StopReason::Signal) => info!("termination signal received, goodbye"),
            Err(e) => warn!(error = %e, "command loop failed"),
        }
        outcome
    }

    fn serve(&mut self) -> Result<StopReason> {
        loop {
            self.state = LoopState::Waiting;
            if self.flags.terminate_requested() {
                return Ok(StopReason::Signal);
            }
            if self.flags.take_announce() {
                self.announcer.announce();
            }

            match self.channel.receive() {
                Ok(Received::Message(payload)) => {
                    // A stop that raced with this message wins; the message
                    // is intentionally dropped, not queued.
                    if self.flags.terminate_requested() {
                        return Ok(StopReason::Signal);
                    }
                    self.state = LoopState::Dispatching;
                    match Command::parse(&payload) {
                        Command::Quit => return Ok(StopReason::Quit),
                        Command::Unknown(token) => {
                            warn!(command = %token, "unrecognized control command");
                        }
                    }
                }
                Ok(Received::Disconnected) => {
                    debug!("writer closed the channel, re-blocking");
                }
                Err(PulseAgentError::Interrupted) => {
                    debug!("receive interrupted by signal");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
