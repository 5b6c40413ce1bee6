//! Control surface: command wire format, the server's command loop, and
//! the controller used to drive a running server.

pub mod command;

mod client;
mod server;

pub use client::Controller;
pub use command::{Command, MAX_COMMAND_SIZE, QUIT_COMMAND};
pub use server::{CommandLoop, LoopState, StopReason};
