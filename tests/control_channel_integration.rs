//! End-to-end control channel scenarios
//!
//! A server and a controller in the same test process, the controller on
//! its own thread, talking over real channel resources in a scratch
//! directory. These mirror the deployment story: create, command, QUIT,
//! teardown, re-create.

use pulse_agent::announce::Announcer;
use pulse_agent::channel;
use pulse_agent::config::{ChannelConfig, Transport};
use pulse_agent::control::{CommandLoop, Controller, StopReason};
use pulse_agent::pidfile::PidFile;
use pulse_agent::signal::SignalFlags;
use pulse_agent::PulseAgentError;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn config_for(transport: Transport, dir: &TempDir) -> ChannelConfig {
    let file = match transport {
        Transport::Fifo => "ctl.fifo",
        Transport::Socket => "ctl.sock",
        _ => unreachable!("filesystem transports only in these scenarios"),
    };
    ChannelConfig {
        transport,
        name: dir.path().join(file).to_str().unwrap().to_string(),
    }
}

/// Server creates "X", client sends QUIT, server stops and tears down "X",
/// and a fresh create_exclusive("X") succeeds.
fn quit_scenario(transport: Transport) {
    let dir = TempDir::new().unwrap();
    let config = config_for(transport, &dir);

    let server_channel = channel::create_exclusive(&config).unwrap();

    let controller_config = config.clone();
    let controller = thread::spawn(move || {
        let mut controller = Controller::connect(&controller_config).unwrap();
        // An unknown command first: the server must log it and keep going
        controller.send_command("PING").unwrap();
        controller.shutdown_server().unwrap();
    });

    let flags = Arc::new(SignalFlags::new());
    let mut command_loop = CommandLoop::new(server_channel, flags, Announcer::new(3600));
    assert_eq!(command_loop.run().unwrap(), StopReason::Quit);

    controller.join().unwrap();

    // The artifact is gone and the name is free for a fresh instance
    assert!(!Path::new(&config.name).exists());
    drop(channel::create_exclusive(&config).unwrap());
}

#[test]
fn test_quit_scenario_over_fifo() {
    quit_scenario(Transport::Fifo);
}

#[test]
fn test_quit_scenario_over_socket() {
    quit_scenario(Transport::Socket);
}

/// Two creators back-to-back: exactly one wins, the loser sees
/// AlreadyRunning and the winner's resource is untouched.
#[test]
fn test_back_to_back_creation_race() {
    for transport in [Transport::Fifo, Transport::Socket] {
        let dir = TempDir::new().unwrap();
        let config = config_for(transport, &dir);

        let winner = channel::create_exclusive(&config).unwrap();
        match channel::create_exclusive(&config) {
            Err(PulseAgentError::AlreadyRunning { .. }) => {}
            other => panic!("expected AlreadyRunning, got {:?}", other.map(|_| ())),
        }
        assert!(channel::probe(&config));
        drop(winner);
        assert!(!channel::probe(&config));
    }
}

/// A termination "signal" (the flag, set from another thread) unblocks a
/// waiting loop without any command being dispatched.
#[test]
fn test_signal_flag_stops_waiting_loop() {
    let dir = TempDir::new().unwrap();
    let config = config_for(Transport::Socket, &dir);

    let server_channel = channel::create_exclusive(&config).unwrap();
    let flags = Arc::new(SignalFlags::new());

    // Stand-in for the signal handler: set the flag, then poke the channel
    // so the blocked receive returns. A real signal would interrupt the
    // call instead; the flag contract is identical.
    let poker_flags = flags.clone();
    let poker_config = config.clone();
    let poker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        // Attach first: the loop cannot exit while no flag is set and no
        // message has arrived, so the channel is still there.
        let mut controller = Controller::connect(&poker_config).unwrap();
        poker_flags
            .terminate
            .store(true, std::sync::atomic::Ordering::SeqCst);
        controller.send_command("ANYTHING").unwrap();
    });

    let mut command_loop = CommandLoop::new(server_channel, flags, Announcer::new(3600));
    assert_eq!(command_loop.run().unwrap(), StopReason::Signal);
    poker.join().unwrap();
    assert!(!Path::new(&config.name).exists());
}

/// Crash recovery: a dead instance's pid file and orphaned channel artifact
/// are reclaimed, and a fresh server starts cleanly.
#[test]
fn test_stale_instance_reclaimed() {
    let dir = TempDir::new().unwrap();
    let config = config_for(Transport::Fifo, &dir);
    let pid_path = dir.path().join("agent.pid");

    // Simulate a crash: the channel artifact survives because teardown
    // never ran, and the pid file points at a long-gone process.
    std::mem::forget(channel::create_exclusive(&config).unwrap());
    std::fs::write(&pid_path, "999999999\n").unwrap();
    assert!(channel::probe(&config));

    let pidfile = PidFile::acquire(&pid_path, true).unwrap();
    assert!(pidfile.reclaimed_stale());
    assert!(channel::remove_artifact(&config).unwrap());

    // The fresh instance owns the name exclusively again
    let fresh = channel::create_exclusive(&config).unwrap();
    drop(fresh);
    drop(pidfile);
    assert!(!pid_path.exists());
}

/// A controller with no server gets the dedicated "not running" class.
#[test]
fn test_controller_reports_not_running() {
    for transport in [Transport::Fifo, Transport::Socket] {
        let dir = TempDir::new().unwrap();
        let config = config_for(transport, &dir);
        assert!(matches!(
            Controller::connect(&config),
            Err(PulseAgentError::NotRunning { .. })
        ));
    }
}
