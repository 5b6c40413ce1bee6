//! pulse-agent main entry point
//!
//! This binary serves as the entry point for the control-channel daemon.
//! It handles CLI parsing, logging setup, and dispatches to the server or
//! controller role.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pulse_agent::announce::Announcer;
use pulse_agent::channel;
use pulse_agent::config::Config;
use pulse_agent::control::{CommandLoop, Controller};
use pulse_agent::pidfile::{self, PidFile};
use pulse_agent::signal::{self, SignalFlags};
use pulse_agent::{PulseAgentError, APP_NAME, VERSION};

/// Single-instance control-channel daemon
#[derive(Parser, Debug)]
#[command(name = APP_NAME, version = VERSION, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        default_value = "/etc/pulse-agent/config.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the server: own the control channel and answer commands
    Serve,

    /// Ask a running server to shut down
    Stop,

    /// Send an arbitrary command token to a running server
    Send {
        /// The command token to send
        command: String,
    },

    /// Check whether a server appears to be running
    Status,

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        error!("Error: {:#}", e);
        let code = e
            .downcast_ref::<PulseAgentError>()
            .map(PulseAgentError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

/// Initialize structured logging with tracing
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run the CLI command
fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            info!("starting {} v{}", APP_NAME, VERSION);
            serve(&config)?;
            Ok(())
        }
        Commands::Stop => {
            let mut controller = Controller::connect(&config.channel)?;
            controller.shutdown_server()?;
            println!("Stop command sent to '{}'", controller.channel_name());
            Ok(())
        }
        Commands::Send { command } => {
            let mut controller = Controller::connect(&config.channel)?;
            controller.send_command(&command)?;
            println!("Sent '{}' to '{}'", command, controller.channel_name());
            Ok(())
        }
        Commands::Status => {
            status(&config);
            Ok(())
        }
        Commands::Version => {
            println!("{} v{}", APP_NAME, VERSION);
            Ok(())
        }
    }
}

/// Run the server until a QUIT command or a termination signal
fn serve(config: &Config) -> pulse_agent::Result<()> {
    // The pid file is the single-instance arbiter; claim it before touching
    // the channel.
    let pidfile = PidFile::acquire(&config.daemon.pidfile, config.daemon.stale_check)?;
    if pidfile.reclaimed_stale() && channel::remove_artifact(&config.channel)? {
        warn!(
            channel = %config.channel.name,
            "removed orphaned control channel left by a dead instance"
        );
    }

    let flags = Arc::new(SignalFlags::new());
    signal::install(flags.clone())?;

    let channel = channel::create_exclusive(&config.channel)?;
    let announcer = Announcer::new(config.announce.interval_secs);
    announcer.arm();

    let mut command_loop = CommandLoop::new(channel, flags, announcer);
    command_loop.run()?;

    // Channel released by the loop; the pid file goes last.
    drop(pidfile);
    Ok(())
}

/// Report whether a server appears to be running
fn status(config: &Config) {
    let channel_present = channel::probe(&config.channel);
    let pid = pidfile::read_pid(&config.daemon.pidfile);

    match (channel_present, pid) {
        (true, Some(pid)) => println!(
            "{} is running (pid {}, channel '{}')",
            APP_NAME, pid, config.channel.name
        ),
        (true, None) => println!(
            "control channel '{}' exists but no pid file was found",
            config.channel.name
        ),
        (false, Some(pid)) => println!(
            "{} is not listening; pid file for pid {} may be stale",
            APP_NAME, pid
        ),
        (false, None) => println!("{} is not running", APP_NAME),
    }
}
