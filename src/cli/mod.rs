//! CLI entry point for arenalink.

pub mod commands;

use clap::{Args, Parser, Subcommand};

use crate::producer::ProducerKind;

/// Join arena games and relay observations and actions for an agent
#[derive(Parser, Debug)]
#[command(name = "arenalink", version, about = "arenalink: arena session relay")]
pub struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Join a game and wait for it to start; prints the session id
    Join(JoinArgs),
    /// Print new observations as a summarized digest
    Observe(ObserveArgs),
    /// Send code and/or a chat message to the game
    Act(ActArgs),
    /// List sessions, or show one in detail
    Status(StatusArgs),
    /// Stop a session's background producer
    Stop(SessionArg),
    /// Stop every producer and delete all sessions
    Cleanup,
    /// Print a session's producer log
    Log(SessionArg),
    #[command(name = "__daemon", hide = true)]
    Daemon(SessionArg),
    #[command(name = "__stream", hide = true)]
    Stream(SessionArg),
}

impl Commands {
    /// Producer processes log to stdout, which the launcher redirects.
    pub fn is_producer(&self) -> bool {
        matches!(self, Self::Daemon(_) | Self::Stream(_))
    }
}

/// Arguments for `arenalink join`.
#[derive(Args, Debug)]
pub struct JoinArgs {
    /// Seconds to wait for the game to start; matchmaking plus server start
    /// routinely takes a few minutes
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,

    /// Observation producer (daemon, poll, stream)
    #[arg(long)]
    pub producer: Option<ProducerKind>,
}

/// Arguments for `arenalink observe`.
#[derive(Args, Debug)]
pub struct ObserveArgs {
    pub session: String,

    /// Read without consuming
    #[arg(long)]
    pub peek: bool,
}

/// Arguments for `arenalink act`.
#[derive(Args, Debug)]
pub struct ActArgs {
    pub session: String,

    /// JavaScript to execute
    #[arg(short, long, default_value = "")]
    pub code: String,

    /// Chat message to send
    #[arg(short, long, default_value = "")]
    pub message: String,

    /// Reasoning behind the action (logged by the arena)
    #[arg(short, long, default_value = "")]
    pub thoughts: String,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    pub session: Option<String>,
}

#[derive(Args, Debug)]
pub struct SessionArg {
    pub session: String,
}
