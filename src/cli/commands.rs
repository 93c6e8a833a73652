//! CLI command handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::api::{Action, HttpArenaClient};
use crate::config::ArenaConfig;
use crate::dispatch::ActionDispatcher;
use crate::error::{ArenaError, Result};
use crate::producer::{self, DaemonExit, StopOutcome};
use crate::session::SessionStore;
use crate::supervisor::{SessionDetail, SessionSummary, SessionSupervisor, StatusReport};

use super::{ActArgs, Commands, JoinArgs, ObserveArgs, StatusArgs};

const RULE: &str = "==================================================";

/// Run one command to completion.
pub async fn run(command: Commands, config: ArenaConfig) -> Result<()> {
    match command {
        Commands::Join(args) => handle_join(config, args).await,
        Commands::Observe(args) => handle_observe(config, args).await,
        Commands::Act(args) => handle_act(config, args).await,
        Commands::Status(args) => handle_status(config, args),
        Commands::Stop(args) => handle_stop(config, &args.session).await,
        Commands::Cleanup => handle_cleanup(config).await,
        Commands::Log(args) => handle_log(config, &args.session),
        Commands::Daemon(args) => handle_daemon(config, &args.session).await,
        Commands::Stream(args) => {
            let exit = producer::run_stream_capture(&config, &args.session).await?;
            tracing::info!(reason = ?exit, "stream capture finished");
            Ok(())
        }
    }
}

async fn handle_join(config: ArenaConfig, args: JoinArgs) -> Result<()> {
    let config = match args.producer {
        Some(kind) => config.with_producer(kind),
        None => config,
    };
    let supervisor = SessionSupervisor::from_config(config)?;
    let outcome = supervisor.join(Duration::from_secs(args.timeout)).await?;
    let session_id = &outcome.session_id;

    println!("\n{RULE}");
    println!("GAME STARTED!");
    println!("SESSION: {session_id}");
    println!("{RULE}");
    println!("Game info:");
    println!("{}", serde_json::to_string_pretty(&outcome.run)?);
    println!("{RULE}");
    println!("Initial state:");
    println!("{}", serde_json::to_string_pretty(&outcome.summary())?);
    println!("{RULE}");
    match outcome.producer_pid {
        Some(pid) => println!("\n{} producer running in background (PID: {pid})", outcome.producer),
        None => println!("\nObservations are polled on demand"),
    }
    println!("Use: arenalink observe {session_id}");
    println!("Use: arenalink act {session_id} -c '...'");
    println!("Use: arenalink stop {session_id}");
    Ok(())
}

async fn handle_observe(config: ArenaConfig, args: ObserveArgs) -> Result<()> {
    let supervisor = SessionSupervisor::from_config(config)?;
    let digest = supervisor.observe(&args.session, args.peek).await?;
    println!("{}", serde_json::to_string_pretty(&digest)?);
    Ok(())
}

async fn handle_act(config: ArenaConfig, args: ActArgs) -> Result<()> {
    let store = SessionStore::new(config.sessions_dir());
    let dispatcher = ActionDispatcher::new(store, Arc::new(HttpArenaClient::new(&config)?));
    let action = Action::new(args.code, args.message, args.thoughts);
    let run = dispatcher.send(&args.session, &action).await?;
    println!("Action sent to run {} (session: {})", run.short_run_id(), args.session);
    Ok(())
}

fn handle_status(config: ArenaConfig, args: StatusArgs) -> Result<()> {
    let supervisor = SessionSupervisor::from_config(config)?;
    match supervisor.status(args.session.as_deref())? {
        StatusReport::Sessions(sessions) => print_sessions(&sessions),
        StatusReport::Session(detail) => print_detail(&detail),
    }
    Ok(())
}

fn print_sessions(sessions: &[SessionSummary]) {
    if sessions.is_empty() {
        println!("No sessions found");
        return;
    }
    println!("Sessions ({}):", sessions.len());
    for session in sessions {
        if let Some(error) = &session.error {
            println!("  {} (unreadable: {error})", session.session_id);
            continue;
        }
        let status = session.status.map(|s| s.to_string()).unwrap_or_default();
        let producer = session.producer.map(|p| p.to_string()).unwrap_or_default();
        let run_id: String = session
            .run_id
            .as_deref()
            .unwrap_or("none")
            .chars()
            .take(8)
            .collect();
        let liveness = match session.alive {
            Some(true) => "running",
            Some(false) => "stopped",
            None => "on demand",
        };
        println!(
            "  {} ({status}, {producer} {liveness}, run: {run_id})",
            session.session_id
        );
    }
}

fn print_detail(detail: &SessionDetail) {
    let state = &detail.state;
    println!("Session {}", state.session_id);
    println!("  Status:   {}", state.status);
    println!("  Agent:    {}", state.agent_name);
    match (detail.alive, detail.pid) {
        (Some(true), Some(pid)) => println!("  Producer: {} (PID: {pid})", state.producer),
        (Some(_), _) => println!("  Producer: {} (not running)", state.producer),
        (None, _) => println!("  Producer: {} (on demand)", state.producer),
    }
    if let Some(run) = &state.run {
        println!("  Run ID:   {}", run.run_id);
        if let Some(participant) = &run.participant_id {
            println!("  Participant: {participant}");
        }
        if let Some(task) = run.task.as_deref().filter(|task| !task.is_empty()) {
            println!("  Task:     {task}");
        }
        if !run.skills.is_empty() {
            println!("  Skills:   {}", run.skills.join(", "));
        }
    }
    println!("  Updated:  {}", state.updated_at.to_rfc3339());
    if !detail.recent_log.is_empty() {
        println!("  Recent log:");
        for line in &detail.recent_log {
            println!("    {line}");
        }
    }
}

async fn handle_stop(config: ArenaConfig, session_id: &str) -> Result<()> {
    let supervisor = SessionSupervisor::from_config(config)?;
    match supervisor.stop(session_id).await? {
        StopOutcome::NotRunning => println!("No producer running for session {session_id}"),
        StopOutcome::Stopped { pid } => println!("Stopped producer (PID: {pid})"),
        StopOutcome::Killed { pid } => println!("Killed unresponsive producer (PID: {pid})"),
    }
    Ok(())
}

async fn handle_cleanup(config: ArenaConfig) -> Result<()> {
    let supervisor = SessionSupervisor::from_config(config)?;
    let removed = supervisor.cleanup().await?;
    println!("Removed {removed} session(s)");
    Ok(())
}

fn handle_log(config: ArenaConfig, session_id: &str) -> Result<()> {
    let supervisor = SessionSupervisor::from_config(config)?;
    match supervisor.log(session_id)? {
        Some(text) => print!("{text}"),
        None => println!("No log file found"),
    }
    Ok(())
}

async fn handle_daemon(config: ArenaConfig, session_id: &str) -> Result<()> {
    match producer::run_daemon(&config, session_id).await? {
        DaemonExit::Failed(reason) => Err(ArenaError::Producer(reason)),
        exit => {
            tracing::info!(reason = ?exit, "daemon finished");
            Ok(())
        }
    }
}

/// Print `err` for an operator, with follow-up hints where they help.
pub fn report_error(err: &ArenaError) {
    eprintln!("Error: {err}");
    match err {
        ArenaError::ProducerExited { session_id, log_tail } => {
            if !log_tail.is_empty() {
                eprintln!("Last log entries:");
                for line in log_tail {
                    eprintln!("  {line}");
                }
            }
            eprintln!("See: arenalink log {session_id}");
        }
        ArenaError::RunNotStarted(session_id) => {
            eprintln!("Is the game running? Check: arenalink status {session_id}");
        }
        ArenaError::SessionNotFound(_) => {
            eprintln!("List sessions with: arenalink status");
        }
        _ => {}
    }
}
