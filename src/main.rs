//! arenalink CLI binary entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use arenalink::cli::{commands, Cli};
use arenalink::config::ArenaConfig;
use arenalink::error::ExitCode;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.command.is_producer());

    let config = ArenaConfig::from_env();
    let code = match commands::run(cli.command, config).await {
        Ok(()) => ExitCode::Success,
        Err(err) => {
            commands::report_error(&err);
            err.exit_code()
        }
    };
    std::process::exit(code.as_i32());
}

/// Operator commands log to stderr so stdout stays parseable; producers log
/// to stdout, which the launcher points at `producer.log`.
fn init_logging(verbose: bool, producer: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("arenalink={level}")));

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    if producer {
        builder.with_ansi(false).try_init().ok();
    } else {
        builder.with_writer(std::io::stderr).with_target(false).try_init().ok();
    }
}
