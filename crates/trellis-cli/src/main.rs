#![forbid(unsafe_code)]

mod agent;
mod cmd;
mod feed;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, CodedError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use trellis_core::ErrorCode;
use trellis_core::config::resolve_config;

use cmd::Session;
use cmd::activity::ActivityArgs;
use cmd::article::ArticleCommand;
use cmd::idea::IdeaCommand;
use cmd::project::ProjectCommand;
use cmd::reading::ReadingCommand;
use cmd::sync::SyncArgs;
use cmd::task::TaskCommand;

#[derive(Parser, Debug)]
#[command(
    name = "trellis",
    version,
    about = "trellis: task, project, and idea board for humans and agents",
    long_about = None
)]
struct Cli {
    /// Log trellis internals at debug level. `TRELLIS_LOG` still wins.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format. Overrides `--json` and `TRELLIS_FORMAT`.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Act as this identity (skips env resolution).
    #[arg(long, global = true)]
    actor: Option<String>,

    /// human or agent.
    #[arg(long, global = true)]
    actor_type: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create `.trellis/` and the store in the current directory.
    Init,

    /// Board tasks.
    #[command(subcommand)]
    Task(TaskCommand),

    /// Projects.
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Ideas.
    #[command(subcommand)]
    Idea(IdeaCommand),

    /// Reading lists.
    #[command(subcommand)]
    Reading(ReadingCommand),

    /// Articles in reading lists.
    #[command(subcommand)]
    Article(ArticleCommand),

    /// Recent changes, newest first.
    Activity(ActivityArgs),

    /// Dashboard counts and weekly completions.
    Stats,

    /// Reconcile projects from an external feed.
    Sync(SyncArgs),
}

/// Filter used when `TRELLIS_LOG` is unset.
const fn default_filter(verbose: bool) -> &'static str {
    if verbose { "trellis=debug,info" } else { "trellis=info,warn" }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TRELLIS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(default_filter(verbose || env::var("DEBUG").is_ok()))
    });

    let format = env::var("TRELLIS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    // Logs go to stderr so stdout stays parseable.
    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, session: &Session) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init => cmd::init::run_init(session),
        Commands::Task(command) => cmd::task::run(command, session),
        Commands::Project(command) => cmd::project::run(command, session),
        Commands::Idea(command) => cmd::idea::run(command, session),
        Commands::Reading(command) => cmd::reading::run(command, session),
        Commands::Article(command) => cmd::article::run(command, session),
        Commands::Activity(args) => cmd::activity::run_activity(args, session),
        Commands::Stats => cmd::stats::run_stats(session),
        Commands::Sync(args) => cmd::sync::run_sync(args, session),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let early_output = resolve_output_mode(cli.format, cli.json, None);
    let root = match env::current_dir() {
        Ok(root) => root,
        Err(err) => return fail(early_output, &anyhow::Error::from(err)),
    };

    let config = match resolve_config(&root, cli.json) {
        Ok(config) => config,
        Err(err) => {
            let coded = CodedError::new(ErrorCode::ConfigParseError, format!("{err:#}"));
            return fail(early_output, &anyhow::Error::from(coded));
        }
    };

    let output = resolve_output_mode(cli.format, cli.json, Some(&config.resolved_output));
    let session = Session {
        root,
        config,
        output,
        actor_flag: cli.actor.clone(),
        actor_type_flag: cli.actor_type.clone(),
    };

    match run(&cli, &session) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => fail(output, &err),
    }
}

fn fail(output: OutputMode, err: &anyhow::Error) -> ExitCode {
    debug!(error = ?err, "command failed");
    if render_error(output, &CliError::from(err)).is_err() {
        eprintln!("error: {err:#}");
    }
    ExitCode::FAILURE
}
