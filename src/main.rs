//! Vigil - autonomous session continuation controller.
//!
//! `vigil hook` is wired into the host agent's stop hook; the remaining
//! subcommands manage the loop lifecycle from a terminal.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use vigil::config::{resolve_state_dir, ControllerConfig};
use vigil::engine::Engine;
use vigil::hook::{HookInput, HookOutput};
use vigil::lifecycle::{LifecycleStore, LoopState};
use vigil::runtime::wall_clock_hours;
use vigil::session::{path_hash, SessionManager};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(version = "0.1.0")]
#[command(about = "Autonomous session continuation controller", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// State directory (defaults to ~/.vigil)
    #[arg(long, global = true, env = "VIGIL_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one stop attempt (reads JSON on stdin, writes JSON on stdout)
    Hook,

    /// Start the continuation loop for the project
    Start,

    /// Request a graceful stop (drain, then stop at the next invocation)
    Stop,

    /// Raise a kill signal; the next invocation hard-stops the session
    Kill,

    /// Show loop and session status for the project
    Status,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let state_dir = resolve_state_dir(cli.state_dir.as_deref());

    let exit_code = match &cli.command {
        Commands::Hook => run_hook(&cli, &state_dir),
        other => match run_command(&cli, &state_dir, other) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{} {e:#}", "error:".red().bold());
                1
            }
        },
    };
    std::process::exit(exit_code);
}

/// The hook must always produce exactly one JSON object and exit 0;
/// anything unusable degrades to an allow verdict.
fn run_hook(cli: &Cli, state_dir: &std::path::Path) -> i32 {
    let mut raw = String::new();
    if std::io::stdin().read_to_string(&mut raw).is_err() {
        println!("{}", HookOutput::Allow.to_json());
        return 0;
    }

    let Some(input) = HookInput::parse(&raw) else {
        println!("{}", HookOutput::Allow.to_json());
        return 0;
    };

    let config = ControllerConfig::load(state_dir, &cli.project);
    let engine = Engine::new(state_dir, &cli.project, config);
    let verdict = engine.decide(&input, chrono::Utc::now());
    println!("{}", verdict.to_output().to_json());
    0
}

fn run_command(cli: &Cli, state_dir: &std::path::Path, command: &Commands) -> anyhow::Result<()> {
    let hash = path_hash(&cli.project);
    let config = ControllerConfig::load(state_dir, &cli.project);
    let lifecycle = LifecycleStore::new(state_dir, &hash, config.lock_timeout_ms);

    match command {
        Commands::Hook => unreachable!("handled in main"),
        Commands::Start => {
            lifecycle
                .transition(LoopState::Running)
                .context("cannot start the loop")?;
            println!(
                "{} loop running for {} ({})",
                "started:".green().bold(),
                cli.project.display(),
                hash
            );
        }
        Commands::Stop => match lifecycle.load() {
            LoopState::Stopped => {
                println!("{} loop is not running", "stopped:".yellow().bold());
            }
            _ => {
                lifecycle
                    .transition(LoopState::Draining)
                    .context("cannot drain the loop")?;
                println!(
                    "{} loop draining; it stops at the next invocation",
                    "draining:".yellow().bold()
                );
            }
        },
        Commands::Kill => {
            lifecycle
                .raise_kill_signal()
                .context("cannot raise kill signal")?;
            println!(
                "{} next stop attempt ends the session immediately",
                "kill signal raised:".red().bold()
            );
        }
        Commands::Status => {
            let state = lifecycle.load();
            let state_text = match state {
                LoopState::Running => "running".green().bold(),
                LoopState::Draining => "draining".yellow().bold(),
                LoopState::Stopped => "stopped".red().bold(),
            };
            println!("project:   {} ({})", cli.project.display(), hash);
            println!("state dir: {}", state_dir.display());
            println!("loop:      {state_text}");

            let manager = SessionManager::new(state_dir, config.lock_timeout_ms);
            match manager.latest_for_project(&hash) {
                Some((path, session)) => {
                    println!("session:   {} ({})", session.session_id, path.display());
                    println!(
                        "progress:  iteration {}, {:.1}h active of {:.1}h wall, mode {}",
                        session.iteration,
                        session.runtime.active_hours(),
                        wall_clock_hours(session.started_at, chrono::Utc::now()),
                        session.mode
                    );
                    if let Some(target) = &session.target_path {
                        println!("target:    {}", target.display());
                    }
                }
                None => println!("session:   none recorded"),
            }
        }
    }
    Ok(())
}
