//! inactivity-guard - terminal session guarded by an inactivity timeout.
//!
//! Every line typed on stdin counts as user activity. A few words drive the
//! simulated app lifecycle instead: `bg`, `inactive`, `fg`, `resume`,
//! `status` and `quit`.

mod terminal;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use inactivity_guard::{
    CountdownPlacement, InactivityGuard, InactivityHooks, LifecycleHost, Settings,
    format_remaining,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::terminal::{Command, TerminalCountdown, TerminalDialog};

/// Terminal session that times out after a period without input.
///
/// Shows a live countdown and, on timeout or on return from the background,
/// a prompt that has to be resumed explicitly.
#[derive(Parser, Debug)]
#[command(name = "inactivity-guard")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds of inactivity before timing out (overrides config).
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Where to draw the countdown (overrides config).
    #[arg(long)]
    placement: Option<CountdownPlacement>,

    /// Disable the live countdown.
    #[arg(long)]
    no_countdown: bool,

    /// Disable the interruption dialog.
    #[arg(long)]
    no_dialog: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("inactivity-guard v{} starting", env!("CARGO_PKG_VERSION"));

    let mut settings = Settings::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(timeout) = args.timeout {
        settings.timeout_seconds = timeout;
    }
    if let Some(placement) = args.placement {
        settings.countdown_placement = placement;
    }
    if args.no_countdown {
        settings.countdown = false;
    }
    if args.no_dialog {
        settings.dialog = false;
    }

    info!(
        "Configuration loaded (timeout={}s, countdown={}, dialog={})",
        settings.timeout_seconds, settings.countdown, settings.dialog
    );

    run_session(&settings).await
}

/// Initialize logging with the specified level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(format!("inactivity_guard={level}"))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}

/// Run the session until stdin closes, `quit` is typed or Ctrl-C arrives.
async fn run_session(settings: &Settings) -> Result<()> {
    let config = settings
        .to_inactivity_config()
        .context("Invalid configuration")?;

    let host = LifecycleHost::new();

    let mut hooks = InactivityHooks::new()
        .on_inactive(|| warn!("No input received, user is inactive"))
        .on_paused_or_backgrounded(|| info!("Session left the foreground"));
    if config.dialog_enabled() {
        hooks = hooks.dialog(Arc::new(TerminalDialog::new()));
    }
    if config.countdown_enabled() {
        hooks = hooks.countdown(TerminalCountdown::new());
    }

    let guard = InactivityGuard::attach(config, hooks, &host)
        .context("Failed to attach inactivity monitor")?;
    let activity = guard.activity();
    let mut input = activity.watch_text("");

    info!("Session started, type to stay active");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    info!("Input closed");
                    break;
                };

                match Command::parse(&line) {
                    Command::Input(text) => {
                        // Enter on unchanged text is still a key press.
                        if !input.observe(&text) {
                            activity.key();
                        }
                    }
                    Command::Lifecycle(phase) => host.notify(phase),
                    Command::Resume => guard.resume_from_dialog(),
                    Command::Status => print_status(&guard),
                    Command::Quit => break,
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    guard.detach();
    guard.wait_detached().await;
    info!("Session ended");
    Ok(())
}

fn print_status(guard: &InactivityGuard) {
    let state = guard.state();
    let remaining = guard.time_until_timeout().map_or_else(
        || "-".to_string(),
        |left| format_remaining(left.as_secs()),
    );
    println!(
        "phase={} timer={:?} dialog_visible={} remaining={}",
        state.lifecycle_phase, state.timer, state.dialog_visible, remaining
    );
}
