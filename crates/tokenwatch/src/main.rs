//! Track Claude Code token usage against inferred rate-limit windows.
//!
//! Designed to run as a Stop hook: Claude Code pipes the turn payload to
//! stdin and `tokenwatch` refreshes `~/.claude/token_status.json`. The
//! remaining subcommands manage the limit-event history and registration.
//!
//! # Examples
//!
//! ```sh
//! # Register as a Stop hook (idempotent)
//! tokenwatch install
//!
//! # What a hook invocation does (payload on stdin)
//! echo '{"transcript_path":"~/.claude/projects/p/s.jsonl"}' | tokenwatch
//!
//! # Mark "my tokens just ran out" to calibrate the limit estimate
//! tokenwatch record-limit
//!
//! # Took that back
//! tokenwatch undo-last
//!
//! # Human-readable summary of the persisted status
//! tokenwatch show
//! ```

use std::io;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tokenwatch::install::{Installed, register_stop_hook};
use tokenwatch::{HookPayload, Tracker, TrackerConfig, fmt_tokens};
use tracing::warn;

/// Track Claude Code token usage against inferred rate-limit windows.
#[derive(Parser)]
#[command(name = "tokenwatch", version)]
struct Cli {
    /// Claude Code home directory.
    #[arg(long)]
    claude_dir: Option<PathBuf>,

    /// Weight applied to cache-read tokens in the derived total.
    #[arg(long, default_value_t = 0.1)]
    cache_read_weight: f64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh the status document from the hook payload on stdin (default)
    Update,
    /// Print a human summary of the persisted status
    Show,
    /// Record a limit-hit event now, calibrating the limit estimate
    RecordLimit,
    /// Remove the most recent limit-hit event
    UndoLast,
    /// Register tokenwatch as a Claude Code Stop hook
    Install,
}

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match cli.claude_dir {
        Some(dir) => TrackerConfig::new(dir),
        None => TrackerConfig::default(),
    }
    .with_cache_read_weight(cli.cache_read_weight);
    let tracker = Tracker::new(config);

    match cli.command.unwrap_or(Commands::Update) {
        Commands::Update => update(&tracker),
        Commands::Show => show(&tracker),
        Commands::RecordLimit => record_limit(&tracker),
        Commands::UndoLast => undo_last(&tracker),
        Commands::Install => install(&tracker),
    }
}

/// The hook path: never fail the assistant's turn over accounting.
fn update(tracker: &Tracker) {
    let payload = HookPayload::from_reader(io::stdin().lock());
    if let Err(e) = tracker.update(&payload) {
        warn!("Failed to update status: {e}");
    }
}

fn show(tracker: &Tracker) {
    let Some(record) = tracker.status().load() else {
        println!("No status recorded yet — run `tokenwatch` from a Stop hook first.");
        return;
    };
    println!("Session: {} tokens", fmt_tokens(record.session.total));
    match record.estimated_limit {
        Some(limit) if limit > 0 => {
            let pct = record.window.total as f64 / limit as f64 * 100.0;
            println!(
                "Window:  {} of ~{} ({pct:.0}%)",
                fmt_tokens(record.window.total),
                fmt_tokens(limit)
            );
        }
        _ => {
            println!(
                "Window:  {} tokens (no limit estimate yet — record one with `tokenwatch record-limit`)",
                fmt_tokens(record.window.total)
            );
        }
    }
    match record.window_start {
        Some(start) => println!("Window start: {start}"),
        None => println!("Window start: beginning of history"),
    }
    println!(
        "Limit events recorded: {} (updated {})",
        record.limit_event_count, record.updated_ts
    );
}

fn record_limit(tracker: &Tracker) {
    match tracker.record_limit() {
        Ok(event) => {
            let tokens = event.tokens_at_limit.unwrap_or(0);
            println!(
                "Recorded limit event at {} ({} window tokens).",
                event.timestamp,
                fmt_tokens(tokens)
            );
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn undo_last(tracker: &Tracker) {
    match tracker.undo_last_limit() {
        Ok(Some(event)) => println!("Removed limit event from {}.", event.timestamp),
        Ok(None) => println!("No limit events to remove."),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn install(tracker: &Tracker) {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            eprintln!("Error: failed to resolve executable path: {e}");
            process::exit(1);
        }
    };
    let command = format!("{} update", exe.display());
    let settings_path = tracker.config().settings_path();
    match register_stop_hook(&settings_path, &command, "tokenwatch") {
        Ok(Installed::Added) => {
            println!("Stop hook added to {}.", settings_path.display());
        }
        Ok(Installed::AlreadyPresent) => {
            println!("Stop hook already present in {}.", settings_path.display());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
