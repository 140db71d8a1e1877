//! Token usage and rate-limit window tracking for Claude Code.
//!
//! Claude Code leaves a JSONL transcript per session under
//! `~/.claude/projects/` but keeps no central ledger, and the provider's
//! rate-limit thresholds are unpublished. `tokenwatch` closes that gap
//! with a one-shot pipeline run after each assistant turn (as a Stop
//! hook): it aggregates the current session's usage, aggregates all usage
//! since the last recorded limit-hit event, estimates the true limit as
//! the median of past limit-hit magnitudes, and writes the combined
//! [`StatusRecord`](status::StatusRecord) to `~/.claude/token_status.json`
//! for any display frontend to read.
//!
//! The engine never enforces anything and never talks to the network; it
//! is best-effort accounting. Every input failure degrades to zero/empty
//! — a half-written transcript line, a missing history file, or a
//! malformed hook payload must never stop a status record from being
//! produced.
//!
//! # Where to find things
//!
//! - **Transcript scanning and the weighted total:** [`usage`] —
//!   [`parse_transcript`](usage::parse_transcript),
//!   [`scan_logs_since`](usage::scan_logs_since),
//!   [`UsageTotals`](usage::UsageTotals).
//! - **Limit-event history and the window cutoff:** [`limits`] —
//!   [`LimitLog`](limits::LimitLog), [`cutoff_from`](limits::cutoff_from).
//! - **Limit estimation and the status document:** [`status`] —
//!   [`estimate_limit`](status::estimate_limit),
//!   [`StatusFile`](status::StatusFile).
//! - **The composed pipeline:** [`tracker::Tracker`].
//! - **Hook payload parsing:** [`hook::HookPayload`].
//! - **Settings registration:** [`install::register_stop_hook`].

pub mod config;
pub mod hook;
pub mod install;
pub mod limits;
pub mod status;
pub mod tracker;
pub mod usage;

pub use config::TrackerConfig;
pub use hook::HookPayload;
pub use limits::{LimitEvent, LimitLog};
pub use status::{StatusFile, StatusRecord, estimate_limit, fmt_tokens};
pub use tracker::Tracker;
pub use usage::UsageTotals;
