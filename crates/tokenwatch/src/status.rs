//! Limit estimation and the status document.
//!
//! [`estimate_limit`] turns the recorded limit-hit magnitudes into a single
//! threshold estimate. [`StatusRecord`] is the engine's one output
//! artifact, persisted wholesale by [`StatusFile`] on every run — it
//! represents current knowledge, not history.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::limits::LimitEvent;
use crate::usage::UsageTotals;

// ── Limit estimation ───────────────────────────────────────────────

/// Median of the recorded `tokens_at_limit` sample.
///
/// Events without a recorded magnitude are excluded from the sample, not
/// counted as zero. Empty sample yields `None`. Even-sized samples take
/// the floored mean of the two central elements.
///
/// Median rather than mean: limit-hit magnitudes are noisy (partial
/// requests, bursts) and the median shrugs off outliers.
pub fn estimate_limit(events: &[LimitEvent]) -> Option<u64> {
    let mut sample: Vec<u64> = events.iter().filter_map(|e| e.tokens_at_limit).collect();
    if sample.is_empty() {
        return None;
    }
    sample.sort_unstable();
    let mid = sample.len() / 2;
    if sample.len() % 2 != 0 {
        Some(sample[mid])
    } else {
        Some((sample[mid - 1] + sample[mid]) / 2)
    }
}

// ── StatusRecord ───────────────────────────────────────────────────

/// The engine's output: session and window totals plus limit knowledge.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    /// When this record was computed, ISO-8601.
    pub updated_ts: String,
    /// Usage attributable to the current session, never cutoff-filtered.
    pub session: UsageTotals,
    /// Usage since the most recent limit event (or all history if none).
    pub window: UsageTotals,
    /// Timestamp of the most recent limit event; `None` means the window
    /// spans all recorded usage.
    pub window_start: Option<String>,
    /// Current best estimate of the true limit threshold.
    pub estimated_limit: Option<u64>,
    /// Number of limit events recorded so far.
    pub limit_event_count: usize,
}

/// Assemble a status record from the computed pieces. Pure except for the
/// wall-clock timestamp; persistence is the caller's concern.
pub fn build_status(
    session: UsageTotals,
    window: UsageTotals,
    events: &[LimitEvent],
) -> StatusRecord {
    StatusRecord {
        updated_ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        session,
        window,
        window_start: events.last().map(|e| e.timestamp.clone()),
        estimated_limit: estimate_limit(events),
        limit_event_count: events.len(),
    }
}

// ── StatusFile ─────────────────────────────────────────────────────

/// File repository over the status document.
///
/// Writes go to a temp sibling and are renamed into place, so a display
/// process reading concurrently never observes a torn document.
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    /// Create a repository over the given status file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted record, if any. Malformed content reads as
    /// absent.
    pub fn load(&self) -> Option<StatusRecord> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) => {
                debug!("No status document at {}: {e}", self.path.display());
                return None;
            }
        };
        match serde_json::from_str(&json) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    "Ignoring malformed status document at {}: {e}",
                    self.path.display()
                );
                None
            }
        }
    }

    /// Atomic write: serialize to a temp sibling, then rename into place.
    pub fn save(&self, record: &StatusRecord) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create status dir: {e}"))?;
        }
        let json = serde_json::to_string(record)
            .map_err(|e| format!("Failed to serialize status: {e}"))?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .map_err(|e| format!("Failed to write temp status: {e}"))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| format!("Failed to rename status: {e}"))?;
        Ok(())
    }

    /// Rewrite only the event-derived fields of the persisted record,
    /// preserving session and window totals.
    ///
    /// Used when the event history changes outside a hook turn (undo):
    /// without a transcript path the session totals cannot be recomputed,
    /// and zeroing them would make the display flash. No-op when no record
    /// is persisted yet.
    pub fn patch_event_fields(&self, events: &[LimitEvent]) -> Result<(), String> {
        let Some(mut record) = self.load() else {
            return Ok(());
        };
        record.estimated_limit = estimate_limit(events);
        record.limit_event_count = events.len();
        record.window_start = events.last().map(|e| e.timestamp.clone());
        self.save(&record)
    }
}

// ── Formatting ─────────────────────────────────────────────────────

/// Compact human token count: `999`, `1.5K`, `1.23M`.
pub fn fmt_tokens(n: u64) -> String {
    match n {
        1_000_000.. => format!("{:.2}M", n as f64 / 1e6),
        1_000.. => format!("{:.1}K", n as f64 / 1e3),
        _ => n.to_string(),
    }
}
