//! Limit-event history.
//!
//! Every time the provider refuses further requests, an event is appended
//! to `token_limits.json` recording when it happened and, when known, the
//! window token total observed at that moment. The history is append-only
//! and chronologically ordered; the last element is always the most recent
//! event, and its timestamp marks the start of the current rate-limit
//! window.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::usage::parse_timestamp;

// ── Models ─────────────────────────────────────────────────────────

/// One observed "rate limit hit" occurrence.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LimitEvent {
    /// When the limit was hit, ISO-8601. Stored verbatim as recorded.
    pub timestamp: String,
    /// Window token total observed at the moment of the hit, when known.
    /// Events without it still mark a window boundary but contribute
    /// nothing to the limit estimate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_at_limit: Option<u64>,
}

/// On-disk shape of the history document: `{"events": [...]}`.
#[derive(Serialize, Deserialize, Debug, Default)]
struct LimitsDocument {
    #[serde(default)]
    events: Vec<LimitEvent>,
}

// ── LimitLog ───────────────────────────────────────────────────────

/// File repository over the limit-event history.
///
/// Loads degrade to an empty history on any failure — the engine must
/// produce a status record even with zero history, which simply means the
/// window spans all recorded usage.
pub struct LimitLog {
    path: PathBuf,
}

impl LimitLog {
    /// Create a repository over the given history file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the event history, preserving append order.
    ///
    /// Missing, unreadable, or malformed files all yield an empty list.
    pub fn load(&self) -> Vec<LimitEvent> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) => {
                debug!("No limit history at {}: {e}", self.path.display());
                return Vec::new();
            }
        };
        match serde_json::from_str::<LimitsDocument>(&json) {
            Ok(doc) => doc.events,
            Err(e) => {
                warn!(
                    "Ignoring malformed limit history at {}: {e}",
                    self.path.display()
                );
                Vec::new()
            }
        }
    }

    /// Atomic write: serialize to a temp sibling, then rename into place.
    pub fn save(&self, events: &[LimitEvent]) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create limits dir: {e}"))?;
        }
        let doc = LimitsDocument {
            events: events.to_vec(),
        };
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| format!("Failed to serialize limit history: {e}"))?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .map_err(|e| format!("Failed to write temp limit history: {e}"))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| format!("Failed to rename limit history: {e}"))?;
        Ok(())
    }

    /// Append one event to the history.
    pub fn append(&self, event: LimitEvent) -> Result<(), String> {
        let mut events = self.load();
        events.push(event);
        self.save(&events)
    }

    /// Remove and return the most recent event, persisting the shortened
    /// history. Returns `None` when the history is already empty.
    pub fn pop_last(&self) -> Result<Option<LimitEvent>, String> {
        let mut events = self.load();
        let Some(last) = events.pop() else {
            return Ok(None);
        };
        self.save(&events)?;
        Ok(Some(last))
    }
}

// ── Window cutoff ──────────────────────────────────────────────────

/// Start of the active rate-limit window: the last event's timestamp.
///
/// Empty history, or a last timestamp that fails to parse, yields `None`,
/// which degrades to full-history aggregation rather than failing.
pub fn cutoff_from(events: &[LimitEvent]) -> Option<DateTime<Utc>> {
    let last = events.last()?;
    let parsed = parse_timestamp(&last.timestamp);
    if parsed.is_none() {
        warn!(
            "Unparseable timestamp on last limit event ({}); using full history",
            last.timestamp
        );
    }
    parsed
}
