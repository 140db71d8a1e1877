//! The one-shot tracking pipeline.
//!
//! [`Tracker`] wires the transcript scanner, the limit-event history, and
//! the status repository together. One [`update`](Tracker::update) call per
//! assistant turn: load the event history, aggregate the session transcript
//! (full length) and the usage-log tree (since the window cutoff), fold in
//! the limit estimate, and persist the resulting [`StatusRecord`]
//! wholesale.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use tracing::info;

use crate::config::TrackerConfig;
use crate::hook::HookPayload;
use crate::limits::{LimitEvent, LimitLog, cutoff_from};
use crate::status::{StatusFile, StatusRecord, build_status};
use crate::usage::{UsageTotals, parse_transcript, scan_logs_since};

/// The windowed usage aggregation and limit-estimation engine.
///
/// Owns the two file repositories; all paths and tunables come from the
/// injected [`TrackerConfig`], so tests run against a temp directory.
pub struct Tracker {
    config: TrackerConfig,
    limits: LimitLog,
    status: StatusFile,
}

impl Tracker {
    /// Build a tracker over the given configuration.
    pub fn new(config: TrackerConfig) -> Self {
        let limits = LimitLog::new(config.limits_path());
        let status = StatusFile::new(config.status_path());
        Self {
            config,
            limits,
            status,
        }
    }

    /// The tracker's configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The limit-event repository.
    pub fn limits(&self) -> &LimitLog {
        &self.limits
    }

    /// The status repository.
    pub fn status(&self) -> &StatusFile {
        &self.status
    }

    /// Usage attributable to the current session: the full transcript,
    /// never cutoff-filtered. The session answers "what did this session
    /// cost", not "what counts toward the window". Absent or missing
    /// transcript yields zero totals.
    pub fn session_totals(&self, transcript_path: Option<&str>) -> UsageTotals {
        match transcript_path {
            Some(path) => {
                parse_transcript(Path::new(path), None, self.config.cache_read_weight)
            }
            None => UsageTotals::default().finalize(self.config.cache_read_weight),
        }
    }

    /// Usage attributable to the current rate-limit window: every
    /// transcript under the usage-log root, filtered to records at or
    /// after the last limit event (or unfiltered if there is none).
    pub fn window_totals(&self, events: &[LimitEvent]) -> UsageTotals {
        scan_logs_since(
            &self.config.projects_dir(),
            cutoff_from(events),
            self.config.cache_read_weight,
        )
    }

    /// Run the full pipeline and persist the resulting status record.
    pub fn update(&self, payload: &HookPayload) -> Result<StatusRecord, String> {
        let events = self.limits.load();
        let session = self.session_totals(payload.transcript_path.as_deref());
        let window = self.window_totals(&events);
        let record = build_status(session, window, &events);
        self.status.save(&record)?;
        info!(
            session_total = record.session.total,
            window_total = record.window.total,
            events = record.limit_event_count,
            "status updated"
        );
        Ok(record)
    }

    /// Record a limit-hit event now, annotated with the current window
    /// total, then refresh the status.
    ///
    /// The window total comes from the persisted status when one exists
    /// (it reflects what the user was looking at when the limit hit) and
    /// is computed fresh otherwise.
    pub fn record_limit(&self) -> Result<LimitEvent, String> {
        let tokens_at_limit = match self.status.load() {
            Some(record) => record.window.total,
            None => {
                let events = self.limits.load();
                self.window_totals(&events).total
            }
        };
        let event = LimitEvent {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            tokens_at_limit: Some(tokens_at_limit),
        };
        self.limits.append(event.clone())?;
        self.update(&HookPayload::default())?;
        Ok(event)
    }

    /// Remove the most recent limit event (undo for a mis-click) and patch
    /// the event-derived fields of the persisted status, leaving session
    /// and window totals untouched.
    pub fn undo_last_limit(&self) -> Result<Option<LimitEvent>, String> {
        let Some(popped) = self.limits.pop_last()? else {
            return Ok(None);
        };
        self.status.patch_event_fields(&self.limits.load())?;
        Ok(Some(popped))
    }
}
