//! Transcript scanning and usage aggregation.
//!
//! Claude Code writes one JSONL transcript per session under
//! `~/.claude/projects/`, each line a structured record. Only records with
//! `"type": "assistant"` carry billable usage, inside `message.usage`.
//! [`parse_transcript`] folds one file into a [`UsageTotals`];
//! [`scan_logs_since`] does the same for every transcript under a root,
//! optionally filtered to records at or after a cutoff.
//!
//! Parsing is defensive throughout: a transcript may be mid-append when we
//! read it, so malformed lines are skipped, never fatal.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ── Wire models ────────────────────────────────────────────────────

/// The `message.usage` sub-structure of an assistant transcript record.
///
/// Every field is optional on the wire; missing counts read as zero.
#[derive(Deserialize, Debug, Clone, Copy, Default)]
pub struct MessageUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

#[derive(Deserialize, Debug, Default)]
struct TranscriptMessage {
    #[serde(default)]
    usage: Option<MessageUsage>,
}

/// One line of a session transcript. Unknown fields are ignored.
#[derive(Deserialize, Debug, Default)]
struct TranscriptEntry {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    message: Option<TranscriptMessage>,
}

// ── UsageTotals ────────────────────────────────────────────────────

/// Aggregated token counts across zero or more transcript records.
///
/// The four raw categories are straight sums. `total` is derived once per
/// aggregation as `input + output + cache_write + floor(cache_read × w)`
/// where `w` is the configured cache-read weight — cache reads count only
/// fractionally toward the provider's limit. [`merge`](Self::merge) sums
/// raw categories only, so the floor is applied to the global sum rather
/// than accumulating per-file rounding error.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub input: u64,
    pub output: u64,
    pub cache_write: u64,
    pub cache_read: u64,
    pub total: u64,
}

impl UsageTotals {
    /// Fold one record's usage into the raw categories.
    fn record(&mut self, usage: &MessageUsage) {
        self.input += usage.input_tokens;
        self.output += usage.output_tokens;
        self.cache_write += usage.cache_creation_input_tokens;
        self.cache_read += usage.cache_read_input_tokens;
    }

    /// Sum another aggregate's raw categories into this one.
    ///
    /// `total` is not summed; call [`finalize`](Self::finalize) after the
    /// last merge.
    pub fn merge(&mut self, other: &UsageTotals) {
        self.input += other.input;
        self.output += other.output;
        self.cache_write += other.cache_write;
        self.cache_read += other.cache_read;
    }

    /// Derive `total` from the raw categories with the given cache-read
    /// weight, flooring the weighted term.
    pub fn finalize(mut self, cache_read_weight: f64) -> Self {
        let weighted = (self.cache_read as f64 * cache_read_weight).floor() as u64;
        self.total = self.input + self.output + self.cache_write + weighted;
        self
    }
}

// ── Timestamp parsing ──────────────────────────────────────────────

/// Parse an ISO-8601 timestamp, normalizing a `Z` suffix to UTC.
///
/// Falls back to a naive `YYYY-MM-DDTHH:MM:SS[.frac]` form interpreted as
/// UTC for legacy records without an offset. Returns `None` on anything
/// else; callers treat unparseable timestamps as "no timestamp".
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ── Scanning ───────────────────────────────────────────────────────

/// Aggregate assistant usage from one transcript file.
///
/// Skips empty lines, lines that fail JSON parsing (partial writes are
/// normal for a live transcript), and records whose `type` is not
/// `"assistant"`. With a cutoff, records whose timestamp is present,
/// parseable, and strictly earlier than the cutoff are excluded; records
/// with a missing or unparseable timestamp are conservatively included.
///
/// A missing or unreadable file yields zero totals — never an error, since
/// an absent transcript just means nothing to count.
pub fn parse_transcript(
    path: &Path,
    cutoff: Option<DateTime<Utc>>,
    cache_read_weight: f64,
) -> UsageTotals {
    let mut totals = UsageTotals::default();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            debug!("Skipping unreadable transcript {}: {e}", path.display());
            return totals.finalize(cache_read_weight);
        }
    };

    for line in BufReader::new(file).lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<TranscriptEntry>(line) else {
            continue;
        };
        if entry.kind.as_deref() != Some("assistant") {
            continue;
        }
        if let Some(cutoff) = cutoff
            && let Some(ts) = entry.timestamp.as_deref()
            && let Some(entry_time) = parse_timestamp(ts)
            && entry_time < cutoff
        {
            continue;
        }
        if let Some(usage) = entry.message.and_then(|m| m.usage) {
            totals.record(&usage);
        }
    }

    totals.finalize(cache_read_weight)
}

/// Aggregate assistant usage from every `*.jsonl` transcript under `root`.
///
/// Walks the tree to arbitrary depth; unreadable directories are logged and
/// skipped. Discovery order does not affect the result — per-file raw
/// counts are merged and the weighted total is derived once at the end.
pub fn scan_logs_since(
    root: &Path,
    cutoff: Option<DateTime<Utc>>,
    cache_read_weight: f64,
) -> UsageTotals {
    let mut totals = UsageTotals::default();
    walk_transcripts(root, cutoff, cache_read_weight, &mut totals);
    totals.finalize(cache_read_weight)
}

fn walk_transcripts(
    dir: &Path,
    cutoff: Option<DateTime<Utc>>,
    cache_read_weight: f64,
    totals: &mut UsageTotals,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Skipping unreadable log directory {}: {e}", dir.display());
            return;
        }
    };
    for entry in entries {
        let Ok(entry) = entry else {
            warn!("Skipping unreadable entry under {}", dir.display());
            continue;
        };
        let path = entry.path();
        if path.is_dir() {
            walk_transcripts(&path, cutoff, cache_read_weight, totals);
        } else if path.extension().is_some_and(|ext| ext == "jsonl") {
            let file_totals = parse_transcript(&path, cutoff, cache_read_weight);
            totals.merge(&file_totals);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const WEIGHT: f64 = 0.1;

    fn write_transcript(dir: &Path, name: &str, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut f = File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        path
    }

    fn assistant_line(input: u64, output: u64) -> String {
        format!(
            r#"{{"type":"assistant","message":{{"usage":{{"input_tokens":{input},"output_tokens":{output}}}}}}}"#
        )
    }

    // ── Totals arithmetic ──────────────────────────────────────────

    #[test]
    fn total_weights_cache_reads_at_one_tenth() {
        let totals = UsageTotals {
            input: 10,
            output: 5,
            cache_write: 7,
            cache_read: 109,
            total: 0,
        }
        .finalize(WEIGHT);
        // floor(109 * 0.1) = 10
        assert_eq!(totals.total, 10 + 5 + 7 + 10);
    }

    #[test]
    fn all_zero_record_contributes_nothing() {
        let totals = UsageTotals::default().finalize(WEIGHT);
        assert_eq!(totals.total, 0);
    }

    #[test]
    fn merge_sums_raw_categories_only() {
        let a = UsageTotals {
            input: 1,
            output: 2,
            cache_write: 3,
            cache_read: 15,
            total: 0,
        }
        .finalize(WEIGHT);
        let b = UsageTotals {
            input: 10,
            output: 20,
            cache_write: 30,
            cache_read: 15,
            total: 0,
        }
        .finalize(WEIGHT);
        // Per-file floors would give 1 + 1 = 2; the global floor gives 3.
        let mut merged = UsageTotals::default();
        merged.merge(&a);
        merged.merge(&b);
        let merged = merged.finalize(WEIGHT);
        assert_eq!(merged.cache_read, 30);
        assert_eq!(merged.total, 11 + 22 + 33 + 3);
    }

    // ── Timestamp parsing ──────────────────────────────────────────

    #[test]
    fn parses_zulu_and_offset_timestamps() {
        let z = parse_timestamp("2025-06-01T12:00:00Z").unwrap();
        let offset = parse_timestamp("2025-06-01T14:00:00+02:00").unwrap();
        assert_eq!(z, offset);
    }

    #[test]
    fn parses_naive_timestamp_as_utc() {
        let naive = parse_timestamp("2025-06-01T12:00:00.123456").unwrap();
        let z = parse_timestamp("2025-06-01T12:00:00.123456Z").unwrap();
        assert_eq!(naive, z);
    }

    #[test]
    fn rejects_garbage_timestamps() {
        assert!(parse_timestamp("not-a-date").is_none());
        assert!(parse_timestamp("").is_none());
    }

    // ── parse_transcript ───────────────────────────────────────────

    #[test]
    fn sums_assistant_records() {
        let dir = TempDir::new().unwrap();
        let path = write_transcript(
            dir.path(),
            "session.jsonl",
            &[&assistant_line(10, 5), &assistant_line(3, 2)],
        );
        let totals = parse_transcript(&path, None, WEIGHT);
        assert_eq!(totals.input, 13);
        assert_eq!(totals.output, 7);
        assert_eq!(totals.total, 20);
    }

    #[test]
    fn non_assistant_records_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = write_transcript(
            dir.path(),
            "session.jsonl",
            &[
                r#"{"type":"user","message":{"usage":{"input_tokens":999}}}"#,
                r#"{"type":"summary"}"#,
                &assistant_line(1, 1),
            ],
        );
        let totals = parse_transcript(&path, None, WEIGHT);
        assert_eq!(totals.total, 2);
    }

    #[test]
    fn corrupt_lines_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write_transcript(
            dir.path(),
            "session.jsonl",
            &[
                &assistant_line(10, 5),
                r#"{"type":"assistant","message":{"usage":{"input_tok"#,
                "",
            ],
        );
        let totals = parse_transcript(&path, None, WEIGHT);
        assert_eq!(totals.total, 15);
    }

    #[test]
    fn missing_file_yields_zero_totals() {
        let totals = parse_transcript(Path::new("/nonexistent/none.jsonl"), None, WEIGHT);
        assert_eq!(totals, UsageTotals::default());
    }

    #[test]
    fn cutoff_excludes_strictly_earlier_records_only() {
        let dir = TempDir::new().unwrap();
        let path = write_transcript(
            dir.path(),
            "session.jsonl",
            &[
                r#"{"type":"assistant","timestamp":"2025-06-01T11:59:59Z","message":{"usage":{"input_tokens":100}}}"#,
                r#"{"type":"assistant","timestamp":"2025-06-01T12:00:00Z","message":{"usage":{"input_tokens":10}}}"#,
                r#"{"type":"assistant","timestamp":"2025-06-01T13:00:00Z","message":{"usage":{"input_tokens":1}}}"#,
            ],
        );
        let cutoff = parse_timestamp("2025-06-01T12:00:00Z");
        let totals = parse_transcript(&path, cutoff, WEIGHT);
        assert_eq!(totals.input, 11);
    }

    #[test]
    fn records_without_timestamps_survive_the_cutoff() {
        let dir = TempDir::new().unwrap();
        let path = write_transcript(
            dir.path(),
            "session.jsonl",
            &[
                &assistant_line(7, 0),
                r#"{"type":"assistant","timestamp":"garbage","message":{"usage":{"input_tokens":5}}}"#,
            ],
        );
        let cutoff = parse_timestamp("2099-01-01T00:00:00Z");
        let totals = parse_transcript(&path, cutoff, WEIGHT);
        assert_eq!(totals.input, 12);
    }

    // ── scan_logs_since ────────────────────────────────────────────

    #[test]
    fn scans_nested_directories() {
        let dir = TempDir::new().unwrap();
        write_transcript(dir.path(), "proj-a/one.jsonl", &[&assistant_line(10, 0)]);
        write_transcript(
            dir.path(),
            "proj-b/deep/nested/two.jsonl",
            &[&assistant_line(0, 20)],
        );
        write_transcript(dir.path(), "proj-b/notes.txt", &[&assistant_line(500, 0)]);
        let totals = scan_logs_since(dir.path(), None, WEIGHT);
        assert_eq!(totals.input, 10);
        assert_eq!(totals.output, 20);
        assert_eq!(totals.total, 30);
    }

    #[test]
    fn missing_root_yields_zero_totals() {
        let totals = scan_logs_since(Path::new("/nonexistent/projects"), None, WEIGHT);
        assert_eq!(totals, UsageTotals::default());
    }
}
