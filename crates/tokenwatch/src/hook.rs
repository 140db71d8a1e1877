//! Stop-hook invocation payload.
//!
//! Claude Code pipes a JSON payload to each Stop hook describing the turn
//! that just finished. Only `transcript_path` matters here; everything
//! else is accepted and ignored so the payload shape can grow without
//! breaking the tracker.

use std::io::Read;

use serde::Deserialize;
use tracing::debug;

/// Payload supplied on stdin by the invoking harness.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct HookPayload {
    /// Path to the current session's transcript.
    #[serde(default)]
    pub transcript_path: Option<String>,
    /// Session identifier, unused but accepted.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl HookPayload {
    /// Read a payload from the given source.
    ///
    /// Empty or malformed input degrades to the default payload (no
    /// transcript path, hence zero session totals) rather than failing —
    /// the engine must emit a status record no matter what it was handed.
    pub fn from_reader(mut reader: impl Read) -> Self {
        let mut raw = String::new();
        if let Err(e) = reader.read_to_string(&mut raw) {
            debug!("Failed to read hook payload: {e}");
            return Self::default();
        }
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Malformed hook payload: {e}");
                Self::default()
            }
        }
    }
}
