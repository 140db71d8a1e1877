//! Stop-hook registration into the Claude Code settings document.
//!
//! `settings.json` is owned by Claude Code and holds far more than hook
//! configuration, so the merge is surgical: the document is edited as
//! untyped JSON, only the `hooks.Stop` array is touched, and a fingerprint
//! check keeps the operation idempotent across repeated installs.

use std::path::Path;

use serde_json::{Value, json};

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installed {
    /// The hook entry was merged into the settings document.
    Added,
    /// A Stop entry matching the fingerprint already existed; nothing
    /// was written.
    AlreadyPresent,
}

/// Merge a `Stop` hook entry running `command` into the settings document.
///
/// Unrelated settings keys and existing Stop entries are preserved. An
/// entry is considered already registered when any existing Stop command
/// contains `fingerprint`. A missing settings file starts from an empty
/// document; a malformed one is an error — clobbering user settings is
/// worse than failing the install.
pub fn register_stop_hook(
    settings_path: &Path,
    command: &str,
    fingerprint: &str,
) -> Result<Installed, String> {
    let mut settings: Value = match std::fs::read_to_string(settings_path) {
        Ok(json) => serde_json::from_str(&json)
            .map_err(|e| format!("Failed to parse settings document: {e}"))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => json!({}),
        Err(e) => return Err(format!("Failed to read settings document: {e}")),
    };

    let root = settings
        .as_object_mut()
        .ok_or("Settings document is not a JSON object")?;
    let hooks = root
        .entry("hooks")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or("Settings `hooks` is not a JSON object")?;
    let stop_list = hooks
        .entry("Stop")
        .or_insert_with(|| json!([]))
        .as_array_mut()
        .ok_or("Settings `hooks.Stop` is not a JSON array")?;

    let already = stop_list.iter().any(|entry| {
        entry
            .get("hooks")
            .and_then(Value::as_array)
            .is_some_and(|hooks| {
                hooks.iter().any(|h| {
                    h.get("command")
                        .and_then(Value::as_str)
                        .is_some_and(|c| c.contains(fingerprint))
                })
            })
    });
    if already {
        return Ok(Installed::AlreadyPresent);
    }

    stop_list.push(json!({
        "hooks": [{"type": "command", "command": command}]
    }));

    if let Some(parent) = settings_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create settings dir: {e}"))?;
    }
    let json = serde_json::to_string_pretty(&settings)
        .map_err(|e| format!("Failed to serialize settings: {e}"))?;
    let tmp_path = settings_path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json)
        .map_err(|e| format!("Failed to write temp settings: {e}"))?;
    std::fs::rename(&tmp_path, settings_path)
        .map_err(|e| format!("Failed to rename settings: {e}"))?;
    Ok(Installed::Added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CMD: &str = "/usr/local/bin/tokenwatch update";

    #[test]
    fn creates_settings_from_scratch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let result = register_stop_hook(&path, CMD, "tokenwatch").unwrap();
        assert_eq!(result, Installed::Added);

        let settings: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let command = &settings["hooks"]["Stop"][0]["hooks"][0]["command"];
        assert_eq!(command, CMD);
    }

    #[test]
    fn second_install_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        register_stop_hook(&path, CMD, "tokenwatch").unwrap();
        let result = register_stop_hook(&path, CMD, "tokenwatch").unwrap();
        assert_eq!(result, Installed::AlreadyPresent);

        let settings: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(settings["hooks"]["Stop"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn preserves_unrelated_settings_and_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "model": "opus",
                "hooks": {
                    "Stop": [{"hooks": [{"type": "command", "command": "say done"}]}],
                    "PreToolUse": [{"hooks": [{"type": "command", "command": "audit"}]}]
                }
            }"#,
        )
        .unwrap();

        let result = register_stop_hook(&path, CMD, "tokenwatch").unwrap();
        assert_eq!(result, Installed::Added);

        let settings: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(settings["model"], "opus");
        assert_eq!(settings["hooks"]["PreToolUse"][0]["hooks"][0]["command"], "audit");
        let stop = settings["hooks"]["Stop"].as_array().unwrap();
        assert_eq!(stop.len(), 2);
        assert_eq!(stop[0]["hooks"][0]["command"], "say done");
    }

    #[test]
    fn malformed_settings_is_an_error_not_a_clobber() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{broken").unwrap();
        assert!(register_stop_hook(&path, CMD, "tokenwatch").is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{broken");
    }
}
