//! Shared helpers for CLI commands.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use rbsync_core::changelist::{parse_changes, ChangelistEntry};
use rbsync_core::config::{config_path, Settings};

/// Load settings from `explicit` or the workspace default, then apply
/// environment overrides.
///
/// A missing default file yields default settings; a missing explicit file
/// is an error.
pub fn load_settings(root: &Path, explicit: Option<&Path>) -> Result<Settings> {
    let path = explicit.map_or_else(|| config_path(root), Path::to_path_buf);

    let mut settings = if explicit.is_some() || path.exists() {
        Settings::from_file(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "No settings file, using defaults");
        Settings::default()
    };

    settings.apply_env();
    Ok(settings)
}

/// Read changelist entries from a JSON file, or stdin for `-`.
pub fn read_changes(path: &Path) -> Result<Vec<ChangelistEntry>> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read changes from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read changes from {}", path.display()))?
    };
    parse_changes(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_default_settings_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let settings = load_settings(dir.path(), None).unwrap();
        assert_eq!(settings.publisher.stale_days, -1);
    }

    #[test]
    fn test_missing_explicit_settings_file_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_settings(dir.path(), Some(&missing)).is_err());
    }

    #[test]
    fn test_default_settings_file_is_read() {
        let dir = tempdir().unwrap();
        let path = config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[publisher]\nstale_days = 9\n").unwrap();
        let settings = load_settings(dir.path(), None).unwrap();
        assert_eq!(settings.publisher.stale_days, 9);
    }

    #[test]
    fn test_read_changes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("changes.json");
        std::fs::write(
            &path,
            r#"{"changes": [{"author": "alice", "message": "ABC-1 x", "change_number": 3}]}"#,
        )
        .unwrap();
        let changes = read_changes(&path).unwrap();
        assert_eq!(changes[0].change_number, Some(3));
    }
}
