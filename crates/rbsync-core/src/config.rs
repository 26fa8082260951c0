//! rbsync configuration.
//!
//! Settings come from a TOML file with a `[server]` table (how to reach the
//! review system and run post-review) and a `[publisher]` table (how changes
//! are correlated and published). A handful of server values can be
//! overridden from the environment.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::StalenessPolicy;
use crate::log::RBSYNC_DIR;
use crate::matching::KeyExtractor;

pub const CONFIG_FILE: &str = "config.toml";

const DEFAULT_CMD_PATH: &str = "post-review";
const DEFAULT_API_TIMEOUT_SECS: u64 = 300;

/// Errors loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid key pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Default location of the settings file under a workspace root.
#[must_use]
pub fn config_path(root: &Path) -> PathBuf {
    root.join(RBSYNC_DIR).join(CONFIG_FILE)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub server: ServerSettings,
    pub publisher: PublisherSettings,
}

/// Review system location and credentials.
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub url: String,
    pub username: String,
    pub password: String,
    /// post-review executable, resolved through `PATH` when not absolute
    pub cmd_path: String,
    /// Source control client passed to post-review
    pub scm_client: Option<String>,
    /// Deadline for one post-review run; unset waits indefinitely
    pub timeout_secs: Option<u64>,
    pub api_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            cmd_path: DEFAULT_CMD_PATH.to_string(),
            scm_client: None,
            timeout_secs: None,
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"********")
            .field("cmd_path", &self.cmd_path)
            .field("scm_client", &self.scm_client)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl ServerSettings {
    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    #[must_use]
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub const fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Resolve the post-review executable.
    pub fn locate_tool(&self) -> Result<PathBuf, which::Error> {
        which::which(&self.cmd_path)
    }
}

/// Correlation and publishing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublisherSettings {
    /// Regular expression matched at the start of each change description
    pub key_pattern: Option<String>,
    /// Days before a recorded review goes stale; -1 never
    pub stale_days: i64,
    /// Comma separated user names
    pub default_reviewers: String,
    /// Comma separated group names
    pub default_groups: String,
    pub author_as_reviewer: bool,
    pub publish: bool,
    pub skip_unflagged: bool,
    pub require_explicit_update: bool,
    pub fail_build_on_error: bool,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            key_pattern: None,
            stale_days: -1,
            default_reviewers: String::new(),
            default_groups: String::new(),
            author_as_reviewer: true,
            publish: true,
            skip_unflagged: false,
            require_explicit_update: false,
            fail_build_on_error: false,
        }
    }
}

impl PublisherSettings {
    pub fn staleness(&self) -> Result<StalenessPolicy, ConfigError> {
        StalenessPolicy::from_days(self.stale_days).ok_or_else(|| {
            ConfigError::Validation(format!(
                "stale_days must be -1 or greater, got {}",
                self.stale_days
            ))
        })
    }

    #[must_use]
    pub fn default_reviewer_list(&self) -> Vec<String> {
        split_list(&self.default_reviewers)
    }

    #[must_use]
    pub fn default_group_list(&self) -> Vec<String> {
        split_list(&self.default_groups)
    }

    /// Comma list of reviewers for a new review request by `author`.
    #[must_use]
    pub fn reviewers_for(&self, author: &str) -> String {
        let mut reviewers = Vec::new();
        if self.author_as_reviewer && !author.trim().is_empty() {
            reviewers.push(author.trim().to_string());
        }
        reviewers.extend(self.default_reviewer_list());
        reviewers.join(",")
    }

    /// Comma list of default groups, normalized.
    #[must_use]
    pub fn groups(&self) -> String {
        self.default_group_list().join(",")
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `RBSYNC_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let server = &mut self.server;
        for (name, slot) in [
            ("RBSYNC_URL", &mut server.url),
            ("RBSYNC_USERNAME", &mut server.username),
            ("RBSYNC_PASSWORD", &mut server.password),
            ("RBSYNC_CMD_PATH", &mut server.cmd_path),
        ] {
            if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
                tracing::debug!(name, "Using environment override");
                *slot = value;
            }
        }
    }

    /// Check the settings. Returns warnings for suspicious but usable values.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        if self.server.url.trim().is_empty() {
            return Err(ConfigError::Validation("server.url is required".to_string()));
        }
        if self.server.cmd_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.cmd_path must not be empty".to_string(),
            ));
        }
        self.publisher.staleness()?;

        let mut warnings = Vec::new();
        match self.publisher.key_pattern.as_deref().map(str::trim) {
            Some(pattern) if !pattern.is_empty() => {
                KeyExtractor::new(Some(pattern))?;
            }
            _ => warnings.push(
                "publisher.key_pattern is not set; every change will be ignored".to_string(),
            ),
        }
        if self.publisher.require_explicit_update && !self.publisher.skip_unflagged {
            warnings.push(
                "publisher.require_explicit_update has no effect unless skip_unflagged is set"
                    .to_string(),
            );
        }
        if self.server.timeout_secs == Some(0) {
            warnings.push("server.timeout_secs is 0; every post-review run will time out".to_string());
        }
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FULL: &str = r#"
        [server]
        url = "https://reviews.example.com/"
        username = "builder"
        password = "hunter2"
        cmd_path = "/usr/local/bin/post-review"
        scm_client = "build-ws"
        timeout_secs = 600

        [publisher]
        key_pattern = "[A-Z]+-[0-9]+"
        stale_days = 14
        default_reviewers = "carol, dave,,"
        default_groups = "core"
        skip_unflagged = true
    "#;

    #[test]
    fn test_parse_full() {
        let settings = Settings::from_toml(FULL).unwrap();
        assert_eq!(settings.server.base_url(), "https://reviews.example.com");
        assert_eq!(settings.server.tool_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(settings.server.api_timeout(), Duration::from_secs(300));
        assert_eq!(settings.publisher.staleness().unwrap(), StalenessPolicy::Days(14));
        assert!(settings.publisher.publish);
        assert!(settings.publisher.author_as_reviewer);
        assert!(settings.validate().unwrap().is_empty());
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.server.cmd_path, "post-review");
        assert_eq!(settings.server.tool_timeout(), None);
        assert_eq!(settings.publisher.stale_days, -1);
        assert_eq!(settings.publisher.staleness().unwrap(), StalenessPolicy::Never);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Settings::from_toml("[server]\nurll = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_reviewers_for() {
        let settings = Settings::from_toml(FULL).unwrap();
        assert_eq!(settings.publisher.reviewers_for("alice"), "alice,carol,dave");

        let mut publisher = settings.publisher;
        publisher.author_as_reviewer = false;
        assert_eq!(publisher.reviewers_for("alice"), "carol,dave");

        publisher.default_reviewers = String::new();
        assert_eq!(publisher.reviewers_for("alice"), "");
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::from_toml(FULL).unwrap();
        let env: HashMap<&str, &str> = [
            ("RBSYNC_URL", "https://other.example.com"),
            ("RBSYNC_PASSWORD", "s3cret"),
            ("RBSYNC_USERNAME", "  "),
        ]
        .into_iter()
        .collect();
        settings.apply_env_with(|name| env.get(name).map(ToString::to_string));
        assert_eq!(settings.server.url, "https://other.example.com");
        assert_eq!(settings.server.password, "s3cret");
        assert_eq!(settings.server.username, "builder");
    }

    #[test]
    fn test_validate_errors() {
        let mut settings = Settings::from_toml(FULL).unwrap();
        settings.publisher.stale_days = -2;
        assert!(matches!(settings.validate(), Err(ConfigError::Validation(_))));

        settings.publisher.stale_days = 0;
        settings.publisher.key_pattern = Some("([A-Z".to_string());
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidPattern(_))));
        settings.publisher.key_pattern = Some("a)|(b".to_string());
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidPattern(_))));

        settings.server.url = String::new();
        assert!(matches!(settings.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_warnings() {
        let mut settings = Settings::from_toml(FULL).unwrap();
        settings.publisher.skip_unflagged = false;
        settings.publisher.require_explicit_update = true;
        settings.publisher.key_pattern = None;
        let warnings = settings.validate().unwrap();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_debug_masks_password() {
        let settings = Settings::from_toml(FULL).unwrap();
        let shown = format!("{settings:?}");
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, FULL).unwrap();
        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.server.username, "builder");

        let missing = Settings::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
