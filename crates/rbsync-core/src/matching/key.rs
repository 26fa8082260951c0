//! Correlation key extraction from change descriptions.

use regex::Regex;

use super::captures_at_start;

/// Pulls a correlation key (an issue id, for example) off the front of a
/// change description.
#[derive(Debug, Clone, Default)]
pub struct KeyExtractor {
    pattern: Option<Regex>,
}

impl KeyExtractor {
    /// Compile the configured key pattern.
    ///
    /// The pattern is wrapped in an outer group, so the extracted key is the
    /// whole leading match of the configured expression. The pattern must
    /// also compile on its own, so unbalanced groups that the wrapping
    /// happens to close are rejected. `None` or an empty pattern disables
    /// correlation.
    pub fn new(pattern: Option<&str>) -> Result<Self, regex::Error> {
        let pattern = match pattern.map(str::trim) {
            Some(p) if !p.is_empty() => {
                Regex::new(p)?;
                Some(Regex::new(&format!("({p})"))?)
            }
            _ => None,
        };
        Ok(Self { pattern })
    }

    /// Whether a key pattern is configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.pattern.is_some()
    }

    /// Extract the correlation key from `message`, if its trimmed text starts with one.
    #[must_use]
    pub fn extract(&self, message: &str) -> Option<String> {
        let pattern = self.pattern.as_ref()?;
        let subject = message.trim();
        if subject.is_empty() {
            return None;
        }

        tracing::trace!(pattern = pattern.as_str(), subject, "Matching key pattern");

        let key = captures_at_start(pattern, subject)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|k| !k.is_empty());

        match &key {
            Some(key) => tracing::debug!(key, "Correlation key found in change description"),
            None => tracing::trace!(
                pattern = pattern.as_str(),
                subject,
                "No correlation key at start of change description"
            ),
        }

        key
    }
}
