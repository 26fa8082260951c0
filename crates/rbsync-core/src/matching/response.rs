//! Typed extraction from post-review output lines.

use regex::Regex;

use super::captures_at_start;

/// Line announcing a posted review request, e.g. `Review request #36 posted.`
pub const SUCCESS_PATTERN: &str = r"[\w\s\.]+#([0-9]+)[\w\s\.]+";

/// Line carrying an error code, e.g. `Error 123: Invalid 400` or `Error 42: Not Found`.
///
/// The trailing code of the pair is optional; only the first one is used.
pub const ERROR_PATTERN: &str = r"[a-zA-Z\s]+([\d]+):[a-zA-Z\s]+([\d]+)?";

/// Text of capture `group` for a match anchored at the start of `text`.
///
/// Returns `None` when the text is blank, the pattern does not match at the
/// start, or the pattern has no such group.
#[must_use]
pub fn match_text(text: &str, pattern: &Regex, group: usize) -> Option<String> {
    if text.trim().is_empty() || pattern.captures_len() <= group {
        return None;
    }
    let caps = captures_at_start(pattern, text)?;
    caps.get(group).map(|m| m.as_str().to_string())
}

/// Capture `group` parsed as an integer. Malformed or overflowing digits yield `None`.
#[must_use]
pub fn match_long(text: &str, pattern: &Regex, group: usize) -> Option<u64> {
    match_text(text, pattern, group)?.trim().parse().ok()
}

/// A post-review output line that ends the read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLine {
    /// The tool reported the review request it created or updated
    Posted(u64),
    /// The tool reported an error; carries the leading error code
    Failed(u64),
}

/// Classifies post-review output lines.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    success: Regex,
    error: Regex,
}

impl ResponseParser {
    /// Parser using the stock post-review line patterns.
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_patterns(SUCCESS_PATTERN, ERROR_PATTERN)
    }

    pub fn with_patterns(success: &str, error: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            success: Regex::new(success)?,
            error: Regex::new(error)?,
        })
    }

    /// Classify one line. Success is checked before error.
    #[must_use]
    pub fn classify(&self, line: &str) -> Option<ResponseLine> {
        if let Some(id) = match_long(line, &self.success, 1) {
            return Some(ResponseLine::Posted(id));
        }
        match_long(line, &self.error, 1).map(ResponseLine::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success() -> Regex {
        Regex::new(SUCCESS_PATTERN).unwrap()
    }

    fn error() -> Regex {
        Regex::new(ERROR_PATTERN).unwrap()
    }

    #[test]
    fn test_success_line_yields_review_id() {
        assert_eq!(match_long("Review request #36 posted.", &success(), 1), Some(36));
    }

    #[test]
    fn test_error_line_yields_first_code() {
        assert_eq!(match_long("Error 123: Invalid 400", &error(), 1), Some(123));
        assert_eq!(match_long("Error 123: Invalid 400", &error(), 2), Some(400));
    }

    #[test]
    fn test_error_line_without_trailing_code() {
        assert_eq!(match_long("Error 42: Not Found", &error(), 1), Some(42));
        assert_eq!(match_long("Error 42: Not Found", &error(), 2), None);
    }

    #[test]
    fn test_missing_group_is_none() {
        assert_eq!(match_long("Review request #36 posted.", &success(), 2), None);
    }

    #[test]
    fn test_blank_and_unmatched_lines() {
        assert_eq!(match_text("", &success(), 1), None);
        assert_eq!(match_text("   ", &success(), 1), None);
        assert_eq!(match_long("no identifier here", &success(), 1), None);
    }

    #[test]
    fn test_match_must_start_at_first_byte() {
        assert_eq!(match_long("-> Review request #36 posted.", &success(), 1), None);
    }

    #[test]
    fn test_overflowing_digits_are_none() {
        let line = "Review request #99999999999999999999999 posted.";
        assert_eq!(match_long(line, &success(), 1), None);
        assert_eq!(
            match_text(line, &success(), 1).as_deref(),
            Some("99999999999999999999999")
        );
    }

    #[test]
    fn test_classify() {
        let parser = ResponseParser::new().unwrap();
        assert_eq!(
            parser.classify("Review request #42 posted."),
            Some(ResponseLine::Posted(42))
        );
        assert_eq!(
            parser.classify("Error 42: Not Found"),
            Some(ResponseLine::Failed(42))
        );
        assert_eq!(
            parser.classify("Error 42: Not Found 404"),
            Some(ResponseLine::Failed(42))
        );
        assert_eq!(parser.classify("Uploading diff..."), None);
    }
}
