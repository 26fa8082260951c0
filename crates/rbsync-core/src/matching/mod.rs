//! Pattern matching over change descriptions and post-review output.
//!
//! All matches here are anchored at the start of the subject, mirroring a
//! "looking at" match: the pattern must match a prefix of the text, not the
//! whole text and not somewhere in the middle.

pub mod directive;
pub mod key;
pub mod response;

pub use directive::{ActionDirective, OverrideParser, Resolution};
pub use key::KeyExtractor;
pub use response::{match_long, match_text, ResponseLine, ResponseParser};

use regex::{Captures, Regex};

/// Captures for a match that begins at the first byte of `text`.
///
/// Leftmost-first search returns the match starting at offset zero whenever
/// one exists, so checking the start offset is equivalent to anchoring.
pub(crate) fn captures_at_start<'t>(pattern: &Regex, text: &'t str) -> Option<Captures<'t>> {
    pattern
        .captures(text)
        .filter(|caps| caps.get(0).is_some_and(|m| m.start() == 0))
}
