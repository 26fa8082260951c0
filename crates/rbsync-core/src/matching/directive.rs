//! Author-supplied override directives in change descriptions.
//!
//! A change author can steer rbsync by writing one of the tokens `RB_SKIP`,
//! `RB_NEW`, `RB_UPDATE`, or `RB_NONE` anywhere in the description:
//!
//! - `RB_SKIP`: do not create or update a review request
//! - `RB_NEW`: create a new review request even when one already exists
//! - `RB_UPDATE`: update the existing review request (create if none exists)
//! - `RB_NONE`: no special handling, but suppresses the default promotion below
//!
//! Without a token the site default applies: skip everything when
//! `skip_unflagged` is set, otherwise create-or-update. A skip default is
//! promoted to update when build history already holds a review for the key,
//! unless the site requires an explicit `RB_UPDATE`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::history::{BuildRecord, HistorySearcher};

/// Action derived from a change description. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionDirective {
    /// Leave review requests alone
    Skip,
    /// Always create a fresh review request
    ForceNew,
    /// Update the existing review request
    ForceUpdate,
    /// Create or update depending on history
    None,
}

impl ActionDirective {
    /// Directives in token scan order.
    pub const ALL: [Self; 4] = [Self::Skip, Self::ForceNew, Self::ForceUpdate, Self::None];

    /// Literal token an author writes to request this directive.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Skip => "RB_SKIP",
            Self::ForceNew => "RB_NEW",
            Self::ForceUpdate => "RB_UPDATE",
            Self::None => "RB_NONE",
        }
    }
}

impl fmt::Display for ActionDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Result of inspecting one change description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub directive: ActionDirective,
    /// The author wrote a token; no default or promotion was applied
    pub explicit: bool,
}

/// Resolves the directive for a change from its description and history.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverrideParser {
    skip_unflagged: bool,
    require_explicit_update: bool,
}

impl OverrideParser {
    #[must_use]
    pub const fn new(skip_unflagged: bool, require_explicit_update: bool) -> Self {
        Self {
            skip_unflagged,
            require_explicit_update,
        }
    }

    /// Directive applied when the description carries no token.
    #[must_use]
    pub const fn default_directive(&self) -> ActionDirective {
        if self.skip_unflagged {
            ActionDirective::Skip
        } else {
            ActionDirective::None
        }
    }

    /// First directive token found in `message`, by scan order rather than position.
    #[must_use]
    pub fn explicit_directive(message: &str) -> Option<ActionDirective> {
        let upper = message.to_uppercase();
        ActionDirective::ALL
            .into_iter()
            .find(|d| upper.contains(d.token()))
    }

    /// Resolve the directive for a change.
    ///
    /// History is only consulted when there is no explicit token and the
    /// default would skip.
    pub fn resolve<R: BuildRecord>(
        &self,
        message: &str,
        key: &str,
        head: Option<R>,
        searcher: &HistorySearcher,
        now: DateTime<Utc>,
    ) -> Resolution {
        let default = self.default_directive();
        if message.is_empty() {
            return Resolution {
                directive: default,
                explicit: false,
            };
        }

        if let Some(directive) = Self::explicit_directive(message) {
            return Resolution {
                directive,
                explicit: true,
            };
        }

        let directive = if default == ActionDirective::Skip
            && !self.require_explicit_update
            && searcher.find_at(head, key, now).is_some()
        {
            ActionDirective::ForceUpdate
        } else {
            default
        };

        Resolution {
            directive,
            explicit: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ReviewOutcome;
    use crate::history::{BuildHistory, BuildRef};

    fn history_with(key: Option<&str>) -> BuildHistory {
        let mut history = BuildHistory::new();
        history.begin(1, Utc::now()).unwrap();
        if let Some(key) = key {
            history
                .push_outcome(ReviewOutcome::new(key, Some(1), 42, "alice", "m").unwrap())
                .unwrap();
        }
        history
    }

    fn resolve(parser: OverrideParser, message: &str, history: &BuildHistory) -> Resolution {
        parser.resolve(
            message,
            "ABC-1",
            history.head(),
            &HistorySearcher::default(),
            Utc::now(),
        )
    }

    #[test]
    fn test_rb_new_wins_regardless_of_history() {
        for skip in [false, true] {
            for require in [false, true] {
                for key in [None, Some("ABC-1")] {
                    let parser = OverrideParser::new(skip, require);
                    let history = history_with(key);
                    let r = resolve(parser, "ABC-1 rb_new rewrite", &history);
                    assert_eq!(r.directive, ActionDirective::ForceNew);
                    assert!(r.explicit);
                }
            }
        }
    }

    #[test]
    fn test_scan_order_beats_text_position() {
        let msg = "ABC-1 RB_UPDATE then RB_SKIP";
        assert_eq!(
            OverrideParser::explicit_directive(msg),
            Some(ActionDirective::Skip)
        );
    }

    #[test]
    fn test_empty_message_uses_default() {
        let history = history_with(Some("ABC-1"));
        let r = resolve(OverrideParser::new(true, false), "", &history);
        assert_eq!(r.directive, ActionDirective::Skip);
        assert!(!r.explicit);
    }

    #[test]
    fn test_unflagged_default_none() {
        let history = history_with(Some("ABC-1"));
        let r = resolve(OverrideParser::new(false, false), "ABC-1 work", &history);
        assert_eq!(r.directive, ActionDirective::None);
    }

    #[test]
    fn test_skip_default_promoted_to_update_with_history() {
        let history = history_with(Some("abc-1"));
        let r = resolve(OverrideParser::new(true, false), "ABC-1 work", &history);
        assert_eq!(r.directive, ActionDirective::ForceUpdate);
        assert!(!r.explicit);
    }

    #[test]
    fn test_skip_default_kept_without_history() {
        let history = history_with(None);
        let r = resolve(OverrideParser::new(true, false), "ABC-1 work", &history);
        assert_eq!(r.directive, ActionDirective::Skip);
    }

    #[test]
    fn test_skip_default_kept_when_explicit_update_required() {
        let history = history_with(Some("ABC-1"));
        let r = resolve(OverrideParser::new(true, true), "ABC-1 work", &history);
        assert_eq!(r.directive, ActionDirective::Skip);
    }

    #[test]
    fn test_explicit_none_suppresses_promotion() {
        let history = history_with(Some("ABC-1"));
        let r = resolve(OverrideParser::new(true, false), "ABC-1 RB_NONE", &history);
        assert_eq!(r.directive, ActionDirective::None);
        assert!(r.explicit);
    }

    #[test]
    fn test_no_history_head() {
        let parser = OverrideParser::new(true, false);
        let r = parser.resolve(
            "ABC-1 work",
            "ABC-1",
            None::<BuildRef<'_>>,
            &HistorySearcher::default(),
            Utc::now(),
        );
        assert_eq!(r.directive, ActionDirective::Skip);
    }
}
