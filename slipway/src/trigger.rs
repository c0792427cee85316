//! Trigger events and the release predicate.
//!
//! A run starts from exactly one [`TriggerEvent`]. Whether that run may end
//! in a release is decided by [`is_release_trigger`], a pure function of the
//! event and the configured [`TagPattern`]. Nothing here reads ambient
//! state.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ConfigError;

/// Default pattern for release tags (`v1`, `v1.2.0`, `v2024.08.1`, ...).
pub const DEFAULT_TAG_PATTERN: &str = "^v[0-9]";

/// The kind of source push that starts a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// A push to a branch.
    Push,
    /// A push of a tag.
    Tag,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Tag => write!(f, "tag"),
        }
    }
}

/// A source push that triggers a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Whether the push was a branch push or a tag push.
    pub kind: TriggerKind,
    /// The pushed ref (branch name, tag name, or commit-ish).
    pub reference: String,
}

impl TriggerEvent {
    /// Creates a trigger event.
    #[must_use]
    pub fn new(kind: TriggerKind, reference: impl Into<String>) -> Self {
        Self {
            kind,
            reference: reference.into(),
        }
    }

    /// Creates a branch-push trigger.
    #[must_use]
    pub fn push(reference: impl Into<String>) -> Self {
        Self::new(TriggerKind::Push, reference)
    }

    /// Creates a tag-push trigger.
    #[must_use]
    pub fn tag(reference: impl Into<String>) -> Self {
        Self::new(TriggerKind::Tag, reference)
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of '{}'", self.kind, self.reference)
    }
}

/// A compiled pattern describing which refs count as release tags.
#[derive(Debug, Clone)]
pub struct TagPattern {
    pattern: Regex,
}

impl TagPattern {
    /// Compiles a tag pattern.
    pub fn new(expression: &str) -> Result<Self, ConfigError> {
        let pattern = Regex::new(expression).map_err(|err| {
            ConfigError::Invalid(format!("bad tag pattern '{expression}': {err}"))
        })?;
        Ok(Self { pattern })
    }

    /// The pattern source this was compiled from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    /// Returns true if the ref matches the release tag pattern.
    #[must_use]
    pub fn matches(&self, reference: &str) -> bool {
        self.pattern.is_match(reference)
    }
}

/// Decides whether a trigger event should end in a release.
///
/// Pure predicate: true iff the event is a tag push AND the pushed ref
/// matches the release tag pattern. A branch push whose name happens to
/// look like a tag does not release.
#[must_use]
pub fn is_release_trigger(event: &TriggerEvent, pattern: &TagPattern) -> bool {
    event.kind == TriggerKind::Tag && pattern.matches(&event.reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release_pattern() -> TagPattern {
        TagPattern::new(DEFAULT_TAG_PATTERN).unwrap()
    }

    #[test]
    fn test_tag_push_matching_pattern_releases() {
        let event = TriggerEvent::tag("v1.2.0");
        assert!(is_release_trigger(&event, &release_pattern()));
    }

    #[test]
    fn test_branch_push_never_releases() {
        let event = TriggerEvent::push("main");
        assert!(!is_release_trigger(&event, &release_pattern()));
    }

    #[test]
    fn test_branch_push_with_tag_shaped_name_never_releases() {
        let event = TriggerEvent::push("v1.2.0");
        assert!(!is_release_trigger(&event, &release_pattern()));
    }

    #[test]
    fn test_tag_push_not_matching_pattern_does_not_release() {
        let event = TriggerEvent::tag("nightly-2024-08-01");
        assert!(!is_release_trigger(&event, &release_pattern()));
    }

    #[test]
    fn test_custom_pattern() {
        let pattern = TagPattern::new("^release-").unwrap();
        assert!(is_release_trigger(&TriggerEvent::tag("release-7"), &pattern));
        assert!(!is_release_trigger(&TriggerEvent::tag("v1.2.0"), &pattern));
    }

    #[test]
    fn test_bad_pattern_is_config_error() {
        let err = TagPattern::new("(unclosed").unwrap_err();
        assert!(err.to_string().contains("bad tag pattern"));
    }

    #[test]
    fn test_trigger_kind_serde_round_trip() {
        let json = serde_json::to_string(&TriggerKind::Tag).unwrap();
        assert_eq!(json, "\"tag\"");
        let back: TriggerKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TriggerKind::Tag);
    }

    #[test]
    fn test_trigger_event_display() {
        assert_eq!(TriggerEvent::tag("v2.0.0").to_string(), "tag of 'v2.0.0'");
        assert_eq!(TriggerEvent::push("main").to_string(), "push of 'main'");
    }
}
