use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype wrapper for geist IDs.
///
/// Ordering is lexicographic and is the order the scheduler runs geists in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeistId(pub String);

impl GeistId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GeistId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How a geist produces its suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeistKind {
    /// Host logic implementing the suggestion contract directly.
    Code,
    /// A recursive grammar expanded from its `origin` symbol.
    Grammar,
}

impl GeistKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Grammar => "grammar",
        }
    }
}

/// Identity and health of one loaded geist.
///
/// Only the scheduler mutates `enabled`, `consecutive_failures` and
/// `last_error`, once per invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeistDescriptor {
    pub id: GeistId,
    pub kind: GeistKind,
    /// Where the geist came from: a grammar file path or a code geist label.
    pub source_ref: String,
    pub enabled: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl GeistDescriptor {
    pub fn new(id: GeistId, kind: GeistKind, source_ref: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            source_ref: source_ref.into(),
            enabled: true,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    /// Record a successful invocation. Any success resets the failure streak.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_error = None;
    }

    /// Record a failed or timed-out invocation. Returns true if this failure
    /// pushed the geist over `threshold` and disabled it.
    pub fn record_failure(&mut self, message: impl Into<String>, threshold: u32) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(message.into());
        if self.enabled && self.consecutive_failures >= threshold {
            self.enabled = false;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> GeistDescriptor {
        GeistDescriptor::new(GeistId::new("what_if"), GeistKind::Grammar, "geists/what_if.ron")
    }

    #[test]
    fn new_descriptor_is_enabled_and_healthy() {
        let d = descriptor();
        assert!(d.enabled);
        assert_eq!(d.consecutive_failures, 0);
        assert!(d.last_error.is_none());
        assert_eq!(d.kind.label(), "grammar");
    }

    #[test]
    fn failures_disable_at_threshold() {
        let mut d = descriptor();
        assert!(!d.record_failure("boom", 3));
        assert!(!d.record_failure("boom", 3));
        assert!(d.enabled);
        assert!(d.record_failure("boom", 3));
        assert!(!d.enabled);
        assert_eq!(d.consecutive_failures, 3);
        assert_eq!(d.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn success_resets_streak() {
        let mut d = descriptor();
        d.record_failure("boom", 3);
        d.record_failure("boom", 3);
        d.record_success();
        assert_eq!(d.consecutive_failures, 0);
        assert!(d.last_error.is_none());
        assert!(d.enabled);
    }

    #[test]
    fn geist_ids_order_lexicographically() {
        let mut ids = vec![GeistId::new("zeta"), GeistId::new("alpha"), GeistId::new("mid")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "alpha");
        assert_eq!(ids[2].to_string(), "zeta");
    }
}
