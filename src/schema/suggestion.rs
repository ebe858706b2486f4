use serde::{Deserialize, Serialize};

use super::geist::GeistId;

/// A finished suggestion, ready for the downstream filtering stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    /// Note titles the suggestion talks about, in first-appearance order.
    pub referenced_notes: Vec<String>,
    pub geist_id: GeistId,
    pub title: Option<String>,
}

/// What a code geist hands back before the assembler stamps its ID on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionDraft {
    pub text: String,
    /// Left empty, the assembler pulls `[[links]]` out of `text` instead.
    #[serde(default)]
    pub referenced_notes: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl SuggestionDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_notes<I, S>(mut self, notes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.referenced_notes = notes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_builder() {
        let draft = SuggestionDraft::new("What if [[A]] argued with [[B]]?")
            .with_notes(["A", "B"])
            .with_title("Argument");
        assert_eq!(draft.referenced_notes, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(draft.title.as_deref(), Some("Argument"));
    }

    #[test]
    fn draft_deserializes_with_defaults() {
        let draft: SuggestionDraft = ron::from_str(r#"(text: "hello")"#).unwrap();
        assert_eq!(draft.text, "hello");
        assert!(draft.referenced_notes.is_empty());
        assert!(draft.title.is_none());
    }
}
