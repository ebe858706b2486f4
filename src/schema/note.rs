use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// A single note as the vault query layer exposes it.
///
/// The engine never parses note files itself; whatever ingests the vault
/// fills these in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    pub path: String,
    pub content: String,
    /// Titles of notes this note links to, in document order.
    pub links: Vec<String>,
    pub tags: FxHashSet<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Note {
    /// Build a note with the given title and body, dated at the Unix epoch.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            path: format!("{}.md", title),
            title,
            content: content.into(),
            links: Vec::new(),
            tags: FxHashSet::default(),
            created: DateTime::<Utc>::default(),
            modified: DateTime::<Utc>::default(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Lowercased alphanumeric words of the note body, used for cheap
    /// similarity when no embedding backend is wired in.
    pub fn words(&self) -> FxHashSet<String> {
        self.content
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .map(|w| w.to_lowercase())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_defaults() {
        let note = Note::new("Gardens", "Gardens grow slowly.");
        assert_eq!(note.path, "Gardens.md");
        assert!(note.links.is_empty());
        assert!(!note.has_tag("plants"));
    }

    #[test]
    fn words_drop_short_tokens_and_punctuation() {
        let note = Note::new("X", "An owl, a Moon; the OWL!");
        let words = note.words();
        assert!(words.contains("owl"));
        assert!(words.contains("moon"));
        assert!(words.contains("the"));
        assert!(!words.contains("an"));
        assert_eq!(words.len(), 3);
    }
}
