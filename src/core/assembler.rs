//! Normalizes grammar expansions and code-geist drafts into `Suggestion`s.
//!
//! No ranking or filtering happens here beyond dropping blank text.

use crate::schema::geist::GeistId;
use crate::schema::suggestion::{Suggestion, SuggestionDraft};

pub struct SuggestionAssembler;

impl SuggestionAssembler {
    /// One suggestion per non-blank expansion. Referenced notes come from the
    /// `[[links]]` in the text.
    pub fn from_expansions<I>(geist_id: &GeistId, texts: I) -> Vec<Suggestion>
    where
        I: IntoIterator<Item = String>,
    {
        texts
            .into_iter()
            .filter_map(|text| {
                let text = text.trim();
                if text.is_empty() {
                    return None;
                }
                Some(Suggestion {
                    referenced_notes: Self::extract_note_links(text),
                    text: text.to_string(),
                    geist_id: geist_id.clone(),
                    title: None,
                })
            })
            .collect()
    }

    /// One suggestion per non-blank draft. Drafts without explicit notes fall
    /// back to the links in their text.
    pub fn from_drafts<I>(geist_id: &GeistId, drafts: I) -> Vec<Suggestion>
    where
        I: IntoIterator<Item = SuggestionDraft>,
    {
        drafts
            .into_iter()
            .filter_map(|draft| {
                let text = draft.text.trim();
                if text.is_empty() {
                    return None;
                }
                let referenced_notes = if draft.referenced_notes.is_empty() {
                    Self::extract_note_links(text)
                } else {
                    dedup(draft.referenced_notes)
                };
                Some(Suggestion {
                    text: text.to_string(),
                    referenced_notes,
                    geist_id: geist_id.clone(),
                    title: draft.title.filter(|t| !t.trim().is_empty()),
                })
            })
            .collect()
    }

    /// Titles of `[[wikilinks]]` in `text`, first appearance first, without
    /// duplicates. `[[Title|alias]]` yields `Title`.
    pub fn extract_note_links(text: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut rest = text;
        while let Some(start) = rest.find("[[") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("]]") else {
                break;
            };
            let inner = &after[..end];
            let title = inner.split('|').next().unwrap_or_default().trim();
            if !title.is_empty() && !found.iter().any(|f: &String| f == title) {
                found.push(title.to_string());
            }
            rest = &after[end + 2..];
        }
        found
    }
}

fn dedup(notes: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(notes.len());
    for note in notes {
        if !out.contains(&note) {
            out.push(note);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_links_in_order() {
        let links = SuggestionAssembler::extract_note_links(
            "What if [[Beta]] met [[Alpha|the first]]? Ask [[Beta]] again.",
        );
        assert_eq!(links, vec!["Beta", "Alpha"]);
    }

    #[test]
    fn unclosed_link_is_ignored() {
        assert!(SuggestionAssembler::extract_note_links("[[open").is_empty());
        assert!(SuggestionAssembler::extract_note_links("[[]]").is_empty());
    }

    #[test]
    fn expansions_are_trimmed_and_blanks_dropped() {
        let id = GeistId::new("g");
        let out = SuggestionAssembler::from_expansions(
            &id,
            vec!["  hello [[A]] ".to_string(), "   ".to_string(), String::new()],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "hello [[A]]");
        assert_eq!(out[0].referenced_notes, vec!["A"]);
        assert_eq!(out[0].geist_id, id);
    }

    #[test]
    fn drafts_keep_explicit_notes() {
        let id = GeistId::new("code");
        let out = SuggestionAssembler::from_drafts(
            &id,
            vec![
                SuggestionDraft::new("about [[X]]")
                    .with_notes(["Y", "Y", "Z"])
                    .with_title("Pair"),
                SuggestionDraft::new("only [[X]]"),
                SuggestionDraft::new(" "),
            ],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].referenced_notes, vec!["Y", "Z"]);
        assert_eq!(out[0].title.as_deref(), Some("Pair"));
        assert_eq!(out[1].referenced_notes, vec!["X"]);
        assert!(out[1].title.is_none());
    }
}
