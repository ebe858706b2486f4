//! Read-only vault query interface.
//!
//! Geists and grammar functions only ever see the vault through this trait.
//! Storage, sync and embedding search live elsewhere; `MemoryVault` is a
//! small in-memory implementation for tests, tools and demos.

use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::assembler::SuggestionAssembler;
use crate::schema::note::Note;

/// Read-only view of a note corpus. Every method returning a list returns it
/// in a deterministic order so seeded sampling over it is reproducible.
pub trait VaultQuery: Send + Sync {
    /// All note titles, sorted.
    fn titles(&self) -> Vec<String>;

    fn note(&self, title: &str) -> Option<&Note>;

    /// Titles this note links to that exist in the vault, in link order.
    fn outgoing_links(&self, title: &str) -> Vec<String>;

    /// Titles of notes linking to this one, sorted.
    fn backlinks(&self, title: &str) -> Vec<String>;

    /// Up to `k` notes most similar to `title`, most similar first.
    fn neighbours(&self, title: &str, k: usize) -> Vec<String>;

    fn note_count(&self) -> usize {
        self.titles().len()
    }

    /// Notes with neither outgoing links nor backlinks.
    fn orphans(&self) -> Vec<String> {
        self.titles()
            .into_iter()
            .filter(|t| self.outgoing_links(t).is_empty() && self.backlinks(t).is_empty())
            .collect()
    }

    /// Up to `k` most linked-to notes, ties broken by title.
    fn hubs(&self, k: usize) -> Vec<String> {
        let mut counted: Vec<(usize, String)> = self
            .titles()
            .into_iter()
            .map(|t| (self.backlinks(&t).len(), t))
            .filter(|(n, _)| *n > 0)
            .collect();
        counted.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        counted.into_iter().take(k).map(|(_, t)| t).collect()
    }

    /// Up to `k` most recently modified notes.
    fn recent(&self, k: usize) -> Vec<String> {
        let mut dated = dated_titles(self);
        dated.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        dated.into_iter().take(k).map(|(_, t)| t).collect()
    }

    /// Up to `k` least recently modified notes.
    fn oldest(&self, k: usize) -> Vec<String> {
        let mut dated = dated_titles(self);
        dated.sort();
        dated.into_iter().take(k).map(|(_, t)| t).collect()
    }

    /// Titles carrying `tag`, sorted.
    fn tagged(&self, tag: &str) -> Vec<String> {
        self.titles()
            .into_iter()
            .filter(|t| self.note(t).map(|n| n.has_tag(tag)).unwrap_or(false))
            .collect()
    }
}

fn dated_titles<V: VaultQuery + ?Sized>(vault: &V) -> Vec<(DateTime<Utc>, String)> {
    vault
        .titles()
        .into_iter()
        .filter_map(|t| vault.note(&t).map(|n| (n.modified, t.clone())))
        .collect()
}

/// Notes held in memory, with backlinks and word sets computed up front.
#[derive(Debug, Clone, Default)]
pub struct MemoryVault {
    notes: BTreeMap<String, Note>,
    backlinks: FxHashMap<String, Vec<String>>,
}

impl MemoryVault {
    /// Build a vault. A later note with the same title replaces an earlier one.
    pub fn new(notes: Vec<Note>) -> Self {
        let notes: BTreeMap<String, Note> =
            notes.into_iter().map(|n| (n.title.clone(), n)).collect();

        let mut backlinks: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for (title, note) in &notes {
            for target in &note.links {
                if notes.contains_key(target) && target != title {
                    let sources = backlinks.entry(target.clone()).or_default();
                    if !sources.contains(title) {
                        sources.push(title.clone());
                    }
                }
            }
        }
        for sources in backlinks.values_mut() {
            sources.sort();
        }

        Self { notes, backlinks }
    }

    /// Read every `.md` file directly inside `dir`. Titles are file stems,
    /// links are `[[wikilinks]]`, tags are `#words`, and dates come from file
    /// metadata.
    pub fn from_markdown_dir(dir: &Path) -> std::io::Result<MemoryVault> {
        let mut notes = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("md") {
                continue;
            }
            let Some(title) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = std::fs::read_to_string(&path)?;
            let mut note = Note::new(title, content);
            note.path = path.display().to_string();
            note.links = SuggestionAssembler::extract_note_links(&note.content);
            note.tags = markdown_tags(&note.content);

            let metadata = std::fs::metadata(&path)?;
            if let Ok(modified) = metadata.modified() {
                note.modified = DateTime::<Utc>::from(modified);
            }
            note.created = metadata
                .created()
                .map(DateTime::<Utc>::from)
                .unwrap_or(note.modified);
            notes.push(note);
        }
        Ok(MemoryVault::new(notes))
    }

    /// Jaccard overlap of the two notes' word sets.
    pub fn similarity(&self, a: &str, b: &str) -> f32 {
        match (self.notes.get(a), self.notes.get(b)) {
            (Some(a), Some(b)) => jaccard(&a.words(), &b.words()),
            _ => 0.0,
        }
    }
}

fn markdown_tags(content: &str) -> FxHashSet<String> {
    content
        .split_whitespace()
        .filter_map(|word| word.strip_prefix('#'))
        .map(|tag| tag.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_'))
        .filter(|tag| tag.chars().next().is_some_and(char::is_alphabetic))
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &FxHashSet<String>, b: &FxHashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

impl VaultQuery for MemoryVault {
    fn titles(&self) -> Vec<String> {
        self.notes.keys().cloned().collect()
    }

    fn note(&self, title: &str) -> Option<&Note> {
        self.notes.get(title)
    }

    fn outgoing_links(&self, title: &str) -> Vec<String> {
        let Some(note) = self.notes.get(title) else {
            return Vec::new();
        };
        let mut out: Vec<String> = Vec::new();
        for target in &note.links {
            if self.notes.contains_key(target) && target != title && !out.contains(target) {
                out.push(target.clone());
            }
        }
        out
    }

    fn backlinks(&self, title: &str) -> Vec<String> {
        self.backlinks.get(title).cloned().unwrap_or_default()
    }

    fn neighbours(&self, title: &str, k: usize) -> Vec<String> {
        let Some(source) = self.notes.get(title) else {
            return Vec::new();
        };
        let words = source.words();
        let mut scored: Vec<(f32, &String)> = self
            .notes
            .iter()
            .filter(|(t, _)| t.as_str() != title)
            .map(|(t, n)| (jaccard(&words, &n.words()), t))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.into_iter().take(k).map(|(_, t)| t.clone()).collect()
    }

    fn note_count(&self) -> usize {
        self.notes.len()
    }
}
