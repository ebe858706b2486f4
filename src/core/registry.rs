//! The geist registry: every loaded geist, its source, and its descriptor.
//!
//! Geists are kept in id order, which is the order the scheduler runs them.

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::core::contract::CodeGeist;
use crate::core::grammar::{GrammarDocument, GrammarError, GrammarGeistFile};
use crate::schema::geist::{GeistDescriptor, GeistId, GeistKind};
use crate::schema::record::GeistErrorKind;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("geist '{0}' is already registered")]
    Duplicate(GeistId),
    #[error("no geist with id '{0}'")]
    NotFound(GeistId),
    #[error("geist '{0}' failed validation and cannot be re-enabled until its grammar is fixed")]
    InvalidGrammar(GeistId),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    RonSer(#[from] ron::Error),
}

/// What runs when a geist is invoked.
#[derive(Clone)]
pub enum GeistSource {
    /// `document` is `None` when the grammar failed validation.
    Grammar {
        document: Option<Arc<GrammarDocument>>,
        count: usize,
    },
    Code(Arc<dyn CodeGeist>),
}

impl fmt::Debug for GeistSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grammar { document, count } => f
                .debug_struct("Grammar")
                .field("valid", &document.is_some())
                .field("count", count)
                .finish(),
            Self::Code(_) => f.write_str("Code"),
        }
    }
}

impl GeistSource {
    /// Whether this source can ever run.
    pub fn is_runnable(&self) -> bool {
        match self {
            Self::Grammar { document, .. } => document.is_some(),
            Self::Code(_) => true,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    descriptor: GeistDescriptor,
    source: GeistSource,
}

/// The persisted part of a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorState {
    pub id: GeistId,
    pub enabled: bool,
    pub consecutive_failures: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GeistRegistry {
    geists: BTreeMap<GeistId, Entry>,
}

impl GeistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, descriptor: GeistDescriptor, source: GeistSource) -> Result<(), RegistryError> {
        if self.geists.contains_key(&descriptor.id) {
            return Err(RegistryError::Duplicate(descriptor.id));
        }
        tracing::debug!(geist = %descriptor.id, kind = descriptor.kind.label(), "geist registered");
        self.geists
            .insert(descriptor.id.clone(), Entry { descriptor, source });
        Ok(())
    }

    pub fn register_grammar(
        &mut self,
        id: impl Into<GeistId>,
        document: GrammarDocument,
        count: usize,
        source_ref: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let descriptor = GeistDescriptor::new(id.into(), GeistKind::Grammar, source_ref);
        self.insert(
            descriptor,
            GeistSource::Grammar {
                document: Some(Arc::new(document)),
                count,
            },
        )
    }

    /// Register a grammar geist that failed validation. It is disabled and
    /// stays disabled: `reset` refuses it.
    pub fn register_invalid_grammar(
        &mut self,
        id: impl Into<GeistId>,
        source_ref: impl Into<String>,
        error: &GrammarError,
    ) -> Result<(), RegistryError> {
        self.register_disabled(id.into(), source_ref.into(), error.to_string())
    }

    fn register_disabled(
        &mut self,
        id: GeistId,
        source_ref: String,
        reason: String,
    ) -> Result<(), RegistryError> {
        let mut descriptor = GeistDescriptor::new(id, GeistKind::Grammar, source_ref);
        descriptor.enabled = false;
        descriptor.last_error = Some(format!("{}: {}", GeistErrorKind::Validation.label(), reason));
        tracing::warn!(geist = %descriptor.id, error = %reason, "grammar failed validation; geist disabled");
        self.insert(
            descriptor,
            GeistSource::Grammar {
                document: None,
                count: 0,
            },
        )
    }

    pub fn register_code<G>(
        &mut self,
        id: impl Into<GeistId>,
        geist: G,
    ) -> Result<(), RegistryError>
    where
        G: CodeGeist + 'static,
    {
        self.register_shared_code(id, Arc::new(geist))
    }

    pub fn register_shared_code(
        &mut self,
        id: impl Into<GeistId>,
        geist: Arc<dyn CodeGeist>,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        let source_ref = format!("code:{}", id);
        let descriptor = GeistDescriptor::new(id, GeistKind::Code, source_ref);
        self.insert(descriptor, GeistSource::Code(geist))
    }

    /// Load one grammar geist file. A file that cannot be read is an error;
    /// a file that is not UTF-8, or does not parse or validate, registers a
    /// disabled geist under its file stem.
    pub fn load_grammar_file(
        &mut self,
        path: &Path,
        default_count: usize,
    ) -> Result<GeistId, RegistryError> {
        let stem = file_stem(path);
        let source_ref = path.display().to_string();

        let file = match GrammarGeistFile::load(path) {
            Ok(file) => file,
            Err(GrammarError::Io(e)) if e.kind() != io::ErrorKind::InvalidData => {
                return Err(RegistryError::Io(e))
            }
            Err(e) => {
                let id = GeistId::new(stem);
                self.register_invalid_grammar(id.clone(), source_ref, &e)?;
                return Ok(id);
            }
        };

        let id = GeistId::new(file.id.clone().unwrap_or(stem));
        match file.document() {
            Ok(document) => {
                let count = file.count.unwrap_or(default_count);
                self.register_grammar(id.clone(), document, count, source_ref)?;
            }
            Err(e) => self.register_invalid_grammar(id.clone(), source_ref, &e)?,
        }
        Ok(id)
    }

    /// Load every `.ron` and `.json` file in `dir`, in file-name order.
    ///
    /// Only an unreadable directory is an error. A file that fails on its own
    /// (unreadable, or declaring an id already taken) is logged and registered
    /// disabled under its file stem, or skipped when the stem is taken too.
    pub fn load_grammar_dir(
        &mut self,
        dir: &Path,
        default_count: usize,
    ) -> Result<Vec<GeistId>, RegistryError> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|s| s.to_str()),
                    Some("ron") | Some("json")
                )
            })
            .collect();
        paths.sort();

        let mut ids = Vec::with_capacity(paths.len());
        for path in &paths {
            match self.load_grammar_file(path, default_count) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "grammar file not loaded");
                    let id = GeistId::new(file_stem(path));
                    if self.geists.contains_key(&id) {
                        continue;
                    }
                    self.register_disabled(id.clone(), path.display().to_string(), e.to_string())?;
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    pub fn descriptor(&self, id: &GeistId) -> Option<&GeistDescriptor> {
        self.geists.get(id).map(|e| &e.descriptor)
    }

    pub(crate) fn descriptor_mut(&mut self, id: &GeistId) -> Option<&mut GeistDescriptor> {
        self.geists.get_mut(id).map(|e| &mut e.descriptor)
    }

    pub fn source(&self, id: &GeistId) -> Option<&GeistSource> {
        self.geists.get(id).map(|e| &e.source)
    }

    /// All descriptors, in run order.
    pub fn descriptors(&self) -> impl Iterator<Item = &GeistDescriptor> {
        self.geists.values().map(|e| &e.descriptor)
    }

    pub fn ids(&self) -> Vec<GeistId> {
        self.geists.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.geists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geists.is_empty()
    }

    /// Re-enable a geist and clear its failure streak.
    pub fn reset(&mut self, id: &GeistId) -> Result<(), RegistryError> {
        let entry = self
            .geists
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        if !entry.source.is_runnable() {
            return Err(RegistryError::InvalidGrammar(id.clone()));
        }
        entry.descriptor.enabled = true;
        entry.descriptor.record_success();
        tracing::info!(geist = %id, "geist reset");
        Ok(())
    }

    pub fn export_state(&self) -> Vec<DescriptorState> {
        self.descriptors()
            .map(|d| DescriptorState {
                id: d.id.clone(),
                enabled: d.enabled,
                consecutive_failures: d.consecutive_failures,
                last_error: d.last_error.clone(),
            })
            .collect()
    }

    /// Apply persisted state to the geists loaded now. State for unknown
    /// geists is ignored, and a geist that failed validation this time stays
    /// disabled whatever was saved. Returns how many geists were updated.
    pub fn apply_state(&mut self, states: &[DescriptorState]) -> usize {
        let mut applied = 0;
        for state in states {
            let Some(entry) = self.geists.get_mut(&state.id) else {
                continue;
            };
            if !entry.source.is_runnable() {
                continue;
            }
            entry.descriptor.enabled = state.enabled;
            entry.descriptor.consecutive_failures = state.consecutive_failures;
            entry.descriptor.last_error = state.last_error.clone();
            applied += 1;
        }
        applied
    }

    pub fn save_state(&self, path: &Path) -> Result<(), RegistryError> {
        let text = ron::ser::to_string_pretty(&self.export_state(), PrettyConfig::default())?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Read state saved by `save_state`. A missing file is not an error.
    pub fn load_state(&mut self, path: &Path) -> Result<usize, RegistryError> {
        if !path.exists() {
            return Ok(0);
        }
        let contents = std::fs::read_to_string(path)?;
        let states: Vec<DescriptorState> = ron::from_str(&contents)?;
        Ok(self.apply_state(&states))
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed")
        .to_string()
}
