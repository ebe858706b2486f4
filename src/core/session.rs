//! The top-level engine: registry, scheduler, and session bookkeeping.
//!
//! Built via `GeistEngine::builder()`, which loads grammar geists from disk or
//! takes them directly, wires the function registry to a vault, and applies
//! any persisted descriptor state.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::core::config::{ConfigError, EngineConfig};
use crate::core::contract::CodeGeist;
use crate::core::expansion::ExpansionEngine;
use crate::core::functions::{FunctionBridge, FunctionRegistry};
use crate::core::grammar::GrammarDocument;
use crate::core::random::SessionSeed;
use crate::core::registry::{GeistRegistry, RegistryError};
use crate::core::scheduler::{ExecutionScheduler, SessionReport};
use crate::core::vault::{MemoryVault, VaultQuery};
use crate::schema::geist::GeistId;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

pub struct GeistEngine {
    registry: GeistRegistry,
    scheduler: ExecutionScheduler,
    config: EngineConfig,
    seed: SessionSeed,
    state_file: Option<PathBuf>,
}

/// Builder for constructing a `GeistEngine`.
pub struct GeistEngineBuilder {
    seed: Option<u64>,
    date: Option<NaiveDate>,
    config: Option<EngineConfig>,
    config_path: Option<PathBuf>,
    timeout: Option<Duration>,
    grammars_dirs: Vec<PathBuf>,
    state_file: Option<PathBuf>,
    /// Directly provided grammars (for testing without files).
    grammars: Vec<(GeistId, GrammarDocument, Option<usize>)>,
    code_geists: Vec<(GeistId, Arc<dyn CodeGeist>)>,
    vault: Option<Arc<dyn VaultQuery>>,
    functions: Option<FunctionRegistry>,
}

impl GeistEngine {
    pub fn builder() -> GeistEngineBuilder {
        GeistEngineBuilder {
            seed: None,
            date: None,
            config: None,
            config_path: None,
            timeout: None,
            grammars_dirs: Vec::new(),
            state_file: None,
            grammars: Vec::new(),
            code_geists: Vec::new(),
            vault: None,
            functions: None,
        }
    }

    pub fn registry(&self) -> &GeistRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The seed `run_session` uses.
    pub fn seed(&self) -> SessionSeed {
        self.seed
    }

    /// Run every enabled geist once with the engine's seed.
    pub fn run_session(&mut self) -> Result<SessionReport, SessionError> {
        self.run_session_with_seed(self.seed)
    }

    /// Run a session with an explicit seed, then persist descriptor state if
    /// a state file is configured.
    pub fn run_session_with_seed(&mut self, seed: SessionSeed) -> Result<SessionReport, SessionError> {
        let report = self.scheduler.run_session(&mut self.registry, seed);
        self.save_state()?;
        Ok(report)
    }

    /// Re-enable a geist disabled by repeated failures.
    pub fn reset_geist(&mut self, id: &GeistId) -> Result<(), SessionError> {
        self.registry.reset(id)?;
        self.save_state()
    }

    fn save_state(&self) -> Result<(), SessionError> {
        if let Some(ref path) = self.state_file {
            self.registry.save_state(path)?;
        }
        Ok(())
    }
}

impl GeistEngineBuilder {
    /// Fix the session seed. Takes precedence over `date`.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Derive the session seed from a date instead of today.
    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the config from a RON file at build time.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Override the configured per-geist timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Load every grammar geist file in `path`. May be called more than once.
    pub fn grammars_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.grammars_dirs.push(path.as_ref().to_path_buf());
        self
    }

    /// Provide a grammar geist directly. `count` falls back to the config's
    /// `default_count`.
    pub fn with_grammar(
        mut self,
        id: impl Into<GeistId>,
        document: GrammarDocument,
        count: Option<usize>,
    ) -> Self {
        self.grammars.push((id.into(), document, count));
        self
    }

    pub fn with_code_geist<G>(mut self, id: impl Into<GeistId>, geist: G) -> Self
    where
        G: CodeGeist + 'static,
    {
        self.code_geists.push((id.into(), Arc::new(geist)));
        self
    }

    pub fn with_vault<V>(mut self, vault: V) -> Self
    where
        V: VaultQuery + 'static,
    {
        self.vault = Some(Arc::new(vault));
        self
    }

    /// Replace the built-in function registry.
    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = Some(functions);
        self
    }

    /// Read descriptor state from `path` at build time and write it back
    /// after every session.
    pub fn state_file(mut self, path: impl AsRef<Path>) -> Self {
        self.state_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn build(self) -> Result<GeistEngine, SessionError> {
        let mut config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => EngineConfig::load_from_ron(&path)?,
            (None, None) => EngineConfig::default(),
        };
        if let Some(timeout) = self.timeout {
            config.timeout_ms = timeout.as_millis().max(1) as u64;
        }
        config.validate()?;

        let mut registry = GeistRegistry::new();
        for dir in &self.grammars_dirs {
            if dir.exists() {
                registry.load_grammar_dir(dir, config.default_count)?;
            } else {
                tracing::warn!(dir = %dir.display(), "grammar directory not found");
            }
        }
        for (id, document, count) in self.grammars {
            let source_ref = format!("inline:{}", id);
            registry.register_grammar(id, document, count.unwrap_or(config.default_count), source_ref)?;
        }
        for (id, geist) in self.code_geists {
            registry.register_shared_code(id, geist)?;
        }
        if let Some(ref path) = self.state_file {
            let applied = registry.load_state(path)?;
            tracing::debug!(path = %path.display(), applied, "descriptor state loaded");
        }

        let seed = match (self.seed, self.date) {
            (Some(seed), _) => SessionSeed(seed),
            (None, Some(date)) => SessionSeed::from_date(date),
            (None, None) => SessionSeed::today(),
        };

        let vault = self
            .vault
            .unwrap_or_else(|| Arc::new(MemoryVault::default()));
        let functions = self.functions.unwrap_or_else(FunctionRegistry::with_builtins);
        let bridge = FunctionBridge::new(Arc::new(functions), vault, config.cluster_delimiter.clone());
        let engine = ExpansionEngine::new(bridge, config.max_depth);
        let scheduler = ExecutionScheduler::from_config(engine, &config);

        tracing::info!(geists = registry.len(), seed = seed.value(), "engine built");

        Ok(GeistEngine {
            registry,
            scheduler,
            config,
            seed,
            state_file: self.state_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::note::Note;

    fn meeting() -> GrammarDocument {
        GrammarDocument::parse_ron(r##"{ "origin": ["#a# meets #b#"], "a": ["alpha"], "b": ["beta"] }"##)
            .unwrap()
    }

    #[test]
    fn seed_precedence() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let engine = GeistEngine::builder().date(date).build().unwrap();
        assert_eq!(engine.seed(), SessionSeed(20240102));
        let engine = GeistEngine::builder().date(date).seed(5).build().unwrap();
        assert_eq!(engine.seed(), SessionSeed(5));
    }

    #[test]
    fn timeout_overrides_config() {
        let engine = GeistEngine::builder()
            .timeout(Duration::from_millis(250))
            .build()
            .unwrap();
        assert_eq!(engine.config().timeout_ms, 250);
    }

    #[test]
    fn inline_grammar_runs() {
        let mut engine = GeistEngine::builder()
            .seed(1)
            .with_vault(MemoryVault::new(vec![Note::new("Only", "x")]))
            .with_grammar("meeting", meeting(), None)
            .build()
            .unwrap();
        let report = engine.run_session().unwrap();
        assert_eq!(report.suggestions.len(), 1);
        assert_eq!(report.suggestions[0].text, "alpha meets beta");
        assert_eq!(report.suggestions[0].geist_id, GeistId::new("meeting"));
    }

    #[test]
    fn duplicate_ids_fail_the_build() {
        let result = GeistEngine::builder()
            .with_grammar("same", meeting(), None)
            .with_grammar("same", meeting(), None)
            .build();
        assert!(matches!(
            result,
            Err(SessionError::Registry(RegistryError::Duplicate(_)))
        ));
    }
}
