//! Runs one session: every enabled geist, in id order, one at a time, each
//! under the configured timeout.
//!
//! Per invocation: `Pending → Running → {Completed, Failed, TimedOut}`. A
//! completed run resets the geist's failure streak; a failed or timed-out run
//! extends it and disables the geist once it reaches the threshold. One
//! geist's failure never stops the session.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::core::assembler::SuggestionAssembler;
use crate::core::config::EngineConfig;
use crate::core::contract::{GeistContext, GeistFailure};
use crate::core::expansion::ExpansionEngine;
use crate::core::functions::FunctionError;
use crate::core::isolation::{run_isolated, Isolated};
use crate::core::random::SessionSeed;
use crate::core::registry::{GeistRegistry, GeistSource};
use crate::schema::geist::GeistId;
use crate::schema::record::{ExecutionOutcome, ExecutionRecord, GeistErrorKind, InvocationState};
use crate::schema::suggestion::Suggestion;

/// Everything one session produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub seed: SessionSeed,
    /// Suggestions from every completed geist, in run order.
    pub suggestions: Vec<Suggestion>,
    /// One record per invoked geist. Skipped geists have none.
    pub records: Vec<ExecutionRecord>,
}

impl SessionReport {
    pub fn record(&self, id: &GeistId) -> Option<&ExecutionRecord> {
        self.records.iter().find(|r| &r.geist_id == id)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.iter().filter(|r| !r.outcome.is_success())
    }
}

type GeistResult = Result<Vec<Suggestion>, (GeistErrorKind, String)>;

pub struct ExecutionScheduler {
    engine: ExpansionEngine,
    timeout: Duration,
    failure_threshold: u32,
}

impl ExecutionScheduler {
    pub fn new(engine: ExpansionEngine, timeout: Duration, failure_threshold: u32) -> Self {
        Self {
            engine,
            timeout,
            failure_threshold,
        }
    }

    pub fn from_config(engine: ExpansionEngine, config: &EngineConfig) -> Self {
        Self::new(engine, config.timeout(), config.failure_threshold)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn run_session(&self, registry: &mut GeistRegistry, seed: SessionSeed) -> SessionReport {
        tracing::info!(seed = seed.value(), geists = registry.len(), "session started");

        let mut suggestions = Vec::new();
        let mut records = Vec::new();

        for id in registry.ids() {
            let Some(descriptor) = registry.descriptor(&id) else {
                continue;
            };
            if !descriptor.enabled {
                tracing::debug!(geist = %id, "geist disabled; skipped");
                continue;
            }
            let Some(source) = registry.source(&id).filter(|s| s.is_runnable()).cloned() else {
                continue;
            };

            let record = self.invoke(&id, &source, seed);
            self.update_descriptor(registry, &record);
            suggestions.extend(record.suggestions().iter().cloned());
            records.push(record);
        }

        tracing::info!(
            seed = seed.value(),
            invoked = records.len(),
            suggestions = suggestions.len(),
            "session finished"
        );

        SessionReport {
            seed,
            suggestions,
            records,
        }
    }

    /// Run a single geist under the timeout. Does not touch its descriptor.
    pub fn invoke(&self, id: &GeistId, source: &GeistSource, seed: SessionSeed) -> ExecutionRecord {
        tracing::debug!(geist = %id, state = ?InvocationState::Pending, "invocation queued");
        let started_at = Utc::now();
        let mut rng = seed.rng_for(id);

        let run = match source {
            GeistSource::Grammar { document, count } => {
                let Some(document) = document.clone() else {
                    return ExecutionRecord {
                        geist_id: id.clone(),
                        started_at,
                        duration: Duration::ZERO,
                        outcome: ExecutionOutcome::Error {
                            kind: GeistErrorKind::Validation,
                            message: "grammar failed validation".to_string(),
                        },
                    };
                };
                let engine = self.engine.clone();
                let count = *count;
                let geist_id = id.clone();
                tracing::debug!(geist = %id, state = ?InvocationState::Running, count, "expanding grammar");
                run_isolated(id.as_str(), self.timeout, move || -> GeistResult {
                    engine
                        .expand_many(&document, count, &mut rng)
                        .map(|texts| SuggestionAssembler::from_expansions(&geist_id, texts))
                        .map_err(|e| (e.kind(), e.to_string()))
                })
            }
            GeistSource::Code(geist) => {
                let geist = Arc::clone(geist);
                let bridge = self.engine.bridge().clone();
                let geist_id = id.clone();
                tracing::debug!(geist = %id, state = ?InvocationState::Running, "running code geist");
                run_isolated(id.as_str(), self.timeout, move || -> GeistResult {
                    let mut ctx = GeistContext::new(&bridge, &mut rng);
                    geist
                        .suggest(&mut ctx)
                        .map(|drafts| SuggestionAssembler::from_drafts(&geist_id, drafts))
                        .map_err(|e| (failure_kind(&e), e.to_string()))
                })
            }
        };

        let outcome = match run.result {
            Isolated::Returned(Ok(suggestions)) => ExecutionOutcome::Success(suggestions),
            Isolated::Returned(Err((kind, message))) => ExecutionOutcome::Error { kind, message },
            Isolated::Panicked(message) => ExecutionOutcome::Error {
                kind: GeistErrorKind::Runtime,
                message: format!("panicked: {}", message),
            },
            Isolated::TimedOut => ExecutionOutcome::Timeout,
        };

        match &outcome {
            ExecutionOutcome::Success(s) => tracing::debug!(
                geist = %id,
                state = ?outcome.state(),
                suggestions = s.len(),
                elapsed_ms = run.elapsed.as_millis() as u64,
                "geist completed"
            ),
            ExecutionOutcome::Error { kind, message } => tracing::warn!(
                geist = %id,
                state = ?outcome.state(),
                kind = kind.label(),
                error = %message,
                "geist failed"
            ),
            ExecutionOutcome::Timeout => tracing::warn!(
                geist = %id,
                state = ?outcome.state(),
                kind = GeistErrorKind::Timeout.label(),
                timeout_ms = self.timeout.as_millis() as u64,
                "geist timed out; abandoned"
            ),
        }

        ExecutionRecord {
            geist_id: id.clone(),
            started_at,
            duration: run.elapsed,
            outcome,
        }
    }

    fn update_descriptor(&self, registry: &mut GeistRegistry, record: &ExecutionRecord) {
        let Some(descriptor) = registry.descriptor_mut(&record.geist_id) else {
            return;
        };
        match record.outcome.failure_message() {
            None => descriptor.record_success(),
            Some(message) => {
                if descriptor.record_failure(message, self.failure_threshold) {
                    tracing::warn!(
                        geist = %descriptor.id,
                        failures = descriptor.consecutive_failures,
                        "geist disabled after repeated failures"
                    );
                }
            }
        }
    }
}

fn failure_kind(failure: &GeistFailure) -> GeistErrorKind {
    match failure {
        GeistFailure::Function(FunctionError::UndefinedFunction(_)) => GeistErrorKind::UndefinedFunction,
        GeistFailure::Function(FunctionError::FunctionCallError { .. }) => GeistErrorKind::FunctionCall,
        _ => GeistErrorKind::Runtime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::functions::{CallFailure, FunctionBridge, FunctionRegistry, FunctionValue};
    use crate::core::grammar::GrammarDocument;
    use crate::core::vault::MemoryVault;
    use crate::schema::note::Note;
    use crate::schema::suggestion::SuggestionDraft;

    fn scheduler(timeout: Duration) -> ExecutionScheduler {
        let vault = MemoryVault::new(vec![Note::new("Alpha", "a"), Note::new("Beta", "b")]);
        let bridge = FunctionBridge::new(
            Arc::new(FunctionRegistry::with_builtins()),
            Arc::new(vault),
            "|||",
        );
        ExecutionScheduler::new(ExpansionEngine::new(bridge, 10), timeout, 3)
    }

    fn failing(_: &mut GeistContext<'_>) -> Result<Vec<SuggestionDraft>, GeistFailure> {
        Err(GeistFailure::message("nothing to say"))
    }

    #[test]
    fn grammar_geist_completes() {
        let mut registry = GeistRegistry::new();
        let doc = GrammarDocument::parse_ron(r#"{ "origin": ["Revisit $vault.random_note()"] }"#).unwrap();
        registry.register_grammar("revisit", doc, 2, "inline").unwrap();

        let report = scheduler(Duration::from_secs(5)).run_session(&mut registry, SessionSeed(1));
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].outcome.state(), InvocationState::Completed);
        assert_eq!(report.suggestions.len(), 2);
        assert_eq!(report.suggestions[0].referenced_notes.len(), 1);
    }

    #[test]
    fn failures_are_recorded_not_fatal() {
        let mut registry = GeistRegistry::new();
        registry.register_code("a_fails", failing).unwrap();
        let doc = GrammarDocument::parse_ron(r#"{ "origin": ["still here"] }"#).unwrap();
        registry.register_grammar("b_works", doc, 1, "inline").unwrap();

        let report = scheduler(Duration::from_secs(5)).run_session(&mut registry, SessionSeed(1));
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.suggestions.len(), 1);
        assert_eq!(report.failed().count(), 1);

        let d = registry.descriptor(&GeistId::new("a_fails")).unwrap();
        assert_eq!(d.consecutive_failures, 1);
        assert_eq!(d.last_error.as_deref(), Some("runtime: nothing to say"));
    }

    #[test]
    fn panics_become_runtime_errors() {
        let mut registry = GeistRegistry::new();
        registry
            .register_code(
                "panicky",
                |_: &mut GeistContext<'_>| -> Result<Vec<SuggestionDraft>, GeistFailure> {
                    panic!("bad geist")
                },
            )
            .unwrap();
        let report = scheduler(Duration::from_secs(5)).run_session(&mut registry, SessionSeed(1));
        match &report.records[0].outcome {
            ExecutionOutcome::Error { kind, message } => {
                assert_eq!(*kind, GeistErrorKind::Runtime);
                assert!(message.contains("bad geist"));
            }
            other => panic!("expected runtime error, got {:?}", other),
        }
    }

    #[test]
    fn recursion_limit_is_a_failure() {
        let mut registry = GeistRegistry::new();
        let doc = GrammarDocument::parse_ron(r##"{ "origin": ["#loop#"], "loop": ["#loop#"] }"##).unwrap();
        registry.register_grammar("loop", doc, 1, "inline").unwrap();
        let report = scheduler(Duration::from_secs(5)).run_session(&mut registry, SessionSeed(1));
        assert!(matches!(
            report.records[0].outcome,
            ExecutionOutcome::Error { kind: GeistErrorKind::RecursionLimit, .. }
        ));
    }

    #[test]
    fn panicking_function_fails_the_call_not_the_geist() {
        let mut functions = FunctionRegistry::new();
        functions
            .register("test.explode", |_, _| -> Result<FunctionValue, CallFailure> {
                panic!("handler blew up")
            })
            .unwrap();
        let bridge = FunctionBridge::new(Arc::new(functions), Arc::new(MemoryVault::default()), "|||");
        let scheduler = ExecutionScheduler::new(ExpansionEngine::new(bridge, 10), Duration::from_secs(5), 3);

        let mut registry = GeistRegistry::new();
        let doc = GrammarDocument::parse_ron(r##"{ "origin": ["$test.explode()#"] }"##).unwrap();
        registry.register_grammar("exploder", doc, 1, "inline").unwrap();
        let report = scheduler.run_session(&mut registry, SessionSeed(1));
        match &report.records[0].outcome {
            ExecutionOutcome::Error { kind, message } => {
                assert_eq!(*kind, GeistErrorKind::FunctionCall);
                assert!(message.contains("test.explode"));
            }
            other => panic!("expected function call error, got {:?}", other),
        }
    }
}
