//! Recursive expansion of a validated grammar.
//!
//! Expansion starts at `origin` (depth 0). Every symbol reference is expanded
//! one level deeper; passing the configured maximum depth fails the expansion
//! instead of recursing further, which is what keeps self-referential
//! grammars from running forever.

use rand::rngs::StdRng;
use rand::Rng;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::core::functions::{FunctionBridge, FunctionError};
use crate::core::grammar::{GrammarDocument, ModifierStep, Template, TemplateSegment, ORIGIN};
use crate::schema::record::GeistErrorKind;

/// Default maximum symbol depth.
pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Debug, Error)]
pub enum ExpansionError {
    #[error("recursion limit exceeded expanding '{symbol}' (max depth {depth})")]
    RecursionLimitExceeded { symbol: String, depth: usize },
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),
    #[error("'{symbol}' has {parts} cluster part(s), no part {index}")]
    ClusterPart {
        symbol: String,
        index: usize,
        parts: usize,
    },
    #[error(transparent)]
    Function(#[from] FunctionError),
}

impl ExpansionError {
    /// The scheduler-level error kind this maps to.
    pub fn kind(&self) -> GeistErrorKind {
        match self {
            Self::RecursionLimitExceeded { .. } => GeistErrorKind::RecursionLimit,
            Self::UnknownSymbol(_) => GeistErrorKind::Validation,
            Self::ClusterPart { .. } => GeistErrorKind::Runtime,
            Self::Function(FunctionError::UndefinedFunction(_)) => GeistErrorKind::UndefinedFunction,
            Self::Function(FunctionError::FunctionCallError { .. }) => GeistErrorKind::FunctionCall,
            Self::Function(_) => GeistErrorKind::Runtime,
        }
    }
}

/// Values bound by `[name:template]` actions during one origin expansion.
type Bindings = FxHashMap<String, String>;

/// Expands grammar documents against a function bridge.
#[derive(Clone)]
pub struct ExpansionEngine {
    bridge: FunctionBridge,
    max_depth: usize,
}

impl ExpansionEngine {
    pub fn new(bridge: FunctionBridge, max_depth: usize) -> Self {
        Self { bridge, max_depth }
    }

    pub fn bridge(&self) -> &FunctionBridge {
        &self.bridge
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Expand `origin` once.
    pub fn expand_origin(
        &self,
        doc: &GrammarDocument,
        rng: &mut StdRng,
    ) -> Result<String, ExpansionError> {
        self.expand_symbol(doc, ORIGIN, rng)
    }

    /// Expand any symbol as if it were the origin, with fresh bindings.
    pub fn expand_symbol(
        &self,
        doc: &GrammarDocument,
        symbol: &str,
        rng: &mut StdRng,
    ) -> Result<String, ExpansionError> {
        let mut bindings = Bindings::default();
        self.expand_at(doc, symbol, 0, &mut bindings, rng)
    }

    /// Expand `origin` `count` times, drawing every expansion from the same
    /// random stream. The first error stops the run.
    pub fn expand_many(
        &self,
        doc: &GrammarDocument,
        count: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<String>, ExpansionError> {
        (0..count).map(|_| self.expand_origin(doc, rng)).collect()
    }

    fn expand_at(
        &self,
        doc: &GrammarDocument,
        symbol: &str,
        depth: usize,
        bindings: &mut Bindings,
        rng: &mut StdRng,
    ) -> Result<String, ExpansionError> {
        if depth > self.max_depth {
            return Err(ExpansionError::RecursionLimitExceeded {
                symbol: symbol.to_string(),
                depth: self.max_depth,
            });
        }

        let alternatives = doc
            .alternatives(symbol)
            .filter(|alts| !alts.is_empty())
            .ok_or_else(|| ExpansionError::UnknownSymbol(symbol.to_string()))?;

        let chosen = &alternatives[rng.gen_range(0..alternatives.len())];
        tracing::trace!(symbol, depth, alternative = %chosen.raw, "expanding");
        self.render(doc, &chosen.template, depth, bindings, rng)
    }

    fn render(
        &self,
        doc: &GrammarDocument,
        template: &Template,
        depth: usize,
        bindings: &mut Bindings,
        rng: &mut StdRng,
    ) -> Result<String, ExpansionError> {
        let mut output = String::new();

        for segment in &template.segments {
            match segment {
                TemplateSegment::Literal(text) => output.push_str(text),
                TemplateSegment::SymbolRef { name, modifiers } => {
                    let value = match bindings.get(name) {
                        Some(bound) => bound.clone(),
                        None => self.expand_at(doc, name, depth + 1, bindings, rng)?,
                    };
                    output.push_str(&self.apply_steps(name, value, modifiers)?);
                }
                TemplateSegment::FunctionCall(call) => {
                    output.push_str(&self.bridge.call(call, rng)?);
                }
                TemplateSegment::Action { name, template } => {
                    let value = self.render(doc, template, depth, bindings, rng)?;
                    bindings.insert(name.clone(), value);
                }
            }
        }

        Ok(output)
    }

    fn apply_steps(
        &self,
        symbol: &str,
        mut value: String,
        steps: &[ModifierStep],
    ) -> Result<String, ExpansionError> {
        for step in steps {
            value = match step {
                ModifierStep::Part(index) => {
                    let parts = self.bridge.split_cluster(&value);
                    match parts.get(*index) {
                        Some(part) => part.to_string(),
                        None => {
                            return Err(ExpansionError::ClusterPart {
                                symbol: symbol.to_string(),
                                index: *index,
                                parts: parts.len(),
                            })
                        }
                    }
                }
                ModifierStep::Apply(modifier) => modifier.apply(&value),
            };
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::functions::{CallFailure, FunctionRegistry, FunctionValue};
    use crate::core::vault::MemoryVault;
    use crate::schema::note::Note;
    use rand::SeedableRng;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn doc(pairs: &[(&str, &[&str])]) -> GrammarDocument {
        let raw: BTreeMap<String, Vec<String>> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect();
        GrammarDocument::from_symbols(raw).unwrap()
    }

    fn engine_with(registry: FunctionRegistry) -> ExpansionEngine {
        let vault = MemoryVault::new(vec![
            Note::new("Alpha", "a"),
            Note::new("Beta", "b"),
            Note::new("Gamma", "c"),
        ]);
        let bridge = FunctionBridge::new(Arc::new(registry), Arc::new(vault), "|||");
        ExpansionEngine::new(bridge, DEFAULT_MAX_DEPTH)
    }

    fn engine() -> ExpansionEngine {
        engine_with(FunctionRegistry::with_builtins())
    }

    #[test]
    fn single_alternatives_expand_exactly() {
        let d = doc(&[("origin", &["#a# meets #b#"]), ("a", &["alpha"]), ("b", &["beta"])]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(engine().expand_origin(&d, &mut rng).unwrap(), "alpha meets beta");
    }

    #[test]
    fn same_seed_same_text() {
        let d = doc(&[
            ("origin", &["#x# and #x# with $vault.random_note()"]),
            ("x", &["one", "two", "three", "four"]),
        ]);
        let e = engine();
        let a = e.expand_origin(&d, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = e.expand_origin(&d, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn modifiers_apply_left_to_right() {
        let d = doc(&[("origin", &["#n.s.capitalize#"]), ("n", &["city"])]);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(engine().expand_origin(&d, &mut rng).unwrap(), "Cities");
    }

    #[test]
    fn self_reference_hits_the_limit() {
        let d = doc(&[("origin", &["#a#"]), ("a", &["#a#"])]);
        let mut rng = StdRng::seed_from_u64(0);
        match engine().expand_origin(&d, &mut rng).unwrap_err() {
            ExpansionError::RecursionLimitExceeded { symbol, depth } => {
                assert_eq!(symbol, "a");
                assert_eq!(depth, DEFAULT_MAX_DEPTH);
            }
            other => panic!("expected recursion limit, got {:?}", other),
        }
    }

    #[test]
    fn chain_just_inside_the_limit_succeeds() {
        // origin(0) -> s1(1) -> ... -> s10(10)
        let mut pairs: Vec<(String, Vec<String>)> = vec![("origin".into(), vec!["#s1#".into()])];
        for i in 1..10 {
            pairs.push((format!("s{}", i), vec![format!("#s{}#", i + 1)]));
        }
        pairs.push(("s10".into(), vec!["leaf".into()]));
        let d = GrammarDocument::from_symbols(pairs.into_iter().collect()).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(engine().expand_origin(&d, &mut rng).unwrap(), "leaf");

        let shallow = ExpansionEngine::new(engine().bridge().clone(), 9);
        assert!(matches!(
            shallow.expand_origin(&d, &mut rng),
            Err(ExpansionError::RecursionLimitExceeded { ref symbol, .. }) if symbol == "s10"
        ));
    }

    #[test]
    fn actions_bind_once_and_select_parts() {
        let mut registry = FunctionRegistry::new();
        registry
            .register("test.pair", |ctx, _| {
                let n: u32 = ctx.rng.gen_range(0..1000);
                Ok(FunctionValue::Cluster(vec![format!("left{}", n), format!("right{}", n)]))
            })
            .unwrap();
        let d = doc(&[("origin", &["[p:$test.pair()]#p.0# / #p.1#"])]);
        let text = engine_with(registry)
            .expand_origin(&d, &mut StdRng::seed_from_u64(3))
            .unwrap();
        let (left, right) = text.split_once(" / ").unwrap();
        assert_eq!(left.trim_start_matches("left"), right.trim_start_matches("right"));
    }

    #[test]
    fn missing_cluster_part_is_an_error() {
        let d = doc(&[("origin", &["[p:one|||two]#p.2#"])]);
        let err = engine()
            .expand_origin(&d, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, ExpansionError::ClusterPart { index: 2, parts: 2, .. }));
        assert_eq!(err.kind(), GeistErrorKind::Runtime);
    }

    #[test]
    fn function_errors_map_to_kinds() {
        let d = doc(&[("origin", &["$vault.nothing()"])]);
        let err = engine()
            .expand_origin(&d, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert_eq!(err.kind(), GeistErrorKind::UndefinedFunction);

        let mut registry = FunctionRegistry::new();
        registry
            .register("test.fail", |_, _| Err(CallFailure::new("boom")))
            .unwrap();
        let d = doc(&[("origin", &["$test.fail()"])]);
        let err = engine_with(registry)
            .expand_origin(&d, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert_eq!(err.kind(), GeistErrorKind::FunctionCall);
    }

    #[test]
    fn expand_many_shares_the_stream() {
        let d = doc(&[("origin", &["$vault.random_note()"])]);
        let e = engine();
        let mut rng = StdRng::seed_from_u64(9);
        let many = e.expand_many(&d, 8, &mut rng).unwrap();
        assert_eq!(many.len(), 8);
        let first = &many[0];
        assert!(many.iter().any(|t| t != first));
    }
}
