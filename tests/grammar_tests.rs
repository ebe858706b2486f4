/// Grammar loading, validation, and expansion integration tests.

use geist_engine::core::expansion::{ExpansionEngine, ExpansionError};
use geist_engine::core::functions::{FunctionBridge, FunctionRegistry};
use geist_engine::core::grammar::{GrammarDocument, GrammarError, GrammarGeistFile};
use geist_engine::core::modifiers::{article, capitalize, past_tense, pluralize};
use geist_engine::core::registry::GeistRegistry;
use geist_engine::schema::geist::GeistId;
use geist_engine::schema::note::Note;
use geist_engine::MemoryVault;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;

fn vault() -> MemoryVault {
    let mut notes = Vec::new();
    for (i, topic) in ["rivers", "stones", "bridges", "maps", "tides", "salt"]
        .iter()
        .enumerate()
    {
        let mut note = Note::new(
            format!("Note {}", i),
            format!("thinking about {} and {} again", topic, topic),
        );
        if i > 0 {
            note.links = vec![format!("Note {}", i - 1)];
        }
        notes.push(note);
    }
    notes.push(Note::new("Loner", "completely unconnected words here"));
    MemoryVault::new(notes)
}

fn engine(max_depth: usize) -> ExpansionEngine {
    let bridge = FunctionBridge::new(
        Arc::new(FunctionRegistry::with_builtins()),
        Arc::new(vault()),
        "|||",
    );
    ExpansionEngine::new(bridge, max_depth)
}

#[test]
fn modifier_literal_table() {
    assert_eq!(pluralize("city"), "cities");
    assert_eq!(pluralize("person"), "people");
    assert_eq!(past_tense("go"), "went");
    assert_eq!(article("owl"), "an owl");
    assert_eq!(capitalize("hello world"), "Hello world");
}

#[test]
fn bundled_geists_all_validate() {
    let mut registry = GeistRegistry::new();
    let ids = registry.load_grammar_dir(Path::new("geists"), 1).unwrap();
    assert!(ids.len() >= 3);
    for id in &ids {
        let descriptor = registry.descriptor(id).unwrap();
        assert!(
            descriptor.enabled,
            "bundled geist {} failed to load: {:?}",
            id,
            descriptor.last_error
        );
    }
}

#[test]
fn bundled_geists_expand_against_a_vault() {
    let e = engine(10);
    for name in ["what_if", "bridge_builder", "revisit"] {
        let path = format!("geists/{}.ron", name);
        let doc = GrammarGeistFile::load(Path::new(&path))
            .unwrap()
            .document()
            .unwrap();
        let mut rng = StdRng::seed_from_u64(20240315);
        let text = e.expand_origin(&doc, &mut rng).unwrap();
        assert!(text.contains("[["), "{} produced no note link: {}", name, text);
        assert!(!text.contains('#'), "{} left a symbol unexpanded: {}", name, text);
    }
}

#[test]
fn fixture_expands_exactly() {
    let doc = GrammarGeistFile::load(Path::new("tests/fixtures/meeting.ron"))
        .unwrap()
        .document()
        .unwrap();
    for _ in 0..3 {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(engine(10).expand_origin(&doc, &mut rng).unwrap(), "alpha meets beta");
    }
}

#[test]
fn dangling_fixture_names_the_symbol() {
    let err = GrammarGeistFile::load(Path::new("tests/fixtures/dangling.ron"))
        .unwrap()
        .document()
        .unwrap_err();
    match err {
        GrammarError::UndefinedSymbol { symbol, reference } => {
            assert_eq!(symbol, "origin");
            assert_eq!(reference, "nowhere");
        }
        other => panic!("expected UndefinedSymbol, got {:?}", other),
    }
}

#[test]
fn determinism_across_many_seeds() {
    let doc = GrammarDocument::parse_ron(
        r##"{
            "origin": ["#verb.capitalize# $vault.random_note() with #other#."],
            "verb": ["compare", "contrast", "merge", "split"],
            "other": ["$vault.hub()", "$vault.sample_notes(2)"],
        }"##,
    )
    .unwrap();
    let e = engine(10);
    for seed in 0..25 {
        let a = e.expand_origin(&doc, &mut StdRng::seed_from_u64(seed)).unwrap();
        let b = e.expand_origin(&doc, &mut StdRng::seed_from_u64(seed)).unwrap();
        assert_eq!(a, b, "seed {} diverged", seed);
    }
}

#[test]
fn mutual_recursion_stops_at_configured_depth() {
    let doc = GrammarDocument::parse_ron(
        r##"{ "origin": ["#ping#"], "ping": ["#pong#"], "pong": ["#ping#"] }"##,
    )
    .unwrap();
    for max_depth in [1, 4, 10] {
        let err = engine(max_depth)
            .expand_origin(&doc, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        match err {
            ExpansionError::RecursionLimitExceeded { depth, .. } => assert_eq!(depth, max_depth),
            other => panic!("expected recursion limit, got {:?}", other),
        }
    }
}

#[test]
fn recursion_with_base_case_terminates() {
    let doc = GrammarDocument::parse_ron(
        r##"{ "origin": ["#list#"], "list": ["item", "item, #list#"] }"##,
    )
    .unwrap();
    let e = engine(10);
    for seed in 0..20 {
        match e.expand_origin(&doc, &mut StdRng::seed_from_u64(seed)) {
            Ok(text) => assert!(text.starts_with("item")),
            Err(ExpansionError::RecursionLimitExceeded { .. }) => {}
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
}

#[test]
fn json_fixture_registers_with_its_count() {
    let mut registry = GeistRegistry::new();
    registry
        .load_grammar_file(Path::new("tests/fixtures/sampler.json"), 1)
        .unwrap();
    let id = GeistId::new("sampler");
    assert!(registry.descriptor(&id).unwrap().enabled);
    match registry.source(&id).unwrap() {
        geist_engine::core::registry::GeistSource::Grammar { count, .. } => assert_eq!(*count, 5),
        other => panic!("expected grammar source, got {:?}", other),
    }
}

#[test]
fn closed_and_bare_call_markers_expand_alike() {
    let closed = GrammarDocument::parse_json(
        r##"{"origin": ["Revisit $vault.random_note()# and #verb# $vault.hub()#."], "verb": ["compare", "merge"]}"##,
    )
    .unwrap();
    let bare = GrammarDocument::parse_json(
        r##"{"origin": ["Revisit $vault.random_note() and #verb# $vault.hub()."], "verb": ["compare", "merge"]}"##,
    )
    .unwrap();
    let e = engine(10);
    for seed in 0..10 {
        let a = e.expand_origin(&closed, &mut StdRng::seed_from_u64(seed)).unwrap();
        let b = e.expand_origin(&bare, &mut StdRng::seed_from_u64(seed)).unwrap();
        assert_eq!(a, b);
        assert!(!a.contains('#'), "marker leaked into output: {}", a);
    }
}
