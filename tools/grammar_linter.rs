/// Grammar Linter — validates grammar geist files and flags low variety.
///
/// Usage: grammar_linter <geist_file_or_dir>

use geist_engine::core::functions::FunctionRegistry;
use geist_engine::core::grammar::{GrammarDocument, GrammarGeistFile, TemplateSegment, ORIGIN};
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: grammar_linter <geist_file_or_dir>");
        process::exit(0);
    }

    let target = Path::new(&args[1]);
    let files = if target.is_file() {
        vec![target.to_path_buf()]
    } else if target.is_dir() {
        collect_geist_files(target)
    } else {
        eprintln!("ERROR: Path '{}' does not exist", target.display());
        process::exit(1);
    };

    let functions = FunctionRegistry::with_builtins();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for path in &files {
        let label = path.display().to_string();
        let file = match GrammarGeistFile::load(path) {
            Ok(file) => file,
            Err(e) => {
                errors.push(format!("{}: {}", label, e));
                continue;
            }
        };
        match file.document() {
            Ok(doc) => {
                println!("  Loaded: {} ({} symbols)", label, doc.len());
                lint_document(&label, &doc, file.count.unwrap_or(1), &functions, &mut errors, &mut warnings);
            }
            Err(e) => errors.push(format!("{}: {}", label, e)),
        }
    }

    println!("\n=== Grammar Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} files, {} errors, {} warnings",
        files.len(),
        errors.len(),
        warnings.len()
    );

    if !errors.is_empty() {
        process::exit(1);
    }
}

fn collect_geist_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_geist_files(&path));
            } else if matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("ron") | Some("json")
            ) {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

fn lint_document(
    label: &str,
    doc: &GrammarDocument,
    count: usize,
    functions: &FunctionRegistry,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    for (symbol, call) in doc.function_calls() {
        let name = call.qualified_name();
        if !functions.contains(&name) {
            errors.push(format!(
                "{}: symbol '{}' calls unknown function '{}'",
                label, symbol, name
            ));
        }
    }

    // Symbols reachable from origin.
    let mut reachable: FxHashSet<&str> = FxHashSet::default();
    let mut stack = vec![ORIGIN];
    while let Some(symbol) = stack.pop() {
        if !reachable.insert(symbol) {
            continue;
        }
        for alt in doc.alternatives(symbol).unwrap_or_default() {
            stack.extend(alt.template.symbol_refs().into_iter().filter(|r| doc.contains(r)));
        }
    }
    for symbol in doc.symbol_names() {
        if !reachable.contains(symbol) {
            warnings.push(format!("{}: symbol '{}' is never used", label, symbol));
        }
    }

    let mut random = false;
    for symbol in doc.symbol_names() {
        let alternatives = doc.alternatives(symbol).unwrap_or_default();
        let calls = alternatives.iter().any(|alt| {
            alt.template
                .segments
                .iter()
                .any(|s| matches!(s, TemplateSegment::FunctionCall(_)))
        });
        if alternatives.len() > 1 || calls {
            random = true;
        }
        if symbol != ORIGIN && alternatives.len() < 2 && !calls {
            warnings.push(format!(
                "{}: symbol '{}' has a single fixed alternative",
                label, symbol
            ));
        }
    }

    if count > 1 && !random {
        warnings.push(format!(
            "{}: count is {} but every expansion will be identical",
            label, count
        ));
    }
}
