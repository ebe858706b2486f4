/// Preview — interactive expansion shell for testing grammar geists.
///
/// Usage: preview <geist_file> [--notes <dir>] [--seed <n>]
///
/// Commands:
///   expand [n]        — expand origin n times (default 1) from the current stream
///   symbol <name>     — expand one symbol on its own
///   seed <n>          — restart the random stream from seed n
///   session           — run the geist as the scheduler would, with its count
///   symbols           — list symbols
///   help              — list commands
///   quit              — exit

use geist_engine::core::assembler::SuggestionAssembler;
use geist_engine::core::expansion::ExpansionEngine;
use geist_engine::core::functions::{FunctionBridge, FunctionRegistry};
use geist_engine::core::grammar::{GrammarDocument, GrammarGeistFile};
use geist_engine::schema::geist::GeistId;
use geist_engine::{EngineConfig, GeistEngine, MemoryVault, SessionSeed, VaultQuery};
use rand::rngs::StdRng;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let geist_path = PathBuf::from(&args[1]);
    let mut notes_dir = None;
    let mut seed: u64 = SessionSeed::today().value();

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--notes" if i + 1 < args.len() => {
                i += 1;
                notes_dir = Some(PathBuf::from(&args[i]));
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(seed);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let file = match GrammarGeistFile::load(&geist_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };
    let doc = match file.document() {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("ERROR: grammar failed validation: {}", e);
            std::process::exit(1);
        }
    };
    let id = GeistId::new(file.id.clone().unwrap_or_else(|| stem(&geist_path)));
    let count = file.count.unwrap_or(1);

    let vault = match notes_dir {
        Some(ref dir) => match MemoryVault::from_markdown_dir(dir) {
            Ok(vault) => vault,
            Err(e) => {
                eprintln!("ERROR: cannot read notes from {}: {}", dir.display(), e);
                std::process::exit(1);
            }
        },
        None => MemoryVault::default(),
    };

    println!("Geist: {} ({} symbols, count {})", id, doc.len(), count);
    if let Some(ref description) = file.description {
        println!("  {}", description);
    }
    println!("Notes: {}", vault.note_count());
    println!("Seed: {}", seed);
    println!("Type 'help' for commands.\n");

    let config = EngineConfig::default();
    let bridge = FunctionBridge::new(
        Arc::new(FunctionRegistry::with_builtins()),
        Arc::new(vault.clone()),
        config.cluster_delimiter.clone(),
    );
    let engine = ExpansionEngine::new(bridge, config.max_depth);
    let mut rng = SessionSeed(seed).rng_for(&id);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_commands(),
            "expand" | "e" => {
                let n = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(1);
                expand(&engine, &doc, &id, n, &mut rng);
            }
            "symbol" => match parts.get(1) {
                Some(name) if doc.contains(name) => match engine.expand_symbol(&doc, name, &mut rng) {
                    Ok(text) => println!("{}", text),
                    Err(e) => println!("ERROR: {}", e),
                },
                Some(name) => println!("No symbol '{}'", name),
                None => println!("Usage: symbol <name>"),
            },
            "seed" => match parts.get(1).and_then(|s| s.parse::<u64>().ok()) {
                Some(n) => {
                    seed = n;
                    rng = SessionSeed(seed).rng_for(&id);
                    println!("Seed: {}", seed);
                }
                None => println!("Usage: seed <n>"),
            },
            "session" => run_session(&id, &doc, count, &vault, seed),
            "symbols" => {
                for name in doc.symbol_names() {
                    let n = doc.alternatives(name).map(|a| a.len()).unwrap_or(0);
                    println!("  {} ({} alternatives)", name, n);
                }
            }
            _ => println!("Unknown command '{}'. Type 'help'.", cmd),
        }
    }
}

fn expand(engine: &ExpansionEngine, doc: &GrammarDocument, id: &GeistId, n: usize, rng: &mut StdRng) {
    match engine.expand_many(doc, n, rng) {
        Ok(texts) => {
            for suggestion in SuggestionAssembler::from_expansions(id, texts) {
                println!("- {}", suggestion.text);
                if !suggestion.referenced_notes.is_empty() {
                    println!("    notes: {}", suggestion.referenced_notes.join(", "));
                }
            }
        }
        Err(e) => println!("ERROR [{}]: {}", e.kind().label(), e),
    }
}

fn run_session(id: &GeistId, doc: &GrammarDocument, count: usize, vault: &MemoryVault, seed: u64) {
    let built = GeistEngine::builder()
        .seed(seed)
        .with_vault(vault.clone())
        .with_grammar(id.clone(), doc.clone(), Some(count))
        .build();
    let mut engine = match built {
        Ok(engine) => engine,
        Err(e) => {
            println!("ERROR: {}", e);
            return;
        }
    };
    match engine.run_session() {
        Ok(report) => {
            for record in &report.records {
                println!(
                    "{} → {:?} in {:?}",
                    record.geist_id,
                    record.outcome.state(),
                    record.duration
                );
                if let Some(message) = record.outcome.failure_message() {
                    println!("    {}", message);
                }
            }
            for suggestion in &report.suggestions {
                println!("- {}", suggestion.text);
            }
        }
        Err(e) => println!("ERROR: {}", e),
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("preview")
        .to_string()
}

fn print_usage() {
    println!("Usage: preview <geist_file> [--notes <dir>] [--seed <n>]");
}

fn print_commands() {
    println!("Commands:");
    println!("  expand [n]     — expand origin n times");
    println!("  symbol <name>  — expand one symbol");
    println!("  seed <n>       — restart the random stream from seed n");
    println!("  session        — run the geist as the scheduler would");
    println!("  symbols        — list symbols");
    println!("  help           — this list");
    println!("  quit           — exit");
}
