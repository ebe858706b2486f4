/// Tiny Vault demo — one session over a handful of notes.
///
/// Loads the bundled grammar geists, adds a code geist that pairs orphans
/// with hubs, and runs two sessions: one for a fixed date and one replayed
/// with the same seed to show the output repeats exactly.
///
/// Run with: cargo run --example tiny_vault

use chrono::NaiveDate;
use geist_engine::core::functions::Arg;
use geist_engine::schema::note::Note;
use geist_engine::schema::suggestion::SuggestionDraft;
use geist_engine::{GeistContext, GeistEngine, GeistFailure, MemoryVault, SessionReport};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn note(title: &str, content: &str, links: &[&str], tags: &[&str]) -> Note {
    let mut note = Note::new(title, content);
    note.links = links.iter().map(|l| l.to_string()).collect();
    note.tags = tags.iter().map(|t| t.to_string()).collect();
    note
}

fn vault() -> MemoryVault {
    MemoryVault::new(vec![
        note(
            "Gardening",
            "Soil health matters more than fertiliser. Compost feeds the soil.",
            &["Compost", "Bees"],
            &["garden"],
        ),
        note(
            "Compost",
            "Kitchen scraps and leaves become soil over a season.",
            &[],
            &["garden"],
        ),
        note("Bees", "Bees need flowers across the whole season.", &["Gardening"], &[]),
        note(
            "Habits",
            "Small daily habits compound over a season, like compost.",
            &[],
            &["idea"],
        ),
        note("Jazz", "Improvisation works inside a shared structure.", &[], &["idea"]),
        note(
            "Writing",
            "Daily writing habits build structure for improvisation.",
            &["Habits"],
            &[],
        ),
    ])
}

fn orphan_meets_hub(ctx: &mut GeistContext<'_>) -> Result<Vec<SuggestionDraft>, GeistFailure> {
    let orphan = ctx.call("vault.orphan", &[])?;
    let hub = ctx.call("vault.hub", &[])?;
    let tagged = ctx.call("vault.tagged_note", &[Arg::Str("idea".into())])?;
    Ok(vec![
        SuggestionDraft::new(format!(
            "{} sits alone while {} gathers links. What would connect them?",
            orphan, hub
        ))
        .with_title("Orphan meets hub"),
        SuggestionDraft::new(format!("Is {} an idea you have outgrown?", tagged)),
    ])
}

fn print_report(report: &SessionReport) {
    println!("--- session seed {} ---", report.seed);
    for record in &report.records {
        println!(
            "  [{}] {:?} in {:?}",
            record.geist_id,
            record.outcome.state(),
            record.duration
        );
    }
    for suggestion in &report.suggestions {
        match suggestion.title {
            Some(ref title) => println!("* {} ({}): {}", suggestion.geist_id, title, suggestion.text),
            None => println!("* {}: {}", suggestion.geist_id, suggestion.text),
        }
    }
    println!();
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let date = NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date");
    let mut engine = GeistEngine::builder()
        .date(date)
        .grammars_dir("geists")
        .with_vault(vault())
        .with_code_geist("orphan_meets_hub", orphan_meets_hub)
        .build()
        .expect("Failed to build engine");

    let first = engine.run_session().expect("session failed");
    print_report(&first);

    let replay = engine.run_session().expect("session failed");
    assert_eq!(first.suggestions, replay.suggestions);
    println!("Replay with seed {} produced identical suggestions.", replay.seed);
}
