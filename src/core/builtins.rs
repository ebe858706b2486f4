//! Built-in `vault.*` functions available to every grammar geist.
//!
//! Note titles come back as `[[Title]]` links so the assembler can find the
//! notes a suggestion refers to. Any randomness comes from the caller's
//! random source, never from a global one.

use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

use crate::core::functions::{Arg, CallContext, CallFailure, FunctionHandler, FunctionValue};

/// Candidates considered by `hub`, `recent_note` and `old_note`.
const POOL_SIZE: usize = 5;
/// Neighbours considered by `neighbour` and `similar_pair`.
const NEIGHBOUR_POOL: usize = 3;

type BuiltinFn = fn(&mut CallContext<'_>, &[Arg]) -> Result<FunctionValue, CallFailure>;

const BUILTINS: &[(&str, BuiltinFn)] = &[
    ("vault.random_note", random_note),
    ("vault.sample_notes", sample_notes),
    ("vault.orphan", orphan),
    ("vault.hub", hub),
    ("vault.recent_note", recent_note),
    ("vault.old_note", old_note),
    ("vault.tagged_note", tagged_note),
    ("vault.neighbour", neighbour),
    ("vault.linked_pair", linked_pair),
    ("vault.similar_pair", similar_pair),
    ("vault.note_count", note_count),
];

/// The built-in functions, in registration order.
pub fn entries() -> Vec<(String, FunctionHandler)> {
    BUILTINS
        .iter()
        .map(|(name, f)| {
            let handler: FunctionHandler = Arc::new(*f);
            (name.to_string(), handler)
        })
        .collect()
}

/// Wrap a title as a wikilink.
pub fn wikilink(title: &str) -> String {
    format!("[[{}]]", title)
}

/// Strip `[[...]]` from an argument, if present.
pub fn strip_wikilink(text: &str) -> &str {
    text.trim()
        .strip_prefix("[[")
        .and_then(|t| t.strip_suffix("]]"))
        .unwrap_or_else(|| text.trim())
}

fn pick(ctx: &mut CallContext<'_>, pool: &[String], what: &str) -> Result<String, CallFailure> {
    pool.choose(&mut *ctx.rng)
        .map(|t| wikilink(t))
        .ok_or_else(|| CallFailure::new(format!("vault has no {}", what)))
}

fn count_arg(args: &[Arg], default: usize) -> Result<usize, CallFailure> {
    match args.first() {
        None => Ok(default),
        Some(arg) => arg
            .as_usize()
            .ok_or_else(|| CallFailure::new(format!("expected a count, got {}", arg))),
    }
}

fn title_arg<'a>(args: &'a [Arg]) -> Result<&'a str, CallFailure> {
    args.first()
        .and_then(Arg::as_str)
        .map(strip_wikilink)
        .ok_or_else(|| CallFailure::new("expected a note title argument"))
}

fn random_note(ctx: &mut CallContext<'_>, _args: &[Arg]) -> Result<FunctionValue, CallFailure> {
    let titles = ctx.vault.titles();
    pick(ctx, &titles, "notes").map(FunctionValue::Scalar)
}

fn sample_notes(ctx: &mut CallContext<'_>, args: &[Arg]) -> Result<FunctionValue, CallFailure> {
    let k = count_arg(args, 1)?;
    let titles = ctx.vault.titles();
    if titles.is_empty() {
        return Err(CallFailure::new("vault has no notes"));
    }
    let sampled: Vec<String> = titles
        .choose_multiple(&mut *ctx.rng, k.min(titles.len()))
        .map(|t| wikilink(t))
        .collect();
    Ok(FunctionValue::Cluster(sampled))
}

fn orphan(ctx: &mut CallContext<'_>, _args: &[Arg]) -> Result<FunctionValue, CallFailure> {
    let orphans = ctx.vault.orphans();
    pick(ctx, &orphans, "orphans").map(FunctionValue::Scalar)
}

fn hub(ctx: &mut CallContext<'_>, _args: &[Arg]) -> Result<FunctionValue, CallFailure> {
    let hubs = ctx.vault.hubs(POOL_SIZE);
    pick(ctx, &hubs, "linked-to notes").map(FunctionValue::Scalar)
}

fn recent_note(ctx: &mut CallContext<'_>, _args: &[Arg]) -> Result<FunctionValue, CallFailure> {
    let recent = ctx.vault.recent(POOL_SIZE);
    pick(ctx, &recent, "notes").map(FunctionValue::Scalar)
}

fn old_note(ctx: &mut CallContext<'_>, _args: &[Arg]) -> Result<FunctionValue, CallFailure> {
    let oldest = ctx.vault.oldest(POOL_SIZE);
    pick(ctx, &oldest, "notes").map(FunctionValue::Scalar)
}

fn tagged_note(ctx: &mut CallContext<'_>, args: &[Arg]) -> Result<FunctionValue, CallFailure> {
    let tag = args
        .first()
        .and_then(Arg::as_str)
        .ok_or_else(|| CallFailure::new("expected a tag argument"))?;
    let tagged = ctx.vault.tagged(tag.trim_start_matches('#'));
    pick(ctx, &tagged, &format!("notes tagged '{}'", tag)).map(FunctionValue::Scalar)
}

fn neighbour(ctx: &mut CallContext<'_>, args: &[Arg]) -> Result<FunctionValue, CallFailure> {
    let title = title_arg(args)?;
    if ctx.vault.note(title).is_none() {
        return Err(CallFailure::new(format!("no note titled '{}'", title)));
    }
    let neighbours = ctx.vault.neighbours(title, NEIGHBOUR_POOL);
    pick(ctx, &neighbours, &format!("notes similar to '{}'", title)).map(FunctionValue::Scalar)
}

fn linked_pair(ctx: &mut CallContext<'_>, _args: &[Arg]) -> Result<FunctionValue, CallFailure> {
    let edges: Vec<(String, String)> = ctx
        .vault
        .titles()
        .into_iter()
        .flat_map(|source| {
            ctx.vault
                .outgoing_links(&source)
                .into_iter()
                .map(move |target| (source.clone(), target))
        })
        .collect();
    let (source, target) = edges
        .choose(&mut *ctx.rng)
        .ok_or_else(|| CallFailure::new("vault has no links"))?;
    Ok(FunctionValue::Cluster(vec![wikilink(source), wikilink(target)]))
}

/// A note and one of its closest neighbours that it does not already link to.
fn similar_pair(ctx: &mut CallContext<'_>, _args: &[Arg]) -> Result<FunctionValue, CallFailure> {
    let mut titles = ctx.vault.titles();
    titles.shuffle(&mut *ctx.rng);
    for title in titles {
        let linked = ctx.vault.outgoing_links(&title);
        let candidates: Vec<String> = ctx
            .vault
            .neighbours(&title, NEIGHBOUR_POOL)
            .into_iter()
            .filter(|n| !linked.contains(n))
            .collect();
        if candidates.is_empty() {
            continue;
        }
        let partner = &candidates[ctx.rng.gen_range(0..candidates.len())];
        return Ok(FunctionValue::Cluster(vec![wikilink(&title), wikilink(partner)]));
    }
    Err(CallFailure::new("vault has no similar unlinked notes"))
}

fn note_count(ctx: &mut CallContext<'_>, _args: &[Arg]) -> Result<FunctionValue, CallFailure> {
    Ok(FunctionValue::Scalar(ctx.vault.note_count().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::functions::FunctionRegistry;
    use crate::core::vault::MemoryVault;
    use crate::schema::note::Note;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn vault() -> MemoryVault {
        let mut a = Note::new("Alpha", "rivers carry stones downstream");
        a.links = vec!["Beta".to_string()];
        let b = Note::new("Beta", "stones shaped by rivers");
        let c = Note::new("Gamma", "rivers and stones and time");
        let d = Note::new("Delta", "unrelated jazz chords");
        MemoryVault::new(vec![a, b, c, d])
    }

    fn call(name: &str, args: &[Arg], seed: u64) -> Result<FunctionValue, crate::core::functions::FunctionError> {
        let registry = FunctionRegistry::with_builtins();
        let vault = vault();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ctx = CallContext {
            vault: &vault,
            rng: &mut rng,
        };
        registry.resolve(name, args, &mut ctx)
    }

    #[test]
    fn all_builtins_are_registered() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(registry.names().len(), entries().len());
        assert!(registry.contains("vault.sample_notes"));
        assert!(registry.contains("vault.linked_pair"));
    }

    #[test]
    fn random_note_is_a_wikilink() {
        match call("vault.random_note", &[], 7).unwrap() {
            FunctionValue::Scalar(s) => {
                assert!(s.starts_with("[[") && s.ends_with("]]"));
            }
            other => panic!("expected scalar, got {:?}", other),
        }
    }

    #[test]
    fn sample_notes_is_deterministic_and_distinct() {
        let a = call("vault.sample_notes", &[Arg::Int(3)], 11).unwrap();
        let b = call("vault.sample_notes", &[Arg::Int(3)], 11).unwrap();
        assert_eq!(a, b);
        match a {
            FunctionValue::Cluster(parts) => {
                assert_eq!(parts.len(), 3);
                let mut unique = parts.clone();
                unique.sort();
                unique.dedup();
                assert_eq!(unique.len(), 3);
            }
            other => panic!("expected cluster, got {:?}", other),
        }
    }

    #[test]
    fn sample_notes_clamps_to_vault_size() {
        match call("vault.sample_notes", &[Arg::Int(50)], 1).unwrap() {
            FunctionValue::Cluster(parts) => assert_eq!(parts.len(), 4),
            other => panic!("expected cluster, got {:?}", other),
        }
    }

    #[test]
    fn sample_notes_rejects_bad_count() {
        assert!(call("vault.sample_notes", &[Arg::Str("many".into())], 1).is_err());
    }

    #[test]
    fn linked_pair_follows_links() {
        assert_eq!(
            call("vault.linked_pair", &[], 3).unwrap(),
            FunctionValue::Cluster(vec!["[[Alpha]]".into(), "[[Beta]]".into()])
        );
    }

    #[test]
    fn similar_pair_skips_existing_links() {
        for seed in 0..10 {
            if let FunctionValue::Cluster(parts) = call("vault.similar_pair", &[], seed).unwrap() {
                assert_eq!(parts.len(), 2);
                assert_ne!(parts, vec!["[[Alpha]]".to_string(), "[[Beta]]".to_string()]);
            }
        }
    }

    #[test]
    fn neighbour_requires_existing_note() {
        assert!(call("vault.neighbour", &[Arg::Str("[[Nowhere]]".into())], 1).is_err());
        let found = call("vault.neighbour", &[Arg::Str("[[Alpha]]".into())], 1).unwrap();
        assert!(matches!(found, FunctionValue::Scalar(s) if s != "[[Alpha]]" && s != "[[Delta]]"));
    }

    #[test]
    fn orphan_picks_unlinked_note() {
        let value = call("vault.orphan", &[], 5).unwrap();
        assert!(matches!(value, FunctionValue::Scalar(s) if s == "[[Gamma]]" || s == "[[Delta]]"));
    }

    #[test]
    fn strip_wikilink_variants() {
        assert_eq!(strip_wikilink("[[Alpha]]"), "Alpha");
        assert_eq!(strip_wikilink(" Alpha "), "Alpha");
    }
}
