//! Modifier pipeline — pure text transforms applied to symbol expansions.
//!
//! `#noun.s.capitalize#` pluralizes, then capitalizes. Each modifier is a
//! plain `&str -> String` function; chaining is left-to-right composition.

use serde::{Deserialize, Serialize};

/// A linguistic transform that can follow a symbol name in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modifier {
    /// `capitalize`: uppercase the first character only.
    Capitalize,
    /// `capitalizeAll`: uppercase the first character of every word.
    CapitalizeAll,
    /// `s`: pluralize the last word.
    Pluralize,
    /// `ed`: past tense of the first word.
    PastTense,
    /// `a`: prefix the indefinite article.
    Article,
}

impl Modifier {
    /// Look up a modifier by its template name.
    pub fn from_name(name: &str) -> Option<Modifier> {
        match name {
            "capitalize" => Some(Self::Capitalize),
            "capitalizeAll" => Some(Self::CapitalizeAll),
            "s" => Some(Self::Pluralize),
            "ed" => Some(Self::PastTense),
            "a" => Some(Self::Article),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Capitalize => "capitalize",
            Self::CapitalizeAll => "capitalizeAll",
            Self::Pluralize => "s",
            Self::PastTense => "ed",
            Self::Article => "a",
        }
    }

    pub fn apply(&self, input: &str) -> String {
        match self {
            Self::Capitalize => capitalize(input),
            Self::CapitalizeAll => capitalize_all(input),
            Self::Pluralize => map_last_word(input, pluralize),
            Self::PastTense => map_first_word(input, past_tense),
            Self::Article => article(input),
        }
    }
}

/// Apply a chain of modifiers left to right.
pub fn apply_chain(input: &str, modifiers: &[Modifier]) -> String {
    modifiers
        .iter()
        .fold(input.to_string(), |text, m| m.apply(&text))
}

pub fn capitalize(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn capitalize_all(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut at_word_start = true;
    for c in input.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.push(c);
        }
    }
    out
}

const IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("child", "children"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("tooth", "teeth"),
    ("foot", "feet"),
    ("ox", "oxen"),
    ("datum", "data"),
    ("criterion", "criteria"),
    ("phenomenon", "phenomena"),
    ("analysis", "analyses"),
    ("thesis", "theses"),
    ("leaf", "leaves"),
    ("life", "lives"),
    ("knife", "knives"),
    ("wife", "wives"),
    ("half", "halves"),
    ("self", "selves"),
];

const UNCOUNTABLE: &[&str] = &[
    "sheep", "fish", "deer", "series", "species", "information", "news",
];

/// Pluralize a single word: irregular table first, then suffix rules.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_lowercase();
    if UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR_PLURALS.iter().find(|(s, _)| *s == lower) {
        return match_case(word, plural);
    }

    if let Some(stem) = word.strip_suffix('y') {
        if ends_with_consonant(stem) {
            return format!("{}ies", stem);
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|end| lower.ends_with(end)) {
        return format!("{}es", word);
    }
    format!("{}s", word)
}

const IRREGULAR_PAST: &[(&str, &str)] = &[
    ("be", "was"),
    ("go", "went"),
    ("have", "had"),
    ("do", "did"),
    ("make", "made"),
    ("take", "took"),
    ("see", "saw"),
    ("come", "came"),
    ("get", "got"),
    ("give", "gave"),
    ("find", "found"),
    ("think", "thought"),
    ("know", "knew"),
    ("write", "wrote"),
    ("read", "read"),
    ("run", "ran"),
    ("begin", "began"),
    ("forget", "forgot"),
    ("leave", "left"),
    ("feel", "felt"),
    ("bring", "brought"),
    ("build", "built"),
    ("keep", "kept"),
    ("lose", "lost"),
    ("meet", "met"),
    ("say", "said"),
    ("tell", "told"),
    ("become", "became"),
    ("grow", "grew"),
    ("draw", "drew"),
    ("break", "broke"),
    ("speak", "spoke"),
    ("choose", "chose"),
    ("fall", "fell"),
    ("hold", "held"),
    ("stand", "stood"),
    ("understand", "understood"),
    ("buy", "bought"),
    ("teach", "taught"),
    ("catch", "caught"),
    ("sleep", "slept"),
    ("eat", "ate"),
    ("drink", "drank"),
    ("sing", "sang"),
    ("swim", "swam"),
    ("fly", "flew"),
    ("put", "put"),
    ("set", "set"),
    ("cut", "cut"),
    ("let", "let"),
];

/// Past tense of a single verb: irregular table first, then suffix rules.
pub fn past_tense(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_lowercase();
    if let Some((_, past)) = IRREGULAR_PAST.iter().find(|(v, _)| *v == lower) {
        return match_case(word, past);
    }

    if lower.ends_with('e') {
        return format!("{}d", word);
    }
    if let Some(stem) = word.strip_suffix('y') {
        if ends_with_consonant(stem) {
            return format!("{}ied", stem);
        }
    }
    if should_double_final_consonant(&lower) {
        if let Some(last) = word.chars().last() {
            return format!("{}{}ed", word, last);
        }
    }
    format!("{}ed", word)
}

/// Words whose first letter is a vowel but whose first sound is not.
const CONSONANT_SOUND_EXCEPTIONS: &[&str] = &[
    "one", "once", "uni", "use", "usu", "uti", "ure", "eu", "ewe", "ubiq",
];

/// Words whose first letter is a consonant but whose first sound is a vowel.
const VOWEL_SOUND_EXCEPTIONS: &[&str] = &["hour", "honest", "honor", "honour", "heir"];

/// Prefix `a` or `an`, deciding by approximate initial sound.
pub fn article(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    let lower = input.to_lowercase();
    let starts_with_vowel_sound = if VOWEL_SOUND_EXCEPTIONS.iter().any(|p| lower.starts_with(p)) {
        true
    } else if CONSONANT_SOUND_EXCEPTIONS.iter().any(|p| lower.starts_with(p)) {
        false
    } else {
        lower
            .chars()
            .next()
            .map(|c| "aeiou".contains(c))
            .unwrap_or(false)
    };

    if starts_with_vowel_sound {
        format!("an {}", input)
    } else {
        format!("a {}", input)
    }
}

fn is_vowel(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

fn ends_with_consonant(stem: &str) -> bool {
    stem.chars()
        .last()
        .map(|c| c.is_alphabetic() && !is_vowel(c))
        .unwrap_or(false)
}

/// Short consonant-vowel-consonant verbs double the final letter: stop →
/// stopped, plan → planned. Words with more than one vowel group do not.
fn should_double_final_consonant(lower: &str) -> bool {
    let chars: Vec<char> = lower.chars().collect();
    let n = chars.len();
    if n < 3 {
        return false;
    }
    let (a, b, c) = (chars[n - 3], chars[n - 2], chars[n - 1]);
    if is_vowel(a) || !is_vowel(b) || is_vowel(c) || matches!(c, 'w' | 'x' | 'y') {
        return false;
    }
    let mut vowel_groups = 0;
    let mut in_group = false;
    for &ch in &chars {
        if is_vowel(ch) {
            if !in_group {
                vowel_groups += 1;
            }
            in_group = true;
        } else {
            in_group = false;
        }
    }
    vowel_groups == 1
}

/// Carry the capitalization of `original` onto `replacement`.
fn match_case(original: &str, replacement: &str) -> String {
    let is_upper = original.chars().next().map(char::is_uppercase).unwrap_or(false);
    if is_upper {
        capitalize(replacement)
    } else {
        replacement.to_string()
    }
}

fn map_last_word(input: &str, f: fn(&str) -> String) -> String {
    match input.rfind(char::is_whitespace) {
        Some(idx) => {
            let (head, tail) = input.split_at(idx + 1);
            format!("{}{}", head, f(tail))
        }
        None => f(input),
    }
}

fn map_first_word(input: &str, f: fn(&str) -> String) -> String {
    match input.find(char::is_whitespace) {
        Some(idx) => {
            let (head, tail) = input.split_at(idx);
            format!("{}{}", f(head), tail)
        }
        None => f(input),
    }
}
