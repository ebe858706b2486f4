//! Grammar documents — template parsing, loading, and validation.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::core::functions::{scan_call, FunctionCall};
use crate::core::modifiers::Modifier;

/// The symbol every expansion starts from.
pub const ORIGIN: &str = "origin";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("unclosed '{0}'")]
    Unclosed(char),
    #[error("empty symbol reference")]
    EmptyReference,
    #[error("invalid symbol name '{0}'")]
    InvalidName(String),
    #[error("unknown modifier '{0}'")]
    UnknownModifier(String),
    #[error("malformed function call: {0}")]
    FunctionCall(String),
}

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("symbol '{symbol}': {source}")]
    Template {
        symbol: String,
        #[source]
        source: TemplateError,
    },
    #[error("grammar has no 'origin' symbol")]
    MissingOrigin,
    #[error("symbol '{0}' has no alternatives")]
    EmptySymbol(String),
    #[error("symbol '{symbol}' references undefined symbol '{reference}'")]
    UndefinedSymbol { symbol: String, reference: String },
    #[error("unsupported grammar file extension: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GrammarError {
    /// The symbol the error was found in, when there is one.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Template { symbol, .. }
            | Self::UndefinedSymbol { symbol, .. }
            | Self::EmptySymbol(symbol) => Some(symbol.as_str()),
            Self::MissingOrigin => Some(ORIGIN),
            _ => None,
        }
    }
}

/// One step after the symbol name in `#name.step.step#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierStep {
    /// `#name.1#` keeps one part of a cluster.
    Part(usize),
    Apply(Modifier),
}

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateSegment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// `#name.mod1.mod2#`
    SymbolRef {
        name: String,
        modifiers: Vec<ModifierStep>,
    },
    /// `$namespace.function(args)`
    FunctionCall(FunctionCall),
    /// `[name:template]` expands `template` once and binds the result to `name`.
    Action { name: String, template: Template },
}

/// A parsed template: a sequence of segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub segments: Vec<TemplateSegment>,
}

fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn is_symbol_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_symbol_char)
}

impl Template {
    /// Parse a template string into a sequence of segments.
    ///
    /// Syntax:
    /// - `#name#`, `#name.s.capitalize#` → `SymbolRef`
    /// - `$ns.fn(1, "two")` or `$ns.fn(1, "two")#` → `FunctionCall`
    /// - `[name:template]` → `Action`
    /// - `\#`, `\$`, `\[`, `\\` → the escaped character
    /// - Everything else, including `[[links]]` and a bare `$`, → `Literal`
    pub fn parse(input: &str) -> Result<Template, TemplateError> {
        let chars: Vec<char> = input.chars().collect();
        Self::parse_chars(&chars)
    }

    fn parse_chars(chars: &[char]) -> Result<Template, TemplateError> {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            match chars[i] {
                '\\' if i + 1 < len => {
                    literal_buf.push(chars[i + 1]);
                    i += 2;
                }
                '#' => {
                    let end = (i + 1..len)
                        .find(|&j| chars[j] == '#')
                        .ok_or(TemplateError::Unclosed('#'))?;
                    let content: String = chars[i + 1..end].iter().collect();
                    flush(&mut literal_buf, &mut segments);
                    segments.push(Self::parse_symbol_ref(&content)?);
                    i = end + 1;
                }
                '$' => match scan_call(chars, i).map_err(TemplateError::FunctionCall)? {
                    Some((call, end)) => {
                        flush(&mut literal_buf, &mut segments);
                        segments.push(TemplateSegment::FunctionCall(call));
                        // The closing `#` of `$ns.fn(args)#` is optional.
                        i = if chars.get(end) == Some(&'#') { end + 1 } else { end };
                    }
                    None => {
                        literal_buf.push('$');
                        i += 1;
                    }
                },
                '[' => match Self::scan_action(chars, i)? {
                    Some((segment, end)) => {
                        flush(&mut literal_buf, &mut segments);
                        segments.push(segment);
                        i = end;
                    }
                    None => {
                        literal_buf.push('[');
                        i += 1;
                    }
                },
                c => {
                    literal_buf.push(c);
                    i += 1;
                }
            }
        }

        flush(&mut literal_buf, &mut segments);
        Ok(Template { segments })
    }

    fn parse_symbol_ref(content: &str) -> Result<TemplateSegment, TemplateError> {
        if content.is_empty() {
            return Err(TemplateError::EmptyReference);
        }
        let mut parts = content.split('.');
        let name = parts.next().unwrap_or_default();
        if !is_symbol_name(name) {
            return Err(TemplateError::InvalidName(name.to_string()));
        }

        let mut modifiers = Vec::new();
        for part in parts {
            let step = if !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()) {
                part.parse::<usize>()
                    .map(ModifierStep::Part)
                    .map_err(|_| TemplateError::UnknownModifier(part.to_string()))?
            } else {
                Modifier::from_name(part)
                    .map(ModifierStep::Apply)
                    .ok_or_else(|| TemplateError::UnknownModifier(part.to_string()))?
            };
            modifiers.push(step);
        }

        Ok(TemplateSegment::SymbolRef {
            name: name.to_string(),
            modifiers,
        })
    }

    /// `[name:template]`. Anything else starting with `[` is literal text.
    fn scan_action(
        chars: &[char],
        start: usize,
    ) -> Result<Option<(TemplateSegment, usize)>, TemplateError> {
        let mut i = start + 1;
        while i < chars.len() && is_symbol_char(chars[i]) {
            i += 1;
        }
        if i == start + 1 || chars.get(i) != Some(&':') {
            return Ok(None);
        }
        let name: String = chars[start + 1..i].iter().collect();
        let body_start = i + 1;

        let mut depth = 1;
        let mut j = body_start;
        while j < chars.len() {
            match chars[j] {
                '\\' => j += 1,
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            j += 1;
        }
        if depth != 0 {
            return Err(TemplateError::Unclosed('['));
        }

        let template = Self::parse_chars(&chars[body_start..j])?;
        Ok(Some((TemplateSegment::Action { name, template }, j + 1)))
    }

    /// Every symbol name this template reads, including inside actions.
    pub fn symbol_refs(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.visit(&mut |segment| {
            if let TemplateSegment::SymbolRef { name, .. } = segment {
                out.push(name.as_str());
            }
        });
        out
    }

    /// Every name this template binds with an action.
    pub fn action_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.visit(&mut |segment| {
            if let TemplateSegment::Action { name, .. } = segment {
                out.push(name.as_str());
            }
        });
        out
    }

    /// Every function call in this template, including inside actions.
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        let mut out = Vec::new();
        self.visit(&mut |segment| {
            if let TemplateSegment::FunctionCall(call) = segment {
                out.push(call);
            }
        });
        out
    }

    fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a TemplateSegment)) {
        for segment in &self.segments {
            f(segment);
            if let TemplateSegment::Action { template, .. } = segment {
                template.visit(f);
            }
        }
    }
}

fn flush(literal_buf: &mut String, segments: &mut Vec<TemplateSegment>) {
    if !literal_buf.is_empty() {
        segments.push(TemplateSegment::Literal(std::mem::take(literal_buf)));
    }
}

/// One alternative of a symbol: the raw text and its parsed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub raw: String,
    pub template: Template,
}

/// A validated symbol table for one grammar geist.
///
/// Contains `origin`, every referenced symbol resolves, and no symbol has an
/// empty alternative list. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrammarDocument {
    symbols: BTreeMap<String, Vec<Alternative>>,
}

impl GrammarDocument {
    /// Parse and validate a raw symbol table. Errors name the first offending
    /// symbol in name order.
    pub fn from_symbols(raw: BTreeMap<String, Vec<String>>) -> Result<GrammarDocument, GrammarError> {
        let mut symbols = BTreeMap::new();
        for (name, texts) in raw {
            if !is_symbol_name(&name) {
                return Err(GrammarError::Template {
                    source: TemplateError::InvalidName(name.clone()),
                    symbol: name,
                });
            }
            if texts.is_empty() {
                return Err(GrammarError::EmptySymbol(name));
            }
            let mut alternatives = Vec::with_capacity(texts.len());
            for text in texts {
                let template = Template::parse(&text).map_err(|source| GrammarError::Template {
                    symbol: name.clone(),
                    source,
                })?;
                alternatives.push(Alternative {
                    raw: text,
                    template,
                });
            }
            symbols.insert(name, alternatives);
        }

        let document = GrammarDocument { symbols };
        document.validate()?;
        Ok(document)
    }

    /// Closure check: `origin` exists and every reference is either a symbol
    /// or a name some action binds.
    fn validate(&self) -> Result<(), GrammarError> {
        if !self.symbols.contains_key(ORIGIN) {
            return Err(GrammarError::MissingOrigin);
        }

        let mut defined: FxHashSet<&str> = self.symbols.keys().map(String::as_str).collect();
        for alternatives in self.symbols.values() {
            for alt in alternatives {
                defined.extend(alt.template.action_names());
            }
        }

        for (name, alternatives) in &self.symbols {
            for alt in alternatives {
                if let Some(missing) = alt
                    .template
                    .symbol_refs()
                    .into_iter()
                    .find(|r| !defined.contains(r))
                {
                    return Err(GrammarError::UndefinedSymbol {
                        symbol: name.clone(),
                        reference: missing.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Parse a bare symbol map from RON: `{ "origin": ["..."], ... }`.
    pub fn parse_ron(input: &str) -> Result<GrammarDocument, GrammarError> {
        let raw: BTreeMap<String, Vec<String>> = ron::from_str(input)?;
        Self::from_symbols(raw)
    }

    /// Parse a bare symbol map from JSON, the usual Tracery shape.
    pub fn parse_json(input: &str) -> Result<GrammarDocument, GrammarError> {
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(input)?;
        Self::from_symbols(raw)
    }

    pub fn alternatives(&self, symbol: &str) -> Option<&[Alternative]> {
        self.symbols.get(symbol).map(Vec::as_slice)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    /// Symbol names in sorted order.
    pub fn symbol_names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Every function call the grammar can make, with the symbol it sits in.
    pub fn function_calls(&self) -> Vec<(&str, &FunctionCall)> {
        let mut out = Vec::new();
        for (name, alternatives) in &self.symbols {
            for alt in alternatives {
                for call in alt.template.function_calls() {
                    out.push((name.as_str(), call));
                }
            }
        }
        out
    }
}

/// A grammar geist as written on disk.
///
/// ```ron
/// (
///     id: Some("what_if"),
///     description: Some("Counterfactual prompts"),
///     count: Some(2),
///     tracery: {
///         "origin": ["What if #subject# were #state#?"],
///         "subject": ["$vault.random_note()"],
///         "state": ["reversed", "twice as old"],
///     },
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarGeistFile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Suggestions to produce per session.
    #[serde(default)]
    pub count: Option<usize>,
    pub tracery: BTreeMap<String, Vec<String>>,
}

impl GrammarGeistFile {
    /// Load a grammar geist file, picking RON or JSON by extension.
    pub fn load(path: &Path) -> Result<GrammarGeistFile, GrammarError> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|s| s.to_str()) {
            Some("ron") => Self::parse_ron(&contents),
            Some("json") => Self::parse_json(&contents),
            other => Err(GrammarError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    pub fn parse_ron(input: &str) -> Result<GrammarGeistFile, GrammarError> {
        Ok(ron::from_str(input)?)
    }

    pub fn parse_json(input: &str) -> Result<GrammarGeistFile, GrammarError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Validate the symbol table into a document.
    pub fn document(&self) -> Result<GrammarDocument, GrammarError> {
        GrammarDocument::from_symbols(self.tracery.clone())
    }
}
