//! Function bridge — `$namespace.function(args)` calls from grammar templates
//! into an explicit registry of host functions.
//!
//! Functions return either a scalar, substituted as-is, or a cluster of
//! related values joined with the cluster delimiter so a grammar can pick
//! the parts apart again with `#name.0#`, `#name.1#`, ...

use rand::rngs::StdRng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

use crate::core::isolation::panic_message;
use crate::core::vault::VaultQuery;

#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("undefined function: {0}")]
    UndefinedFunction(String),
    #[error("function '{name}' failed: {cause}")]
    FunctionCallError { name: String, cause: String },
    #[error("function '{0}' is registered more than once")]
    DuplicateFunction(String),
    #[error("invalid function name '{0}': expected namespace.function")]
    InvalidName(String),
}

/// Error raised by a function handler. The bridge wraps it into
/// `FunctionError::FunctionCallError` with the function's name.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CallFailure(pub String);

impl CallFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A literal argument to a function call. No nested expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Str(String),
    Int(i64),
    Float(f64),
}

impl Arg {
    fn from_token(token: &str) -> Arg {
        if let Ok(i) = token.parse::<i64>() {
            Arg::Int(i)
        } else if token.chars().all(|c| c.is_ascii_digit() || "+-.eE".contains(c)) {
            match token.parse::<f64>() {
                Ok(f) => Arg::Float(f),
                Err(_) => Arg::Str(token.to_string()),
            }
        } else {
            Arg::Str(token.to_string())
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Arg::Int(i) if *i >= 0 => Some(*i as usize),
            _ => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Str(s) => write!(f, "{:?}", s),
            Arg::Int(i) => write!(f, "{}", i),
            Arg::Float(x) => write!(f, "{}", x),
        }
    }
}

/// A parsed `$namespace.function(args)` marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub namespace: String,
    pub function: String,
    pub args: Vec<Arg>,
}

impl FunctionCall {
    /// `namespace.function`, the key the registry resolves.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.function)
    }

    /// Parse a complete call marker such as `$vault.sample_notes(3)`.
    pub fn parse(marker: &str) -> Result<FunctionCall, String> {
        let chars: Vec<char> = marker.trim().chars().collect();
        if chars.first() != Some(&'$') {
            return Err(format!("'{}' does not start with '$'", marker));
        }
        match scan_call(&chars, 0)? {
            Some((call, end)) if end == chars.len() => Ok(call),
            Some(_) => Err(format!("trailing text after call in '{}'", marker)),
            None => Err(format!("'{}' is not a function call", marker)),
        }
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{}(", self.namespace, self.function)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_str(")")
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn read_ident(chars: &[char], mut i: usize) -> (String, usize) {
    let mut ident = String::new();
    while i < chars.len() && is_ident_char(chars[i]) {
        ident.push(chars[i]);
        i += 1;
    }
    (ident, i)
}

/// Scan a call marker starting at `chars[start] == '$'`.
///
/// Returns `Ok(None)` when the text is not shaped like a call at all (so the
/// `$` is literal), `Err` when it is a call with a malformed argument list,
/// and otherwise the call plus the index just past its closing paren.
pub(crate) fn scan_call(
    chars: &[char],
    start: usize,
) -> Result<Option<(FunctionCall, usize)>, String> {
    let (namespace, i) = read_ident(chars, start + 1);
    if namespace.is_empty() || chars.get(i) != Some(&'.') {
        return Ok(None);
    }
    let (function, i) = read_ident(chars, i + 1);
    if function.is_empty() || chars.get(i) != Some(&'(') {
        return Ok(None);
    }

    let mut args = Vec::new();
    let mut i = i + 1;
    loop {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        match chars.get(i) {
            None => return Err("unclosed argument list".to_string()),
            Some(')') if args.is_empty() => {
                i += 1;
                break;
            }
            Some(&quote) if quote == '"' || quote == '\'' => {
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string argument".to_string()),
                        Some('\\') if i + 1 < chars.len() => {
                            value.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(&c) if c == quote => {
                            i += 1;
                            break;
                        }
                        Some(&c) => {
                            value.push(c);
                            i += 1;
                        }
                    }
                }
                args.push(Arg::Str(value));
            }
            Some(_) => {
                let mut token = String::new();
                while i < chars.len() && chars[i] != ',' && chars[i] != ')' {
                    token.push(chars[i]);
                    i += 1;
                }
                let token = token.trim();
                if token.is_empty() {
                    return Err("empty argument".to_string());
                }
                if token.contains(['#', '$', '(', '[']) {
                    return Err(format!("nested expressions are not allowed: '{}'", token));
                }
                args.push(Arg::from_token(token));
            }
        }

        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        match chars.get(i) {
            Some(',') => i += 1,
            Some(')') => {
                i += 1;
                break;
            }
            Some(c) => return Err(format!("unexpected '{}' in argument list", c)),
            None => return Err("unclosed argument list".to_string()),
        }
    }

    Ok(Some((
        FunctionCall {
            namespace,
            function,
            args,
        },
        i,
    )))
}

/// What a function hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunctionValue {
    Scalar(String),
    /// Related values, rendered joined by the cluster delimiter.
    Cluster(Vec<String>),
}

impl FunctionValue {
    pub fn render(&self, delimiter: &str) -> String {
        match self {
            Self::Scalar(s) => s.clone(),
            Self::Cluster(parts) => parts.join(delimiter),
        }
    }
}

/// What a handler can see while it runs: the read-only vault and the
/// calling geist's random source.
pub struct CallContext<'a> {
    pub vault: &'a dyn VaultQuery,
    pub rng: &'a mut StdRng,
}

pub type FunctionHandler =
    Arc<dyn Fn(&mut CallContext<'_>, &[Arg]) -> Result<FunctionValue, CallFailure> + Send + Sync>;

/// Named host functions, built once at startup from an ordered list of
/// `(name, handler)` pairs.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    handlers: FxHashMap<String, FunctionHandler>,
    order: Vec<String>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.order)
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the `vault.*` built-ins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (name, handler) in crate::core::builtins::entries() {
            if !registry.handlers.contains_key(&name) {
                registry.order.push(name.clone());
                registry.handlers.insert(name, handler);
            }
        }
        registry
    }

    /// Build from `(name, handler)` pairs. A repeated name is an error.
    pub fn from_entries<I>(entries: I) -> Result<Self, FunctionError>
    where
        I: IntoIterator<Item = (String, FunctionHandler)>,
    {
        let mut registry = Self::new();
        for (name, handler) in entries {
            registry.insert(name, handler)?;
        }
        Ok(registry)
    }

    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> Result<(), FunctionError>
    where
        F: Fn(&mut CallContext<'_>, &[Arg]) -> Result<FunctionValue, CallFailure>
            + Send
            + Sync
            + 'static,
    {
        self.insert(name.into(), Arc::new(handler))
    }

    fn insert(&mut self, name: String, handler: FunctionHandler) -> Result<(), FunctionError> {
        match name.split_once('.') {
            Some((ns, f)) if !ns.is_empty() && !f.is_empty() => {}
            _ => return Err(FunctionError::InvalidName(name)),
        }
        if self.handlers.contains_key(&name) {
            return Err(FunctionError::DuplicateFunction(name));
        }
        self.order.push(name.clone());
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn resolve(
        &self,
        name: &str,
        args: &[Arg],
        ctx: &mut CallContext<'_>,
    ) -> Result<FunctionValue, FunctionError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| FunctionError::UndefinedFunction(name.to_string()))?;
        // A panicking handler is a failed call, not a crashed geist.
        match catch_unwind(AssertUnwindSafe(|| handler(ctx, args))) {
            Ok(result) => result.map_err(|cause| FunctionError::FunctionCallError {
                name: name.to_string(),
                cause: cause.0,
            }),
            Err(payload) => Err(FunctionError::FunctionCallError {
                name: name.to_string(),
                cause: format!("panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }
}

/// Binds a registry to a vault and a cluster delimiter for one geist
/// invocation.
#[derive(Clone)]
pub struct FunctionBridge {
    registry: Arc<FunctionRegistry>,
    vault: Arc<dyn VaultQuery>,
    delimiter: String,
}

impl FunctionBridge {
    pub fn new(
        registry: Arc<FunctionRegistry>,
        vault: Arc<dyn VaultQuery>,
        delimiter: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            vault,
            delimiter: delimiter.into(),
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn vault(&self) -> &dyn VaultQuery {
        self.vault.as_ref()
    }

    /// Resolve a parsed template call and render its result as text.
    pub fn call(&self, call: &FunctionCall, rng: &mut StdRng) -> Result<String, FunctionError> {
        self.call_named(&call.qualified_name(), &call.args, rng)
    }

    pub fn call_named(
        &self,
        name: &str,
        args: &[Arg],
        rng: &mut StdRng,
    ) -> Result<String, FunctionError> {
        let mut ctx = CallContext {
            vault: self.vault.as_ref(),
            rng,
        };
        let value = self.registry.resolve(name, args, &mut ctx)?;
        tracing::trace!(function = name, "function call resolved");
        Ok(value.render(&self.delimiter))
    }

    /// Split a rendered cluster back into its parts.
    pub fn split_cluster<'t>(&self, text: &'t str) -> Vec<&'t str> {
        text.split(self.delimiter.as_str()).map(str::trim).collect()
    }
}
