//! The contract code geists implement.

use rand::rngs::StdRng;
use thiserror::Error;

use crate::core::functions::{Arg, FunctionBridge, FunctionError};
use crate::core::vault::VaultQuery;
use crate::schema::suggestion::SuggestionDraft;

#[derive(Debug, Error)]
pub enum GeistFailure {
    #[error(transparent)]
    Function(#[from] FunctionError),
    #[error("{0}")]
    Message(String),
}

impl GeistFailure {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Everything a code geist may touch during its turn: the read-only vault,
/// its own random source, and the function registry.
pub struct GeistContext<'a> {
    pub vault: &'a dyn VaultQuery,
    pub rng: &'a mut StdRng,
    bridge: &'a FunctionBridge,
}

impl<'a> GeistContext<'a> {
    pub fn new(bridge: &'a FunctionBridge, rng: &'a mut StdRng) -> Self {
        Self {
            vault: bridge.vault(),
            rng,
            bridge,
        }
    }

    /// Call a registered function by its qualified name, rendered as text.
    pub fn call(&mut self, name: &str, args: &[Arg]) -> Result<String, FunctionError> {
        self.bridge.call_named(name, args, &mut *self.rng)
    }

    /// Call a function and split its result into cluster parts.
    pub fn call_parts(&mut self, name: &str, args: &[Arg]) -> Result<Vec<String>, FunctionError> {
        let text = self.call(name, args)?;
        Ok(self
            .bridge
            .split_cluster(&text)
            .into_iter()
            .map(str::to_string)
            .collect())
    }
}

/// A geist written as host code.
///
/// Runs on its own thread under the scheduler's timeout, so it must be
/// `Send + Sync`. Panics are caught and recorded as runtime failures.
pub trait CodeGeist: Send + Sync {
    fn suggest(&self, ctx: &mut GeistContext<'_>) -> Result<Vec<SuggestionDraft>, GeistFailure>;
}

impl<F> CodeGeist for F
where
    F: Fn(&mut GeistContext<'_>) -> Result<Vec<SuggestionDraft>, GeistFailure> + Send + Sync,
{
    fn suggest(&self, ctx: &mut GeistContext<'_>) -> Result<Vec<SuggestionDraft>, GeistFailure> {
        self(ctx)
    }
}
