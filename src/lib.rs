//! Geist Engine — deterministic suggestion generation over a note vault.
//!
//! Geists are small pluggable units that look at a read-only vault and
//! propose provocative suggestions. Grammar geists are Tracery-style
//! recursive grammars with inflection modifiers and calls into registered
//! vault functions; code geists are host closures. A session runs every
//! enabled geist in a stable order under a per-geist timeout, disables geists
//! that keep failing, and reproduces the same output for the same seed.

pub mod core;
pub mod schema;

pub use crate::core::config::EngineConfig;
pub use crate::core::contract::{CodeGeist, GeistContext, GeistFailure};
pub use crate::core::random::SessionSeed;
pub use crate::core::scheduler::SessionReport;
pub use crate::core::session::{GeistEngine, GeistEngineBuilder, SessionError};
pub use crate::core::vault::{MemoryVault, VaultQuery};
