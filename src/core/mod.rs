pub mod assembler;
pub mod builtins;
pub mod config;
pub mod contract;
pub mod expansion;
pub mod functions;
pub mod grammar;
pub mod isolation;
pub mod modifiers;
pub mod random;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod vault;
