use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::geist::GeistId;
use super::suggestion::Suggestion;

/// Lifecycle of one geist invocation.
///
/// `Pending → Running → {Completed, Failed, TimedOut}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvocationState {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl InvocationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

/// Why a geist invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeistErrorKind {
    /// The grammar failed load-time validation.
    Validation,
    RecursionLimit,
    UndefinedFunction,
    FunctionCall,
    /// Reported for `ExecutionOutcome::Timeout`, never by the geist itself.
    Timeout,
    /// An error or panic escaping a code geist, or any other runtime fault.
    Runtime,
}

impl GeistErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::RecursionLimit => "recursion_limit",
            Self::UndefinedFunction => "undefined_function",
            Self::FunctionCall => "function_call",
            Self::Timeout => "timeout",
            Self::Runtime => "runtime",
        }
    }
}

/// The result of one geist invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Success(Vec<Suggestion>),
    Error { kind: GeistErrorKind, message: String },
    Timeout,
}

impl ExecutionOutcome {
    /// The terminal state this outcome corresponds to.
    pub fn state(&self) -> InvocationState {
        match self {
            Self::Success(_) => InvocationState::Completed,
            Self::Error { .. } => InvocationState::Failed,
            Self::Timeout => InvocationState::TimedOut,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Why the invocation failed, `None` on success.
    pub fn error_kind(&self) -> Option<GeistErrorKind> {
        match self {
            Self::Success(_) => None,
            Self::Error { kind, .. } => Some(*kind),
            Self::Timeout => Some(GeistErrorKind::Timeout),
        }
    }

    /// Human-readable failure summary, `None` on success.
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::Success(_) => None,
            Self::Error { kind, message } => Some(format!("{}: {}", kind.label(), message)),
            Self::Timeout => Some(format!(
                "{}: geist did not return in time",
                GeistErrorKind::Timeout.label()
            )),
        }
    }
}

/// One geist invocation, as observed by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub geist_id: GeistId,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub outcome: ExecutionOutcome,
}

impl ExecutionRecord {
    pub fn suggestions(&self) -> &[Suggestion] {
        match &self.outcome {
            ExecutionOutcome::Success(s) => s,
            _ => &[],
        }
    }
}
