use nova_synth_bridge::{BridgeError, Value};
use nova_synth_syntax::{ParseError, SkeletonError};
use thiserror::Error;

use crate::effects::LVal;

pub type SynthResult<T> = Result<T, SynthError>;

/// Errors that abort a synthesis request.
///
/// Per-candidate failures never show up here; they are reported as [`CandidateOutcome`]s.
#[derive(Error, Debug)]
pub enum SynthError {
    /// The batch fragment did not compile, almost always because of a user-written predicate.
    #[error("invalid specification: {0}")]
    Specification(String),
    #[error(transparent)]
    Skeleton(#[from] SkeletonError),
    /// A skeleton whose holes cannot be filled with well-typed expressions.
    #[error("{0}")]
    SkeletonType(String),
    #[error("invalid expression: {0}")]
    Parse(#[from] ParseError),
    #[error("execution bridge: {0}")]
    Bridge(#[from] BridgeError),
    #[error("failed to restore {location} to {value:?}: {source}")]
    Undo {
        location: LVal,
        value: Value,
        #[source]
        source: BridgeError,
    },
    #[error("the evaluation thread stopped responding")]
    Disconnected,
    #[error("synthesis was cancelled")]
    Cancelled,
}

/// What happened to one candidate during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    /// Evaluated and satisfied the property.
    Accepted(Value),
    /// Evaluated but did not satisfy the property, or its guard ruled it out.
    Rejected(Option<Value>),
    /// Raised an exception; dropped from the results.
    Threw(String),
    /// Killed by the evaluation watchdog.
    TimedOut,
}

impl CandidateOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, CandidateOutcome::Accepted(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            CandidateOutcome::Accepted(value) => Some(value),
            CandidateOutcome::Rejected(value) => value.as_ref(),
            CandidateOutcome::Threw(_) | CandidateOutcome::TimedOut => None,
        }
    }
}
