//! Expression synthesis against a paused program.
//!
//! Given a demonstration of what an expression should evaluate to (a value, a type or a
//! predicate), the synthesizer enumerates candidate expressions over the values reachable
//! from the paused frame, either bottom-up ([`generator`]) or by filling the holes of a
//! partial expression ([`filler`]), then runs them in batches in the live process
//! ([`eval`]) while recording and reverting every heap change they make ([`effects`]).
//!
//! [`Synthesizer`] ties the pieces together.

mod cancel;
pub mod constraint;
pub mod effects;
mod error;
pub mod eval;
pub mod expr;
pub mod filler;
mod fold;
pub mod generator;
mod overload;
pub mod property;
mod session;
pub mod types;
pub mod uniqueness;

pub use cancel::CancellationToken;
pub use constraint::TypeConstraint;
pub use effects::{Effect, LVal, RVal, SideEffectHandler};
pub use error::{CandidateOutcome, SynthError, SynthResult};
pub use eval::{Evaluation, EvaluationManager, Guard};
pub use expr::{ExprArena, ExprId, ExprKind};
pub use property::{LambdaProperty, Property, StateProperty, TypeProperty, ValueProperty};
pub use session::{Synthesis, SynthesisRequest, Synthesized, Synthesizer};
pub use types::TypeStore;
