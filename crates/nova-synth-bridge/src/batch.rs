use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{BridgeError, FrameId, Type, Value};

/// Exception class raised into the evaluating thread when the watchdog gives up on a batch.
pub const TIMEOUT_SENTINEL: &str = "codehint.Timeout";

/// Progress counter bumped once per evaluated candidate.
#[derive(Debug, Default, Clone)]
pub struct Heartbeat {
    count: Arc<AtomicU64>,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beat(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

/// Aborts whatever the evaluating thread is running by raising an exception in it.
pub trait ThreadInterrupter: Send + Sync {
    fn raise(&self, exception_class: &str) -> Result<(), BridgeError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindingInit {
    /// Source evaluated in the frame before any slot runs.
    Expression(String),
    /// A value already held by the debugger.
    Value(Value),
}

/// A variable declared at the top of the fragment, before any candidate runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub ty: Type,
    pub init: BindingInit,
}

/// One candidate: `if (guard) { _$ran[i] = true; T _$curValue = expression; ... }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSlot {
    pub guard: Option<String>,
    pub expression: String,
    pub validity: String,
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub frame: FrameId,
    /// Element type of the `_$value` array.
    pub result_type: Type,
    pub bindings: Vec<Binding>,
    pub slots: Vec<BatchSlot>,
    /// The whole fragment as source text.
    pub source: String,
    pub heartbeat: Heartbeat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotResult {
    /// `None` when the slot's guard failed and the candidate never ran.
    pub value: Option<Value>,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Completed(Vec<SlotResult>),
    /// Some slot threw; no per-slot results are available.
    Threw {
        exception_class: String,
        message: Option<String>,
    },
    CompileError(String),
}
