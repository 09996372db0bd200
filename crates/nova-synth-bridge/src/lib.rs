//! Execution-bridge façade for expression synthesis.
//!
//! The synthesizer never talks to a debuggee directly. Everything it needs from the paused
//! process (type introspection, compiling and running a batch of candidate expressions,
//! field/method interception, GC pinning, thread control) goes through [`ExecutionBridge`].
//!
//! The `mock` module (behind the `test-support` feature) provides a deterministic in-memory
//! implementation used by the synthesizer's own test suites.

mod batch;
mod events;
mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

use std::sync::Arc;

use thiserror::Error;

pub use batch::{
    BatchOutcome, BatchRequest, BatchSlot, Binding, BindingInit, Heartbeat, SlotResult,
    ThreadInterrupter, TIMEOUT_SENTINEL,
};
pub use events::{EventContext, InterceptEvent, InterceptListener, InterceptorKind};
pub use types::{
    ClassInfo, FieldInfo, FieldRef, MethodInfo, Modifiers, PrimitiveType, Type,
    CONSTRUCTOR_NAME, OBJECT, STATIC_INITIALIZER_NAME, STRING,
};

pub type ThreadId = u64;
pub type FrameId = u64;
pub type ObjectId = u64;
pub type InterceptorId = u64;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Void,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    Object(ObjectRef),
}

impl Value {
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::Object(obj) => Some(obj.id),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integral value of `byte`/`short`/`char`/`int`/`long` values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Short(v) => Some(i64::from(*v)),
            Self::Char(v) => Some(i64::from(u32::from(*v))),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// The value's dynamic type. Objects report their runtime type.
    pub fn runtime_type(&self) -> Type {
        match self {
            Self::Null => Type::Null,
            Self::Void => Type::Void,
            Self::Boolean(_) => Type::Primitive(PrimitiveType::Boolean),
            Self::Byte(_) => Type::Primitive(PrimitiveType::Byte),
            Self::Short(_) => Type::Primitive(PrimitiveType::Short),
            Self::Int(_) => Type::Primitive(PrimitiveType::Int),
            Self::Long(_) => Type::Primitive(PrimitiveType::Long),
            Self::Float(_) => Type::Primitive(PrimitiveType::Float),
            Self::Double(_) => Type::Primitive(PrimitiveType::Double),
            Self::Char(_) => Type::Primitive(PrimitiveType::Char),
            Self::Object(obj) => Type::parse(&obj.runtime_type),
        }
    }

    /// Default value for a slot of the given type (`0`, `false`, `null`).
    pub fn default_for(ty: &Type) -> Value {
        match ty.as_primitive() {
            Some(PrimitiveType::Boolean) => Value::Boolean(false),
            Some(PrimitiveType::Byte) => Value::Byte(0),
            Some(PrimitiveType::Short) => Value::Short(0),
            Some(PrimitiveType::Char) => Value::Char('\0'),
            Some(PrimitiveType::Int) => Value::Int(0),
            Some(PrimitiveType::Long) => Value::Long(0),
            Some(PrimitiveType::Float) => Value::Float(0.0),
            Some(PrimitiveType::Double) => Value::Double(0.0),
            None if ty.is_void() => Value::Void,
            None => Value::Null,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub id: ObjectId,
    pub runtime_type: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub ty: Type,
    pub value: Value,
}

/// The paused frame candidates are evaluated in.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameInfo {
    pub thread: ThreadId,
    pub frame: FrameId,
    /// Declaring type of the executing method (the receiving type of implicit accesses).
    pub declaring_type: String,
    /// Name of the executing method; never suggested as a candidate call.
    pub method: String,
    pub is_static: bool,
    pub this: Option<Value>,
    pub locals: Vec<LocalVariable>,
    /// Single-type imports of the enclosing compilation unit.
    pub imports: Vec<String>,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("execution bridge is not connected")]
    NotConnected,
    #[error("execution bridge operation not implemented")]
    NotImplemented,
    #[error("the target process has terminated")]
    VmTerminated,
    #[error("thread is not suspended: {0}")]
    InvalidThreadState(String),
    #[error("invalid object id {0}")]
    InvalidObjectId(ObjectId),
    #[error("unknown class {0}")]
    UnknownClass(String),
    #[error("unknown field {0}")]
    UnknownField(FieldRef),
    #[error("unknown local variable {0}")]
    UnknownLocal(String),
    #[error("cannot store a {found} value into a location of type {expected}")]
    TypeMismatch { expected: String, found: String },
    #[error("{0}")]
    Other(String),
}

/// Completion callback for [`ExecutionBridge::evaluate`].
pub type EvaluationCallback = Box<dyn FnOnce(Result<BatchOutcome, BridgeError>) + Send>;

/// Capabilities the synthesizer consumes from a paused process.
///
/// Heap-level operations shared with interception callbacks live on the [`EventContext`]
/// supertrait.
pub trait ExecutionBridge: EventContext + Send {
    fn frame(&mut self) -> Result<FrameInfo, BridgeError>;

    /// Names of all loaded reference types, array types excluded.
    fn loaded_classes(&mut self) -> Result<Vec<String>, BridgeError>;

    /// All live instances of exactly `class`, up to `max`.
    fn instances(&mut self, _class: &str, _max: usize) -> Result<Vec<ObjectRef>, BridgeError> {
        Err(BridgeError::NotImplemented)
    }

    /// Instance field values of an object, inherited fields included.
    fn object_fields(&mut self, object: ObjectId) -> Result<Vec<(FieldInfo, Value)>, BridgeError>;

    fn static_fields(&mut self, class: &str) -> Result<Vec<(FieldInfo, Value)>, BridgeError>;

    /// Debugger-side store; never reported to interceptors.
    fn set_field_value(
        &mut self,
        object: Option<ObjectId>,
        field: &FieldRef,
        value: &Value,
    ) -> Result<(), BridgeError>;

    /// Overwrites `array[0..values.len()]`.
    fn set_array_values(&mut self, array: ObjectId, values: &[Value]) -> Result<(), BridgeError>;

    fn set_local(&mut self, name: &str, value: &Value) -> Result<(), BridgeError>;

    fn new_string(&mut self, value: &str) -> Result<Value, BridgeError>;

    /// Compiles and runs a batch in the paused frame.
    ///
    /// Completion is reported through `done`, possibly from another thread and possibly before
    /// this call returns. An `Err` return means the request was never started.
    fn evaluate(&mut self, request: BatchRequest, done: EvaluationCallback) -> Result<(), BridgeError>;

    /// A handle the evaluation watchdog uses to abort the running batch.
    fn interrupter(&mut self) -> Result<Arc<dyn ThreadInterrupter>, BridgeError>;

    fn suspend_thread(&mut self, _thread: ThreadId) -> Result<(), BridgeError> {
        Err(BridgeError::NotImplemented)
    }

    fn resume_thread(&mut self, _thread: ThreadId) -> Result<(), BridgeError> {
        Err(BridgeError::NotImplemented)
    }

    fn stop_thread(&mut self, _thread: ThreadId, _exception_class: &str) -> Result<(), BridgeError> {
        Err(BridgeError::NotImplemented)
    }

    fn remove_interceptor(&mut self, id: InterceptorId) -> Result<(), BridgeError>;

    fn set_listener(&mut self, listener: Option<Arc<dyn InterceptListener>>);

    /// Whether field watchpoints and method-entry hooks are available.
    fn supports_interception(&self) -> bool {
        false
    }

    /// Top-level UI windows currently open in the target.
    fn windows(&mut self) -> Result<Vec<ObjectId>, BridgeError> {
        Ok(Vec::new())
    }

    fn dispose_window(&mut self, _window: ObjectId) -> Result<(), BridgeError> {
        Ok(())
    }

    /// Toggles the target's permission sandbox around candidate execution.
    fn set_sandbox_enabled(&mut self, _enabled: bool) -> Result<(), BridgeError> {
        Ok(())
    }
}
