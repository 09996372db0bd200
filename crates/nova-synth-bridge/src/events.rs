use crate::{BridgeError, ClassInfo, FieldRef, InterceptorId, ObjectId, ObjectRef, Type, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptorKind {
    /// Field watchpoint, optionally filtered to one instance.
    Field {
        field: FieldRef,
        instance: Option<ObjectId>,
        access: bool,
        modification: bool,
    },
    MethodEntry {
        class: String,
        method: String,
    },
    /// Fires once per newly loaded class.
    ClassPrepare,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterceptEvent {
    FieldModification {
        interceptor: InterceptorId,
        object: Option<ObjectRef>,
        field: FieldRef,
        field_type: Type,
        current: Value,
        to_be: Value,
        in_static_initializer: bool,
    },
    FieldAccess {
        interceptor: InterceptorId,
        object: Option<ObjectRef>,
        field: FieldRef,
        field_type: Type,
        current: Value,
    },
    MethodEntry {
        interceptor: InterceptorId,
        class: String,
        method: String,
        receiver: Option<ObjectRef>,
        args: Vec<Value>,
    },
    ClassPrepare {
        interceptor: InterceptorId,
        class: String,
    },
}

impl InterceptEvent {
    pub fn interceptor(&self) -> InterceptorId {
        match self {
            InterceptEvent::FieldModification { interceptor, .. }
            | InterceptEvent::FieldAccess { interceptor, .. }
            | InterceptEvent::MethodEntry { interceptor, .. }
            | InterceptEvent::ClassPrepare { interceptor, .. } => *interceptor,
        }
    }
}

/// Heap access available both to the driving thread and inside interception callbacks.
///
/// Callbacks run while the target thread is stopped at the event, so they must not resume it.
pub trait EventContext {
    fn class_info(&mut self, name: &str) -> Result<Option<ClassInfo>, BridgeError>;

    fn field_value(&mut self, object: Option<ObjectId>, field: &FieldRef) -> Result<Value, BridgeError>;

    fn array_values(&mut self, array: ObjectId) -> Result<Vec<Value>, BridgeError>;

    fn string_value(&mut self, object: ObjectId) -> Result<String, BridgeError>;

    /// The type named by a `java.lang.Class` object.
    fn reflected_type(&mut self, class_object: ObjectId) -> Result<String, BridgeError>;

    fn disable_collection(&mut self, object: ObjectId) -> Result<(), BridgeError>;

    fn enable_collection(&mut self, object: ObjectId) -> Result<(), BridgeError>;

    fn install_interceptor(&mut self, kind: InterceptorKind) -> Result<InterceptorId, BridgeError>;

    fn set_interceptor_enabled(&mut self, id: InterceptorId, enabled: bool) -> Result<(), BridgeError>;
}

pub trait InterceptListener: Send + Sync {
    fn on_event(&self, event: &InterceptEvent, cx: &mut dyn EventContext);
}
