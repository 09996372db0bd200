//! Deterministic, in-memory execution bridge.
//!
//! `MockVm` keeps a small object heap, runs candidate batches by interpreting them with
//! `nova-synth-syntax`, dispatches method calls to native Rust closures, and reports field
//! watchpoint / method-entry / class-prepare events exactly where a JVM would. It also records
//! every GC-pinning call, interceptor removal and sandbox toggle so tests can assert on them.

mod builtins;
mod interp;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    BatchOutcome, BatchRequest, BridgeError, ClassInfo, EvaluationCallback, EventContext,
    ExecutionBridge, FieldInfo, FieldRef, FrameInfo, InterceptEvent, InterceptListener,
    InterceptorId, InterceptorKind, LocalVariable, ObjectId, ObjectRef, ThreadId,
    ThreadInterrupter, Type, Value, STRING,
};

pub use builtins::{ARRAY_LIST, INTEGER, LIST, REFLECT_FIELD};

/// Native method body: `(vm, receiver, args)`. Static methods get no receiver.
pub type NativeMethod =
    Arc<dyn Fn(&mut MockVm, Option<&Value>, &[Value]) -> Result<Value, Thrown> + Send + Sync>;

/// An exception raised inside the mock VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thrown {
    pub class: String,
    pub message: Option<String>,
}

impl Thrown {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: Some(message.into()),
        }
    }

    pub fn null_pointer() -> Self {
        Self {
            class: "java.lang.NullPointerException".to_owned(),
            message: None,
        }
    }
}

#[derive(Debug, Clone)]
enum HeapKind {
    Instance(BTreeMap<FieldRef, Value>),
    Array(Vec<Value>),
    Str(String),
    ClassObject(String),
    Window,
}

#[derive(Debug, Clone)]
struct HeapObject {
    runtime_type: String,
    kind: HeapKind,
}

#[derive(Debug, Clone)]
struct Interceptor {
    kind: InterceptorKind,
    enabled: bool,
}

#[derive(Default)]
struct MockInterrupter {
    pending: Mutex<Option<String>>,
}

impl ThreadInterrupter for MockInterrupter {
    fn raise(&self, exception_class: &str) -> Result<(), BridgeError> {
        *self.pending.lock() = Some(exception_class.to_owned());
        Ok(())
    }
}

pub struct MockVm {
    classes: BTreeMap<String, ClassInfo>,
    natives: HashMap<(String, String, usize), NativeMethod>,
    statics: BTreeMap<FieldRef, Value>,
    heap: BTreeMap<ObjectId, HeapObject>,
    next_object_id: ObjectId,
    string_literals: HashMap<String, ObjectId>,
    class_objects: HashMap<String, ObjectId>,
    frame: FrameInfo,
    interceptors: BTreeMap<InterceptorId, Interceptor>,
    next_interceptor_id: InterceptorId,
    listener: Option<Arc<dyn InterceptListener>>,
    interrupter: Arc<MockInterrupter>,
    in_static_initializer: bool,
    collection_disabled: BTreeSet<ObjectId>,
    windows: Vec<ObjectId>,
    interception_supported: bool,
    /// Interceptor installs left before installing fails; unlimited when `None`.
    install_budget: Option<usize>,
    collection_control_fails: bool,
    pub disable_collection_calls: Vec<ObjectId>,
    pub enable_collection_calls: Vec<ObjectId>,
    pub removed_interceptors: Vec<InterceptorId>,
    pub disposed_windows: Vec<ObjectId>,
    pub sandbox_transitions: Vec<bool>,
    /// Sizes of every batch handed to `evaluate`, in order.
    pub batch_sizes: Vec<usize>,
    pub stopped_threads: Vec<(ThreadId, String)>,
}

impl Default for MockVm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVm {
    /// A VM paused in static method `Main.main` with no locals and the built-in library loaded.
    pub fn new() -> Self {
        let mut vm = MockVm {
            classes: BTreeMap::new(),
            natives: HashMap::new(),
            statics: BTreeMap::new(),
            heap: BTreeMap::new(),
            next_object_id: 1,
            string_literals: HashMap::new(),
            class_objects: HashMap::new(),
            frame: FrameInfo {
                thread: 1,
                frame: 1,
                declaring_type: "Main".to_owned(),
                method: "main".to_owned(),
                is_static: true,
                this: None,
                locals: Vec::new(),
                imports: Vec::new(),
            },
            interceptors: BTreeMap::new(),
            next_interceptor_id: 1,
            listener: None,
            interrupter: Arc::new(MockInterrupter::default()),
            in_static_initializer: false,
            collection_disabled: BTreeSet::new(),
            windows: Vec::new(),
            interception_supported: true,
            install_budget: None,
            collection_control_fails: false,
            disable_collection_calls: Vec::new(),
            enable_collection_calls: Vec::new(),
            removed_interceptors: Vec::new(),
            disposed_windows: Vec::new(),
            sandbox_transitions: Vec::new(),
            batch_sizes: Vec::new(),
            stopped_threads: Vec::new(),
        };
        builtins::install(&mut vm);
        vm.define_class(ClassInfo::new("Main"));
        vm
    }

    // ---- setup -------------------------------------------------------------------------------

    /// Registers (loads) a class, initializing its static fields to their defaults.
    pub fn define_class(&mut self, info: ClassInfo) {
        for field in info.fields.iter().filter(|f| f.is_static()) {
            self.statics
                .insert(field.field_ref(), Value::default_for(&field.ty));
        }
        let name = info.name.clone();
        self.classes.insert(name.clone(), info);
        let hooks: Vec<InterceptorId> = self
            .interceptors
            .iter()
            .filter(|(_, i)| i.enabled && i.kind == InterceptorKind::ClassPrepare)
            .map(|(id, _)| *id)
            .collect();
        for interceptor in hooks {
            self.fire(InterceptEvent::ClassPrepare {
                interceptor,
                class: name.clone(),
            });
        }
    }

    pub fn define_native(
        &mut self,
        class: &str,
        name: &str,
        arity: usize,
        body: impl Fn(&mut MockVm, Option<&Value>, &[Value]) -> Result<Value, Thrown> + Send + Sync + 'static,
    ) {
        self.natives
            .insert((class.to_owned(), name.to_owned(), arity), Arc::new(body));
    }

    pub fn set_frame_type(&mut self, declaring_type: &str, method: &str) {
        self.frame.declaring_type = declaring_type.to_owned();
        self.frame.method = method.to_owned();
    }

    /// Makes the frame an instance frame of `this`.
    pub fn set_this(&mut self, this: Value) {
        if let Value::Object(obj) = &this {
            self.frame.declaring_type = obj.runtime_type.clone();
        }
        self.frame.is_static = false;
        self.frame.this = Some(this);
    }

    pub fn add_local(&mut self, name: &str, ty: Type, value: Value) {
        self.frame.locals.retain(|l| l.name != name);
        self.frame.locals.push(LocalVariable {
            name: name.to_owned(),
            ty,
            value,
        });
    }

    pub fn local(&self, name: &str) -> Option<&Value> {
        self.frame
            .locals
            .iter()
            .find(|l| l.name == name)
            .map(|l| &l.value)
    }

    pub fn add_import(&mut self, class: &str) {
        self.frame.imports.push(class.to_owned());
    }

    pub fn set_interception_supported(&mut self, supported: bool) {
        self.interception_supported = supported;
    }

    /// Lets `count` more interceptor installs succeed; every later one fails.
    pub fn fail_interceptor_installs_after(&mut self, count: usize) {
        self.install_budget = Some(count);
    }

    /// Makes every `disable_collection` call fail.
    pub fn fail_collection_control(&mut self, fails: bool) {
        self.collection_control_fails = fails;
    }

    /// Runs `body` as the static initializer of a class.
    pub fn run_static_initializer(
        &mut self,
        body: impl FnOnce(&mut MockVm) -> Result<(), Thrown>,
    ) -> Result<(), Thrown> {
        self.in_static_initializer = true;
        let result = body(self);
        self.in_static_initializer = false;
        result
    }

    // ---- heap: debugger side -------------------------------------------------------------------

    fn alloc(&mut self, runtime_type: &str, kind: HeapKind) -> Value {
        let id = self.next_object_id;
        self.next_object_id += 1;
        self.heap.insert(
            id,
            HeapObject {
                runtime_type: runtime_type.to_owned(),
                kind,
            },
        );
        Value::Object(ObjectRef {
            id,
            runtime_type: runtime_type.to_owned(),
        })
    }

    /// Allocates an instance with default field values, without running a constructor.
    pub fn new_object(&mut self, class: &str) -> Result<Value, BridgeError> {
        if !self.classes.contains_key(class) {
            return Err(BridgeError::UnknownClass(class.to_owned()));
        }
        let fields = self
            .instance_fields(class)
            .into_iter()
            .map(|f| {
                let value = Value::default_for(&f.ty);
                (f.field_ref(), value)
            })
            .collect();
        Ok(self.alloc(class, HeapKind::Instance(fields)))
    }

    pub fn new_array(&mut self, component: Type, values: Vec<Value>) -> Value {
        let ty = Type::array_of(component).name();
        self.alloc(&ty, HeapKind::Array(values))
    }

    pub fn alloc_string(&mut self, value: &str) -> Value {
        self.alloc(STRING, HeapKind::Str(value.to_owned()))
    }

    pub(crate) fn intern_string(&mut self, value: &str) -> Value {
        if let Some(id) = self.string_literals.get(value) {
            return Value::Object(ObjectRef {
                id: *id,
                runtime_type: STRING.to_owned(),
            });
        }
        let v = self.alloc_string(value);
        if let Some(id) = v.object_id() {
            self.string_literals.insert(value.to_owned(), id);
        }
        v
    }

    pub fn class_object(&mut self, type_name: &str) -> Value {
        if let Some(id) = self.class_objects.get(type_name) {
            return Value::Object(ObjectRef {
                id: *id,
                runtime_type: "java.lang.Class".to_owned(),
            });
        }
        let v = self.alloc("java.lang.Class", HeapKind::ClassObject(type_name.to_owned()));
        if let Some(id) = v.object_id() {
            self.class_objects.insert(type_name.to_owned(), id);
        }
        v
    }

    /// Debugger-side read of an instance field by simple name.
    pub fn get_field(&self, object: &Value, name: &str) -> Result<Value, BridgeError> {
        let id = object.object_id().ok_or(BridgeError::InvalidObjectId(0))?;
        let field = self
            .resolve_instance_field(id, name)
            .ok_or_else(|| BridgeError::UnknownField(FieldRef::new("?", name)))?;
        self.raw_field(Some(id), &field.field_ref())
    }

    /// Debugger-side write of an instance field by simple name.
    pub fn set_field(&mut self, object: &Value, name: &str, value: Value) -> Result<(), BridgeError> {
        let id = object.object_id().ok_or(BridgeError::InvalidObjectId(0))?;
        let field = self
            .resolve_instance_field(id, name)
            .ok_or_else(|| BridgeError::UnknownField(FieldRef::new("?", name)))?;
        self.store_field(Some(id), &field.field_ref(), value)
    }

    pub fn get_static(&self, class: &str, name: &str) -> Result<Value, BridgeError> {
        let field = FieldRef::new(class, name);
        self.statics
            .get(&field)
            .cloned()
            .ok_or(BridgeError::UnknownField(field))
    }

    pub fn set_static(&mut self, class: &str, name: &str, value: Value) -> Result<(), BridgeError> {
        self.store_field(None, &FieldRef::new(class, name), value)
    }

    pub fn array(&self, array: &Value) -> Option<Vec<Value>> {
        match &self.heap.get(&array.object_id()?)?.kind {
            HeapKind::Array(values) => Some(values.clone()),
            _ => None,
        }
    }

    pub fn string(&self, value: &Value) -> Option<String> {
        match &self.heap.get(&value.object_id()?)?.kind {
            HeapKind::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn windows_open(&self) -> &[ObjectId] {
        &self.windows
    }

    pub fn is_collection_disabled(&self, object: ObjectId) -> bool {
        self.collection_disabled.contains(&object)
    }

    /// Enabled interceptors, by kind.
    pub fn active_interceptors(&self) -> Vec<(InterceptorId, InterceptorKind)> {
        self.interceptors
            .iter()
            .filter(|(_, i)| i.enabled)
            .map(|(id, i)| (*id, i.kind.clone()))
            .collect()
    }

    pub fn interceptor_count(&self) -> usize {
        self.interceptors.len()
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    fn raw_field(&self, object: Option<ObjectId>, field: &FieldRef) -> Result<Value, BridgeError> {
        match object {
            None => self
                .statics
                .get(field)
                .cloned()
                .ok_or_else(|| BridgeError::UnknownField(field.clone())),
            Some(id) => match self.heap.get(&id).map(|o| &o.kind) {
                Some(HeapKind::Instance(fields)) => fields
                    .get(field)
                    .cloned()
                    .ok_or_else(|| BridgeError::UnknownField(field.clone())),
                _ => Err(BridgeError::InvalidObjectId(id)),
            },
        }
    }

    fn store_field(&mut self, object: Option<ObjectId>, field: &FieldRef, value: Value) -> Result<(), BridgeError> {
        match object {
            None => match self.statics.get_mut(field) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(BridgeError::UnknownField(field.clone())),
            },
            Some(id) => match self.heap.get_mut(&id).map(|o| &mut o.kind) {
                Some(HeapKind::Instance(fields)) => match fields.get_mut(field) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(BridgeError::UnknownField(field.clone())),
                },
                _ => Err(BridgeError::InvalidObjectId(id)),
            },
        }
    }

    // ---- class model ---------------------------------------------------------------------------

    /// `class` followed by its superclasses.
    fn superclass_chain(&self, class: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut cur = Some(class.to_owned());
        while let Some(name) = cur {
            if chain.contains(&name) {
                break;
            }
            cur = self.classes.get(&name).and_then(|c| c.superclass.clone());
            chain.push(name);
        }
        chain
    }

    /// Every class and interface `class` is assignable to, `class` first.
    fn supertypes(&self, class: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut queue = vec![class.to_owned()];
        while let Some(name) = queue.pop() {
            if out.contains(&name) {
                continue;
            }
            if let Some(info) = self.classes.get(&name) {
                queue.extend(info.interfaces.iter().rev().cloned());
                if let Some(sup) = &info.superclass {
                    queue.push(sup.clone());
                }
            }
            out.push(name);
        }
        out
    }

    fn instance_fields(&self, class: &str) -> Vec<FieldInfo> {
        self.superclass_chain(class)
            .iter()
            .filter_map(|c| self.classes.get(c))
            .flat_map(|c| c.fields.iter().filter(|f| !f.is_static()).cloned())
            .collect()
    }

    fn resolve_instance_field(&self, object: ObjectId, name: &str) -> Option<FieldInfo> {
        let runtime_type = &self.heap.get(&object)?.runtime_type;
        self.instance_fields(runtime_type)
            .into_iter()
            .find(|f| f.name == name)
    }

    fn resolve_static_field(&self, class: &str, name: &str) -> Option<FieldInfo> {
        self.supertypes(class)
            .iter()
            .filter_map(|c| self.classes.get(c))
            .flat_map(|c| c.fields.iter())
            .find(|f| f.is_static() && f.name == name)
            .cloned()
    }

    fn is_assignable(&self, from: &Type, to: &Type) -> bool {
        match (from, to) {
            _ if from == to => true,
            (Type::Null, t) => t.is_reference(),
            (Type::Primitive(a), Type::Primitive(b)) => a.widens_to(*b),
            (Type::Class(_) | Type::Array(_), Type::Class(name)) if name == crate::OBJECT => true,
            (Type::Class(a), Type::Class(b)) => self.supertypes(a).contains(b),
            (Type::Array(a), Type::Array(b)) => {
                a.is_reference() && b.is_reference() && self.is_assignable(a, b)
            }
            _ => false,
        }
    }

    pub(crate) fn resolve_class_name(&self, name: &str) -> Option<String> {
        if self.classes.contains_key(name) {
            return Some(name.to_owned());
        }
        if let Some(import) = self
            .frame
            .imports
            .iter()
            .find(|i| i.rsplit('.').next() == Some(name))
        {
            return Some(import.clone());
        }
        let java_lang = format!("java.lang.{name}");
        if self.classes.contains_key(&java_lang) {
            return Some(java_lang);
        }
        let nested = name.replace('.', "$");
        self.classes
            .keys()
            .find(|c| **c == nested || c.ends_with(&format!(".{nested}")) || c.ends_with(&format!("${nested}")))
            .cloned()
    }

    // ---- interception --------------------------------------------------------------------------

    fn fire(&mut self, event: InterceptEvent) {
        if let Some(listener) = self.listener.clone() {
            listener.on_event(&event, self);
        }
    }

    fn field_interceptors(&self, field: &FieldRef, object: Option<ObjectId>, modification: bool) -> Vec<InterceptorId> {
        self.interceptors
            .iter()
            .filter(|(_, i)| i.enabled)
            .filter(|(_, i)| match &i.kind {
                InterceptorKind::Field {
                    field: watched,
                    instance,
                    access,
                    modification: on_modification,
                } => {
                    watched == field
                        && (if modification { *on_modification } else { *access })
                        && (instance.is_none() || *instance == object)
                }
                _ => false,
            })
            .map(|(id, _)| *id)
            .collect()
    }

    fn object_ref(&self, id: ObjectId) -> Option<ObjectRef> {
        self.heap.get(&id).map(|o| ObjectRef {
            id,
            runtime_type: o.runtime_type.clone(),
        })
    }

    // ---- heap: program side (reports events) ---------------------------------------------------

    pub fn check_interrupt(&self) -> Result<(), Thrown> {
        match self.interrupter.pending.lock().take() {
            Some(class) => Err(Thrown {
                class,
                message: None,
            }),
            None => Ok(()),
        }
    }

    pub fn read_field(&mut self, object: &Value, name: &str) -> Result<Value, Thrown> {
        let id = object.object_id().ok_or_else(Thrown::null_pointer)?;
        let field = self
            .resolve_instance_field(id, name)
            .ok_or_else(|| Thrown::new("java.lang.NoSuchFieldError", name))?;
        self.read_field_ref(Some(id), &field)
    }

    pub fn write_field(&mut self, object: &Value, name: &str, value: Value) -> Result<(), Thrown> {
        let id = object.object_id().ok_or_else(Thrown::null_pointer)?;
        let field = self
            .resolve_instance_field(id, name)
            .ok_or_else(|| Thrown::new("java.lang.NoSuchFieldError", name))?;
        self.write_field_ref(Some(id), &field, value)
    }

    pub fn read_static(&mut self, class: &str, name: &str) -> Result<Value, Thrown> {
        let field = self
            .resolve_static_field(class, name)
            .ok_or_else(|| Thrown::new("java.lang.NoSuchFieldError", name))?;
        self.read_field_ref(None, &field)
    }

    pub fn write_static(&mut self, class: &str, name: &str, value: Value) -> Result<(), Thrown> {
        let field = self
            .resolve_static_field(class, name)
            .ok_or_else(|| Thrown::new("java.lang.NoSuchFieldError", name))?;
        self.write_field_ref(None, &field, value)
    }

    fn read_field_ref(&mut self, object: Option<ObjectId>, field: &FieldInfo) -> Result<Value, Thrown> {
        let field_ref = field.field_ref();
        let current = self
            .raw_field(object, &field_ref)
            .map_err(|err| Thrown::new("java.lang.InternalError", err.to_string()))?;
        for interceptor in self.field_interceptors(&field_ref, object, false) {
            let object = object.and_then(|id| self.object_ref(id));
            self.fire(InterceptEvent::FieldAccess {
                interceptor,
                object,
                field: field_ref.clone(),
                field_type: field.ty.clone(),
                current: current.clone(),
            });
        }
        Ok(current)
    }

    fn write_field_ref(&mut self, object: Option<ObjectId>, field: &FieldInfo, value: Value) -> Result<(), Thrown> {
        let field_ref = field.field_ref();
        let current = self
            .raw_field(object, &field_ref)
            .map_err(|err| Thrown::new("java.lang.InternalError", err.to_string()))?;
        for interceptor in self.field_interceptors(&field_ref, object, true) {
            let object = object.and_then(|id| self.object_ref(id));
            self.fire(InterceptEvent::FieldModification {
                interceptor,
                object,
                field: field_ref.clone(),
                field_type: field.ty.clone(),
                current: current.clone(),
                to_be: value.clone(),
                in_static_initializer: self.in_static_initializer,
            });
        }
        self.store_field(object, &field_ref, value)
            .map_err(|err| Thrown::new("java.lang.InternalError", err.to_string()))
    }

    /// Reflective write: bypasses field watchpoints like `Field.set` does on a real VM.
    pub fn write_field_unwatched(&mut self, object: Option<&Value>, field: &FieldRef, value: Value) -> Result<(), Thrown> {
        let id = match object {
            Some(Value::Object(obj)) => Some(obj.id),
            Some(_) => return Err(Thrown::null_pointer()),
            None => None,
        };
        self.store_field(id, field, value)
            .map_err(|err| Thrown::new("java.lang.IllegalArgumentException", err.to_string()))
    }

    pub fn read_field_unwatched(&mut self, object: Option<&Value>, field: &FieldRef) -> Result<Value, Thrown> {
        let id = match object {
            Some(Value::Object(obj)) => Some(obj.id),
            Some(_) => return Err(Thrown::null_pointer()),
            None => None,
        };
        self.raw_field(id, field)
            .map_err(|err| Thrown::new("java.lang.IllegalArgumentException", err.to_string()))
    }

    pub fn array_length(&self, array: &Value) -> Result<i32, Thrown> {
        let id = array.object_id().ok_or_else(Thrown::null_pointer)?;
        match self.heap.get(&id).map(|o| &o.kind) {
            Some(HeapKind::Array(values)) => Ok(values.len() as i32),
            _ => Err(Thrown::new("java.lang.ClassCastException", "not an array")),
        }
    }

    pub fn array_get(&self, array: &Value, index: i32) -> Result<Value, Thrown> {
        let id = array.object_id().ok_or_else(Thrown::null_pointer)?;
        match self.heap.get(&id).map(|o| &o.kind) {
            Some(HeapKind::Array(values)) => usize::try_from(index)
                .ok()
                .and_then(|i| values.get(i))
                .cloned()
                .ok_or_else(|| {
                    Thrown::new(
                        "java.lang.ArrayIndexOutOfBoundsException",
                        format!("Index {index} out of bounds for length {}", values.len()),
                    )
                }),
            _ => Err(Thrown::new("java.lang.ClassCastException", "not an array")),
        }
    }

    /// Element store; like a JVM, no watchpoint sees it.
    pub fn array_set(&mut self, array: &Value, index: i32, value: Value) -> Result<(), Thrown> {
        let id = array.object_id().ok_or_else(Thrown::null_pointer)?;
        match self.heap.get_mut(&id).map(|o| &mut o.kind) {
            Some(HeapKind::Array(values)) => {
                let len = values.len();
                let slot = usize::try_from(index)
                    .ok()
                    .and_then(|i| values.get_mut(i))
                    .ok_or_else(|| {
                        Thrown::new(
                            "java.lang.ArrayIndexOutOfBoundsException",
                            format!("Index {index} out of bounds for length {len}"),
                        )
                    })?;
                *slot = value;
                Ok(())
            }
            _ => Err(Thrown::new("java.lang.ClassCastException", "not an array")),
        }
    }

    /// Opens a top-level window, as UI code run by a candidate might.
    pub fn open_window(&mut self) -> Value {
        let window = self.alloc("java.awt.Frame", HeapKind::Window);
        if let Some(id) = window.object_id() {
            self.windows.push(id);
        }
        window
    }

    /// Invokes a method the way compiled code would, firing method-entry events.
    pub fn invoke(&mut self, receiver: &Value, name: &str, args: &[Value]) -> Result<Value, Thrown> {
        let Value::Object(obj) = receiver else {
            return Err(Thrown::null_pointer());
        };
        let class = obj.runtime_type.clone();
        self.invoke_in(&class, Some(receiver), name, args)
    }

    pub fn invoke_static(&mut self, class: &str, name: &str, args: &[Value]) -> Result<Value, Thrown> {
        self.invoke_in(class, None, name, args)
    }

    fn find_native(&self, class: &str, name: &str, arity: usize) -> Option<(String, NativeMethod)> {
        self.supertypes(class).into_iter().find_map(|c| {
            self.natives
                .get(&(c.clone(), name.to_owned(), arity))
                .map(|native| (c, native.clone()))
        })
    }

    fn invoke_in(&mut self, class: &str, receiver: Option<&Value>, name: &str, args: &[Value]) -> Result<Value, Thrown> {
        self.check_interrupt()?;
        let (declaring, native) = self.find_native(class, name, args.len()).ok_or_else(|| {
            Thrown::new(
                "java.lang.NoSuchMethodError",
                format!("{class}.{name}/{}", args.len()),
            )
        })?;
        let hooks: Vec<InterceptorId> = self
            .interceptors
            .iter()
            .filter(|(_, i)| i.enabled)
            .filter(|(_, i)| {
                matches!(&i.kind, InterceptorKind::MethodEntry { class, method } if *class == declaring && method == name)
            })
            .map(|(id, _)| *id)
            .collect();
        for interceptor in hooks {
            let receiver = receiver
                .and_then(Value::object_id)
                .and_then(|id| self.object_ref(id));
            self.fire(InterceptEvent::MethodEntry {
                interceptor,
                class: declaring.clone(),
                method: name.to_owned(),
                receiver,
                args: args.to_vec(),
            });
        }
        native(self, receiver, args)
    }
}

impl EventContext for MockVm {
    fn class_info(&mut self, name: &str) -> Result<Option<ClassInfo>, BridgeError> {
        Ok(self.classes.get(name).cloned())
    }

    fn field_value(&mut self, object: Option<ObjectId>, field: &FieldRef) -> Result<Value, BridgeError> {
        self.raw_field(object, field)
    }

    fn array_values(&mut self, array: ObjectId) -> Result<Vec<Value>, BridgeError> {
        match self.heap.get(&array).map(|o| &o.kind) {
            Some(HeapKind::Array(values)) => Ok(values.clone()),
            _ => Err(BridgeError::InvalidObjectId(array)),
        }
    }

    fn string_value(&mut self, object: ObjectId) -> Result<String, BridgeError> {
        match self.heap.get(&object).map(|o| &o.kind) {
            Some(HeapKind::Str(s)) => Ok(s.clone()),
            _ => Err(BridgeError::InvalidObjectId(object)),
        }
    }

    fn reflected_type(&mut self, class_object: ObjectId) -> Result<String, BridgeError> {
        match self.heap.get(&class_object).map(|o| &o.kind) {
            Some(HeapKind::ClassObject(name)) => Ok(name.clone()),
            _ => Err(BridgeError::InvalidObjectId(class_object)),
        }
    }

    fn disable_collection(&mut self, object: ObjectId) -> Result<(), BridgeError> {
        if !self.heap.contains_key(&object) {
            return Err(BridgeError::InvalidObjectId(object));
        }
        if self.collection_control_fails {
            return Err(BridgeError::Other(format!("cannot disable collection of object {object}")));
        }
        self.disable_collection_calls.push(object);
        self.collection_disabled.insert(object);
        Ok(())
    }

    fn enable_collection(&mut self, object: ObjectId) -> Result<(), BridgeError> {
        if !self.heap.contains_key(&object) {
            return Err(BridgeError::InvalidObjectId(object));
        }
        self.enable_collection_calls.push(object);
        self.collection_disabled.remove(&object);
        Ok(())
    }

    fn install_interceptor(&mut self, kind: InterceptorKind) -> Result<InterceptorId, BridgeError> {
        if !self.interception_supported {
            return Err(BridgeError::NotImplemented);
        }
        match &mut self.install_budget {
            Some(0) => return Err(BridgeError::Other("interceptor limit reached".to_owned())),
            Some(left) => *left -= 1,
            None => {}
        }
        let id = self.next_interceptor_id;
        self.next_interceptor_id += 1;
        self.interceptors.insert(id, Interceptor { kind, enabled: true });
        Ok(id)
    }

    fn set_interceptor_enabled(&mut self, id: InterceptorId, enabled: bool) -> Result<(), BridgeError> {
        match self.interceptors.get_mut(&id) {
            Some(interceptor) => {
                interceptor.enabled = enabled;
                Ok(())
            }
            None => Err(BridgeError::Other(format!("unknown interceptor {id}"))),
        }
    }
}

impl ExecutionBridge for MockVm {
    fn frame(&mut self) -> Result<FrameInfo, BridgeError> {
        Ok(self.frame.clone())
    }

    fn loaded_classes(&mut self) -> Result<Vec<String>, BridgeError> {
        Ok(self.classes.keys().cloned().collect())
    }

    fn instances(&mut self, class: &str, max: usize) -> Result<Vec<ObjectRef>, BridgeError> {
        Ok(self
            .heap
            .iter()
            .filter(|(_, o)| o.runtime_type == class)
            .take(max)
            .map(|(id, o)| ObjectRef {
                id: *id,
                runtime_type: o.runtime_type.clone(),
            })
            .collect())
    }

    fn object_fields(&mut self, object: ObjectId) -> Result<Vec<(FieldInfo, Value)>, BridgeError> {
        let heap_object = self
            .heap
            .get(&object)
            .ok_or(BridgeError::InvalidObjectId(object))?;
        match &heap_object.kind {
            HeapKind::Instance(values) => {
                let fields = self.instance_fields(&heap_object.runtime_type);
                Ok(fields
                    .into_iter()
                    .filter_map(|f| values.get(&f.field_ref()).cloned().map(|v| (f, v)))
                    .collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn static_fields(&mut self, class: &str) -> Result<Vec<(FieldInfo, Value)>, BridgeError> {
        let info = self
            .classes
            .get(class)
            .ok_or_else(|| BridgeError::UnknownClass(class.to_owned()))?;
        Ok(info
            .fields
            .iter()
            .filter(|f| f.is_static())
            .filter_map(|f| self.statics.get(&f.field_ref()).map(|v| (f.clone(), v.clone())))
            .collect())
    }

    fn set_field_value(&mut self, object: Option<ObjectId>, field: &FieldRef, value: &Value) -> Result<(), BridgeError> {
        self.store_field(object, field, value.clone())
    }

    fn set_array_values(&mut self, array: ObjectId, values: &[Value]) -> Result<(), BridgeError> {
        match self.heap.get_mut(&array).map(|o| &mut o.kind) {
            Some(HeapKind::Array(current)) => {
                if values.len() > current.len() {
                    return Err(BridgeError::Other(format!(
                        "array {array} has length {}, cannot store {} values",
                        current.len(),
                        values.len()
                    )));
                }
                current[..values.len()].clone_from_slice(values);
                Ok(())
            }
            _ => Err(BridgeError::InvalidObjectId(array)),
        }
    }

    fn set_local(&mut self, name: &str, value: &Value) -> Result<(), BridgeError> {
        let local = self
            .frame
            .locals
            .iter_mut()
            .find(|l| l.name == name)
            .ok_or_else(|| BridgeError::UnknownLocal(name.to_owned()))?;
        local.value = value.clone();
        Ok(())
    }

    fn new_string(&mut self, value: &str) -> Result<Value, BridgeError> {
        Ok(self.alloc_string(value))
    }

    fn evaluate(&mut self, request: BatchRequest, done: EvaluationCallback) -> Result<(), BridgeError> {
        self.batch_sizes.push(request.slots.len());
        let outcome: BatchOutcome = self.run_batch(&request);
        tracing::trace!(
            target: "nova.synth.bridge",
            slots = request.slots.len(),
            ?outcome,
            "mock batch finished"
        );
        done(Ok(outcome));
        Ok(())
    }

    fn interrupter(&mut self) -> Result<Arc<dyn ThreadInterrupter>, BridgeError> {
        Ok(self.interrupter.clone())
    }

    fn suspend_thread(&mut self, _thread: ThreadId) -> Result<(), BridgeError> {
        Ok(())
    }

    fn resume_thread(&mut self, _thread: ThreadId) -> Result<(), BridgeError> {
        Ok(())
    }

    fn stop_thread(&mut self, thread: ThreadId, exception_class: &str) -> Result<(), BridgeError> {
        self.stopped_threads.push((thread, exception_class.to_owned()));
        self.interrupter.raise(exception_class)
    }

    fn remove_interceptor(&mut self, id: InterceptorId) -> Result<(), BridgeError> {
        self.removed_interceptors.push(id);
        self.interceptors
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| BridgeError::Other(format!("unknown interceptor {id}")))
    }

    fn set_listener(&mut self, listener: Option<Arc<dyn InterceptListener>>) {
        self.listener = listener;
    }

    fn supports_interception(&self) -> bool {
        self.interception_supported
    }

    fn windows(&mut self) -> Result<Vec<ObjectId>, BridgeError> {
        Ok(self.windows.clone())
    }

    fn dispose_window(&mut self, window: ObjectId) -> Result<(), BridgeError> {
        self.windows.retain(|w| *w != window);
        self.disposed_windows.push(window);
        Ok(())
    }

    fn set_sandbox_enabled(&mut self, enabled: bool) -> Result<(), BridgeError> {
        self.sandbox_transitions.push(enabled);
        Ok(())
    }
}

#[cfg(test)]
mod tests;
