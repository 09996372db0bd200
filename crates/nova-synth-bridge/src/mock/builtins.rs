//! The slice of the Java class library the mock VM ships with.

use super::{MockVm, Thrown};
use crate::{ClassInfo, FieldRef, Modifiers, Type, Value, CONSTRUCTOR_NAME, OBJECT, STRING};

pub const INTEGER: &str = "java.lang.Integer";
pub const REFLECT_FIELD: &str = "java.lang.reflect.Field";
pub const LIST: &str = "java.util.List";
pub const ABSTRACT_LIST: &str = "java.util.AbstractList";
pub const ARRAY_LIST: &str = "java.util.ArrayList";

fn int_arg(args: &[Value], index: usize) -> Result<i32, Thrown> {
    args.get(index)
        .and_then(Value::as_i64)
        .map(|v| v as i32)
        .ok_or_else(|| Thrown::new("java.lang.IllegalArgumentException", "expected an int"))
}

fn this(receiver: Option<&Value>) -> Result<&Value, Thrown> {
    receiver.ok_or_else(Thrown::null_pointer)
}

pub(super) fn install(vm: &mut MockVm) {
    let public = Modifiers::PUBLIC;
    let private = Modifiers::PRIVATE;

    vm.define_class(
        ClassInfo::new(OBJECT)
            .constructor(Vec::new(), public)
            .method("hashCode", Vec::new(), Type::int(), public)
            .method("toString", Vec::new(), Type::string(), public)
            .method("equals", vec![Type::object()], Type::boolean(), public),
    );
    vm.define_native(OBJECT, "hashCode", 0, |_, receiver, _| {
        Ok(Value::Int(this(receiver)?.object_id().unwrap_or_default() as i32))
    });
    vm.define_native(OBJECT, "toString", 0, |vm, receiver, _| {
        let text = vm.display(this(receiver)?);
        Ok(vm.alloc_string(&text))
    });
    vm.define_native(OBJECT, "equals", 1, |_, receiver, args| {
        let other = args.first().and_then(Value::object_id);
        Ok(Value::Boolean(this(receiver)?.object_id() == other))
    });

    vm.define_class(
        ClassInfo::new(STRING)
            .method("length", Vec::new(), Type::int(), public)
            .method("isEmpty", Vec::new(), Type::boolean(), public)
            .method("charAt", vec![Type::int()], Type::Primitive(crate::PrimitiveType::Char), public)
            .method("equals", vec![Type::object()], Type::boolean(), public),
    );
    vm.define_native(STRING, "length", 0, |vm, receiver, _| {
        let s = vm.string(this(receiver)?).unwrap_or_default();
        Ok(Value::Int(s.chars().count() as i32))
    });
    vm.define_native(STRING, "isEmpty", 0, |vm, receiver, _| {
        Ok(Value::Boolean(vm.string(this(receiver)?).unwrap_or_default().is_empty()))
    });
    vm.define_native(STRING, "charAt", 1, |vm, receiver, args| {
        let s = vm.string(this(receiver)?).unwrap_or_default();
        let index = int_arg(args, 0)?;
        usize::try_from(index)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(Value::Char)
            .ok_or_else(|| {
                Thrown::new(
                    "java.lang.StringIndexOutOfBoundsException",
                    format!("index {index}, length {}", s.chars().count()),
                )
            })
    });
    vm.define_native(STRING, "equals", 1, |vm, receiver, args| {
        let lhs = vm.string(this(receiver)?);
        let rhs = args.first().and_then(|arg| vm.string(arg));
        Ok(Value::Boolean(lhs.is_some() && lhs == rhs))
    });

    vm.define_class(ClassInfo::new("java.lang.Class"));

    vm.define_class(
        ClassInfo::new(INTEGER)
            .field("value", Type::int(), private.with_final())
            .method("intValue", Vec::new(), Type::int(), public)
            .method("valueOf", vec![Type::int()], Type::class(INTEGER), public.with_static()),
    );
    vm.define_native(INTEGER, "intValue", 0, |vm, receiver, _| {
        vm.read_field(this(receiver)?, "value")
    });
    vm.define_native(INTEGER, "valueOf", 1, |vm, _, args| {
        let boxed = vm
            .new_object(INTEGER)
            .map_err(|err| Thrown::new("java.lang.InternalError", err.to_string()))?;
        vm.write_field(&boxed, "value", Value::Int(int_arg(args, 0)?))?;
        Ok(boxed)
    });

    install_reflection(vm);
    install_lists(vm);
}

/// Unboxes `java.lang.Integer` arguments of reflective setters.
fn unbox(vm: &mut MockVm, value: &Value) -> Result<Value, Thrown> {
    match value {
        Value::Object(obj) if obj.runtime_type == INTEGER => vm.read_field(value, "value"),
        other => Ok(other.clone()),
    }
}

fn reflected_field(vm: &mut MockVm, field: &Value) -> Result<FieldRef, Thrown> {
    let clazz = vm.read_field(field, "clazz")?;
    let name = vm.read_field(field, "name")?;
    let declaring = match clazz.object_id() {
        Some(id) => crate::EventContext::reflected_type(vm, id)
            .map_err(|err| Thrown::new("java.lang.InternalError", err.to_string()))?,
        None => return Err(Thrown::null_pointer()),
    };
    let name = vm.string(&name).ok_or_else(Thrown::null_pointer)?;
    Ok(FieldRef::new(declaring, name))
}

/// `Field.set*` store into `target` (ignored for static fields).
fn reflective_target(vm: &MockVm, field: &FieldRef, target: Option<&Value>) -> Option<Value> {
    let is_static = vm
        .classes
        .get(&field.declaring)
        .and_then(|c| c.declared_field(&field.name))
        .is_some_and(|f| f.is_static());
    if is_static {
        None
    } else {
        target.cloned()
    }
}

fn install_reflection(vm: &mut MockVm) {
    let public = Modifiers::PUBLIC;
    let private = Modifiers::PRIVATE;
    vm.define_class(
        ClassInfo::new(REFLECT_FIELD)
            .field("clazz", Type::class("java.lang.Class"), private.with_final())
            .field("name", Type::string(), private.with_final())
            .method("set", vec![Type::object(), Type::object()], Type::Void, public)
            .method("setInt", vec![Type::object(), Type::int()], Type::Void, public)
            .method("get", vec![Type::object()], Type::object(), public),
    );
    for setter in ["set", "setInt"] {
        vm.define_native(REFLECT_FIELD, setter, 2, |vm, receiver, args| {
            let field = reflected_field(vm, this(receiver)?)?;
            let value = unbox(vm, args.get(1).unwrap_or(&Value::Null))?;
            let target = reflective_target(vm, &field, args.first());
            vm.write_field_unwatched(target.as_ref(), &field, value)?;
            Ok(Value::Void)
        });
    }
    vm.define_native(REFLECT_FIELD, "get", 1, |vm, receiver, args| {
        let field = reflected_field(vm, this(receiver)?)?;
        let target = reflective_target(vm, &field, args.first());
        vm.read_field_unwatched(target.as_ref(), &field)
    });
}

fn install_lists(vm: &mut MockVm) {
    let public = Modifiers::PUBLIC;
    let private = Modifiers::PRIVATE;
    vm.define_class(
        ClassInfo::interface(LIST)
            .method("size", Vec::new(), Type::int(), public)
            .method("get", vec![Type::int()], Type::object(), public)
            .method("isEmpty", Vec::new(), Type::boolean(), public)
            .method("add", vec![Type::object()], Type::boolean(), public),
    );
    vm.define_class(
        ClassInfo::new(ABSTRACT_LIST)
            .implements(LIST)
            .field("modCount", Type::int(), private),
    );
    vm.define_class(
        ClassInfo::new(ARRAY_LIST)
            .extends(ABSTRACT_LIST)
            .field("elementData", Type::array_of(Type::object()), private)
            .field("size", Type::int(), private)
            .constructor(Vec::new(), public)
            .method("size", Vec::new(), Type::int(), public)
            .method("get", vec![Type::int()], Type::object(), public)
            .method("isEmpty", Vec::new(), Type::boolean(), public)
            .method("add", vec![Type::object()], Type::boolean(), public),
    );
    vm.define_native(ARRAY_LIST, CONSTRUCTOR_NAME, 0, |vm, receiver, _| {
        let data = vm.new_array(Type::object(), vec![Value::Null; 4]);
        vm.write_field(this(receiver)?, "elementData", data)?;
        Ok(Value::Void)
    });
    vm.define_native(ARRAY_LIST, "size", 0, |vm, receiver, _| {
        vm.read_field(this(receiver)?, "size")
    });
    vm.define_native(ARRAY_LIST, "isEmpty", 0, |vm, receiver, _| {
        let size = vm.read_field(this(receiver)?, "size")?;
        Ok(Value::Boolean(size == Value::Int(0)))
    });
    vm.define_native(ARRAY_LIST, "get", 1, |vm, receiver, args| {
        let list = this(receiver)?.clone();
        let index = int_arg(args, 0)?;
        let size = vm.read_field(&list, "size")?.as_i64().unwrap_or_default() as i32;
        if index < 0 || index >= size {
            return Err(Thrown::new(
                "java.lang.IndexOutOfBoundsException",
                format!("Index {index} out of bounds for length {size}"),
            ));
        }
        let data = vm.read_field(&list, "elementData")?;
        vm.array_get(&data, index)
    });
    vm.define_native(ARRAY_LIST, "add", 1, |vm, receiver, args| {
        let list = this(receiver)?.clone();
        let element = args.first().cloned().unwrap_or(Value::Null);
        let size = vm.read_field(&list, "size")?.as_i64().unwrap_or_default() as i32;
        let mut data = vm.read_field(&list, "elementData")?;
        if size >= vm.array_length(&data)? {
            let mut grown = vm.array(&data).unwrap_or_default();
            grown.resize(grown.len().max(2) * 2, Value::Null);
            data = vm.new_array(Type::object(), grown);
            vm.write_field(&list, "elementData", data.clone())?;
        }
        vm.array_set(&data, size, element)?;
        vm.write_field(&list, "size", Value::Int(size + 1))?;
        let mod_count = vm.read_field(&list, "modCount")?.as_i64().unwrap_or_default() as i32;
        vm.write_field(&list, "modCount", Value::Int(mod_count.wrapping_add(1)))?;
        Ok(Value::Boolean(true))
    });
}

impl MockVm {
    /// A `java.lang.reflect.Field` naming `class.name`.
    pub fn reflect_field(&mut self, class: &str, name: &str) -> Result<Value, crate::BridgeError> {
        let field = self.new_object(REFLECT_FIELD)?;
        let clazz = self.class_object(class);
        let name = self.alloc_string(name);
        self.set_field(&field, "clazz", clazz)?;
        self.set_field(&field, "name", name)?;
        Ok(field)
    }

    /// An `ArrayList` holding `values`, built without firing any events.
    pub fn new_array_list(&mut self, values: Vec<Value>) -> Result<Value, crate::BridgeError> {
        let list = self.new_object(ARRAY_LIST)?;
        let size = values.len() as i32;
        let mut data = values;
        data.resize(data.len().max(4), Value::Null);
        let data = self.new_array(Type::object(), data);
        self.set_field(&list, "elementData", data)?;
        self.set_field(&list, "size", Value::Int(size))?;
        Ok(list)
    }

    pub fn new_integer(&mut self, value: i32) -> Result<Value, crate::BridgeError> {
        let boxed = self.new_object(INTEGER)?;
        self.set_field(&boxed, "value", Value::Int(value))?;
        Ok(boxed)
    }
}
