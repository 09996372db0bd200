use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::*;
use crate::{BatchSlot, Binding, BindingInit, Heartbeat, Modifiers, SlotResult};

fn run(vm: &mut MockVm, result_type: Type, expressions: &[&str]) -> BatchOutcome {
    let request = BatchRequest {
        frame: 1,
        result_type,
        bindings: Vec::new(),
        slots: expressions
            .iter()
            .map(|e| BatchSlot {
                guard: None,
                expression: (*e).to_owned(),
                validity: "true".to_owned(),
            })
            .collect(),
        source: String::new(),
        heartbeat: Heartbeat::new(),
    };
    let result = Arc::new(Mutex::new(None));
    let sink = result.clone();
    vm.evaluate(request, Box::new(move |outcome| *sink.lock() = Some(outcome)))
        .unwrap();
    let outcome = result.lock().take();
    outcome.unwrap().unwrap()
}

fn values(outcome: BatchOutcome) -> Vec<Value> {
    match outcome {
        BatchOutcome::Completed(slots) => slots.into_iter().filter_map(|s| s.value).collect(),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[test]
fn evaluates_arithmetic_and_locals() {
    let mut vm = MockVm::new();
    vm.add_local("x", Type::int(), Value::Int(3));
    vm.add_local("y", Type::int(), Value::Int(4));
    let out = values(run(&mut vm, Type::int(), &["x + y", "x * y - 1", "y / x", "y % x", "-x"]));
    assert_eq!(
        out,
        vec![Value::Int(7), Value::Int(11), Value::Int(1), Value::Int(1), Value::Int(-3)]
    );
}

#[test]
fn division_by_zero_throws() {
    let mut vm = MockVm::new();
    vm.add_local("x", Type::int(), Value::Int(0));
    let outcome = run(&mut vm, Type::int(), &["1 / x"]);
    assert_eq!(
        outcome,
        BatchOutcome::Threw {
            exception_class: "java.lang.ArithmeticException".to_owned(),
            message: Some("/ by zero".to_owned()),
        }
    );
}

#[test]
fn unknown_names_fail_to_compile() {
    let mut vm = MockVm::new();
    let outcome = run(&mut vm, Type::int(), &["nope + 1"]);
    assert_eq!(
        outcome,
        BatchOutcome::CompileError("nope cannot be resolved to a variable".to_owned())
    );
}

#[test]
fn arrays_and_bounds() {
    let mut vm = MockVm::new();
    let arr = vm.new_array(Type::int(), vec![Value::Int(5), Value::Int(6)]);
    vm.add_local("a", Type::array_of(Type::int()), arr);
    assert_eq!(values(run(&mut vm, Type::int(), &["a[1]", "a.length"])), vec![Value::Int(6), Value::Int(2)]);
    match run(&mut vm, Type::int(), &["a[2]"]) {
        BatchOutcome::Threw { exception_class, .. } => {
            assert_eq!(exception_class, "java.lang.ArrayIndexOutOfBoundsException")
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn strings_and_method_calls() {
    let mut vm = MockVm::new();
    let s = vm.alloc_string("hello");
    vm.add_local("s", Type::string(), s);
    let out = values(run(&mut vm, Type::int(), &["s.length()"]));
    assert_eq!(out, vec![Value::Int(5)]);
    let out = run(&mut vm, Type::string(), &["s + 1"]);
    let value = values(out).remove(0);
    assert_eq!(vm.string(&value).as_deref(), Some("hello1"));
    let out = values(run(&mut vm, Type::boolean(), &["\"hello\".equals(s)", "s == null"]));
    assert_eq!(out, vec![Value::Boolean(true), Value::Boolean(false)]);
}

#[test]
fn validity_sees_current_value() {
    let mut vm = MockVm::new();
    vm.add_local("x", Type::int(), Value::Int(2));
    let request = BatchRequest {
        frame: 1,
        result_type: Type::int(),
        bindings: vec![Binding {
            name: "k".to_owned(),
            ty: Type::int(),
            init: BindingInit::Expression("x * 10".to_owned()),
        }],
        slots: vec![
            BatchSlot {
                guard: None,
                expression: "x + 1".to_owned(),
                validity: "_$curValue == 3".to_owned(),
            },
            BatchSlot {
                guard: Some("x > 5".to_owned()),
                expression: "1 / 0".to_owned(),
                validity: "true".to_owned(),
            },
            BatchSlot {
                guard: None,
                expression: "k".to_owned(),
                validity: "_$curValue == 3".to_owned(),
            },
        ],
        source: String::new(),
        heartbeat: Heartbeat::new(),
    };
    let heartbeat = request.heartbeat.clone();
    let result = Arc::new(Mutex::new(None));
    let sink = result.clone();
    vm.evaluate(request, Box::new(move |outcome| *sink.lock() = Some(outcome)))
        .unwrap();
    let outcome = result.lock().take().unwrap().unwrap();
    assert_eq!(
        outcome,
        BatchOutcome::Completed(vec![
            SlotResult {
                value: Some(Value::Int(3)),
                valid: true
            },
            SlotResult {
                value: None,
                valid: false
            },
            SlotResult {
                value: Some(Value::Int(20)),
                valid: false
            },
        ])
    );
    assert_eq!(heartbeat.count(), 3);
    assert_eq!(vm.batch_sizes, vec![3]);
}

struct Recorder(Mutex<Vec<InterceptEvent>>);

impl InterceptListener for Recorder {
    fn on_event(&self, event: &InterceptEvent, _cx: &mut dyn EventContext) {
        self.0.lock().push(event.clone());
    }
}

fn counter_class() -> ClassInfo {
    ClassInfo::new("Counter")
        .field("count", Type::int(), Modifiers::PUBLIC)
        .method("bump", Vec::new(), Type::Void, Modifiers::PUBLIC)
}

#[test]
fn field_watchpoints_report_accesses_and_modifications() {
    let mut vm = MockVm::new();
    vm.define_class(counter_class());
    vm.define_native("Counter", "bump", 0, |vm, receiver, _| {
        let this = receiver.ok_or_else(Thrown::null_pointer)?;
        let count = vm.read_field(this, "count")?;
        let next = Value::Int(count.as_i64().unwrap_or_default() as i32 + 1);
        vm.write_field(this, "count", next)?;
        Ok(Value::Void)
    });
    let counter = vm.new_object("Counter").unwrap();
    vm.add_local("c", Type::class("Counter"), counter.clone());

    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    vm.set_listener(Some(recorder.clone()));
    let id = vm
        .install_interceptor(InterceptorKind::Field {
            field: FieldRef::new("Counter", "count"),
            instance: None,
            access: true,
            modification: true,
        })
        .unwrap();

    run(&mut vm, Type::Void, &["c.bump()"]);
    let events = recorder.0.lock().clone();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], InterceptEvent::FieldAccess { interceptor, .. } if *interceptor == id));
    match &events[1] {
        InterceptEvent::FieldModification { current, to_be, in_static_initializer, .. } => {
            assert_eq!(current, &Value::Int(0));
            assert_eq!(to_be, &Value::Int(1));
            assert!(!in_static_initializer);
        }
        other => panic!("{other:?}"),
    }
    assert_eq!(vm.get_field(&counter, "count").unwrap(), Value::Int(1));

    vm.set_interceptor_enabled(id, false).unwrap();
    run(&mut vm, Type::Void, &["c.bump()"]);
    assert_eq!(recorder.0.lock().len(), 2);

    vm.remove_interceptor(id).unwrap();
    assert_eq!(vm.removed_interceptors, vec![id]);
    assert_eq!(vm.interceptor_count(), 0);
}

#[test]
fn reflective_writes_skip_watchpoints_but_hit_method_entry() {
    let mut vm = MockVm::new();
    vm.define_class(counter_class());
    let counter = vm.new_object("Counter").unwrap();
    let field = vm.reflect_field("Counter", "count").unwrap();
    vm.add_local("c", Type::class("Counter"), counter.clone());
    vm.add_local("f", Type::class(REFLECT_FIELD), field);

    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    vm.set_listener(Some(recorder.clone()));
    vm.install_interceptor(InterceptorKind::Field {
        field: FieldRef::new("Counter", "count"),
        instance: None,
        access: false,
        modification: true,
    })
    .unwrap();
    vm.install_interceptor(InterceptorKind::MethodEntry {
        class: REFLECT_FIELD.to_owned(),
        method: "setInt".to_owned(),
    })
    .unwrap();

    run(&mut vm, Type::Void, &["f.setInt(c, 9)"]);
    let events = recorder.0.lock().clone();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], InterceptEvent::MethodEntry { method, args, .. }
        if method == "setInt" && args[1] == Value::Int(9)));
    assert_eq!(vm.get_field(&counter, "count").unwrap(), Value::Int(9));
}

#[test]
fn class_prepare_fires_for_late_loads() {
    let mut vm = MockVm::new();
    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    vm.set_listener(Some(recorder.clone()));
    vm.install_interceptor(InterceptorKind::ClassPrepare).unwrap();
    vm.define_class(counter_class());
    assert!(matches!(&recorder.0.lock()[..], [InterceptEvent::ClassPrepare { class, .. }] if class == "Counter"));
}

#[test]
fn interrupter_aborts_the_next_step() {
    let mut vm = MockVm::new();
    vm.add_local("x", Type::int(), Value::Int(1));
    vm.interrupter().unwrap().raise(crate::TIMEOUT_SENTINEL).unwrap();
    match run(&mut vm, Type::int(), &["x + 1"]) {
        BatchOutcome::Threw { exception_class, .. } => {
            assert_eq!(exception_class, crate::TIMEOUT_SENTINEL)
        }
        other => panic!("{other:?}"),
    }
    assert_eq!(values(run(&mut vm, Type::int(), &["x + 1"])), vec![Value::Int(2)]);
}

#[test]
fn array_list_natives() {
    let mut vm = MockVm::new();
    let one = vm.new_integer(1).unwrap();
    let list = vm.new_array_list(vec![one.clone()]).unwrap();
    vm.add_local("l", Type::class(LIST), list.clone());
    vm.add_local("o", Type::object(), one.clone());
    assert_eq!(values(run(&mut vm, Type::int(), &["l.size()"])), vec![Value::Int(1)]);
    run(&mut vm, Type::boolean(), &["l.add(o)", "l.add(o)", "l.add(o)", "l.add(o)"]);
    assert_eq!(vm.get_field(&list, "size").unwrap(), Value::Int(5));
    assert_eq!(values(run(&mut vm, Type::object(), &["l.get(4)"])), vec![one]);
}

#[test]
fn casts_and_instanceof() {
    let mut vm = MockVm::new();
    let list = vm.new_array_list(Vec::new()).unwrap();
    vm.add_local("o", Type::object(), list);
    vm.add_local("d", Type::double(), Value::Double(2.75));
    let out = values(run(
        &mut vm,
        Type::boolean(),
        &["o instanceof java.util.List", "o instanceof String", "(int) d == 2"],
    ));
    assert_eq!(out, vec![Value::Boolean(true), Value::Boolean(false), Value::Boolean(true)]);
    match run(&mut vm, Type::string(), &["(String) o"]) {
        BatchOutcome::Threw { exception_class, .. } => {
            assert_eq!(exception_class, "java.lang.ClassCastException")
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn gc_pinning_is_logged() {
    let mut vm = MockVm::new();
    let arr = vm.new_array(Type::int(), vec![Value::Int(1)]);
    let id = arr.object_id().unwrap();
    vm.disable_collection(id).unwrap();
    assert!(vm.is_collection_disabled(id));
    vm.enable_collection(id).unwrap();
    assert!(!vm.is_collection_disabled(id));
    assert_eq!(vm.disable_collection_calls, vec![id]);
    assert_eq!(vm.enable_collection_calls, vec![id]);
}
