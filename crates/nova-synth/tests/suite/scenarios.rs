use nova_synth::{
    CancellationToken, Effect, LVal, LambdaProperty, RVal, StateProperty, SynthError, Synthesis,
    SynthesisRequest, Synthesizer, TypeProperty, ValueProperty,
};
use nova_synth_bridge::mock::MockVm;
use nova_synth_bridge::{ClassInfo, ExecutionBridge, FieldRef, Modifiers, Type, Value};
use nova_synth_config::SynthConfig;
use pretty_assertions::assert_eq;

fn two_and_three() -> Synthesizer<MockVm> {
    let mut vm = MockVm::new();
    vm.add_local("x", Type::int(), Value::Int(2));
    vm.add_local("y", Type::int(), Value::Int(3));
    Synthesizer::new(SynthConfig::default(), vm)
}

/// A `Counter` local `c` whose `bump()` adds two to `count`, which starts at 5.
fn counter_scope() -> (Synthesizer<MockVm>, Value) {
    let mut vm = MockVm::new();
    vm.define_class(
        ClassInfo::new("Counter")
            .field("count", Type::int(), Modifiers::PRIVATE)
            .method("bump", Vec::new(), Type::int(), Modifiers::PUBLIC),
    );
    vm.define_native("Counter", "bump", 0, |vm, receiver, _| {
        let counter = receiver.cloned().unwrap_or(Value::Null);
        let count = vm.read_field(&counter, "count")?.as_i64().unwrap_or_default() as i32;
        vm.write_field(&counter, "count", Value::Int(count + 2))?;
        Ok(Value::Int(count + 2))
    });
    let counter = vm.new_object("Counter").unwrap();
    vm.set_field(&counter, "count", Value::Int(5)).unwrap();
    vm.add_local("c", Type::class("Counter"), counter.clone());
    (Synthesizer::new(SynthConfig::default(), vm), counter)
}

#[test]
fn demonstrated_five_finds_the_sum() {
    let mut synthesizer = two_and_three();
    let synthesis = synthesizer
        .synthesize(SynthesisRequest::new(ValueProperty::primitive(Value::Int(5))).static_type(Type::int()))
        .unwrap();

    assert_eq!(synthesis.expressions().collect::<Vec<_>>(), vec!["x + y"]);
    assert_eq!(synthesis.results[0].value, Value::Int(5));
    assert!(synthesis.results[0].effects.is_empty());
    assert!(synthesis.evaluated > 1);
}

#[test]
fn same_request_same_answer() {
    let mut synthesizer = two_and_three();
    let request = || SynthesisRequest::new(TypeProperty::new(Type::int())).max_depth(1);
    let first: Synthesis = synthesizer.synthesize(request()).unwrap();
    let second: Synthesis = synthesizer.synthesize(request()).unwrap();

    assert!(first.results.len() > 5);
    assert_eq!(first, second);
}

#[test]
fn lambda_predicates_filter_values() {
    let mut synthesizer = two_and_three();
    let property = LambdaProperty::parse("v => v > 4").unwrap();
    let synthesis = synthesizer
        .synthesize(SynthesisRequest::new(property).static_type(Type::int()))
        .unwrap();

    let expressions: Vec<&str> = synthesis.expressions().collect();
    assert!(expressions.contains(&"x + y"));
    assert!(expressions.contains(&"x * y"));
    assert!(!expressions.contains(&"x - y"));
    assert!(synthesis
        .results
        .iter()
        .all(|r| r.value.as_i64().is_some_and(|v| v > 4)));
}

#[test]
fn state_predicates_see_the_old_value() {
    let mut synthesizer = two_and_three();
    let frame = synthesizer.bridge_mut().frame().unwrap();
    let property = StateProperty::parse("x", "x' == x + y", &frame).unwrap();
    let synthesis = synthesizer
        .synthesize(SynthesisRequest::new(property).static_type(Type::int()))
        .unwrap();

    assert_eq!(synthesis.expressions().collect::<Vec<_>>(), vec!["x + y"]);
}

#[test]
fn size_hole_is_filled_with_the_list() {
    let mut vm = MockVm::new();
    let list = vm.new_array_list(Vec::new()).unwrap();
    vm.add_local("list", Type::class("java.util.List"), list);
    let mut synthesizer = Synthesizer::new(SynthConfig::default(), vm);

    let synthesis = synthesizer
        .synthesize(SynthesisRequest::new(TypeProperty::new(Type::boolean())).skeleton("??.size() == 0"))
        .unwrap();

    let result = synthesis
        .results
        .iter()
        .find(|r| r.expression == "list.size() == 0")
        .unwrap();
    assert_eq!(result.value, Value::Boolean(true));
    assert_eq!(result.ty, Type::boolean());
}

#[test]
fn mutation_is_reported_then_reverted() {
    let (mut synthesizer, counter) = counter_scope();
    let synthesis = synthesizer
        .synthesize(SynthesisRequest::new(TypeProperty::new(Type::int())).skeleton("c.bump()"))
        .unwrap();

    assert_eq!(synthesis.results.len(), 1);
    let result = &synthesis.results[0];
    assert_eq!(result.expression, "c.bump()");
    assert_eq!(result.value, Value::Int(7));
    assert_eq!(
        result.effects,
        vec![Effect::new(
            LVal::field(counter.object_id(), FieldRef::new("Counter", "count")),
            RVal::Plain(Value::Int(5)),
            RVal::Plain(Value::Int(7)),
        )]
    );
    assert_eq!(synthesizer.bridge().get_field(&counter, "count").unwrap(), Value::Int(5));

    // Every hook installed for the request is gone again.
    assert_eq!(synthesizer.bridge().interceptor_count(), 0);

    synthesizer.commit(result).unwrap();
    assert_eq!(synthesizer.bridge().get_field(&counter, "count").unwrap(), Value::Int(7));
}

#[test]
fn illegal_skeletons_are_reported() {
    let mut synthesizer = two_and_three();
    let err = synthesizer
        .synthesize(SynthesisRequest::new(TypeProperty::new(Type::int())).skeleton("x??"))
        .unwrap_err();

    assert!(matches!(err, SynthError::Skeleton(_)));
    assert_eq!(
        err.to_string(),
        "You cannot put a ?? hole immediately after an identifier."
    );
}

/// `demo.Stats` (imported) with a static `total` of 1 that `bump()` increments.
fn stats_scope() -> MockVm {
    let mut vm = MockVm::new();
    vm.define_class(
        ClassInfo::new("demo.Stats")
            .field("total", Type::int(), Modifiers::PUBLIC.with_static())
            .method("bump", Vec::new(), Type::int(), Modifiers::PUBLIC.with_static()),
    );
    vm.define_native("demo.Stats", "bump", 0, |vm, _, _| {
        let total = vm.read_static("demo.Stats", "total")?.as_i64().unwrap_or_default() as i32 + 1;
        vm.write_static("demo.Stats", "total", Value::Int(total))?;
        Ok(Value::Int(total))
    });
    vm.set_static("demo.Stats", "total", Value::Int(1)).unwrap();
    vm.add_import("demo.Stats");
    vm
}

#[test]
fn static_writes_through_imported_classes_are_reverted() {
    let mut synthesizer = Synthesizer::new(SynthConfig::default(), stats_scope());
    let synthesis = synthesizer
        .synthesize(SynthesisRequest::new(TypeProperty::new(Type::int())).skeleton("Stats.bump()"))
        .unwrap();

    assert_eq!(synthesis.expressions().collect::<Vec<_>>(), vec!["Stats.bump()"]);
    assert_eq!(synthesis.results[0].value, Value::Int(2));
    assert_eq!(synthesis.results[0].effects.len(), 1);

    let vm = synthesizer.into_bridge();
    assert_eq!(vm.get_static("demo.Stats", "total").unwrap(), Value::Int(1));
}

#[test]
fn bridges_without_interception_still_synthesize() {
    let mut vm = stats_scope();
    vm.set_interception_supported(false);
    let mut synthesizer = Synthesizer::new(SynthConfig::default(), vm);
    let synthesis = synthesizer
        .synthesize(SynthesisRequest::new(TypeProperty::new(Type::int())).skeleton("Stats.bump()"))
        .unwrap();

    assert_eq!(synthesis.results.len(), 1);
    assert!(synthesis.results[0].effects.is_empty());
    // Nothing was watched, so nothing could be put back.
    assert_eq!(synthesizer.bridge().get_static("demo.Stats", "total").unwrap(), Value::Int(2));
}

#[test]
fn cancelled_requests_are_abandoned() {
    let mut synthesizer = two_and_three();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = synthesizer
        .synthesize(SynthesisRequest::new(TypeProperty::new(Type::int())).cancel_token(cancel))
        .unwrap_err();

    assert!(matches!(err, SynthError::Cancelled));
    assert!(synthesizer.bridge().batch_sizes.is_empty());
}

#[test]
fn failed_hook_setup_is_cleaned_up() {
    let (mut synthesizer, counter) = counter_scope();
    synthesizer.bridge_mut().fail_interceptor_installs_after(1);
    let err = synthesizer
        .synthesize(SynthesisRequest::new(TypeProperty::new(Type::int())).skeleton("c.bump()"))
        .unwrap_err();

    assert!(matches!(err, SynthError::Bridge(_)));
    let vm = synthesizer.bridge();
    assert_eq!(vm.interceptor_count(), 0);
    assert!(!vm.has_listener());
    assert_eq!(vm.get_field(&counter, "count").unwrap(), Value::Int(5));
}

/// A `Node` local `n` whose `left` and `right` both point at a second node.
fn linked_scope() -> (Synthesizer<MockVm>, Value, Value) {
    let mut vm = MockVm::new();
    vm.define_class(
        ClassInfo::new("Node")
            .field("size", Type::int(), Modifiers::PRIVATE)
            .field("left", Type::class("Node"), Modifiers::PRIVATE)
            .field("right", Type::class("Node"), Modifiers::PRIVATE)
            .method("relink", Vec::new(), Type::boolean(), Modifiers::PUBLIC)
            .method("prune", Vec::new(), Type::int(), Modifiers::PUBLIC),
    );
    // Unlinks both children, links the left one back and reports whether the child is still
    // kept from collection.
    vm.define_native("Node", "relink", 0, |vm, receiver, _| {
        let node = receiver.cloned().unwrap_or(Value::Null);
        let child = vm.read_field(&node, "left")?;
        vm.write_field(&node, "left", Value::Null)?;
        vm.write_field(&node, "right", Value::Null)?;
        vm.write_field(&node, "left", child.clone())?;
        Ok(Value::Boolean(
            child.object_id().is_some_and(|id| vm.is_collection_disabled(id)),
        ))
    });
    // Grows `size`, then drops `left` while the VM refuses to pin objects.
    vm.define_native("Node", "prune", 0, |vm, receiver, _| {
        let node = receiver.cloned().unwrap_or(Value::Null);
        vm.write_field(&node, "size", Value::Int(9))?;
        vm.fail_collection_control(true);
        vm.write_field(&node, "left", Value::Null)?;
        vm.fail_collection_control(false);
        Ok(Value::Int(9))
    });
    let node = vm.new_object("Node").unwrap();
    let child = vm.new_object("Node").unwrap();
    vm.set_field(&node, "size", Value::Int(1)).unwrap();
    vm.set_field(&node, "left", child.clone()).unwrap();
    vm.set_field(&node, "right", child.clone()).unwrap();
    vm.add_local("n", Type::class("Node"), node.clone());
    (Synthesizer::new(SynthConfig::default(), vm), node, child)
}

#[test]
fn objects_held_by_two_effects_stay_pinned_until_both_let_go() {
    let (mut synthesizer, node, child) = linked_scope();
    let synthesis = synthesizer
        .synthesize(SynthesisRequest::new(TypeProperty::new(Type::boolean())).skeleton("n.relink()"))
        .unwrap();

    assert_eq!(synthesis.results.len(), 1);
    assert_eq!(synthesis.results[0].value, Value::Boolean(true));
    assert_eq!(synthesis.results[0].effects.len(), 1);
    let vm = synthesizer.bridge();
    assert_eq!(vm.get_field(&node, "right").unwrap(), child);
    assert!(!vm.is_collection_disabled(child.object_id().unwrap()));
}

#[test]
fn recorded_effects_are_undone_when_tracking_fails_mid_batch() {
    let (mut synthesizer, node, _) = linked_scope();
    let err = synthesizer
        .synthesize(SynthesisRequest::new(TypeProperty::new(Type::int())).skeleton("n.prune()"))
        .unwrap_err();

    assert!(matches!(err, SynthError::Bridge(_)));
    let vm = synthesizer.bridge();
    assert_eq!(vm.get_field(&node, "size").unwrap(), Value::Int(1));
    assert_eq!(vm.interceptor_count(), 0);
}

#[test]
fn negation_holes_are_filled_with_booleans_only() {
    let mut vm = MockVm::new();
    vm.add_local("x", Type::int(), Value::Int(2));
    vm.add_local("done", Type::boolean(), Value::Boolean(false));
    let mut synthesizer = Synthesizer::new(SynthConfig::default(), vm);
    let property = LambdaProperty::parse("v => v").unwrap();
    let synthesis = synthesizer
        .synthesize(SynthesisRequest::new(property).skeleton("!??").max_depth(0))
        .unwrap();

    let expressions: Vec<&str> = synthesis.expressions().collect();
    assert!(expressions.contains(&"!done"));
    assert!(!expressions.contains(&"!x"));
    assert!(synthesis.results.iter().all(|r| r.ty == Type::boolean()));
}
