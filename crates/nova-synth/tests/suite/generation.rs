use std::collections::BTreeSet;

use nova_synth::generator::ExpressionGenerator;
use nova_synth::uniqueness::is_unique;
use nova_synth::{CancellationToken, ExprArena, ExprId, TypeConstraint, TypeStore};
use nova_synth_bridge::mock::MockVm;
use nova_synth_bridge::{ClassInfo, ExecutionBridge, Modifiers, Type, Value};
use nova_synth_config::DenylistConfig;
use proptest::prelude::*;

fn generate(vm: &mut MockVm, arena: &mut ExprArena, constraint: &TypeConstraint, depth: u32) -> Vec<ExprId> {
    let frame = vm.frame().unwrap();
    let store = TypeStore::load(vm, &frame).unwrap();
    let denylist = DenylistConfig::default();
    let cancel = CancellationToken::new();
    ExpressionGenerator::new(arena, vm, &store, &frame, &denylist, &cancel)
        .generate(constraint, None, depth)
        .unwrap()
}

fn texts(arena: &ExprArena, ids: &[ExprId]) -> BTreeSet<String> {
    ids.iter().map(|id| arena.text(*id).to_owned()).collect()
}

fn int_scope(locals: &[(&str, i32)]) -> MockVm {
    let mut vm = MockVm::new();
    for (name, value) in locals {
        vm.add_local(name, Type::int(), Value::Int(*value));
    }
    vm
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn depth_and_uniqueness_hold_for_every_candidate(
        x in -3i32..4,
        y in -3i32..4,
        flag in any::<bool>(),
        depth in 0u32..3,
    ) {
        let mut vm = int_scope(&[("x", x), ("y", y)]);
        vm.add_local("flag", Type::boolean(), Value::Boolean(flag));
        let mut arena = ExprArena::new();
        let ids = generate(&mut vm, &mut arena, &TypeConstraint::Unconstrained, depth);

        prop_assert!(!ids.is_empty());
        for id in &ids {
            prop_assert_eq!(arena.structural_depth(*id), arena.depth(*id), "{}", arena.text(*id));
            prop_assert!(arena.depth(*id) <= depth);
            prop_assert!(is_unique(&arena, *id), "{}", arena.text(*id));
        }
        prop_assert!(ids.iter().any(|id| arena.depth(*id) == depth));
        prop_assert_eq!(texts(&arena, &ids).len(), ids.len());
    }
}

#[test]
fn sums_are_generated_once_per_operand_pair() {
    let mut vm = int_scope(&[("x", 2), ("y", 3)]);
    let mut arena = ExprArena::new();
    let ids = generate(&mut vm, &mut arena, &TypeConstraint::SupertypeBound(Type::int()), 1);
    let texts = texts(&arena, &ids);

    assert!(texts.contains("x + y"));
    assert!(!texts.contains("y + x"));
    assert!(!texts.contains("x + x"));
    assert!(texts.contains("x - y") && texts.contains("y - x"));
    assert!(texts.contains("x + 1") && texts.contains("-x"));
    assert!(!texts.iter().any(|t| t == "x < y"));
}

#[test]
fn known_zero_divisors_are_skipped() {
    let mut vm = int_scope(&[("x", 3), ("z", 0)]);
    let mut arena = ExprArena::new();
    let ids = generate(&mut vm, &mut arena, &TypeConstraint::SupertypeBound(Type::int()), 1);
    let texts = texts(&arena, &ids);

    assert!(!texts.contains("x / z"));
    assert!(texts.contains("z / x"));
}

#[test]
fn folded_values_are_recorded_on_candidates() {
    let mut vm = int_scope(&[("x", 2), ("y", 3)]);
    let mut arena = ExprArena::new();
    let ids = generate(&mut vm, &mut arena, &TypeConstraint::SupertypeBound(Type::int()), 1);
    let sum = ids
        .iter()
        .copied()
        .find(|id| arena.text(*id) == "x + y")
        .unwrap();

    assert_eq!(arena.value(sum), Some(&Value::Int(5)));
}

#[test]
fn boolean_targets_get_comparisons_and_no_arithmetic() {
    let mut vm = int_scope(&[("x", 2), ("y", 3)]);
    let mut arena = ExprArena::new();
    let ids = generate(&mut vm, &mut arena, &TypeConstraint::SupertypeBound(Type::boolean()), 1);
    let texts = texts(&arena, &ids);

    assert!(texts.contains("x < y"));
    assert!(texts.contains("x == y"));
    assert!(!texts.contains("x + y"));
    assert!(ids.iter().all(|id| arena.ty(*id).is_boolean()));
}

#[test]
fn list_receivers_offer_their_methods() {
    let mut vm = MockVm::new();
    let list = vm.new_array_list(vec![Value::Int(1)]).unwrap();
    vm.add_local("items", Type::class("java.util.List"), list);
    let mut arena = ExprArena::new();
    let ids = generate(&mut vm, &mut arena, &TypeConstraint::SupertypeBound(Type::int()), 1);
    let texts = texts(&arena, &ids);

    assert!(texts.contains("items.size()"), "{texts:?}");
}

#[test]
fn instance_frames_reach_own_fields_but_not_synthetic_members() {
    let mut vm = MockVm::new();
    vm.define_class(
        ClassInfo::new("Main")
            .field("count", Type::int(), Modifiers::PRIVATE)
            .field("this$0", Type::int(), Modifiers::PRIVATE.with_synthetic())
            .method("total", Vec::new(), Type::int(), Modifiers::PRIVATE)
            .method("access$000", Vec::new(), Type::int(), Modifiers::PRIVATE.with_static().with_synthetic())
            .method("run", Vec::new(), Type::int(), Modifiers::PUBLIC),
    );
    let main = vm.new_object("Main").unwrap();
    vm.set_field(&main, "count", Value::Int(4)).unwrap();
    vm.set_this(main);
    vm.set_frame_type("Main", "run");
    let mut arena = ExprArena::new();
    let ids = generate(&mut vm, &mut arena, &TypeConstraint::SupertypeBound(Type::int()), 1);
    let texts = texts(&arena, &ids);

    assert!(texts.contains("count"), "{texts:?}");
    assert!(texts.contains("total()"), "{texts:?}");
    // The method being executed is never called again.
    assert!(!texts.contains("run()"));
    assert!(!texts.iter().any(|t| t.contains('$')), "{texts:?}");

    let count = ids.iter().copied().find(|id| arena.text(*id) == "count").unwrap();
    assert_eq!(arena.value(count), Some(&Value::Int(4)));
}
