use std::time::Duration;

use nova_synth::{
    CancellationToken, CandidateOutcome, EvaluationManager, ExprArena, ExprId, LambdaProperty,
    Property, SynthError, ValueProperty,
};
use nova_synth_bridge::mock::{MockVm, Thrown};
use nova_synth_bridge::{ClassInfo, ExecutionBridge, MethodInfo, Modifiers, Type, Value};
use nova_synth_config::EvaluationConfig;
use nova_synth_syntax::ast::BinaryOp;
use pretty_assertions::assert_eq;

fn static_method(name: &str, params: Vec<Type>) -> MethodInfo {
    MethodInfo::new("Main", name, params, Type::int(), Modifiers::PUBLIC.with_static())
}

/// `Main` with static helpers `ok(int)`, `boom(int)` and `spin()`.
fn vm_with_helpers() -> MockVm {
    let mut vm = MockVm::new();
    vm.define_class(
        ClassInfo::new("Main")
            .method("ok", vec![Type::int()], Type::int(), Modifiers::PUBLIC.with_static())
            .method("boom", vec![Type::int()], Type::int(), Modifiers::PUBLIC.with_static())
            .method("spin", Vec::new(), Type::int(), Modifiers::PUBLIC.with_static()),
    );
    vm.define_native("Main", "ok", 1, |_, _, args| Ok(args[0].clone()));
    vm.define_native("Main", "boom", 1, |_, _, _| {
        Err(Thrown::new("java.lang.IllegalStateException", "boom"))
    });
    vm.define_native("Main", "spin", 0, |vm, _, _| {
        vm.open_window();
        loop {
            vm.check_interrupt()?;
            std::thread::sleep(Duration::from_millis(1));
        }
    });
    vm
}

fn call(arena: &mut ExprArena, name: &str, args: &[i32]) -> ExprId {
    let receiver = arena.static_name(Type::class("Main"), "Main");
    let args: Vec<ExprId> = args.iter().map(|v| arena.int_literal(*v)).collect();
    let params = vec![Type::int(); args.len()];
    arena.method_call(receiver, static_method(name, params), args, true)
}

fn small_batches() -> EvaluationConfig {
    EvaluationConfig {
        batch_size: 2,
        min_num_batches: 1,
        ..EvaluationConfig::default()
    }
}

#[test]
fn one_throwing_candidate_is_isolated_wherever_it_sits() {
    for position in 0..5 {
        let mut vm = vm_with_helpers();
        let frame = vm.frame().unwrap();
        let mut arena = ExprArena::new();
        let candidates: Vec<ExprId> = (0..5)
            .map(|i| {
                let name = if i == position { "boom" } else { "ok" };
                call(&mut arena, name, &[i])
            })
            .collect();

        let config = small_batches();
        let cancel = CancellationToken::new();
        let evaluations = EvaluationManager::new(&mut vm, &config, &frame, None, &cancel)
            .evaluate(&arena, &candidates, None)
            .unwrap();

        let outcomes: Vec<CandidateOutcome> = evaluations.into_iter().map(|e| e.outcome).collect();
        let expected: Vec<CandidateOutcome> = (0..5)
            .map(|i| {
                if i == position {
                    CandidateOutcome::Threw("java.lang.IllegalStateException".to_owned())
                } else {
                    CandidateOutcome::Accepted(Value::Int(i))
                }
            })
            .collect();
        assert_eq!(outcomes, expected, "throwing candidate at {position}");
    }
}

#[test]
fn failing_batches_are_rerun_one_at_a_time() {
    let mut vm = vm_with_helpers();
    let frame = vm.frame().unwrap();
    let mut arena = ExprArena::new();
    let candidates: Vec<ExprId> = (0..5)
        .map(|i| call(&mut arena, if i == 2 { "boom" } else { "ok" }, &[i]))
        .collect();

    let config = small_batches();
    let cancel = CancellationToken::new();
    EvaluationManager::new(&mut vm, &config, &frame, None, &cancel)
        .evaluate(&arena, &candidates, None)
        .unwrap();

    assert_eq!(vm.batch_sizes, vec![2, 2, 1, 1, 1]);
}

#[test]
fn guarded_candidates_share_one_batch() {
    let mut vm = vm_with_helpers();
    vm.add_local("x", Type::int(), Value::Int(4));
    vm.add_local("y", Type::int(), Value::Int(4));
    vm.add_local("z", Type::int(), Value::Int(0));
    vm.add_local("w", Type::int(), Value::Int(2));
    let frame = vm.frame().unwrap();
    let mut arena = ExprArena::new();
    let x = arena.variable("x", Type::int(), Some(Value::Int(4)));
    let y = arena.variable("y", Type::int(), Some(Value::Int(4)));
    let z = arena.variable("z", Type::int(), Some(Value::Int(0)));
    let w = arena.variable("w", Type::int(), Some(Value::Int(2)));
    let candidates = vec![
        arena.infix(BinaryOp::Div, x, y, Type::int(), None),
        arena.infix(BinaryOp::Div, x, z, Type::int(), None),
        arena.infix(BinaryOp::Add, x, z, Type::int(), None),
        arena.infix(BinaryOp::Div, x, w, Type::int(), None),
    ];

    let config = EvaluationConfig::default();
    let cancel = CancellationToken::new();
    let property = ValueProperty::primitive(Value::Int(1));
    let evaluations = EvaluationManager::new(&mut vm, &config, &frame, None, &cancel)
        .evaluate(&arena, &candidates, Some(&property as &dyn Property))
        .unwrap();

    let outcomes: Vec<CandidateOutcome> = evaluations.into_iter().map(|e| e.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            CandidateOutcome::Accepted(Value::Int(1)),
            // The guard `z != 0` failed.
            CandidateOutcome::Rejected(None),
            CandidateOutcome::Rejected(Some(Value::Int(4))),
            // The guard `w != 0` held, so the value is known even though it did not match.
            CandidateOutcome::Rejected(Some(Value::Int(2))),
        ]
    );
    assert_eq!(vm.batch_sizes, vec![4]);
    assert_eq!(vm.sandbox_transitions, vec![true, false]);
    assert_eq!(arena.value(candidates[2]), Some(&Value::Int(4)));
    assert_eq!(arena.value(candidates[3]), Some(&Value::Int(2)));
}

#[test]
fn stalled_evaluations_are_killed_and_their_windows_closed() {
    let mut vm = vm_with_helpers();
    let frame = vm.frame().unwrap();
    let mut arena = ExprArena::new();
    let candidates = vec![call(&mut arena, "spin", &[])];

    let config = EvaluationConfig {
        timeout_ms: 50,
        ..EvaluationConfig::default()
    };
    let cancel = CancellationToken::new();
    let evaluations = EvaluationManager::new(&mut vm, &config, &frame, None, &cancel)
        .evaluate(&arena, &candidates, None)
        .unwrap();

    assert_eq!(evaluations[0].outcome, CandidateOutcome::TimedOut);
    assert_eq!(vm.disposed_windows.len(), 1);
    assert!(vm.windows_open().is_empty());
}

#[test]
fn predicates_that_do_not_compile_are_specification_errors() {
    let mut vm = vm_with_helpers();
    vm.add_local("x", Type::int(), Value::Int(1));
    let frame = vm.frame().unwrap();
    let mut arena = ExprArena::new();
    let candidates = vec![arena.variable("x", Type::int(), Some(Value::Int(1)))];

    let config = EvaluationConfig::default();
    let cancel = CancellationToken::new();
    let property = LambdaProperty::parse("v => nope(v)").unwrap();
    let err = EvaluationManager::new(&mut vm, &config, &frame, None, &cancel)
        .evaluate(&arena, &candidates, Some(&property as &dyn Property))
        .unwrap_err();

    assert!(matches!(err, SynthError::Specification(_)), "{err:?}");
    assert_eq!(vm.sandbox_transitions, vec![true, false]);
}

#[test]
fn cancelled_requests_run_nothing() {
    let mut vm = vm_with_helpers();
    let frame = vm.frame().unwrap();
    let mut arena = ExprArena::new();
    let candidates = vec![call(&mut arena, "ok", &[1])];

    let config = EvaluationConfig::default();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = EvaluationManager::new(&mut vm, &config, &frame, None, &cancel)
        .evaluate(&arena, &candidates, None)
        .unwrap_err();

    assert!(matches!(err, SynthError::Cancelled));
    assert!(vm.batch_sizes.is_empty());
}
