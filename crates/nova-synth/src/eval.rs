//! Evaluating candidates in the paused frame.
//!
//! Candidates are packed into one source fragment per round-trip:
//!
//! ```text
//! {
//! T[] _$value = new T[n];
//! boolean[] _$valid = new boolean[n];
//! boolean[] _$ran = new boolean[n];
//! <property bindings>
//! if (<guard>) {
//!  _$ran[i] = true;
//!  T _$curValue = <candidate>;
//!  _$valid[i] = <validity>;
//!  _$value[i] = _$curValue;
//! }
//! ...
//! return new Object[] { _$value, _$valid, _$ran };
//! }
//! ```
//!
//! Candidates whose guard rules out every known crash run together in a first pass. The rest
//! run in batches; a batch that throws is re-run one candidate at a time so that only the
//! throwing candidate is lost.

use std::fmt::Write as _;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use nova_synth_bridge::{
    BatchOutcome, BatchRequest, BatchSlot, Binding, BindingInit, ExecutionBridge, FrameInfo,
    Heartbeat, ObjectId, SlotResult, ThreadInterrupter, Type, Value, TIMEOUT_SENTINEL,
};
use nova_synth_config::EvaluationConfig;
use nova_synth_syntax::ast::BinaryOp;

use crate::effects::{array_id, Effect, SideEffectHandler};
use crate::expr::{ExprArena, ExprId, ExprKind};
use crate::property::{Property, CURRENT_VALUE};
use crate::{CancellationToken, CandidateOutcome, SynthError, SynthResult};

/// One candidate's evaluation result.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub expr: ExprId,
    pub outcome: CandidateOutcome,
    /// Heap changes the candidate made; already undone.
    pub effects: Vec<Effect>,
}

/// Precondition under which a candidate cannot hit any of the crashes we know how to predict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Guard {
    pub condition: Option<String>,
    /// The candidate may still throw when `condition` holds.
    pub can_throw: bool,
}

impl Guard {
    /// Walks `id` pre-order; each new conjunct goes in front of the ones found so far.
    pub fn of(arena: &ExprArena, id: ExprId) -> Guard {
        let mut conjuncts: Vec<String> = Vec::new();
        let mut can_throw = false;
        arena.walk(id, &mut |_, node| match &node.kind {
            ExprKind::ArrayAccess { array, index } => {
                let array = arena.receiver_text(*array);
                let index = arena.receiver_text(*index);
                conjuncts.push(format!(
                    "({array} != null && {index} >= 0 && {index} < {array}.length)"
                ));
            }
            ExprKind::FieldAccess { receiver, .. }
            | ExprKind::ArrayLength(receiver)
            | ExprKind::MethodCall { receiver, .. } => {
                // A dereference whose value we already computed cannot crash.
                let safe_receiver = matches!(node.kind, ExprKind::FieldAccess { .. })
                    && arena.is_this_or_static(*receiver);
                if node.value().is_none() && !safe_receiver {
                    can_throw = true;
                    if arena.is_known_null(*receiver) {
                        conjuncts.push("false".to_owned());
                    }
                }
            }
            ExprKind::Infix {
                op: BinaryOp::Div | BinaryOp::Rem,
                rhs,
                ..
            } => conjuncts.push(format!("{} != 0", arena.receiver_text(*rhs))),
            ExprKind::ConstructorCall { .. } => can_throw = true,
            _ => {}
        });
        conjuncts.reverse();
        Guard {
            condition: (!conjuncts.is_empty()).then(|| conjuncts.join(" && ")),
            can_throw,
        }
    }
}

/// Turns the security sandbox on for as long as it lives.
struct Sandbox<'b> {
    bridge: &'b mut (dyn ExecutionBridge + 'b),
}

impl<'b> Sandbox<'b> {
    fn enter(bridge: &'b mut (dyn ExecutionBridge + 'b)) -> SynthResult<Self> {
        bridge.set_sandbox_enabled(true)?;
        Ok(Self { bridge })
    }
}

impl<'b> Deref for Sandbox<'b> {
    type Target = dyn ExecutionBridge + 'b;

    fn deref(&self) -> &Self::Target {
        &*self.bridge
    }
}

impl DerefMut for Sandbox<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.bridge
    }
}

impl Drop for Sandbox<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.bridge.set_sandbox_enabled(false) {
            tracing::warn!(target: "nova.synth.eval", error = %err, "failed to leave the evaluation sandbox");
        }
    }
}

/// Consecutive polls without a heartbeat before a batch counts as stuck. Polls are this many
/// times per interval, so a slot always gets at least one full interval.
const STALLED_POLLS: u32 = 2;

/// Kills the running batch once the heartbeat has not moved for a whole interval.
struct Watchdog {
    stop: Option<crossbeam_channel::Sender<()>>,
    handle: Option<JoinHandle<bool>>,
}

impl Watchdog {
    fn spawn(heartbeat: Heartbeat, interval: Duration, interrupter: Arc<dyn ThreadInterrupter>) -> Self {
        let (stop, stopped) = crossbeam_channel::bounded::<()>(0);
        let poll = interval / STALLED_POLLS;
        let spawned = std::thread::Builder::new()
            .name("synth-watchdog".to_owned())
            .spawn(move || {
                let mut last = heartbeat.count();
                let mut stalled = 0;
                loop {
                    match stopped.recv_timeout(poll) {
                        Err(RecvTimeoutError::Timeout) => {
                            let now = heartbeat.count();
                            if now != last {
                                last = now;
                                stalled = 0;
                                continue;
                            }
                            stalled += 1;
                            if stalled < STALLED_POLLS {
                                continue;
                            }
                            tracing::info!(target: "nova.synth.eval", evaluated = now, "evaluation stalled; killing batch");
                            if let Err(err) = interrupter.raise(TIMEOUT_SENTINEL) {
                                tracing::warn!(target: "nova.synth.eval", error = %err, "failed to interrupt evaluation");
                            }
                            return true;
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => return false,
                    }
                }
            });
        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(target: "nova.synth.eval", error = %err, "evaluating without a watchdog");
                None
            }
        };
        Self {
            stop: Some(stop),
            handle,
        }
    }

    /// Whether the watchdog killed the batch.
    fn finish(mut self) -> bool {
        drop(self.stop.take());
        self.handle
            .take()
            .is_some_and(|handle| handle.join().unwrap_or(false))
    }
}

enum BatchRun {
    Completed(Vec<SlotResult>),
    Failed { exception_class: String, timed_out: bool },
}

struct BatchResult {
    run: BatchRun,
    effects: Vec<Effect>,
}

/// Everything that is the same for every batch of one evaluation request.
struct Plan<'p> {
    arena: &'p ExprArena,
    candidates: &'p [ExprId],
    guards: Vec<Guard>,
    validity: String,
    bindings: Vec<Binding>,
}

impl Plan<'_> {
    fn request(&self, frame: &FrameInfo, members: &[usize]) -> BatchRequest {
        let result_type = common_type(members.iter().map(|i| self.arena.ty(self.candidates[*i])));
        let slots: Vec<BatchSlot> = members
            .iter()
            .map(|i| BatchSlot {
                guard: self.guards[*i].condition.clone(),
                expression: self.arena.text(self.candidates[*i]).to_owned(),
                validity: self.validity.clone(),
            })
            .collect();
        let source = compose_source(&result_type, &self.bindings, &slots);
        BatchRequest {
            frame: frame.frame,
            result_type,
            bindings: self.bindings.clone(),
            slots,
            source,
            heartbeat: Heartbeat::new(),
        }
    }
}

/// Runs candidate batches against a bridge.
pub struct EvaluationManager<'a> {
    bridge: &'a mut dyn ExecutionBridge,
    config: &'a EvaluationConfig,
    frame: &'a FrameInfo,
    effects: Option<&'a SideEffectHandler>,
    cancel: &'a CancellationToken,
}

impl<'a> EvaluationManager<'a> {
    pub fn new(
        bridge: &'a mut dyn ExecutionBridge,
        config: &'a EvaluationConfig,
        frame: &'a FrameInfo,
        effects: Option<&'a SideEffectHandler>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            bridge,
            config,
            frame,
            effects,
            cancel,
        }
    }

    fn tracking_effects(&self) -> bool {
        self.effects.is_some_and(SideEffectHandler::is_active)
    }

    /// Evaluates `candidates` and checks each against `property` (every candidate that
    /// evaluates is accepted when there is none).
    ///
    /// Returns one [`Evaluation`] per candidate, in input order. Values observed along the
    /// way are recorded on the arena.
    pub fn evaluate(
        &mut self,
        arena: &ExprArena,
        candidates: &[ExprId],
        property: Option<&dyn Property>,
    ) -> SynthResult<Vec<Evaluation>> {
        let span = tracing::debug_span!("evaluate", candidates = candidates.len());
        let _guard = span.enter();

        let plan = Plan {
            arena,
            candidates,
            guards: candidates.iter().map(|id| Guard::of(arena, *id)).collect(),
            validity: property.map_or_else(|| "true".to_owned(), |p| p.validity(CURRENT_VALUE)),
            bindings: property.map(|p| p.bindings()).unwrap_or_default(),
        };
        let n = candidates.len();
        let batch_size = self.config.batch_size_for(n);
        let (safe, risky): (Vec<usize>, Vec<usize>) = (0..n).partition(|i| !plan.guards[*i].can_throw);
        tracing::debug!(
            target: "nova.synth.eval",
            safe = safe.len(),
            deferred = risky.len(),
            batch_size,
            "evaluating candidates"
        );

        let mut results: Vec<Option<Evaluation>> = std::iter::repeat_with(|| None).take(n).collect();
        if !safe.is_empty() {
            let batch = self.run_batch(&plan, &safe)?;
            let step = if batch_size >= n { 1 } else { batch_size };
            self.settle(&plan, &safe, batch, step, &mut results)?;
        }
        self.run_in_batches(&plan, &risky, batch_size, &mut results)?;

        let evaluations: Vec<Evaluation> = results.into_iter().flatten().collect();
        tracing::debug!(
            target: "nova.synth.eval",
            accepted = evaluations.iter().filter(|e| e.outcome.is_accepted()).count(),
            "evaluation finished"
        );
        Ok(evaluations)
    }

    fn run_in_batches(
        &mut self,
        plan: &Plan<'_>,
        members: &[usize],
        size: usize,
        results: &mut [Option<Evaluation>],
    ) -> SynthResult<()> {
        for chunk in members.chunks(size.max(1)) {
            let batch = self.run_batch(plan, chunk)?;
            self.settle(plan, chunk, batch, 1, results)?;
        }
        Ok(())
    }

    /// Records a finished batch, re-running it in `retry_step`-sized pieces when it threw.
    fn settle(
        &mut self,
        plan: &Plan<'_>,
        members: &[usize],
        batch: BatchResult,
        retry_step: usize,
        results: &mut [Option<Evaluation>],
    ) -> SynthResult<()> {
        match batch.run {
            // Effects of a shared batch cannot be told apart.
            BatchRun::Completed(_) if members.len() > 1 && !batch.effects.is_empty() => {
                self.run_in_batches(plan, members, 1, results)
            }
            BatchRun::Completed(slots) => {
                for (i, slot) in members.iter().zip(slots) {
                    let expr = plan.candidates[*i];
                    let outcome = match slot.value {
                        Some(value) => {
                            plan.arena.set_value(expr, value.clone());
                            if slot.valid {
                                CandidateOutcome::Accepted(value)
                            } else {
                                CandidateOutcome::Rejected(Some(value))
                            }
                        }
                        // The guard failed.
                        None => CandidateOutcome::Rejected(None),
                    };
                    results[*i] = Some(Evaluation {
                        expr,
                        outcome,
                        effects: batch.effects.clone(),
                    });
                }
                Ok(())
            }
            BatchRun::Failed { .. } if members.len() > 1 => {
                self.run_in_batches(plan, members, retry_step, results)
            }
            BatchRun::Failed {
                exception_class,
                timed_out,
            } => {
                let expr = plan.candidates[members[0]];
                tracing::trace!(
                    target: "nova.synth.eval",
                    candidate = %plan.arena.display(expr),
                    exception = %exception_class,
                    timed_out,
                    "dropping candidate"
                );
                results[members[0]] = Some(Evaluation {
                    expr,
                    outcome: if timed_out {
                        CandidateOutcome::TimedOut
                    } else {
                        CandidateOutcome::Threw(exception_class)
                    },
                    effects: batch.effects,
                });
                Ok(())
            }
        }
    }

    /// One compile-and-run round-trip.
    fn run_batch(&mut self, plan: &Plan<'_>, members: &[usize]) -> SynthResult<BatchResult> {
        self.cancel.check()?;
        let span = tracing::debug_span!("batch", size = members.len());
        let _guard = span.enter();

        let request = plan.request(self.frame, members);
        tracing::trace!(target: "nova.synth.eval", source = %request.source, "compiled batch");
        if let Some(handler) = self.effects {
            handler.start_batch();
            for i in members {
                for array in argument_arrays(plan.arena, plan.candidates[*i]) {
                    handler.check_argument(&array, &mut *self.bridge)?;
                }
            }
        }

        let windows_before = self.bridge.windows()?;
        let interval = self.config.timeout(self.tracking_effects());
        let interrupter = self.bridge.interrupter()?;
        let finished = {
            let mut sandbox = Sandbox::enter(&mut *self.bridge)?;
            let watchdog = Watchdog::spawn(request.heartbeat.clone(), interval, interrupter);
            let finished = run_to_completion(&mut *sandbox, request);
            let killed = watchdog.finish();
            finished.map(|outcome| (outcome, killed))
        };
        let effects = match self.effects {
            Some(handler) => handler.finish_batch(&mut *self.bridge)?,
            None => Vec::new(),
        };
        let (outcome, killed) = finished?;
        if killed {
            self.dispose_new_windows(&windows_before)?;
        }

        let run = match outcome {
            BatchOutcome::CompileError(message) => return Err(SynthError::Specification(message)),
            BatchOutcome::Threw {
                exception_class,
                message,
            } => {
                tracing::debug!(
                    target: "nova.synth.eval",
                    exception = %exception_class,
                    message = message.as_deref().unwrap_or(""),
                    "batch threw"
                );
                let timed_out = killed || exception_class == TIMEOUT_SENTINEL;
                BatchRun::Failed {
                    exception_class,
                    timed_out,
                }
            }
            BatchOutcome::Completed(slots) if slots.len() == members.len() => BatchRun::Completed(slots),
            BatchOutcome::Completed(slots) => {
                return Err(SynthError::Bridge(nova_synth_bridge::BridgeError::Other(format!(
                    "batch of {} candidates returned {} results",
                    members.len(),
                    slots.len()
                ))))
            }
        };
        Ok(BatchResult { run, effects })
    }

    fn dispose_new_windows(&mut self, before: &[ObjectId]) -> SynthResult<()> {
        for window in self.bridge.windows()? {
            if !before.contains(&window) {
                tracing::debug!(target: "nova.synth.eval", window, "closing window left by a killed evaluation");
                self.bridge.dispose_window(window)?;
            }
        }
        Ok(())
    }
}

/// Hands the request to the bridge and parks until its completion callback fires.
fn run_to_completion(bridge: &mut dyn ExecutionBridge, request: BatchRequest) -> SynthResult<BatchOutcome> {
    let (done, completion) = crossbeam_channel::bounded(1);
    bridge.evaluate(
        request,
        Box::new(move |result| {
            let _ = done.send(result);
        }),
    )?;
    let result = completion.recv().map_err(|_| SynthError::Disconnected)?;
    Ok(result?)
}

/// Known array values passed as call arguments anywhere inside `id`.
fn argument_arrays(arena: &ExprArena, id: ExprId) -> Vec<Value> {
    let mut arrays = Vec::new();
    arena.walk(id, &mut |_, node| {
        if let ExprKind::MethodCall { args, .. } | ExprKind::ConstructorCall { args, .. } = &node.kind {
            arrays.extend(
                args.iter()
                    .filter_map(|arg| arena.value(*arg))
                    .filter(|value| array_id(value).is_some())
                    .cloned(),
            );
        }
    });
    arrays
}

/// Element type of the `_$value` array: the candidates' type if they agree, `Object` otherwise.
fn common_type<'t>(mut types: impl Iterator<Item = &'t Type>) -> Type {
    let Some(first) = types.next() else {
        return Type::object();
    };
    if matches!(first, Type::Null) || types.any(|ty| ty != first) {
        Type::object()
    } else {
        first.clone()
    }
}

fn compose_source(result_type: &Type, bindings: &[Binding], slots: &[BatchSlot]) -> String {
    let ty = result_type.source_name();
    // The size goes in the first dimension: `new int[3][]`.
    let allocation = match ty.find("[]") {
        Some(at) => format!("{}[{}]{}", &ty[..at], slots.len(), &ty[at..]),
        None => format!("{ty}[{}]", slots.len()),
    };
    let mut src = String::from("{\n");
    let _ = writeln!(src, "{ty}[] _$value = new {allocation};");
    let _ = writeln!(src, "boolean[] _$valid = new boolean[{}];", slots.len());
    let _ = writeln!(src, "boolean[] _$ran = new boolean[{}];", slots.len());
    for binding in bindings {
        let binding_ty = binding.ty.source_name();
        match &binding.init {
            BindingInit::Expression(init) => {
                let _ = writeln!(src, "{binding_ty} {} = {init};", binding.name);
            }
            BindingInit::Value(_) => {
                let _ = writeln!(src, "{binding_ty} {}; // bound by the debugger", binding.name);
            }
        }
    }
    for (i, slot) in slots.iter().enumerate() {
        if let Some(guard) = &slot.guard {
            let _ = write!(src, "if ({guard}) ");
        }
        let _ = writeln!(
            src,
            "{{\n _$ran[{i}] = true;\n {ty} {CURRENT_VALUE} = {};\n _$valid[{i}] = {};\n _$value[{i}] = {CURRENT_VALUE};\n}}",
            slot.expression, slot.validity
        );
    }
    src.push_str("return new Object[] { _$value, _$valid, _$ran };\n}");
    src
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use nova_synth_bridge::{BridgeError, FieldInfo, MethodInfo, Modifiers};
    use nova_synth_syntax::ast::BinaryOp;
    use pretty_assertions::assert_eq;

    use super::*;

    fn int_array() -> Type {
        Type::array_of(Type::int())
    }

    #[test]
    fn array_access_guard_checks_bounds() {
        let mut arena = ExprArena::new();
        let a = arena.variable("a", int_array(), None);
        let i = arena.variable("i", Type::int(), Some(Value::Int(0)));
        let access = arena.array_access(a, i, None);

        assert_eq!(
            Guard::of(&arena, access),
            Guard {
                condition: Some("(a != null && i >= 0 && i < a.length)".to_owned()),
                can_throw: false,
            }
        );
    }

    #[test]
    fn inner_guards_come_first() {
        let mut arena = ExprArena::new();
        let x = arena.variable("x", Type::int(), None);
        let y = arena.variable("y", Type::int(), None);
        let z = arena.variable("z", Type::int(), None);
        let div = arena.infix(BinaryOp::Div, x, y, Type::int(), None);
        let rem = arena.infix(BinaryOp::Rem, div, z, Type::int(), None);

        assert_eq!(
            Guard::of(&arena, rem).condition.as_deref(),
            Some("y != 0 && z != 0")
        );
    }

    #[test]
    fn unknown_calls_can_throw_and_null_receivers_are_ruled_out() {
        let mut arena = ExprArena::new();
        let s = arena.variable("s", Type::string(), Some(Value::Null));
        let length = MethodInfo::new("java.lang.String", "length", Vec::new(), Type::int(), Modifiers::PUBLIC);
        let call = arena.method_call(s, length, Vec::new(), false);

        assert_eq!(
            Guard::of(&arena, call),
            Guard {
                condition: Some("false".to_owned()),
                can_throw: true,
            }
        );
    }

    #[test]
    fn own_fields_and_known_values_are_safe() {
        let mut arena = ExprArena::new();
        let this = arena.this(Type::class("Main"), None);
        let field = FieldInfo::new("Main", "count", Type::int(), Modifiers::PRIVATE);
        let access = arena.field_access(this, field, true, None);
        assert_eq!(Guard::of(&arena, access), Guard::default());

        let ctor = MethodInfo::constructor("Main", Vec::new(), Modifiers::PUBLIC);
        let new = arena.constructor_call(Type::class("Main"), "Main", ctor, Vec::new());
        assert!(Guard::of(&arena, new).can_throw);
    }

    #[test]
    fn batch_source_declares_results_and_bindings() {
        let slots = vec![
            BatchSlot {
                guard: None,
                expression: "x + y".to_owned(),
                validity: "_$curValue == 5".to_owned(),
            },
            BatchSlot {
                guard: Some("y != 0".to_owned()),
                expression: "x / y".to_owned(),
                validity: "_$curValue == 5".to_owned(),
            },
        ];
        let bindings = vec![Binding {
            name: "_$pre_$x".to_owned(),
            ty: Type::int(),
            init: BindingInit::Expression("x".to_owned()),
        }];

        let expected = [
            "{",
            "int[] _$value = new int[2];",
            "boolean[] _$valid = new boolean[2];",
            "boolean[] _$ran = new boolean[2];",
            "int _$pre_$x = x;",
            "{",
            " _$ran[0] = true;",
            " int _$curValue = x + y;",
            " _$valid[0] = _$curValue == 5;",
            " _$value[0] = _$curValue;",
            "}",
            "if (y != 0) {",
            " _$ran[1] = true;",
            " int _$curValue = x / y;",
            " _$valid[1] = _$curValue == 5;",
            " _$value[1] = _$curValue;",
            "}",
            "return new Object[] { _$value, _$valid, _$ran };",
            "}",
        ]
        .join("\n");
        assert_eq!(compose_source(&Type::int(), &bindings, &slots), expected);
    }

    #[test]
    fn array_results_size_the_first_dimension() {
        let source = compose_source(&int_array(), &[], &[]);
        assert!(source.starts_with("{\nint[][] _$value = new int[0][];\n"));
    }

    #[test]
    fn mixed_candidate_types_fall_back_to_object() {
        assert_eq!(common_type([Type::int(), Type::int()].iter()), Type::int());
        assert_eq!(common_type([Type::int(), Type::long()].iter()), Type::object());
        assert_eq!(common_type([Type::Null].iter()), Type::object());
    }

    #[derive(Default)]
    struct CountingInterrupter(AtomicUsize);

    impl ThreadInterrupter for CountingInterrupter {
        fn raise(&self, _exception_class: &str) -> Result<(), BridgeError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn watchdog_spares_batches_that_keep_beating() {
        let heartbeat = Heartbeat::new();
        let interrupter = Arc::new(CountingInterrupter::default());
        let watchdog = Watchdog::spawn(heartbeat.clone(), Duration::from_millis(80), interrupter.clone());
        for _ in 0..10 {
            std::thread::sleep(Duration::from_millis(20));
            heartbeat.beat();
        }
        assert!(!watchdog.finish());
        assert_eq!(interrupter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn watchdog_kills_once_the_heartbeat_stops() {
        let heartbeat = Heartbeat::new();
        let interrupter = Arc::new(CountingInterrupter::default());
        let watchdog = Watchdog::spawn(heartbeat.clone(), Duration::from_millis(20), interrupter.clone());
        heartbeat.beat();
        std::thread::sleep(Duration::from_millis(200));
        assert!(watchdog.finish());
        assert_eq!(interrupter.0.load(Ordering::SeqCst), 1);
    }
}
