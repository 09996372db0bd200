//! Bottom-up enumeration of candidate expressions.
//!
//! Levels are built from the leaves up. The level at depth `d` holds every new expression of
//! structural depth exactly `d` plus all expressions of the levels below it. Below the
//! requested depth any non-void expression is kept, since it may still feed an enclosing
//! operator or call; only the requested (top) level must satisfy the caller's constraint.

use std::collections::{BTreeSet, HashMap, HashSet};

use nova_synth_bridge::{ExecutionBridge, FieldInfo, FrameInfo, MethodInfo, ObjectId, Type, Value};
use nova_synth_config::DenylistConfig;
use nova_synth_syntax::ast::{BinaryOp, UnaryOp};

use crate::constraint::TypeConstraint;
use crate::expr::{ExprArena, ExprId, ExprKind};
use crate::fold::{fold_infix, fold_prefix};
use crate::overload::OverloadChecker;
use crate::types::TypeStore;
use crate::uniqueness::is_unique;
use crate::{CancellationToken, SynthResult};

const COMPARISONS: [BinaryOp; 6] = [
    BinaryOp::Eq,
    BinaryOp::Ne,
    BinaryOp::Lt,
    BinaryOp::Le,
    BinaryOp::Gt,
    BinaryOp::Ge,
];

/// What the caller asked for; only consulted at the top level.
struct Top<'c> {
    constraint: &'c TypeConstraint,
    demonstration: Option<&'c Value>,
}

struct Level<'c> {
    depth: u32,
    top: Option<&'c Top<'c>>,
    texts: HashSet<String>,
    exprs: Vec<ExprId>,
}

impl Level<'_> {
    fn is_top(&self) -> bool {
        self.top.is_some()
    }
}

pub struct ExpressionGenerator<'a> {
    arena: &'a mut ExprArena,
    bridge: &'a mut dyn ExecutionBridge,
    store: &'a TypeStore,
    frame: &'a FrameInfo,
    denylist: &'a DenylistConfig,
    cancel: &'a CancellationToken,
    levels: Vec<Option<Vec<ExprId>>>,
    /// Object and interface types of receivers seen so far; their static members are offered.
    seen_types: BTreeSet<Type>,
    static_names: HashMap<Type, ExprId>,
    arrays: HashMap<ObjectId, Vec<Value>>,
    one: Option<ExprId>,
    two: Option<ExprId>,
}

impl<'a> ExpressionGenerator<'a> {
    pub fn new(
        arena: &'a mut ExprArena,
        bridge: &'a mut dyn ExecutionBridge,
        store: &'a TypeStore,
        frame: &'a FrameInfo,
        denylist: &'a DenylistConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            arena,
            bridge,
            store,
            frame,
            denylist,
            cancel,
            levels: Vec::new(),
            seen_types: BTreeSet::new(),
            static_names: HashMap::new(),
            arrays: HashMap::new(),
            one: None,
            two: None,
        }
    }

    /// All helpful expressions up to `max_depth` whose type satisfies `constraint`.
    ///
    /// `demonstration` is the value the user demonstrated, if any; non-zero ints and booleans
    /// become literal candidates.
    pub fn generate(
        &mut self,
        constraint: &TypeConstraint,
        demonstration: Option<&Value>,
        max_depth: u32,
    ) -> SynthResult<Vec<ExprId>> {
        let span = tracing::debug_span!("generate", max_depth, constraint = %constraint);
        let _guard = span.enter();
        self.levels = vec![None; max_depth as usize + 1];
        self.seen_types.clear();
        let top = Top {
            constraint,
            demonstration,
        };
        let exprs = self.level(max_depth, Some(&top))?;
        tracing::debug!(target: "nova.synth.generator", candidates = exprs.len(), "generated candidates");
        Ok(exprs)
    }

    fn level(&mut self, depth: u32, top: Option<&Top<'_>>) -> SynthResult<Vec<ExprId>> {
        self.cancel.check()?;
        if top.is_none() {
            if let Some(Some(memo)) = self.levels.get(depth as usize) {
                return Ok(memo.clone());
            }
        }
        let next = if depth > 0 {
            self.level(depth - 1, None)?
        } else {
            Vec::new()
        };
        let mut level = Level {
            depth,
            top,
            texts: HashSet::new(),
            exprs: Vec::new(),
        };

        if let Some(top) = top {
            self.add_demonstration(&mut level, top);
            self.add_constructors(&mut level, top, &next)?;
        }
        if depth == 0 {
            self.add_leaves(&mut level);
        } else {
            self.add_binary_ops(&mut level, &next)?;
            self.add_array_accesses(&mut level, &next)?;
            for &expr in &next {
                self.cancel.check()?;
                self.add_unary_forms(&mut level, expr, &next)?;
            }
            self.add_static_members(&mut level, &next)?;
        }
        for &expr in &next {
            if self.is_helpful(self.arena.ty(expr), &level) {
                let text = self.arena.text(expr).to_owned();
                if level.texts.insert(text) {
                    level.exprs.push(expr);
                }
            }
        }

        tracing::trace!(
            target: "nova.synth.generator",
            depth,
            top = level.is_top(),
            exprs = level.exprs.len(),
            "built level"
        );
        if !level.is_top() {
            if let Some(slot) = self.levels.get_mut(depth as usize) {
                *slot = Some(level.exprs.clone());
            }
        }
        Ok(level.exprs)
    }

    fn is_helpful(&self, ty: &Type, level: &Level<'_>) -> bool {
        !ty.is_void()
            && level
                .top
                .map_or(true, |top| top.constraint.is_fulfilled_by(ty, self.store))
    }

    /// Keeps `id` if it is new, of exactly the level's depth, helpful and free of repeats.
    fn admit(&self, level: &mut Level<'_>, id: ExprId) -> bool {
        let node = self.arena.get(id);
        if node.depth != level.depth
            || !self.is_helpful(&node.ty, level)
            || !is_unique(self.arena, id)
            || !level.texts.insert(node.text().to_owned())
        {
            return false;
        }
        level.exprs.push(id);
        true
    }

    // ---- leaves ------------------------------------------------------------------------------

    fn add_demonstration(&mut self, level: &mut Level<'_>, top: &Top<'_>) {
        let literal = match top.demonstration {
            Some(Value::Int(v)) if *v != 0 => self.arena.int_literal(*v),
            Some(Value::Boolean(b)) => self.arena.bool_literal(*b),
            _ => return,
        };
        self.admit(level, literal);
    }

    fn add_leaves(&mut self, level: &mut Level<'_>) {
        let int_wanted = !level.is_top() || self.is_helpful(&Type::int(), level);
        if int_wanted {
            let zero = self.arena.int_literal(0);
            self.admit(level, zero);
        }
        let object_wanted = !level.is_top() || self.is_helpful(&Type::Null, level);
        if object_wanted {
            let null = self.arena.null_literal();
            self.admit(level, null);
        }
        for local in &self.frame.locals {
            let var = self
                .arena
                .variable(&local.name, local.ty.clone(), Some(local.value.clone()));
            self.admit(level, var);
        }
        if !self.frame.is_static {
            let this_type = self.store.this_type();
            let this = self.arena.this(this_type, self.frame.this.clone());
            self.admit(level, this);
        }
    }

    // ---- operators ---------------------------------------------------------------------------

    fn make_infix(&mut self, level: &mut Level<'_>, op: BinaryOp, lhs: ExprId, rhs: ExprId, ty: Type) {
        let value = match (self.arena.value(lhs), self.arena.value(rhs)) {
            (Some(l), Some(r)) => fold_infix(op, l, r),
            _ => None,
        };
        let id = self.arena.infix(op, lhs, rhs, ty, value);
        self.admit(level, id);
    }

    fn add_binary_ops(&mut self, level: &mut Level<'_>, next: &[ExprId]) -> SynthResult<()> {
        let int_helpful = self.is_helpful(&Type::int(), level);
        let bool_helpful = self.is_helpful(&Type::boolean(), level);
        for &l in next {
            self.cancel.check()?;
            for &r in next {
                if self.arena.depth(l).max(self.arena.depth(r)) + 1 != level.depth {
                    continue;
                }
                let (lt, rt) = (self.arena.ty(l).clone(), self.arena.ty(r).clone());
                let order = self.arena.text(l).cmp(self.arena.text(r));
                let constant = self.arena.is_constant(l) || self.arena.is_constant(r);
                if lt.is_int() && rt.is_int() {
                    if constant {
                        continue;
                    }
                    if int_helpful {
                        if order.is_lt() {
                            self.make_infix(level, BinaryOp::Add, l, r, Type::int());
                        }
                        if order.is_le() {
                            self.make_infix(level, BinaryOp::Mul, l, r, Type::int());
                        }
                        if order.is_ne() {
                            self.make_infix(level, BinaryOp::Sub, l, r, Type::int());
                            let divides_by_zero = self.arena.value(r) == Some(&Value::Int(0));
                            if !divides_by_zero {
                                self.make_infix(level, BinaryOp::Div, l, r, Type::int());
                            }
                        }
                    }
                    let both_prefix = self.arena.is_prefix(l) && self.arena.is_prefix(r);
                    if bool_helpful && order.is_lt() && !both_prefix {
                        for op in COMPARISONS {
                            self.make_infix(level, op, l, r, Type::boolean());
                        }
                    }
                } else if lt.is_boolean() && rt.is_boolean() {
                    if bool_helpful && order.is_lt() {
                        self.make_infix(level, BinaryOp::And, l, r, Type::boolean());
                        self.make_infix(level, BinaryOp::Or, l, r, Type::boolean());
                    }
                } else if lt.is_reference()
                    && rt.is_reference()
                    && !(lt == Type::Null && rt == Type::Null)
                    && bool_helpful
                    && order.is_lt()
                    && self.store.related(&lt, &rt)
                {
                    self.make_infix(level, BinaryOp::Eq, l, r, Type::boolean());
                    self.make_infix(level, BinaryOp::Ne, l, r, Type::boolean());
                }
            }
        }
        Ok(())
    }

    fn array_elements(&mut self, array: ObjectId) -> SynthResult<&[Value]> {
        if !self.arrays.contains_key(&array) {
            let values = self.bridge.array_values(array)?;
            self.arrays.insert(array, values);
        }
        Ok(self.arrays.get(&array).map(Vec::as_slice).unwrap_or_default())
    }

    fn add_array_accesses(&mut self, level: &mut Level<'_>, next: &[ExprId]) -> SynthResult<()> {
        for &array in next {
            let Some(component) = self.arena.ty(array).component().cloned() else {
                continue;
            };
            if self.arena.is_known_null(array) || !self.is_helpful(&component, level) {
                continue;
            }
            self.cancel.check()?;
            let array_id = self.arena.value(array).and_then(Value::object_id);
            for &index in next {
                if !self.arena.ty(index).is_int()
                    || self.arena.depth(array).max(self.arena.depth(index)) + 1 != level.depth
                {
                    continue;
                }
                let known_index = self.arena.value(index).and_then(Value::as_i64);
                if known_index.is_some_and(|i| i < 0) {
                    continue;
                }
                let mut value = None;
                if let (Some(array_id), Some(i)) = (array_id, known_index) {
                    let elements = self.array_elements(array_id)?;
                    match elements.get(i as usize) {
                        Some(element) => value = Some(element.clone()),
                        None => continue,
                    }
                }
                let id = self.arena.array_access(array, index, value);
                self.admit(level, id);
            }
        }
        Ok(())
    }

    // ---- unary forms and members -------------------------------------------------------------

    fn constant(&mut self, value: i32) -> ExprId {
        let slot = if value == 1 { &mut self.one } else { &mut self.two };
        match slot {
            Some(id) => *id,
            None => {
                let id = self.arena.int_literal(value);
                *slot = Some(id);
                id
            }
        }
    }

    /// `e + 1`, `e * 2` and friends.
    fn is_constant_extension(&self, expr: ExprId) -> bool {
        matches!(self.arena.kind(expr), ExprKind::Infix { rhs, .. } if self.arena.is_constant(*rhs))
    }

    fn add_unary_forms(&mut self, level: &mut Level<'_>, expr: ExprId, next: &[ExprId]) -> SynthResult<()> {
        let ty = self.arena.ty(expr).clone();
        let known_null = self.arena.is_known_null(expr);
        let simple = !self.arena.is_prefix(expr)
            && !self.arena.is_infix(expr)
            && !self.arena.is_constant(expr);
        let fits = self.arena.depth(expr) + 1 == level.depth;

        if ty.is_int() && self.is_helpful(&ty, level) {
            if fits && !self.arena.is_constant(expr) && !self.is_constant_extension(expr) {
                let (one, two) = (self.constant(1), self.constant(2));
                for (op, operand) in [
                    (BinaryOp::Add, one),
                    (BinaryOp::Mul, two),
                    (BinaryOp::Sub, one),
                    (BinaryOp::Div, two),
                ] {
                    self.make_infix(level, op, expr, operand, Type::int());
                }
            }
            if fits && simple {
                let value = self.arena.value(expr).and_then(|v| fold_prefix(UnaryOp::Neg, v));
                let id = self.arena.prefix(UnaryOp::Neg, expr, Type::int(), value);
                self.admit(level, id);
            }
        }
        if ty.is_boolean() && fits && simple && self.is_helpful(&ty, level) {
            let value = self.arena.value(expr).and_then(|v| fold_prefix(UnaryOp::Not, v));
            let id = self.arena.prefix(UnaryOp::Not, expr, Type::boolean(), value);
            self.admit(level, id);
        }
        if known_null {
            return Ok(());
        }
        match &ty {
            Type::Array(_) => {
                if fits && self.is_helpful(&Type::int(), level) {
                    let value = match self.arena.value(expr).and_then(Value::object_id) {
                        Some(id) => Some(Value::Int(self.array_elements(id)?.len() as i32)),
                        None => None,
                    };
                    let id = self.arena.array_length(expr, value);
                    self.admit(level, id);
                }
            }
            Type::Class(_) => {
                self.seen_types.insert(ty.clone());
                if fits && !self.store.is_interface(&ty) {
                    self.add_field_accesses(level, expr, &ty, false)?;
                }
                self.add_method_calls(level, expr, &ty, false, next)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn is_implicit_receiver(&self, receiver: ExprId) -> bool {
        match self.arena.kind(receiver) {
            ExprKind::This => true,
            ExprKind::StaticName(ty) => *ty == self.store.this_type(),
            _ => false,
        }
    }

    fn add_field_accesses(
        &mut self,
        level: &mut Level<'_>,
        receiver: ExprId,
        receiver_ty: &Type,
        static_receiver: bool,
    ) -> SynthResult<()> {
        let fields: Vec<FieldInfo> = self
            .store
            .fields(receiver_ty)
            .into_iter()
            .filter(|f| self.store.is_legal_field(f, static_receiver))
            .filter(|f| self.is_helpful(&f.ty, level))
            .cloned()
            .collect();
        let implicit = self.is_implicit_receiver(receiver);
        for field in fields {
            let value = if field.is_static() {
                Some(self.bridge.field_value(None, &field.field_ref())?)
            } else {
                match self.arena.value(receiver).and_then(Value::object_id) {
                    Some(owner) => Some(self.bridge.field_value(Some(owner), &field.field_ref())?),
                    None => None,
                }
            };
            let id = self.arena.field_access(receiver, field, implicit, value);
            self.admit(level, id);
        }
        Ok(())
    }

    fn is_callable(&self, method: &MethodInfo, static_receiver: bool, level: &Level<'_>) -> bool {
        self.store.is_legal_method(method, false)
            && method.is_static() == static_receiver
            && !self.denylist.denies_method(&method.declaring, &method.name)
            && !(method.name == self.frame.method && method.declaring == self.frame.declaring_type)
            && !method.return_type.is_void()
            && self.is_helpful(&method.return_type, level)
    }

    fn add_method_calls(
        &mut self,
        level: &mut Level<'_>,
        receiver: ExprId,
        receiver_ty: &Type,
        static_receiver: bool,
        next: &[ExprId],
    ) -> SynthResult<()> {
        let store = self.store;
        let visible = store.methods(receiver_ty);
        let methods: Vec<&MethodInfo> = visible
            .iter()
            .copied()
            .filter(|m| self.is_callable(m, static_receiver, level))
            .collect();
        let implicit = self.is_implicit_receiver(receiver);
        let receiver_depth = self.arena.depth(receiver);
        for method in methods {
            let checker = OverloadChecker::new(store, method, &visible);
            let Some(actuals) = self.actuals_for(method, &checker, next) else {
                continue;
            };
            let mut calls = Vec::new();
            for_each_combination(&actuals, &mut |args| {
                self.cancel.check()?;
                let depth = args
                    .iter()
                    .map(|a| self.arena.depth(*a))
                    .fold(receiver_depth, u32::max);
                if depth + 1 == level.depth {
                    calls.push(args.to_vec());
                }
                Ok(())
            })?;
            for args in calls {
                let id = self.arena.method_call(receiver, method.clone(), args, implicit);
                self.admit(level, id);
            }
        }
        Ok(())
    }

    /// Possible actual arguments per parameter of `method`, cast where the overload would
    /// otherwise be ambiguous. `None` if some parameter has no candidate.
    fn actuals_for(
        &mut self,
        method: &MethodInfo,
        checker: &OverloadChecker<'_>,
        next: &[ExprId],
    ) -> Option<Vec<Vec<ExprId>>> {
        let mut actuals = Vec::with_capacity(method.params.len());
        for (index, param) in method.params.iter().enumerate() {
            let mut candidates = Vec::new();
            for &arg in next {
                let arg_ty = self.arena.ty(arg).clone();
                if !self.store.is_subtype(&arg_ty, param) {
                    continue;
                }
                if checker.needs_cast(&arg_ty, index) {
                    let spelled = self.store.source_name(param);
                    let value = self.arena.value(arg).cloned();
                    candidates.push(self.arena.cast(param.clone(), &spelled, arg, value));
                } else {
                    candidates.push(arg);
                }
            }
            if candidates.is_empty() {
                return None;
            }
            actuals.push(candidates);
        }
        Some(actuals)
    }

    fn add_constructors(&mut self, level: &mut Level<'_>, top: &Top<'_>, next: &[ExprId]) -> SynthResult<()> {
        let store = self.store;
        for ty in top.constraint.candidate_types() {
            let Some(class) = ty.class_name() else {
                continue;
            };
            if self.store.is_interface(&ty) || self.denylist.denies_class(class) {
                continue;
            }
            let visible = store.constructors(&ty);
            let spelled = self.store.source_name(&ty);
            for ctor in visible.iter().copied() {
                if !self.store.is_legal_method(ctor, true)
                    || self.denylist.denies_method(&ctor.declaring, &ctor.name)
                {
                    continue;
                }
                let checker = OverloadChecker::new(store, ctor, &visible);
                let Some(actuals) = self.actuals_for(ctor, &checker, next) else {
                    continue;
                };
                let mut calls = Vec::new();
                for_each_combination(&actuals, &mut |args| {
                    self.cancel.check()?;
                    let depth = args.iter().map(|a| self.arena.depth(*a)).max().unwrap_or(0);
                    if depth + 1 == level.depth {
                        calls.push(args.to_vec());
                    }
                    Ok(())
                })?;
                for args in calls {
                    let id = self
                        .arena
                        .constructor_call(ty.clone(), &spelled, ctor.clone(), args);
                    self.admit(level, id);
                }
            }
        }
        Ok(())
    }

    /// Static fields and methods of the declaring type (static frames), of every object type
    /// seen so far, and of imported types.
    fn add_static_members(&mut self, level: &mut Level<'_>, next: &[ExprId]) -> SynthResult<()> {
        let mut types = self.seen_types.clone();
        if self.frame.is_static {
            types.insert(self.store.this_type());
        }
        for import in self.store.imports() {
            if self.store.class(import).is_some() {
                types.insert(Type::class(import.clone()));
            }
        }
        for ty in types {
            self.cancel.check()?;
            let Some(class) = ty.class_name() else {
                continue;
            };
            if self.denylist.denies_class(class) {
                continue;
            }
            let receiver = self.static_name(&ty);
            if level.depth == 1 {
                self.add_field_accesses(level, receiver, &ty, true)?;
            }
            self.add_method_calls(level, receiver, &ty, true, next)?;
        }
        Ok(())
    }

    fn static_name(&mut self, ty: &Type) -> ExprId {
        if let Some(id) = self.static_names.get(ty) {
            return *id;
        }
        let spelled = self.store.source_name(ty);
        let id = self.arena.static_name(ty.clone(), &spelled);
        self.static_names.insert(ty.clone(), id);
        id
    }
}

/// Calls `f` with every combination taking one element from each list.
pub(crate) fn for_each_combination<T: Copy>(
    lists: &[Vec<T>],
    f: &mut dyn FnMut(&[T]) -> SynthResult<()>,
) -> SynthResult<()> {
    if lists.iter().any(Vec::is_empty) {
        return Ok(());
    }
    let mut indices = vec![0usize; lists.len()];
    let mut current: Vec<T> = lists.iter().map(|l| l[0]).collect();
    loop {
        f(&current)?;
        let mut pos = lists.len();
        loop {
            if pos == 0 {
                return Ok(());
            }
            pos -= 1;
            indices[pos] += 1;
            if indices[pos] < lists[pos].len() {
                current[pos] = lists[pos][indices[pos]];
                break;
            }
            indices[pos] = 0;
            current[pos] = lists[pos][0];
        }
    }
}
