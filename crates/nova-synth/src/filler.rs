//! Top-down filling of skeleton holes.
//!
//! Every node of the template is filled with a constraint pushed down from its parent. Child
//! results come back grouped by the name of their static type so that joining two children
//! (operands, branches, actual arguments) only pairs buckets whose types fit together.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use nova_synth_bridge::{ExecutionBridge, FieldInfo, FrameInfo, MethodInfo, PrimitiveType, Type, Value};
use nova_synth_config::DenylistConfig;
use nova_synth_syntax::ast::{
    BinaryExpr, BinaryOp, CallExpr, Expr, FieldAccessExpr, LiteralExpr, LiteralKind, NameExpr, NewExpr,
    UnaryExpr, UnaryOp,
};
use nova_synth_syntax::{parse_expression, HoleInfo, HoleKind};

use crate::constraint::{fulfills_arg_constraints, FieldNameConstraint, MethodNameConstraint, TypeConstraint};
use crate::expr::{ExprArena, ExprId, ExprKind};
use crate::fold::{fold_infix, fold_prefix};
use crate::generator::{for_each_combination, ExpressionGenerator};
use crate::overload::OverloadChecker;
use crate::types::TypeStore;
use crate::{CancellationToken, SynthError, SynthResult};

/// Expressions keyed by the canonical name of their static type.
pub type ExprsByType = BTreeMap<String, Vec<ExprId>>;

/// The candidates for one skeleton node and a constraint describing their types.
#[derive(Debug, Clone)]
pub struct Filled {
    pub exprs: ExprsByType,
    pub constraint: TypeConstraint,
}

impl Filled {
    fn empty(constraint: TypeConstraint) -> Self {
        Self {
            exprs: ExprsByType::new(),
            constraint,
        }
    }

    fn single(arena: &ExprArena, id: ExprId, constraint: TypeConstraint) -> Self {
        let mut filled = Self::empty(constraint);
        filled.push(arena, id);
        filled
    }

    fn push(&mut self, arena: &ExprArena, id: ExprId) {
        self.exprs.entry(arena.ty(id).name()).or_default().push(id);
    }

    pub fn all(&self) -> impl Iterator<Item = ExprId> + '_ {
        self.exprs.values().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.exprs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct SkeletonFiller<'a> {
    arena: &'a mut ExprArena,
    bridge: &'a mut dyn ExecutionBridge,
    store: &'a TypeStore,
    frame: &'a FrameInfo,
    denylist: &'a DenylistConfig,
    cancel: &'a CancellationToken,
    holes: &'a BTreeMap<String, HoleInfo>,
    /// Generator depth used for `??` holes without alternatives.
    hole_depth: u32,
}

impl<'a> SkeletonFiller<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        arena: &'a mut ExprArena,
        bridge: &'a mut dyn ExecutionBridge,
        store: &'a TypeStore,
        frame: &'a FrameInfo,
        denylist: &'a DenylistConfig,
        cancel: &'a CancellationToken,
        holes: &'a BTreeMap<String, HoleInfo>,
        hole_depth: u32,
    ) -> Self {
        Self {
            arena,
            bridge,
            store,
            frame,
            denylist,
            cancel,
            holes,
            hole_depth,
        }
    }

    /// All completions of `skeleton` under `constraint`.
    pub fn fill(&mut self, skeleton: &Expr, constraint: &TypeConstraint) -> SynthResult<Vec<ExprId>> {
        let filled = self.fill_node(skeleton, constraint)?;
        tracing::debug!(
            target: "nova.synth.filler",
            candidates = filled.len(),
            types = filled.exprs.len(),
            "filled skeleton"
        );
        Ok(filled.all().collect())
    }

    fn is_hole(&self, name: &str) -> bool {
        self.holes.contains_key(name)
    }

    /// Whether `expr` is a hole or has one somewhere below it.
    fn contains_hole(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Literal(_) | Expr::This(_) | Expr::ClassLiteral(_) => false,
            Expr::Name(name) => self.is_hole(&name.name),
            Expr::FieldAccess(access) => self.is_hole(&access.name) || self.contains_hole(&access.receiver),
            Expr::ArrayAccess(access) => self.contains_hole(&access.array) || self.contains_hole(&access.index),
            Expr::Call(call) => {
                self.is_hole(&call.name)
                    || call.receiver.as_deref().is_some_and(|r| self.contains_hole(r))
                    || call.args.iter().any(|a| self.contains_hole(a))
            }
            Expr::New(new) => new.args.iter().any(|a| self.contains_hole(a)),
            Expr::Binary(binary) => self.contains_hole(&binary.lhs) || self.contains_hole(&binary.rhs),
            Expr::Unary(unary) => self.contains_hole(&unary.operand),
            Expr::Postfix(postfix) => self.contains_hole(&postfix.operand),
            Expr::Cast(cast) => self.contains_hole(&cast.expr),
            Expr::Paren(paren) => self.contains_hole(&paren.expr),
            Expr::Conditional(cond) => {
                self.contains_hole(&cond.condition)
                    || self.contains_hole(&cond.then_branch)
                    || self.contains_hole(&cond.else_branch)
            }
            Expr::InstanceOf(instance) => self.contains_hole(&instance.expr),
        }
    }

    fn resolve_type(&self, name: &str) -> SynthResult<Type> {
        self.store
            .resolve_type(name)
            .ok_or_else(|| SynthError::SkeletonType(format!("{name} cannot be resolved to a type")))
    }

    fn fill_node(&mut self, node: &Expr, constraint: &TypeConstraint) -> SynthResult<Filled> {
        self.cancel.check()?;
        match node {
            Expr::Literal(literal) => self.fill_literal(literal),
            Expr::Name(name) => self.fill_name(name, constraint),
            Expr::This(_) => {
                let ty = self.store.this_type();
                let id = self.arena.this(ty.clone(), self.frame.this.clone());
                Ok(Filled::single(self.arena, id, TypeConstraint::SupertypeBound(ty)))
            }
            Expr::FieldAccess(access) => self.fill_field_access(access, constraint),
            Expr::ArrayAccess(access) => self.fill_array_access(&access.array, &access.index, constraint),
            Expr::Call(call) => self.fill_call(call, constraint),
            Expr::New(new) => self.fill_constructor(new),
            Expr::Binary(binary) => self.fill_infix(binary, constraint),
            Expr::Unary(unary) => self.fill_prefix(unary, constraint),
            Expr::Postfix(postfix) => {
                let operand = self.fill_node(&postfix.operand, constraint)?;
                let mut result = Filled::empty(constraint.clone());
                for expr in operand.all() {
                    let id = self.arena.postfix(postfix.op, expr);
                    result.push(self.arena, id);
                }
                Ok(result)
            }
            Expr::Cast(cast) => {
                let target = self.resolve_type(&cast.ty.name)?;
                let inner = self.fill_node(&cast.expr, &TypeConstraint::SameHierarchy(target.clone()))?;
                let mut result = Filled::empty(TypeConstraint::SupertypeBound(target.clone()));
                for expr in inner.all() {
                    let value = self.arena.value(expr).and_then(|v| cast_value(v, &target));
                    let id = self.arena.cast(target.clone(), &cast.ty.name, expr, value);
                    result.push(self.arena, id);
                }
                Ok(result)
            }
            Expr::Paren(paren) => {
                let inner = self.fill_node(&paren.expr, constraint)?;
                let mut result = Filled::empty(inner.constraint.clone());
                for expr in inner.all() {
                    let id = self.arena.parenthesized(expr);
                    result.push(self.arena, id);
                }
                Ok(result)
            }
            Expr::Conditional(cond) => {
                let condition =
                    self.fill_node(&cond.condition, &TypeConstraint::SupertypeBound(Type::boolean()))?;
                let then_result = self.fill_node(&cond.then_branch, constraint)?;
                let else_result = self.fill_node(&cond.else_branch, constraint)?;
                self.join_conditional(&condition, &then_result, &else_result)
            }
            Expr::InstanceOf(instance) => {
                let target = self.resolve_type(&instance.ty.name)?;
                let inner = self.fill_node(&instance.expr, &TypeConstraint::SameHierarchy(target.clone()))?;
                let mut result = Filled::empty(TypeConstraint::SupertypeBound(Type::boolean()));
                for expr in inner.all() {
                    let value = self.arena.value(expr).map(|v| match v {
                        Value::Object(obj) => {
                            Value::Boolean(self.store.is_subtype(&Type::parse(&obj.runtime_type), &target))
                        }
                        _ => Value::Boolean(false),
                    });
                    let id = self.arena.instance_of(expr, target.clone(), &instance.ty.name, value);
                    result.push(self.arena, id);
                }
                Ok(result)
            }
            Expr::ClassLiteral(literal) => {
                let ty = self.resolve_type(&literal.ty.name)?;
                let id = self.arena.type_literal(ty, &literal.ty.name);
                Ok(Filled::single(
                    self.arena,
                    id,
                    TypeConstraint::SupertypeBound(Type::class("java.lang.Class")),
                ))
            }
        }
    }

    fn fill_literal(&mut self, literal: &LiteralExpr) -> SynthResult<Filled> {
        let (ty, value) = match literal.kind {
            LiteralKind::Boolean => (Type::boolean(), Some(Value::Boolean(literal.text == "true"))),
            LiteralKind::Null => (Type::Null, Some(Value::Null)),
            LiteralKind::String => (Type::string(), None),
            LiteralKind::Char => (
                Type::Primitive(PrimitiveType::Char),
                parse_char(&literal.text).map(Value::Char),
            ),
            LiteralKind::Int | LiteralKind::Long | LiteralKind::Float | LiteralKind::Double => {
                number_literal(&literal.text).ok_or_else(|| {
                    SynthError::SkeletonType(format!("The literal {} is out of range", literal.text))
                })?
            }
        };
        let id = self.arena.literal(literal.text.clone(), ty.clone(), value);
        Ok(Filled::single(self.arena, id, TypeConstraint::SupertypeBound(ty)))
    }

    fn fill_name(&mut self, name: &NameExpr, constraint: &TypeConstraint) -> SynthResult<Filled> {
        let holes = self.holes;
        if let Some(hole) = holes.get(&name.name) {
            return self.fill_hole(hole, constraint);
        }
        if let Some(local) = self.frame.locals.iter().find(|l| l.name == name.name) {
            let id = self
                .arena
                .variable(&local.name, local.ty.clone(), Some(local.value.clone()));
            return Ok(Filled::single(
                self.arena,
                id,
                TypeConstraint::SupertypeBound(local.ty.clone()),
            ));
        }
        let this_type = self.store.this_type();
        let field = self
            .store
            .fields(&this_type)
            .into_iter()
            .find(|f| f.name == name.name && (f.is_static() || !self.frame.is_static))
            .cloned();
        if let Some(field) = field {
            let receiver = self.implicit_receiver(field.is_static());
            let value = self.field_value(receiver, &field)?;
            let ty = field.ty.clone();
            let id = self.arena.field_access(receiver, field, true, value);
            return Ok(Filled::single(self.arena, id, TypeConstraint::SupertypeBound(ty)));
        }
        if let Some(ty) = self.store.resolve_type(&name.name) {
            let id = self.arena.static_name(ty.clone(), &name.name);
            return Ok(Filled::single(self.arena, id, TypeConstraint::SupertypeBound(ty)));
        }
        Err(SynthError::SkeletonType(format!(
            "{} cannot be resolved to a variable",
            name.name
        )))
    }

    /// `this` in instance frames, the declaring type's name otherwise.
    fn implicit_receiver(&mut self, static_member: bool) -> ExprId {
        let this_type = self.store.this_type();
        if static_member || self.frame.is_static {
            let spelled = self.store.source_name(&this_type);
            self.arena.static_name(this_type, &spelled)
        } else {
            self.arena.this(this_type, self.frame.this.clone())
        }
    }

    fn field_value(&mut self, receiver: ExprId, field: &FieldInfo) -> SynthResult<Option<Value>> {
        if field.is_static() {
            return Ok(Some(self.bridge.field_value(None, &field.field_ref())?));
        }
        match self.arena.value(receiver).and_then(Value::object_id) {
            Some(owner) => Ok(Some(self.bridge.field_value(Some(owner), &field.field_ref())?)),
            None => Ok(None),
        }
    }

    fn is_static_name(&self, id: ExprId) -> bool {
        matches!(self.arena.kind(id), ExprKind::StaticName(_))
    }

    fn has_no_null_value(&self, id: ExprId) -> bool {
        !self.arena.is_known_null(id)
    }

    // ---- holes ---------------------------------------------------------------------------------

    fn fill_hole(&mut self, hole: &HoleInfo, constraint: &TypeConstraint) -> SynthResult<Filled> {
        if hole.kind == HoleKind::List {
            return Err(SynthError::Skeleton(nova_synth_syntax::SkeletonError::MisplacedListHole));
        }
        let candidates = match (&hole.alternatives, hole.negated) {
            (Some(alternatives), false) => {
                let mut candidates = Vec::new();
                for alternative in alternatives {
                    let parsed = parse_expression(alternative)?;
                    candidates.extend(self.fill_node(&parsed, constraint)?.all());
                }
                candidates
            }
            (alternatives, _) => {
                let mut excluded: HashSet<String> = HashSet::new();
                for alternative in alternatives.iter().flatten() {
                    excluded.insert(alternative.trim().to_owned());
                    let parsed = parse_expression(alternative)?;
                    let filled = self.fill_node(&parsed, &TypeConstraint::Unconstrained)?;
                    excluded.extend(filled.all().map(|id| self.arena.text(id).to_owned()));
                }
                let mut generator = ExpressionGenerator::new(
                    self.arena,
                    self.bridge,
                    self.store,
                    self.frame,
                    self.denylist,
                    self.cancel,
                );
                let generated = generator.generate(constraint, None, self.hole_depth)?;
                generated
                    .into_iter()
                    .filter(|id| !excluded.contains(self.arena.text(*id)))
                    .collect()
            }
        };
        let passing: Vec<ExprId> = candidates
            .into_iter()
            .filter(|id| constraint.is_fulfilled_by(self.arena.ty(*id), self.store))
            .collect();
        let result_constraint =
            TypeConstraint::supertype_of_any(passing.iter().map(|id| self.arena.ty(*id).clone()));
        let mut result = Filled::empty(result_constraint);
        for id in passing {
            result.push(self.arena, id);
        }
        Ok(result)
    }

    /// Legal member names at a name position: the written name, or the hole's alternatives.
    fn legal_names(&self, name: &str) -> (Option<BTreeSet<String>>, BTreeSet<String>) {
        match self.holes.get(name) {
            Some(hole) => {
                let listed: BTreeSet<String> = hole.alternatives.iter().flatten().map(|a| a.trim().to_owned()).collect();
                match (&hole.alternatives, hole.negated) {
                    (Some(_), false) => (Some(listed), BTreeSet::new()),
                    (Some(_), true) => (None, listed),
                    (None, _) => (None, BTreeSet::new()),
                }
            }
            None => (Some(BTreeSet::from([name.to_owned()])), BTreeSet::new()),
        }
    }

    // ---- fields and array elements -------------------------------------------------------------

    fn fill_field_access(&mut self, access: &FieldAccessExpr, constraint: &TypeConstraint) -> SynthResult<Filled> {
        let whole = Expr::FieldAccess(access.clone());
        if !self.contains_hole(&whole) {
            if let Some(qualified) = whole.as_qualified_name() {
                if let Some(class) = self.store.resolve_class(&qualified) {
                    let ty = Type::Class(class);
                    let id = self.arena.static_name(ty.clone(), &qualified);
                    return Ok(Filled::single(self.arena, id, TypeConstraint::SupertypeBound(ty)));
                }
            }
        }
        let name_is_hole = self.is_hole(&access.name);
        let receiver_constraint = TypeConstraint::Field {
            name: (!name_is_hole).then(|| access.name.clone()),
            field: Box::new(constraint.clone()),
        };
        let receivers = self.fill_node(&access.receiver, &receiver_constraint)?;
        let (legal, excluded) = self.legal_names(&access.name);
        let names = FieldNameConstraint::new(receivers.constraint.clone(), constraint.clone(), legal);
        let receiver_types = receivers.constraint.candidate_types();
        let fields_by_type = names.fields(self.store, &receiver_types).clone();
        let field_types = fields_by_type
            .values()
            .flatten()
            .filter(|f| !excluded.contains(&f.name))
            .map(|f| f.ty.clone());
        let mut result = Filled::empty(TypeConstraint::supertype_of_any(field_types));
        for (type_name, receiver_exprs) in &receivers.exprs {
            let Some(fields) = fields_by_type.get(type_name) else {
                continue;
            };
            for &receiver in receiver_exprs {
                if !self.has_no_null_value(receiver) {
                    continue;
                }
                let static_receiver = self.is_static_name(receiver);
                for field in fields {
                    if excluded.contains(&field.name) || (static_receiver && !field.is_static()) {
                        continue;
                    }
                    self.cancel.check()?;
                    let value = self.field_value(receiver, field)?;
                    let id = self.arena.field_access(receiver, field.clone(), false, value);
                    result.push(self.arena, id);
                }
            }
        }
        Ok(result)
    }

    fn fill_array_access(&mut self, array: &Expr, index: &Expr, constraint: &TypeConstraint) -> SynthResult<Filled> {
        let array_constraint = if self.contains_hole(array) {
            TypeConstraint::supertype_of_any(constraint.candidate_types().into_iter().map(Type::array_of))
        } else {
            TypeConstraint::Unconstrained
        };
        let arrays = self.fill_node(array, &array_constraint)?;
        let indices = self.fill_node(index, &TypeConstraint::SupertypeBound(Type::int()))?;
        let component_types = arrays
            .constraint
            .candidate_types()
            .into_iter()
            .filter_map(|ty| ty.component().cloned());
        let mut result = Filled::empty(TypeConstraint::supertype_of_any(component_types));
        let index_exprs: Vec<ExprId> = indices.all().collect();
        for array in arrays.all() {
            if !self.arena.ty(array).is_array() || self.arena.is_known_null(array) {
                continue;
            }
            for &index in &index_exprs {
                self.cancel.check()?;
                let known_index = self.arena.value(index).and_then(Value::as_i64);
                let mut value = None;
                if let Some(i) = known_index {
                    if i < 0 {
                        continue;
                    }
                    if let Some(array_id) = self.arena.value(array).and_then(Value::object_id) {
                        match self.bridge.array_values(array_id)?.get(i as usize) {
                            Some(element) => value = Some(element.clone()),
                            None => continue,
                        }
                    }
                }
                let id = self.arena.array_access(array, index, value);
                result.push(self.arena, id);
            }
        }
        Ok(result)
    }

    // ---- operators -----------------------------------------------------------------------------

    fn fill_infix(&mut self, binary: &BinaryExpr, constraint: &TypeConstraint) -> SynthResult<Filled> {
        let op = binary.op;
        let boolean_result = op.is_boolean_result();
        if boolean_result && !constraint.is_fulfilled_by(&Type::boolean(), self.store) {
            return Err(SynthError::SkeletonType(format!(
                "Incorrectly-typed operator {op} returns a boolean"
            )));
        }
        let child_constraint = match op {
            BinaryOp::And | BinaryOp::Or => TypeConstraint::SupertypeBound(Type::boolean()),
            BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Rem
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                if !boolean_result && !constraint.is_fulfilled_by(&Type::int(), self.store) {
                    return Err(SynthError::SkeletonType(format!(
                        "Incorrectly-typed operator {op} returns an int"
                    )));
                }
                TypeConstraint::SupertypeSet(BTreeSet::from([Type::int()]))
            }
            // Equality compares operands of any type; the boolean result says nothing about them.
            BinaryOp::Eq | BinaryOp::Ne => TypeConstraint::Unconstrained,
            _ => constraint.clone(),
        };
        let left = self.fill_node(&binary.lhs, &child_constraint)?;
        let right = self.fill_node(&binary.rhs, &child_constraint)?;
        let result_constraint = if boolean_result {
            TypeConstraint::SupertypeBound(Type::boolean())
        } else {
            child_constraint
        };
        let mut result = Filled::empty(result_constraint);
        for left_exprs in left.exprs.values() {
            let left_ty = self.arena.ty(left_exprs[0]).clone();
            for right_exprs in right.exprs.values() {
                let right_ty = self.arena.ty(right_exprs[0]).clone();
                let Some(result_ty) = self.infix_type(op, &left_ty, &right_ty) else {
                    continue;
                };
                for &lhs in left_exprs {
                    self.cancel.check()?;
                    let left_present = self.has_no_null_value(lhs);
                    for &rhs in right_exprs {
                        if !left_present && !self.has_no_null_value(rhs) {
                            continue;
                        }
                        let value = match (self.arena.value(lhs), self.arena.value(rhs)) {
                            (Some(l), Some(r)) => fold_infix(op, l, r),
                            _ => None,
                        };
                        if matches!(op, BinaryOp::Div | BinaryOp::Rem)
                            && self.arena.value(rhs).and_then(Value::as_i64) == Some(0)
                        {
                            continue;
                        }
                        let id = self.arena.infix(op, lhs, rhs, result_ty.clone(), value);
                        result.push(self.arena, id);
                    }
                }
            }
        }
        Ok(result)
    }

    fn fill_prefix(&mut self, unary: &UnaryExpr, constraint: &TypeConstraint) -> SynthResult<Filled> {
        let op = unary.op;
        let operand_constraint = match op {
            UnaryOp::Not => {
                if !constraint.is_fulfilled_by(&Type::boolean(), self.store) {
                    return Err(SynthError::SkeletonType(format!(
                        "Incorrectly-typed operator {} returns a boolean",
                        op.as_str()
                    )));
                }
                TypeConstraint::SupertypeBound(Type::boolean())
            }
            // Every integral type widens to long, every numeric one to double.
            UnaryOp::BitNot => self.numeric_operand(constraint, Type::long()),
            UnaryOp::Neg | UnaryOp::Plus | UnaryOp::PreInc | UnaryOp::PreDec => {
                self.numeric_operand(constraint, Type::double())
            }
        };
        let operand = self.fill_node(&unary.operand, &operand_constraint)?;
        let mut built = Vec::new();
        for expr in operand.all() {
            let operand_ty = self.arena.ty(expr);
            if !operand_constraint.is_fulfilled_by(operand_ty, self.store) {
                continue;
            }
            let ty = match op {
                UnaryOp::Not => Type::boolean(),
                UnaryOp::PreInc | UnaryOp::PreDec => operand_ty.clone(),
                _ => promoted(operand_ty),
            };
            if !constraint.is_fulfilled_by(&ty, self.store) {
                continue;
            }
            let value = self.arena.value(expr).and_then(|v| fold_prefix(op, v));
            built.push(self.arena.prefix(op, expr, ty, value));
        }
        let mut result = Filled::empty(TypeConstraint::supertype_of_any(
            built.iter().map(|id| self.arena.ty(*id).clone()),
        ));
        for id in built {
            result.push(self.arena, id);
        }
        Ok(result)
    }

    /// Operand constraint for a numeric prefix operator: the primitive types `constraint` asks
    /// for that fit under `widest`, or `widest` itself when it names none.
    fn numeric_operand(&self, constraint: &TypeConstraint, widest: Type) -> TypeConstraint {
        let wanted: Vec<Type> = constraint
            .candidate_types()
            .into_iter()
            .filter(|ty| ty.is_numeric() && self.store.is_subtype(ty, &widest))
            .collect();
        if wanted.is_empty() {
            TypeConstraint::SupertypeBound(widest)
        } else {
            TypeConstraint::supertype_of_any(wanted)
        }
    }

    /// Static type of `l op r`, or `None` if the operand types do not combine.
    fn infix_type(&self, op: BinaryOp, left: &Type, right: &Type) -> Option<Type> {
        let string = Type::string();
        if op == BinaryOp::Add && (*left == string || *right == string) {
            return Some(string);
        }
        if left.is_reference() || right.is_reference() {
            let comparable = (*left == Type::Null && right.is_reference())
                || (*right == Type::Null && left.is_reference())
                || (left.is_reference() && right.is_reference() && self.store.related(left, right));
            return (comparable && matches!(op, BinaryOp::Eq | BinaryOp::Ne)).then(Type::boolean);
        }
        if op.is_boolean_result() {
            let both_numeric = left.is_numeric() && right.is_numeric();
            let both_boolean = left.is_boolean() && right.is_boolean();
            let fits = match op {
                BinaryOp::And | BinaryOp::Or => both_boolean,
                BinaryOp::Eq | BinaryOp::Ne => both_numeric || both_boolean,
                _ => both_numeric,
            };
            return fits.then(Type::boolean);
        }
        if left.is_boolean() && right.is_boolean() {
            return matches!(op, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor).then(Type::boolean);
        }
        if left.is_numeric() && right.is_numeric() {
            return Some(binary_promotion(left, right));
        }
        None
    }

    fn join_conditional(&mut self, condition: &Filled, then_result: &Filled, else_result: &Filled) -> SynthResult<Filled> {
        let mut result = Filled::empty(then_result.constraint.clone());
        let conditions: Vec<ExprId> = condition.all().collect();
        for then_exprs in then_result.exprs.values() {
            let then_ty = self.arena.ty(then_exprs[0]).clone();
            for else_exprs in else_result.exprs.values() {
                let else_ty = self.arena.ty(else_exprs[0]).clone();
                let joinable = (then_ty == Type::Null && else_ty.is_reference())
                    || (else_ty == Type::Null && then_ty.is_reference())
                    || self.store.is_subtype(&then_ty, &else_ty)
                    || self.store.is_subtype(&else_ty, &then_ty);
                if !joinable {
                    continue;
                }
                let ty = if then_ty == Type::Null { else_ty.clone() } else { then_ty.clone() };
                for &cond in &conditions {
                    for &then_branch in then_exprs {
                        self.cancel.check()?;
                        for &else_branch in else_exprs {
                            let value = match self.arena.value(cond).and_then(Value::as_bool) {
                                Some(true) => self.arena.value(then_branch).cloned(),
                                Some(false) => self.arena.value(else_branch).cloned(),
                                None => None,
                            };
                            let id = self.arena.conditional(cond, then_branch, else_branch, ty.clone(), value);
                            result.push(self.arena, id);
                        }
                    }
                }
            }
        }
        Ok(result)
    }

    // ---- calls ---------------------------------------------------------------------------------

    fn is_list_hole(&self, args: &[Expr]) -> bool {
        match args {
            [Expr::Name(name)] => self
                .holes
                .get(&name.name)
                .is_some_and(|hole| hole.kind == HoleKind::List),
            _ => false,
        }
    }

    /// Constraints the written arguments put on a callee's parameters. `None` for a `**` list;
    /// `None` entries for arguments that contain holes.
    fn arg_constraints(&mut self, args: &[Expr]) -> SynthResult<Option<Vec<Option<TypeConstraint>>>> {
        if self.is_list_hole(args) {
            return Ok(None);
        }
        let mut constraints = Vec::with_capacity(args.len());
        for arg in args {
            if self.contains_hole(arg) {
                constraints.push(None);
            } else {
                let filled = self.fill_node(arg, &TypeConstraint::Unconstrained)?;
                constraints.push(Some(filled.constraint.for_argument()));
            }
        }
        Ok(Some(constraints))
    }

    /// Fills each argument with the union of the parameter types the candidate callees accept
    /// there. A `**` list is filled once with every parameter type of every callee.
    fn fill_args(&mut self, args: &[Expr], callees: &[&MethodInfo], list: bool) -> SynthResult<Vec<Filled>> {
        let count = if list { 1 } else { args.len() };
        let mut results = Vec::with_capacity(count);
        for (i, arg) in args.iter().enumerate().take(count) {
            let param_types = callees.iter().flat_map(|m| {
                if list {
                    m.params.clone()
                } else {
                    m.params.get(i).cloned().into_iter().collect()
                }
            });
            let constraint = TypeConstraint::supertype_of_any(param_types);
            if list {
                let mut generator = ExpressionGenerator::new(
                    self.arena,
                    self.bridge,
                    self.store,
                    self.frame,
                    self.denylist,
                    self.cancel,
                );
                let generated = generator.generate(&constraint, None, self.hole_depth)?;
                let mut filled = Filled::empty(constraint);
                for id in generated {
                    filled.push(self.arena, id);
                }
                results.push(filled);
            } else {
                results.push(self.fill_node(arg, &constraint)?);
            }
        }
        Ok(results)
    }

    fn fill_call(&mut self, call: &CallExpr, constraint: &TypeConstraint) -> SynthResult<Filled> {
        let arg_constraints = self.arg_constraints(&call.args)?;
        let name_is_hole = self.is_hole(&call.name);
        let receivers = match &call.receiver {
            Some(receiver) => {
                let receiver_constraint = TypeConstraint::Method {
                    name: (!name_is_hole).then(|| call.name.clone()),
                    result: Box::new(constraint.clone()),
                    args: arg_constraints.clone(),
                };
                Some(self.fill_node(receiver, &receiver_constraint)?)
            }
            None => None,
        };
        let receiver_constraint = match &receivers {
            Some(receivers) => receivers.constraint.clone(),
            None => TypeConstraint::SupertypeBound(self.store.this_type()),
        };
        let (legal, excluded) = self.legal_names(&call.name);
        let names = MethodNameConstraint::new(
            receiver_constraint.clone(),
            constraint.clone(),
            arg_constraints.clone(),
            legal,
        );
        let (store, denylist, frame) = (self.store, self.denylist, self.frame);
        let methods_by_type = names
            .methods(store, &receiver_constraint.candidate_types(), |m| {
                !denylist.denies_method(&m.declaring, &m.name)
                    && !excluded.contains(&m.name)
                    && !(m.name == frame.method && m.declaring == frame.declaring_type)
            })
            .clone();
        let all_methods: Vec<&MethodInfo> = methods_by_type.values().flatten().collect();
        let result_types = all_methods.iter().map(|m| m.return_type.clone());
        let mut result = Filled::empty(TypeConstraint::supertype_of_any(result_types));
        if all_methods.is_empty() {
            return Ok(result);
        }
        let list = arg_constraints.is_none();
        let arg_results = self.fill_args(&call.args, &all_methods, list)?;

        match receivers {
            Some(receivers) => {
                for (type_name, receiver_exprs) in &receivers.exprs {
                    let Some(methods) = methods_by_type.get(type_name) else {
                        continue;
                    };
                    let receiver_ty = self.arena.ty(receiver_exprs[0]).clone();
                    let visible = store.methods(&receiver_ty);
                    for &receiver in receiver_exprs {
                        if !self.has_no_null_value(receiver) {
                            continue;
                        }
                        let static_receiver = self.is_static_name(receiver);
                        for method in methods {
                            if static_receiver && !method.is_static() {
                                continue;
                            }
                            let checker = OverloadChecker::new(store, method, &visible);
                            self.build_calls(method, receiver, false, &arg_results, list, &checker, &mut result)?;
                        }
                    }
                }
            }
            None => {
                let this_type = self.store.this_type();
                let visible = store.methods(&this_type);
                for &method in &all_methods {
                    let receiver = self.implicit_receiver(method.is_static());
                    let checker = OverloadChecker::new(store, method, &visible);
                    self.build_calls(method, receiver, true, &arg_results, list, &checker, &mut result)?;
                }
            }
        }
        Ok(result)
    }

    fn fill_constructor(&mut self, new: &NewExpr) -> SynthResult<Filled> {
        let ty = self.resolve_type(&new.ty.name)?;
        let arg_constraints = self.arg_constraints(&new.args)?;
        let store = self.store;
        let visible = store.constructors(&ty);
        let constructors: Vec<&MethodInfo> = visible
            .iter()
            .copied()
            .filter(|c| store.is_legal_method(c, true))
            .filter(|c| fulfills_arg_constraints(c, arg_constraints.as_deref(), store))
            .collect();
        let mut result = Filled::empty(TypeConstraint::Desired(ty.clone()));
        if constructors.is_empty() {
            return Ok(result);
        }
        let list = arg_constraints.is_none();
        let arg_results = self.fill_args(&new.args, &constructors, list)?;
        for constructor in constructors {
            let checker = OverloadChecker::new(store, constructor, &visible);
            let spelled = new.ty.name.clone();
            self.build_constructor_calls(constructor, &ty, &spelled, &arg_results, list, &checker, &mut result)?;
        }
        Ok(result)
    }

    /// Possible actuals per parameter, cast where the overload needs it. `None` when some
    /// parameter has no candidate.
    fn actuals(
        &mut self,
        method: &MethodInfo,
        arg_results: &[Filled],
        list: bool,
        checker: &OverloadChecker<'_>,
    ) -> Option<Vec<Vec<ExprId>>> {
        let mut actuals = Vec::with_capacity(method.params.len());
        for (i, param) in method.params.iter().enumerate() {
            let filled = arg_results.get(if list { 0 } else { i })?;
            let mut candidates = Vec::new();
            for exprs in filled.exprs.values() {
                let arg_ty = self.arena.ty(exprs[0]).clone();
                if !self.store.is_subtype(&arg_ty, param) {
                    continue;
                }
                if checker.needs_cast(&arg_ty, i) {
                    let spelled = self.store.source_name(param);
                    for &expr in exprs {
                        let value = self.arena.value(expr).cloned();
                        candidates.push(self.arena.cast(param.clone(), &spelled, expr, value));
                    }
                } else {
                    candidates.extend(exprs.iter().copied());
                }
            }
            if candidates.is_empty() {
                return None;
            }
            actuals.push(candidates);
        }
        Some(actuals)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_calls(
        &mut self,
        method: &MethodInfo,
        receiver: ExprId,
        implicit: bool,
        arg_results: &[Filled],
        list: bool,
        checker: &OverloadChecker<'_>,
        result: &mut Filled,
    ) -> SynthResult<()> {
        if method.return_type.is_void() {
            return Ok(());
        }
        let Some(actuals) = self.actuals(method, arg_results, list, checker) else {
            return Ok(());
        };
        let mut combos = Vec::new();
        let cancel = self.cancel;
        for_each_combination(&actuals, &mut |args| {
            cancel.check()?;
            combos.push(args.to_vec());
            Ok(())
        })?;
        for args in combos {
            let id = self.arena.method_call(receiver, method.clone(), args, implicit);
            result.push(self.arena, id);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn build_constructor_calls(
        &mut self,
        constructor: &MethodInfo,
        ty: &Type,
        spelled: &str,
        arg_results: &[Filled],
        list: bool,
        checker: &OverloadChecker<'_>,
        result: &mut Filled,
    ) -> SynthResult<()> {
        let Some(actuals) = self.actuals(constructor, arg_results, list, checker) else {
            return Ok(());
        };
        let mut combos = Vec::new();
        let cancel = self.cancel;
        for_each_combination(&actuals, &mut |args| {
            cancel.check()?;
            combos.push(args.to_vec());
            Ok(())
        })?;
        for args in combos {
            let id = self.arena.constructor_call(ty.clone(), spelled, constructor.clone(), args);
            result.push(self.arena, id);
        }
        Ok(())
    }
}

/// Unary numeric promotion.
fn promoted(ty: &Type) -> Type {
    match ty.as_primitive() {
        Some(PrimitiveType::Byte | PrimitiveType::Short | PrimitiveType::Char) => Type::int(),
        _ => ty.clone(),
    }
}

/// Binary numeric promotion.
fn binary_promotion(left: &Type, right: &Type) -> Type {
    let rank = |ty: &Type| match ty.as_primitive() {
        Some(PrimitiveType::Double) => 3,
        Some(PrimitiveType::Float) => 2,
        Some(PrimitiveType::Long) => 1,
        _ => 0,
    };
    match rank(left).max(rank(right)) {
        3 => Type::double(),
        2 => Type::Primitive(PrimitiveType::Float),
        1 => Type::long(),
        _ => Type::int(),
    }
}

/// The value of `(target) value` when it can be computed without the process.
fn cast_value(value: &Value, target: &Type) -> Option<Value> {
    if target.is_reference() {
        return match value {
            Value::Null | Value::Object(_) => Some(value.clone()),
            _ => None,
        };
    }
    let primitive = target.as_primitive()?;
    if value.runtime_type() == *target {
        return Some(value.clone());
    }
    let integral = value.as_i64();
    let floating = value.as_f64()?;
    Some(match primitive {
        PrimitiveType::Int => Value::Int(integral.map_or(floating as i32, |v| v as i32)),
        PrimitiveType::Long => Value::Long(integral.unwrap_or(floating as i64)),
        PrimitiveType::Short => Value::Short(integral.map_or(floating as i16, |v| v as i16)),
        PrimitiveType::Byte => Value::Byte(integral.map_or(floating as i8, |v| v as i8)),
        PrimitiveType::Float => Value::Float(floating as f32),
        PrimitiveType::Double => Value::Double(floating),
        PrimitiveType::Char | PrimitiveType::Boolean => return None,
    })
}

fn parse_char(text: &str) -> Option<char> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut chars = inner.chars();
    match (chars.next()?, chars.next()) {
        ('\\', Some(escaped)) => match escaped {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            '0' => Some('\0'),
            '\\' | '\'' | '"' => Some(escaped),
            _ => None,
        },
        (c, None) => Some(c),
        _ => None,
    }
}

/// Type and value of a number literal from its suffix: `l`/`L` long, `f`/`F` float, `d`/`D`
/// or a decimal point double, int otherwise.
fn number_literal(text: &str) -> Option<(Type, Option<Value>)> {
    let cleaned = text.replace('_', "");
    let last = cleaned.chars().last()?;
    let parse_integral = |digits: &str| -> Option<i64> {
        if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16).ok()
        } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
            i64::from_str_radix(bin, 2).ok()
        } else {
            digits.parse().ok()
        }
    };
    let is_hex = cleaned.starts_with("0x") || cleaned.starts_with("0X");
    if matches!(last, 'l' | 'L') {
        let value = parse_integral(&cleaned[..cleaned.len() - 1])?;
        return Some((Type::long(), Some(Value::Long(value))));
    }
    if !is_hex && matches!(last, 'f' | 'F') {
        let value: f32 = cleaned[..cleaned.len() - 1].parse().ok()?;
        return Some((Type::Primitive(PrimitiveType::Float), Some(Value::Float(value))));
    }
    if !is_hex && (matches!(last, 'd' | 'D') || cleaned.contains('.') || cleaned.contains(['e', 'E'])) {
        let value: f64 = cleaned.trim_end_matches(['d', 'D']).parse().ok()?;
        return Some((Type::double(), Some(Value::Double(value))));
    }
    let value = parse_integral(&cleaned)?;
    let value = i32::try_from(value)
        .ok()
        .or_else(|| is_hex.then(|| value as u32 as i32))?;
    Some((Type::int(), Some(Value::Int(value))))
}

#[cfg(test)]
mod tests {
    use nova_synth_bridge::mock::MockVm;
    use pretty_assertions::assert_eq;

    use super::*;

    fn mixed_scope() -> MockVm {
        let mut vm = MockVm::new();
        vm.add_local("x", Type::int(), Value::Int(2));
        vm.add_local("flag", Type::boolean(), Value::Boolean(true));
        vm
    }

    /// Fills `source`, where the name `h` is a hole, and returns the completions' texts with the
    /// constraint reported for the whole.
    fn fill_with_hole(
        vm: &mut MockVm,
        source: &str,
        hole: HoleInfo,
        constraint: &TypeConstraint,
    ) -> (Vec<String>, TypeConstraint) {
        let frame = vm.frame().unwrap();
        let store = TypeStore::load(vm, &frame).unwrap();
        let denylist = DenylistConfig::default();
        let cancel = CancellationToken::new();
        let holes = BTreeMap::from([("h".to_owned(), hole)]);
        let mut arena = ExprArena::new();
        let skeleton = parse_expression(source).unwrap();
        let mut filler = SkeletonFiller::new(&mut arena, vm, &store, &frame, &denylist, &cancel, &holes, 0);
        let filled = filler.fill_node(&skeleton, constraint).unwrap();
        let texts = filled.all().map(|id| arena.text(id).to_owned()).collect();
        (texts, filled.constraint)
    }

    #[test]
    fn hole_constraint_comes_from_the_candidates_that_fit() {
        let mut vm = mixed_scope();
        let hole = HoleInfo {
            kind: HoleKind::Expression,
            alternatives: Some(vec!["x".to_owned(), "flag".to_owned()]),
            negated: false,
        };
        let (texts, constraint) = fill_with_hole(
            &mut vm,
            "h",
            hole,
            &TypeConstraint::SupertypeBound(Type::boolean()),
        );
        assert_eq!(texts, vec!["flag".to_owned()]);
        assert_eq!(constraint, TypeConstraint::SupertypeBound(Type::boolean()));
    }

    #[test]
    fn negation_takes_only_boolean_operands() {
        let mut vm = mixed_scope();
        let hole = HoleInfo {
            kind: HoleKind::Expression,
            alternatives: Some(vec!["x".to_owned(), "flag".to_owned()]),
            negated: false,
        };
        let (texts, constraint) = fill_with_hole(&mut vm, "!h", hole, &TypeConstraint::Unconstrained);
        assert_eq!(texts, vec!["!flag".to_owned()]);
        assert_eq!(constraint, TypeConstraint::SupertypeBound(Type::boolean()));
    }

    #[test]
    fn bitwise_complement_takes_only_integral_operands() {
        let mut vm = mixed_scope();
        vm.add_local("ratio", Type::double(), Value::Double(0.5));
        let hole = HoleInfo {
            kind: HoleKind::Expression,
            alternatives: Some(vec!["x".to_owned(), "flag".to_owned(), "ratio".to_owned()]),
            negated: false,
        };
        let (texts, _) = fill_with_hole(&mut vm, "~h", hole, &TypeConstraint::Unconstrained);
        assert_eq!(texts, vec!["~x".to_owned()]);
    }

    #[test]
    fn negation_where_a_number_is_wanted_is_an_error() {
        let mut vm = mixed_scope();
        let frame = vm.frame().unwrap();
        let store = TypeStore::load(&mut vm, &frame).unwrap();
        let denylist = DenylistConfig::default();
        let cancel = CancellationToken::new();
        let holes = BTreeMap::new();
        let mut arena = ExprArena::new();
        let skeleton = parse_expression("!flag").unwrap();
        let mut filler = SkeletonFiller::new(&mut arena, &mut vm, &store, &frame, &denylist, &cancel, &holes, 0);
        let err = filler
            .fill(&skeleton, &TypeConstraint::SupertypeBound(Type::int()))
            .unwrap_err();
        assert!(matches!(err, SynthError::SkeletonType(_)));
    }

    #[test]
    fn number_literal_suffixes_pick_the_type() {
        assert_eq!(number_literal("42"), Some((Type::int(), Some(Value::Int(42)))));
        assert_eq!(number_literal("42L"), Some((Type::long(), Some(Value::Long(42)))));
        assert_eq!(
            number_literal("1.5"),
            Some((Type::double(), Some(Value::Double(1.5))))
        );
        assert_eq!(
            number_literal("2f"),
            Some((Type::Primitive(PrimitiveType::Float), Some(Value::Float(2.0))))
        );
        assert_eq!(number_literal("0x10"), Some((Type::int(), Some(Value::Int(16)))));
        assert_eq!(number_literal("1_000"), Some((Type::int(), Some(Value::Int(1000)))));
        assert_eq!(number_literal("99999999999"), None);
    }

    #[test]
    fn char_literals_and_casts() {
        assert_eq!(parse_char("'a'"), Some('a'));
        assert_eq!(parse_char("'\\n'"), Some('\n'));
        assert_eq!(cast_value(&Value::Double(2.7), &Type::int()), Some(Value::Int(2)));
        assert_eq!(cast_value(&Value::Int(3), &Type::long()), Some(Value::Long(3)));
        assert_eq!(cast_value(&Value::Null, &Type::string()), Some(Value::Null));
        assert_eq!(binary_promotion(&Type::int(), &Type::long()), Type::long());
    }
}
