//! Typed candidate expressions.
//!
//! Expressions live in an [`ExprArena`] and are referred to by [`ExprId`]. A node never changes
//! once built: its static type, structural depth and source text are fixed at construction. The
//! only mutable part is the runtime value, which may be filled in once when it becomes known.

use std::cell::OnceCell;
use std::fmt;

use nova_synth_bridge::{FieldInfo, MethodInfo, Type, Value};
use nova_synth_syntax::ast::{BinaryOp, PostfixOp, UnaryOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal {
        /// Source text, quotes and suffixes included.
        text: String,
    },
    Variable(String),
    This,
    /// A type name used as the receiver of a static member.
    StaticName(Type),
    FieldAccess {
        receiver: ExprId,
        field: FieldInfo,
        /// Printed as the bare field name (`this` or this-type receivers).
        implicit: bool,
    },
    /// `array.length`.
    ArrayLength(ExprId),
    ArrayAccess {
        array: ExprId,
        index: ExprId,
    },
    MethodCall {
        receiver: ExprId,
        method: MethodInfo,
        args: Vec<ExprId>,
        implicit: bool,
    },
    ConstructorCall {
        method: MethodInfo,
        args: Vec<ExprId>,
    },
    Infix {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Prefix {
        op: UnaryOp,
        operand: ExprId,
    },
    Postfix {
        op: PostfixOp,
        operand: ExprId,
    },
    Cast {
        target: Type,
        expr: ExprId,
    },
    Parenthesized(ExprId),
    Conditional {
        condition: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    },
    InstanceOf {
        expr: ExprId,
        target: Type,
    },
    TypeLiteral(Type),
}

#[derive(Debug, Clone)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub ty: Type,
    pub depth: u32,
    text: String,
    value: OnceCell<Value>,
}

impl ExprNode {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.get()
    }
}

/// Binding strength of a node when it appears as a child; higher binds tighter.
fn precedence(kind: &ExprKind) -> u8 {
    match kind {
        ExprKind::Conditional { .. } => 10,
        ExprKind::Infix { op, .. } => op.binding_power().0,
        ExprKind::InstanceOf { .. } => 50,
        ExprKind::Prefix { .. } | ExprKind::Cast { .. } => 80,
        ExprKind::Postfix { .. } => 90,
        _ => 100,
    }
}

const RECEIVER_PRECEDENCE: u8 = 90;
const UNARY_PRECEDENCE: u8 = 80;

#[derive(Debug, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: ExprId) -> &ExprNode {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.get(id).kind
    }

    pub fn ty(&self, id: ExprId) -> &Type {
        &self.get(id).ty
    }

    pub fn depth(&self, id: ExprId) -> u32 {
        self.get(id).depth
    }

    pub fn text(&self, id: ExprId) -> &str {
        &self.get(id).text
    }

    pub fn value(&self, id: ExprId) -> Option<&Value> {
        self.get(id).value.get()
    }

    /// Records the runtime value of `id`. Returns `false` if a value was already known; the
    /// first value wins.
    pub fn set_value(&self, id: ExprId, value: Value) -> bool {
        self.get(id).value.set(value).is_ok()
    }

    pub fn is_known_null(&self, id: ExprId) -> bool {
        self.value(id).is_some_and(Value::is_null)
    }

    /// A literal constant.
    pub fn is_constant(&self, id: ExprId) -> bool {
        matches!(self.kind(id), ExprKind::Literal { .. })
    }

    pub fn is_infix(&self, id: ExprId) -> bool {
        matches!(self.kind(id), ExprKind::Infix { .. })
    }

    pub fn is_prefix(&self, id: ExprId) -> bool {
        matches!(self.kind(id), ExprKind::Prefix { .. })
    }

    /// The receiver is `this` or a type name: the expression is an object's own member.
    pub fn is_this_or_static(&self, id: ExprId) -> bool {
        matches!(self.kind(id), ExprKind::This | ExprKind::StaticName(_))
    }

    fn push(&mut self, kind: ExprKind, ty: Type, text: String, value: Option<Value>) -> ExprId {
        let depth = self.depth_of(&kind);
        let id = ExprId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        let cell = OnceCell::new();
        if let Some(value) = value {
            let _ = cell.set(value);
        }
        self.nodes.push(ExprNode {
            kind,
            ty,
            depth,
            text,
            value: cell,
        });
        id
    }

    fn depth_of(&self, kind: &ExprKind) -> u32 {
        let max_of = |ids: &mut dyn Iterator<Item = ExprId>| ids.map(|id| self.depth(id)).max().unwrap_or(0);
        match kind {
            ExprKind::Literal { .. }
            | ExprKind::Variable(_)
            | ExprKind::This
            | ExprKind::StaticName(_)
            | ExprKind::TypeLiteral(_) => 0,
            ExprKind::Parenthesized(inner) | ExprKind::Cast { expr: inner, .. } => self.depth(*inner),
            ExprKind::FieldAccess { receiver, .. } => self.depth(*receiver) + 1,
            ExprKind::ArrayLength(array) => self.depth(*array) + 1,
            ExprKind::Prefix { operand, .. } | ExprKind::Postfix { operand, .. } => {
                self.depth(*operand) + 1
            }
            ExprKind::InstanceOf { expr, .. } => self.depth(*expr) + 1,
            ExprKind::ArrayAccess { array, index } => {
                self.depth(*array).max(self.depth(*index)) + 1
            }
            ExprKind::Infix { lhs, rhs, .. } => self.depth(*lhs).max(self.depth(*rhs)) + 1,
            ExprKind::MethodCall { receiver, args, .. } => {
                max_of(&mut std::iter::once(*receiver).chain(args.iter().copied())) + 1
            }
            ExprKind::ConstructorCall { args, .. } => max_of(&mut args.iter().copied()) + 1,
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => max_of(&mut [*condition, *then_branch, *else_branch].into_iter()) + 1,
        }
    }

    /// Source of `id` as a child that must bind at least as tightly as `required`.
    fn child_text(&self, id: ExprId, required: u8) -> String {
        let node = self.get(id);
        if precedence(&node.kind) < required {
            format!("({})", node.text)
        } else {
            node.text.clone()
        }
    }

    /// Source of `id` wrapped in parentheses unless it binds as tightly as a receiver.
    pub(crate) fn receiver_text(&self, receiver: ExprId) -> String {
        self.child_text(receiver, RECEIVER_PRECEDENCE)
    }

    fn args_text(&self, args: &[ExprId]) -> String {
        args.iter()
            .map(|arg| self.text(*arg))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ---- constructors --------------------------------------------------------------------------

    pub fn literal(&mut self, text: impl Into<String>, ty: Type, value: Option<Value>) -> ExprId {
        let text = text.into();
        self.push(ExprKind::Literal { text: text.clone() }, ty, text, value)
    }

    pub fn int_literal(&mut self, value: i32) -> ExprId {
        self.literal(value.to_string(), Type::int(), Some(Value::Int(value)))
    }

    pub fn bool_literal(&mut self, value: bool) -> ExprId {
        self.literal(value.to_string(), Type::boolean(), Some(Value::Boolean(value)))
    }

    pub fn null_literal(&mut self) -> ExprId {
        self.literal("null", Type::Null, Some(Value::Null))
    }

    pub fn variable(&mut self, name: &str, ty: Type, value: Option<Value>) -> ExprId {
        self.push(ExprKind::Variable(name.to_owned()), ty, name.to_owned(), value)
    }

    pub fn this(&mut self, ty: Type, value: Option<Value>) -> ExprId {
        self.push(ExprKind::This, ty, "this".to_owned(), value)
    }

    /// `spelled` is the name as written in source (see `TypeStore::source_name`).
    pub fn static_name(&mut self, ty: Type, spelled: &str) -> ExprId {
        self.push(ExprKind::StaticName(ty.clone()), ty, spelled.to_owned(), None)
    }

    pub fn field_access(&mut self, receiver: ExprId, field: FieldInfo, implicit: bool, value: Option<Value>) -> ExprId {
        let text = if implicit {
            field.name.clone()
        } else {
            format!("{}.{}", self.receiver_text(receiver), field.name)
        };
        let ty = field.ty.clone();
        self.push(
            ExprKind::FieldAccess {
                receiver,
                field,
                implicit,
            },
            ty,
            text,
            value,
        )
    }

    pub fn array_length(&mut self, array: ExprId, value: Option<Value>) -> ExprId {
        let text = format!("{}.length", self.receiver_text(array));
        self.push(ExprKind::ArrayLength(array), Type::int(), text, value)
    }

    pub fn array_access(&mut self, array: ExprId, index: ExprId, value: Option<Value>) -> ExprId {
        let ty = self.ty(array).component().cloned().unwrap_or_else(Type::object);
        let text = format!("{}[{}]", self.receiver_text(array), self.text(index));
        self.push(ExprKind::ArrayAccess { array, index }, ty, text, value)
    }

    pub fn method_call(
        &mut self,
        receiver: ExprId,
        method: MethodInfo,
        args: Vec<ExprId>,
        implicit: bool,
    ) -> ExprId {
        let call = format!("{}({})", method.name, self.args_text(&args));
        let text = if implicit {
            call
        } else {
            format!("{}.{call}", self.receiver_text(receiver))
        };
        let ty = method.return_type.clone();
        self.push(
            ExprKind::MethodCall {
                receiver,
                method,
                args,
                implicit,
            },
            ty,
            text,
            None,
        )
    }

    /// `new T(args)`; `spelled` names `ty` as written in source.
    pub fn constructor_call(&mut self, ty: Type, spelled: &str, method: MethodInfo, args: Vec<ExprId>) -> ExprId {
        let text = format!("new {spelled}({})", self.args_text(&args));
        self.push(ExprKind::ConstructorCall { method, args }, ty, text, None)
    }

    pub fn infix(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId, ty: Type, value: Option<Value>) -> ExprId {
        let (left_bp, _) = op.binding_power();
        let text = format!(
            "{} {} {}",
            self.child_text(lhs, left_bp),
            op.as_str(),
            self.child_text(rhs, left_bp + 1)
        );
        self.push(ExprKind::Infix { op, lhs, rhs }, ty, text, value)
    }

    pub fn prefix(&mut self, op: UnaryOp, operand: ExprId, ty: Type, value: Option<Value>) -> ExprId {
        let inner = if self.is_prefix(operand) {
            format!("({})", self.text(operand))
        } else {
            self.child_text(operand, UNARY_PRECEDENCE)
        };
        let text = format!("{}{inner}", op.as_str());
        self.push(ExprKind::Prefix { op, operand }, ty, text, value)
    }

    pub fn postfix(&mut self, op: PostfixOp, operand: ExprId) -> ExprId {
        let text = format!("{}{}", self.child_text(operand, RECEIVER_PRECEDENCE), op.as_str());
        let ty = self.ty(operand).clone();
        self.push(ExprKind::Postfix { op, operand }, ty, text, None)
    }

    pub fn cast(&mut self, target: Type, spelled: &str, expr: ExprId, value: Option<Value>) -> ExprId {
        let text = format!("({spelled}) {}", self.child_text(expr, UNARY_PRECEDENCE));
        self.push(
            ExprKind::Cast {
                target: target.clone(),
                expr,
            },
            target,
            text,
            value,
        )
    }

    pub fn parenthesized(&mut self, inner: ExprId) -> ExprId {
        let text = format!("({})", self.text(inner));
        let ty = self.ty(inner).clone();
        let value = self.value(inner).cloned();
        self.push(ExprKind::Parenthesized(inner), ty, text, value)
    }

    pub fn conditional(
        &mut self,
        condition: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
        ty: Type,
        value: Option<Value>,
    ) -> ExprId {
        let text = format!(
            "{} ? {} : {}",
            self.child_text(condition, 11),
            self.child_text(then_branch, 11),
            self.text(else_branch)
        );
        self.push(
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            },
            ty,
            text,
            value,
        )
    }

    pub fn instance_of(&mut self, expr: ExprId, target: Type, spelled: &str, value: Option<Value>) -> ExprId {
        let text = format!("{} instanceof {spelled}", self.child_text(expr, 51));
        self.push(
            ExprKind::InstanceOf { expr, target },
            Type::boolean(),
            text,
            value,
        )
    }

    pub fn type_literal(&mut self, ty: Type, spelled: &str) -> ExprId {
        let text = format!("{spelled}.class");
        self.push(
            ExprKind::TypeLiteral(ty),
            Type::class("java.lang.Class"),
            text,
            None,
        )
    }

    // ---- traversal -----------------------------------------------------------------------------

    pub fn children(&self, id: ExprId) -> Vec<ExprId> {
        match self.kind(id) {
            ExprKind::Literal { .. }
            | ExprKind::Variable(_)
            | ExprKind::This
            | ExprKind::StaticName(_)
            | ExprKind::TypeLiteral(_) => Vec::new(),
            ExprKind::FieldAccess { receiver, .. } => vec![*receiver],
            ExprKind::ArrayLength(array) => vec![*array],
            ExprKind::ArrayAccess { array, index } => vec![*array, *index],
            ExprKind::MethodCall { receiver, args, .. } => {
                std::iter::once(*receiver).chain(args.iter().copied()).collect()
            }
            ExprKind::ConstructorCall { args, .. } => args.clone(),
            ExprKind::Infix { lhs, rhs, .. } => vec![*lhs, *rhs],
            ExprKind::Prefix { operand, .. } | ExprKind::Postfix { operand, .. } => vec![*operand],
            ExprKind::Cast { expr, .. } | ExprKind::InstanceOf { expr, .. } => vec![*expr],
            ExprKind::Parenthesized(inner) => vec![*inner],
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => vec![*condition, *then_branch, *else_branch],
        }
    }

    /// Pre-order walk over `id` and all of its descendants.
    pub fn walk(&self, id: ExprId, f: &mut dyn FnMut(ExprId, &ExprNode)) {
        f(id, self.get(id));
        for child in self.children(id) {
            self.walk(child, f);
        }
    }

    /// Structural depth recomputed from scratch, ignoring the cached depth of every node.
    pub fn structural_depth(&self, id: ExprId) -> u32 {
        let children = self.children(id);
        let deepest = children.iter().map(|c| self.structural_depth(*c)).max();
        match self.kind(id) {
            ExprKind::Parenthesized(_) | ExprKind::Cast { .. } => deepest.unwrap_or(0),
            ExprKind::ConstructorCall { .. } => deepest.unwrap_or(0) + 1,
            _ => deepest.map_or(0, |d| d + 1),
        }
    }

    pub fn display(&self, id: ExprId) -> DisplayExpr<'_> {
        DisplayExpr { arena: self, id }
    }
}

pub struct DisplayExpr<'a> {
    arena: &'a ExprArena,
    id: ExprId,
}

impl fmt::Display for DisplayExpr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.arena.text(self.id))
    }
}
