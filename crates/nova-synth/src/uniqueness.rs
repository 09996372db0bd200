//! Rejects expressions that mention the same name or number twice.
//!
//! Every identifier counts: variables, field and method names (qualified or not) and the simple
//! names of types written in the expression. `x + x`, `x * 2 - 2`, `f(x, x)`, `p.x + q.x` and
//! `a.size() + b.size()` are all thrown away. This also drops some useful forms such as
//! `x + 1 + 1`; the search relies on it to keep levels small.

use std::collections::HashSet;

use nova_synth_bridge::Type;

use crate::expr::{ExprArena, ExprId, ExprKind};

/// Whether `id` contains each identifier and numeric literal at most once.
pub fn is_unique(arena: &ExprArena, id: ExprId) -> bool {
    let mut seen = HashSet::new();
    // Receivers that are not written out, like the type in an unqualified static call.
    let mut implicit_receivers = HashSet::new();
    let mut unique = true;
    arena.walk(id, &mut |node_id, node| {
        if !unique || implicit_receivers.contains(&node_id) {
            return;
        }
        if let ExprKind::FieldAccess {
            receiver,
            implicit: true,
            ..
        }
        | ExprKind::MethodCall {
            receiver,
            implicit: true,
            ..
        } = &node.kind
        {
            implicit_receivers.insert(*receiver);
        }
        let token = match &node.kind {
            ExprKind::Variable(name) => Some(name.clone()),
            ExprKind::FieldAccess { field, .. } => Some(field.name.clone()),
            ExprKind::ArrayLength(_) => Some("length".to_owned()),
            ExprKind::MethodCall { method, .. } => Some(method.name.clone()),
            ExprKind::StaticName(ty) | ExprKind::TypeLiteral(ty) => simple_type_name(ty),
            ExprKind::ConstructorCall { .. } => simple_type_name(&node.ty),
            ExprKind::Cast { target, .. } | ExprKind::InstanceOf { target, .. } => simple_type_name(target),
            ExprKind::Literal { text } if is_number(text) => Some(text.clone()),
            _ => None,
        };
        if let Some(token) = token {
            unique = seen.insert(token);
        }
    });
    unique
}

/// The last segment of a class name: `Entry` for `java.util.Map$Entry`. Primitives are keywords,
/// not names.
fn simple_type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Array(component) => simple_type_name(component),
        _ => ty
            .class_name()
            .and_then(|name| name.rsplit(['.', '$']).next())
            .map(str::to_owned),
    }
}

fn is_number(text: &str) -> bool {
    text.trim_start_matches('-')
        .starts_with(|c: char| c.is_ascii_digit() || c == '.')
}

#[cfg(test)]
mod tests {
    use nova_synth_bridge::{FieldInfo, MethodInfo, Modifiers};
    use nova_synth_syntax::ast::BinaryOp;

    use super::*;

    #[test]
    fn repeated_names_and_numbers_are_rejected() {
        let mut arena = ExprArena::new();
        let x = arena.variable("x", Type::int(), None);
        let y = arena.variable("y", Type::int(), None);
        let one = arena.int_literal(1);
        let other_one = arena.int_literal(1);
        let x_plus_y = arena.infix(BinaryOp::Add, x, y, Type::int(), None);
        let x_plus_x = arena.infix(BinaryOp::Add, x, x, Type::int(), None);
        let x_plus_1 = arena.infix(BinaryOp::Add, x, one, Type::int(), None);
        let twice = arena.infix(BinaryOp::Add, x_plus_1, other_one, Type::int(), None);
        assert!(is_unique(&arena, x_plus_y));
        assert!(!is_unique(&arena, x_plus_x));
        assert!(is_unique(&arena, x_plus_1));
        assert!(!is_unique(&arena, twice));
    }

    #[test]
    fn field_names_count_whatever_their_receiver() {
        let mut arena = ExprArena::new();
        let this = arena.this(Type::class("Main"), None);
        let field = FieldInfo::new("Main", "x", Type::int(), Modifiers::PUBLIC);
        let bare = arena.field_access(this, field.clone(), true, None);
        let local = arena.variable("x", Type::int(), None);
        let clash = arena.infix(BinaryOp::Add, bare, local, Type::int(), None);
        assert!(!is_unique(&arena, clash));

        let p = arena.variable("p", Type::class("Main"), None);
        let q = arena.variable("q", Type::class("Main"), None);
        let p_x = arena.field_access(p, field.clone(), false, None);
        let q_x = arena.field_access(q, field, false, None);
        let both = arena.infix(BinaryOp::Add, p_x, q_x, Type::int(), None);
        assert!(is_unique(&arena, p_x));
        assert!(!is_unique(&arena, both));
    }

    #[test]
    fn method_and_type_names_count_too() {
        let mut arena = ExprArena::new();
        let size = MethodInfo::new("java.util.List", "size", Vec::new(), Type::int(), Modifiers::PUBLIC);
        let a = arena.variable("a", Type::class("java.util.List"), None);
        let b = arena.variable("b", Type::class("java.util.List"), None);
        let a_size = arena.method_call(a, size.clone(), Vec::new(), false);
        let b_size = arena.method_call(b, size, Vec::new(), false);
        let sizes = arena.infix(BinaryOp::Add, a_size, b_size, Type::int(), None);
        assert!(is_unique(&arena, a_size));
        assert!(!is_unique(&arena, sizes));

        let max = MethodInfo::new("java.lang.Math", "max", vec![Type::int(), Type::int()], Type::int(), Modifiers::PUBLIC.with_static());
        let abs = MethodInfo::new("java.lang.Math", "abs", vec![Type::int()], Type::int(), Modifiers::PUBLIC.with_static());
        let math = arena.static_name(Type::class("java.lang.Math"), "Math");
        let other_math = arena.static_name(Type::class("java.lang.Math"), "Math");
        let y = arena.variable("y", Type::int(), None);
        let z = arena.variable("z", Type::int(), None);
        let inner = arena.method_call(other_math, abs, vec![z], false);
        let outer = arena.method_call(math, max, vec![y, inner], false);
        assert!(!is_unique(&arena, outer));
    }

    #[test]
    fn unwritten_receivers_do_not_count() {
        let mut arena = ExprArena::new();
        let f = MethodInfo::new("Main", "f", vec![Type::int()], Type::int(), Modifiers::PUBLIC.with_static());
        let g = MethodInfo::new("Main", "g", vec![Type::int()], Type::int(), Modifiers::PUBLIC.with_static());
        let x = arena.variable("x", Type::int(), None);
        let y = arena.variable("y", Type::int(), None);
        let main = arena.static_name(Type::class("Main"), "Main");
        let other_main = arena.static_name(Type::class("Main"), "Main");
        let f_x = arena.method_call(main, f, vec![x], true);
        let g_y = arena.method_call(other_main, g, vec![y], true);
        let sum = arena.infix(BinaryOp::Add, f_x, g_y, Type::int(), None);
        assert_eq!(arena.text(sum), "f(x) + g(y)");
        assert!(is_unique(&arena, sum));
    }

    #[test]
    fn strings_and_booleans_may_repeat() {
        let mut arena = ExprArena::new();
        let t = arena.bool_literal(true);
        let also_t = arena.bool_literal(true);
        let both = arena.infix(BinaryOp::And, t, also_t, Type::boolean(), None);
        assert!(is_unique(&arena, both));
    }
}
