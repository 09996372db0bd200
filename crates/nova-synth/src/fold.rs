//! Computing operator results from already-known operand values.
//!
//! The search uses these to attach values to operator expressions without a round-trip to the
//! process. Anything that would need the heap (string concatenation) or would throw
//! (division by zero) yields `None`.

use std::cmp::Ordering;

use nova_synth_bridge::Value;
use nova_synth_syntax::ast::{BinaryOp, UnaryOp};

#[derive(Clone, Copy)]
enum Promoted {
    Int(i32, i32),
    Long(i64, i64),
    Float(f32, f32),
    Double(f64, f64),
}

fn promote(lhs: &Value, rhs: &Value) -> Option<Promoted> {
    let is = |v: &Value, double: bool| match v {
        Value::Double(_) => double,
        Value::Float(_) => !double,
        _ => false,
    };
    if is(lhs, true) || is(rhs, true) {
        return Some(Promoted::Double(lhs.as_f64()?, rhs.as_f64()?));
    }
    if is(lhs, false) || is(rhs, false) {
        return Some(Promoted::Float(lhs.as_f64()? as f32, rhs.as_f64()? as f32));
    }
    let (a, b) = (lhs.as_i64()?, rhs.as_i64()?);
    if matches!(lhs, Value::Long(_)) || matches!(rhs, Value::Long(_)) {
        Some(Promoted::Long(a, b))
    } else {
        Some(Promoted::Int(a as i32, b as i32))
    }
}

fn compare(op: BinaryOp, ordering: Option<Ordering>) -> Option<Value> {
    let result = match op {
        BinaryOp::Eq => ordering == Some(Ordering::Equal),
        BinaryOp::Ne => ordering != Some(Ordering::Equal),
        BinaryOp::Lt => ordering == Some(Ordering::Less),
        BinaryOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        BinaryOp::Gt => ordering == Some(Ordering::Greater),
        BinaryOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        _ => return None,
    };
    Some(Value::Boolean(result))
}

macro_rules! integral {
    ($op:expr, $a:expr, $b:expr, $wrap:path) => {
        match $op {
            BinaryOp::Add => Some($wrap($a.wrapping_add($b))),
            BinaryOp::Sub => Some($wrap($a.wrapping_sub($b))),
            BinaryOp::Mul => Some($wrap($a.wrapping_mul($b))),
            BinaryOp::Div => ($b != 0).then(|| $wrap($a.wrapping_div($b))),
            BinaryOp::Rem => ($b != 0).then(|| $wrap($a.wrapping_rem($b))),
            BinaryOp::BitAnd => Some($wrap($a & $b)),
            BinaryOp::BitOr => Some($wrap($a | $b)),
            BinaryOp::BitXor => Some($wrap($a ^ $b)),
            op => compare(op, Some($a.cmp(&$b))),
        }
    };
}

macro_rules! floating {
    ($op:expr, $a:expr, $b:expr, $wrap:path) => {
        match $op {
            BinaryOp::Add => Some($wrap($a + $b)),
            BinaryOp::Sub => Some($wrap($a - $b)),
            BinaryOp::Mul => Some($wrap($a * $b)),
            BinaryOp::Div => Some($wrap($a / $b)),
            BinaryOp::Rem => Some($wrap($a % $b)),
            op => compare(op, $a.partial_cmp(&$b)),
        }
    };
}

pub fn fold_infix(op: BinaryOp, lhs: &Value, rhs: &Value) -> Option<Value> {
    if let (Some(a), Some(b)) = (lhs.as_bool(), rhs.as_bool()) {
        return Some(Value::Boolean(match op {
            BinaryOp::And | BinaryOp::BitAnd => a && b,
            BinaryOp::Or | BinaryOp::BitOr => a || b,
            BinaryOp::BitXor | BinaryOp::Ne => a != b,
            BinaryOp::Eq => a == b,
            _ => return None,
        }));
    }
    match (lhs, rhs) {
        (Value::Null | Value::Object(_), Value::Null | Value::Object(_)) => {
            let same = lhs.object_id() == rhs.object_id();
            return match op {
                BinaryOp::Eq => Some(Value::Boolean(same)),
                BinaryOp::Ne => Some(Value::Boolean(!same)),
                _ => None,
            };
        }
        (Value::Object(_), _) | (_, Value::Object(_)) => return None,
        _ => {}
    }
    if matches!(op, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr) {
        return None;
    }
    match promote(lhs, rhs)? {
        Promoted::Int(a, b) => integral!(op, a, b, Value::Int),
        Promoted::Long(a, b) => integral!(op, a, b, Value::Long),
        Promoted::Float(a, b) => floating!(op, a, b, Value::Float),
        Promoted::Double(a, b) => floating!(op, a, b, Value::Double),
    }
}

pub fn fold_prefix(op: UnaryOp, operand: &Value) -> Option<Value> {
    match (op, operand) {
        (UnaryOp::Not, Value::Boolean(b)) => Some(Value::Boolean(!b)),
        (UnaryOp::Neg, Value::Int(v)) => Some(Value::Int(v.wrapping_neg())),
        (UnaryOp::Neg, Value::Long(v)) => Some(Value::Long(v.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(v)) => Some(Value::Float(-v)),
        (UnaryOp::Neg, Value::Double(v)) => Some(Value::Double(-v)),
        (UnaryOp::Neg | UnaryOp::Plus | UnaryOp::BitNot, other) => {
            let v = other.as_i64()? as i32;
            Some(Value::Int(match op {
                UnaryOp::Neg => v.wrapping_neg(),
                UnaryOp::BitNot => !v,
                _ => v,
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use nova_synth_bridge::ObjectRef;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn integer_arithmetic_wraps_and_refuses_division_by_zero() {
        assert_eq!(fold_infix(BinaryOp::Add, &Value::Int(2), &Value::Int(3)), Some(Value::Int(5)));
        assert_eq!(
            fold_infix(BinaryOp::Add, &Value::Int(i32::MAX), &Value::Int(1)),
            Some(Value::Int(i32::MIN))
        );
        assert_eq!(fold_infix(BinaryOp::Div, &Value::Int(7), &Value::Int(0)), None);
        assert_eq!(fold_infix(BinaryOp::Div, &Value::Int(7), &Value::Int(2)), Some(Value::Int(3)));
        assert_eq!(fold_infix(BinaryOp::Mul, &Value::Int(2), &Value::Long(3)), Some(Value::Long(6)));
        assert_eq!(fold_infix(BinaryOp::Lt, &Value::Int(2), &Value::Int(3)), Some(Value::Boolean(true)));
        assert_eq!(
            fold_infix(BinaryOp::Add, &Value::Int(1), &Value::Double(0.5)),
            Some(Value::Double(1.5))
        );
    }

    #[test]
    fn references_compare_by_identity() {
        let a = Value::Object(ObjectRef {
            id: 1,
            runtime_type: "A".to_owned(),
        });
        assert_eq!(fold_infix(BinaryOp::Eq, &a, &a), Some(Value::Boolean(true)));
        assert_eq!(fold_infix(BinaryOp::Ne, &a, &Value::Null), Some(Value::Boolean(true)));
        assert_eq!(fold_infix(BinaryOp::Add, &a, &Value::Int(1)), None);
    }

    #[test]
    fn prefix_operators() {
        assert_eq!(fold_prefix(UnaryOp::Not, &Value::Boolean(true)), Some(Value::Boolean(false)));
        assert_eq!(fold_prefix(UnaryOp::Neg, &Value::Int(4)), Some(Value::Int(-4)));
        assert_eq!(fold_prefix(UnaryOp::Not, &Value::Int(4)), None);
    }
}
