//! Tree-walking evaluation of candidate batches.

use std::collections::{HashMap, HashSet};

use nova_synth_syntax::ast::{
    BinaryExpr, BinaryOp, CallExpr, Expr, LiteralExpr, LiteralKind, UnaryOp,
};
use nova_synth_syntax::parse_expression;

use super::{HeapKind, MockVm, Thrown};
use crate::{
    BatchOutcome, BatchRequest, BindingInit, PrimitiveType, SlotResult, Type, Value,
    CONSTRUCTOR_NAME, STRING,
};

/// Name the current candidate's value is bound to while its validity check runs.
const CURRENT_VALUE: &str = "_$curValue";

enum Receiver {
    Value(Value),
    Class(String),
}

#[derive(Clone, Copy)]
enum Num {
    I(i32),
    L(i64),
    F(f32),
    D(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        Some(match value {
            Value::Byte(v) => Num::I(i32::from(*v)),
            Value::Short(v) => Num::I(i32::from(*v)),
            Value::Char(v) => Num::I(u32::from(*v) as i32),
            Value::Int(v) => Num::I(*v),
            Value::Long(v) => Num::L(*v),
            Value::Float(v) => Num::F(*v),
            Value::Double(v) => Num::D(*v),
            _ => return None,
        })
    }

    fn rank(self) -> u8 {
        match self {
            Num::I(_) => 0,
            Num::L(_) => 1,
            Num::F(_) => 2,
            Num::D(_) => 3,
        }
    }

    fn to_rank(self, rank: u8) -> Num {
        match (self, rank) {
            (Num::I(v), 1) => Num::L(i64::from(v)),
            (Num::I(v), 2) => Num::F(v as f32),
            (Num::I(v), 3) => Num::D(f64::from(v)),
            (Num::L(v), 2) => Num::F(v as f32),
            (Num::L(v), 3) => Num::D(v as f64),
            (Num::F(v), 3) => Num::D(f64::from(v)),
            (n, _) => n,
        }
    }

    fn value(self) -> Value {
        match self {
            Num::I(v) => Value::Int(v),
            Num::L(v) => Value::Long(v),
            Num::F(v) => Value::Float(v),
            Num::D(v) => Value::Double(v),
        }
    }
}

fn arithmetic() -> Thrown {
    Thrown::new("java.lang.ArithmeticException", "/ by zero")
}

fn unescape(body: &str) -> String {
    let mut out = String::new();
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if let Some(c) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(c);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn parse_integral(text: &str) -> Option<i64> {
    let digits: String = text
        .trim_end_matches(['l', 'L'])
        .chars()
        .filter(|c| *c != '_')
        .collect();
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as i64);
    }
    digits.parse::<u64>().ok().map(|v| v as i64)
}

impl MockVm {
    pub(super) fn run_batch(&mut self, request: &BatchRequest) -> BatchOutcome {
        let bindings = match request
            .bindings
            .iter()
            .map(|b| match &b.init {
                BindingInit::Expression(src) => parse_expression(src)
                    .map(Some)
                    .map_err(|err| err.message),
                BindingInit::Value(_) => Ok(None),
            })
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(parsed) => parsed,
            Err(message) => return BatchOutcome::CompileError(message),
        };

        let mut names: HashSet<String> = self.frame.locals.iter().map(|l| l.name.clone()).collect();
        for (binding, parsed) in request.bindings.iter().zip(&bindings) {
            if let Some(expr) = parsed {
                if let Err(message) = self.check(expr, &names) {
                    return BatchOutcome::CompileError(message);
                }
            }
            names.insert(binding.name.clone());
        }

        let mut slots = Vec::with_capacity(request.slots.len());
        for slot in &request.slots {
            let guard = match slot.guard.as_deref().map(parse_expression).transpose() {
                Ok(guard) => guard,
                Err(err) => return BatchOutcome::CompileError(err.message),
            };
            let expr = match parse_expression(&slot.expression) {
                Ok(expr) => expr,
                Err(err) => return BatchOutcome::CompileError(err.message),
            };
            let validity = match parse_expression(&slot.validity) {
                Ok(expr) => expr,
                Err(err) => return BatchOutcome::CompileError(err.message),
            };
            let mut with_current = names.clone();
            with_current.insert(CURRENT_VALUE.to_owned());
            for (part, scope) in [(&expr, &names), (&validity, &with_current)] {
                if let Err(message) = self.check(part, scope) {
                    return BatchOutcome::CompileError(message);
                }
            }
            if let Some(guard) = &guard {
                if let Err(message) = self.check(guard, &names) {
                    return BatchOutcome::CompileError(message);
                }
            }
            slots.push((guard, expr, validity));
        }

        match self.execute(request, &bindings, &slots) {
            Ok(results) => BatchOutcome::Completed(results),
            Err(thrown) => BatchOutcome::Threw {
                exception_class: thrown.class,
                message: thrown.message,
            },
        }
    }

    fn execute(
        &mut self,
        request: &BatchRequest,
        bindings: &[Option<Expr>],
        slots: &[(Option<Expr>, Expr, Expr)],
    ) -> Result<Vec<SlotResult>, Thrown> {
        let mut scope: HashMap<String, Value> = self
            .frame
            .locals
            .iter()
            .map(|l| (l.name.clone(), l.value.clone()))
            .collect();
        for (binding, parsed) in request.bindings.iter().zip(bindings) {
            let value = match (&binding.init, parsed) {
                (BindingInit::Value(value), _) => value.clone(),
                (_, Some(expr)) => self.eval(expr, &scope)?,
                (BindingInit::Expression(_), None) => Value::default_for(&binding.ty),
            };
            scope.insert(binding.name.clone(), coerce(value, &binding.ty));
        }

        let mut results = Vec::with_capacity(slots.len());
        for (guard, expr, validity) in slots {
            if let Some(guard) = guard {
                if self.eval(guard, &scope)?.as_bool() != Some(true) {
                    results.push(SlotResult {
                        value: None,
                        valid: false,
                    });
                    request.heartbeat.beat();
                    continue;
                }
            }
            let value = coerce(self.eval(expr, &scope)?, &request.result_type);
            scope.insert(CURRENT_VALUE.to_owned(), value.clone());
            let valid = self.eval(validity, &scope)?.as_bool() == Some(true);
            scope.remove(CURRENT_VALUE);
            results.push(SlotResult {
                value: Some(value),
                valid,
            });
            request.heartbeat.beat();
        }
        Ok(results)
    }

    // ---- name checking -----------------------------------------------------------------------

    fn is_value_name(&self, name: &str, names: &HashSet<String>) -> bool {
        if names.contains(name) {
            return true;
        }
        if let Some(this) = self.frame.this.as_ref().and_then(Value::object_id) {
            if !self.frame.is_static && self.resolve_instance_field(this, name).is_some() {
                return true;
            }
        }
        self.resolve_static_field(&self.frame.declaring_type, name).is_some()
    }

    fn has_method_named(&self, class: &str, name: &str) -> bool {
        self.supertypes(class).iter().any(|c| {
            self.classes
                .get(c)
                .is_some_and(|info| info.methods.iter().any(|m| m.name == name))
        })
    }

    fn check(&self, expr: &Expr, names: &HashSet<String>) -> Result<(), String> {
        match expr {
            Expr::Literal(_) | Expr::This(_) | Expr::ClassLiteral(_) => Ok(()),
            Expr::Name(name) => {
                if self.is_value_name(&name.name, names) || self.resolve_class_name(&name.name).is_some() {
                    Ok(())
                } else {
                    Err(format!("{} cannot be resolved to a variable", name.name))
                }
            }
            Expr::FieldAccess(access) => {
                if let Some(qualified) = expr.as_qualified_name() {
                    let root = qualified.split('.').next().unwrap_or_default();
                    if !self.is_value_name(root, names) && self.resolve_class_name(&qualified).is_some() {
                        return Ok(());
                    }
                }
                self.check(&access.receiver, names)
            }
            Expr::ArrayAccess(access) => {
                self.check(&access.array, names)?;
                self.check(&access.index, names)
            }
            Expr::Call(call) => {
                match &call.receiver {
                    Some(receiver) => self.check(receiver, names)?,
                    None => {
                        let this_type = self
                            .frame
                            .this
                            .as_ref()
                            .map(|t| t.runtime_type().name())
                            .unwrap_or_else(|| self.frame.declaring_type.clone());
                        if !self.has_method_named(&this_type, &call.name) {
                            return Err(format!("The method {} is undefined", call.name));
                        }
                    }
                }
                call.args.iter().try_for_each(|arg| self.check(arg, names))
            }
            Expr::New(new) => {
                if self.resolve_class_name(&new.ty.name).is_none() {
                    return Err(format!("{} cannot be resolved to a type", new.ty.name));
                }
                new.args.iter().try_for_each(|arg| self.check(arg, names))
            }
            Expr::Binary(binary) => {
                self.check(&binary.lhs, names)?;
                self.check(&binary.rhs, names)
            }
            Expr::Unary(unary) => match unary.op {
                UnaryOp::PreInc | UnaryOp::PreDec => {
                    Err("Increment and decrement are not supported".to_owned())
                }
                _ => self.check(&unary.operand, names),
            },
            Expr::Postfix(_) => Err("Increment and decrement are not supported".to_owned()),
            Expr::Cast(cast) => self.check(&cast.expr, names),
            Expr::Paren(paren) => self.check(&paren.expr, names),
            Expr::Conditional(cond) => {
                self.check(&cond.condition, names)?;
                self.check(&cond.then_branch, names)?;
                self.check(&cond.else_branch, names)
            }
            Expr::InstanceOf(instance_of) => self.check(&instance_of.expr, names),
        }
    }

    // ---- evaluation --------------------------------------------------------------------------

    fn resolve_type(&self, name: &str) -> Type {
        match Type::parse(name) {
            Type::Class(class) => Type::Class(self.resolve_class_name(&class).unwrap_or(class)),
            Type::Array(component) => {
                let component = self.resolve_type(&component.name());
                Type::array_of(component)
            }
            other => other,
        }
    }

    fn read_name(&mut self, name: &str, scope: &HashMap<String, Value>) -> Result<Option<Value>, Thrown> {
        if let Some(value) = scope.get(name) {
            return Ok(Some(value.clone()));
        }
        if !self.frame.is_static {
            if let Some(this) = self.frame.this.clone() {
                if this
                    .object_id()
                    .is_some_and(|id| self.resolve_instance_field(id, name).is_some())
                {
                    return self.read_field(&this, name).map(Some);
                }
            }
        }
        let declaring = self.frame.declaring_type.clone();
        if self.resolve_static_field(&declaring, name).is_some() {
            return self.read_static(&declaring, name).map(Some);
        }
        Ok(None)
    }

    fn eval_receiver(&mut self, expr: &Expr, scope: &HashMap<String, Value>) -> Result<Receiver, Thrown> {
        if let Some(qualified) = expr.as_qualified_name() {
            let root = qualified.split('.').next().unwrap_or_default().to_owned();
            let names: HashSet<String> = scope.keys().cloned().collect();
            if !self.is_value_name(&root, &names) {
                if let Some(class) = self.resolve_class_name(&qualified) {
                    return Ok(Receiver::Class(class));
                }
            }
        }
        self.eval(expr, scope).map(Receiver::Value)
    }

    fn eval(&mut self, expr: &Expr, scope: &HashMap<String, Value>) -> Result<Value, Thrown> {
        self.check_interrupt()?;
        match expr {
            Expr::Literal(literal) => self.eval_literal(literal),
            Expr::Name(name) => self
                .read_name(&name.name, scope)?
                .ok_or_else(|| Thrown::new("java.lang.NoSuchFieldError", name.name.clone())),
            Expr::This(_) => Ok(self.frame.this.clone().unwrap_or(Value::Null)),
            Expr::FieldAccess(access) => match self.eval_receiver(&access.receiver, scope)? {
                Receiver::Class(class) => self.read_static(&class, &access.name),
                Receiver::Value(value) => {
                    if value.runtime_type().is_array() && access.name == "length" {
                        return self.array_length(&value).map(Value::Int);
                    }
                    if value.is_null() {
                        return Err(Thrown::null_pointer());
                    }
                    self.read_field(&value, &access.name)
                }
            },
            Expr::ArrayAccess(access) => {
                let array = self.eval(&access.array, scope)?;
                let index = self.eval(&access.index, scope)?;
                let index = index
                    .as_i64()
                    .ok_or_else(|| Thrown::new("java.lang.ClassCastException", "array index"))?;
                self.array_get(&array, index as i32)
            }
            Expr::Call(call) => self.eval_call(call, scope),
            Expr::New(new) => {
                let class = self
                    .resolve_class_name(&new.ty.name)
                    .ok_or_else(|| Thrown::new("java.lang.NoClassDefFoundError", new.ty.name.clone()))?;
                let args = new
                    .args
                    .iter()
                    .map(|arg| self.eval(arg, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                let object = self
                    .new_object(&class)
                    .map_err(|err| Thrown::new("java.lang.InstantiationError", err.to_string()))?;
                if self.natives.contains_key(&(class.clone(), CONSTRUCTOR_NAME.to_owned(), args.len())) {
                    self.invoke_in(&class, Some(&object), CONSTRUCTOR_NAME, &args)?;
                } else if !args.is_empty() {
                    return Err(Thrown::new("java.lang.NoSuchMethodError", format!("{class}.<init>")));
                }
                Ok(object)
            }
            Expr::Binary(binary) => self.eval_binary(binary, scope),
            Expr::Unary(unary) => {
                let operand = self.eval(&unary.operand, scope)?;
                match (unary.op, Num::of(&operand)) {
                    (UnaryOp::Not, _) => operand
                        .as_bool()
                        .map(|b| Value::Boolean(!b))
                        .ok_or_else(|| Thrown::new("java.lang.VerifyError", "! on a non-boolean")),
                    (UnaryOp::Plus, Some(n)) => Ok(n.to_rank(n.rank()).value()),
                    (UnaryOp::Neg, Some(n)) => Ok(match n {
                        Num::I(v) => Value::Int(v.wrapping_neg()),
                        Num::L(v) => Value::Long(v.wrapping_neg()),
                        Num::F(v) => Value::Float(-v),
                        Num::D(v) => Value::Double(-v),
                    }),
                    (UnaryOp::BitNot, Some(Num::I(v))) => Ok(Value::Int(!v)),
                    (UnaryOp::BitNot, Some(Num::L(v))) => Ok(Value::Long(!v)),
                    _ => Err(Thrown::new("java.lang.VerifyError", "bad unary operand")),
                }
            }
            Expr::Postfix(_) => Err(Thrown::new("java.lang.VerifyError", "increment")),
            Expr::Cast(cast) => {
                let value = self.eval(&cast.expr, scope)?;
                let target = self.resolve_type(&cast.ty.name);
                self.cast(value, &target)
            }
            Expr::Paren(paren) => self.eval(&paren.expr, scope),
            Expr::Conditional(cond) => {
                if self.eval(&cond.condition, scope)?.as_bool() == Some(true) {
                    self.eval(&cond.then_branch, scope)
                } else {
                    self.eval(&cond.else_branch, scope)
                }
            }
            Expr::InstanceOf(instance_of) => {
                let value = self.eval(&instance_of.expr, scope)?;
                let target = self.resolve_type(&instance_of.ty.name);
                Ok(Value::Boolean(
                    !value.is_null() && self.is_assignable(&value.runtime_type(), &target),
                ))
            }
            Expr::ClassLiteral(literal) => {
                let ty = self.resolve_type(&literal.ty.name);
                Ok(self.class_object(&ty.name()))
            }
        }
    }

    fn eval_literal(&mut self, literal: &LiteralExpr) -> Result<Value, Thrown> {
        let text = literal.text.as_str();
        let malformed = || Thrown::new("java.lang.NumberFormatException", text.to_owned());
        Ok(match literal.kind {
            LiteralKind::Int => Value::Int(parse_integral(text).ok_or_else(malformed)? as i32),
            LiteralKind::Long => Value::Long(parse_integral(text).ok_or_else(malformed)?),
            LiteralKind::Float => Value::Float(
                text.trim_end_matches(['f', 'F'])
                    .parse()
                    .map_err(|_| malformed())?,
            ),
            LiteralKind::Double => Value::Double(
                text.trim_end_matches(['d', 'D'])
                    .parse()
                    .map_err(|_| malformed())?,
            ),
            LiteralKind::Char => {
                let body = text.trim_start_matches('\'').trim_end_matches('\'');
                Value::Char(unescape(body).chars().next().unwrap_or('\0'))
            }
            LiteralKind::String => {
                let body = &text[1..text.len().saturating_sub(1).max(1)];
                let value = unescape(body);
                self.intern_string(&value)
            }
            LiteralKind::Boolean => Value::Boolean(text == "true"),
            LiteralKind::Null => Value::Null,
        })
    }

    fn eval_call(&mut self, call: &CallExpr, scope: &HashMap<String, Value>) -> Result<Value, Thrown> {
        let receiver = match &call.receiver {
            Some(receiver) => self.eval_receiver(receiver, scope)?,
            None => match self.frame.this.clone() {
                Some(this) if !self.frame.is_static => {
                    let class = this.runtime_type().name();
                    if self.find_native(&class, &call.name, call.args.len()).is_some() {
                        Receiver::Value(this)
                    } else {
                        Receiver::Class(self.frame.declaring_type.clone())
                    }
                }
                _ => Receiver::Class(self.frame.declaring_type.clone()),
            },
        };
        let args = call
            .args
            .iter()
            .map(|arg| self.eval(arg, scope))
            .collect::<Result<Vec<_>, _>>()?;
        match receiver {
            Receiver::Class(class) => self.invoke_static(&class, &call.name, &args),
            Receiver::Value(value) => self.invoke(&value, &call.name, &args),
        }
    }

    fn eval_binary(&mut self, binary: &BinaryExpr, scope: &HashMap<String, Value>) -> Result<Value, Thrown> {
        let lhs = self.eval(&binary.lhs, scope)?;
        match binary.op {
            BinaryOp::And if lhs.as_bool() == Some(false) => return Ok(Value::Boolean(false)),
            BinaryOp::Or if lhs.as_bool() == Some(true) => return Ok(Value::Boolean(true)),
            _ => {}
        }
        let rhs = self.eval(&binary.rhs, scope)?;

        if binary.op == BinaryOp::Add && (self.is_string(&lhs) || self.is_string(&rhs)) {
            let joined = format!("{}{}", self.display(&lhs), self.display(&rhs));
            return Ok(self.alloc_string(&joined));
        }

        if let (Some(a), Some(b)) = (lhs.as_bool(), rhs.as_bool()) {
            let result = match binary.op {
                BinaryOp::And | BinaryOp::BitAnd => a & b,
                BinaryOp::Or | BinaryOp::BitOr => a | b,
                BinaryOp::BitXor | BinaryOp::Ne => a ^ b,
                BinaryOp::Eq => a == b,
                _ => return Err(Thrown::new("java.lang.VerifyError", "boolean operands")),
            };
            return Ok(Value::Boolean(result));
        }

        let (Some(a), Some(b)) = (Num::of(&lhs), Num::of(&rhs)) else {
            return match binary.op {
                BinaryOp::Eq => Ok(Value::Boolean(same_reference(&lhs, &rhs))),
                BinaryOp::Ne => Ok(Value::Boolean(!same_reference(&lhs, &rhs))),
                _ => Err(Thrown::new("java.lang.VerifyError", "non-numeric operands")),
            };
        };

        if matches!(binary.op, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr) {
            let shift = match b {
                Num::I(v) => i64::from(v),
                Num::L(v) => v,
                _ => return Err(Thrown::new("java.lang.VerifyError", "shift distance")),
            };
            return match (binary.op, a) {
                (BinaryOp::Shl, Num::I(v)) => Ok(Value::Int(v.wrapping_shl(shift as u32))),
                (BinaryOp::Shr, Num::I(v)) => Ok(Value::Int(v.wrapping_shr(shift as u32))),
                (BinaryOp::UShr, Num::I(v)) => Ok(Value::Int((v as u32).wrapping_shr(shift as u32) as i32)),
                (BinaryOp::Shl, Num::L(v)) => Ok(Value::Long(v.wrapping_shl(shift as u32))),
                (BinaryOp::Shr, Num::L(v)) => Ok(Value::Long(v.wrapping_shr(shift as u32))),
                (BinaryOp::UShr, Num::L(v)) => Ok(Value::Long((v as u64).wrapping_shr(shift as u32) as i64)),
                _ => Err(Thrown::new("java.lang.VerifyError", "shift operand")),
            };
        }

        let rank = a.rank().max(b.rank());
        let (a, b) = (a.to_rank(rank), b.to_rank(rank));
        let op = binary.op;
        let result = match (a, b) {
            (Num::I(x), Num::I(y)) => match op {
                BinaryOp::Add => Value::Int(x.wrapping_add(y)),
                BinaryOp::Sub => Value::Int(x.wrapping_sub(y)),
                BinaryOp::Mul => Value::Int(x.wrapping_mul(y)),
                BinaryOp::Div if y == 0 => return Err(arithmetic()),
                BinaryOp::Div => Value::Int(x.wrapping_div(y)),
                BinaryOp::Rem if y == 0 => return Err(arithmetic()),
                BinaryOp::Rem => Value::Int(x.wrapping_rem(y)),
                BinaryOp::BitAnd => Value::Int(x & y),
                BinaryOp::BitOr => Value::Int(x | y),
                BinaryOp::BitXor => Value::Int(x ^ y),
                _ => compare(op, x.cmp(&y).into())?,
            },
            (Num::L(x), Num::L(y)) => match op {
                BinaryOp::Add => Value::Long(x.wrapping_add(y)),
                BinaryOp::Sub => Value::Long(x.wrapping_sub(y)),
                BinaryOp::Mul => Value::Long(x.wrapping_mul(y)),
                BinaryOp::Div if y == 0 => return Err(arithmetic()),
                BinaryOp::Div => Value::Long(x.wrapping_div(y)),
                BinaryOp::Rem if y == 0 => return Err(arithmetic()),
                BinaryOp::Rem => Value::Long(x.wrapping_rem(y)),
                BinaryOp::BitAnd => Value::Long(x & y),
                BinaryOp::BitOr => Value::Long(x | y),
                BinaryOp::BitXor => Value::Long(x ^ y),
                _ => compare(op, x.cmp(&y).into())?,
            },
            (Num::F(x), Num::F(y)) => match op {
                BinaryOp::Add => Value::Float(x + y),
                BinaryOp::Sub => Value::Float(x - y),
                BinaryOp::Mul => Value::Float(x * y),
                BinaryOp::Div => Value::Float(x / y),
                BinaryOp::Rem => Value::Float(x % y),
                _ => compare(op, x.partial_cmp(&y))?,
            },
            (x, y) => {
                let (Num::D(x), Num::D(y)) = (x.to_rank(3), y.to_rank(3)) else {
                    return Err(Thrown::new("java.lang.VerifyError", "numeric promotion"));
                };
                match op {
                    BinaryOp::Add => Value::Double(x + y),
                    BinaryOp::Sub => Value::Double(x - y),
                    BinaryOp::Mul => Value::Double(x * y),
                    BinaryOp::Div => Value::Double(x / y),
                    BinaryOp::Rem => Value::Double(x % y),
                    _ => compare(op, x.partial_cmp(&y))?,
                }
            }
        };
        Ok(result)
    }

    fn cast(&self, value: Value, target: &Type) -> Result<Value, Thrown> {
        if let Some(primitive) = target.as_primitive() {
            if primitive == PrimitiveType::Boolean {
                return match value {
                    Value::Boolean(_) => Ok(value),
                    _ => Err(Thrown::new("java.lang.ClassCastException", "boolean")),
                };
            }
            let n = Num::of(&value)
                .ok_or_else(|| Thrown::new("java.lang.ClassCastException", target.name()))?;
            let wide = match n {
                Num::I(v) => f64::from(v),
                Num::L(v) => v as f64,
                Num::F(v) => f64::from(v),
                Num::D(v) => v,
            };
            let integral = match n {
                Num::I(v) => i64::from(v),
                Num::L(v) => v,
                Num::F(v) => v as i64,
                Num::D(v) => v as i64,
            };
            return Ok(match primitive {
                PrimitiveType::Byte => Value::Byte(integral as i8),
                PrimitiveType::Short => Value::Short(integral as i16),
                PrimitiveType::Char => Value::Char(char::from_u32(integral as u16 as u32).unwrap_or('\0')),
                PrimitiveType::Int => Value::Int(match n {
                    Num::F(v) => v as i32,
                    Num::D(v) => v as i32,
                    _ => integral as i32,
                }),
                PrimitiveType::Long => Value::Long(integral),
                PrimitiveType::Float => Value::Float(wide as f32),
                PrimitiveType::Double => Value::Double(wide),
                PrimitiveType::Boolean => value,
            });
        }
        if value.is_null() || self.is_assignable(&value.runtime_type(), target) {
            Ok(value)
        } else {
            Err(Thrown::new(
                "java.lang.ClassCastException",
                format!("{} cannot be cast to {}", value.runtime_type(), target),
            ))
        }
    }

    fn is_string(&self, value: &Value) -> bool {
        matches!(value, Value::Object(obj) if obj.runtime_type == STRING)
    }

    /// `String.valueOf` rendering.
    pub(crate) fn display(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_owned(),
            Value::Void => String::new(),
            Value::Boolean(v) => v.to_string(),
            Value::Byte(v) => v.to_string(),
            Value::Short(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::Float(v) => format!("{v:?}"),
            Value::Double(v) => format!("{v:?}"),
            Value::Char(v) => v.to_string(),
            Value::Object(obj) => match self.heap.get(&obj.id).map(|o| &o.kind) {
                Some(HeapKind::Str(s)) => s.clone(),
                Some(HeapKind::ClassObject(name)) => format!("class {name}"),
                _ => format!("{}@{:x}", obj.runtime_type, obj.id),
            },
        }
    }
}

fn same_reference(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Object(a), Value::Object(b)) => a.id == b.id,
        _ => false,
    }
}

fn compare(op: BinaryOp, ordering: Option<std::cmp::Ordering>) -> Result<Value, Thrown> {
    use std::cmp::Ordering::*;
    let result = match (op, ordering) {
        (BinaryOp::Eq, o) => o == Some(Equal),
        (BinaryOp::Ne, o) => o != Some(Equal),
        (_, None) => false,
        (BinaryOp::Lt, Some(o)) => o == Less,
        (BinaryOp::Le, Some(o)) => o != Greater,
        (BinaryOp::Gt, Some(o)) => o == Greater,
        (BinaryOp::Ge, Some(o)) => o != Less,
        _ => return Err(Thrown::new("java.lang.VerifyError", format!("operator {op}"))),
    };
    Ok(Value::Boolean(result))
}

/// Assignment conversion into a slot of type `ty`.
fn coerce(value: Value, ty: &Type) -> Value {
    let Some(target) = ty.as_primitive() else {
        return value;
    };
    let Some(n) = Num::of(&value) else {
        return value;
    };
    match (target, n) {
        (PrimitiveType::Long, Num::I(v)) => Value::Long(i64::from(v)),
        (PrimitiveType::Float, Num::I(v)) => Value::Float(v as f32),
        (PrimitiveType::Float, Num::L(v)) => Value::Float(v as f32),
        (PrimitiveType::Double, n) => n.to_rank(3).value(),
        (PrimitiveType::Int, Num::I(v)) => Value::Int(v),
        _ => value,
    }
}
