//! What the user demonstrated: a value, a type, or a predicate over the result.
//!
//! Every property reduces to a boolean Java expression over `_$curValue` that the evaluation
//! manager splices into each batch slot, plus the type constraint that seeds the search.

use std::collections::BTreeSet;
use std::fmt;

use nova_synth_bridge::{
    Binding, BindingInit, EventContext, FrameInfo, LocalVariable, Type, Value, STRING,
};
use nova_synth_syntax::ast::{CallExpr, Expr};
use nova_synth_syntax::{is_identifier_part, parse_expression, print_with};

use crate::constraint::TypeConstraint;
use crate::types::TypeStore;
use crate::{SynthError, SynthResult};

/// Name the candidate's value is bound to inside validity checks.
pub const CURRENT_VALUE: &str = "_$curValue";

const DEMONSTRATION: &str = "_$demonstration";
const PRE_PREFIX: &str = "_$pre_$";
const HELPER_CLASS: &str = "CodeHint";

pub trait Property: fmt::Debug + Send + Sync {
    /// Constraint on candidate types. `static_type` is the declared type of the assigned
    /// variable, if there is one.
    fn initial_constraint(&self, store: &TypeStore, static_type: Option<&Type>) -> TypeConstraint;

    /// Boolean source checking one candidate whose value is named `current`.
    fn validity(&self, current: &str) -> String;

    /// Variables declared ahead of every candidate in a batch.
    fn bindings(&self) -> Vec<Binding> {
        Vec::new()
    }

    /// A concrete demonstrated value the generator may offer as a literal.
    fn demonstration(&self) -> Option<&Value> {
        None
    }
}

fn static_type_constraint(static_type: Option<&Type>) -> TypeConstraint {
    match static_type {
        Some(ty) => TypeConstraint::SupertypeBound(ty.clone()),
        None => TypeConstraint::Unconstrained,
    }
}

/// The result must equal a demonstrated value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueProperty {
    value: Value,
    /// Contents of a demonstrated `String`.
    text: Option<String>,
}

impl ValueProperty {
    /// Reads the contents of string values up front, so validity checks compare by content.
    pub fn new<C: EventContext + ?Sized>(value: Value, cx: &mut C) -> SynthResult<Self> {
        let text = match &value {
            Value::Object(obj) if obj.runtime_type == STRING => Some(cx.string_value(obj.id)?),
            _ => None,
        };
        Ok(Self { value, text })
    }

    /// A property over a primitive or `null` value, which needs no heap access.
    pub fn primitive(value: Value) -> Self {
        Self { value, text: None }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Property for ValueProperty {
    fn initial_constraint(&self, _store: &TypeStore, static_type: Option<&Type>) -> TypeConstraint {
        match &self.value {
            Value::Null | Value::Void => static_type_constraint(static_type),
            value => TypeConstraint::Desired(value.runtime_type()),
        }
    }

    fn validity(&self, current: &str) -> String {
        if let Some(text) = &self.text {
            return format!("{}.equals({current})", string_literal(text));
        }
        match &self.value {
            Value::Object(_) => format!("{current} == {DEMONSTRATION}"),
            Value::Double(v) if v.is_nan() => format!("{current} != {current}"),
            Value::Float(v) if v.is_nan() => format!("{current} != {current}"),
            value => format!("{current} == {}", primitive_literal(value)),
        }
    }

    fn bindings(&self) -> Vec<Binding> {
        match &self.value {
            Value::Object(obj) if self.text.is_none() => vec![Binding {
                name: DEMONSTRATION.to_owned(),
                ty: Type::parse(&obj.runtime_type),
                init: BindingInit::Value(self.value.clone()),
            }],
            _ => Vec::new(),
        }
    }

    fn demonstration(&self) -> Option<&Value> {
        Some(&self.value)
    }
}

/// Java source for a primitive or `null` value.
pub fn primitive_literal(value: &Value) -> String {
    match value {
        Value::Null | Value::Void | Value::Object(_) => "null".to_owned(),
        Value::Boolean(v) => v.to_string(),
        Value::Byte(v) => format!("(byte) {v}"),
        Value::Short(v) => format!("(short) {v}"),
        Value::Int(i32::MIN) => "(-2147483647 - 1)".to_owned(),
        Value::Int(v) => v.to_string(),
        Value::Long(i64::MIN) => "(-9223372036854775807L - 1L)".to_owned(),
        Value::Long(v) => format!("{v}L"),
        Value::Float(v) if v.is_infinite() => {
            let sign = if *v < 0.0 { "-" } else { "" };
            format!("({sign}1.0f / 0.0f)")
        }
        Value::Float(v) => format!("{v:?}f"),
        Value::Double(v) if v.is_infinite() => {
            let sign = if *v < 0.0 { "-" } else { "" };
            format!("({sign}1.0 / 0.0)")
        }
        Value::Double(v) => format!("{v:?}"),
        Value::Char(c) => char_literal(*c),
    }
}

fn escape(c: char, quote: char, out: &mut String) {
    match c {
        '\\' => out.push_str("\\\\"),
        '\n' => out.push_str("\\n"),
        '\t' => out.push_str("\\t"),
        '\r' => out.push_str("\\r"),
        c if c == quote => {
            out.push('\\');
            out.push(c);
        }
        c if c.is_control() => out.push_str(&format!("\\u{:04x}", u32::from(c))),
        c => out.push(c),
    }
}

pub fn char_literal(c: char) -> String {
    let mut out = String::from("'");
    escape(c, '\'', &mut out);
    out.push('\'');
    out
}

pub fn string_literal(text: &str) -> String {
    let mut out = String::from("\"");
    for c in text.chars() {
        escape(c, '"', &mut out);
    }
    out.push('"');
    out
}

/// The result must have (a subtype of) a given type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeProperty {
    ty: Type,
}

impl TypeProperty {
    pub fn new(ty: Type) -> Self {
        Self { ty }
    }
}

impl Property for TypeProperty {
    fn initial_constraint(&self, _store: &TypeStore, _static_type: Option<&Type>) -> TypeConstraint {
        TypeConstraint::SupertypeBound(self.ty.clone())
    }

    fn validity(&self, _current: &str) -> String {
        "true".to_owned()
    }
}

/// `x => body`, optionally with a declared parameter type: `(List x) => x.isEmpty()`.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaProperty {
    param: String,
    type_name: Option<String>,
    body: Expr,
    text: String,
}

impl LambdaProperty {
    pub fn parse(text: &str) -> SynthResult<Self> {
        let Some((head, body_text)) = text.split_once("=>") else {
            return Err(SynthError::Specification(
                "Enter a lambda expression of the form x => body.".to_owned(),
            ));
        };
        let head = head.trim();
        let head = head
            .strip_prefix('(')
            .and_then(|h| h.strip_suffix(')'))
            .unwrap_or(head)
            .trim();
        let (type_name, param) = match head.rsplit_once(char::is_whitespace) {
            Some((ty, param)) => (Some(ty.trim().to_owned()), param.trim()),
            None => (None, head),
        };
        if param.is_empty() || !param.chars().all(is_identifier_part) {
            return Err(SynthError::Specification(format!(
                "{param} is not a valid lambda parameter"
            )));
        }
        let body = parse_expression(body_text.trim())?;
        Ok(Self {
            param: param.to_owned(),
            type_name,
            body,
            text: text.trim().to_owned(),
        })
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }
}

impl Property for LambdaProperty {
    fn initial_constraint(&self, store: &TypeStore, static_type: Option<&Type>) -> TypeConstraint {
        match self.type_name.as_deref().and_then(|name| store.resolve_type(name)) {
            Some(ty) => TypeConstraint::SupertypeBound(ty),
            None => static_type_constraint(static_type),
        }
    }

    fn validity(&self, current: &str) -> String {
        print_with(&self.body, &mut |expr| match expr {
            Expr::Name(name) if name.name == self.param => Some(current.to_owned()),
            _ => None,
        })
    }
}

impl fmt::Display for LambdaProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A predicate relating the state before and after the assignment `lhs = candidate`.
///
/// `x'` is the value of `x` afterwards (the candidate itself when `x` is the assigned
/// variable); plain variables and `CodeHint.pre(x)` read the value from before the batch ran.
#[derive(Debug, Clone, PartialEq)]
pub struct StateProperty {
    lhs: String,
    property: Expr,
    text: String,
    pre_variables: Vec<LocalVariable>,
}

impl StateProperty {
    pub fn parse(lhs: &str, text: &str, frame: &FrameInfo) -> SynthResult<Self> {
        if text.trim().is_empty() {
            return Err(SynthError::Specification("Please enter a property.".to_owned()));
        }
        let property = parse_expression(&desugar_primes(text)).map_err(|err| {
            SynthError::Specification(format!("Enter a valid expression: {}", err.message))
        })?;
        check_pre_post_calls(&property)?;
        let names = pre_variable_names(&property, frame);
        let pre_variables = frame
            .locals
            .iter()
            .filter(|local| names.contains(&local.name))
            .cloned()
            .collect();
        Ok(Self {
            lhs: lhs.to_owned(),
            property,
            text: text.to_owned(),
            pre_variables,
        })
    }

    /// Frame variables whose pre-state values the predicate reads.
    pub fn pre_variables(&self) -> impl Iterator<Item = &str> {
        self.pre_variables.iter().map(|local| local.name.as_str())
    }
}

pub fn pre_name(variable: &str) -> String {
    format!("{PRE_PREFIX}{variable}")
}

impl Property for StateProperty {
    fn initial_constraint(&self, _store: &TypeStore, static_type: Option<&Type>) -> TypeConstraint {
        static_type_constraint(static_type)
    }

    fn validity(&self, current: &str) -> String {
        let frame_names: BTreeSet<&str> = self.pre_variables().collect();
        print_with(&self.property, &mut |expr| match expr {
            Expr::Call(call) if is_helper_call(call, "pre") => single_name(call).map(pre_name),
            Expr::Call(call) if is_helper_call(call, "post") => single_name(call).map(|name| {
                if name == self.lhs {
                    current.to_owned()
                } else {
                    name.to_owned()
                }
            }),
            Expr::Name(name) if frame_names.contains(name.name.as_str()) => Some(pre_name(&name.name)),
            _ => None,
        })
    }

    fn bindings(&self) -> Vec<Binding> {
        self.pre_variables
            .iter()
            .map(|local| Binding {
                name: pre_name(&local.name),
                ty: local.ty.clone(),
                init: BindingInit::Expression(local.name.clone()),
            })
            .collect()
    }
}

impl fmt::Display for StateProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Rewrites `x'` to `CodeHint.post(x)`, leaving character and string literals alone.
fn desugar_primes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                out.push(c);
                while let Some(c) = chars.next() {
                    out.push(c);
                    match c {
                        '\\' => out.extend(chars.next()),
                        '"' => break,
                        _ => {}
                    }
                }
            }
            '\'' if out.chars().next_back().is_some_and(is_identifier_part) => {
                let start = out
                    .char_indices()
                    .rev()
                    .take_while(|(_, c)| is_identifier_part(*c))
                    .last()
                    .map_or(out.len(), |(i, _)| i);
                let name = out.split_off(start);
                out.push_str(&format!("{HELPER_CLASS}.post({name})"));
            }
            '\'' => {
                out.push(c);
                while let Some(c) = chars.next() {
                    out.push(c);
                    match c {
                        '\\' => out.extend(chars.next()),
                        '\'' => break,
                        _ => {}
                    }
                }
            }
            c => out.push(c),
        }
    }
    out
}

fn is_helper_call(call: &CallExpr, name: &str) -> bool {
    call.name == name
        && matches!(call.receiver.as_deref(), Some(Expr::Name(receiver)) if receiver.name == HELPER_CLASS)
}

fn single_name(call: &CallExpr) -> Option<&str> {
    match call.args.as_slice() {
        [Expr::Name(name)] => Some(&name.name),
        _ => None,
    }
}

fn for_each_child(expr: &Expr, f: &mut dyn FnMut(&Expr)) {
    match expr {
        Expr::Literal(_) | Expr::Name(_) | Expr::This(_) | Expr::ClassLiteral(_) => {}
        Expr::FieldAccess(access) => f(&access.receiver),
        Expr::ArrayAccess(access) => {
            f(&access.array);
            f(&access.index);
        }
        Expr::Call(call) => {
            if let Some(receiver) = &call.receiver {
                f(receiver);
            }
            call.args.iter().for_each(&mut *f);
        }
        Expr::New(new) => new.args.iter().for_each(f),
        Expr::Binary(bin) => {
            f(&bin.lhs);
            f(&bin.rhs);
        }
        Expr::Unary(un) => f(&un.operand),
        Expr::Postfix(post) => f(&post.operand),
        Expr::Cast(cast) => f(&cast.expr),
        Expr::Paren(paren) => f(&paren.expr),
        Expr::Conditional(cond) => {
            f(&cond.condition);
            f(&cond.then_branch);
            f(&cond.else_branch);
        }
        Expr::InstanceOf(inst) => f(&inst.expr),
    }
}

fn check_pre_post_calls(expr: &Expr) -> SynthResult<()> {
    if let Expr::Call(call) = expr {
        if (is_helper_call(call, "pre") || is_helper_call(call, "post")) && single_name(call).is_none() {
            let args = match call.args.as_slice() {
                [arg] => nova_synth_syntax::print(arg),
                args => format!(
                    "[{}]",
                    args.iter().map(nova_synth_syntax::print).collect::<Vec<_>>().join(", ")
                ),
            };
            return Err(SynthError::Specification(format!(
                "Call to {} must take in only a variable, not {args}",
                call.name
            )));
        }
    }
    let mut result = Ok(());
    for_each_child(expr, &mut |child| {
        if result.is_ok() {
            result = check_pre_post_calls(child);
        }
    });
    result
}

fn pre_variable_names(expr: &Expr, frame: &FrameInfo) -> BTreeSet<String> {
    fn visit(expr: &Expr, frame: &FrameInfo, out: &mut BTreeSet<String>) {
        match expr {
            Expr::Call(call) if is_helper_call(call, "pre") => {
                out.extend(single_name(call).map(str::to_owned));
                return;
            }
            Expr::Call(call) if is_helper_call(call, "post") => return,
            Expr::Name(name) if frame.locals.iter().any(|l| l.name == name.name) => {
                out.insert(name.name.clone());
            }
            _ => {}
        }
        for_each_child(expr, &mut |child| visit(child, frame, out));
    }
    let mut out = BTreeSet::new();
    visit(expr, frame, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use nova_synth_bridge::mock::MockVm;
    use nova_synth_bridge::ExecutionBridge;
    use pretty_assertions::assert_eq;

    use super::*;

    fn frame_with(locals: &[(&str, Type, Value)]) -> FrameInfo {
        let mut vm = MockVm::new();
        for (name, ty, value) in locals {
            vm.add_local(name, ty.clone(), value.clone());
        }
        vm.frame().unwrap()
    }

    #[test]
    fn primes_become_post_calls() {
        assert_eq!(desugar_primes("x' == x + 1"), "CodeHint.post(x) == x + 1");
        assert_eq!(desugar_primes("c == 'a' && s' != \"it's\""), "c == 'a' && CodeHint.post(s) != \"it's\"");
        assert_eq!(desugar_primes("'\\'' == c'"), "'\\'' == CodeHint.post(c)");
    }

    #[test]
    fn state_property_reads_pre_state_and_candidate() {
        let frame = frame_with(&[("x", Type::int(), Value::Int(3)), ("y", Type::int(), Value::Int(1))]);
        let property = StateProperty::parse("x", "x' == x + CodeHint.pre(y) && y' > 0", &frame).unwrap();
        assert_eq!(property.pre_variables().collect::<Vec<_>>(), ["x", "y"]);
        assert_eq!(
            property.validity(CURRENT_VALUE),
            "_$curValue == _$pre_$x + _$pre_$y && y > 0"
        );
        let bindings = property.bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].name, "_$pre_$x");
        assert_eq!(bindings[0].init, BindingInit::Expression("x".to_owned()));
    }

    #[test]
    fn state_property_rejects_non_variable_arguments() {
        let frame = frame_with(&[("x", Type::int(), Value::Int(3))]);
        let err = StateProperty::parse("x", "CodeHint.post(x + 1) > 0", &frame).unwrap_err();
        assert_eq!(err.to_string(), "invalid specification: Call to post must take in only a variable, not x + 1");
        let err = StateProperty::parse("x", "  ", &frame).unwrap_err();
        assert_eq!(err.to_string(), "invalid specification: Please enter a property.");
    }

    #[test]
    fn value_property_checks() {
        assert_eq!(ValueProperty::primitive(Value::Int(5)).validity(CURRENT_VALUE), "_$curValue == 5");
        assert_eq!(ValueProperty::primitive(Value::Long(5)).validity("v"), "v == 5L");
        assert_eq!(ValueProperty::primitive(Value::Double(f64::NAN)).validity("v"), "v != v");
        assert_eq!(ValueProperty::primitive(Value::Char('\'')).validity("v"), "v == '\\''");
        assert_eq!(ValueProperty::primitive(Value::Null).validity("v"), "v == null");

        let mut vm = MockVm::new();
        let text = vm.alloc_string("a\"b");
        let property = ValueProperty::new(text, &mut vm).unwrap();
        assert_eq!(property.validity("v"), "\"a\\\"b\".equals(v)");
        assert!(property.bindings().is_empty());

        let object = vm.new_object("Main").unwrap();
        let property = ValueProperty::new(object.clone(), &mut vm).unwrap();
        assert_eq!(property.validity("v"), "v == _$demonstration");
        assert_eq!(property.bindings()[0].init, BindingInit::Value(object));
    }

    #[test]
    fn lambda_property_substitutes_parameter() {
        let property = LambdaProperty::parse("(int x) => x > 0 && x % 2 == 0").unwrap();
        assert_eq!(property.type_name(), Some("int"));
        assert_eq!(property.validity("_$curValue"), "_$curValue > 0 && _$curValue % 2 == 0");
        let untyped = LambdaProperty::parse("s => s.isEmpty()").unwrap();
        assert_eq!(untyped.type_name(), None);
        assert_eq!(untyped.validity("v"), "v.isEmpty()");
        assert!(LambdaProperty::parse("x > 0").is_err());
    }
}
