//! Renders syntax trees back to Java source.
//!
//! Parentheses are emitted only where precedence requires them; explicit [`Expr::Paren`] nodes are
//! kept as written.

use crate::ast::Expr;

const ATOM: u8 = 100;
const UNARY: u8 = 80;
const POSTFIX: u8 = 90;
const INSTANCEOF: u8 = 50;
const CONDITIONAL: u8 = 10;

pub fn print(expr: &Expr) -> String {
    print_with(expr, &mut |_| None)
}

/// Like [`print`], but `rewrite` may replace any subtree with its own text. Replacements are
/// treated as atoms.
pub fn print_with(expr: &Expr, rewrite: &mut dyn FnMut(&Expr) -> Option<String>) -> String {
    let mut printer = Printer {
        out: String::new(),
        rewrite,
    };
    printer.expr(expr, 0);
    printer.out
}

struct Printer<'a> {
    out: String,
    rewrite: &'a mut dyn FnMut(&Expr) -> Option<String>,
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Conditional(_) => CONDITIONAL,
        Expr::Binary(bin) => bin.op.binding_power().0,
        Expr::InstanceOf(_) => INSTANCEOF,
        Expr::Unary(_) | Expr::Cast(_) => UNARY,
        Expr::Postfix(_) => POSTFIX,
        _ => ATOM,
    }
}

impl Printer<'_> {
    fn expr(&mut self, expr: &Expr, min: u8) {
        if let Some(text) = (self.rewrite)(expr) {
            self.out.push_str(&text);
            return;
        }
        let wrap = precedence(expr) < min;
        if wrap {
            self.out.push('(');
        }
        self.node(expr);
        if wrap {
            self.out.push(')');
        }
    }

    fn node(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(lit) => self.out.push_str(&lit.text),
            Expr::Name(name) => self.out.push_str(&name.name),
            Expr::This(_) => self.out.push_str("this"),
            Expr::FieldAccess(access) => {
                self.expr(&access.receiver, ATOM);
                self.out.push('.');
                self.out.push_str(&access.name);
            }
            Expr::ArrayAccess(access) => {
                self.expr(&access.array, ATOM);
                self.out.push('[');
                self.expr(&access.index, 0);
                self.out.push(']');
            }
            Expr::Call(call) => {
                if let Some(receiver) = &call.receiver {
                    self.expr(receiver, ATOM);
                    self.out.push('.');
                }
                self.out.push_str(&call.name);
                self.args(&call.args);
            }
            Expr::New(new) => {
                self.out.push_str("new ");
                self.out.push_str(&new.ty.name);
                self.args(&new.args);
            }
            Expr::Binary(bin) => {
                let (left, _) = bin.op.binding_power();
                self.expr(&bin.lhs, left);
                self.out.push(' ');
                self.out.push_str(bin.op.as_str());
                self.out.push(' ');
                self.expr(&bin.rhs, left + 1);
            }
            Expr::Unary(un) => {
                self.out.push_str(un.op.as_str());
                // `- -x` and `--x` mean different things.
                let min = if matches!(*un.operand, Expr::Unary(_)) { ATOM } else { UNARY };
                self.expr(&un.operand, min);
            }
            Expr::Postfix(post) => {
                self.expr(&post.operand, POSTFIX);
                self.out.push_str(post.op.as_str());
            }
            Expr::Cast(cast) => {
                self.out.push('(');
                self.out.push_str(&cast.ty.name);
                self.out.push_str(") ");
                self.expr(&cast.expr, UNARY);
            }
            Expr::Paren(paren) => {
                self.out.push('(');
                self.expr(&paren.expr, 0);
                self.out.push(')');
            }
            Expr::Conditional(cond) => {
                self.expr(&cond.condition, CONDITIONAL + 1);
                self.out.push_str(" ? ");
                self.expr(&cond.then_branch, 0);
                self.out.push_str(" : ");
                self.expr(&cond.else_branch, CONDITIONAL);
            }
            Expr::InstanceOf(inst) => {
                self.expr(&inst.expr, INSTANCEOF);
                self.out.push_str(" instanceof ");
                self.out.push_str(&inst.ty.name);
            }
            Expr::ClassLiteral(lit) => {
                self.out.push_str(&lit.ty.name);
                self.out.push_str(".class");
            }
        }
    }

    fn args(&mut self, args: &[Expr]) {
        self.out.push('(');
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(arg, 0);
        }
        self.out.push(')');
    }
}
