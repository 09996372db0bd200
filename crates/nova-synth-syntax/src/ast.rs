//! Untyped syntax tree for the Java expression subset.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn cover(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(LiteralExpr),
    Name(NameExpr),
    This(Span),
    FieldAccess(FieldAccessExpr),
    ArrayAccess(ArrayAccessExpr),
    Call(CallExpr),
    New(NewExpr),
    Binary(BinaryExpr),
    Unary(UnaryExpr),
    Postfix(PostfixExpr),
    Cast(CastExpr),
    Paren(ParenExpr),
    Conditional(ConditionalExpr),
    InstanceOf(InstanceOfExpr),
    ClassLiteral(ClassLiteralExpr),
}

impl Expr {
    pub fn range(&self) -> Span {
        match self {
            Expr::Literal(expr) => expr.range,
            Expr::Name(expr) => expr.range,
            Expr::This(range) => *range,
            Expr::FieldAccess(expr) => expr.range,
            Expr::ArrayAccess(expr) => expr.range,
            Expr::Call(expr) => expr.range,
            Expr::New(expr) => expr.range,
            Expr::Binary(expr) => expr.range,
            Expr::Unary(expr) => expr.range,
            Expr::Postfix(expr) => expr.range,
            Expr::Cast(expr) => expr.range,
            Expr::Paren(expr) => expr.range,
            Expr::Conditional(expr) => expr.range,
            Expr::InstanceOf(expr) => expr.range,
            Expr::ClassLiteral(expr) => expr.range,
        }
    }

    /// `a.b.c` as a dotted name, if this expression is only names and field accesses.
    pub fn as_qualified_name(&self) -> Option<String> {
        match self {
            Expr::Name(name) => Some(name.name.clone()),
            Expr::FieldAccess(access) => {
                let mut prefix = access.receiver.as_qualified_name()?;
                prefix.push('.');
                prefix.push_str(&access.name);
                Some(prefix)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    Int,
    Long,
    Float,
    Double,
    Char,
    String,
    Boolean,
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralExpr {
    pub kind: LiteralKind,
    /// Source text, quotes and suffixes included.
    pub text: String,
    pub range: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameExpr {
    pub name: String,
    pub range: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAccessExpr {
    pub receiver: Box<Expr>,
    pub name: String,
    pub name_range: Span,
    pub range: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayAccessExpr {
    pub array: Box<Expr>,
    pub index: Box<Expr>,
    pub range: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallExpr {
    pub receiver: Option<Box<Expr>>,
    pub name: String,
    pub name_range: Span,
    pub args: Vec<Expr>,
    pub range: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExpr {
    pub ty: TypeRef,
    pub args: Vec<Expr>,
    pub range: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    UShr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Left/right binding power; higher binds tighter.
    pub fn binding_power(self) -> (u8, u8) {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => (70, 71),
            BinaryOp::Add | BinaryOp::Sub => (60, 61),
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => (55, 56),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => (50, 51),
            BinaryOp::Eq | BinaryOp::Ne => (45, 46),
            BinaryOp::BitAnd => (40, 41),
            BinaryOp::BitXor => (39, 40),
            BinaryOp::BitOr => (38, 39),
            BinaryOp::And => (30, 31),
            BinaryOp::Or => (20, 21),
        }
    }

    /// Operators whose result is always `boolean`.
    pub fn is_boolean_result(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::And
                | BinaryOp::Or
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
    PreInc,
    PreDec,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::BitNot => "~",
            UnaryOp::PreInc => "++",
            UnaryOp::PreDec => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostfixOp {
    Inc,
    Dec,
}

impl PostfixOp {
    pub fn as_str(self) -> &'static str {
        match self {
            PostfixOp::Inc => "++",
            PostfixOp::Dec => "--",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
    pub range: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: Box<Expr>,
    pub range: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostfixExpr {
    pub op: PostfixOp,
    pub operand: Box<Expr>,
    pub range: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastExpr {
    pub ty: TypeRef,
    pub expr: Box<Expr>,
    pub range: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParenExpr {
    pub expr: Box<Expr>,
    pub range: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalExpr {
    pub condition: Box<Expr>,
    pub then_branch: Box<Expr>,
    pub else_branch: Box<Expr>,
    pub range: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceOfExpr {
    pub expr: Box<Expr>,
    pub ty: TypeRef,
    pub range: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLiteralExpr {
    pub ty: TypeRef,
    pub range: Span,
}

/// A type as written: `int`, `java.util.List`, `String[][]`. Type arguments are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub name: String,
    pub range: Span,
}

pub const PRIMITIVE_TYPE_NAMES: &[&str] = &[
    "boolean", "byte", "char", "short", "int", "long", "float", "double",
];

pub fn is_primitive_type_name(name: &str) -> bool {
    PRIMITIVE_TYPE_NAMES.contains(&name)
}
