use pretty_assertions::assert_eq;

use crate::ast::{BinaryOp, Expr, LiteralKind, UnaryOp};
use crate::{parse_expression, parse_expression_list, HoleKind, Skeleton, SkeletonError};

fn parse(text: &str) -> Expr {
    parse_expression(text).unwrap_or_else(|err| panic!("{text}: {err}"))
}

/// Fully parenthesized rendering, to check the tree shape.
fn shape(expr: &Expr) -> String {
    match expr {
        Expr::Literal(lit) => lit.text.clone(),
        Expr::Name(name) => name.name.clone(),
        Expr::This(_) => "this".to_owned(),
        Expr::FieldAccess(access) => format!("{}.{}", shape(&access.receiver), access.name),
        Expr::ArrayAccess(access) => format!("{}[{}]", shape(&access.array), shape(&access.index)),
        Expr::Call(call) => {
            let args: Vec<_> = call.args.iter().map(shape).collect();
            match &call.receiver {
                Some(receiver) => format!("{}.{}({})", shape(receiver), call.name, args.join(", ")),
                None => format!("{}({})", call.name, args.join(", ")),
            }
        }
        Expr::New(new) => {
            let args: Vec<_> = new.args.iter().map(shape).collect();
            format!("new {}({})", new.ty.name, args.join(", "))
        }
        Expr::Binary(bin) => format!("({} {} {})", shape(&bin.lhs), bin.op, shape(&bin.rhs)),
        Expr::Unary(un) => format!("({}{})", un.op.as_str(), shape(&un.operand)),
        Expr::Postfix(post) => format!("({}{})", shape(&post.operand), post.op.as_str()),
        Expr::Cast(cast) => format!("(({}) {})", cast.ty.name, shape(&cast.expr)),
        Expr::Paren(paren) => format!("[{}]", shape(&paren.expr)),
        Expr::Conditional(cond) => format!(
            "({} ? {} : {})",
            shape(&cond.condition),
            shape(&cond.then_branch),
            shape(&cond.else_branch)
        ),
        Expr::InstanceOf(inst) => format!("({} instanceof {})", shape(&inst.expr), inst.ty.name),
        Expr::ClassLiteral(lit) => format!("{}.class", lit.ty.name),
    }
}

#[test]
fn binary_precedence_follows_java() {
    assert_eq!(shape(&parse("a + b * c")), "(a + (b * c))");
    assert_eq!(shape(&parse("a - b - c")), "((a - b) - c)");
    assert_eq!(shape(&parse("a < b == c > d")), "((a < b) == (c > d))");
    assert_eq!(shape(&parse("a || b && c")), "(a || (b && c))");
    assert_eq!(shape(&parse("x.size() == 0")), "(x.size() == 0)");
}

#[test]
fn conditional_is_right_associative() {
    assert_eq!(shape(&parse("a ? b : c ? d : e")), "(a ? b : (c ? d : e))");
}

#[test]
fn casts_are_distinguished_from_parentheses() {
    assert_eq!(shape(&parse("(int) x + 1")), "(((int) x) + 1)");
    assert_eq!(shape(&parse("(x) + 1")), "([x] + 1)");
    assert_eq!(shape(&parse("(String) o")), "((String) o)");
    assert_eq!(shape(&parse("(java.util.List) o")), "((java.util.List) o)");
    assert_eq!(shape(&parse("(a < b)")), "[(a < b)]");
    assert_eq!(shape(&parse("(int) -x")), "((int) (-x))");
}

#[test]
fn postfix_chains() {
    assert_eq!(
        shape(&parse("this.items[i].name.length()")),
        "this.items[i].name.length()"
    );
    assert_eq!(shape(&parse("Math.max(a, b)")), "Math.max(a, b)");
    assert_eq!(shape(&parse("new java.util.ArrayList<String>()")), "new java.util.ArrayList()");
    assert_eq!(shape(&parse("String[].class")), "String[].class");
    assert_eq!(shape(&parse("int.class")), "int.class");
    assert_eq!(shape(&parse("x++")), "(x++)");
    assert_eq!(shape(&parse("o instanceof Foo && !b")), "((o instanceof Foo) && (!b))");
}

#[test]
fn literal_kinds() {
    let kinds: Vec<LiteralKind> = ["1", "2L", "3.5", "4f", "5d", "'c'", "\"s\"", "true", "null"]
        .iter()
        .map(|text| match parse(text) {
            Expr::Literal(lit) => lit.kind,
            other => panic!("{text} parsed as {other:?}"),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            LiteralKind::Int,
            LiteralKind::Long,
            LiteralKind::Double,
            LiteralKind::Float,
            LiteralKind::Double,
            LiteralKind::Char,
            LiteralKind::String,
            LiteralKind::Boolean,
            LiteralKind::Null,
        ]
    );
}

#[test]
fn negative_literals_are_unary() {
    match parse("-1") {
        Expr::Unary(un) => assert_eq!(un.op, UnaryOp::Neg),
        other => panic!("{other:?}"),
    }
}

#[test]
fn errors_are_reported() {
    assert!(parse_expression("a +").is_err());
    assert!(parse_expression("a b").is_err());
    assert!(parse_expression("foo(").is_err());
    assert!(parse_expression("").is_err());
    assert!(parse_expression("\"unterminated").is_err());
}

#[test]
fn expression_lists() {
    let list = parse_expression_list("x, y + 1, foo(a, b)").expect("list");
    assert_eq!(list.len(), 3);
    assert!(parse_expression_list("").expect("empty").is_empty());
}

#[test]
fn skeleton_holes_are_desugared() {
    let skeleton = Skeleton::parse("??.size() == 0").expect("skeleton");
    assert_eq!(skeleton.desugared, "_$hole0.size() == 0");
    let hole = skeleton.hole("_$hole0").expect("hole");
    assert_eq!(hole.kind, HoleKind::Expression);
    assert_eq!(hole.alternatives, None);
    match &skeleton.expr {
        Expr::Binary(bin) => assert_eq!(bin.op, BinaryOp::Eq),
        other => panic!("{other:?}"),
    }
}

#[test]
fn skeleton_alternatives_and_negation() {
    let skeleton = Skeleton::parse("??{x, y + 1} + ??-{z}").expect("skeleton");
    assert_eq!(skeleton.desugared, "_$hole0 + _$hole1");
    assert_eq!(
        skeleton.hole("_$hole0").and_then(|h| h.alternatives.clone()),
        Some(vec!["x".to_owned(), "y + 1".to_owned()])
    );
    let negated = skeleton.hole("_$hole1").expect("hole");
    assert!(negated.negated);
    assert_eq!(negated.alternatives, Some(vec!["z".to_owned()]));
}

#[test]
fn skeleton_list_holes() {
    let skeleton = Skeleton::parse("Math.max(**)").expect("skeleton");
    assert_eq!(skeleton.desugared, "Math.max(_$hole0)");
    assert_eq!(
        skeleton.hole("_$hole0").map(|h| h.kind),
        Some(HoleKind::List)
    );
    assert!(!skeleton.is_single_free_hole());
    assert!(Skeleton::parse("??").expect("hole").is_single_free_hole());
}

#[test]
fn skeleton_errors_carry_user_messages() {
    let cases = [
        ("x??", SkeletonError::HoleAfterIdentifier),
        ("??x", SkeletonError::HoleBeforeIdentifier),
        ("??{x, y", SkeletonError::UnclosedAlternatives),
        ("foo(a, **)", SkeletonError::MisplacedListHole),
        ("**", SkeletonError::MisplacedListHole),
    ];
    for (text, expected) in cases {
        assert_eq!(Skeleton::parse(text).unwrap_err(), expected, "{text}");
    }
    assert_eq!(
        SkeletonError::UnclosedAlternatives.to_string(),
        "Enter a close brace } to finish the set of possibilities."
    );
    assert!(matches!(
        Skeleton::parse("?? +"),
        Err(SkeletonError::Parse(_))
    ));
}

#[test]
fn holes_inside_string_literals_are_ignored() {
    let skeleton = Skeleton::parse("\"??\".equals(??)").expect("skeleton");
    assert_eq!(skeleton.desugared, "\"??\".equals(_$hole0)");
}

#[test]
fn printing_reproduces_canonical_source() {
    for text in [
        "a + b * c",
        "(a + b) * c",
        "x.foo(1, \"s\").bar[i + 1]",
        "new java.util.ArrayList(n)",
        "-(-x)",
        "!(a && b) ? (int) y : z++",
        "o instanceof String[] == flag",
        "int[].class",
    ] {
        assert_eq!(crate::print(&parse(text)), text);
    }
}

#[test]
fn rewrites_replace_whole_subtrees() {
    let expr = parse("CodeHint.pre(x) + y * 2");
    let text = crate::print_with(&expr, &mut |e| match e {
        Expr::Call(call) if call.name == "pre" => Some("_$pre_$x".to_owned()),
        Expr::Name(name) if name.name == "y" => Some("_$curValue".to_owned()),
        _ => None,
    });
    assert_eq!(text, "_$pre_$x + _$curValue * 2");
}
