use crate::ast::{self, BinaryOp, Expr, LiteralKind, PostfixOp, Span, TypeRef, UnaryOp};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::ParseError;

/// Parses a complete expression; trailing tokens are an error.
pub fn parse_expression(text: &str) -> Result<Expr, ParseError> {
    let tokens: Vec<Token> = Lexer::new(text).collect();
    let mut parser = Parser::new(tokens, text.len());
    let expr = parser.parse_expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(ParseError::new(
            format!("Syntax error on token \"{}\", delete this token", tok.text),
            tok.range,
        )),
    }
}

/// Parses `a, b, c` (possibly empty) into separate expressions.
pub fn parse_expression_list(text: &str) -> Result<Vec<Expr>, ParseError> {
    let tokens: Vec<Token> = Lexer::new(text).collect();
    let mut parser = Parser::new(tokens, text.len());
    let mut exprs = Vec::new();
    while !parser.is_eof() {
        exprs.push(parser.parse_expr()?);
        if parser.at_kind(TokenKind::Comma) {
            parser.bump();
        } else if let Some(tok) = parser.peek() {
            return Err(ParseError::new(
                format!("Syntax error on token \"{}\", , expected", tok.text),
                tok.range,
            ));
        }
    }
    Ok(exprs)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, len: usize) -> Self {
        Parser {
            tokens,
            pos: 0,
            len,
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_n(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn at_kind(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|token| token.kind == kind)
    }

    fn at_op(&self, op: &str) -> bool {
        self.peek()
            .is_some_and(|token| token.kind == TokenKind::Op && token.text == op)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek()
            .is_some_and(|token| token.kind == TokenKind::Ident && token.text == keyword)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos)?.clone();
        self.pos += 1;
        Some(tok)
    }

    fn eof_span(&self) -> Span {
        Span::new(self.len, self.len)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(tok) => ParseError::new(
                format!("Syntax error on token \"{}\", {expected} expected", tok.text),
                tok.range,
            ),
            None => ParseError::new(
                format!("Syntax error, insert \"{expected}\" to complete Expression"),
                self.eof_span(),
            ),
        }
    }

    fn expect_kind(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.at_kind(kind) {
            if let Some(tok) = self.bump() {
                return Ok(tok);
            }
        }
        Err(self.unexpected(expected))
    }

    fn expect_ident(&mut self) -> Result<Token, ParseError> {
        self.expect_kind(TokenKind::Ident, "Identifier")
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let condition = self.parse_binary(0)?;
        if !self.at_kind(TokenKind::Question) {
            return Ok(condition);
        }
        self.bump();
        let then_branch = self.parse_expr()?;
        self.expect_kind(TokenKind::Colon, ":")?;
        let else_branch = self.parse_expr()?;
        let range = condition.range().cover(else_branch.range());
        Ok(Expr::Conditional(ast::ConditionalExpr {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
            range,
        }))
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        let tok = self.peek()?;
        if tok.kind != TokenKind::Op {
            return None;
        }
        Some(match tok.text.as_str() {
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            ">>>" => BinaryOp::UShr,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "&" => BinaryOp::BitAnd,
            "^" => BinaryOp::BitXor,
            "|" => BinaryOp::BitOr,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            if self.at_keyword("instanceof") {
                // Same precedence as the relational operators.
                if 50 < min_bp {
                    break;
                }
                self.bump();
                let ty = self.parse_type()?;
                let range = lhs.range().cover(ty.range);
                lhs = Expr::InstanceOf(ast::InstanceOfExpr {
                    expr: Box::new(lhs),
                    ty,
                    range,
                });
                continue;
            }

            let Some(op) = self.peek_binary_op() else {
                break;
            };
            let (l_bp, r_bp) = op.binding_power();
            if l_bp < min_bp {
                break;
            }
            self.bump();
            let rhs = self.parse_binary(r_bp)?;
            let range = lhs.range().cover(rhs.range());
            lhs = Expr::Binary(ast::BinaryExpr {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                range,
            });
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(tok) if tok.kind == TokenKind::Op => match tok.text.as_str() {
                "!" => Some(UnaryOp::Not),
                "-" => Some(UnaryOp::Neg),
                "+" => Some(UnaryOp::Plus),
                "~" => Some(UnaryOp::BitNot),
                "++" => Some(UnaryOp::PreInc),
                "--" => Some(UnaryOp::PreDec),
                _ => None,
            },
            _ => None,
        };
        if let Some(op) = op {
            let start = self.bump().map(|t| t.range).unwrap_or_default();
            let operand = self.parse_unary()?;
            let range = start.cover(operand.range());
            return Ok(Expr::Unary(ast::UnaryExpr {
                op,
                operand: Box::new(operand),
                range,
            }));
        }

        if self.at_kind(TokenKind::LParen) {
            if let Some(cast) = self.try_parse_cast()? {
                return Ok(cast);
            }
        }

        let primary = self.parse_primary()?;
        self.parse_postfix(primary)
    }

    /// `(Type) operand`, or `None` (with the position restored) when the parenthesis is not a cast.
    fn try_parse_cast(&mut self) -> Result<Option<Expr>, ParseError> {
        let saved = self.pos;
        let Some(lparen) = self.bump() else {
            return Ok(None);
        };
        let Ok(ty) = self.parse_type() else {
            self.pos = saved;
            return Ok(None);
        };
        if !self.at_kind(TokenKind::RParen) {
            self.pos = saved;
            return Ok(None);
        }
        let is_primitive_like = ast::is_primitive_type_name(&ty.name) || ty.name.ends_with("[]");
        // A reference cast must be followed by something that cannot continue a binary expression.
        let starts_operand = match self.peek_n(1) {
            Some(tok) => match tok.kind {
                TokenKind::Ident
                | TokenKind::IntLiteral
                | TokenKind::LongLiteral
                | TokenKind::FloatLiteral
                | TokenKind::DoubleLiteral
                | TokenKind::CharLiteral
                | TokenKind::StringLiteral
                | TokenKind::LParen => true,
                TokenKind::Op => matches!(tok.text.as_str(), "!" | "~") || is_primitive_like,
                _ => false,
            },
            None => false,
        };
        if !starts_operand || (!is_primitive_like && self.peek_n(1).is_some_and(|t| t.text == "instanceof")) {
            self.pos = saved;
            return Ok(None);
        }
        self.bump();
        let operand = self.parse_unary()?;
        let range = lparen.range.cover(operand.range());
        Ok(Some(Expr::Cast(ast::CastExpr {
            ty,
            expr: Box::new(operand),
            range,
        })))
    }

    /// `a.b.C`, `int`, `String[]`; type arguments are skipped.
    fn parse_type(&mut self) -> Result<TypeRef, ParseError> {
        let first = self.expect_ident()?;
        if is_reserved_word(&first.text) {
            return Err(ParseError::new(
                format!("Syntax error on token \"{}\", Type expected", first.text),
                first.range,
            ));
        }
        let mut name = first.text;
        let mut range = first.range;
        while self.at_kind(TokenKind::Dot)
            && self
                .peek_n(1)
                .is_some_and(|t| t.kind == TokenKind::Ident && t.text != "class")
        {
            self.bump();
            let segment = self.expect_ident()?;
            name.push('.');
            name.push_str(&segment.text);
            range = range.cover(segment.range);
        }
        if self.at_op("<") {
            range = range.cover(self.skip_type_arguments()?);
        }
        while self.at_kind(TokenKind::LBracket)
            && self.peek_n(1).is_some_and(|t| t.kind == TokenKind::RBracket)
        {
            self.bump();
            let close = self.expect_kind(TokenKind::RBracket, "]")?;
            name.push_str("[]");
            range = range.cover(close.range);
        }
        Ok(TypeRef { name, range })
    }

    fn skip_type_arguments(&mut self) -> Result<Span, ParseError> {
        let mut depth = 0usize;
        while let Some(tok) = self.bump() {
            match (tok.kind, tok.text.as_str()) {
                (TokenKind::Op, "<") => depth += 1,
                (TokenKind::Op, ">") => depth = depth.saturating_sub(1),
                (TokenKind::Op, ">>") => depth = depth.saturating_sub(2),
                (TokenKind::Op, ">>>") => depth = depth.saturating_sub(3),
                (TokenKind::Ident | TokenKind::Comma | TokenKind::Dot | TokenKind::Question, _) => {}
                (TokenKind::LBracket | TokenKind::RBracket, _) => {}
                _ => return Err(ParseError::new("Syntax error in type arguments", tok.range)),
            }
            if depth == 0 {
                return Ok(tok.range);
            }
        }
        Err(self.unexpected(">"))
    }

    fn parse_args(&mut self) -> Result<(Vec<Expr>, Span), ParseError> {
        self.expect_kind(TokenKind::LParen, "(")?;
        let mut args = Vec::new();
        if !self.at_kind(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.at_kind(TokenKind::Comma) {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        let rparen = self.expect_kind(TokenKind::RParen, ")")?;
        Ok((args, rparen.range))
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let Some(tok) = self.bump() else {
            return Err(ParseError::new(
                "Syntax error, insert \"Expression\" to complete Expression",
                self.eof_span(),
            ));
        };
        let literal = |kind: LiteralKind, tok: Token| -> Result<Expr, ParseError> {
            Ok(Expr::Literal(ast::LiteralExpr {
                kind,
                text: tok.text,
                range: tok.range,
            }))
        };
        match tok.kind {
            TokenKind::IntLiteral => literal(LiteralKind::Int, tok),
            TokenKind::LongLiteral => literal(LiteralKind::Long, tok),
            TokenKind::FloatLiteral => literal(LiteralKind::Float, tok),
            TokenKind::DoubleLiteral => literal(LiteralKind::Double, tok),
            TokenKind::CharLiteral => literal(LiteralKind::Char, tok),
            TokenKind::StringLiteral => literal(LiteralKind::String, tok),
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                let rparen = self.expect_kind(TokenKind::RParen, ")")?;
                Ok(Expr::Paren(ast::ParenExpr {
                    expr: Box::new(inner),
                    range: tok.range.cover(rparen.range),
                }))
            }
            TokenKind::Ident => match tok.text.as_str() {
                "true" | "false" => literal(LiteralKind::Boolean, tok),
                "null" => literal(LiteralKind::Null, tok),
                "this" => Ok(Expr::This(tok.range)),
                "new" => {
                    let ty = self.parse_type()?;
                    let (args, close) = self.parse_args()?;
                    Ok(Expr::New(ast::NewExpr {
                        ty,
                        args,
                        range: tok.range.cover(close),
                    }))
                }
                name if ast::is_primitive_type_name(name) => {
                    self.pos -= 1;
                    let ty = self.parse_type()?;
                    self.parse_class_literal_suffix(ty)
                }
                name if is_reserved_word(name) => Err(ParseError::new(
                    format!("Syntax error on token \"{name}\", invalid Expression"),
                    tok.range,
                )),
                _ => {
                    if self.at_kind(TokenKind::LParen) {
                        let (args, close) = self.parse_args()?;
                        Ok(Expr::Call(ast::CallExpr {
                            receiver: None,
                            name: tok.text,
                            name_range: tok.range,
                            args,
                            range: tok.range.cover(close),
                        }))
                    } else {
                        Ok(Expr::Name(ast::NameExpr {
                            name: tok.text,
                            range: tok.range,
                        }))
                    }
                }
            },
            _ => Err(ParseError::new(
                format!("Syntax error on token \"{}\", invalid Expression", tok.text),
                tok.range,
            )),
        }
    }

    fn parse_class_literal_suffix(&mut self, ty: TypeRef) -> Result<Expr, ParseError> {
        self.expect_kind(TokenKind::Dot, ".")?;
        let class_kw = self.expect_ident()?;
        if class_kw.text != "class" {
            return Err(ParseError::new(
                format!("Syntax error on token \"{}\", class expected", class_kw.text),
                class_kw.range,
            ));
        }
        let range = ty.range.cover(class_kw.range);
        Ok(Expr::ClassLiteral(ast::ClassLiteralExpr { ty, range }))
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr, ParseError> {
        loop {
            if self.at_kind(TokenKind::Dot) {
                self.bump();
                let name = self.expect_ident()?;
                if name.text == "class" {
                    let Some(qualified) = expr.as_qualified_name() else {
                        return Err(ParseError::new(
                            "Syntax error on token \"class\", Identifier expected",
                            name.range,
                        ));
                    };
                    let range = expr.range().cover(name.range);
                    expr = Expr::ClassLiteral(ast::ClassLiteralExpr {
                        ty: TypeRef {
                            name: qualified,
                            range: expr.range(),
                        },
                        range,
                    });
                    continue;
                }
                if self.at_kind(TokenKind::LParen) {
                    let (args, close) = self.parse_args()?;
                    let range = expr.range().cover(close);
                    expr = Expr::Call(ast::CallExpr {
                        receiver: Some(Box::new(expr)),
                        name: name.text,
                        name_range: name.range,
                        args,
                        range,
                    });
                } else {
                    let range = expr.range().cover(name.range);
                    expr = Expr::FieldAccess(ast::FieldAccessExpr {
                        receiver: Box::new(expr),
                        name: name.text,
                        name_range: name.range,
                        range,
                    });
                }
                continue;
            }

            if self.at_kind(TokenKind::LBracket) {
                if self.peek_n(1).is_some_and(|t| t.kind == TokenKind::RBracket) {
                    // `String[].class`
                    let Some(qualified) = expr.as_qualified_name() else {
                        return Err(self.unexpected("Expression"));
                    };
                    let mut name = qualified;
                    let mut range = expr.range();
                    while self.at_kind(TokenKind::LBracket) {
                        self.bump();
                        let close = self.expect_kind(TokenKind::RBracket, "]")?;
                        name.push_str("[]");
                        range = range.cover(close.range);
                    }
                    return self.parse_class_literal_suffix(TypeRef { name, range });
                }
                self.bump();
                let index = self.parse_expr()?;
                let close = self.expect_kind(TokenKind::RBracket, "]")?;
                let range = expr.range().cover(close.range);
                expr = Expr::ArrayAccess(ast::ArrayAccessExpr {
                    array: Box::new(expr),
                    index: Box::new(index),
                    range,
                });
                continue;
            }

            if self.at_op("++") || self.at_op("--") {
                let op = if self.at_op("++") {
                    PostfixOp::Inc
                } else {
                    PostfixOp::Dec
                };
                let tok = self.bump().map(|t| t.range).unwrap_or_default();
                let range = expr.range().cover(tok);
                expr = Expr::Postfix(ast::PostfixExpr {
                    op,
                    operand: Box::new(expr),
                    range,
                });
                continue;
            }

            break;
        }
        Ok(expr)
    }
}

fn is_reserved_word(word: &str) -> bool {
    matches!(
        word,
        "class"
            | "new"
            | "instanceof"
            | "this"
            | "super"
            | "null"
            | "true"
            | "false"
            | "return"
            | "if"
            | "else"
            | "for"
            | "while"
            | "do"
            | "switch"
            | "case"
            | "default"
            | "break"
            | "continue"
            | "throw"
            | "try"
            | "catch"
            | "finally"
            | "void"
            | "static"
            | "final"
            | "public"
            | "private"
            | "protected"
    )
}
