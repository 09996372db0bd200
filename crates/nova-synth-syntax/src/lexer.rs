use crate::ast::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) text: String,
    pub(crate) range: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident,
    IntLiteral,
    LongLiteral,
    FloatLiteral,
    DoubleLiteral,
    CharLiteral,
    StringLiteral,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Semi,
    Question,
    Colon,
    /// Any operator; the exact spelling is in `Token::text`.
    Op,
    Unknown,
}

/// Longest-match first.
const OPERATORS: &[&str] = &[
    ">>>", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "++", "--", "+", "-", "*", "/", "%",
    "<", ">", "!", "~", "&", "|", "^", "=",
];

pub(crate) struct Lexer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Lexer { text, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.remaining().chars().nth(1)
    }

    fn bump_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while matches!(self.peek_char(), Some(c) if c.is_whitespace()) {
                self.bump_char();
            }

            let rem = self.remaining();
            if rem.starts_with("//") {
                while let Some(c) = self.bump_char() {
                    if c == '\n' {
                        break;
                    }
                }
                continue;
            }

            if rem.starts_with("/*") {
                self.bump_char();
                self.bump_char();
                while !self.remaining().is_empty() && !self.remaining().starts_with("*/") {
                    self.bump_char();
                }
                if self.remaining().starts_with("*/") {
                    self.bump_char();
                    self.bump_char();
                }
                continue;
            }

            break;
        }
    }

    fn lex_identifier(&mut self, first: char) -> String {
        let mut out = String::from(first);
        while let Some(c) = self.peek_char() {
            if is_identifier_part(c) {
                out.push(c);
                self.bump_char();
            } else {
                break;
            }
        }
        out
    }

    fn eat_digits(&mut self, out: &mut String, hex: bool) {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() || c == '_' || (hex && c.is_ascii_hexdigit()) {
                out.push(c);
                self.bump_char();
            } else {
                break;
            }
        }
    }

    fn lex_number(&mut self, first: char) -> (TokenKind, String) {
        let mut out = String::from(first);
        if first == '0' && matches!(self.peek_char(), Some('x' | 'X')) {
            out.push(self.bump_char().unwrap_or('x'));
            self.eat_digits(&mut out, true);
        } else {
            self.eat_digits(&mut out, false);
        }

        let mut kind = TokenKind::IntLiteral;
        if self.peek_char() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            out.push('.');
            self.bump_char();
            self.eat_digits(&mut out, false);
            kind = TokenKind::DoubleLiteral;
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            out.push('e');
            self.bump_char();
            if let Some(sign @ ('+' | '-')) = self.peek_char() {
                out.push(sign);
                self.bump_char();
            }
            self.eat_digits(&mut out, false);
            kind = TokenKind::DoubleLiteral;
        }
        match self.peek_char() {
            Some(c @ ('l' | 'L')) if kind == TokenKind::IntLiteral => {
                out.push(c);
                self.bump_char();
                kind = TokenKind::LongLiteral;
            }
            Some(c @ ('f' | 'F')) => {
                out.push(c);
                self.bump_char();
                kind = TokenKind::FloatLiteral;
            }
            Some(c @ ('d' | 'D')) => {
                out.push(c);
                self.bump_char();
                kind = TokenKind::DoubleLiteral;
            }
            _ => {}
        }
        (kind, out)
    }

    /// Lexes a quoted literal; the opening quote is already consumed.
    fn lex_quoted(&mut self, quote: char) -> Option<String> {
        let mut out = String::from(quote);
        while let Some(c) = self.bump_char() {
            out.push(c);
            match c {
                c if c == quote => return Some(out),
                '\\' => {
                    if let Some(escaped) = self.bump_char() {
                        out.push(escaped);
                    }
                }
                '\n' => return None,
                _ => {}
            }
        }
        None
    }

    fn next_token(&mut self) -> Option<Token> {
        self.skip_whitespace_and_comments();
        let start = self.pos;
        let ch = self.bump_char()?;

        let (kind, text) = match ch {
            '(' => (TokenKind::LParen, "(".to_owned()),
            ')' => (TokenKind::RParen, ")".to_owned()),
            '[' => (TokenKind::LBracket, "[".to_owned()),
            ']' => (TokenKind::RBracket, "]".to_owned()),
            '{' => (TokenKind::LBrace, "{".to_owned()),
            '}' => (TokenKind::RBrace, "}".to_owned()),
            ',' => (TokenKind::Comma, ",".to_owned()),
            ';' => (TokenKind::Semi, ";".to_owned()),
            '?' => (TokenKind::Question, "?".to_owned()),
            ':' => (TokenKind::Colon, ":".to_owned()),
            '.' => (TokenKind::Dot, ".".to_owned()),
            '"' => match self.lex_quoted('"') {
                Some(lit) => (TokenKind::StringLiteral, lit),
                None => (TokenKind::Unknown, self.text[start..self.pos].to_owned()),
            },
            '\'' => match self.lex_quoted('\'') {
                Some(lit) => (TokenKind::CharLiteral, lit),
                None => (TokenKind::Unknown, self.text[start..self.pos].to_owned()),
            },
            c if c.is_ascii_digit() => self.lex_number(c),
            c if is_identifier_start(c) => (TokenKind::Ident, self.lex_identifier(c)),
            _ => {
                self.pos = start;
                match OPERATORS.iter().find(|op| self.remaining().starts_with(**op)) {
                    Some(op) => {
                        self.pos += op.len();
                        (TokenKind::Op, (*op).to_owned())
                    }
                    None => {
                        self.bump_char();
                        (TokenKind::Unknown, ch.to_string())
                    }
                }
            }
        };

        Some(Token {
            kind,
            text,
            range: Span::new(start, self.pos),
        })
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

pub fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

pub fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
