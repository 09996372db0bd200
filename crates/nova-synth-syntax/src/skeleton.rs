//! Skeleton templates: expressions with `??` and `**` holes.
//!
//! Holes are rewritten to ordinary identifiers (`_$hole0`, `_$hole1`, ...) before parsing so the
//! regular expression parser handles the rest of the template.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::ast::Expr;
use crate::lexer::is_identifier_part;
use crate::parser::{parse_expression, parse_expression_list};
use crate::ParseError;

pub const HOLE_SYNTAX: &str = "??";
pub const LIST_HOLE_SYNTAX: &str = "**";
pub const DESUGARED_HOLE_NAME: &str = "_$hole";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoleKind {
    /// `??`: one expression (or a field/method name, depending on position).
    Expression,
    /// `**`: any number of call arguments.
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoleInfo {
    pub kind: HoleKind,
    /// Explicit candidates from `??{a, b}`, as source text.
    pub alternatives: Option<Vec<String>>,
    /// `??-{a, b}`: anything except the listed candidates.
    pub negated: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SkeletonError {
    #[error("You cannot put a ?? hole immediately after an identifier.")]
    HoleAfterIdentifier,
    #[error("You cannot put a ?? hole immediately before an identifier.")]
    HoleBeforeIdentifier,
    #[error("Enter a close brace }} to finish the set of possibilities.")]
    UnclosedAlternatives,
    #[error("You can only use a ** hole as the only argument to a method.")]
    MisplacedListHole,
    #[error("{0}")]
    InvalidAlternatives(ParseError),
    #[error("Enter a valid skeleton: {0}")]
    Parse(ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skeleton {
    pub sugared: String,
    pub desugared: String,
    pub expr: Expr,
    pub holes: BTreeMap<String, HoleInfo>,
}

impl Skeleton {
    pub fn parse(sugared: &str) -> Result<Self, SkeletonError> {
        let mut holes = BTreeMap::new();
        let mut text = sugared.to_owned();
        for hole_num in 0usize.. {
            let name = format!("{DESUGARED_HOLE_NAME}{hole_num}");
            if let Some(start) = find_outside_literals(&text, HOLE_SYNTAX) {
                let (rewritten, info) = rewrite_single_hole(&text, start, &name)?;
                text = rewritten;
                holes.insert(name, info);
            } else if let Some(start) = find_outside_literals(&text, LIST_HOLE_SYNTAX) {
                text = rewrite_single_list_hole(&text, start, &name)?;
                holes.insert(
                    name,
                    HoleInfo {
                        kind: HoleKind::List,
                        alternatives: None,
                        negated: false,
                    },
                );
            } else {
                break;
            }
        }
        let expr = parse_expression(&text).map_err(SkeletonError::Parse)?;
        Ok(Skeleton {
            sugared: sugared.to_owned(),
            desugared: text,
            expr,
            holes,
        })
    }

    pub fn hole(&self, name: &str) -> Option<&HoleInfo> {
        self.holes.get(name)
    }

    /// The whole template is one `??` hole without alternatives.
    pub fn is_single_free_hole(&self) -> bool {
        match &self.expr {
            Expr::Name(name) => self
                .holes
                .get(&name.name)
                .is_some_and(|hole| hole.kind == HoleKind::Expression && hole.alternatives.is_none()),
            _ => false,
        }
    }
}

fn find_outside_literals(text: &str, pattern: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'"' || b == b'\'' {
                    quote = Some(b);
                } else if bytes[i..].starts_with(pattern.as_bytes()) {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

fn char_before(text: &str, idx: usize) -> Option<char> {
    text.get(..idx)?.chars().next_back()
}

fn rewrite_single_hole(
    text: &str,
    start: usize,
    name: &str,
) -> Result<(String, HoleInfo), SkeletonError> {
    if char_before(text, start).is_some_and(is_identifier_part) {
        return Err(SkeletonError::HoleAfterIdentifier);
    }
    let mut end = start + HOLE_SYNTAX.len();
    let negated = text[end..].starts_with("-{");
    if negated {
        end += 1;
    }
    let mut alternatives = None;
    if text[end..].starts_with('{') {
        let body_start = end + 1;
        let Some(close) = text[body_start..].find('}') else {
            return Err(SkeletonError::UnclosedAlternatives);
        };
        let body = &text[body_start..body_start + close];
        alternatives = Some(parse_alternatives(body)?);
        end = body_start + close + 1;
    }
    if text[end..].chars().next().is_some_and(is_identifier_part) {
        return Err(SkeletonError::HoleBeforeIdentifier);
    }
    let rewritten = format!("{}{}{}", &text[..start], name, &text[end..]);
    Ok((
        rewritten,
        HoleInfo {
            kind: HoleKind::Expression,
            alternatives,
            negated,
        },
    ))
}

fn parse_alternatives(body: &str) -> Result<Vec<String>, SkeletonError> {
    let exprs = parse_expression_list(body).map_err(SkeletonError::InvalidAlternatives)?;
    Ok(exprs
        .iter()
        .map(|expr| {
            let range = expr.range();
            body[range.start..range.end].trim().to_owned()
        })
        .collect())
}

fn rewrite_single_list_hole(text: &str, start: usize, name: &str) -> Result<String, SkeletonError> {
    let end = start + LIST_HOLE_SYNTAX.len();
    let legal = start >= 2
        && end < text.len()
        && text.as_bytes()[start - 1] == b'('
        && char_before(text, start - 1).is_some_and(is_identifier_part)
        && text.as_bytes()[end] == b')';
    if !legal {
        return Err(SkeletonError::MisplacedListHole);
    }
    Ok(format!("{}{}{}", &text[..start], name, &text[end..]))
}
