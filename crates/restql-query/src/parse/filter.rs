//! Filter grammar: `column=[not.]op.value` parameters and `and=`/`or=`
//! logic trees.
//!
//! ```text
//! Cond     := Field '.' OpValue | BoolOp '(' Cond (',' Cond)* ')'
//! BoolOp   := ['not' '.'] ('and' | 'or')
//! OpValue  := ['not' '.'] op '.' Value | 'in' '.' '(' [Value (',' Value)*] ')'
//! ```
//!
//! A scalar value at the top level runs to the end of the parameter,
//! dots included; inside a logic tree it ends at the next `,` or `)`
//! unless double-quoted. An empty `in.()` list is valid and matches
//! nothing, while an empty logic tree is a parse error.

use super::{ParseError, parse_field};
use crate::ast::{Filter, FtsKind, LogicOp, Operator, Trilean};
use crate::lexer::{Lexer, Token};

const SINGLES: &str = ".,()[]{}";
const LONGS: &[&str] = &["->>", "->"];

/// Whether a parameter key introduces a logic tree.
pub fn is_logic_key(key: &str) -> bool {
    matches!(key, "and" | "or" | "not.and" | "not.or")
}

/// Parse a `column=...` filter. `column_key` is the parameter key with any
/// embed path already stripped; `value` is the raw parameter value.
pub fn parse_filter(column_key: &str, value: &str) -> Result<Filter, ParseError> {
    let mut klx = Lexer::scan(column_key, ".,():", LONGS);
    let first = klx.next().ok_or_else(|| ParseError::UnexpectedEnd {
        expected: "a column name".into(),
    })?;
    let field = parse_field(&mut klx, first)?;
    if let Some(extra) = klx.peek() {
        return Err(ParseError::Unexpected {
            found: extra.text.clone(),
            offset: extra.offset,
            expected: "\"->\", \"->>\" or end of column".into(),
        });
    }

    let (negated, rest, base) = match value.strip_prefix("not.") {
        Some(rest) => (true, rest, 4),
        None => (false, value, 0),
    };
    let op_end = rest.find(['.', '(']).unwrap_or(rest.len());
    let op_name = &rest[..op_end];
    let after = &rest[op_end..];

    let op = match op_name {
        "in" => {
            let list = after.strip_prefix(".").ok_or_else(|| ParseError::UnexpectedEnd {
                expected: "\".\" and a value list".into(),
            })?;
            Operator::In(parse_in_list(list)?)
        }
        "is" => {
            let lit = after.strip_prefix(".").ok_or_else(|| ParseError::UnexpectedEnd {
                expected: "null, true, false or unknown".into(),
            })?;
            Operator::Is(Trilean::from_str(lit.trim()).ok_or_else(|| {
                ParseError::InvalidIsValue {
                    found: lit.to_string(),
                }
            })?)
        }
        name if fts_kind(name).is_some() => {
            let kind = fts_kind(name).unwrap();
            let (language, after) = parse_fts_language(after)?;
            let query = after
                .strip_prefix('.')
                .ok_or_else(|| ParseError::UnexpectedEnd {
                    expected: "\".\" and a query".into(),
                })?;
            Operator::Fts {
                kind,
                language,
                query: unquote(query),
            }
        }
        name => {
            let Some(build) = scalar_op(name) else {
                return Err(ParseError::MissingOperator {
                    found: op_name.to_string(),
                    offset: base,
                });
            };
            let raw = after
                .strip_prefix('.')
                .ok_or_else(|| ParseError::UnexpectedEnd {
                    expected: "\".\" and a value".into(),
                })?;
            build(prepare_value(name, unquote(raw)))
        }
    };

    Ok(Filter::Condition { field, negated, op })
}

/// Parse an `and=`/`or=` parameter into a logic tree.
pub fn parse_logic(key: &str, value: &str) -> Result<Filter, ParseError> {
    let negated = key.starts_with("not.");
    let op = if key.ends_with("and") {
        LogicOp::And
    } else {
        LogicOp::Or
    };
    let mut lx = Lexer::scan(value, SINGLES, LONGS);
    let children = logic_children(&mut lx, key)?;
    if let Some(extra) = lx.peek() {
        return Err(ParseError::Unexpected {
            found: extra.text.clone(),
            offset: extra.offset,
            expected: "end of input".into(),
        });
    }
    Ok(Filter::Group {
        op,
        negated,
        children,
    })
}

fn expect(lx: &mut Lexer, text: &str) -> Result<Token, ParseError> {
    match lx.next() {
        Some(t) if t.is(text) => Ok(t),
        Some(t) => Err(ParseError::Unexpected {
            found: t.text,
            offset: t.offset,
            expected: format!("\"{text}\""),
        }),
        None => Err(ParseError::UnexpectedEnd {
            expected: format!("\"{text}\""),
        }),
    }
}

fn logic_children(lx: &mut Lexer, op_name: &str) -> Result<Vec<Filter>, ParseError> {
    expect(lx, "(")?;
    if lx.peek().is_some_and(|t| t.is(")")) {
        return Err(ParseError::EmptyLogicTree {
            op: op_name.to_string(),
        });
    }
    let mut children = vec![cond(lx)?];
    loop {
        match lx.next() {
            Some(t) if t.is(",") => children.push(cond(lx)?),
            Some(t) if t.is(")") => break,
            Some(t) => {
                return Err(ParseError::Unexpected {
                    found: t.text,
                    offset: t.offset,
                    expected: "\",\" or \")\"".into(),
                });
            }
            None => {
                return Err(ParseError::UnexpectedEnd {
                    expected: "\",\" or \")\"".into(),
                });
            }
        }
    }
    Ok(children)
}

fn cond(lx: &mut Lexer) -> Result<Filter, ParseError> {
    let peeked = lx
        .peek()
        .map(|t| (t.quoted, t.text.trim().to_string()))
        .ok_or_else(|| ParseError::UnexpectedEnd {
            expected: "a condition".into(),
        })?;

    if let (false, name @ ("not" | "and" | "or")) = (peeked.0, peeked.1.as_str()) {
        lx.next();
        let (negated, op_name) = if name == "not" {
            expect(lx, ".")?;
            let op_tok = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
                expected: "and or or".into(),
            })?;
            match op_tok.text.trim() {
                n @ ("and" | "or") if !op_tok.quoted => (true, n.to_string()),
                _ => {
                    return Err(ParseError::Unexpected {
                        found: op_tok.text,
                        offset: op_tok.offset,
                        expected: "and or or".into(),
                    });
                }
            }
        } else {
            (false, name.to_string())
        };
        let op = if op_name == "and" {
            LogicOp::And
        } else {
            LogicOp::Or
        };
        let children = logic_children(lx, &op_name)?;
        return Ok(Filter::Group {
            op,
            negated,
            children,
        });
    }

    // Plain condition: field.op.value
    let first = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
        expected: "a condition".into(),
    })?;
    let field = parse_field(lx, first)?;
    expect(lx, ".")?;
    let mut tok = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
        expected: "an operator".into(),
    })?;
    let mut negated = false;
    if tok.is("not") {
        negated = true;
        expect(lx, ".")?;
        tok = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
            expected: "an operator".into(),
        })?;
    }
    let op = logic_operator(lx, &tok)?;
    Ok(Filter::Condition { field, negated, op })
}

fn logic_operator(lx: &mut Lexer, tok: &Token) -> Result<Operator, ParseError> {
    let name = tok.text.trim();
    if tok.quoted {
        return Err(ParseError::MissingOperator {
            found: tok.text.clone(),
            offset: tok.offset,
        });
    }
    if name == "in" {
        expect(lx, ".")?;
        expect(lx, "(")?;
        let mut values = Vec::new();
        if lx.peek().is_some_and(|t| t.is(")")) {
            lx.next();
            return Ok(Operator::In(values));
        }
        loop {
            let v = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
                expected: "a value".into(),
            })?;
            values.push(if v.quoted {
                v.text
            } else {
                v.text.trim().to_string()
            });
            match lx.next() {
                Some(t) if t.is(",") => continue,
                Some(t) if t.is(")") => break,
                Some(t) => {
                    return Err(ParseError::Unexpected {
                        found: t.text,
                        offset: t.offset,
                        expected: "\",\" or \")\"".into(),
                    });
                }
                None => {
                    return Err(ParseError::UnexpectedEnd {
                        expected: "\",\" or \")\"".into(),
                    });
                }
            }
        }
        return Ok(Operator::In(values));
    }
    if name == "is" {
        expect(lx, ".")?;
        let v = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
            expected: "null, true, false or unknown".into(),
        })?;
        let tri = (!v.quoted)
            .then(|| Trilean::from_str(v.text.trim()))
            .flatten()
            .ok_or(ParseError::InvalidIsValue { found: v.text })?;
        return Ok(Operator::Is(tri));
    }
    if let Some(kind) = fts_kind(name) {
        let mut language = None;
        if lx.peek().is_some_and(|t| t.is("(")) {
            lx.next();
            let lang = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
                expected: "a text search configuration".into(),
            })?;
            language = Some(lang.text.trim().to_string());
            expect(lx, ")")?;
        }
        expect(lx, ".")?;
        let query = logic_value(lx)?;
        return Ok(Operator::Fts {
            kind,
            language,
            query,
        });
    }
    let Some(build) = scalar_op(name) else {
        return Err(ParseError::MissingOperator {
            found: tok.text.clone(),
            offset: tok.offset,
        });
    };
    expect(lx, ".")?;
    let value = logic_value(lx)?;
    Ok(build(prepare_value(name, value)))
}

/// A scalar value inside a logic tree: one token, or a balanced
/// range/composite/array literal reassembled from tokens.
fn logic_value(lx: &mut Lexer) -> Result<String, ParseError> {
    let tok = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
        expected: "a value".into(),
    })?;
    if tok.quoted {
        return Ok(tok.text);
    }
    match tok.text.as_str() {
        "(" | "[" => {
            // Range or composite literal.
            let mut value = tok.text;
            let mut level = 1;
            while level > 0 {
                let t = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
                    expected: "\")\" or \"]\"".into(),
                })?;
                if t.is("(") || t.is("[") {
                    level += 1;
                } else if t.is(")") || t.is("]") {
                    level -= 1;
                }
                value.push_str(&t.text);
            }
            Ok(value)
        }
        "{" => {
            // Array or JSON object literal; bare words get quoted so they
            // read back as array elements.
            let mut value = tok.text;
            let mut level = 1;
            while level > 0 {
                let t = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
                    expected: "\"}\"".into(),
                })?;
                if t.is("{") {
                    level += 1;
                    value.push_str(&t.text);
                } else if t.is("}") {
                    level -= 1;
                    value.push_str(&t.text);
                } else if !t.quoted
                    && t.text.starts_with(|c: char| c.is_alphabetic())
                {
                    value.push('"');
                    value.push_str(&t.text);
                    value.push('"');
                } else {
                    value.push_str(&t.text);
                }
            }
            Ok(value)
        }
        _ => Ok(tok.text.trim().to_string()),
    }
}

/// Parse the parenthesized list of an `in` filter at top level.
fn parse_in_list(input: &str) -> Result<Vec<String>, ParseError> {
    let mut lx = Lexer::scan(input, ",()", &[]);
    expect(&mut lx, "(")?;
    let mut values = Vec::new();
    if lx.peek().is_some_and(|t| t.is(")")) {
        lx.next();
    } else {
        loop {
            let v = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
                expected: "a value".into(),
            })?;
            values.push(if v.quoted {
                v.text
            } else {
                v.text.trim().to_string()
            });
            match lx.next() {
                Some(t) if t.is(",") => continue,
                Some(t) if t.is(")") => break,
                Some(t) => {
                    return Err(ParseError::Unexpected {
                        found: t.text,
                        offset: t.offset,
                        expected: "\",\" or \")\"".into(),
                    });
                }
                None => {
                    return Err(ParseError::UnexpectedEnd {
                        expected: "\")\"".into(),
                    });
                }
            }
        }
    }
    if let Some(extra) = lx.peek() {
        return Err(ParseError::Unexpected {
            found: extra.text.clone(),
            offset: extra.offset,
            expected: "end of input".into(),
        });
    }
    Ok(values)
}

fn parse_fts_language(after: &str) -> Result<(Option<String>, &str), ParseError> {
    if let Some(rest) = after.strip_prefix('(') {
        let end = rest.find(')').ok_or_else(|| ParseError::UnexpectedEnd {
            expected: "\")\"".into(),
        })?;
        Ok((Some(rest[..end].to_string()), &rest[end + 1..]))
    } else {
        Ok((None, after))
    }
}

fn fts_kind(name: &str) -> Option<FtsKind> {
    match name {
        "fts" => Some(FtsKind::Query),
        "plfts" => Some(FtsKind::Plain),
        "phfts" => Some(FtsKind::Phrase),
        "wfts" => Some(FtsKind::Websearch),
        _ => None,
    }
}

fn scalar_op(name: &str) -> Option<fn(String) -> Operator> {
    match name {
        "eq" => Some(Operator::Eq),
        "neq" => Some(Operator::Neq),
        "gt" => Some(Operator::Gt),
        "gte" => Some(Operator::Gte),
        "lt" => Some(Operator::Lt),
        "lte" => Some(Operator::Lte),
        "like" => Some(Operator::Like),
        "ilike" => Some(Operator::Ilike),
        "match" => Some(Operator::Match),
        "imatch" => Some(Operator::Imatch),
        "cs" => Some(Operator::Contains),
        "cd" => Some(Operator::ContainedIn),
        "ov" => Some(Operator::Overlaps),
        "sl" => Some(Operator::StrictlyLeft),
        "sr" => Some(Operator::StrictlyRight),
        "nxl" => Some(Operator::NotExtendsLeft),
        "nxr" => Some(Operator::NotExtendsRight),
        "adj" => Some(Operator::Adjacent),
        _ => None,
    }
}

/// `*` is a convenience alias for `%` in LIKE patterns.
fn prepare_value(op_name: &str, value: String) -> String {
    match op_name {
        "like" | "ilike" => value.replace('*', "%"),
        _ => value,
    }
}

/// Strip one pair of wrapping double quotes, honoring escapes, when the
/// whole value is a single quoted string.
fn unquote(raw: &str) -> String {
    let mut lx = Lexer::scan(raw, "", &[]);
    match (lx.next(), lx.peek().is_none()) {
        (Some(tok), true) if tok.quoted && tok.offset == 0 => tok.text,
        _ => raw.to_string(),
    }
}
