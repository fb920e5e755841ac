//! `?select=` grammar.
//!
//! ```text
//! SelectList := SelectItem (',' SelectItem)*
//! SelectItem := [alias ':'] Field ['::' cast]
//!             | [alias ':'] Field '.' AggregateFn '(' ')' ['::' cast]
//!             | [alias ':'] Name ['!' hint] ['!inner'] '(' SelectList ')'
//! Field      := Name (('->' | '->>') Member)*
//! ```

use super::{ParseError, parse_field};
use crate::ast::{Aggregate, AggregateFn, ColumnItem, EmbedItem, Field, SelectItem};
use crate::lexer::{Lexer, Token};

const SINGLES: &str = ".,():!";
const LONGS: &[&str] = &["->>", "->", "::", "..."];

/// Parse the full value of a `select` parameter.
///
/// An empty value selects everything, like an absent parameter.
pub fn parse_select(input: &str) -> Result<Vec<SelectItem>, ParseError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut lx = Lexer::scan(input, SINGLES, LONGS);
    let items = select_list(&mut lx)?;
    if let Some(tok) = lx.peek() {
        return Err(ParseError::Unexpected {
            found: tok.text.clone(),
            offset: tok.offset,
            expected: "\",\" or end of input".into(),
        });
    }
    Ok(items)
}

fn select_list(lx: &mut Lexer) -> Result<Vec<SelectItem>, ParseError> {
    let mut items = vec![select_item(lx)?];
    while lx.peek().is_some_and(|t| t.is(",")) {
        lx.next();
        items.push(select_item(lx)?);
    }
    Ok(items)
}

fn name_token(lx: &mut Lexer, expected: &str) -> Result<Token, ParseError> {
    let tok = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
        expected: expected.into(),
    })?;
    if !tok.quoted && (SINGLES.contains(&tok.text) || LONGS.contains(&tok.text.as_str())) {
        return Err(ParseError::Unexpected {
            found: tok.text,
            offset: tok.offset,
            expected: expected.into(),
        });
    }
    Ok(tok)
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

fn select_item(lx: &mut Lexer) -> Result<SelectItem, ParseError> {
    let first = name_token(lx, "a column or relation name").map_err(|err| match err {
        ParseError::Unexpected { found, offset, .. } if found == "..." => {
            ParseError::SpreadNotSupported { offset }
        }
        other => other,
    })?;

    // Optional alias. "::" scans as its own token, so a single ":" here is
    // unambiguous.
    let (alias, name_tok) = if lx.peek().is_some_and(|t| t.is(":")) {
        lx.next();
        (
            Some(first.text.clone()),
            name_token(lx, "a column or relation name")?,
        )
    } else {
        (None, first)
    };

    let field = parse_field(lx, name_tok)?;

    // Aggregate form: field '.' fn '(' ')'
    if lx.peek().is_some_and(|t| t.is(".")) {
        lx.next();
        let fn_tok = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
            expected: "an aggregate function".into(),
        })?;
        let func = AggregateFn::from_name(fn_tok.text.trim()).ok_or_else(|| {
            ParseError::Unexpected {
                found: fn_tok.text.clone(),
                offset: fn_tok.offset,
                expected: "sum, avg, min, max or count".into(),
            }
        })?;
        expect(lx, "(")?;
        expect(lx, ")")?;
        let cast = parse_cast(lx)?;
        return Ok(SelectItem::Column(ColumnItem {
            field,
            alias,
            cast: None,
            aggregate: Some(Aggregate { func, cast }),
        }));
    }

    // Embed hints.
    let mut hint = None;
    let mut inner = false;
    while lx.peek().is_some_and(|t| t.is("!")) {
        lx.next();
        let h = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
            expected: "an embed hint".into(),
        })?;
        if h.is("inner") {
            inner = true;
        } else {
            hint = Some(h.text.clone());
        }
    }

    let cast = parse_cast(lx)?;

    if lx.peek().is_some_and(|t| t.is("(")) {
        let open = expect(lx, "(")?;

        // `count()` and friends without a column aggregate over the whole row.
        if field.path.is_empty()
            && hint.is_none()
            && !inner
            && cast.is_none()
            && lx.peek().is_some_and(|t| t.is(")"))
            && let Some(func) = AggregateFn::from_name(&field.name)
        {
            lx.next();
            let agg_cast = parse_cast(lx)?;
            return Ok(SelectItem::Column(ColumnItem {
                field: Field::column("*"),
                alias,
                cast: None,
                aggregate: Some(Aggregate {
                    func,
                    cast: agg_cast,
                }),
            }));
        }

        if cast.is_some() {
            return Err(ParseError::CastOnEmbed {
                offset: open.offset,
            });
        }
        if !field.path.is_empty() {
            return Err(ParseError::Unexpected {
                found: "(".into(),
                offset: open.offset,
                expected: "no JSON path on an embedded resource".into(),
            });
        }
        if let Some(close) = lx.peek().filter(|t| t.is(")")) {
            return Err(ParseError::Unexpected {
                found: close.text.clone(),
                offset: close.offset,
                expected: "a select item".into(),
            });
        }
        let select = select_list(lx)?;
        expect(lx, ")")?;
        return Ok(SelectItem::Embed(EmbedItem {
            name: field.name,
            alias,
            hint,
            inner,
            select,
        }));
    }

    if hint.is_some() || inner {
        let (found, offset) = match lx.peek() {
            Some(t) => (t.text.clone(), t.offset),
            None => (String::from(""), lx.end_offset()),
        };
        return Err(ParseError::Unexpected {
            found,
            offset,
            expected: "\"(\" after an embed hint".into(),
        });
    }

    Ok(SelectItem::Column(ColumnItem {
        field,
        alias,
        cast,
        aggregate: None,
    }))
}

fn parse_cast(lx: &mut Lexer) -> Result<Option<String>, ParseError> {
    if lx.peek().is_some_and(|t| t.is("::")) {
        lx.next();
        let tok = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
            expected: "a type name".into(),
        })?;
        Ok(Some(tok.text.trim().to_string()))
    } else {
        Ok(None)
    }
}
