//! `?order=` grammar.
//!
//! ```text
//! OrderList := OrderItem (',' OrderItem)*
//! OrderItem := Field ['.' ('asc' | 'desc')] ['.' ('nullsfirst' | 'nullslast')]
//! ```

use super::{ParseError, parse_field};
use crate::ast::{NullsOrder, OrderTerm};
use crate::lexer::Lexer;

const SINGLES: &str = ".,";
const LONGS: &[&str] = &["->>", "->"];

pub fn parse_order(input: &str) -> Result<Vec<OrderTerm>, ParseError> {
    let mut lx = Lexer::scan(input, SINGLES, LONGS);
    if lx.is_eof() {
        return Err(ParseError::UnexpectedEnd {
            expected: "an order term".into(),
        });
    }
    let mut terms = Vec::new();
    loop {
        terms.push(order_term(&mut lx)?);
        match lx.next() {
            None => break,
            Some(t) if t.is(",") => continue,
            Some(t) => {
                return Err(ParseError::Unexpected {
                    found: t.text,
                    offset: t.offset,
                    expected: "\",\" or end of input".into(),
                });
            }
        }
    }
    Ok(terms)
}

fn order_term(lx: &mut Lexer) -> Result<OrderTerm, ParseError> {
    let first = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
        expected: "a column name".into(),
    })?;
    let field = parse_field(lx, first)?;

    let mut descending = false;
    let mut nulls = None;
    let mut have_direction = false;
    while lx.peek().is_some_and(|t| t.is(".")) {
        lx.next();
        let tok = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
            expected: "asc, desc, nullsfirst or nullslast".into(),
        })?;
        match tok.text.trim() {
            "asc" if !tok.quoted && !have_direction && nulls.is_none() => {
                have_direction = true;
            }
            "desc" if !tok.quoted && !have_direction && nulls.is_none() => {
                have_direction = true;
                descending = true;
            }
            "nullsfirst" if !tok.quoted && nulls.is_none() => {
                nulls = Some(NullsOrder::First);
            }
            "nullslast" if !tok.quoted && nulls.is_none() => {
                nulls = Some(NullsOrder::Last);
            }
            _ => {
                return Err(ParseError::Unexpected {
                    found: tok.text,
                    offset: tok.offset,
                    expected: "asc, desc, nullsfirst or nullslast".into(),
                });
            }
        }
    }
    Ok(OrderTerm {
        field,
        descending,
        nulls,
    })
}
