//! Grammar parser: query-string parameters to the request tree.
//!
//! Each parameter family has its own recursive-descent parser over the
//! shared [`Lexer`](crate::lexer::Lexer):
//!
//! - `select` — columns, casts, aliases, aggregates and embeds
//! - filters — `column=[not.]op.value` and `and=`/`or=` logic trees
//! - `order` — direction and nulls placement per term
//!
//! Errors carry the offending token and its offset so the wire error can
//! point at the exact column.

pub mod filter;
pub mod order;
pub mod select;

use restql_core::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected end of input, expecting {expected}")]
    UnexpectedEnd { expected: String },

    #[error("unexpected \"{found}\" (line 1, column {}), expecting {expected}", offset + 1)]
    Unexpected {
        found: String,
        offset: usize,
        expected: String,
    },

    #[error("\"{found}\" (line 1, column {}) is not a valid filter operator", offset + 1)]
    MissingOperator { found: String, offset: usize },

    #[error("logic tree ({op}) must contain at least one condition")]
    EmptyLogicTree { op: String },

    #[error("is.{found} is not allowed, expecting null, true, false or unknown")]
    InvalidIsValue { found: String },

    #[error("spread embeds are not supported")]
    SpreadNotSupported { offset: usize },

    #[error("an embedded resource cannot have a cast")]
    CastOnEmbed { offset: usize },
}

impl ParseError {
    /// Wrap into the wire error for the named query parameter.
    pub fn into_api(self, parameter: &str, raw: &str) -> ApiError {
        let code = match self {
            ParseError::MissingOperator { .. } => ErrorCode::FilterMissingOperator,
            _ => ErrorCode::ParseError,
        };
        ApiError::new(
            code,
            format!("failed to parse {parameter} parameter ({raw})"),
        )
        .with_details(self.to_string())
    }
}

use crate::ast::{Field, JsonHop, JsonKey};
use crate::lexer::{Lexer, Token};

/// Parse a column reference with its JSON path, starting from an already
/// consumed name token.
pub(crate) fn parse_field(lx: &mut Lexer, first: Token) -> Result<Field, ParseError> {
    let mut field = Field {
        name: first.text.trim().to_string(),
        path: Vec::new(),
    };
    while let Some(arrow) = lx.peek() {
        let as_text = match arrow.text.as_str() {
            "->" if !arrow.quoted => false,
            "->>" if !arrow.quoted => true,
            _ => break,
        };
        lx.next();
        let member = lx.next().ok_or_else(|| ParseError::UnexpectedEnd {
            expected: "a JSON path member".into(),
        })?;
        let key = if !member.quoted
            && let Ok(index) = member.text.trim().parse::<i64>()
        {
            JsonKey::Index(index)
        } else {
            JsonKey::Name(member.text.clone())
        };
        field.path.push(JsonHop { key, as_text });
    }
    Ok(field)
}

/// Decode an `application/x-www-form-urlencoded` query string into ordered
/// key/value pairs.
pub fn decode_query(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Parse a `limit=`/`offset=` value.
pub fn parse_count(parameter: &str, value: &str) -> Result<u64, ApiError> {
    value.trim().parse().map_err(|_| {
        ApiError::new(
            ErrorCode::ParseError,
            format!("failed to parse {parameter} parameter ({value})"),
        )
        .with_details(format!("\"{value}\" is not a non-negative integer"))
    })
}
