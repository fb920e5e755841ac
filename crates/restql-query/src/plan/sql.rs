//! SQL text rendering: identifiers, literals, fields, predicates, ordering.
//!
//! Filter values are inlined as quoted literals; only payload values and
//! RPC arguments travel as binds.

use crate::ast::{Field, Filter, JsonKey, LogicOp, NullsOrder, Operator, OrderTerm, Trilean};
use std::fmt::Write;

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `"t"."col"`, or `("t"."col"->'k'->>2)` when a JSON path is present.
pub fn render_field(qualifier: &str, field: &Field) -> String {
    let base = format!("{}.{}", quote_ident(qualifier), quote_ident(&field.name));
    if field.path.is_empty() {
        return base;
    }
    let mut out = format!("({base}");
    for hop in &field.path {
        let arrow = if hop.as_text { "->>" } else { "->" };
        match &hop.key {
            JsonKey::Name(name) => {
                let _ = write!(out, "{arrow}{}", quote_literal(name));
            }
            JsonKey::Index(index) => {
                let _ = write!(out, "{arrow}{index}");
            }
        }
    }
    out.push(')');
    out
}

/// AND-join a node's filters into one predicate.
pub fn render_filters(qualifier: &str, filters: &[Filter]) -> String {
    filters
        .iter()
        .map(|f| render_filter(qualifier, f))
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub fn render_filter(qualifier: &str, filter: &Filter) -> String {
    match filter {
        Filter::Condition { field, negated, op } => {
            let expr = render_condition(&render_field(qualifier, field), op);
            if *negated {
                format!("NOT ({expr})")
            } else {
                expr
            }
        }
        Filter::Group {
            op,
            negated,
            children,
        } => {
            let glue = match op {
                LogicOp::And => " AND ",
                LogicOp::Or => " OR ",
            };
            let body = children
                .iter()
                .map(|c| render_filter(qualifier, c))
                .collect::<Vec<_>>()
                .join(glue);
            if *negated {
                format!("NOT ({body})")
            } else {
                format!("({body})")
            }
        }
    }
}

fn render_condition(lhs: &str, op: &Operator) -> String {
    let binary = |sym: &str, v: &str| format!("{lhs} {sym} {}", quote_literal(v));
    match op {
        Operator::Eq(v) => binary("=", v),
        Operator::Neq(v) => binary("<>", v),
        Operator::Gt(v) => binary(">", v),
        Operator::Gte(v) => binary(">=", v),
        Operator::Lt(v) => binary("<", v),
        Operator::Lte(v) => binary("<=", v),
        Operator::Like(v) => binary("LIKE", v),
        Operator::Ilike(v) => binary("ILIKE", v),
        Operator::Match(v) => binary("~", v),
        Operator::Imatch(v) => binary("~*", v),
        // An empty list matches nothing; negation flips it to everything.
        Operator::In(values) if values.is_empty() => "false".to_string(),
        Operator::In(values) => {
            let list = values
                .iter()
                .map(|v| quote_literal(v))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{lhs} IN ({list})")
        }
        Operator::Is(tri) => {
            let lit = match tri {
                Trilean::Null => "NULL",
                Trilean::True => "TRUE",
                Trilean::False => "FALSE",
                Trilean::Unknown => "UNKNOWN",
            };
            format!("{lhs} IS {lit}")
        }
        Operator::Fts {
            kind,
            language,
            query,
        } => {
            let f = kind.tsquery_function();
            match language {
                Some(lang) => format!(
                    "{lhs} @@ {f}({}, {})",
                    quote_literal(lang),
                    quote_literal(query)
                ),
                None => format!("{lhs} @@ {f}({})", quote_literal(query)),
            }
        }
        Operator::Contains(v) => binary("@>", v),
        Operator::ContainedIn(v) => binary("<@", v),
        Operator::Overlaps(v) => binary("&&", v),
        Operator::StrictlyLeft(v) => binary("<<", v),
        Operator::StrictlyRight(v) => binary(">>", v),
        Operator::NotExtendsLeft(v) => binary("&>", v),
        Operator::NotExtendsRight(v) => binary("&<", v),
        Operator::Adjacent(v) => binary("-|-", v),
    }
}

/// ORDER BY terms; the NULLS clause is emitted only when it inverts the
/// database default (last for ascending, first for descending).
pub fn render_order(qualifier: &str, terms: &[OrderTerm]) -> String {
    terms
        .iter()
        .map(|term| {
            let mut out = render_field(qualifier, &term.field);
            out.push_str(if term.descending { " DESC" } else { " ASC" });
            match (term.nulls, term.descending) {
                (Some(NullsOrder::First), false) => out.push_str(" NULLS FIRST"),
                (Some(NullsOrder::Last), true) => out.push_str(" NULLS LAST"),
                _ => {}
            }
            out
        })
        .collect::<Vec<_>>()
        .join(", ")
}
