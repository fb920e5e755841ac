//! Query-string to SQL compiler.
//!
//! The pipeline runs four synchronous stages inside the caller's worker:
//!
//! 1. **parse** — query-string grammar to a request tree
//! 2. **resolve** — embeds matched against the relationship catalog
//! 3. **attach** — dotted filter/order/paging parameters routed to nodes
//! 4. **plan** — SQL text plus a response-shaping descriptor
//!
//! The compiler never executes anything; it hands the execution layer an
//! [`ExecutionPlan`] and the metadata needed for post-execution checks
//! (singular objects, limited mutations, exact counts).

pub mod ast;
pub mod attach;
pub mod lexer;
pub mod parse;
pub mod plan;
pub mod resolve;
pub mod rpc;
mod suggest;

pub use plan::{ExecutionPlan, MutationOptions, NodeShape, Payload, ReadOptions, ResponseShape, Statement};
pub use resolve::{ResolvedNode, ResolvedTree};
pub use rpc::{CallArguments, ResolvedCall, RpcVerb};

use indexmap::IndexMap;
use restql_core::{ApiError, ErrorCode, Preferences, RequestRange, media};
use restql_schema::{SchemaCache, types};
use serde_json::Value;
use tracing::debug;

/// Request headers the compiler consults.
#[derive(Debug, Clone, Default)]
pub struct RequestHeaders<'a> {
    pub accept: Vec<&'a str>,
    pub prefer: Vec<&'a str>,
    pub range: Option<&'a str>,
    pub content_type: Option<&'a str>,
}

impl RequestHeaders<'_> {
    fn read_options(&self) -> Result<ReadOptions, ApiError> {
        Ok(ReadOptions {
            media: media::negotiate(&self.accept)?,
            prefs: Preferences::parse(&self.prefer)?,
            range: self.range.map(RequestRange::parse).transpose()?,
        })
    }

    fn mutation_options(&self) -> Result<MutationOptions, ApiError> {
        Ok(MutationOptions {
            media: media::negotiate(&self.accept)?,
            prefs: Preferences::parse(&self.prefer)?,
        })
    }
}

/// Parse, resolve and attach; the shared front half of every table request.
fn build_tree(
    cache: &SchemaCache,
    schema: &str,
    table: &str,
    pairs: &[(String, String)],
) -> Result<ResolvedTree, ApiError> {
    let select_raw = pairs
        .iter()
        .find(|(k, _)| k == "select")
        .map(|(_, v)| v.as_str())
        .unwrap_or("");
    let select = parse::select::parse_select(select_raw)
        .map_err(|e| e.into_api("select", select_raw))?;
    let mut tree = resolve::resolve(cache, schema, table, select)?;
    attach::attach(&mut tree, pairs)?;
    Ok(tree)
}

/// Compile a `GET /table` request.
pub fn compile_read(
    cache: &SchemaCache,
    schema: &str,
    table: &str,
    query: &str,
    headers: &RequestHeaders<'_>,
) -> Result<ExecutionPlan, ApiError> {
    debug!(schema, table, query, "compiling read");
    let pairs = parse::decode_query(query);
    let tree = build_tree(cache, schema, table, &pairs)?;
    plan::select(&tree, &headers.read_options()?)
}

/// Compile a `POST /table` request.
pub fn compile_insert(
    cache: &SchemaCache,
    schema: &str,
    table: &str,
    query: &str,
    body: Value,
    headers: &RequestHeaders<'_>,
) -> Result<ExecutionPlan, ApiError> {
    debug!(schema, table, query, "compiling insert");
    let pairs = parse::decode_query(query);
    let mut payload = Payload::from_json(body)?;
    if let Some((_, raw)) = pairs.iter().find(|(k, _)| k == "columns") {
        payload.columns = Some(parse_name_list(raw));
    }
    let on_conflict = pairs
        .iter()
        .find(|(k, _)| k == "on_conflict")
        .map(|(_, raw)| parse_name_list(raw));
    plan::insert(
        cache,
        &types::qualify(schema, table),
        &payload,
        on_conflict.as_deref(),
        &headers.mutation_options()?,
    )
}

/// Compile a `PATCH /table` request.
pub fn compile_update(
    cache: &SchemaCache,
    schema: &str,
    table: &str,
    query: &str,
    body: Value,
    headers: &RequestHeaders<'_>,
) -> Result<ExecutionPlan, ApiError> {
    debug!(schema, table, query, "compiling update");
    let pairs = parse::decode_query(query);
    let tree = build_tree(cache, schema, table, &pairs)?;
    let record = match body {
        Value::Object(record) => record,
        _ => {
            return Err(ApiError::new(
                ErrorCode::MalformedPayload,
                "Empty or invalid json",
            ));
        }
    };
    plan::update(&tree, &record, &headers.mutation_options()?)
}

/// Compile a `DELETE /table` request.
pub fn compile_delete(
    cache: &SchemaCache,
    schema: &str,
    table: &str,
    query: &str,
    headers: &RequestHeaders<'_>,
) -> Result<ExecutionPlan, ApiError> {
    debug!(schema, table, query, "compiling delete");
    let pairs = parse::decode_query(query);
    let tree = build_tree(cache, schema, table, &pairs)?;
    plan::delete(&tree, &headers.mutation_options()?)
}

/// Compile a `/rpc/fn` request. `args` carries the named arguments (from
/// the query string or a JSON body object) in request order; `raw_body` is
/// the opaque payload for single-unnamed-parameter functions.
pub fn compile_call(
    cache: &SchemaCache,
    schema: &str,
    name: &str,
    verb: RpcVerb,
    args: &IndexMap<String, Value>,
    raw_body: Option<Value>,
    headers: &RequestHeaders<'_>,
) -> Result<ExecutionPlan, ApiError> {
    debug!(schema, function = name, ?verb, "compiling rpc call");
    let supplied: Vec<&str> = args.keys().map(String::as_str).collect();
    let resolved = rpc::resolve_function(
        cache,
        schema,
        name,
        &supplied,
        headers.content_type,
        verb,
    )?;
    plan::call(&resolved, args, raw_body, &headers.read_options()?)
}

/// A comma-separated name list (`?columns=`, `?on_conflict=`), honoring
/// double-quoted names.
fn parse_name_list(raw: &str) -> Vec<String> {
    let mut lx = lexer::Lexer::scan(raw, ",", &[]);
    let mut names = Vec::new();
    while let Some(tok) = lx.next() {
        if !tok.is(",") {
            names.push(if tok.quoted {
                tok.text
            } else {
                tok.text.trim().to_string()
            });
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_list() {
        assert_eq!(parse_name_list("a, b,c"), vec!["a", "b", "c"]);
        assert_eq!(
            parse_name_list(r#""weird,name",plain"#),
            vec!["weird,name", "plain"]
        );
    }
}
