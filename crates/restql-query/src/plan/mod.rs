//! Query synthesizer: a resolved tree (or resolved call) becomes an
//! [`ExecutionPlan`] — SQL text plus a response-shaping descriptor.
//!
//! The compiler never talks to the database. Filter values are inlined as
//! escaped literals; payload values and RPC arguments are `$N` binds so the
//! executor can pass them through typed. Row-count checks that can only be
//! decided after execution (singular object, limited mutations) are carried
//! as verifiable metadata on the plan.

pub mod sql;

use crate::ast::ColumnItem;
use crate::resolve::{ResolvedNode, ResolvedTree};
use crate::rpc::{CallArguments, ResolvedCall};
use indexmap::IndexMap;
use restql_core::{
    ApiError, CountMode, ErrorCode, MediaType, MissingMode, Preferences, RequestRange, Resolution,
    ReturnMode,
};
use restql_schema::{Relationship, SchemaCache};
use serde_json::Value;
use sql::{quote_ident, render_filters, render_order};
use tracing::debug;

/// One statement ready for the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<Value>,
}

impl Statement {
    fn new(sql: String, binds: Vec<Value>) -> Self {
        Self { sql, binds }
    }
}

/// How one resolved node nests in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeShape {
    /// Root rows: array, CSV lines or a raw scalar per the media type.
    Rows,
    /// To-many embed: always an array, `[]` when empty.
    NestedArray,
    /// To-one embed: an object or `null`.
    NestedObject,
}

/// Response-shaping descriptor handed to the response writer.
#[derive(Debug, Clone)]
pub struct ResponseShape {
    pub media: MediaType,
    /// Exactly one row required; violation is a cardinality error.
    pub singular: bool,
    /// Parallel to the resolved tree's node arena.
    pub nodes: Vec<NodeShape>,
}

impl ResponseShape {
    fn for_tree(tree: &ResolvedTree, media: MediaType) -> Self {
        let nodes = tree
            .nodes
            .iter()
            .map(|node| match &node.edge {
                None => NodeShape::Rows,
                Some(edge) if edge.cardinality.to_one() => NodeShape::NestedObject,
                Some(_) => NodeShape::NestedArray,
            })
            .collect();
        Self {
            media,
            singular: media == MediaType::SingularJson,
            nodes,
        }
    }

    fn flat(media: MediaType) -> Self {
        Self {
            media,
            singular: media == MediaType::SingularJson,
            nodes: vec![NodeShape::Rows],
        }
    }

    /// Enforce the singular-object requirement after execution.
    pub fn verify_row_count(&self, rows: u64) -> Result<(), ApiError> {
        if self.singular && rows != 1 {
            return Err(ApiError::new(
                ErrorCode::SingularityViolation,
                "JSON object requested, multiple (or no) rows returned",
            )
            .with_details(format!("The result contains {rows} rows")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// `None` is a valid no-op plan (e.g. an empty update payload).
    pub statement: Option<Statement>,
    /// Present when an exact count was requested.
    pub count_statement: Option<Statement>,
    pub count: Option<CountMode>,
    /// Limited mutations must not affect more rows than this.
    pub max_affected: Option<u64>,
    pub shape: ResponseShape,
}

impl ExecutionPlan {
    /// Enforce the limited-mutation bound after execution; a violation must
    /// roll the transaction back.
    pub fn verify_affected(&self, affected: u64) -> Result<(), ApiError> {
        if let Some(max) = self.max_affected
            && affected > max
        {
            return Err(ApiError::new(
                ErrorCode::LimitViolated,
                format!("The maximum number of rows allowed to be affected was exceeded, expected {max} but got {affected}"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub media: MediaType,
    pub prefs: Preferences,
    pub range: Option<RequestRange>,
}

/// Synthesize a read plan for a resolved tree.
pub fn select(tree: &ResolvedTree, opts: &ReadOptions) -> Result<ExecutionPlan, ApiError> {
    check_raw_media(tree, opts.media)?;
    check_aggregates(tree)?;
    let sql = node_query(tree, ResolvedTree::ROOT, opts.range.as_ref());
    let count_statement = (opts.prefs.count == Some(CountMode::Exact))
        .then(|| Statement::new(count_query(tree), Vec::new()));
    debug!(%sql, "select plan synthesized");
    Ok(ExecutionPlan {
        statement: Some(Statement::new(sql, Vec::new())),
        count_statement,
        count: opts.prefs.count,
        max_affected: None,
        shape: ResponseShape::for_tree(tree, opts.media),
    })
}

/// Raw media types carry a single column's value through unchanged.
fn check_raw_media(tree: &ResolvedTree, media: MediaType) -> Result<(), ApiError> {
    if !media.is_raw() {
        return Ok(());
    }
    let root = tree.root();
    let single_column = root.select.len() == 1
        && root.select[0].field.name != "*"
        && root.children.is_empty();
    if single_column {
        Ok(())
    } else {
        Err(ApiError::new(
            ErrorCode::BinaryWithMultipleColumns,
            format!(
                "{} requested but more than one column was selected",
                media.as_str()
            ),
        ))
    }
}

/// An embed subselect in the projection cannot appear in GROUP BY, so a node
/// mixing aggregates with embedded resources would fail at execution.
fn check_aggregates(tree: &ResolvedTree) -> Result<(), ApiError> {
    for node in &tree.nodes {
        let aggregated = node.select.iter().any(|item| item.aggregate.is_some());
        if aggregated && !node.children.is_empty() {
            return Err(ApiError::new(
                ErrorCode::ParseError,
                "aggregate functions cannot be combined with embedded resources",
            ));
        }
    }
    Ok(())
}

fn node_alias(index: usize) -> String {
    format!("t{index}")
}

/// `"schema"."name"` from the catalog's qualified key.
fn quote_table(qualified: &str) -> String {
    match qualified.split_once('.') {
        Some((schema, name)) => format!("{}.{}", quote_ident(schema), quote_ident(name)),
        None => quote_ident(qualified),
    }
}

fn node_query(tree: &ResolvedTree, index: usize, range: Option<&RequestRange>) -> String {
    let node = &tree.nodes[index];
    let alias = node_alias(index);

    let mut projection: Vec<String> = Vec::new();
    for item in &node.select {
        projection.push(render_column(&alias, item));
    }
    for &child in &node.children {
        projection.push(embed_projection(tree, child));
    }
    if projection.is_empty() {
        projection.push(format!("{}.*", quote_ident(&alias)));
    }

    let mut out = format!(
        "SELECT {} FROM {} AS {}",
        projection.join(", "),
        quote_table(&node.table),
        quote_ident(&alias)
    );
    if let Some(junction_from) = junction_from(tree, index) {
        out.push_str(", ");
        out.push_str(&junction_from);
    }

    let conditions = node_conditions(tree, index);
    if !conditions.is_empty() {
        out.push_str(" WHERE ");
        out.push_str(&conditions.join(" AND "));
    }

    let group = grouping(&alias, &node.select);
    if !group.is_empty() {
        out.push_str(" GROUP BY ");
        out.push_str(&group.join(", "));
    }

    if !node.order.is_empty() {
        out.push_str(" ORDER BY ");
        out.push_str(&render_order(&alias, &node.order));
    }

    let (limit, offset) = match range {
        Some(r) => (node.limit.or(r.limit), node.offset.or(Some(r.offset))),
        None => (node.limit, node.offset),
    };
    if let Some(limit) = limit {
        out.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = offset.filter(|&o| o > 0) {
        out.push_str(&format!(" OFFSET {offset}"));
    }
    out
}

/// Filters, join to the parent, and EXISTS conditions for `!inner` embeds.
fn node_conditions(tree: &ResolvedTree, index: usize) -> Vec<String> {
    let node = &tree.nodes[index];
    let alias = node_alias(index);
    let mut conditions = Vec::new();
    if let (Some(parent), Some(edge)) = (node.parent, node.edge.as_ref()) {
        conditions.push(join_condition(edge, index, parent));
    }
    for filter in &node.filters {
        conditions.push(sql::render_filter(&alias, filter));
    }
    for &child in &node.children {
        if tree.nodes[child].inner {
            conditions.push(exists_condition(tree, child, index));
        }
    }
    conditions
}

/// The junction table joined alongside a many-to-many embed.
fn junction_from(tree: &ResolvedTree, index: usize) -> Option<String> {
    let node = &tree.nodes[index];
    let junction = node.edge.as_ref()?.junction.as_ref()?;
    Some(format!(
        "{} AS {}",
        quote_table(&junction.table),
        quote_ident(&format!("x{index}"))
    ))
}

fn join_condition(edge: &Relationship, child: usize, parent: usize) -> String {
    let child_alias = node_alias(child);
    let parent_alias = node_alias(parent);
    let mut parts = Vec::new();
    match &edge.junction {
        Some(junction) => {
            let x = format!("x{child}");
            for (jc, pc) in junction.columns.iter().zip(&edge.columns) {
                parts.push(format!(
                    "{}.{} = {}.{}",
                    quote_ident(&x),
                    quote_ident(jc),
                    quote_ident(&parent_alias),
                    quote_ident(pc)
                ));
            }
            for (jc, cc) in junction.related_columns.iter().zip(&edge.related_columns) {
                parts.push(format!(
                    "{}.{} = {}.{}",
                    quote_ident(&x),
                    quote_ident(jc),
                    quote_ident(&child_alias),
                    quote_ident(cc)
                ));
            }
        }
        None => {
            for (cc, pc) in edge.related_columns.iter().zip(&edge.columns) {
                parts.push(format!(
                    "{}.{} = {}.{}",
                    quote_ident(&child_alias),
                    quote_ident(cc),
                    quote_ident(&parent_alias),
                    quote_ident(pc)
                ));
            }
        }
    }
    parts.join(" AND ")
}

/// `EXISTS (...)` over the child's rows, used to drop parents of `!inner`
/// embeds with no match.
fn exists_condition(tree: &ResolvedTree, child: usize, parent: usize) -> String {
    let node = &tree.nodes[child];
    let alias = node_alias(child);
    let mut from = format!("{} AS {}", quote_table(&node.table), quote_ident(&alias));
    if let Some(junction_from) = junction_from(tree, child) {
        from.push_str(", ");
        from.push_str(&junction_from);
    }
    let mut conditions = Vec::new();
    if let Some(edge) = &node.edge {
        conditions.push(join_condition(edge, child, parent));
    }
    if !node.filters.is_empty() {
        conditions.push(render_filters(&alias, &node.filters));
    }
    format!(
        "EXISTS (SELECT 1 FROM {from} WHERE {})",
        conditions.join(" AND ")
    )
}

fn embed_projection(tree: &ResolvedTree, child: usize) -> String {
    let node = &tree.nodes[child];
    let inner = node_query(tree, child, None);
    let wrap = quote_ident(&format!("j{child}"));
    let out = quote_ident(&node.alias);
    let to_one = node
        .edge
        .as_ref()
        .is_some_and(|edge| edge.cardinality.to_one());
    if to_one {
        format!("(SELECT row_to_json({wrap}) FROM ({inner}) AS {wrap}) AS {out}")
    } else {
        format!(
            "COALESCE((SELECT json_agg(row_to_json({wrap})) FROM ({inner}) AS {wrap}), '[]') AS {out}"
        )
    }
}

fn render_column(alias: &str, item: &ColumnItem) -> String {
    if item.field.name == "*" && item.aggregate.is_none() {
        return format!("{}.*", quote_ident(alias));
    }
    let mut expr = sql::render_field(alias, &item.field);
    if let Some(cast) = &item.cast {
        expr = format!("{expr}::{}", quote_ident(cast));
    }
    let plain = item.field.path.is_empty() && item.cast.is_none() && item.aggregate.is_none();
    if let Some(agg) = &item.aggregate {
        expr = if item.field.name == "*" {
            format!("{}(*)", agg.func.name())
        } else {
            format!("{}({expr})", agg.func.name())
        };
        if let Some(cast) = &agg.cast {
            expr = format!("{expr}::{}", quote_ident(cast));
        }
    }
    if plain && item.alias.is_none() {
        expr
    } else {
        format!("{expr} AS {}", quote_ident(item.output_name()))
    }
}

/// When aggregates are present, group by every non-aggregate selected
/// column, in selection order.
fn grouping(alias: &str, select: &[ColumnItem]) -> Vec<String> {
    if select.iter().all(|item| item.aggregate.is_none()) {
        return Vec::new();
    }
    select
        .iter()
        .filter(|item| item.aggregate.is_none())
        .map(|item| {
            let mut expr = sql::render_field(alias, &item.field);
            if let Some(cast) = &item.cast {
                expr = format!("{expr}::{}", quote_ident(cast));
            }
            expr
        })
        .collect()
}

fn count_query(tree: &ResolvedTree) -> String {
    let root = tree.root();
    let alias = node_alias(ResolvedTree::ROOT);
    let mut out = format!(
        "SELECT count(*) FROM {} AS {}",
        quote_table(&root.table),
        quote_ident(&alias)
    );
    let conditions = node_conditions(tree, ResolvedTree::ROOT);
    if !conditions.is_empty() {
        out.push_str(" WHERE ");
        out.push_str(&conditions.join(" AND "));
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct MutationOptions {
    pub media: MediaType,
    pub prefs: Preferences,
}

/// Decoded mutation payload: an ordered column restriction and the records.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    /// From `?columns=`; `None` means "whatever the records carry".
    pub columns: Option<Vec<String>>,
    pub records: Vec<serde_json::Map<String, Value>>,
}

impl Payload {
    /// Decode a JSON body: one object, or an array of objects.
    pub fn from_json(body: Value) -> Result<Self, ApiError> {
        let records = match body {
            Value::Object(record) => vec![record],
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(record) => Ok(record),
                    _ => Err(malformed_payload()),
                })
                .collect::<Result<_, _>>()?,
            _ => return Err(malformed_payload()),
        };
        Ok(Self {
            columns: None,
            records,
        })
    }

    /// Decode an `application/x-www-form-urlencoded` body as one record.
    pub fn from_form(pairs: &[(String, String)]) -> Self {
        let mut record = serde_json::Map::new();
        for (key, value) in pairs {
            record.insert(key.clone(), Value::String(value.clone()));
        }
        Self {
            columns: None,
            records: vec![record],
        }
    }

    /// Column order: the `?columns=` restriction, or first-seen key order
    /// across the records.
    fn column_list(&self) -> Vec<String> {
        if let Some(columns) = &self.columns {
            return columns.clone();
        }
        let mut seen = Vec::new();
        for record in &self.records {
            for key in record.keys() {
                if !seen.contains(key) {
                    seen.push(key.clone());
                }
            }
        }
        seen
    }
}

fn malformed_payload() -> ApiError {
    ApiError::new(ErrorCode::MalformedPayload, "Empty or invalid json")
}

/// Synthesize an INSERT, honoring `?columns=`, `?on_conflict=` and the
/// upsert resolution preference.
pub fn insert(
    cache: &SchemaCache,
    table: &str,
    payload: &Payload,
    on_conflict: Option<&[String]>,
    opts: &MutationOptions,
) -> Result<ExecutionPlan, ApiError> {
    let columns = payload.column_list();
    if let Some(restriction) = &payload.columns {
        check_columns(cache, table, restriction)?;
    }
    if payload.records.is_empty() || columns.is_empty() {
        return Ok(noop_plan(opts));
    }

    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let mut binds = Vec::new();
    let mut rows = Vec::new();
    let missing = opts.prefs.missing.unwrap_or(MissingMode::ApplyDefaults);
    for record in &payload.records {
        let mut cells = Vec::new();
        for column in &columns {
            match record.get(column) {
                Some(value) => {
                    binds.push(value.clone());
                    cells.push(format!("${}", binds.len()));
                }
                None => cells.push(
                    match missing {
                        MissingMode::ApplyDefaults => "DEFAULT",
                        MissingMode::ApplyNulls => "NULL",
                    }
                    .to_string(),
                ),
            }
        }
        rows.push(format!("({})", cells.join(", ")));
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_table(table),
        quoted.join(", "),
        rows.join(", ")
    );
    if let Some(resolution) = opts.prefs.resolution {
        sql.push_str(&conflict_clause(cache, table, &columns, on_conflict, resolution)?);
    }
    if opts.prefs.returning == ReturnMode::Representation {
        sql.push_str(" RETURNING *");
    }
    debug!(%sql, rows = payload.records.len(), "insert plan synthesized");
    Ok(ExecutionPlan {
        statement: Some(Statement::new(sql, binds)),
        count_statement: None,
        count: None,
        max_affected: None,
        shape: ResponseShape::flat(opts.media),
    })
}

fn conflict_clause(
    cache: &SchemaCache,
    table: &str,
    columns: &[String],
    on_conflict: Option<&[String]>,
    resolution: Resolution,
) -> Result<String, ApiError> {
    let target: Vec<String> = match on_conflict {
        Some(cols) => cols.to_vec(),
        None => cache
            .primary_key(table)
            .map(<[String]>::to_vec)
            .ok_or_else(|| {
                ApiError::new(
                    ErrorCode::ParseError,
                    format!("there is no primary key to resolve duplicates on '{table}'"),
                )
            })?,
    };
    let target_list = target
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !target.contains(c))
        .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
        .collect();
    Ok(match resolution {
        Resolution::IgnoreDuplicates => format!(" ON CONFLICT ({target_list}) DO NOTHING"),
        Resolution::MergeDuplicates if updates.is_empty() => {
            format!(" ON CONFLICT ({target_list}) DO NOTHING")
        }
        Resolution::MergeDuplicates => {
            format!(" ON CONFLICT ({target_list}) DO UPDATE SET {}", updates.join(", "))
        }
    })
}

fn check_columns(cache: &SchemaCache, table: &str, columns: &[String]) -> Result<(), ApiError> {
    let Some(known) = cache.table(table) else {
        return Ok(());
    };
    for column in columns {
        if known.column(column).is_none() {
            return Err(ApiError::new(
                ErrorCode::UnknownColumnInColumns,
                format!(
                    "Could not find the '{column}' column of '{}' in the schema cache",
                    known.name
                ),
            ));
        }
    }
    Ok(())
}

/// Synthesize an UPDATE from the root node's filters and paging.
pub fn update(
    tree: &ResolvedTree,
    record: &serde_json::Map<String, Value>,
    opts: &MutationOptions,
) -> Result<ExecutionPlan, ApiError> {
    if record.is_empty() {
        return Ok(noop_plan(opts));
    }
    let root = tree.root();
    let alias = node_alias(ResolvedTree::ROOT);
    let mut binds = Vec::new();
    let assignments: Vec<String> = record
        .iter()
        .map(|(column, value)| {
            binds.push(value.clone());
            format!("{} = ${}", quote_ident(column), binds.len())
        })
        .collect();
    let mut sql = format!(
        "UPDATE {} AS {} SET {}",
        quote_table(&root.table),
        quote_ident(&alias),
        assignments.join(", ")
    );
    let max_affected = append_mutation_scope(&mut sql, root, &alias)?;
    if opts.prefs.returning == ReturnMode::Representation {
        sql.push_str(" RETURNING *");
    }
    debug!(%sql, "update plan synthesized");
    Ok(ExecutionPlan {
        statement: Some(Statement::new(sql, binds)),
        count_statement: None,
        count: None,
        max_affected,
        shape: ResponseShape::flat(opts.media),
    })
}

/// Synthesize a DELETE from the root node's filters and paging.
pub fn delete(tree: &ResolvedTree, opts: &MutationOptions) -> Result<ExecutionPlan, ApiError> {
    let root = tree.root();
    let alias = node_alias(ResolvedTree::ROOT);
    let mut sql = format!(
        "DELETE FROM {} AS {}",
        quote_table(&root.table),
        quote_ident(&alias)
    );
    let max_affected = append_mutation_scope(&mut sql, root, &alias)?;
    if opts.prefs.returning == ReturnMode::Representation {
        sql.push_str(" RETURNING *");
    }
    debug!(%sql, "delete plan synthesized");
    Ok(ExecutionPlan {
        statement: Some(Statement::new(sql, Vec::new())),
        count_statement: None,
        count: None,
        max_affected,
        shape: ResponseShape::flat(opts.media),
    })
}

/// WHERE clause for a mutation; a limit turns into a ctid subselect, which
/// requires an explicit order so the affected window is deterministic.
fn append_mutation_scope(
    sql: &mut String,
    root: &ResolvedNode,
    alias: &str,
) -> Result<Option<u64>, ApiError> {
    if root.limit.is_none() && root.offset.is_none() {
        if !root.filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_filters(alias, &root.filters));
        }
        return Ok(None);
    }
    if root.order.is_empty() {
        return Err(ApiError::new(
            ErrorCode::LimitWithoutOrder,
            "A 'limit' was applied without an explicit 'order'",
        )
        .with_hint("Apply an 'order' using unique column(s)"));
    }
    let scope = "s0";
    let mut inner = format!(
        "SELECT {}.\"ctid\" FROM {} AS {}",
        quote_ident(scope),
        quote_table(&root.table),
        quote_ident(scope)
    );
    if !root.filters.is_empty() {
        inner.push_str(" WHERE ");
        inner.push_str(&render_filters(scope, &root.filters));
    }
    inner.push_str(" ORDER BY ");
    inner.push_str(&render_order(scope, &root.order));
    if let Some(limit) = root.limit {
        inner.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = root.offset.filter(|&o| o > 0) {
        inner.push_str(&format!(" OFFSET {offset}"));
    }
    sql.push_str(&format!(
        " WHERE {}.\"ctid\" IN ({inner})",
        quote_ident(alias)
    ));
    Ok(root.limit)
}

fn noop_plan(opts: &MutationOptions) -> ExecutionPlan {
    ExecutionPlan {
        statement: None,
        count_statement: None,
        count: None,
        max_affected: None,
        shape: ResponseShape::flat(opts.media),
    }
}

/// Synthesize the statement for a resolved RPC call. `raw_body` is the
/// opaque payload bound to a single unnamed parameter.
pub fn call(
    resolved: &ResolvedCall,
    args: &IndexMap<String, Value>,
    raw_body: Option<Value>,
    opts: &ReadOptions,
) -> Result<ExecutionPlan, ApiError> {
    let function = &resolved.function;
    let name = format!(
        "{}.{}",
        quote_ident(&function.schema),
        quote_ident(&function.name)
    );
    let mut binds = Vec::new();
    let rendered_args = match resolved.arguments {
        CallArguments::Named => function
            .input_args()
            .filter_map(|arg| {
                let value = args.get(&arg.name)?;
                binds.push(value.clone());
                // Casting every argument lets GET calls pass text values.
                Some(format!(
                    "{} := ${}::{}",
                    quote_ident(&arg.name),
                    binds.len(),
                    quote_ident(&arg.data_type)
                ))
            })
            .collect::<Vec<_>>()
            .join(", "),
        CallArguments::RawBody => {
            binds.push(raw_body.unwrap_or(Value::Null));
            match function.single_unnamed_type() {
                Some(param_type) => format!("$1::{}", quote_ident(param_type)),
                None => "$1".to_string(),
            }
        }
    };
    let sql = if resolved.result_kind.is_composite() || resolved.result_kind.is_set() {
        format!("SELECT * FROM {name}({rendered_args})")
    } else {
        format!(
            "SELECT {name}({rendered_args}) AS {}",
            quote_ident(&function.name)
        )
    };
    debug!(%sql, "rpc plan synthesized");
    Ok(ExecutionPlan {
        statement: Some(Statement::new(sql, binds)),
        count_statement: None,
        count: opts.prefs.count,
        max_affected: None,
        shape: ResponseShape::flat(opts.media),
    })
}
