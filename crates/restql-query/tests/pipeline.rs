//! End-to-end pipeline tests over a fixture catalog: query string in,
//! SQL plan and shaping descriptor out.

use indexmap::IndexMap;
use restql_core::{ContentRange, ErrorCode, MediaType};
use restql_query::{
    NodeShape, RequestHeaders, RpcVerb, compile_call, compile_delete, compile_insert,
    compile_read, compile_update,
};
use restql_schema::{
    ArgMode, Column, ForeignKey, Function, FunctionArg, SchemaCache, Table, TableKind,
    UniqueConstraint, Volatility,
};
use serde_json::json;

fn column(name: &str, data_type: &str) -> Column {
    Column {
        name: name.into(),
        data_type: data_type.into(),
        nullable: true,
        has_default: false,
    }
}

fn table(name: &str, columns: Vec<Column>) -> Table {
    Table {
        schema: "public".into(),
        name: name.into(),
        kind: TableKind::Table,
        columns,
    }
}

fn fk(name: &str, from: &str, cols: &[&str], to: &str, rcols: &[&str]) -> ForeignKey {
    ForeignKey {
        name: name.into(),
        table: format!("public.{from}"),
        columns: cols.iter().map(|s| s.to_string()).collect(),
        referenced_table: format!("public.{to}"),
        referenced_columns: rcols.iter().map(|s| s.to_string()).collect(),
    }
}

fn catalog() -> SchemaCache {
    SchemaCache::builder()
        .table(table("items", vec![column("id", "integer"), column("name", "text")]))
        .table(table(
            "projects",
            vec![column("id", "integer"), column("name", "text"), column("client_id", "integer")],
        ))
        .table(table(
            "tasks",
            vec![column("id", "integer"), column("name", "text"), column("project_id", "integer")],
        ))
        .table(table(
            "employees",
            vec![column("id", "integer"), column("salary", "numeric"), column("company", "text")],
        ))
        .unique(UniqueConstraint {
            name: "items_pkey".into(),
            table: "public.items".into(),
            columns: vec!["id".into()],
            primary: true,
        })
        .foreign_key(fk("tasks_project_id_fkey", "tasks", &["project_id"], "projects", &["id"]))
        .function(Function {
            schema: "public".into(),
            name: "add_them".into(),
            args: vec![
                FunctionArg {
                    name: "a".into(),
                    data_type: "integer".into(),
                    mode: ArgMode::In,
                    has_default: false,
                },
                FunctionArg {
                    name: "b".into(),
                    data_type: "integer".into(),
                    mode: ArgMode::In,
                    has_default: false,
                },
            ],
            return_type: "integer".into(),
            returns_set: false,
            returns_composite: false,
            volatility: Volatility::Immutable,
        })
        .build()
}

fn sql(plan: &restql_query::ExecutionPlan) -> &str {
    &plan.statement.as_ref().unwrap().sql
}

#[test]
fn test_read_with_negated_filter_and_order() {
    let plan = compile_read(
        &catalog(),
        "public",
        "items",
        "id=not.eq.5&order=id",
        &RequestHeaders::default(),
    )
    .unwrap();
    assert_eq!(
        sql(&plan),
        r#"SELECT "t0".* FROM "public"."items" AS "t0" WHERE NOT ("t0"."id" = '5') ORDER BY "t0"."id" ASC"#
    );
    // 14 of 15 rows come back; the caller derives the header from the
    // window it received.
    assert_eq!(ContentRange::new(0, 14, None).to_string(), "0-13/*");
}

#[test]
fn test_aliased_sibling_embeds_filter_independently() {
    let plan = compile_read(
        &catalog(),
        "public",
        "projects",
        "select=name,designTasks:tasks(name),tasks(name)&designTasks.name=like.*Design*",
        &RequestHeaders::default(),
    )
    .unwrap();
    let text = sql(&plan);
    // The filter narrows the aliased sibling only.
    assert!(text.contains(r#""t1"."name" LIKE '%Design%'"#));
    assert!(text.contains(r#"AS "designTasks""#));
    assert!(text.contains(r#"AS "tasks""#));
    let tasks_subquery = text.split(r#"AS "tasks""#).next().unwrap();
    assert_eq!(tasks_subquery.matches("LIKE").count(), 1);
    assert_eq!(plan.shape.nodes[1], NodeShape::NestedArray);
    assert_eq!(plan.shape.nodes[2], NodeShape::NestedArray);
}

#[test]
fn test_aggregate_grouping_law() {
    let plan = compile_read(
        &catalog(),
        "public",
        "employees",
        "select=salary.sum(),company&order=company.asc",
        &RequestHeaders::default(),
    )
    .unwrap();
    assert_eq!(
        sql(&plan),
        r#"SELECT sum("t0"."salary") AS "sum", "t0"."company" FROM "public"."employees" AS "t0" GROUP BY "t0"."company" ORDER BY "t0"."company" ASC"#
    );
}

#[test]
fn test_embed_cardinality_shapes() {
    let plan = compile_read(
        &catalog(),
        "public",
        "tasks",
        "select=name,projects(name)",
        &RequestHeaders::default(),
    )
    .unwrap();
    // Many-to-one: object or null, never an array.
    assert_eq!(plan.shape.nodes[1], NodeShape::NestedObject);
    assert!(sql(&plan).contains("row_to_json"));
    assert!(!sql(&plan).contains("json_agg"));

    let plan = compile_read(
        &catalog(),
        "public",
        "projects",
        "select=name,tasks(name)",
        &RequestHeaders::default(),
    )
    .unwrap();
    // One-to-many: always an array, [] when empty.
    assert_eq!(plan.shape.nodes[1], NodeShape::NestedArray);
    assert!(sql(&plan).contains("COALESCE"));
}

#[test]
fn test_negative_json_index_renders_from_the_end() {
    let plan = compile_read(
        &catalog(),
        "public",
        "items",
        "select=last:name&data->>-1=eq.3",
        &RequestHeaders::default(),
    )
    .unwrap();
    assert!(sql(&plan).contains(r#"("t0"."data"->>-1) = '3'"#));
}

#[test]
fn test_unknown_embed_fails_resolution() {
    let err = compile_read(
        &catalog(),
        "public",
        "items",
        "select=id,tasks(name)",
        &RequestHeaders::default(),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::NoRelationship);
    assert_eq!(err.status(), 400);
}

#[test]
fn test_filter_on_resource_not_embedded() {
    let err = compile_read(
        &catalog(),
        "public",
        "projects",
        "select=name&tasks.name=eq.x",
        &RequestHeaders::default(),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotAnEmbeddedResource);
}

#[test]
fn test_parse_error_carries_parameter_and_position() {
    let err = compile_read(
        &catalog(),
        "public",
        "items",
        "select=id,,name",
        &RequestHeaders::default(),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::ParseError);
    assert!(err.message.contains("select"));
    assert!(err.details.is_some());
}

#[test]
fn test_singular_accept_sets_singular_shape() {
    let headers = RequestHeaders {
        accept: vec!["application/vnd.pgrst.object+json"],
        ..RequestHeaders::default()
    };
    let plan = compile_read(&catalog(), "public", "items", "id=eq.1", &headers).unwrap();
    assert_eq!(plan.shape.media, MediaType::SingularJson);
    assert!(plan.shape.verify_row_count(0).is_err());
}

#[test]
fn test_insert_with_columns_restriction() {
    let plan = compile_insert(
        &catalog(),
        "public",
        "items",
        "columns=id,name",
        json!([{"id": 1, "name": "a", "ignored": true}]),
        &RequestHeaders::default(),
    )
    .unwrap();
    let stmt = plan.statement.unwrap();
    assert_eq!(
        stmt.sql,
        r#"INSERT INTO "public"."items" ("id", "name") VALUES ($1, $2)"#
    );
    assert_eq!(stmt.binds, vec![json!(1), json!("a")]);
}

#[test]
fn test_insert_unknown_column_in_columns() {
    let err = compile_insert(
        &catalog(),
        "public",
        "items",
        "columns=id,nope",
        json!({"id": 1}),
        &RequestHeaders::default(),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownColumnInColumns);
}

#[test]
fn test_upsert_with_prefer_resolution() {
    let headers = RequestHeaders {
        prefer: vec!["resolution=ignore-duplicates"],
        ..RequestHeaders::default()
    };
    let plan = compile_insert(
        &catalog(),
        "public",
        "items",
        "",
        json!({"id": 1, "name": "a"}),
        &headers,
    )
    .unwrap();
    assert!(
        plan.statement
            .unwrap()
            .sql
            .ends_with(r#"ON CONFLICT ("id") DO NOTHING"#)
    );
}

#[test]
fn test_empty_patch_compiles_to_noop() {
    let plan = compile_update(
        &catalog(),
        "public",
        "items",
        "",
        json!({}),
        &RequestHeaders::default(),
    )
    .unwrap();
    // Zero rows updated, 204, no body: there is nothing to execute.
    assert!(plan.statement.is_none());
}

#[test]
fn test_update_routes_filters() {
    let plan = compile_update(
        &catalog(),
        "public",
        "items",
        "id=eq.3",
        json!({"name": "renamed"}),
        &RequestHeaders::default(),
    )
    .unwrap();
    assert_eq!(
        sql(&plan),
        r#"UPDATE "public"."items" AS "t0" SET "name" = $1 WHERE "t0"."id" = '3'"#
    );
}

#[test]
fn test_limited_delete_needs_order() {
    let err = compile_delete(
        &catalog(),
        "public",
        "items",
        "limit=5",
        &RequestHeaders::default(),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::LimitWithoutOrder);

    let plan = compile_delete(
        &catalog(),
        "public",
        "items",
        "limit=5&order=id",
        &RequestHeaders::default(),
    )
    .unwrap();
    assert_eq!(plan.max_affected, Some(5));
    assert!(sql(&plan).contains("\"ctid\" IN"));
}

#[test]
fn test_rpc_call_binds_named_arguments() {
    let mut args = IndexMap::new();
    args.insert("a".to_string(), json!(1));
    args.insert("b".to_string(), json!(2));
    let plan = compile_call(
        &catalog(),
        "public",
        "add_them",
        RpcVerb::Get,
        &args,
        None,
        &RequestHeaders::default(),
    )
    .unwrap();
    let stmt = plan.statement.unwrap();
    assert_eq!(
        stmt.sql,
        r#"SELECT "public"."add_them"("a" := $1::"integer", "b" := $2::"integer") AS "add_them""#
    );
    assert_eq!(stmt.binds, vec![json!(1), json!(2)]);
}

#[test]
fn test_rpc_unknown_function_is_404_with_hint() {
    let err = compile_call(
        &catalog(),
        "public",
        "add_they",
        RpcVerb::Get,
        &IndexMap::new(),
        None,
        &RequestHeaders::default(),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::NoMatchingFunction);
    assert_eq!(err.status(), 404);
    assert!(err.hint.unwrap().contains("public.add_them"));
}

#[test]
fn test_unacceptable_media_type() {
    let headers = RequestHeaders {
        accept: vec!["image/png"],
        ..RequestHeaders::default()
    };
    let err = compile_read(&catalog(), "public", "items", "", &headers).unwrap_err();
    assert_eq!(err.code, ErrorCode::NoAcceptableMediaType);
    assert_eq!(err.status(), 406);
}
