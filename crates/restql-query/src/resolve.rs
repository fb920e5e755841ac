//! Embedding resolver: turns the parsed select tree into a resolved
//! resource tree with one concrete relationship edge per embed.
//!
//! Nodes live in an arena indexed by position, with parent links as
//! indices. Cycles in the schema graph (self references, A-B-A chains)
//! therefore never become cycles in the resolved tree: every embed
//! instantiates a fresh node, even for a repeated table.

use crate::ast::{ColumnItem, Filter, OrderTerm, SelectItem};
use crate::suggest;
use restql_core::{ApiError, ErrorCode};
use restql_schema::{Relationship, SchemaCache, types};
use tracing::debug;

/// One resolved resource with its own select/filter/order context.
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    /// Qualified table name.
    pub table: String,
    /// Output name: the embed alias as written, or the relation name.
    pub alias: String,
    /// Edge from the parent; `None` for the root.
    pub edge: Option<Relationship>,
    /// `!inner`: parents without matching rows are dropped.
    pub inner: bool,
    pub select: Vec<ColumnItem>,
    pub filters: Vec<Filter>,
    pub order: Vec<OrderTerm>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// Arena of resolved nodes; index 0 is the root.
#[derive(Debug, Clone)]
pub struct ResolvedTree {
    pub nodes: Vec<ResolvedNode>,
}

impl ResolvedTree {
    pub const ROOT: usize = 0;

    pub fn root(&self) -> &ResolvedNode {
        &self.nodes[Self::ROOT]
    }

    pub fn children_of(&self, index: usize) -> impl Iterator<Item = (usize, &ResolvedNode)> {
        self.nodes[index]
            .children
            .iter()
            .map(|&child| (child, &self.nodes[child]))
    }
}

/// Resolve every embed in `select` against the catalog, starting from
/// `schema.table`.
pub fn resolve(
    cache: &SchemaCache,
    schema: &str,
    table: &str,
    select: Vec<SelectItem>,
) -> Result<ResolvedTree, ApiError> {
    let qualified = types::qualify(schema, table);
    let mut tree = ResolvedTree {
        nodes: vec![ResolvedNode {
            table: qualified,
            alias: table.to_string(),
            edge: None,
            inner: false,
            select: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            parent: None,
            children: Vec::new(),
        }],
    };
    resolve_level(cache, schema, &mut tree, ResolvedTree::ROOT, select)?;
    debug!(nodes = tree.nodes.len(), "embedding resolved");
    Ok(tree)
}

fn resolve_level(
    cache: &SchemaCache,
    schema: &str,
    tree: &mut ResolvedTree,
    node: usize,
    select: Vec<SelectItem>,
) -> Result<(), ApiError> {
    for item in select {
        match item {
            SelectItem::Column(column) => tree.nodes[node].select.push(column),
            SelectItem::Embed(embed) => {
                let parent_table = tree.nodes[node].table.clone();
                let target = types::qualify(schema, &embed.name);
                let edge = pick_edge(cache, &parent_table, &target, &embed.name, embed.hint.as_deref())?;
                let child = tree.nodes.len();
                tree.nodes.push(ResolvedNode {
                    table: target,
                    alias: embed.output_name().to_string(),
                    edge: Some(edge),
                    inner: embed.inner,
                    select: Vec::new(),
                    filters: Vec::new(),
                    order: Vec::new(),
                    limit: None,
                    offset: None,
                    parent: Some(node),
                    children: Vec::new(),
                });
                tree.nodes[node].children.push(child);
                resolve_level(cache, schema, tree, child, embed.select)?;
            }
        }
    }
    Ok(())
}

fn pick_edge(
    cache: &SchemaCache,
    parent: &str,
    target: &str,
    name: &str,
    hint: Option<&str>,
) -> Result<Relationship, ApiError> {
    let candidates = cache.relationships_between(parent, target);
    if candidates.is_empty() {
        let mut err = ApiError::new(
            ErrorCode::NoRelationship,
            format!("Could not find a relationship between '{parent}' and '{name}' in the schema cache"),
        );
        if let Some(h) = hint {
            err = err.with_details(format!("No relationship matches the hint '{h}'"));
        } else {
            let related = cache
                .relationships_of(parent)
                .iter()
                .map(|rel| rel.related_table.as_str());
            if let Some(suggestion) = suggest::nearest(target, related) {
                let bare = suggestion.rsplit('.').next().unwrap_or(suggestion);
                err = err.with_hint(format!("Perhaps you meant '{bare}'"));
            }
        }
        return Err(err);
    }

    let narrowed = match hint {
        Some(h) => narrow_by_hint(&candidates, h).ok_or_else(|| {
            ApiError::new(
                ErrorCode::NoRelationship,
                format!("Could not find a relationship between '{parent}' and '{name}' in the schema cache"),
            )
            .with_details(format!("No relationship matches the hint '{h}'"))
        })?,
        None => candidates,
    };

    if narrowed.len() > 1 {
        let mut constraints: Vec<&str> = narrowed.iter().map(|r| r.constraint.as_str()).collect();
        constraints.sort_unstable();
        return Err(ApiError::new(
            ErrorCode::NoRelationship,
            format!("Could not embed because more than one relationship was found for '{parent}' and '{name}'"),
        )
        .with_details(constraints.join(", "))
        .with_hint(format!(
            "Try changing '{name}' to '{name}!{}'",
            constraints[0]
        )));
    }
    Ok(narrowed[0].clone())
}

/// Narrow candidates by a hint, most specific interpretation first:
/// constraint name, then a referencing-side column, then a referenced-side
/// column, then the junction table. The tiering makes self references
/// resolvable: `!fk_column` picks the child-to-parent direction while the
/// mirror edge only matches on the referenced side.
fn narrow_by_hint<'a>(
    candidates: &[&'a Relationship],
    hint: &str,
) -> Option<Vec<&'a Relationship>> {
    let tiers: [&dyn Fn(&Relationship) -> bool; 4] = [
        &|r| r.constraint == hint,
        &|r| r.columns.iter().any(|c| c == hint),
        &|r| r.related_columns.iter().any(|c| c == hint),
        &|r| r.junction.as_ref().is_some_and(|j| j.table == hint),
    ];
    for tier in tiers {
        let matched: Vec<&Relationship> = candidates.iter().copied().filter(|r| tier(r)).collect();
        if !matched.is_empty() {
            return Some(matched);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::select::parse_select;
    use restql_schema::{Cardinality, ForeignKey, Table, TableKind, UniqueConstraint};

    fn table(name: &str, kind: TableKind) -> Table {
        Table {
            schema: "public".into(),
            name: name.into(),
            kind,
            columns: vec![],
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

    fn fixture() -> SchemaCache {
        SchemaCache::builder()
            .table(table("clients", TableKind::Table))
            .table(table("projects", TableKind::Table))
            .table(table("tasks", TableKind::Table))
            .table(table("users", TableKind::Table))
            .table(table("users_tasks", TableKind::Table))
            .table(table("employees", TableKind::Table))
            .foreign_key(fk("projects_client_id_fkey", "projects", &["client_id"], "clients", &["id"]))
            .foreign_key(fk("tasks_project_id_fkey", "tasks", &["project_id"], "projects", &["id"]))
            .foreign_key(fk("users_tasks_user_id_fkey", "users_tasks", &["user_id"], "users", &["id"]))
            .foreign_key(fk("users_tasks_task_id_fkey", "users_tasks", &["task_id"], "tasks", &["id"]))
            .foreign_key(fk("employees_reports_to_fkey", "employees", &["reports_to"], "employees", &["id"]))
            .unique(UniqueConstraint {
                name: "users_tasks_pkey".into(),
                table: "public.users_tasks".into(),
                columns: vec!["user_id".into(), "task_id".into()],
                primary: true,
            })
            .build()
    }

    fn resolve_str(select: &str, base: &str) -> Result<ResolvedTree, ApiError> {
        resolve(&fixture(), "public", base, parse_select(select).unwrap())
    }

    #[test]
    fn test_one_level_embed() {
        let tree = resolve_str("id,projects(id,name)", "clients").unwrap();
        assert_eq!(tree.nodes.len(), 2);
        let (_, child) = tree.children_of(ResolvedTree::ROOT).next().unwrap();
        assert_eq!(child.table, "public.projects");
        assert_eq!(
            child.edge.as_ref().unwrap().cardinality,
            Cardinality::OneToMany
        );
        assert_eq!(child.select.len(), 2);
    }

    #[test]
    fn test_nested_embed_cardinality() {
        let tree = resolve_str("name,projects(name,tasks(name))", "clients").unwrap();
        assert_eq!(tree.nodes.len(), 3);
        let tasks = &tree.nodes[2];
        assert_eq!(tasks.table, "public.tasks");
        assert_eq!(
            tasks.edge.as_ref().unwrap().cardinality,
            Cardinality::OneToMany
        );
    }

    #[test]
    fn test_parent_embed_is_to_one() {
        let tree = resolve_str("id,clients(name)", "projects").unwrap();
        let (_, client) = tree.children_of(ResolvedTree::ROOT).next().unwrap();
        assert_eq!(
            client.edge.as_ref().unwrap().cardinality,
            Cardinality::ManyToOne
        );
    }

    #[test]
    fn test_many_to_many_through_junction() {
        let tree = resolve_str("name,tasks(name)", "users").unwrap();
        let (_, tasks) = tree.children_of(ResolvedTree::ROOT).next().unwrap();
        let edge = tasks.edge.as_ref().unwrap();
        assert_eq!(edge.cardinality, Cardinality::ManyToMany);
        assert_eq!(
            edge.junction.as_ref().unwrap().table,
            "public.users_tasks"
        );
    }

    #[test]
    fn test_unknown_relation() {
        let err = resolve_str("id,unrelated(*)", "clients").unwrap_err();
        assert_eq!(err.code, ErrorCode::NoRelationship);
    }

    #[test]
    fn test_typo_gets_a_hint() {
        let err = resolve_str("id,project(*)", "clients").unwrap_err();
        assert_eq!(err.code, ErrorCode::NoRelationship);
        assert_eq!(err.hint.as_deref(), Some("Perhaps you meant 'projects'"));
    }

    #[test]
    fn test_self_reference_needs_hint() {
        let err = resolve_str("name,employees(name)", "employees").unwrap_err();
        assert_eq!(err.code, ErrorCode::NoRelationship);
        assert!(err.details.is_some());
    }

    #[test]
    fn test_self_reference_hint_by_column_picks_parent_direction() {
        let tree =
            resolve_str("name,superior:employees!reports_to(name)", "employees").unwrap();
        let (_, superior) = tree.children_of(ResolvedTree::ROOT).next().unwrap();
        assert_eq!(
            superior.edge.as_ref().unwrap().cardinality,
            Cardinality::ManyToOne
        );
        assert_eq!(superior.alias, "superior");
    }

    #[test]
    fn test_self_reference_hint_by_referenced_column_picks_children() {
        let tree = resolve_str("name,reports:employees!id(name)", "employees").unwrap();
        let (_, reports) = tree.children_of(ResolvedTree::ROOT).next().unwrap();
        assert_eq!(
            reports.edge.as_ref().unwrap().cardinality,
            Cardinality::OneToMany
        );
    }

    #[test]
    fn test_bad_hint_names_the_hint() {
        let err = resolve_str("id,projects!nope(id)", "clients").unwrap_err();
        assert_eq!(err.code, ErrorCode::NoRelationship);
        assert!(err.details.unwrap().contains("'nope'"));
    }

    #[test]
    fn test_two_aliased_embeds_stay_distinct_siblings() {
        let tree = resolve_str(
            "name,designTasks:tasks(name),codeTasks:tasks(name)",
            "projects",
        )
        .unwrap();
        let aliases: Vec<&str> = tree
            .children_of(ResolvedTree::ROOT)
            .map(|(_, n)| n.alias.as_str())
            .collect();
        assert_eq!(aliases, vec!["designTasks", "codeTasks"]);
    }

    #[test]
    fn test_partition_embed_is_rejected() {
        let cache = SchemaCache::builder()
            .table(table("cars", TableKind::PartitionedTable))
            .table(table("cars_2021", TableKind::Partition))
            .table(table("brands", TableKind::Table))
            .foreign_key(fk("cars_brand_id_fkey", "cars", &["brand_id"], "brands", &["id"]))
            .foreign_key(fk("cars_2021_brand_id_fkey", "cars_2021", &["brand_id"], "brands", &["id"]))
            .build();
        // Embedding the root partitioned table works.
        let ok = resolve(&cache, "public", "brands", parse_select("name,cars(name)").unwrap());
        assert!(ok.is_ok());
        // Embedding a specific partition finds no relationship.
        let err = resolve(
            &cache,
            "public",
            "brands",
            parse_select("name,cars_2021(name)").unwrap(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoRelationship);
        // Embedding from a partition finds no relationship either.
        let err = resolve(
            &cache,
            "public",
            "cars_2021",
            parse_select("name,brands(name)").unwrap(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoRelationship);
    }
}
