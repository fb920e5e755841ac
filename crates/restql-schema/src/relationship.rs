//! Relationship edges derived from foreign-key facts.
//!
//! Every foreign key yields a many-to-one edge and its one-to-many mirror;
//! when the referencing columns are themselves unique, both directions
//! collapse to one-to-one. A table whose primary key is covered by exactly
//! two foreign keys is treated as a junction and yields many-to-many edges
//! between the two referenced tables.
//!
//! Foreign keys from or to partitions are skipped entirely: only the root
//! partitioned table owns relationships, which is what makes embedding a
//! specific partition fail with "no relationship found".

use crate::types::{ForeignKey, Table, UniqueConstraint};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    OneToMany,
    ManyToOne,
    OneToOne,
    ManyToMany,
}

impl Cardinality {
    /// Whether the related side is at most one row.
    pub fn to_one(&self) -> bool {
        matches!(self, Cardinality::ManyToOne | Cardinality::OneToOne)
    }
}

/// Join-table leg of a many-to-many edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Junction {
    pub table: String,
    /// Junction columns referencing the near side.
    pub columns: Vec<String>,
    /// Junction columns referencing the far side.
    pub related_columns: Vec<String>,
}

/// A directed edge of the relationship graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub cardinality: Cardinality,
    pub table: String,
    pub columns: Vec<String>,
    pub related_table: String,
    pub related_columns: Vec<String>,
    pub junction: Option<Junction>,
    /// Constraint name, usable as an embedding hint.
    pub constraint: String,
}

/// Derive the full edge set from table and constraint facts.
pub fn derive(
    tables: &HashMap<String, Table>,
    uniques: &[UniqueConstraint],
    foreign_keys: &[ForeignKey],
) -> HashMap<String, Vec<Relationship>> {
    let mut edges: HashMap<String, Vec<Relationship>> = HashMap::new();
    let is_partition = |name: &str| tables.get(name).is_some_and(Table::is_partition);

    let mut fks_by_table: HashMap<&str, Vec<&ForeignKey>> = HashMap::new();
    for fk in foreign_keys {
        if is_partition(&fk.table) || is_partition(&fk.referenced_table) {
            continue;
        }
        fks_by_table.entry(fk.table.as_str()).or_default().push(fk);
    }

    for (&table, fks) in &fks_by_table {
        for fk in fks {
            add_fk_edges(&mut edges, fk, uniques);
        }
        // Junction: the primary key covers exactly two foreign keys.
        if fks.len() == 2
            && let Some(pk) = uniques.iter().find(|u| u.primary && u.table == table)
            && fks
                .iter()
                .all(|fk| fk.columns.iter().all(|c| pk.columns.contains(c)))
        {
            add_m2m_edges(&mut edges, fks[0], fks[1]);
            add_m2m_edges(&mut edges, fks[1], fks[0]);
        }
    }
    edges
}

fn add_fk_edges(
    edges: &mut HashMap<String, Vec<Relationship>>,
    fk: &ForeignKey,
    uniques: &[UniqueConstraint],
) {
    let unique_source = uniques
        .iter()
        .any(|u| u.table == fk.table && u.columns == fk.columns);
    let (near, far) = if unique_source {
        (Cardinality::OneToOne, Cardinality::OneToOne)
    } else {
        (Cardinality::ManyToOne, Cardinality::OneToMany)
    };
    edges.entry(fk.table.clone()).or_default().push(Relationship {
        cardinality: near,
        table: fk.table.clone(),
        columns: fk.columns.clone(),
        related_table: fk.referenced_table.clone(),
        related_columns: fk.referenced_columns.clone(),
        junction: None,
        constraint: fk.name.clone(),
    });
    edges
        .entry(fk.referenced_table.clone())
        .or_default()
        .push(Relationship {
            cardinality: far,
            table: fk.referenced_table.clone(),
            columns: fk.referenced_columns.clone(),
            related_table: fk.table.clone(),
            related_columns: fk.columns.clone(),
            junction: None,
            constraint: fk.name.clone(),
        });
}

fn add_m2m_edges(edges: &mut HashMap<String, Vec<Relationship>>, near: &ForeignKey, far: &ForeignKey) {
    edges
        .entry(near.referenced_table.clone())
        .or_default()
        .push(Relationship {
            cardinality: Cardinality::ManyToMany,
            table: near.referenced_table.clone(),
            columns: near.referenced_columns.clone(),
            related_table: far.referenced_table.clone(),
            related_columns: far.referenced_columns.clone(),
            junction: Some(Junction {
                table: near.table.clone(),
                columns: near.columns.clone(),
                related_columns: far.columns.clone(),
            }),
            constraint: near.name.clone(),
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TableKind;

    fn table(name: &str, kind: TableKind) -> (String, Table) {
        (
            format!("public.{name}"),
            Table {
                schema: "public".into(),
                name: name.into(),
                kind,
                columns: vec![],
            },
        )
    }

    fn fk(name: &str, table: &str, cols: &[&str], rtable: &str, rcols: &[&str]) -> ForeignKey {
        ForeignKey {
            name: name.into(),
            table: format!("public.{table}"),
            columns: cols.iter().map(|s| s.to_string()).collect(),
            referenced_table: format!("public.{rtable}"),
            referenced_columns: rcols.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_fk_yields_both_directions() {
        let tables: HashMap<_, _> = [
            table("projects", TableKind::Table),
            table("tasks", TableKind::Table),
        ]
        .into();
        let fks = [fk("tasks_project_id_fkey", "tasks", &["project_id"], "projects", &["id"])];
        let edges = derive(&tables, &[], &fks);

        let from_tasks = &edges["public.tasks"];
        assert_eq!(from_tasks.len(), 1);
        assert_eq!(from_tasks[0].cardinality, Cardinality::ManyToOne);
        assert_eq!(from_tasks[0].related_table, "public.projects");

        let from_projects = &edges["public.projects"];
        assert_eq!(from_projects[0].cardinality, Cardinality::OneToMany);
    }

    #[test]
    fn test_unique_source_is_one_to_one() {
        let tables: HashMap<_, _> = [
            table("users", TableKind::Table),
            table("profiles", TableKind::Table),
        ]
        .into();
        let fks = [fk("profiles_user_id_fkey", "profiles", &["user_id"], "users", &["id"])];
        let uniques = [UniqueConstraint {
            name: "profiles_user_id_key".into(),
            table: "public.profiles".into(),
            columns: vec!["user_id".into()],
            primary: false,
        }];
        let edges = derive(&tables, &uniques, &fks);
        assert_eq!(edges["public.profiles"][0].cardinality, Cardinality::OneToOne);
        assert_eq!(edges["public.users"][0].cardinality, Cardinality::OneToOne);
    }

    #[test]
    fn test_junction_yields_many_to_many() {
        let tables: HashMap<_, _> = [
            table("users", TableKind::Table),
            table("tasks", TableKind::Table),
            table("users_tasks", TableKind::Table),
        ]
        .into();
        let fks = [
            fk("users_tasks_user_id_fkey", "users_tasks", &["user_id"], "users", &["id"]),
            fk("users_tasks_task_id_fkey", "users_tasks", &["task_id"], "tasks", &["id"]),
        ];
        let uniques = [UniqueConstraint {
            name: "users_tasks_pkey".into(),
            table: "public.users_tasks".into(),
            columns: vec!["user_id".into(), "task_id".into()],
            primary: true,
        }];
        let edges = derive(&tables, &uniques, &fks);
        let m2m: Vec<_> = edges["public.users"]
            .iter()
            .filter(|r| r.cardinality == Cardinality::ManyToMany)
            .collect();
        assert_eq!(m2m.len(), 1);
        assert_eq!(m2m[0].related_table, "public.tasks");
        let junction = m2m[0].junction.as_ref().unwrap();
        assert_eq!(junction.table, "public.users_tasks");
        assert_eq!(junction.columns, vec!["user_id".to_string()]);
        assert_eq!(junction.related_columns, vec!["task_id".to_string()]);
    }

    #[test]
    fn test_partition_foreign_keys_are_skipped() {
        let tables: HashMap<_, _> = [
            table("cars", TableKind::PartitionedTable),
            table("cars_2021", TableKind::Partition),
            table("brands", TableKind::Table),
        ]
        .into();
        let fks = [
            fk("cars_brand_id_fkey", "cars", &["brand_id"], "brands", &["id"]),
            fk("cars_2021_brand_id_fkey", "cars_2021", &["brand_id"], "brands", &["id"]),
        ];
        let edges = derive(&tables, &[], &fks);
        assert!(edges.contains_key("public.cars"));
        assert!(!edges.contains_key("public.cars_2021"));
        // brands only sees the root partitioned table
        assert_eq!(edges["public.brands"].len(), 1);
        assert_eq!(edges["public.brands"][0].related_table, "public.cars");
    }
}
