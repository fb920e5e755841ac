//! Table, column and constraint facts as loaded from the database catalog.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Table,
    View,
    PartitionedTable,
    Partition,
    ForeignTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub has_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub kind: TableKind,
    pub columns: Vec<Column>,
}

impl Table {
    /// `schema.name`, the key used everywhere in the catalog.
    pub fn qualified_name(&self) -> String {
        qualify(&self.schema, &self.name)
    }

    pub fn is_partition(&self) -> bool {
        self.kind == TableKind::Partition
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Primary key or unique constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    /// Primary keys participate in junction detection.
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

pub fn qualify(schema: &str, name: &str) -> String {
    format!("{schema}.{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name() {
        let t = Table {
            schema: "public".into(),
            name: "items".into(),
            kind: TableKind::Table,
            columns: vec![],
        };
        assert_eq!(t.qualified_name(), "public.items");
    }
}
