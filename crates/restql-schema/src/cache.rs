//! Immutable catalog snapshot and its atomic publication handle.
//!
//! A [`SchemaCache`] is built once from schema facts and never mutated.
//! [`SchemaCacheHandle`] publishes a new snapshot with a single atomic
//! pointer swap, so unlimited concurrent readers keep whatever snapshot
//! they loaded until they finish their request.

use crate::functions::Function;
use crate::relationship::{self, Relationship};
use crate::types::{ForeignKey, Table, UniqueConstraint};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
pub struct SchemaCache {
    tables: HashMap<String, Table>,
    relationships: HashMap<String, Vec<Relationship>>,
    /// Primary key columns per table, used as the default conflict target.
    primary_keys: HashMap<String, Vec<String>>,
    /// Overloads grouped by qualified name, in registration order.
    functions: HashMap<String, Vec<Function>>,
}

impl SchemaCache {
    pub fn builder() -> SchemaCacheBuilder {
        SchemaCacheBuilder::default()
    }

    pub fn table(&self, qualified: &str) -> Option<&Table> {
        self.tables.get(qualified)
    }

    pub fn relationships_of(&self, qualified: &str) -> &[Relationship] {
        self.relationships
            .get(qualified)
            .map_or(&[], Vec::as_slice)
    }

    /// All edges from `table` to `related`, in derivation order.
    pub fn relationships_between(&self, table: &str, related: &str) -> Vec<&Relationship> {
        self.relationships_of(table)
            .iter()
            .filter(|rel| rel.related_table == related)
            .collect()
    }

    pub fn primary_key(&self, qualified: &str) -> Option<&[String]> {
        self.primary_keys.get(qualified).map(Vec::as_slice)
    }

    pub fn functions_named(&self, qualified: &str) -> &[Function] {
        self.functions.get(qualified).map_or(&[], Vec::as_slice)
    }

    /// Known names, used for "did you mean" hints.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

/// Assembles a snapshot from schema facts.
#[derive(Debug, Default)]
pub struct SchemaCacheBuilder {
    tables: Vec<Table>,
    uniques: Vec<UniqueConstraint>,
    foreign_keys: Vec<ForeignKey>,
    functions: Vec<Function>,
}

impl SchemaCacheBuilder {
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn unique(mut self, constraint: UniqueConstraint) -> Self {
        self.uniques.push(constraint);
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    pub fn build(self) -> SchemaCache {
        let tables: HashMap<String, Table> = self
            .tables
            .into_iter()
            .map(|t| (t.qualified_name(), t))
            .collect();
        let relationships = relationship::derive(&tables, &self.uniques, &self.foreign_keys);
        let primary_keys = self
            .uniques
            .iter()
            .filter(|u| u.primary)
            .map(|u| (u.table.clone(), u.columns.clone()))
            .collect();
        let mut functions: HashMap<String, Vec<Function>> = HashMap::new();
        for f in self.functions {
            functions.entry(f.qualified_name()).or_default().push(f);
        }
        debug!(
            tables = tables.len(),
            functions = functions.len(),
            "schema cache built"
        );
        SchemaCache {
            tables,
            relationships,
            primary_keys,
            functions,
        }
    }
}

/// Shared handle over the current snapshot.
#[derive(Debug)]
pub struct SchemaCacheHandle {
    current: ArcSwap<SchemaCache>,
}

impl SchemaCacheHandle {
    pub fn new(cache: SchemaCache) -> Self {
        Self {
            current: ArcSwap::from_pointee(cache),
        }
    }

    /// Load the current snapshot; the Arc stays valid across a reload.
    pub fn load(&self) -> Arc<SchemaCache> {
        self.current.load_full()
    }

    /// Publish a new snapshot atomically.
    pub fn store(&self, cache: SchemaCache) {
        debug!("schema cache reloaded");
        self.current.store(Arc::new(cache));
    }
}
