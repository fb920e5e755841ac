//! Relationship catalog for the restql query compiler.
//!
//! The catalog is an immutable snapshot of the schema facts the compiler
//! needs: tables and their columns, relationship edges derived from foreign
//! keys, and function signatures for RPC. Population from the database
//! catalog happens elsewhere; this crate only models the facts and derives
//! edges from them.
//!
//! Snapshots are published atomically through [`SchemaCacheHandle`], so a
//! schema reload never leaves an in-flight request looking at a half-updated
//! catalog.

pub mod cache;
pub mod functions;
pub mod relationship;
pub mod types;

pub use cache::{SchemaCache, SchemaCacheBuilder, SchemaCacheHandle};
pub use functions::{ArgMode, Function, FunctionArg, ResultKind, Volatility};
pub use relationship::{Cardinality, Junction, Relationship};
pub use types::{Column, ForeignKey, Table, TableKind, UniqueConstraint};
