//! Reversible, ledgered schema evolution.
//!
//! A [`SchemaChange`] is an explicit `{name, up, down}` record; the
//! [`Migrator`] applies unapplied changes in name order against a typed
//! [`Schema`] model, and [`pg::PgMigrator`] runs the same change list as
//! DDL against Postgres under an advisory lock. Applied names live in an
//! append-only ledger so reruns are no-ops.

mod catalog;
mod change;
mod runner;
mod schema;
mod sql;

pub mod pg;

pub use catalog::changes;
pub use change::{SchemaChange, SchemaOp};
pub use runner::{Ledger, Migrator};
pub use schema::{
    ColumnDef, ColumnType, DefaultValue, ForeignKeyDef, IndexDef, Schema, SchemaError, TableDef,
};
pub use sql::ddl;
