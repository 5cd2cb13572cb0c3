use serde::{Deserialize, Serialize};

use super::schema::{ColumnDef, IndexDef, TableDef};

/// A single reversible unit of schema work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaOp {
    CreateTable(TableDef),
    DropTable { table: String },
    AddColumn { table: String, column: ColumnDef },
    DropColumn { table: String, column: String },
    CreateIndex(IndexDef),
    DropIndex { index: String },
}

/// A named, ordered schema change: a forward transform and its exact
/// inverse. Names sort lexicographically (timestamp prefix), which is the
/// application order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChange {
    pub name: String,
    pub up: Vec<SchemaOp>,
    pub down: Vec<SchemaOp>,
}

impl SchemaChange {
    pub fn new(name: impl Into<String>, up: Vec<SchemaOp>, down: Vec<SchemaOp>) -> Self {
        Self {
            name: name.into(),
            up,
            down,
        }
    }
}
