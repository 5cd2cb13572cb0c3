use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::change::SchemaOp;

/// Violations raised when an op cannot be applied to the current shape.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("table `{0}` already exists")]
    DuplicateTable(String),
    #[error("unknown table `{0}`")]
    UnknownTable(String),
    #[error("column `{1}` already exists on `{0}`")]
    DuplicateColumn(String, String),
    #[error("unknown column `{1}` on `{0}`")]
    UnknownColumn(String, String),
    #[error("index `{0}` already exists")]
    DuplicateIndex(String),
    #[error("unknown index `{0}`")]
    UnknownIndex(String),
    #[error("table `{0}` is still referenced by `{1}`")]
    TableInUse(String, String),
    #[error("non-nullable column `{1}` on `{0}` needs a default for existing rows")]
    MissingDefault(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Uuid,
    Text { max: Option<u32> },
    Timestamp,
    Boolean,
}

/// Value backfilled into existing rows when a column is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultValue {
    Text(String),
    Boolean(bool),
    /// Sentinel minimum timestamp for retroactive date columns.
    MinTimestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub name: String,
    pub column: String,
    pub references_table: String,
    pub references_column: String,
    pub cascade_delete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<ColumnDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// In-memory shape of the relational store. Ops apply with full validation,
/// which lets a change list be checked (and round-tripped) without a
/// database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    tables: BTreeMap<String, TableDef>,
    indexes: BTreeMap<String, IndexDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.indexes.is_empty()
    }

    pub fn apply(&mut self, op: &SchemaOp) -> Result<(), SchemaError> {
        match op {
            SchemaOp::CreateTable(def) => self.create_table(def),
            SchemaOp::DropTable { table } => self.drop_table(table),
            SchemaOp::AddColumn { table, column } => self.add_column(table, column),
            SchemaOp::DropColumn { table, column } => self.drop_column(table, column),
            SchemaOp::CreateIndex(def) => self.create_index(def),
            SchemaOp::DropIndex { index } => self.drop_index(index),
        }
    }

    fn create_table(&mut self, def: &TableDef) -> Result<(), SchemaError> {
        if self.tables.contains_key(&def.name) {
            return Err(SchemaError::DuplicateTable(def.name.clone()));
        }
        if def.column(&def.primary_key).is_none() {
            return Err(SchemaError::UnknownColumn(
                def.name.clone(),
                def.primary_key.clone(),
            ));
        }
        for fk in &def.foreign_keys {
            if def.column(&fk.column).is_none() {
                return Err(SchemaError::UnknownColumn(def.name.clone(), fk.column.clone()));
            }
            // Self-references resolve against the table being created.
            let target = if fk.references_table == def.name {
                Some(def)
            } else {
                self.tables.get(&fk.references_table)
            };
            let target = target.ok_or_else(|| SchemaError::UnknownTable(fk.references_table.clone()))?;
            if target.column(&fk.references_column).is_none() {
                return Err(SchemaError::UnknownColumn(
                    fk.references_table.clone(),
                    fk.references_column.clone(),
                ));
            }
        }
        self.tables.insert(def.name.clone(), def.clone());
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> Result<(), SchemaError> {
        if !self.tables.contains_key(table) {
            return Err(SchemaError::UnknownTable(table.to_string()));
        }
        for other in self.tables.values() {
            if other.name != table
                && other.foreign_keys.iter().any(|fk| fk.references_table == table)
            {
                return Err(SchemaError::TableInUse(
                    table.to_string(),
                    other.name.clone(),
                ));
            }
        }
        self.tables.remove(table);
        self.indexes.retain(|_, ix| ix.table != table);
        Ok(())
    }

    fn add_column(&mut self, table: &str, column: &ColumnDef) -> Result<(), SchemaError> {
        let def = self
            .tables
            .get_mut(table)
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))?;
        if def.column(&column.name).is_some() {
            return Err(SchemaError::DuplicateColumn(
                table.to_string(),
                column.name.clone(),
            ));
        }
        // Existing rows must get a value, or the contract cannot hold
        // retroactively.
        if !column.nullable && column.default.is_none() {
            return Err(SchemaError::MissingDefault(
                table.to_string(),
                column.name.clone(),
            ));
        }
        def.columns.push(column.clone());
        Ok(())
    }

    fn drop_column(&mut self, table: &str, column: &str) -> Result<(), SchemaError> {
        let def = self
            .tables
            .get_mut(table)
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))?;
        if def.column(column).is_none() {
            return Err(SchemaError::UnknownColumn(
                table.to_string(),
                column.to_string(),
            ));
        }
        def.columns.retain(|c| c.name != column);
        // Dependent constraints and indexes go with the column, as they do
        // in the store.
        def.foreign_keys.retain(|fk| fk.column != column);
        self.indexes
            .retain(|_, ix| !(ix.table == table && ix.columns.iter().any(|c| c == column)));
        Ok(())
    }

    fn create_index(&mut self, def: &IndexDef) -> Result<(), SchemaError> {
        if self.indexes.contains_key(&def.name) {
            return Err(SchemaError::DuplicateIndex(def.name.clone()));
        }
        let table = self
            .tables
            .get(&def.table)
            .ok_or_else(|| SchemaError::UnknownTable(def.table.clone()))?;
        for column in &def.columns {
            if table.column(column).is_none() {
                return Err(SchemaError::UnknownColumn(def.table.clone(), column.clone()));
            }
        }
        self.indexes.insert(def.name.clone(), def.clone());
        Ok(())
    }

    fn drop_index(&mut self, index: &str) -> Result<(), SchemaError> {
        self.indexes
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| SchemaError::UnknownIndex(index.to_string()))
    }
}
