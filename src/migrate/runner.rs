use tracing::info;

use crate::error::MigrateError;

use super::change::SchemaChange;
use super::schema::Schema;

/// Ordered record of applied change names. Append-only under `apply`;
/// entries only leave through an explicit revert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    applied: Vec<String>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries (oldest first).
    pub fn from_applied<I: IntoIterator<Item = String>>(names: I) -> Self {
        Self {
            applied: names.into_iter().collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.applied.iter().any(|n| n == name)
    }

    pub fn applied(&self) -> &[String] {
        &self.applied
    }

    pub fn last(&self) -> Option<&str> {
        self.applied.last().map(String::as_str)
    }

    fn record(&mut self, name: &str) {
        self.applied.push(name.to_string());
    }

    fn retire_last(&mut self) -> Option<String> {
        self.applied.pop()
    }
}

/// Applies and reverts an ordered change list against a [`Schema`], gated
/// by a [`Ledger`]. Not part of the request path: a migrator runs once,
/// ahead of serving.
pub struct Migrator {
    changes: Vec<SchemaChange>,
}

impl Migrator {
    pub fn new(mut changes: Vec<SchemaChange>) -> Self {
        changes.sort_by(|a, b| a.name.cmp(&b.name));
        Self { changes }
    }

    pub fn changes(&self) -> &[SchemaChange] {
        &self.changes
    }

    /// Apply every unapplied change in name order. Each change is
    /// failure-atomic: on an op failure the schema keeps its prior shape,
    /// the ledger is untouched and no later change is attempted. Re-running
    /// a fully applied list is a no-op.
    pub fn apply_all(&self, schema: &mut Schema, ledger: &mut Ledger) -> Result<usize, MigrateError> {
        let mut count = 0;
        for change in &self.changes {
            if ledger.contains(&change.name) {
                continue;
            }
            let mut trial = schema.clone();
            for op in &change.up {
                trial.apply(op).map_err(|e| MigrateError::Migration {
                    change: change.name.clone(),
                    reason: e.to_string(),
                })?;
            }
            *schema = trial;
            ledger.record(&change.name);
            info!(change = %change.name, "schema change applied");
            count += 1;
        }
        Ok(count)
    }

    /// Revert applied changes tail-first, down to and including `name`.
    /// Asking for a change the ledger never saw is [`MigrateError::NotApplied`].
    pub fn revert(
        &self,
        schema: &mut Schema,
        ledger: &mut Ledger,
        name: &str,
    ) -> Result<(), MigrateError> {
        if !ledger.contains(name) {
            return Err(MigrateError::NotApplied {
                change: name.to_string(),
            });
        }
        while let Some(last) = ledger.last().map(str::to_string) {
            self.revert_last(schema, ledger)?;
            if last == name {
                break;
            }
        }
        Ok(())
    }

    /// Revert everything the ledger records, newest first.
    pub fn revert_all(&self, schema: &mut Schema, ledger: &mut Ledger) -> Result<usize, MigrateError> {
        let mut count = 0;
        while ledger.last().is_some() {
            self.revert_last(schema, ledger)?;
            count += 1;
        }
        Ok(count)
    }

    fn revert_last(&self, schema: &mut Schema, ledger: &mut Ledger) -> Result<(), MigrateError> {
        let name = match ledger.last() {
            Some(n) => n.to_string(),
            None => return Ok(()),
        };
        let change = self
            .changes
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| MigrateError::Migration {
                change: name.clone(),
                reason: "applied change is missing from the change list".into(),
            })?;
        let mut trial = schema.clone();
        for op in &change.down {
            trial.apply(op).map_err(|e| MigrateError::Migration {
                change: change.name.clone(),
                reason: format!("revert failed: {e}"),
            })?;
        }
        *schema = trial;
        ledger.retire_last();
        info!(change = %change.name, "schema change reverted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::schema::{ColumnDef, ColumnType, DefaultValue, TableDef};
    use crate::migrate::SchemaOp;

    fn column(name: &str, ty: ColumnType) -> ColumnDef {
        ColumnDef {
            name: name.into(),
            ty,
            nullable: false,
            default: None,
        }
    }

    fn notes_table() -> SchemaChange {
        SchemaChange::new(
            "001_notes",
            vec![SchemaOp::CreateTable(TableDef {
                name: "notes".into(),
                primary_key: "id".into(),
                columns: vec![column("id", ColumnType::Uuid)],
                foreign_keys: vec![],
            })],
            vec![SchemaOp::DropTable {
                table: "notes".into(),
            }],
        )
    }

    fn notes_body() -> SchemaChange {
        SchemaChange::new(
            "002_notes_body",
            vec![SchemaOp::AddColumn {
                table: "notes".into(),
                column: ColumnDef {
                    name: "body".into(),
                    ty: ColumnType::Text { max: None },
                    nullable: false,
                    default: Some(DefaultValue::Text(String::new())),
                },
            }],
            vec![SchemaOp::DropColumn {
                table: "notes".into(),
                column: "body".into(),
            }],
        )
    }

    fn broken_change() -> SchemaChange {
        // References a table that never existed.
        SchemaChange::new(
            "003_broken",
            vec![SchemaOp::AddColumn {
                table: "ghosts".into(),
                column: column("boo", ColumnType::Boolean),
            }],
            vec![],
        )
    }

    #[test]
    fn apply_then_full_revert_restores_the_original_shape() {
        let migrator = Migrator::new(vec![notes_body(), notes_table()]);
        let mut schema = Schema::new();
        let mut ledger = Ledger::new();

        let applied = migrator.apply_all(&mut schema, &mut ledger).expect("apply");
        assert_eq!(applied, 2);
        assert!(schema.table("notes").expect("notes").column("body").is_some());

        migrator
            .revert_all(&mut schema, &mut ledger)
            .expect("revert");
        assert!(schema.is_empty());
        assert!(ledger.applied().is_empty());
    }

    #[test]
    fn rerunning_an_applied_list_is_a_noop() {
        let migrator = Migrator::new(vec![notes_table(), notes_body()]);
        let mut schema = Schema::new();
        let mut ledger = Ledger::new();

        migrator.apply_all(&mut schema, &mut ledger).expect("apply");
        let before = schema.clone();
        let applied = migrator
            .apply_all(&mut schema, &mut ledger)
            .expect("reapply");
        assert_eq!(applied, 0);
        assert_eq!(schema, before);
    }

    #[test]
    fn a_failing_change_halts_without_partial_application() {
        // Name order puts the broken change between two good ones.
        let late_change = SchemaChange::new(
            "004_late",
            vec![SchemaOp::AddColumn {
                table: "notes".into(),
                column: ColumnDef {
                    name: "late".into(),
                    ty: ColumnType::Boolean,
                    nullable: false,
                    default: Some(DefaultValue::Boolean(false)),
                },
            }],
            vec![SchemaOp::DropColumn {
                table: "notes".into(),
                column: "late".into(),
            }],
        );
        let migrator = Migrator::new(vec![
            notes_table(),
            notes_body(),
            broken_change(),
            late_change,
        ]);
        let mut schema = Schema::new();
        let mut ledger = Ledger::new();

        let err = migrator.apply_all(&mut schema, &mut ledger).unwrap_err();
        match err {
            MigrateError::Migration { change, .. } => assert_eq!(change, "003_broken"),
            other => panic!("unexpected error: {other}"),
        }
        // The two good earlier changes committed; nothing after the failure
        // was attempted.
        assert_eq!(ledger.applied(), ["001_notes", "002_notes_body"]);
        assert!(schema.table("notes").expect("notes").column("late").is_none());
    }

    #[test]
    fn a_failing_op_leaves_the_change_fully_unapplied() {
        // First op succeeds, second fails: the change must not half-apply.
        let half = SchemaChange::new(
            "002_half",
            vec![
                SchemaOp::AddColumn {
                    table: "notes".into(),
                    column: ColumnDef {
                        name: "kept".into(),
                        ty: ColumnType::Boolean,
                        nullable: true,
                        default: None,
                    },
                },
                SchemaOp::DropColumn {
                    table: "notes".into(),
                    column: "missing".into(),
                },
            ],
            vec![],
        );
        let migrator = Migrator::new(vec![notes_table(), half]);
        let mut schema = Schema::new();
        let mut ledger = Ledger::new();

        migrator.apply_all(&mut schema, &mut ledger).unwrap_err();
        assert!(schema.table("notes").expect("notes").column("kept").is_none());
        assert_eq!(ledger.applied(), ["001_notes"]);
    }

    #[test]
    fn reverting_an_unapplied_change_fails() {
        let migrator = Migrator::new(vec![notes_table(), notes_body()]);
        let mut schema = Schema::new();
        let mut ledger = Ledger::new();

        let err = migrator
            .revert(&mut schema, &mut ledger, "002_notes_body")
            .unwrap_err();
        assert!(matches!(err, MigrateError::NotApplied { .. }));
    }

    #[test]
    fn revert_walks_tail_first_down_to_the_named_change() {
        let migrator = Migrator::new(vec![notes_table(), notes_body()]);
        let mut schema = Schema::new();
        let mut ledger = Ledger::new();
        migrator.apply_all(&mut schema, &mut ledger).expect("apply");

        migrator
            .revert(&mut schema, &mut ledger, "002_notes_body")
            .expect("revert");
        assert!(schema.table("notes").expect("notes").column("body").is_none());
        assert_eq!(ledger.applied(), ["001_notes"]);
    }
}
