//! The application's schema evolution log.

use super::change::{SchemaChange, SchemaOp};
use super::schema::{ColumnDef, ColumnType, DefaultValue, ForeignKeyDef, IndexDef, TableDef};

fn not_null(name: &str, ty: ColumnType) -> ColumnDef {
    ColumnDef {
        name: name.into(),
        ty,
        nullable: false,
        default: None,
    }
}

fn backfilled(name: &str, ty: ColumnType, default: DefaultValue) -> ColumnDef {
    ColumnDef {
        name: name.into(),
        ty,
        nullable: false,
        default: Some(default),
    }
}

fn users() -> SchemaChange {
    SchemaChange::new(
        "20200225114508_users",
        vec![
            SchemaOp::CreateTable(TableDef {
                name: "users".into(),
                primary_key: "id".into(),
                columns: vec![
                    not_null("id", ColumnType::Uuid),
                    not_null("username", ColumnType::Text { max: Some(800) }),
                    not_null("password_hash", ColumnType::Text { max: None }),
                ],
                foreign_keys: vec![],
            }),
            SchemaOp::CreateIndex(IndexDef {
                name: "ix_users_username".into(),
                table: "users".into(),
                columns: vec!["username".into()],
                unique: true,
            }),
        ],
        vec![SchemaOp::DropTable {
            table: "users".into(),
        }],
    )
}

fn user_dates() -> SchemaChange {
    SchemaChange::new(
        "20200226101542_user_dates",
        vec![
            SchemaOp::AddColumn {
                table: "users".into(),
                column: backfilled("created_at", ColumnType::Timestamp, DefaultValue::MinTimestamp),
            },
            SchemaOp::AddColumn {
                table: "users".into(),
                column: ColumnDef {
                    name: "last_login_at".into(),
                    ty: ColumnType::Timestamp,
                    nullable: true,
                    default: None,
                },
            },
        ],
        vec![
            SchemaOp::DropColumn {
                table: "users".into(),
                column: "last_login_at".into(),
            },
            SchemaOp::DropColumn {
                table: "users".into(),
                column: "created_at".into(),
            },
        ],
    )
}

fn projects() -> SchemaChange {
    SchemaChange::new(
        "20200226143027_projects",
        vec![
            SchemaOp::CreateTable(TableDef {
                name: "projects".into(),
                primary_key: "id".into(),
                columns: vec![
                    not_null("id", ColumnType::Uuid),
                    not_null("name", ColumnType::Text { max: None }),
                    not_null("user_id", ColumnType::Uuid),
                    not_null("created_by", ColumnType::Text { max: None }),
                    not_null("created_at", ColumnType::Timestamp),
                    not_null("updated_by", ColumnType::Text { max: None }),
                    not_null("updated_at", ColumnType::Timestamp),
                ],
                foreign_keys: vec![ForeignKeyDef {
                    name: "fk_projects_users".into(),
                    column: "user_id".into(),
                    references_table: "users".into(),
                    references_column: "id".into(),
                    cascade_delete: true,
                }],
            }),
            SchemaOp::CreateIndex(IndexDef {
                name: "ix_projects_user_id".into(),
                table: "projects".into(),
                columns: vec!["user_id".into()],
                unique: false,
            }),
        ],
        vec![SchemaOp::DropTable {
            table: "projects".into(),
        }],
    )
}

/// Backfills the audit contract onto tables that predate it. Existing rows
/// get explicit defaults so the contract holds retroactively.
fn tracked_columns() -> SchemaChange {
    SchemaChange::new(
        "20200302090316_tracked_columns",
        vec![
            SchemaOp::AddColumn {
                table: "users".into(),
                column: backfilled(
                    "created_by",
                    ColumnType::Text { max: None },
                    DefaultValue::Text(String::new()),
                ),
            },
            SchemaOp::AddColumn {
                table: "users".into(),
                column: backfilled("is_deleted", ColumnType::Boolean, DefaultValue::Boolean(false)),
            },
            SchemaOp::AddColumn {
                table: "users".into(),
                column: backfilled("updated_at", ColumnType::Timestamp, DefaultValue::MinTimestamp),
            },
            SchemaOp::AddColumn {
                table: "users".into(),
                column: backfilled(
                    "updated_by",
                    ColumnType::Text { max: None },
                    DefaultValue::Text(String::new()),
                ),
            },
            SchemaOp::AddColumn {
                table: "projects".into(),
                column: backfilled("is_deleted", ColumnType::Boolean, DefaultValue::Boolean(false)),
            },
        ],
        vec![
            SchemaOp::DropColumn {
                table: "projects".into(),
                column: "is_deleted".into(),
            },
            SchemaOp::DropColumn {
                table: "users".into(),
                column: "updated_by".into(),
            },
            SchemaOp::DropColumn {
                table: "users".into(),
                column: "updated_at".into(),
            },
            SchemaOp::DropColumn {
                table: "users".into(),
                column: "is_deleted".into(),
            },
            SchemaOp::DropColumn {
                table: "users".into(),
                column: "created_by".into(),
            },
        ],
    )
}

/// Every change this application has shipped, oldest first.
pub fn changes() -> Vec<SchemaChange> {
    vec![users(), user_dates(), projects(), tracked_columns()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::{Ledger, Migrator, Schema};

    #[test]
    fn catalog_applies_cleanly_to_an_empty_store() {
        let migrator = Migrator::new(changes());
        let mut schema = Schema::new();
        let mut ledger = Ledger::new();

        let applied = migrator.apply_all(&mut schema, &mut ledger).expect("apply");
        assert_eq!(applied, 4);

        let users = schema.table("users").expect("users table");
        for column in [
            "id",
            "username",
            "password_hash",
            "created_at",
            "last_login_at",
            "created_by",
            "updated_by",
            "updated_at",
            "is_deleted",
        ] {
            assert!(users.column(column).is_some(), "missing users.{column}");
        }
        assert!(schema.index("ix_users_username").expect("index").unique);

        let projects = schema.table("projects").expect("projects table");
        assert!(projects.column("is_deleted").is_some());
        assert!(projects.foreign_keys[0].cascade_delete);
    }

    #[test]
    fn audit_backfill_carries_explicit_defaults() {
        let migrator = Migrator::new(changes());
        let mut schema = Schema::new();
        let mut ledger = Ledger::new();
        migrator.apply_all(&mut schema, &mut ledger).expect("apply");

        let users = schema.table("users").expect("users table");
        assert_eq!(
            users.column("created_by").expect("created_by").default,
            Some(DefaultValue::Text(String::new()))
        );
        assert_eq!(
            users.column("is_deleted").expect("is_deleted").default,
            Some(DefaultValue::Boolean(false))
        );
        assert_eq!(
            users.column("updated_at").expect("updated_at").default,
            Some(DefaultValue::MinTimestamp)
        );
    }

    #[test]
    fn catalog_round_trips_to_an_empty_store() {
        let migrator = Migrator::new(changes());
        let mut schema = Schema::new();
        let mut ledger = Ledger::new();

        migrator.apply_all(&mut schema, &mut ledger).expect("apply");
        migrator
            .revert_all(&mut schema, &mut ledger)
            .expect("revert");
        assert!(schema.is_empty());
    }

    #[test]
    fn catalog_reapply_is_a_noop() {
        let migrator = Migrator::new(changes());
        let mut schema = Schema::new();
        let mut ledger = Ledger::new();

        migrator.apply_all(&mut schema, &mut ledger).expect("apply");
        assert_eq!(
            migrator
                .apply_all(&mut schema, &mut ledger)
                .expect("reapply"),
            0
        );
    }

    #[test]
    fn change_names_are_unique_and_ordered() {
        let list = changes();
        let mut names: Vec<&str> = list.iter().map(|c| c.name.as_str()).collect();
        let original = names.clone();
        names.sort();
        names.dedup();
        assert_eq!(names, original);
    }
}
