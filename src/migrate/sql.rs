use super::change::SchemaOp;
use super::schema::{ColumnDef, ColumnType, DefaultValue, TableDef};

fn column_type(ty: &ColumnType) -> String {
    match ty {
        ColumnType::Uuid => "uuid".into(),
        ColumnType::Text { max: Some(n) } => format!("varchar({n})"),
        ColumnType::Text { max: None } => "text".into(),
        ColumnType::Timestamp => "timestamptz".into(),
        ColumnType::Boolean => "boolean".into(),
    }
}

fn default_literal(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        DefaultValue::Boolean(true) => "TRUE".into(),
        DefaultValue::Boolean(false) => "FALSE".into(),
        DefaultValue::MinTimestamp => "'0001-01-01 00:00:00+00'".into(),
    }
}

fn column_clause(column: &ColumnDef, primary_key: bool) -> String {
    let mut clause = format!("{} {}", column.name, column_type(&column.ty));
    if primary_key {
        clause.push_str(" PRIMARY KEY");
    } else if !column.nullable {
        clause.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        clause.push_str(" DEFAULT ");
        clause.push_str(&default_literal(default));
    }
    clause
}

fn create_table(def: &TableDef) -> String {
    let mut lines: Vec<String> = def
        .columns
        .iter()
        .map(|c| column_clause(c, c.name == def.primary_key))
        .collect();
    for fk in &def.foreign_keys {
        let mut line = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            fk.name, fk.column, fk.references_table, fk.references_column
        );
        if fk.cascade_delete {
            line.push_str(" ON DELETE CASCADE");
        }
        lines.push(line);
    }
    format!("CREATE TABLE {} (\n    {}\n)", def.name, lines.join(",\n    "))
}

/// Render one op as a single Postgres DDL statement.
pub fn ddl(op: &SchemaOp) -> String {
    match op {
        SchemaOp::CreateTable(def) => create_table(def),
        SchemaOp::DropTable { table } => format!("DROP TABLE {table}"),
        SchemaOp::AddColumn { table, column } => format!(
            "ALTER TABLE {table} ADD COLUMN {}",
            column_clause(column, false)
        ),
        SchemaOp::DropColumn { table, column } => {
            format!("ALTER TABLE {table} DROP COLUMN {column}")
        }
        SchemaOp::CreateIndex(def) => format!(
            "CREATE {}INDEX {} ON {} ({})",
            if def.unique { "UNIQUE " } else { "" },
            def.name,
            def.table,
            def.columns.join(", ")
        ),
        SchemaOp::DropIndex { index } => format!("DROP INDEX {index}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::schema::{ForeignKeyDef, IndexDef};

    #[test]
    fn renders_add_column_with_backfill_default() {
        let op = SchemaOp::AddColumn {
            table: "users".into(),
            column: ColumnDef {
                name: "is_deleted".into(),
                ty: ColumnType::Boolean,
                nullable: false,
                default: Some(DefaultValue::Boolean(false)),
            },
        };
        assert_eq!(
            ddl(&op),
            "ALTER TABLE users ADD COLUMN is_deleted boolean NOT NULL DEFAULT FALSE"
        );
    }

    #[test]
    fn renders_create_table_with_cascading_foreign_key() {
        let op = SchemaOp::CreateTable(TableDef {
            name: "projects".into(),
            primary_key: "id".into(),
            columns: vec![
                ColumnDef {
                    name: "id".into(),
                    ty: ColumnType::Uuid,
                    nullable: false,
                    default: None,
                },
                ColumnDef {
                    name: "user_id".into(),
                    ty: ColumnType::Uuid,
                    nullable: false,
                    default: None,
                },
            ],
            foreign_keys: vec![ForeignKeyDef {
                name: "fk_projects_users".into(),
                column: "user_id".into(),
                references_table: "users".into(),
                references_column: "id".into(),
                cascade_delete: true,
            }],
        });
        let sql = ddl(&op);
        assert!(sql.starts_with("CREATE TABLE projects"));
        assert!(sql.contains("id uuid PRIMARY KEY"));
        assert!(sql.contains(
            "CONSTRAINT fk_projects_users FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE"
        ));
    }

    #[test]
    fn renders_unique_index_and_min_timestamp_default() {
        let index = SchemaOp::CreateIndex(IndexDef {
            name: "ix_users_username".into(),
            table: "users".into(),
            columns: vec!["username".into()],
            unique: true,
        });
        assert_eq!(
            ddl(&index),
            "CREATE UNIQUE INDEX ix_users_username ON users (username)"
        );

        let op = SchemaOp::AddColumn {
            table: "users".into(),
            column: ColumnDef {
                name: "updated_at".into(),
                ty: ColumnType::Timestamp,
                nullable: false,
                default: Some(DefaultValue::MinTimestamp),
            },
        };
        assert_eq!(
            ddl(&op),
            "ALTER TABLE users ADD COLUMN updated_at timestamptz NOT NULL DEFAULT '0001-01-01 00:00:00+00'"
        );
    }
}
