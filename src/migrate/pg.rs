use sqlx::{PgPool, Postgres, Transaction};
use tracing::{error, info};

use crate::error::MigrateError;

use super::change::SchemaChange;
use super::sql::ddl;

// Session-independent key for the migrator's advisory lock.
const ADVISORY_LOCK_KEY: i64 = 0x666f_6375_7374_7261;

fn storage_err(err: sqlx::Error) -> MigrateError {
    MigrateError::Storage(err.into())
}

/// Runs a change list against Postgres.
///
/// Each change executes in its own transaction under an advisory lock, with
/// the ledger re-checked inside the lock: concurrent migrator runs serialize
/// and the loser sees the change already recorded and skips it. A failed
/// change rolls back whole and nothing later is attempted.
pub struct PgMigrator {
    pool: PgPool,
}

impl PgMigrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock(&self, tx: &mut Transaction<'_, Postgres>) -> Result<(), MigrateError> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(ADVISORY_LOCK_KEY)
            .execute(&mut **tx)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn ensure_ledger(&self) -> Result<(), MigrateError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_changes (
                name text PRIMARY KEY,
                applied_at timestamptz NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    /// Apply every unapplied change in name order. Fatal on the first
    /// failure: the caller must not serve traffic after an error here.
    pub async fn apply_all(&self, changes: &[SchemaChange]) -> Result<usize, MigrateError> {
        self.ensure_ledger().await?;
        let mut ordered: Vec<&SchemaChange> = changes.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        let mut count = 0;
        for change in ordered {
            let mut tx = self.pool.begin().await.map_err(storage_err)?;
            self.lock(&mut tx).await?;

            let applied: Option<String> =
                sqlx::query_scalar("SELECT name FROM schema_changes WHERE name = $1")
                    .bind(&change.name)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(storage_err)?;
            if applied.is_some() {
                continue;
            }

            for op in &change.up {
                let statement = ddl(op);
                if let Err(e) = sqlx::query(&statement).execute(&mut *tx).await {
                    error!(change = %change.name, error = %e, "schema change failed; aborting");
                    return Err(MigrateError::Migration {
                        change: change.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
            sqlx::query("INSERT INTO schema_changes (name) VALUES ($1)")
                .bind(&change.name)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
            tx.commit().await.map_err(storage_err)?;
            info!(change = %change.name, "schema change applied");
            count += 1;
        }
        Ok(count)
    }

    /// Revert applied changes tail-first, down to and including `name`.
    pub async fn revert(&self, changes: &[SchemaChange], name: &str) -> Result<(), MigrateError> {
        self.ensure_ledger().await?;
        let applied: Vec<String> =
            sqlx::query_scalar("SELECT name FROM schema_changes ORDER BY name DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(storage_err)?;
        if !applied.iter().any(|n| n == name) {
            return Err(MigrateError::NotApplied {
                change: name.to_string(),
            });
        }

        for applied_name in applied {
            let change = changes
                .iter()
                .find(|c| c.name == applied_name)
                .ok_or_else(|| MigrateError::Migration {
                    change: applied_name.clone(),
                    reason: "applied change is missing from the change list".into(),
                })?;

            let mut tx = self.pool.begin().await.map_err(storage_err)?;
            self.lock(&mut tx).await?;
            // Someone else may have reverted it while we waited on the lock.
            let still_applied = sqlx::query("DELETE FROM schema_changes WHERE name = $1")
                .bind(&change.name)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?
                .rows_affected()
                > 0;
            if still_applied {
                for op in &change.down {
                    let statement = ddl(op);
                    if let Err(e) = sqlx::query(&statement).execute(&mut *tx).await {
                        error!(change = %change.name, error = %e, "revert failed; aborting");
                        return Err(MigrateError::Migration {
                            change: change.name.clone(),
                            reason: format!("revert failed: {e}"),
                        });
                    }
                }
                tx.commit().await.map_err(storage_err)?;
                info!(change = %change.name, "schema change reverted");
            }
            if applied_name == name {
                break;
            }
        }
        Ok(())
    }
}
