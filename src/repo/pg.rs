use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entity::{
    min_timestamp, stamp_create, stamp_delete, stamp_update, Audit, NewProject, NewUser, Project,
    User,
};
use crate::error::RepoError;

use super::{ProjectRepo, UserRepo};

const USER_COLUMNS: &str = "id, username, password_hash, last_login_at, \
     created_by, created_at, updated_by, updated_at, is_deleted";
const PROJECT_COLUMNS: &str =
    "id, name, user_id, created_by, created_at, updated_by, updated_at, is_deleted";

/// Postgres-backed store. Tracked updates lock the row so concurrent writes
/// to the same entity serialize and the audit fields name the winner.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepo for PgStore {
    async fn insert(
        &self,
        new: NewUser,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<User, RepoError> {
        let mut user = User {
            id: Uuid::new_v4(),
            username: new.username,
            password_hash: new.password_hash,
            last_login_at: None,
            audit: Audit {
                created_by: String::new(),
                created_at: min_timestamp(),
                updated_by: String::new(),
                updated_at: min_timestamp(),
                is_deleted: false,
            },
        };
        stamp_create(&mut user, actor, now)?;

        sqlx::query(
            r#"
            INSERT INTO users
                (id, username, password_hash, last_login_at,
                 created_by, created_at, updated_by, updated_at, is_deleted)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.last_login_at)
        .bind(&user.audit.created_by)
        .bind(user.audit.created_at)
        .bind(&user.audit.updated_by)
        .bind(user.audit.updated_at)
        .bind(user.audit.is_deleted)
        .execute(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND (NOT is_deleted OR $2)"
        ))
        .bind(id)
        .bind(include_deleted)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND NOT is_deleted"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn record_login(&self, id: Uuid, now: OffsetDateTime) -> Result<User, RepoError> {
        let mut tx = self.pool.begin().await?;
        let stored = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepoError::NotFound)?;

        let mut user = stored.clone();
        user.last_login_at = Some(now);
        let actor = stored.username.clone();
        stamp_update(&mut user, &stored.audit, &actor, now)?;

        sqlx::query(
            "UPDATE users SET last_login_at = $2, updated_by = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(user.id)
        .bind(user.last_login_at)
        .bind(&user.audit.updated_by)
        .bind(user.audit.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn soft_delete(
        &self,
        id: Uuid,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let mut tx = self.pool.begin().await?;
        let mut user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepoError::NotFound)?;

        stamp_delete(&mut user, actor, now)?;
        sqlx::query(
            "UPDATE users SET is_deleted = TRUE, updated_by = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.audit.updated_by)
        .bind(user.audit.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn purge(&self, id: Uuid) -> Result<(), RepoError> {
        // The projects foreign key cascades.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectRepo for PgStore {
    async fn insert(
        &self,
        new: NewProject,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<Project, RepoError> {
        let mut project = Project {
            id: Uuid::new_v4(),
            name: new.name,
            user_id: new.user_id,
            audit: Audit {
                created_by: String::new(),
                created_at: min_timestamp(),
                updated_by: String::new(),
                updated_at: min_timestamp(),
                is_deleted: false,
            },
        };
        stamp_create(&mut project, actor, now)?;

        sqlx::query(
            r#"
            INSERT INTO projects
                (id, name, user_id,
                 created_by, created_at, updated_by, updated_at, is_deleted)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(project.id)
        .bind(&project.name)
        .bind(project.user_id)
        .bind(&project.audit.created_by)
        .bind(project.audit.created_at)
        .bind(&project.audit.updated_by)
        .bind(project.audit.updated_at)
        .bind(project.audit.is_deleted)
        .execute(&self.pool)
        .await?;
        Ok(project)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Project>, RepoError> {
        let project = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 AND (NOT is_deleted OR $2)"
        ))
        .bind(id)
        .bind(include_deleted)
        .fetch_optional(&self.pool)
        .await?;
        Ok(project)
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<Project>, RepoError> {
        let rows = sqlx::query_as::<_, Project>(&format!(
            r#"
            SELECT {PROJECT_COLUMNS} FROM projects
            WHERE user_id = $1 AND (NOT is_deleted OR $2)
            ORDER BY created_at
            "#
        ))
        .bind(user_id)
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update(
        &self,
        mut project: Project,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<Project, RepoError> {
        let mut tx = self.pool.begin().await?;
        let stored = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 FOR UPDATE"
        ))
        .bind(project.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepoError::NotFound)?;

        stamp_update(&mut project, &stored.audit, actor, now)?;

        sqlx::query(
            r#"
            UPDATE projects
            SET name = $2, user_id = $3, updated_by = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(project.id)
        .bind(&project.name)
        .bind(project.user_id)
        .bind(&project.audit.updated_by)
        .bind(project.audit.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(project)
    }

    async fn soft_delete(
        &self,
        id: Uuid,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let mut tx = self.pool.begin().await?;
        let mut project = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepoError::NotFound)?;

        stamp_delete(&mut project, actor, now)?;
        sqlx::query(
            "UPDATE projects SET is_deleted = TRUE, updated_by = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(project.id)
        .bind(&project.audit.updated_by)
        .bind(project.audit.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
