//! Repository seam over the relational store.
//!
//! The storage engine itself is opaque to the rest of the crate; everything
//! reaches rows through these traits. [`memory::MemoryStore`] is the
//! reference implementation, [`pg`] the Postgres one.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entity::{NewProject, NewUser, Project, User};
use crate::error::RepoError;

pub mod memory;
pub mod pg;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert a new user, stamping creation provenance with `actor`.
    async fn insert(
        &self,
        new: NewUser,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<User, RepoError>;

    /// Fetch by id. Soft-deleted rows are only visible when
    /// `include_deleted` is set.
    async fn find_by_id(&self, id: Uuid, include_deleted: bool)
        -> Result<Option<User>, RepoError>;

    /// Authentication lookup: active users only.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError>;

    /// Record a successful login, moving `last_login_at` through the
    /// tracked update path with the user as their own actor.
    async fn record_login(&self, id: Uuid, now: OffsetDateTime) -> Result<User, RepoError>;

    /// Soft-delete. Idempotent; a repeat only refreshes update provenance.
    async fn soft_delete(
        &self,
        id: Uuid,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<(), RepoError>;

    /// Physically remove a user. Owned projects go with them.
    async fn purge(&self, id: Uuid) -> Result<(), RepoError>;
}

#[async_trait]
pub trait ProjectRepo: Send + Sync {
    async fn insert(
        &self,
        new: NewProject,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<Project, RepoError>;

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Project>, RepoError>;

    async fn list_by_user(
        &self,
        user_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<Project>, RepoError>;

    /// Persist a modified project. The stored audit state is the baseline:
    /// creation provenance must match it and the soft-delete flag cannot be
    /// toggled here.
    async fn update(
        &self,
        project: Project,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<Project, RepoError>;

    async fn soft_delete(
        &self,
        id: Uuid,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<(), RepoError>;
}
