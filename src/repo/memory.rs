use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entity::{
    min_timestamp, stamp_create, stamp_delete, stamp_update, Audit, NewProject, NewUser, Project,
    User,
};
use crate::error::RepoError;

use super::{ProjectRepo, UserRepo};

/// In-memory store backing tests and in-process composition.
///
/// Writes serialize on the table locks, so concurrent updates to the same
/// entity commit in some order and the audit fields attribute the winner.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    projects: RwLock<HashMap<Uuid, Project>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn blank_audit() -> Audit {
    Audit {
        created_by: String::new(),
        created_at: min_timestamp(),
        updated_by: String::new(),
        updated_at: min_timestamp(),
        is_deleted: false,
    }
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn insert(
        &self,
        new: NewUser,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<User, RepoError> {
        let mut users = self.users.write().expect("users lock");
        // The unique index covers soft-deleted rows too.
        if users.values().any(|u| u.username == new.username) {
            return Err(RepoError::Conflict(format!(
                "username `{}` is already taken",
                new.username
            )));
        }
        let mut user = User {
            id: Uuid::new_v4(),
            username: new.username,
            password_hash: new.password_hash,
            last_login_at: None,
            audit: blank_audit(),
        };
        stamp_create(&mut user, actor, now)?;
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<User>, RepoError> {
        let users = self.users.read().expect("users lock");
        Ok(users
            .get(&id)
            .filter(|u| include_deleted || !u.audit.is_deleted)
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let users = self.users.read().expect("users lock");
        Ok(users
            .values()
            .find(|u| u.username == username && !u.audit.is_deleted)
            .cloned())
    }

    async fn record_login(&self, id: Uuid, now: OffsetDateTime) -> Result<User, RepoError> {
        let mut users = self.users.write().expect("users lock");
        let stored = users.get(&id).ok_or(RepoError::NotFound)?.clone();
        let mut user = stored.clone();
        user.last_login_at = Some(now);
        let actor = stored.username.clone();
        stamp_update(&mut user, &stored.audit, &actor, now)?;
        users.insert(id, user.clone());
        Ok(user)
    }

    async fn soft_delete(
        &self,
        id: Uuid,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let mut users = self.users.write().expect("users lock");
        let user = users.get_mut(&id).ok_or(RepoError::NotFound)?;
        stamp_delete(user, actor, now)?;
        Ok(())
    }

    async fn purge(&self, id: Uuid) -> Result<(), RepoError> {
        let mut users = self.users.write().expect("users lock");
        users.remove(&id).ok_or(RepoError::NotFound)?;
        // Cascade, as the projects table's foreign key would.
        let mut projects = self.projects.write().expect("projects lock");
        projects.retain(|_, p| p.user_id != id);
        Ok(())
    }
}

#[async_trait]
impl ProjectRepo for MemoryStore {
    async fn insert(
        &self,
        new: NewProject,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<Project, RepoError> {
        {
            let users = self.users.read().expect("users lock");
            if !users.contains_key(&new.user_id) {
                return Err(RepoError::NotFound);
            }
        }
        let mut project = Project {
            id: Uuid::new_v4(),
            name: new.name,
            user_id: new.user_id,
            audit: blank_audit(),
        };
        stamp_create(&mut project, actor, now)?;
        let mut projects = self.projects.write().expect("projects lock");
        projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Project>, RepoError> {
        let projects = self.projects.read().expect("projects lock");
        Ok(projects
            .get(&id)
            .filter(|p| include_deleted || !p.audit.is_deleted)
            .cloned())
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<Project>, RepoError> {
        let projects = self.projects.read().expect("projects lock");
        let mut rows: Vec<Project> = projects
            .values()
            .filter(|p| p.user_id == user_id && (include_deleted || !p.audit.is_deleted))
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.audit.created_at);
        Ok(rows)
    }

    async fn update(
        &self,
        mut project: Project,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<Project, RepoError> {
        let mut projects = self.projects.write().expect("projects lock");
        let stored = projects.get(&project.id).ok_or(RepoError::NotFound)?;
        stamp_update(&mut project, &stored.audit, actor, now)?;
        projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn soft_delete(
        &self,
        id: Uuid,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let mut projects = self.projects.write().expect("projects lock");
        let project = projects.get_mut(&id).ok_or(RepoError::NotFound)?;
        stamp_delete(project, actor, now)?;
        Ok(())
    }
}
