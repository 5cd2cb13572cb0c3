use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::token::{JwtKeys, SessionToken};
use crate::entity::{NewUser, User};
use crate::error::AuthError;
use crate::repo::UserRepo;
use crate::session::AuthApi;

// Column bound inherited from the schema.
const MAX_USERNAME_LEN: usize = 800;
const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap();
    }
    username.len() <= MAX_USERNAME_LEN && USERNAME_RE.is_match(username)
}

/// Verifies credentials against stored accounts and issues, validates and
/// revokes session tokens.
pub struct CredentialGateway<R> {
    repo: Arc<R>,
    keys: Arc<JwtKeys>,
    revoked: Arc<RwLock<HashSet<Uuid>>>,
}

impl<R> Clone for CredentialGateway<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            keys: Arc::clone(&self.keys),
            revoked: Arc::clone(&self.revoked),
        }
    }
}

impl<R: UserRepo> CredentialGateway<R> {
    pub fn new(repo: Arc<R>, keys: JwtKeys) -> Self {
        Self {
            repo,
            keys: Arc::new(keys),
            revoked: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Create an account. The new user is their own creating actor.
    #[instrument(skip_all, fields(username = %username))]
    pub async fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        if !is_valid_username(username) {
            warn!("rejected username");
            return Err(AuthError::InvalidUsername);
        }
        if password.len() < MIN_PASSWORD_LEN {
            warn!("password too short");
            return Err(AuthError::WeakPassword);
        }
        let hash = hash_password(password).map_err(AuthError::Internal)?;
        let user = self
            .repo
            .insert(
                NewUser {
                    username: username.to_string(),
                    password_hash: hash,
                },
                username,
                OffsetDateTime::now_utc(),
            )
            .await?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Exchange a username/password pair for a session token.
    ///
    /// Unknown usernames, soft-deleted accounts and wrong passwords all
    /// surface as the same [`AuthError::InvalidCredentials`].
    #[instrument(skip_all, fields(username = %username))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<SessionToken, AuthError> {
        let user = match self.repo.find_by_username(username).await? {
            Some(u) => u,
            None => {
                warn!("login for unknown or deleted username");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let ok = verify_password(password, &user.password_hash).map_err(AuthError::Internal)?;
        if !ok {
            warn!(user_id = %user.id, "login password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let user = self
            .repo
            .record_login(user.id, OffsetDateTime::now_utc())
            .await?;
        let token = self
            .keys
            .sign(user.id, &user.username)
            .map_err(AuthError::Internal)?;
        info!(user_id = %user.id, "user authenticated");
        Ok(token)
    }

    /// Check a token without mutating anything; returns the username it was
    /// issued to, or `None` for anything expired, forged or revoked.
    pub fn validate(&self, token: &str) -> Option<String> {
        let claims = self.keys.verify(token).ok()?;
        if self.revoked.read().expect("revocation lock").contains(&claims.jti) {
            debug!(jti = %claims.jti, "rejected revoked token");
            return None;
        }
        Some(claims.name)
    }

    /// Best-effort server-side revocation. Tokens that no longer verify are
    /// ignored; there is nothing left to revoke.
    pub fn invalidate(&self, token: &str) {
        if let Ok(claims) = self.keys.verify(token) {
            self.revoked
                .write()
                .expect("revocation lock")
                .insert(claims.jti);
            debug!(jti = %claims.jti, "session revoked");
        }
    }
}

// The gateway doubles as the transport the session machine talks through,
// so in-process composition and tests need no HTTP layer.
#[async_trait]
impl<R: UserRepo> AuthApi for CredentialGateway<R> {
    async fn authenticate(&self, username: &str, password: &str) -> Result<SessionToken, AuthError> {
        CredentialGateway::authenticate(self, username, password).await
    }

    async fn invalidate(&self, token: &str) -> Result<(), AuthError> {
        CredentialGateway::invalidate(self, token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::repo::memory::MemoryStore;

    fn make_gateway() -> CredentialGateway<MemoryStore> {
        let keys = JwtKeys::new(&JwtConfig {
            secret: "dev-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 5,
        });
        CredentialGateway::new(Arc::new(MemoryStore::new()), keys)
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let gateway = make_gateway();
        let user = gateway
            .register("alice", "correct-password")
            .await
            .expect("register");
        assert_eq!(user.audit.created_by, "alice");

        let token = gateway
            .authenticate("alice", "correct-password")
            .await
            .expect("authenticate");
        assert_eq!(token.username, "alice");
        assert_eq!(gateway.validate(&token.token), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn authenticate_updates_last_login() {
        let gateway = make_gateway();
        let user = gateway
            .register("alice", "correct-password")
            .await
            .expect("register");
        assert!(user.last_login_at.is_none());

        gateway
            .authenticate("alice", "correct-password")
            .await
            .expect("authenticate");
        let user = gateway
            .repo
            .find_by_id(user.id, false)
            .await
            .expect("find")
            .expect("present");
        assert!(user.last_login_at.is_some());
        assert_eq!(user.audit.updated_by, "alice");
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_are_indistinguishable() {
        let gateway = make_gateway();
        gateway
            .register("alice", "correct-password")
            .await
            .expect("register");

        let unknown = gateway
            .authenticate("nobody", "correct-password")
            .await
            .unwrap_err();
        let mismatch = gateway
            .authenticate("alice", "wrong-password")
            .await
            .unwrap_err();
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(mismatch, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), mismatch.to_string());
    }

    #[tokio::test]
    async fn soft_deleted_users_cannot_authenticate() {
        let gateway = make_gateway();
        let user = gateway
            .register("alice", "correct-password")
            .await
            .expect("register");
        gateway
            .repo
            .soft_delete(user.id, "admin", OffsetDateTime::now_utc())
            .await
            .expect("soft delete");

        let err = gateway
            .authenticate("alice", "correct-password")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn invalidate_revokes_a_valid_token() {
        let gateway = make_gateway();
        gateway
            .register("alice", "correct-password")
            .await
            .expect("register");
        let token = gateway
            .authenticate("alice", "correct-password")
            .await
            .expect("authenticate");

        assert!(gateway.validate(&token.token).is_some());
        CredentialGateway::invalidate(&gateway, &token.token);
        assert!(gateway.validate(&token.token).is_none());

        // Revoking garbage is a no-op, not an error.
        CredentialGateway::invalidate(&gateway, "not-a-token");
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let gateway = make_gateway();
        gateway
            .register("alice", "correct-password")
            .await
            .expect("register");
        let err = gateway
            .register("alice", "another-password")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Repo(crate::error::RepoError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn register_validates_inputs() {
        let gateway = make_gateway();
        assert!(matches!(
            gateway.register("", "correct-password").await.unwrap_err(),
            AuthError::InvalidUsername
        ));
        assert!(matches!(
            gateway
                .register("space name", "correct-password")
                .await
                .unwrap_err(),
            AuthError::InvalidUsername
        ));
        assert!(matches!(
            gateway.register("alice", "short").await.unwrap_err(),
            AuthError::WeakPassword
        ));
    }
}
