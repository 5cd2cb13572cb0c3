use thiserror::Error;

/// Failures raised by the audit stamp interceptors.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A mutating write arrived without a usable actor identity.
    #[error("audit validation failed: {0}")]
    Validation(String),

    /// A write attempted to change creation provenance after the fact.
    #[error("attempted to modify immutable audit field `{0}`")]
    ImmutableField(&'static str),
}

/// Failures raised by the repository layer.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Uniqueness violated (duplicate username).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The addressed entity does not exist (or is soft-deleted and the
    /// caller did not ask for deleted rows).
    #[error("entity not found")]
    NotFound,

    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Opaque storage failure.
    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db)
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                RepoError::Conflict(db.message().to_string())
            }
            _ => RepoError::Storage(err.into()),
        }
    }
}

/// Failures raised by the credential gateway.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user or wrong password; callers cannot tell which.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Registration rejected: username fails shape or length rules.
    #[error("invalid username")]
    InvalidUsername,

    /// Registration rejected: password below the minimum length.
    #[error("password too short")]
    WeakPassword,

    #[error(transparent)]
    Repo(#[from] RepoError),

    /// Hashing or token signing failed; never raised for a merely invalid
    /// token.
    #[error("internal auth failure: {0}")]
    Internal(anyhow::Error),
}

/// Failures raised by the schema migrator.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// A forward transform failed. Fatal: nothing later is attempted and
    /// the failed change is not recorded as applied.
    #[error("schema change `{change}` failed: {reason}")]
    Migration { change: String, reason: String },

    /// A revert was requested for a change the ledger never recorded.
    #[error("schema change `{change}` has not been applied")]
    NotApplied { change: String },

    /// The ledger or lock could not be reached at all.
    #[error("migration storage error: {0}")]
    Storage(anyhow::Error),
}

/// Failures raised by the client session state machine.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A login was issued while another attempt is still in flight.
    #[error("an authentication attempt is already in flight")]
    LoginInFlight,
}
