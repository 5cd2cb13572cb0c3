use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::error::AuditError;

/// Sentinel written into `created_at`/`updated_at` when audit columns are
/// backfilled onto rows that predate them.
pub fn min_timestamp() -> OffsetDateTime {
    time::macros::datetime!(0001-01-01 0:00 UTC)
}

/// Provenance carried by every persisted business entity.
///
/// `created_by`/`created_at` are written exactly once, at creation.
/// `updated_by`/`updated_at` are rewritten on every mutating write.
/// `is_deleted` is toggled only by a delete operation; default reads skip
/// rows where it is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Audit {
    pub created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub updated_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub is_deleted: bool,
}

/// Capability exposed by any entity that carries audit provenance.
///
/// This is the only requirement the stamp interceptors place on an entity;
/// they know nothing about entity-specific fields.
pub trait Tracked {
    fn audit(&self) -> &Audit;
    fn audit_mut(&mut self) -> &mut Audit;
}

fn ensure_actor(actor: &str) -> Result<(), AuditError> {
    if actor.trim().is_empty() {
        return Err(AuditError::Validation("actor identity is required".into()));
    }
    Ok(())
}

/// Stamp a freshly created entity. Applied at every insert call site.
pub fn stamp_create<E: Tracked>(
    entity: &mut E,
    actor: &str,
    now: OffsetDateTime,
) -> Result<(), AuditError> {
    ensure_actor(actor)?;
    *entity.audit_mut() = Audit {
        created_by: actor.to_string(),
        created_at: now,
        updated_by: actor.to_string(),
        updated_at: now,
        is_deleted: false,
    };
    Ok(())
}

/// Stamp a plain update against the audit state currently stored.
///
/// Rejects any attempt to rewrite creation provenance, and restores the
/// stored soft-delete flag: a plain update never toggles it.
pub fn stamp_update<E: Tracked>(
    entity: &mut E,
    stored: &Audit,
    actor: &str,
    now: OffsetDateTime,
) -> Result<(), AuditError> {
    ensure_actor(actor)?;
    if entity.audit().created_by != stored.created_by {
        return Err(AuditError::ImmutableField("created_by"));
    }
    if entity.audit().created_at != stored.created_at {
        return Err(AuditError::ImmutableField("created_at"));
    }
    let audit = entity.audit_mut();
    audit.is_deleted = stored.is_deleted;
    audit.updated_by = actor.to_string();
    audit.updated_at = now;
    Ok(())
}

/// Stamp a soft delete. Idempotent: deleting an already-deleted entity is a
/// no-op apart from `updated_by`/`updated_at` reflecting the latest actor.
pub fn stamp_delete<E: Tracked>(
    entity: &mut E,
    actor: &str,
    now: OffsetDateTime,
) -> Result<(), AuditError> {
    ensure_actor(actor)?;
    let audit = entity.audit_mut();
    audit.is_deleted = true;
    audit.updated_by = actor.to_string();
    audit.updated_at = now;
    Ok(())
}
