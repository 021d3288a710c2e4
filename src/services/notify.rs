//! Notification fan-out for domain events. A disabled preference row
//! suppresses the insert; absence of a row means enabled.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::membership::Role;

/// Insert a notification for one user unless they opted out of the kind
pub async fn notify_user(
    pool: &PgPool,
    tenant_id: Uuid,
    user_id: Uuid,
    kind: &str,
    payload: Value,
) -> Result<(), sqlx::Error> {
    let enabled: Option<bool> = sqlx::query_scalar(
        "SELECT enabled FROM notification_preferences
         WHERE tenant_id = $1 AND user_id = $2 AND kind = $3",
    )
    .bind(tenant_id)
    .bind(user_id)
    .bind(kind)
    .fetch_optional(pool)
    .await?;

    if enabled == Some(false) {
        tracing::debug!("Notification '{}' suppressed for user {}", kind, user_id);
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO notifications (tenant_id, user_id, kind, payload)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(tenant_id)
    .bind(user_id)
    .bind(kind)
    .bind(payload)
    .execute(pool)
    .await?;

    Ok(())
}

/// Notify every member of the tenant holding at least the given role
pub async fn notify_role(
    pool: &PgPool,
    tenant_id: Uuid,
    minimum_role: Role,
    kind: &str,
    payload: Value,
) -> Result<(), sqlx::Error> {
    // Role filtering happens in Rust so the role ordering in the permission
    // map stays the single source of truth.
    let members = sqlx::query_as::<_, crate::models::membership::Membership>(
        "SELECT * FROM tenant_users WHERE tenant_id = $1",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    for member in members {
        if member.role.at_least(minimum_role) {
            notify_user(pool, tenant_id, member.user_id, kind, payload.clone()).await?;
        }
    }

    Ok(())
}
