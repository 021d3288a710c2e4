use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::pagination::ListParams;
use crate::api::response::{ApiResponse, ApiResult, ListResponse, ListResult};
use crate::config;
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::handlers::public::auth::generate_invitation_token;
use crate::middleware::TenantContext;
use crate::models::invitation::{Invitation, InvitationStatus};
use crate::models::membership::Role;
use crate::permissions::Permission;

const SORT_COLUMNS: &[&str] = &["email", "role", "status", "expires_at", "created_at"];

#[derive(Debug, Deserialize)]
pub struct InvitationFilter {
    pub status: Option<InvitationStatus>,
}

/// GET /api/invitations
pub async fn list(
    Extension(ctx): Extension<TenantContext>,
    Query(page): Query<ListParams>,
    Query(filter): Query<InvitationFilter>,
) -> ListResult<Invitation> {
    ctx.require(Permission::ManageInvitations)?;

    let pool = DatabaseManager::pool().await?;
    let order = page.order_clause(SORT_COLUMNS, "created_at")?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM invitations
         WHERE tenant_id = $1 AND ($2::invitation_status IS NULL OR status = $2)",
    )
    .bind(ctx.tenant_id())
    .bind(filter.status)
    .fetch_one(&pool)
    .await?;

    let sql = format!(
        "SELECT * FROM invitations
         WHERE tenant_id = $1 AND ($2::invitation_status IS NULL OR status = $2)
         {} LIMIT $3 OFFSET $4",
        order
    );
    let invitations = sqlx::query_as::<_, Invitation>(&sql)
        .bind(ctx.tenant_id())
        .bind(filter.status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&pool)
        .await?;

    Ok(ListResponse::new(invitations, total))
}

#[derive(Debug, Deserialize)]
pub struct InvitationInput {
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct CreatedInvitation {
    #[serde(flatten)]
    pub invitation: Invitation,
    /// Cleartext one-time token, returned only here
    pub token: String,
}

/// POST /api/invitations
pub async fn create(
    Extension(ctx): Extension<TenantContext>,
    Json(input): Json<InvitationInput>,
) -> ApiResult<CreatedInvitation> {
    ctx.require(Permission::ManageInvitations)?;

    let email = input.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("A valid email address is required"));
    }
    if input.role == Role::Owner {
        return Err(ApiError::bad_request("Ownership cannot be granted by invitation"));
    }

    let pool = DatabaseManager::pool().await?;

    let already_member: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tenant_users tu
         JOIN users u ON u.id = tu.user_id
         WHERE tu.tenant_id = $1 AND u.email = $2",
    )
    .bind(ctx.tenant_id())
    .bind(&email)
    .fetch_one(&pool)
    .await?;
    if already_member > 0 {
        return Err(ApiError::conflict("That user is already a member of this workspace"));
    }

    let pending: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM invitations
         WHERE tenant_id = $1 AND email = $2 AND status = 'pending' AND expires_at > now()",
    )
    .bind(ctx.tenant_id())
    .bind(&email)
    .fetch_one(&pool)
    .await?;
    if pending > 0 {
        return Err(ApiError::conflict("A pending invitation for that email already exists"));
    }

    let token = generate_invitation_token();
    let expires_at =
        Utc::now() + Duration::hours(config::config().security.invitation_expiry_hours as i64);

    let invitation = sqlx::query_as::<_, Invitation>(
        "INSERT INTO invitations (tenant_id, email, role, token_hash, expires_at, invited_by)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(&email)
    .bind(input.role)
    .bind(Invitation::hash_token(&token))
    .bind(expires_at)
    .bind(ctx.user_id())
    .fetch_one(&pool)
    .await?;

    tracing::info!("Invitation created for {} as {:?}", email, input.role);

    Ok(ApiResponse::created(CreatedInvitation { invitation, token }))
}

/// GET /api/invitations/:id
pub async fn get(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Invitation> {
    ctx.require(Permission::ManageInvitations)?;

    let pool = DatabaseManager::pool().await?;
    let invitation = fetch_invitation(&pool, ctx.tenant_id(), id).await?;
    Ok(ApiResponse::success(invitation))
}

/// POST /api/invitations/:id/revoke - pending only
pub async fn revoke(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Invitation> {
    ctx.require(Permission::ManageInvitations)?;

    let pool = DatabaseManager::pool().await?;
    let invitation = fetch_invitation(&pool, ctx.tenant_id(), id).await?;

    if invitation.status != InvitationStatus::Pending {
        return Err(ApiError::conflict("Only pending invitations can be revoked"));
    }

    let invitation = sqlx::query_as::<_, Invitation>(
        "UPDATE invitations SET status = $3, updated_at = now()
         WHERE tenant_id = $1 AND id = $2 RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .bind(InvitationStatus::Revoked)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::success(invitation))
}

async fn fetch_invitation(
    pool: &sqlx::PgPool,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Invitation, ApiError> {
    sqlx::query_as::<_, Invitation>(
        "SELECT * FROM invitations WHERE tenant_id = $1 AND id = $2",
    )
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Invitation not found"))
}
