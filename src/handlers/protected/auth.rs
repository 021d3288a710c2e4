use axum::extract::Extension;
use serde::Serialize;
use uuid::Uuid;

use crate::api::response::{ApiResponse, ApiResult};
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::models::membership::Role;
use crate::models::user::UserProfile;

/// Tenant membership as seen from the user's side
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct MembershipSummary {
    pub tenant_id: Uuid,
    pub slug: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub user: UserProfile,
    pub memberships: Vec<MembershipSummary>,
}

/// GET /api/whoami - requires a JWT but no tenant header, so a fresh login
/// can discover which workspaces it belongs to.
pub async fn whoami(Extension(auth): Extension<AuthUser>) -> ApiResult<WhoamiResponse> {
    let pool = DatabaseManager::pool().await?;

    let user = sqlx::query_as::<_, UserProfile>(
        "SELECT id, email, display_name FROM users WHERE id = $1",
    )
    .bind(auth.user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))?;

    let memberships = sqlx::query_as::<_, MembershipSummary>(
        "SELECT t.id AS tenant_id, t.slug, t.name, tu.role
         FROM tenant_users tu
         JOIN tenants t ON t.id = tu.tenant_id
         WHERE tu.user_id = $1
         ORDER BY t.name",
    )
    .bind(auth.user_id)
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(WhoamiResponse { user, memberships }))
}
