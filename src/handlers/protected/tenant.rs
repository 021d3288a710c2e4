use axum::{
    extract::{Extension, Path},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::response::{ApiResponse, ApiResult};
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::TenantContext;
use crate::models::membership::Role;
use crate::models::tenant::Tenant;
use crate::permissions::Permission;

/// GET /api/tenant - the current workspace
pub async fn get(Extension(ctx): Extension<TenantContext>) -> ApiResult<Tenant> {
    Ok(ApiResponse::success(ctx.tenant.clone()))
}

#[derive(Debug, Deserialize)]
pub struct TenantUpdate {
    pub name: String,
    pub currency: Option<String>,
    pub tax_percent: Option<Decimal>,
    pub discount_percent: Option<Decimal>,
}

/// PUT /api/tenant - workspace settings, including default billing percentages
pub async fn update(
    Extension(ctx): Extension<TenantContext>,
    Json(input): Json<TenantUpdate>,
) -> ApiResult<Tenant> {
    ctx.require(Permission::ManageTenant)?;

    let name = input.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Workspace name cannot be empty"));
    }
    for (label, value) in [
        ("tax_percent", input.tax_percent),
        ("discount_percent", input.discount_percent),
    ] {
        if let Some(pct) = value {
            if pct < Decimal::ZERO || pct > Decimal::from(100) {
                return Err(ApiError::bad_request(format!(
                    "{} must be between 0 and 100",
                    label
                )));
            }
        }
    }

    let pool = DatabaseManager::pool().await?;
    let tenant = sqlx::query_as::<_, Tenant>(
        "UPDATE tenants
         SET name = $2,
             currency = COALESCE($3, currency),
             tax_percent = COALESCE($4, tax_percent),
             discount_percent = COALESCE($5, discount_percent),
             updated_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(name)
    .bind(&input.currency)
    .bind(input.tax_percent)
    .bind(input.discount_percent)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::success(tenant))
}

/// Membership enriched with the user's profile for member listings
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct MemberRow {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub position_id: Option<Uuid>,
    pub pay_rate: Option<Decimal>,
}

/// GET /api/tenant/members
pub async fn list_members(
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<Vec<MemberRow>> {
    let pool = DatabaseManager::pool().await?;
    let members = sqlx::query_as::<_, MemberRow>(
        "SELECT tu.user_id, u.email, u.display_name, tu.role, tu.position_id, tu.pay_rate
         FROM tenant_users tu
         JOIN users u ON u.id = tu.user_id
         WHERE tu.tenant_id = $1
         ORDER BY u.display_name",
    )
    .bind(ctx.tenant_id())
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(members))
}

#[derive(Debug, Deserialize)]
pub struct MemberUpdate {
    pub role: Role,
    pub position_id: Option<Uuid>,
    pub pay_rate: Option<Decimal>,
}

/// PUT /api/tenant/members/:user_id
pub async fn update_member(
    Extension(ctx): Extension<TenantContext>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<MemberUpdate>,
) -> ApiResult<MemberRow> {
    ctx.require(Permission::ManageMembers)?;

    let pool = DatabaseManager::pool().await?;
    let current_role = member_role(&pool, ctx.tenant_id(), user_id).await?;

    // A workspace always keeps at least one owner
    if current_role == Role::Owner && input.role != Role::Owner {
        ensure_not_last_owner(&pool, ctx.tenant_id()).await?;
    }
    if input.role == Role::Owner && !ctx.member.role.at_least(Role::Owner) {
        return Err(ApiError::forbidden("Only an owner can grant ownership"));
    }

    sqlx::query(
        "UPDATE tenant_users
         SET role = $3, position_id = $4, pay_rate = $5, updated_at = now()
         WHERE tenant_id = $1 AND user_id = $2",
    )
    .bind(ctx.tenant_id())
    .bind(user_id)
    .bind(input.role)
    .bind(input.position_id)
    .bind(input.pay_rate)
    .execute(&pool)
    .await?;

    let member = sqlx::query_as::<_, MemberRow>(
        "SELECT tu.user_id, u.email, u.display_name, tu.role, tu.position_id, tu.pay_rate
         FROM tenant_users tu
         JOIN users u ON u.id = tu.user_id
         WHERE tu.tenant_id = $1 AND tu.user_id = $2",
    )
    .bind(ctx.tenant_id())
    .bind(user_id)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::success(member))
}

/// DELETE /api/tenant/members/:user_id
pub async fn remove_member(
    Extension(ctx): Extension<TenantContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<()> {
    ctx.require(Permission::ManageMembers)?;

    let pool = DatabaseManager::pool().await?;
    let role = member_role(&pool, ctx.tenant_id(), user_id).await?;

    if role == Role::Owner {
        ensure_not_last_owner(&pool, ctx.tenant_id()).await?;
    }
    if user_id == ctx.user_id() && role == Role::Owner {
        return Err(ApiError::conflict("Transfer ownership before leaving the workspace"));
    }

    sqlx::query("DELETE FROM tenant_users WHERE tenant_id = $1 AND user_id = $2")
        .bind(ctx.tenant_id())
        .bind(user_id)
        .execute(&pool)
        .await?;

    Ok(ApiResponse::<()>::no_content())
}

async fn member_role(
    pool: &sqlx::PgPool,
    tenant_id: Uuid,
    user_id: Uuid,
) -> Result<Role, ApiError> {
    sqlx::query_scalar::<_, Role>(
        "SELECT role FROM tenant_users WHERE tenant_id = $1 AND user_id = $2",
    )
    .bind(tenant_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Member not found"))
}

async fn ensure_not_last_owner(pool: &sqlx::PgPool, tenant_id: Uuid) -> Result<(), ApiError> {
    let owners: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tenant_users WHERE tenant_id = $1 AND role = 'owner'",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await?;

    if owners <= 1 {
        return Err(ApiError::conflict("A workspace must keep at least one owner"));
    }
    Ok(())
}
