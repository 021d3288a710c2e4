use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::pagination::ListParams;
use crate::api::response::{ApiResponse, ApiResult, ListResponse, ListResult};
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::TenantContext;
use crate::models::position::Position;
use crate::permissions::Permission;

const SORT_COLUMNS: &[&str] = &["title", "default_pay_rate", "created_at"];

/// GET /api/positions
pub async fn list(
    Extension(ctx): Extension<TenantContext>,
    Query(params): Query<ListParams>,
) -> ListResult<Position> {
    let pool = DatabaseManager::pool().await?;
    let order = params.order_clause(SORT_COLUMNS, "title")?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM positions WHERE tenant_id = $1")
        .bind(ctx.tenant_id())
        .fetch_one(&pool)
        .await?;

    let sql = format!("SELECT * FROM positions WHERE tenant_id = $1 {} LIMIT $2 OFFSET $3", order);
    let positions = sqlx::query_as::<_, Position>(&sql)
        .bind(ctx.tenant_id())
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&pool)
        .await?;

    Ok(ListResponse::new(positions, total))
}

#[derive(Debug, Deserialize)]
pub struct PositionInput {
    pub title: String,
    pub default_pay_rate: Decimal,
}

/// POST /api/positions
pub async fn create(
    Extension(ctx): Extension<TenantContext>,
    Json(input): Json<PositionInput>,
) -> ApiResult<Position> {
    ctx.require(Permission::ManagePositions)?;

    if input.title.trim().is_empty() {
        return Err(ApiError::bad_request("Position title is required"));
    }
    if input.default_pay_rate < Decimal::ZERO {
        return Err(ApiError::bad_request("Pay rate cannot be negative"));
    }

    let pool = DatabaseManager::pool().await?;
    let position = sqlx::query_as::<_, Position>(
        "INSERT INTO positions (tenant_id, title, default_pay_rate)
         VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(input.title.trim())
    .bind(input.default_pay_rate)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::created(position))
}

/// GET /api/positions/:id
pub async fn get(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Position> {
    let pool = DatabaseManager::pool().await?;
    let position =
        sqlx::query_as::<_, Position>("SELECT * FROM positions WHERE tenant_id = $1 AND id = $2")
            .bind(ctx.tenant_id())
            .bind(id)
            .fetch_optional(&pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Position not found"))?;

    Ok(ApiResponse::success(position))
}

/// PUT /api/positions/:id
pub async fn update(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<PositionInput>,
) -> ApiResult<Position> {
    ctx.require(Permission::ManagePositions)?;

    if input.default_pay_rate < Decimal::ZERO {
        return Err(ApiError::bad_request("Pay rate cannot be negative"));
    }

    let pool = DatabaseManager::pool().await?;
    let position = sqlx::query_as::<_, Position>(
        "UPDATE positions SET title = $3, default_pay_rate = $4, updated_at = now()
         WHERE tenant_id = $1 AND id = $2 RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .bind(input.title.trim())
    .bind(input.default_pay_rate)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Position not found"))?;

    Ok(ApiResponse::success(position))
}

/// DELETE /api/positions/:id
pub async fn delete(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    ctx.require(Permission::ManagePositions)?;

    let pool = DatabaseManager::pool().await?;

    let in_use: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tenant_users WHERE tenant_id = $1 AND position_id = $2")
            .bind(ctx.tenant_id())
            .bind(id)
            .fetch_one(&pool)
            .await?;
    if in_use > 0 {
        return Err(ApiError::conflict("Position is still assigned to members"));
    }

    let result = sqlx::query("DELETE FROM positions WHERE tenant_id = $1 AND id = $2")
        .bind(ctx.tenant_id())
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Position not found"));
    }

    Ok(ApiResponse::<()>::no_content())
}
