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
use crate::models::project::{Project, ProjectMember, ProjectStatus};
use crate::permissions::Permission;

const SORT_COLUMNS: &[&str] = &["name", "status", "hourly_rate", "created_at", "updated_at"];

/// GET /api/projects
pub async fn list(
    Extension(ctx): Extension<TenantContext>,
    Query(params): Query<ListParams>,
) -> ListResult<Project> {
    let pool = DatabaseManager::pool().await?;
    let order = params.order_clause(SORT_COLUMNS, "created_at")?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE tenant_id = $1")
        .bind(ctx.tenant_id())
        .fetch_one(&pool)
        .await?;

    let sql = format!("SELECT * FROM projects WHERE tenant_id = $1 {} LIMIT $2 OFFSET $3", order);
    let projects = sqlx::query_as::<_, Project>(&sql)
        .bind(ctx.tenant_id())
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&pool)
        .await?;

    Ok(ListResponse::new(projects, total))
}

#[derive(Debug, Deserialize)]
pub struct ProjectInput {
    pub customer_id: Uuid,
    pub name: String,
    pub status: Option<ProjectStatus>,
    pub hourly_rate: Option<Decimal>,
}

/// POST /api/projects
pub async fn create(
    Extension(ctx): Extension<TenantContext>,
    Json(input): Json<ProjectInput>,
) -> ApiResult<Project> {
    ctx.require(Permission::ManageProjects)?;

    if input.name.trim().is_empty() {
        return Err(ApiError::bad_request("Project name is required"));
    }

    let pool = DatabaseManager::pool().await?;

    // The customer must belong to this tenant
    let customer_exists: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM customers WHERE tenant_id = $1 AND id = $2")
            .bind(ctx.tenant_id())
            .bind(input.customer_id)
            .fetch_one(&pool)
            .await?;
    if customer_exists == 0 {
        return Err(ApiError::not_found("Customer not found"));
    }

    let project = sqlx::query_as::<_, Project>(
        "INSERT INTO projects (tenant_id, customer_id, name, status, hourly_rate)
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(input.customer_id)
    .bind(input.name.trim())
    .bind(input.status.unwrap_or(ProjectStatus::Active))
    .bind(input.hourly_rate.unwrap_or(Decimal::ZERO))
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::created(project))
}

/// GET /api/projects/:id
pub async fn get(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Project> {
    let pool = DatabaseManager::pool().await?;
    let project = fetch_project(&pool, ctx.tenant_id(), id).await?;
    Ok(ApiResponse::success(project))
}

/// PUT /api/projects/:id
pub async fn update(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<ProjectInput>,
) -> ApiResult<Project> {
    ctx.require(Permission::ManageProjects)?;

    let pool = DatabaseManager::pool().await?;
    let current = fetch_project(&pool, ctx.tenant_id(), id).await?;

    let project = sqlx::query_as::<_, Project>(
        "UPDATE projects
         SET customer_id = $3, name = $4, status = $5, hourly_rate = $6, updated_at = now()
         WHERE tenant_id = $1 AND id = $2 RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .bind(input.customer_id)
    .bind(input.name.trim())
    .bind(input.status.unwrap_or(current.status))
    .bind(input.hourly_rate.unwrap_or(current.hourly_rate))
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::success(project))
}

/// DELETE /api/projects/:id
pub async fn delete(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    ctx.require(Permission::ManageProjects)?;

    let pool = DatabaseManager::pool().await?;

    let billed_entries: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM time_entries
         WHERE tenant_id = $1 AND project_id = $2 AND invoice_id IS NOT NULL",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .fetch_one(&pool)
    .await?;
    if billed_entries > 0 {
        return Err(ApiError::conflict("Project has invoiced time entries; archive it instead"));
    }

    let result = sqlx::query("DELETE FROM projects WHERE tenant_id = $1 AND id = $2")
        .bind(ctx.tenant_id())
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Project not found"));
    }

    Ok(ApiResponse::<()>::no_content())
}

/// GET /api/projects/:id/members
pub async fn list_members(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<ProjectMember>> {
    let pool = DatabaseManager::pool().await?;
    fetch_project(&pool, ctx.tenant_id(), id).await?;

    let members = sqlx::query_as::<_, ProjectMember>(
        "SELECT * FROM project_members WHERE tenant_id = $1 AND project_id = $2 ORDER BY created_at",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(members))
}

#[derive(Debug, Deserialize)]
pub struct ProjectMemberInput {
    pub user_id: Uuid,
    pub bill_rate: Option<Decimal>,
}

/// POST /api/projects/:id/members
pub async fn add_member(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<ProjectMemberInput>,
) -> ApiResult<ProjectMember> {
    ctx.require(Permission::ManageProjects)?;

    let pool = DatabaseManager::pool().await?;
    fetch_project(&pool, ctx.tenant_id(), id).await?;

    // Only tenant members can join projects
    let is_member: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tenant_users WHERE tenant_id = $1 AND user_id = $2")
            .bind(ctx.tenant_id())
            .bind(input.user_id)
            .fetch_one(&pool)
            .await?;
    if is_member == 0 {
        return Err(ApiError::not_found("User is not a member of this tenant"));
    }

    let member = sqlx::query_as::<_, ProjectMember>(
        "INSERT INTO project_members (tenant_id, project_id, user_id, bill_rate)
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .bind(input.user_id)
    .bind(input.bill_rate)
    .fetch_one(&pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            ApiError::conflict("User is already on this project")
        }
        _ => e.into(),
    })?;

    Ok(ApiResponse::created(member))
}

/// DELETE /api/projects/:id/members/:user_id
pub async fn remove_member(
    Extension(ctx): Extension<TenantContext>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<()> {
    ctx.require(Permission::ManageProjects)?;

    let pool = DatabaseManager::pool().await?;
    let result = sqlx::query(
        "DELETE FROM project_members WHERE tenant_id = $1 AND project_id = $2 AND user_id = $3",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .bind(user_id)
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Project member not found"));
    }

    Ok(ApiResponse::<()>::no_content())
}

async fn fetch_project(
    pool: &sqlx::PgPool,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Project, ApiError> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE tenant_id = $1 AND id = $2")
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))
}
