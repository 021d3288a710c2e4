use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::pagination::ListParams;
use crate::api::response::{ApiResponse, ApiResult, ListResponse, ListResult};
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::TenantContext;
use crate::models::membership::Role;
use crate::models::time_entry::TimeEntry;
use crate::permissions::Permission;

const SORT_COLUMNS: &[&str] = &["work_date", "minutes", "billable", "created_at"];

#[derive(Debug, Deserialize)]
pub struct TimeEntryFilter {
    pub project_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// GET /api/time-entries
pub async fn list(
    Extension(ctx): Extension<TenantContext>,
    Query(page): Query<ListParams>,
    Query(filter): Query<TimeEntryFilter>,
) -> ListResult<TimeEntry> {
    let pool = DatabaseManager::pool().await?;
    let order = page.order_clause(SORT_COLUMNS, "work_date")?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM time_entries
         WHERE tenant_id = $1
           AND ($2::uuid IS NULL OR project_id = $2)
           AND ($3::uuid IS NULL OR user_id = $3)
           AND ($4::date IS NULL OR work_date >= $4)
           AND ($5::date IS NULL OR work_date <= $5)",
    )
    .bind(ctx.tenant_id())
    .bind(filter.project_id)
    .bind(filter.user_id)
    .bind(filter.from)
    .bind(filter.to)
    .fetch_one(&pool)
    .await?;

    let sql = format!(
        "SELECT * FROM time_entries
         WHERE tenant_id = $1
           AND ($2::uuid IS NULL OR project_id = $2)
           AND ($3::uuid IS NULL OR user_id = $3)
           AND ($4::date IS NULL OR work_date >= $4)
           AND ($5::date IS NULL OR work_date <= $5)
         {} LIMIT $6 OFFSET $7",
        order
    );
    let entries = sqlx::query_as::<_, TimeEntry>(&sql)
        .bind(ctx.tenant_id())
        .bind(filter.project_id)
        .bind(filter.user_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&pool)
        .await?;

    Ok(ListResponse::new(entries, total))
}

#[derive(Debug, Deserialize)]
pub struct TimeEntryInput {
    pub project_id: Uuid,
    pub task_id: Option<Uuid>,
    /// Managers may log on behalf of others; defaults to the caller
    pub user_id: Option<Uuid>,
    pub work_date: NaiveDate,
    pub minutes: i32,
    pub billable: Option<bool>,
    pub notes: Option<String>,
}

/// POST /api/time-entries
pub async fn create(
    Extension(ctx): Extension<TenantContext>,
    Json(input): Json<TimeEntryInput>,
) -> ApiResult<TimeEntry> {
    ctx.require(Permission::TrackTime)?;

    if input.minutes <= 0 {
        return Err(ApiError::bad_request("Minutes must be positive"));
    }
    if input.minutes > 24 * 60 {
        return Err(ApiError::bad_request("A single entry cannot exceed 24 hours"));
    }

    let target_user = input.user_id.unwrap_or_else(|| ctx.user_id());
    if target_user != ctx.user_id() && !ctx.member.role.at_least(Role::Manager) {
        return Err(ApiError::forbidden("Only managers can log time for other members"));
    }

    let pool = DatabaseManager::pool().await?;
    ensure_entry_target(&pool, ctx.tenant_id(), input.project_id, input.task_id).await?;

    let entry = sqlx::query_as::<_, TimeEntry>(
        "INSERT INTO time_entries (tenant_id, project_id, task_id, user_id, work_date, minutes, billable, notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(input.project_id)
    .bind(input.task_id)
    .bind(target_user)
    .bind(input.work_date)
    .bind(input.minutes)
    .bind(input.billable.unwrap_or(true))
    .bind(&input.notes)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::created(entry))
}

/// GET /api/time-entries/:id
pub async fn get(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<TimeEntry> {
    let pool = DatabaseManager::pool().await?;
    let entry = fetch_entry(&pool, ctx.tenant_id(), id).await?;
    Ok(ApiResponse::success(entry))
}

/// PUT /api/time-entries/:id
pub async fn update(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<TimeEntryInput>,
) -> ApiResult<TimeEntry> {
    ctx.require(Permission::TrackTime)?;

    if input.minutes <= 0 || input.minutes > 24 * 60 {
        return Err(ApiError::bad_request("Minutes must be between 1 and 1440"));
    }

    let pool = DatabaseManager::pool().await?;
    let current = fetch_entry(&pool, ctx.tenant_id(), id).await?;
    check_editable(&ctx, &current)?;
    ensure_entry_target(&pool, ctx.tenant_id(), input.project_id, input.task_id).await?;

    let entry = sqlx::query_as::<_, TimeEntry>(
        "UPDATE time_entries
         SET project_id = $3, task_id = $4, work_date = $5, minutes = $6,
             billable = $7, notes = $8, updated_at = now()
         WHERE tenant_id = $1 AND id = $2 RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .bind(input.project_id)
    .bind(input.task_id)
    .bind(input.work_date)
    .bind(input.minutes)
    .bind(input.billable.unwrap_or(current.billable))
    .bind(&input.notes)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::success(entry))
}

/// DELETE /api/time-entries/:id
pub async fn delete(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    ctx.require(Permission::TrackTime)?;

    let pool = DatabaseManager::pool().await?;
    let current = fetch_entry(&pool, ctx.tenant_id(), id).await?;
    check_editable(&ctx, &current)?;

    sqlx::query("DELETE FROM time_entries WHERE tenant_id = $1 AND id = $2")
        .bind(ctx.tenant_id())
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(ApiResponse::<()>::no_content())
}

/// Locked entries (invoiced or on a submitted timesheet) are immutable;
/// members can only touch their own entries.
fn check_editable(ctx: &TenantContext, entry: &TimeEntry) -> Result<(), ApiError> {
    if entry.invoice_id.is_some() {
        return Err(ApiError::conflict("Time entry has been invoiced and is locked"));
    }
    if entry.timesheet_id.is_some() {
        return Err(ApiError::conflict("Time entry belongs to a submitted timesheet"));
    }
    if entry.user_id != ctx.user_id() && !ctx.member.role.at_least(Role::Manager) {
        return Err(ApiError::forbidden("You can only modify your own time entries"));
    }
    Ok(())
}

/// Entries may only point at projects and tasks inside the caller's tenant;
/// the foreign keys alone would accept another tenant's rows.
async fn ensure_entry_target(
    pool: &sqlx::PgPool,
    tenant_id: Uuid,
    project_id: Uuid,
    task_id: Option<Uuid>,
) -> Result<(), ApiError> {
    let project_exists: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(project_id)
            .fetch_one(pool)
            .await?;
    if project_exists == 0 {
        return Err(ApiError::not_found("Project not found"));
    }

    if let Some(task_id) = task_id {
        let task_exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE tenant_id = $1 AND id = $2 AND project_id = $3",
        )
        .bind(tenant_id)
        .bind(task_id)
        .bind(project_id)
        .fetch_one(pool)
        .await?;
        if task_exists == 0 {
            return Err(ApiError::not_found("Task not found in this project"));
        }
    }

    Ok(())
}

async fn fetch_entry(
    pool: &sqlx::PgPool,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<TimeEntry, ApiError> {
    sqlx::query_as::<_, TimeEntry>("SELECT * FROM time_entries WHERE tenant_id = $1 AND id = $2")
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Time entry not found"))
}
