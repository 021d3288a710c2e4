use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::pagination::ListParams;
use crate::api::response::{ApiResponse, ApiResult, ListResponse, ListResult};
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::TenantContext;
use crate::models::membership::Role;
use crate::models::notification::kinds;
use crate::models::timesheet::{Timesheet, TimesheetApproval, TimesheetStatus};
use crate::permissions::Permission;
use crate::services::notify;

const SORT_COLUMNS: &[&str] = &["period_start", "period_end", "status", "created_at"];

#[derive(Debug, Deserialize)]
pub struct TimesheetFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<TimesheetStatus>,
}

/// GET /api/timesheets
pub async fn list(
    Extension(ctx): Extension<TenantContext>,
    Query(page): Query<ListParams>,
    Query(filter): Query<TimesheetFilter>,
) -> ListResult<Timesheet> {
    let pool = DatabaseManager::pool().await?;
    let order = page.order_clause(SORT_COLUMNS, "period_start")?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM timesheets
         WHERE tenant_id = $1
           AND ($2::uuid IS NULL OR user_id = $2)
           AND ($3::timesheet_status IS NULL OR status = $3)",
    )
    .bind(ctx.tenant_id())
    .bind(filter.user_id)
    .bind(filter.status)
    .fetch_one(&pool)
    .await?;

    let sql = format!(
        "SELECT * FROM timesheets
         WHERE tenant_id = $1
           AND ($2::uuid IS NULL OR user_id = $2)
           AND ($3::timesheet_status IS NULL OR status = $3)
         {} LIMIT $4 OFFSET $5",
        order
    );
    let timesheets = sqlx::query_as::<_, Timesheet>(&sql)
        .bind(ctx.tenant_id())
        .bind(filter.user_id)
        .bind(filter.status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&pool)
        .await?;

    Ok(ListResponse::new(timesheets, total))
}

#[derive(Debug, Deserialize)]
pub struct TimesheetInput {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Managers may open timesheets for others; defaults to the caller
    pub user_id: Option<Uuid>,
}

/// POST /api/timesheets
pub async fn create(
    Extension(ctx): Extension<TenantContext>,
    Json(input): Json<TimesheetInput>,
) -> ApiResult<Timesheet> {
    ctx.require(Permission::SubmitTimesheets)?;

    if input.period_end < input.period_start {
        return Err(ApiError::bad_request("Period end precedes period start"));
    }

    let target_user = input.user_id.unwrap_or_else(|| ctx.user_id());
    if target_user != ctx.user_id() && !ctx.member.role.at_least(Role::Manager) {
        return Err(ApiError::forbidden("Only managers can open timesheets for other members"));
    }

    let pool = DatabaseManager::pool().await?;
    let timesheet = sqlx::query_as::<_, Timesheet>(
        "INSERT INTO timesheets (tenant_id, user_id, period_start, period_end)
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(target_user)
    .bind(input.period_start)
    .bind(input.period_end)
    .fetch_one(&pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            ApiError::conflict("A timesheet for this member and period already exists")
        }
        _ => e.into(),
    })?;

    Ok(ApiResponse::created(timesheet))
}

/// GET /api/timesheets/:id
pub async fn get(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Timesheet> {
    let pool = DatabaseManager::pool().await?;
    let timesheet = fetch_timesheet(&pool, ctx.tenant_id(), id).await?;
    Ok(ApiResponse::success(timesheet))
}

/// DELETE /api/timesheets/:id - draft only
pub async fn delete(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let pool = DatabaseManager::pool().await?;
    let timesheet = fetch_timesheet(&pool, ctx.tenant_id(), id).await?;

    if timesheet.user_id != ctx.user_id() && !ctx.member.role.at_least(Role::Manager) {
        return Err(ApiError::forbidden("You can only delete your own timesheets"));
    }
    if timesheet.status != TimesheetStatus::Draft {
        return Err(ApiError::conflict("Only draft timesheets can be deleted"));
    }

    sqlx::query("DELETE FROM timesheets WHERE tenant_id = $1 AND id = $2")
        .bind(ctx.tenant_id())
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(ApiResponse::<()>::no_content())
}

/// POST /api/timesheets/:id/submit - draft|rejected -> submitted.
/// Stamps the member's unlocked entries in the period so they freeze with
/// the timesheet.
pub async fn submit(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Timesheet> {
    ctx.require(Permission::SubmitTimesheets)?;

    let pool = DatabaseManager::pool().await?;
    let timesheet = fetch_timesheet(&pool, ctx.tenant_id(), id).await?;

    if timesheet.user_id != ctx.user_id() && !ctx.member.role.at_least(Role::Manager) {
        return Err(ApiError::forbidden("You can only submit your own timesheets"));
    }
    guard_transition(timesheet.status, TimesheetStatus::Submitted)?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE time_entries SET timesheet_id = $1, updated_at = now()
         WHERE tenant_id = $2 AND user_id = $3
           AND work_date BETWEEN $4 AND $5
           AND timesheet_id IS NULL AND invoice_id IS NULL",
    )
    .bind(id)
    .bind(ctx.tenant_id())
    .bind(timesheet.user_id)
    .bind(timesheet.period_start)
    .bind(timesheet.period_end)
    .execute(&mut *tx)
    .await?;

    let timesheet = sqlx::query_as::<_, Timesheet>(
        "UPDATE timesheets
         SET status = $3, submitted_at = now(), decided_at = NULL, updated_at = now()
         WHERE tenant_id = $1 AND id = $2 RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .bind(TimesheetStatus::Submitted)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    // The submission is committed; a failed notification must not turn it into an error.
    if let Err(e) = notify::notify_role(
        &pool,
        ctx.tenant_id(),
        Role::Manager,
        kinds::TIMESHEET_SUBMITTED,
        json!({ "timesheet_id": timesheet.id, "user_id": timesheet.user_id }),
    )
    .await
    {
        tracing::warn!("Failed to notify managers about submitted timesheet: {}", e);
    }

    Ok(ApiResponse::success(timesheet))
}

#[derive(Debug, Deserialize, Default)]
pub struct DecisionInput {
    pub note: Option<String>,
}

/// POST /api/timesheets/:id/approve
pub async fn approve(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<DecisionInput>,
) -> ApiResult<Timesheet> {
    decide(ctx, id, true, input.note).await
}

/// POST /api/timesheets/:id/reject - releases the entries back for rework
pub async fn reject(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<DecisionInput>,
) -> ApiResult<Timesheet> {
    decide(ctx, id, false, input.note).await
}

async fn decide(
    ctx: TenantContext,
    id: Uuid,
    approved: bool,
    note: Option<String>,
) -> ApiResult<Timesheet> {
    ctx.require(Permission::ApproveTimesheets)?;

    let pool = DatabaseManager::pool().await?;
    let timesheet = fetch_timesheet(&pool, ctx.tenant_id(), id).await?;

    if timesheet.user_id == ctx.user_id() {
        return Err(ApiError::forbidden("You cannot decide your own timesheet"));
    }

    let next = if approved { TimesheetStatus::Approved } else { TimesheetStatus::Rejected };
    guard_transition(timesheet.status, next)?;

    let mut tx = pool.begin().await?;

    let timesheet = sqlx::query_as::<_, Timesheet>(
        "UPDATE timesheets SET status = $3, decided_at = now(), updated_at = now()
         WHERE tenant_id = $1 AND id = $2 RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .bind(next)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO timesheet_approvals (tenant_id, timesheet_id, approver_id, approved, note)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .bind(ctx.user_id())
    .bind(approved)
    .bind(&note)
    .execute(&mut *tx)
    .await?;

    // Rejection releases the entries for rework
    if !approved {
        sqlx::query(
            "UPDATE time_entries SET timesheet_id = NULL, updated_at = now()
             WHERE tenant_id = $1 AND timesheet_id = $2",
        )
        .bind(ctx.tenant_id())
        .bind(id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    // The decision is committed; a failed notification must not turn it into an error.
    if let Err(e) = notify::notify_user(
        &pool,
        ctx.tenant_id(),
        timesheet.user_id,
        kinds::TIMESHEET_DECIDED,
        json!({ "timesheet_id": timesheet.id, "approved": approved, "note": note }),
    )
    .await
    {
        tracing::warn!("Failed to notify member about timesheet decision: {}", e);
    }

    Ok(ApiResponse::success(timesheet))
}

/// GET /api/timesheets/:id/approvals
pub async fn list_approvals(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<TimesheetApproval>> {
    let pool = DatabaseManager::pool().await?;
    fetch_timesheet(&pool, ctx.tenant_id(), id).await?;

    let approvals = sqlx::query_as::<_, TimesheetApproval>(
        "SELECT * FROM timesheet_approvals
         WHERE tenant_id = $1 AND timesheet_id = $2 ORDER BY created_at DESC",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(approvals))
}

fn guard_transition(from: TimesheetStatus, to: TimesheetStatus) -> Result<(), ApiError> {
    if from.can_transition_to(to) {
        return Ok(());
    }
    Err(ApiError::conflict(format!(
        "Timesheet cannot move from '{:?}' to '{:?}'",
        from, to
    )))
}

async fn fetch_timesheet(
    pool: &sqlx::PgPool,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Timesheet, ApiError> {
    sqlx::query_as::<_, Timesheet>("SELECT * FROM timesheets WHERE tenant_id = $1 AND id = $2")
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Timesheet not found"))
}
