use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::api::pagination::ListParams;
use crate::api::response::{ApiResponse, ApiResult, ListResponse, ListResult};
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::TenantContext;
use crate::models::notification::kinds;
use crate::models::payroll::{PayrollBatch, PayrollItem, PayrollStatus};
use crate::permissions::Permission;
use crate::services::billing::BillingError;
use crate::services::notify;
use crate::services::payroll::{batch_total, build_payroll_lines, overlaps_existing, PayRates};

const SORT_COLUMNS: &[&str] = &["period_start", "period_end", "status", "total", "created_at"];

/// GET /api/payroll-batches
pub async fn list(
    Extension(ctx): Extension<TenantContext>,
    Query(params): Query<ListParams>,
) -> ListResult<PayrollBatch> {
    ctx.require(Permission::ManagePayroll)?;

    let pool = DatabaseManager::pool().await?;
    let order = params.order_clause(SORT_COLUMNS, "period_start")?;

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM payroll_batches WHERE tenant_id = $1")
            .bind(ctx.tenant_id())
            .fetch_one(&pool)
            .await?;

    let sql = format!(
        "SELECT * FROM payroll_batches WHERE tenant_id = $1 {} LIMIT $2 OFFSET $3",
        order
    );
    let batches = sqlx::query_as::<_, PayrollBatch>(&sql)
        .bind(ctx.tenant_id())
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&pool)
        .await?;

    Ok(ListResponse::new(batches, total))
}

#[derive(Debug, Serialize)]
pub struct BatchWithItems {
    #[serde(flatten)]
    pub batch: PayrollBatch,
    pub items: Vec<PayrollItem>,
}

/// GET /api/payroll-batches/:id
pub async fn get(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<BatchWithItems> {
    ctx.require(Permission::ManagePayroll)?;

    let pool = DatabaseManager::pool().await?;
    let batch = fetch_batch(&pool, ctx.tenant_id(), id).await?;

    let items = sqlx::query_as::<_, PayrollItem>(
        "SELECT * FROM payroll_items WHERE tenant_id = $1 AND batch_id = $2",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(BatchWithItems { batch, items }))
}

#[derive(Debug, Deserialize)]
pub struct GeneratePayrollRequest {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

/// POST /api/payroll-batches/generate
///
/// Aggregates approved-timesheet minutes per member over the period and
/// prices them with each member's pay rate (membership override, else the
/// position default). One batch with one item per member, in one transaction.
pub async fn generate(
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<GeneratePayrollRequest>,
) -> ApiResult<BatchWithItems> {
    ctx.require(Permission::ManagePayroll)?;

    if req.period_end < req.period_start {
        return Err(BillingError::EmptyPeriod.into());
    }

    let pool = DatabaseManager::pool().await?;
    let mut tx = pool.begin().await?;

    // An entry covered by two batch periods would be paid twice. Delete the
    // mistaken pending batch first to re-run a period.
    let existing: Vec<(NaiveDate, NaiveDate)> = sqlx::query_as(
        "SELECT period_start, period_end FROM payroll_batches WHERE tenant_id = $1",
    )
    .bind(ctx.tenant_id())
    .fetch_all(&mut *tx)
    .await?;
    if overlaps_existing(&existing, req.period_start, req.period_end) {
        return Err(ApiError::conflict("An existing payroll batch overlaps this period"));
    }

    // Only time on approved timesheets is payable
    let minutes_by_user: Vec<(Uuid, i64)> = sqlx::query_as(
        "SELECT te.user_id, COALESCE(SUM(te.minutes), 0)::bigint
         FROM time_entries te
         JOIN timesheets ts ON ts.id = te.timesheet_id
         WHERE te.tenant_id = $1 AND ts.status = 'approved'
           AND te.work_date BETWEEN $2 AND $3
         GROUP BY te.user_id
         ORDER BY te.user_id",
    )
    .bind(ctx.tenant_id())
    .bind(req.period_start)
    .bind(req.period_end)
    .fetch_all(&mut *tx)
    .await?;

    if minutes_by_user.is_empty() {
        return Err(ApiError::unprocessable_entity(
            "No approved timesheet entries in the period",
        ));
    }

    let mut rates = PayRates::default();
    let rate_rows: Vec<(Uuid, Option<Decimal>, Option<Decimal>)> = sqlx::query_as(
        "SELECT tu.user_id, tu.pay_rate, p.default_pay_rate
         FROM tenant_users tu
         LEFT JOIN positions p ON p.id = tu.position_id
         WHERE tu.tenant_id = $1",
    )
    .bind(ctx.tenant_id())
    .fetch_all(&mut *tx)
    .await?;

    for (user_id, member_rate, position_rate) in rate_rows {
        if let Some(rate) = member_rate.or(position_rate) {
            rates.set(user_id, rate);
        }
    }

    let lines = build_payroll_lines(&minutes_by_user, &rates)?;
    let total = batch_total(&lines);

    let batch = sqlx::query_as::<_, PayrollBatch>(
        "INSERT INTO payroll_batches (tenant_id, period_start, period_end, total)
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(req.period_start)
    .bind(req.period_end)
    .bind(total)
    .fetch_one(&mut *tx)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in &lines {
        let item = sqlx::query_as::<_, PayrollItem>(
            "INSERT INTO payroll_items (tenant_id, batch_id, user_id, minutes, pay_rate, amount)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(ctx.tenant_id())
        .bind(batch.id)
        .bind(line.user_id)
        .bind(line.minutes as i32)
        .bind(line.pay_rate)
        .bind(line.amount)
        .fetch_one(&mut *tx)
        .await?;
        items.push(item);
    }

    tx.commit().await?;

    tracing::info!(
        "Generated payroll batch for {}..{} ({} members, total {})",
        req.period_start,
        req.period_end,
        items.len(),
        total
    );

    Ok(ApiResponse::created(BatchWithItems { batch, items }))
}

/// POST /api/payroll-batches/:id/process - pending -> processed
pub async fn process(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<PayrollBatch> {
    ctx.require(Permission::ManagePayroll)?;

    let pool = DatabaseManager::pool().await?;
    let batch = fetch_batch(&pool, ctx.tenant_id(), id).await?;

    if batch.status != PayrollStatus::Pending {
        return Err(ApiError::conflict("Payroll batch has already been processed"));
    }

    let batch = sqlx::query_as::<_, PayrollBatch>(
        "UPDATE payroll_batches SET status = $3, processed_at = now(), updated_at = now()
         WHERE tenant_id = $1 AND id = $2 RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .bind(PayrollStatus::Processed)
    .fetch_one(&pool)
    .await?;

    let items = sqlx::query_as::<_, PayrollItem>(
        "SELECT * FROM payroll_items WHERE tenant_id = $1 AND batch_id = $2",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .fetch_all(&pool)
    .await?;

    // The batch is already marked processed; a failed notification must not
    // fail the request or skip the remaining members.
    for item in &items {
        if let Err(e) = notify::notify_user(
            &pool,
            ctx.tenant_id(),
            item.user_id,
            kinds::PAYROLL_PROCESSED,
            json!({ "batch_id": batch.id, "amount": item.amount }),
        )
        .await
        {
            tracing::warn!("Failed to notify {} about processed payroll: {}", item.user_id, e);
        }
    }

    Ok(ApiResponse::success(batch))
}

/// DELETE /api/payroll-batches/:id - pending only
pub async fn delete(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    ctx.require(Permission::ManagePayroll)?;

    let pool = DatabaseManager::pool().await?;
    let batch = fetch_batch(&pool, ctx.tenant_id(), id).await?;

    if batch.status != PayrollStatus::Pending {
        return Err(ApiError::conflict("Processed payroll batches cannot be deleted"));
    }

    sqlx::query("DELETE FROM payroll_batches WHERE tenant_id = $1 AND id = $2")
        .bind(ctx.tenant_id())
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(ApiResponse::<()>::no_content())
}

async fn fetch_batch(
    pool: &sqlx::PgPool,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<PayrollBatch, ApiError> {
    sqlx::query_as::<_, PayrollBatch>(
        "SELECT * FROM payroll_batches WHERE tenant_id = $1 AND id = $2",
    )
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Payroll batch not found"))
}
