use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::pagination::ListParams;
use crate::api::response::{ApiResponse, ApiResult, ListResponse, ListResult};
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::TenantContext;
use crate::models::invoice::Invoice;
use crate::models::membership::Role;
use crate::models::notification::kinds;
use crate::models::payment::Payment;
use crate::permissions::Permission;
use crate::services::billing;
use crate::services::notify;

const SORT_COLUMNS: &[&str] = &["amount", "method", "received_at", "created_at"];

#[derive(Debug, Deserialize)]
pub struct PaymentFilter {
    pub invoice_id: Option<Uuid>,
}

/// GET /api/payments
pub async fn list(
    Extension(ctx): Extension<TenantContext>,
    Query(page): Query<ListParams>,
    Query(filter): Query<PaymentFilter>,
) -> ListResult<Payment> {
    ctx.require(Permission::ViewBilling)?;

    let pool = DatabaseManager::pool().await?;
    let order = page.order_clause(SORT_COLUMNS, "received_at")?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payments
         WHERE tenant_id = $1 AND ($2::uuid IS NULL OR invoice_id = $2)",
    )
    .bind(ctx.tenant_id())
    .bind(filter.invoice_id)
    .fetch_one(&pool)
    .await?;

    let sql = format!(
        "SELECT * FROM payments
         WHERE tenant_id = $1 AND ($2::uuid IS NULL OR invoice_id = $2)
         {} LIMIT $3 OFFSET $4",
        order
    );
    let payments = sqlx::query_as::<_, Payment>(&sql)
        .bind(ctx.tenant_id())
        .bind(filter.invoice_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&pool)
        .await?;

    Ok(ListResponse::new(payments, total))
}

#[derive(Debug, Deserialize)]
pub struct PaymentInput {
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
}

/// POST /api/payments
///
/// Reconciliation happens here: the invoice's `amount_paid` and status are
/// updated in the same transaction that records the payment, so the two can
/// never drift apart.
pub async fn create(
    Extension(ctx): Extension<TenantContext>,
    Json(input): Json<PaymentInput>,
) -> ApiResult<Payment> {
    ctx.require(Permission::ManagePayments)?;

    let pool = DatabaseManager::pool().await?;
    let mut tx = pool.begin().await?;

    let invoice = sqlx::query_as::<_, Invoice>(
        "SELECT * FROM invoices WHERE tenant_id = $1 AND id = $2 FOR UPDATE",
    )
    .bind(ctx.tenant_id())
    .bind(input.invoice_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Invoice not found"))?;

    let (new_paid, new_status) =
        billing::apply_payment(invoice.status, invoice.total, invoice.amount_paid, input.amount)?;

    let payment = sqlx::query_as::<_, Payment>(
        "INSERT INTO payments (tenant_id, invoice_id, amount, method, reference, received_at)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(input.invoice_id)
    .bind(input.amount)
    .bind(input.method.as_deref().unwrap_or("bank_transfer"))
    .bind(&input.reference)
    .bind(input.received_at.unwrap_or_else(Utc::now))
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE invoices SET amount_paid = $3, status = $4, updated_at = now()
         WHERE tenant_id = $1 AND id = $2",
    )
    .bind(ctx.tenant_id())
    .bind(invoice.id)
    .bind(new_paid)
    .bind(new_status)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "Payment of {} recorded against invoice {} (now {:?})",
        payment.amount,
        invoice.number,
        new_status
    );

    // The payment is committed; a failed notification must not turn it into an error.
    if let Err(e) = notify::notify_role(
        &pool,
        ctx.tenant_id(),
        Role::Admin,
        kinds::PAYMENT_RECEIVED,
        json!({ "invoice_id": invoice.id, "number": invoice.number, "amount": payment.amount }),
    )
    .await
    {
        tracing::warn!("Failed to notify admins about payment on {}: {}", invoice.number, e);
    }

    Ok(ApiResponse::created(payment))
}

/// GET /api/payments/:id
pub async fn get(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Payment> {
    ctx.require(Permission::ViewBilling)?;

    let pool = DatabaseManager::pool().await?;
    let payment =
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE tenant_id = $1 AND id = $2")
            .bind(ctx.tenant_id())
            .bind(id)
            .fetch_optional(&pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Payment not found"))?;

    Ok(ApiResponse::success(payment))
}

/// DELETE /api/payments/:id - reverses the reconciliation: the invoice's
/// paid amount is decremented and its status falls back accordingly.
pub async fn delete(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    ctx.require(Permission::ManagePayments)?;

    let pool = DatabaseManager::pool().await?;
    let mut tx = pool.begin().await?;

    let payment = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE tenant_id = $1 AND id = $2",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Payment not found"))?;

    let invoice = sqlx::query_as::<_, Invoice>(
        "SELECT * FROM invoices WHERE tenant_id = $1 AND id = $2 FOR UPDATE",
    )
    .bind(ctx.tenant_id())
    .bind(payment.invoice_id)
    .fetch_one(&mut *tx)
    .await?;

    let (new_paid, new_status) =
        billing::revert_payment(invoice.status, invoice.total, invoice.amount_paid, payment.amount)?;

    sqlx::query("DELETE FROM payments WHERE tenant_id = $1 AND id = $2")
        .bind(ctx.tenant_id())
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE invoices SET amount_paid = $3, status = $4, updated_at = now()
         WHERE tenant_id = $1 AND id = $2",
    )
    .bind(ctx.tenant_id())
    .bind(invoice.id)
    .bind(new_paid)
    .bind(new_status)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "Payment of {} deleted from invoice {} (now {:?})",
        payment.amount,
        invoice.number,
        new_status
    );

    Ok(ApiResponse::<()>::no_content())
}
