use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::api::pagination::ListParams;
use crate::api::response::{ApiResponse, ApiResult, ListResponse, ListResult};
use crate::config;
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::TenantContext;
use crate::models::customer::Customer;
use crate::models::invoice::{Invoice, InvoiceItem, InvoiceStatus};
use crate::models::membership::Role;
use crate::models::notification::kinds;
use crate::models::time_entry::TimeEntry;
use crate::permissions::Permission;
use crate::services::billing::{
    self, format_invoice_number, BillingError, NameIndex, RateBook,
};
use crate::services::notify;

const SORT_COLUMNS: &[&str] =
    &["number", "status", "issue_date", "due_date", "total", "created_at"];

// Filters travel in a separate extractor: serde_urlencoded cannot decode
// non-string fields through #[serde(flatten)], so ListParams stays its own
// Query. The same split applies to every filtered list endpoint.
#[derive(Debug, Deserialize)]
pub struct InvoiceFilter {
    pub customer_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
}

/// GET /api/invoices
pub async fn list(
    Extension(ctx): Extension<TenantContext>,
    Query(page): Query<ListParams>,
    Query(filter): Query<InvoiceFilter>,
) -> ListResult<Invoice> {
    ctx.require(Permission::ViewBilling)?;

    let pool = DatabaseManager::pool().await?;
    let order = page.order_clause(SORT_COLUMNS, "created_at")?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM invoices
         WHERE tenant_id = $1
           AND ($2::uuid IS NULL OR customer_id = $2)
           AND ($3::invoice_status IS NULL OR status = $3)",
    )
    .bind(ctx.tenant_id())
    .bind(filter.customer_id)
    .bind(filter.status)
    .fetch_one(&pool)
    .await?;

    let sql = format!(
        "SELECT * FROM invoices
         WHERE tenant_id = $1
           AND ($2::uuid IS NULL OR customer_id = $2)
           AND ($3::invoice_status IS NULL OR status = $3)
         {} LIMIT $4 OFFSET $5",
        order
    );
    let invoices = sqlx::query_as::<_, Invoice>(&sql)
        .bind(ctx.tenant_id())
        .bind(filter.customer_id)
        .bind(filter.status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&pool)
        .await?;

    Ok(ListResponse::new(invoices, total))
}

#[derive(Debug, Serialize)]
pub struct InvoiceWithItems {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

/// GET /api/invoices/:id
pub async fn get(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<InvoiceWithItems> {
    ctx.require(Permission::ViewBilling)?;

    let pool = DatabaseManager::pool().await?;
    let invoice = fetch_invoice(&pool, ctx.tenant_id(), id).await?;

    let items = sqlx::query_as::<_, InvoiceItem>(
        "SELECT * FROM invoice_items
         WHERE tenant_id = $1 AND invoice_id = $2 ORDER BY sort_order",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(InvoiceWithItems { invoice, items }))
}

#[derive(Debug, Deserialize)]
pub struct GenerateInvoiceRequest {
    pub customer_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    /// Override; falls back to the customer, then the tenant default
    pub discount_percent: Option<Decimal>,
    pub tax_percent: Option<Decimal>,
    pub notes: Option<String>,
}

/// POST /api/invoices/generate
///
/// The billing core: collect the customer's unbilled billable time entries
/// in the period, group them by (project, member), price each group and
/// persist the invoice with its line items, locking the consumed entries.
/// Everything happens in one transaction.
pub async fn generate(
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<GenerateInvoiceRequest>,
) -> ApiResult<InvoiceWithItems> {
    ctx.require(Permission::ManageInvoices)?;

    if req.period_end < req.period_start {
        return Err(BillingError::EmptyPeriod.into());
    }

    let pool = DatabaseManager::pool().await?;

    let customer =
        sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE tenant_id = $1 AND id = $2")
            .bind(ctx.tenant_id())
            .bind(req.customer_id)
            .fetch_optional(&pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Customer not found"))?;

    let tenant = &ctx.tenant;
    let discount_percent = req
        .discount_percent
        .or(customer.discount_percent)
        .unwrap_or(tenant.discount_percent);
    let tax_percent = req.tax_percent.or(customer.tax_percent).unwrap_or(tenant.tax_percent);

    let mut tx = pool.begin().await?;

    // Lock candidate entries so concurrent invoice runs cannot double-bill
    let entries = sqlx::query_as::<_, TimeEntry>(
        "SELECT te.* FROM time_entries te
         JOIN projects p ON p.id = te.project_id
         WHERE te.tenant_id = $1 AND p.customer_id = $2
           AND te.billable AND te.invoice_id IS NULL
           AND te.work_date BETWEEN $3 AND $4
         FOR UPDATE OF te",
    )
    .bind(ctx.tenant_id())
    .bind(req.customer_id)
    .bind(req.period_start)
    .bind(req.period_end)
    .fetch_all(&mut *tx)
    .await?;

    let (rates, names) = load_rate_book(&mut tx, ctx.tenant_id(), req.customer_id).await?;
    let line_items = billing::build_line_items(&entries, &rates, &names)?;
    let totals = billing::compute_totals(&line_items, discount_percent, tax_percent);

    // Sequence from the highest issued number, so deleted drafts never free
    // theirs. UNIQUE(tenant_id, number) turns a concurrent collision into a
    // 409; a retry recomputes against the committed winner.
    let numbers: Vec<String> =
        sqlx::query_scalar("SELECT number FROM invoices WHERE tenant_id = $1")
            .bind(ctx.tenant_id())
            .fetch_all(&mut *tx)
            .await?;
    let sequence = billing::next_invoice_sequence(numbers.iter().map(String::as_str));
    let number =
        format_invoice_number(&config::config().billing.invoice_number_prefix, sequence);

    let issue_date = req.issue_date.unwrap_or_else(|| Utc::now().date_naive());
    let due_date = req.due_date.unwrap_or_else(|| {
        issue_date + Duration::days(config::config().billing.payment_terms_days)
    });

    let invoice = sqlx::query_as::<_, Invoice>(
        "INSERT INTO invoices
             (tenant_id, customer_id, number, status, issue_date, due_date,
              period_start, period_end, subtotal, discount_percent, discount_amount,
              tax_percent, tax_amount, total, notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
         RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(req.customer_id)
    .bind(&number)
    .bind(InvoiceStatus::Draft)
    .bind(issue_date)
    .bind(due_date)
    .bind(req.period_start)
    .bind(req.period_end)
    .bind(totals.subtotal)
    .bind(discount_percent)
    .bind(totals.discount_amount)
    .bind(tax_percent)
    .bind(totals.tax_amount)
    .bind(totals.total)
    .bind(&req.notes)
    .fetch_one(&mut *tx)
    .await?;

    let mut items = Vec::with_capacity(line_items.len());
    for (index, item) in line_items.iter().enumerate() {
        let saved = sqlx::query_as::<_, InvoiceItem>(
            "INSERT INTO invoice_items
                 (tenant_id, invoice_id, project_id, user_id, description, hours, unit_rate, amount, sort_order)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(ctx.tenant_id())
        .bind(invoice.id)
        .bind(item.project_id)
        .bind(item.user_id)
        .bind(&item.description)
        .bind(item.hours)
        .bind(item.unit_rate)
        .bind(item.amount)
        .bind(index as i32)
        .fetch_one(&mut *tx)
        .await?;
        items.push(saved);
    }

    // Lock the consumed entries to this invoice
    let entry_ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();
    sqlx::query(
        "UPDATE time_entries SET invoice_id = $1, updated_at = now() WHERE id = ANY($2)",
    )
    .bind(invoice.id)
    .bind(&entry_ids)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "Generated invoice {} for customer {} ({} line items, total {})",
        invoice.number,
        customer.name,
        items.len(),
        invoice.total
    );

    Ok(ApiResponse::created(InvoiceWithItems { invoice, items }))
}

/// POST /api/invoices/:id/send - draft -> sent
pub async fn send(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Invoice> {
    ctx.require(Permission::ManageInvoices)?;

    let pool = DatabaseManager::pool().await?;
    let invoice = fetch_invoice(&pool, ctx.tenant_id(), id).await?;

    if invoice.status != InvoiceStatus::Draft {
        return Err(ApiError::conflict("Only draft invoices can be sent"));
    }

    let invoice = sqlx::query_as::<_, Invoice>(
        "UPDATE invoices SET status = $3, updated_at = now()
         WHERE tenant_id = $1 AND id = $2 RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .bind(InvoiceStatus::Sent)
    .fetch_one(&pool)
    .await?;

    // The status change is committed; a failed notification must not turn it into an error.
    if let Err(e) = notify::notify_role(
        &pool,
        ctx.tenant_id(),
        Role::Admin,
        kinds::INVOICE_SENT,
        json!({ "invoice_id": invoice.id, "number": invoice.number, "total": invoice.total }),
    )
    .await
    {
        tracing::warn!("Failed to notify admins about sent invoice {}: {}", invoice.number, e);
    }

    Ok(ApiResponse::success(invoice))
}

/// POST /api/invoices/:id/void - releases the billed time entries.
/// Invoices with recorded payments cannot be voided.
pub async fn void(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Invoice> {
    ctx.require(Permission::ManageInvoices)?;

    let pool = DatabaseManager::pool().await?;
    let invoice = fetch_invoice(&pool, ctx.tenant_id(), id).await?;

    if invoice.status == InvoiceStatus::Void {
        return Err(ApiError::conflict("Invoice is already void"));
    }
    if invoice.amount_paid > Decimal::ZERO {
        return Err(ApiError::conflict("Delete recorded payments before voiding"));
    }

    let mut tx = pool.begin().await?;

    let invoice = sqlx::query_as::<_, Invoice>(
        "UPDATE invoices SET status = $3, updated_at = now()
         WHERE tenant_id = $1 AND id = $2 RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .bind(InvoiceStatus::Void)
    .fetch_one(&mut *tx)
    .await?;

    release_entries(&mut tx, ctx.tenant_id(), id).await?;

    tx.commit().await?;

    Ok(ApiResponse::success(invoice))
}

/// DELETE /api/invoices/:id - draft only; releases the billed entries
pub async fn delete(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    ctx.require(Permission::ManageInvoices)?;

    let pool = DatabaseManager::pool().await?;
    let invoice = fetch_invoice(&pool, ctx.tenant_id(), id).await?;

    if invoice.status != InvoiceStatus::Draft {
        return Err(ApiError::conflict("Only draft invoices can be deleted; void it instead"));
    }

    let mut tx = pool.begin().await?;
    release_entries(&mut tx, ctx.tenant_id(), id).await?;
    sqlx::query("DELETE FROM invoices WHERE tenant_id = $1 AND id = $2")
        .bind(ctx.tenant_id())
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(ApiResponse::<()>::no_content())
}

async fn release_entries(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    tenant_id: Uuid,
    invoice_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE time_entries SET invoice_id = NULL, updated_at = now()
         WHERE tenant_id = $1 AND invoice_id = $2",
    )
    .bind(tenant_id)
    .bind(invoice_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Build the rate book and name index for one customer's projects:
/// project default rates plus per-project member overrides.
async fn load_rate_book(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    tenant_id: Uuid,
    customer_id: Uuid,
) -> Result<(RateBook, NameIndex), ApiError> {
    let mut rates = RateBook::default();
    let mut names = NameIndex::default();

    let projects: Vec<(Uuid, String, Decimal)> = sqlx::query_as(
        "SELECT id, name, hourly_rate FROM projects
         WHERE tenant_id = $1 AND customer_id = $2",
    )
    .bind(tenant_id)
    .bind(customer_id)
    .fetch_all(&mut **tx)
    .await?;

    for (id, name, hourly_rate) in projects {
        rates.set_project_rate(id, hourly_rate);
        names.projects.insert(id, name);
    }

    let overrides: Vec<(Uuid, Uuid, Option<Decimal>)> = sqlx::query_as(
        "SELECT pm.project_id, pm.user_id, pm.bill_rate
         FROM project_members pm
         JOIN projects p ON p.id = pm.project_id
         WHERE pm.tenant_id = $1 AND p.customer_id = $2",
    )
    .bind(tenant_id)
    .bind(customer_id)
    .fetch_all(&mut **tx)
    .await?;

    for (project_id, user_id, bill_rate) in overrides {
        if let Some(rate) = bill_rate {
            rates.set_member_rate(project_id, user_id, rate);
        }
    }

    let members: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT u.id, u.display_name
         FROM users u JOIN tenant_users tu ON tu.user_id = u.id
         WHERE tu.tenant_id = $1",
    )
    .bind(tenant_id)
    .fetch_all(&mut **tx)
    .await?;

    for (id, display_name) in members {
        names.members.insert(id, display_name);
    }

    Ok((rates, names))
}

async fn fetch_invoice(
    pool: &sqlx::PgPool,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Invoice, ApiError> {
    sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE tenant_id = $1 AND id = $2")
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Invoice not found"))
}
