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
use crate::models::customer::Customer;
use crate::permissions::Permission;

const SORT_COLUMNS: &[&str] = &["name", "email", "created_at", "updated_at"];

/// GET /api/customers
pub async fn list(
    Extension(ctx): Extension<TenantContext>,
    Query(params): Query<ListParams>,
) -> ListResult<Customer> {
    let pool = DatabaseManager::pool().await?;
    let order = params.order_clause(SORT_COLUMNS, "created_at")?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers WHERE tenant_id = $1")
        .bind(ctx.tenant_id())
        .fetch_one(&pool)
        .await?;

    let sql = format!("SELECT * FROM customers WHERE tenant_id = $1 {} LIMIT $2 OFFSET $3", order);
    let customers = sqlx::query_as::<_, Customer>(&sql)
        .bind(ctx.tenant_id())
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&pool)
        .await?;

    Ok(ListResponse::new(customers, total))
}

#[derive(Debug, Deserialize)]
pub struct CustomerInput {
    pub name: String,
    pub email: Option<String>,
    pub billing_address: Option<String>,
    pub tax_percent: Option<Decimal>,
    pub discount_percent: Option<Decimal>,
}

/// POST /api/customers
pub async fn create(
    Extension(ctx): Extension<TenantContext>,
    Json(input): Json<CustomerInput>,
) -> ApiResult<Customer> {
    ctx.require(Permission::ManageCustomers)?;

    if input.name.trim().is_empty() {
        return Err(ApiError::bad_request("Customer name is required"));
    }

    let pool = DatabaseManager::pool().await?;
    let customer = sqlx::query_as::<_, Customer>(
        "INSERT INTO customers (tenant_id, name, email, billing_address, tax_percent, discount_percent)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(input.name.trim())
    .bind(&input.email)
    .bind(&input.billing_address)
    .bind(input.tax_percent)
    .bind(input.discount_percent)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::created(customer))
}

/// GET /api/customers/:id
pub async fn get(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Customer> {
    let pool = DatabaseManager::pool().await?;
    let customer =
        sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE tenant_id = $1 AND id = $2")
            .bind(ctx.tenant_id())
            .bind(id)
            .fetch_optional(&pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Customer not found"))?;

    Ok(ApiResponse::success(customer))
}

/// PUT /api/customers/:id
pub async fn update(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<CustomerInput>,
) -> ApiResult<Customer> {
    ctx.require(Permission::ManageCustomers)?;

    if input.name.trim().is_empty() {
        return Err(ApiError::bad_request("Customer name is required"));
    }

    let pool = DatabaseManager::pool().await?;
    let customer = sqlx::query_as::<_, Customer>(
        "UPDATE customers
         SET name = $3, email = $4, billing_address = $5, tax_percent = $6,
             discount_percent = $7, updated_at = now()
         WHERE tenant_id = $1 AND id = $2
         RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .bind(input.name.trim())
    .bind(&input.email)
    .bind(&input.billing_address)
    .bind(input.tax_percent)
    .bind(input.discount_percent)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Customer not found"))?;

    Ok(ApiResponse::success(customer))
}

/// DELETE /api/customers/:id
pub async fn delete(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    ctx.require(Permission::ManageCustomers)?;

    let pool = DatabaseManager::pool().await?;

    let project_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE tenant_id = $1 AND customer_id = $2")
            .bind(ctx.tenant_id())
            .bind(id)
            .fetch_one(&pool)
            .await?;
    if project_count > 0 {
        return Err(ApiError::conflict("Customer still has projects"));
    }

    let result = sqlx::query("DELETE FROM customers WHERE tenant_id = $1 AND id = $2")
        .bind(ctx.tenant_id())
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Customer not found"));
    }

    Ok(ApiResponse::<()>::no_content())
}
