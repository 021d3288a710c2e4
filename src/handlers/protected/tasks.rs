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
use crate::models::task::{Task, TaskStatus};
use crate::permissions::Permission;

const SORT_COLUMNS: &[&str] = &["title", "status", "due_date", "created_at", "updated_at"];

#[derive(Debug, Deserialize)]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
}

/// GET /api/tasks
pub async fn list(
    Extension(ctx): Extension<TenantContext>,
    Query(page): Query<ListParams>,
    Query(filter): Query<TaskFilter>,
) -> ListResult<Task> {
    let pool = DatabaseManager::pool().await?;
    let order = page.order_clause(SORT_COLUMNS, "created_at")?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tasks
         WHERE tenant_id = $1
           AND ($2::uuid IS NULL OR project_id = $2)
           AND ($3::uuid IS NULL OR assignee_id = $3)",
    )
    .bind(ctx.tenant_id())
    .bind(filter.project_id)
    .bind(filter.assignee_id)
    .fetch_one(&pool)
    .await?;

    let sql = format!(
        "SELECT * FROM tasks
         WHERE tenant_id = $1
           AND ($2::uuid IS NULL OR project_id = $2)
           AND ($3::uuid IS NULL OR assignee_id = $3)
         {} LIMIT $4 OFFSET $5",
        order
    );
    let tasks = sqlx::query_as::<_, Task>(&sql)
        .bind(ctx.tenant_id())
        .bind(filter.project_id)
        .bind(filter.assignee_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&pool)
        .await?;

    Ok(ListResponse::new(tasks, total))
}

#[derive(Debug, Deserialize)]
pub struct TaskInput {
    pub project_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<NaiveDate>,
}

/// POST /api/tasks
pub async fn create(
    Extension(ctx): Extension<TenantContext>,
    Json(input): Json<TaskInput>,
) -> ApiResult<Task> {
    ctx.require(Permission::ManageTasks)?;

    if input.title.trim().is_empty() {
        return Err(ApiError::bad_request("Task title is required"));
    }

    let pool = DatabaseManager::pool().await?;

    let project_exists: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE tenant_id = $1 AND id = $2")
            .bind(ctx.tenant_id())
            .bind(input.project_id)
            .fetch_one(&pool)
            .await?;
    if project_exists == 0 {
        return Err(ApiError::not_found("Project not found"));
    }

    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks (tenant_id, project_id, assignee_id, title, description, status, due_date)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(input.project_id)
    .bind(input.assignee_id)
    .bind(input.title.trim())
    .bind(&input.description)
    .bind(input.status.unwrap_or(TaskStatus::Todo))
    .bind(input.due_date)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::created(task))
}

/// GET /api/tasks/:id
pub async fn get(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Task> {
    let pool = DatabaseManager::pool().await?;
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE tenant_id = $1 AND id = $2")
        .bind(ctx.tenant_id())
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    Ok(ApiResponse::success(task))
}

/// PUT /api/tasks/:id
pub async fn update(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<TaskInput>,
) -> ApiResult<Task> {
    ctx.require(Permission::ManageTasks)?;

    let pool = DatabaseManager::pool().await?;
    let current = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE tenant_id = $1 AND id = $2")
        .bind(ctx.tenant_id())
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    if input.project_id != current.project_id {
        let project_exists: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE tenant_id = $1 AND id = $2")
                .bind(ctx.tenant_id())
                .bind(input.project_id)
                .fetch_one(&pool)
                .await?;
        if project_exists == 0 {
            return Err(ApiError::not_found("Project not found"));
        }
    }

    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks
         SET project_id = $3, assignee_id = $4, title = $5, description = $6,
             status = $7, due_date = $8, updated_at = now()
         WHERE tenant_id = $1 AND id = $2 RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(id)
    .bind(input.project_id)
    .bind(input.assignee_id)
    .bind(input.title.trim())
    .bind(&input.description)
    .bind(input.status.unwrap_or(current.status))
    .bind(input.due_date)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::success(task))
}

/// DELETE /api/tasks/:id
pub async fn delete(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    ctx.require(Permission::ManageTasks)?;

    let pool = DatabaseManager::pool().await?;
    let result = sqlx::query("DELETE FROM tasks WHERE tenant_id = $1 AND id = $2")
        .bind(ctx.tenant_id())
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Task not found"));
    }

    Ok(ApiResponse::<()>::no_content())
}
