use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::pagination::ListParams;
use crate::api::response::{ApiResponse, ApiResult, ListResponse, ListResult};
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::TenantContext;
use crate::models::notification::{kinds, Notification, NotificationPreference};

const SORT_COLUMNS: &[&str] = &["kind", "read_at", "created_at"];

#[derive(Debug, Deserialize)]
pub struct NotificationFilter {
    pub unread: Option<bool>,
}

/// GET /api/notifications - the caller's own notifications only
pub async fn list(
    Extension(ctx): Extension<TenantContext>,
    Query(page): Query<ListParams>,
    Query(filter): Query<NotificationFilter>,
) -> ListResult<Notification> {
    let pool = DatabaseManager::pool().await?;
    let order = page.order_clause(SORT_COLUMNS, "created_at")?;

    let unread_only = filter.unread.unwrap_or(false);

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications
         WHERE tenant_id = $1 AND user_id = $2
           AND (NOT $3 OR read_at IS NULL)",
    )
    .bind(ctx.tenant_id())
    .bind(ctx.user_id())
    .bind(unread_only)
    .fetch_one(&pool)
    .await?;

    let sql = format!(
        "SELECT * FROM notifications
         WHERE tenant_id = $1 AND user_id = $2
           AND (NOT $3 OR read_at IS NULL)
         {} LIMIT $4 OFFSET $5",
        order
    );
    let notifications = sqlx::query_as::<_, Notification>(&sql)
        .bind(ctx.tenant_id())
        .bind(ctx.user_id())
        .bind(unread_only)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&pool)
        .await?;

    Ok(ListResponse::new(notifications, total))
}

/// POST /api/notifications/:id/read
pub async fn mark_read(
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Notification> {
    let pool = DatabaseManager::pool().await?;

    let notification = sqlx::query_as::<_, Notification>(
        "UPDATE notifications SET read_at = COALESCE(read_at, now())
         WHERE tenant_id = $1 AND user_id = $2 AND id = $3 RETURNING *",
    )
    .bind(ctx.tenant_id())
    .bind(ctx.user_id())
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Notification not found"))?;

    Ok(ApiResponse::success(notification))
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<serde_json::Value> {
    let pool = DatabaseManager::pool().await?;

    let result = sqlx::query(
        "UPDATE notifications SET read_at = now()
         WHERE tenant_id = $1 AND user_id = $2 AND read_at IS NULL",
    )
    .bind(ctx.tenant_id())
    .bind(ctx.user_id())
    .execute(&pool)
    .await?;

    Ok(ApiResponse::success(serde_json::json!({
        "marked_read": result.rows_affected()
    })))
}

/// GET /api/notification-preferences
///
/// Every known kind is reported; kinds with no stored row default to enabled.
pub async fn get_preferences(
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<serde_json::Value> {
    let pool = DatabaseManager::pool().await?;

    let stored = sqlx::query_as::<_, NotificationPreference>(
        "SELECT * FROM notification_preferences WHERE tenant_id = $1 AND user_id = $2",
    )
    .bind(ctx.tenant_id())
    .bind(ctx.user_id())
    .fetch_all(&pool)
    .await?;

    let mut prefs = serde_json::Map::new();
    for kind in kinds::ALL {
        let enabled = stored
            .iter()
            .find(|p| p.kind == *kind)
            .map(|p| p.enabled)
            .unwrap_or(true);
        prefs.insert((*kind).to_string(), serde_json::Value::Bool(enabled));
    }

    Ok(ApiResponse::success(serde_json::Value::Object(prefs)))
}

#[derive(Debug, Deserialize)]
pub struct PreferencesInput {
    #[serde(flatten)]
    pub kinds: std::collections::HashMap<String, bool>,
}

/// PUT /api/notification-preferences - upserts the supplied kinds
pub async fn update_preferences(
    Extension(ctx): Extension<TenantContext>,
    Json(input): Json<PreferencesInput>,
) -> ApiResult<serde_json::Value> {
    for kind in input.kinds.keys() {
        if !kinds::ALL.contains(&kind.as_str()) {
            return Err(ApiError::bad_request(format!(
                "Unknown notification kind '{}'",
                kind
            )));
        }
    }

    let pool = DatabaseManager::pool().await?;
    let mut tx = pool.begin().await?;

    for (kind, enabled) in &input.kinds {
        sqlx::query(
            "INSERT INTO notification_preferences (tenant_id, user_id, kind, enabled)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (tenant_id, user_id, kind) DO UPDATE SET enabled = $4",
        )
        .bind(ctx.tenant_id())
        .bind(ctx.user_id())
        .bind(kind)
        .bind(enabled)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    get_preferences(Extension(ctx)).await
}
