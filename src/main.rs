use axum::{
    middleware::from_fn,
    routing::{delete, get, post, put},
    Router,
};
use axum::http::HeaderValue;
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crewhq_api::config;
use crewhq_api::database::manager::DatabaseManager;
use crewhq_api::handlers::{protected, public};
use crewhq_api::middleware::auth::jwt_auth_middleware;
use crewhq_api::middleware::tenant::tenant_context_middleware;

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = config::config();
    tracing::info!("Starting CrewHQ API in {:?} mode", config.environment);

    if let Err(e) = DatabaseManager::run_migrations().await {
        tracing::error!("Migration failure: {}", e);
        std::process::exit(1);
    }

    let app = app();

    // Allow tests or deployments to override port via env
    let port = std::env::var("CREWHQ_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("CrewHQ API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

fn app() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(public_routes())
        .merge(session_routes())
        .merge(tenant_api_routes())
        .layer(cors_layer(&config::config().security.cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// CORS restricted to the configured origins; `*` opts into permissive mode.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Unauthenticated routes
fn public_routes() -> Router {
    use public::auth;

    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/accept-invitation", post(auth::accept_invitation))
}

/// Routes that need a JWT but no tenant header
fn session_routes() -> Router {
    Router::new()
        .route("/api/whoami", get(protected::auth::whoami))
        .layer(from_fn(jwt_auth_middleware))
}

/// The tenant-scoped API: JWT plus X-Tenant-Slug membership check
fn tenant_api_routes() -> Router {
    Router::new()
        .merge(tenant_routes())
        .merge(member_directory_routes())
        .merge(crud_routes())
        .merge(time_routes())
        .merge(billing_routes())
        .merge(notification_routes())
        // from_fn layers run bottom-up: JWT first, then tenant resolution
        .layer(from_fn(tenant_context_middleware))
        .layer(from_fn(jwt_auth_middleware))
}

fn tenant_routes() -> Router {
    use protected::tenant;

    Router::new()
        .route("/api/tenant", get(tenant::get).put(tenant::update))
        .route("/api/tenant/members", get(tenant::list_members))
        .route(
            "/api/tenant/members/:user_id",
            put(tenant::update_member).delete(tenant::remove_member),
        )
}

fn member_directory_routes() -> Router {
    use protected::{invitations, positions};

    Router::new()
        .route("/api/positions", get(positions::list).post(positions::create))
        .route(
            "/api/positions/:id",
            get(positions::get).put(positions::update).delete(positions::delete),
        )
        .route("/api/invitations", get(invitations::list).post(invitations::create))
        .route("/api/invitations/:id", get(invitations::get))
        .route("/api/invitations/:id/revoke", post(invitations::revoke))
}

fn crud_routes() -> Router {
    use protected::{customers, projects, tasks};

    Router::new()
        .route("/api/customers", get(customers::list).post(customers::create))
        .route(
            "/api/customers/:id",
            get(customers::get).put(customers::update).delete(customers::delete),
        )
        .route("/api/projects", get(projects::list).post(projects::create))
        .route(
            "/api/projects/:id",
            get(projects::get).put(projects::update).delete(projects::delete),
        )
        .route(
            "/api/projects/:id/members",
            get(projects::list_members).post(projects::add_member),
        )
        .route("/api/projects/:id/members/:user_id", delete(projects::remove_member))
        .route("/api/tasks", get(tasks::list).post(tasks::create))
        .route("/api/tasks/:id", get(tasks::get).put(tasks::update).delete(tasks::delete))
}

fn time_routes() -> Router {
    use protected::{time_entries, timesheets};

    Router::new()
        .route("/api/time-entries", get(time_entries::list).post(time_entries::create))
        .route(
            "/api/time-entries/:id",
            get(time_entries::get).put(time_entries::update).delete(time_entries::delete),
        )
        .route("/api/timesheets", get(timesheets::list).post(timesheets::create))
        .route("/api/timesheets/:id", get(timesheets::get).delete(timesheets::delete))
        .route("/api/timesheets/:id/submit", post(timesheets::submit))
        .route("/api/timesheets/:id/approve", post(timesheets::approve))
        .route("/api/timesheets/:id/reject", post(timesheets::reject))
        .route("/api/timesheets/:id/approvals", get(timesheets::list_approvals))
}

fn billing_routes() -> Router {
    use protected::{invoices, payments, payroll};

    Router::new()
        .route("/api/invoices", get(invoices::list))
        .route("/api/invoices/generate", post(invoices::generate))
        .route("/api/invoices/:id", get(invoices::get).delete(invoices::delete))
        .route("/api/invoices/:id/send", post(invoices::send))
        .route("/api/invoices/:id/void", post(invoices::void))
        .route("/api/payments", get(payments::list).post(payments::create))
        .route("/api/payments/:id", get(payments::get).delete(payments::delete))
        .route("/api/payroll-batches", get(payroll::list))
        .route("/api/payroll-batches/generate", post(payroll::generate))
        .route("/api/payroll-batches/:id", get(payroll::get).delete(payroll::delete))
        .route("/api/payroll-batches/:id/process", post(payroll::process))
}

fn notification_routes() -> Router {
    use protected::notifications;

    Router::new()
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/read-all", post(notifications::mark_all_read))
        .route("/api/notifications/:id/read", post(notifications::mark_read))
        .route(
            "/api/notification-preferences",
            get(notifications::get_preferences).put(notifications::update_preferences),
        )
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "CrewHQ API",
            "version": version,
            "description": "Multi-tenant freelancer and agency management backend",
            "endpoints": {
                "home": "/ (public)",
                "auth": "/auth/register, /auth/login, /auth/accept-invitation (public)",
                "whoami": "/api/whoami (JWT)",
                "tenant": "/api/tenant, /api/tenant/members (JWT + X-Tenant-Slug)",
                "resources": "/api/{customers,projects,tasks,positions,invitations} (JWT + X-Tenant-Slug)",
                "time": "/api/{time-entries,timesheets} (JWT + X-Tenant-Slug)",
                "billing": "/api/{invoices,payments,payroll-batches} (JWT + X-Tenant-Slug)",
                "notifications": "/api/notifications (JWT + X-Tenant-Slug)",
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::cors_layer;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app_with_origins(origins: &[&str]) -> Router {
        let origins: Vec<String> = origins.iter().map(|s| s.to_string()).collect();
        Router::new().route("/", get(|| async { "ok" })).layer(cors_layer(&origins))
    }

    async fn allow_origin_for(app: Router, origin: &str) -> Option<String> {
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::ORIGIN, origin)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn cors_reflects_configured_origins_only() {
        let app = app_with_origins(&["http://localhost:3000", "https://app.crewhq.example"]);

        assert_eq!(
            allow_origin_for(app.clone(), "http://localhost:3000").await.as_deref(),
            Some("http://localhost:3000")
        );
        assert_eq!(allow_origin_for(app, "https://elsewhere.example").await, None);
    }

    #[tokio::test]
    async fn cors_wildcard_opts_into_permissive() {
        let app = app_with_origins(&["*"]);
        assert!(allow_origin_for(app, "https://anywhere.example").await.is_some());
    }
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "database": "ok" }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": { "status": "degraded", "timestamp": now, "database_error": e.to_string() }
            })),
        ),
    }
}
