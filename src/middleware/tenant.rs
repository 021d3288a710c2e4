use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use super::auth::AuthUser;
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::models::membership::Membership;
use crate::models::tenant::Tenant;
use crate::permissions::Permission;

pub const TENANT_HEADER: &str = "x-tenant-slug";

/// Resolved tenant plus the caller's membership, injected by middleware.
/// Every protected handler scopes its queries through this.
#[derive(Clone, Debug)]
pub struct TenantContext {
    pub tenant: Tenant,
    pub member: Membership,
}

impl TenantContext {
    pub fn tenant_id(&self) -> Uuid {
        self.tenant.id
    }

    pub fn user_id(&self) -> Uuid {
        self.member.user_id
    }

    /// Static permission-map check; 403 when the caller's role is too low
    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        if self.member.role.allows(permission) {
            return Ok(());
        }
        Err(ApiError::forbidden("Your role does not permit this operation"))
    }
}

/// Middleware that resolves the tenant from the `X-Tenant-Slug` header and
/// verifies the authenticated user is a member. Runs after JWT auth.
pub async fn tenant_context_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required before tenant resolution"))?
        .clone();

    let slug = extract_slug(&headers)?;

    let pool = DatabaseManager::pool().await?;

    let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE slug = $1")
        .bind(&slug)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Unknown tenant '{}'", slug)))?;

    let member = sqlx::query_as::<_, Membership>(
        "SELECT * FROM tenant_users WHERE tenant_id = $1 AND user_id = $2",
    )
    .bind(tenant.id)
    .bind(auth_user.user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| {
        tracing::warn!(
            "User {} attempted access to tenant '{}' without membership",
            auth_user.user_id,
            slug
        );
        ApiError::forbidden("You are not a member of this tenant")
    })?;

    tracing::debug!("Tenant context resolved: {} ({:?})", tenant.slug, member.role);

    request.extensions_mut().insert(TenantContext { tenant, member });

    Ok(next.run(request).await)
}

fn extract_slug(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(TENANT_HEADER)
        .ok_or_else(|| ApiError::bad_request("Missing X-Tenant-Slug header"))?;

    let slug = value
        .to_str()
        .map_err(|_| ApiError::bad_request("Invalid X-Tenant-Slug header"))?
        .trim()
        .to_lowercase();

    if !Tenant::is_valid_slug(&slug) {
        return Err(ApiError::bad_request(format!("Invalid tenant slug '{}'", slug)));
    }

    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn slug_extraction_normalizes_case() {
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_static("Acme-Studio"));
        assert_eq!(extract_slug(&headers).unwrap(), "acme-studio");
    }

    #[test]
    fn missing_or_bad_slug_is_rejected() {
        let headers = HeaderMap::new();
        assert!(extract_slug(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_static("bad slug!"));
        assert!(extract_slug(&headers).is_err());
    }
}
