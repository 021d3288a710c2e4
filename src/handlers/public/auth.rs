use axum::Json;
use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

use crate::api::response::{ApiResponse, ApiResult};
use crate::auth::{generate_jwt, hash_password, verify_password, Claims};
use crate::config;
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::models::invitation::{Invitation, InvitationStatus};
use crate::models::membership::Role;
use crate::models::notification::kinds;
use crate::models::tenant::Tenant;
use crate::models::user::{User, UserProfile};
use crate::services::notify;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub tenant_slug: String,
    pub tenant_name: String,
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserProfile,
    pub expires_in: u64,
}

fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    let mut field_errors = HashMap::new();

    if !Tenant::is_valid_slug(&req.tenant_slug) {
        field_errors.insert(
            "tenant_slug".to_string(),
            "Must be 2-63 lowercase letters, digits or hyphens".to_string(),
        );
    }
    if req.tenant_name.trim().is_empty() {
        field_errors.insert("tenant_name".to_string(), "This field is required".to_string());
    }
    if !req.email.contains('@') {
        field_errors.insert("email".to_string(), "Invalid email address".to_string());
    }
    if req.password.len() < 8 {
        field_errors.insert("password".to_string(), "Must be at least 8 characters".to_string());
    }
    if req.display_name.trim().is_empty() {
        field_errors.insert("display_name".to_string(), "This field is required".to_string());
    }

    if field_errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation_error("Invalid registration data", Some(field_errors)))
    }
}

/// POST /auth/register - create tenant, owner user and membership as one
/// atomic unit; any failure rolls all three back.
pub async fn register(Json(req): Json<RegisterRequest>) -> ApiResult<serde_json::Value> {
    validate_registration(&req)?;

    let pool = DatabaseManager::pool().await?;
    let password_hash = hash_password(&req.password)
        .map_err(|e| ApiError::internal_server_error(e.to_string()))?;

    let mut tx = pool.begin().await?;

    let tenant = sqlx::query_as::<_, Tenant>(
        "INSERT INTO tenants (slug, name) VALUES ($1, $2) RETURNING *",
    )
    .bind(req.tenant_slug.trim())
    .bind(req.tenant_name.trim())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            ApiError::conflict(format!("Tenant slug '{}' is already taken", req.tenant_slug))
        }
        _ => e.into(),
    })?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, password_hash, display_name) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(req.email.trim().to_lowercase())
    .bind(&password_hash)
    .bind(req.display_name.trim())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            ApiError::conflict("An account with this email already exists")
        }
        _ => e.into(),
    })?;

    sqlx::query("INSERT INTO tenant_users (tenant_id, user_id, role) VALUES ($1, $2, $3)")
        .bind(tenant.id)
        .bind(user.id)
        .bind(Role::Owner)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!("Registered tenant '{}' with owner {}", tenant.slug, user.email);

    let session = issue_session(user)?;
    Ok(ApiResponse::created(json!({
        "tenant": tenant,
        "token": session.token,
        "user": session.user,
        "expires_in": session.expires_in,
    })))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /auth/login - verify credentials and issue a JWT
pub async fn login(Json(req): Json<LoginRequest>) -> ApiResult<SessionResponse> {
    let pool = DatabaseManager::pool().await?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(req.email.trim().to_lowercase())
        .fetch_optional(&pool)
        .await?;

    // Same rejection either way; no account enumeration
    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;
    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    let session = issue_session(user)?;
    Ok(ApiResponse::success(session))
}

#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub token: String,
    pub password: Option<String>,
    pub display_name: Option<String>,
}

/// POST /auth/accept-invitation - redeem a one-time invitation token.
/// Creates the user when the invited email is new, then the membership.
pub async fn accept_invitation(
    Json(req): Json<AcceptInvitationRequest>,
) -> ApiResult<SessionResponse> {
    let pool = DatabaseManager::pool().await?;
    let token_hash = Invitation::hash_token(req.token.trim());

    let invitation =
        sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE token_hash = $1")
            .bind(&token_hash)
            .fetch_optional(&pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Invitation not found"))?;

    match invitation.status {
        InvitationStatus::Pending => {}
        InvitationStatus::Accepted => {
            return Err(ApiError::conflict("Invitation has already been accepted"))
        }
        InvitationStatus::Revoked => return Err(ApiError::conflict("Invitation was revoked")),
        InvitationStatus::Expired => return Err(ApiError::conflict("Invitation has expired")),
    }

    if invitation.is_expired(Utc::now()) {
        sqlx::query("UPDATE invitations SET status = $1, updated_at = now() WHERE id = $2")
            .bind(InvitationStatus::Expired)
            .bind(invitation.id)
            .execute(&pool)
            .await?;
        return Err(ApiError::conflict("Invitation has expired"));
    }

    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&invitation.email)
        .fetch_optional(&mut *tx)
        .await?;

    let user = match existing {
        Some(user) => user,
        None => {
            let password = req.password.as_deref().ok_or_else(|| {
                ApiError::bad_request("Password is required for a new account")
            })?;
            if password.len() < 8 {
                return Err(ApiError::bad_request("Password must be at least 8 characters"));
            }
            let display_name = req
                .display_name
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ApiError::bad_request("Display name is required"))?;
            let password_hash = hash_password(password)
                .map_err(|e| ApiError::internal_server_error(e.to_string()))?;

            sqlx::query_as::<_, User>(
                "INSERT INTO users (email, password_hash, display_name)
                 VALUES ($1, $2, $3) RETURNING *",
            )
            .bind(&invitation.email)
            .bind(&password_hash)
            .bind(display_name)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    sqlx::query(
        "INSERT INTO tenant_users (tenant_id, user_id, role) VALUES ($1, $2, $3)
         ON CONFLICT (tenant_id, user_id) DO NOTHING",
    )
    .bind(invitation.tenant_id)
    .bind(user.id)
    .bind(invitation.role)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE invitations SET status = $1, updated_at = now() WHERE id = $2")
        .bind(InvitationStatus::Accepted)
        .bind(invitation.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    // The membership is committed; a failed notification must not undo it.
    if let Err(e) = notify::notify_user(
        &pool,
        invitation.tenant_id,
        invitation.invited_by,
        kinds::INVITATION_ACCEPTED,
        json!({ "email": invitation.email }),
    )
    .await
    {
        tracing::warn!("Failed to notify inviter about accepted invitation: {}", e);
    }

    let session = issue_session(user)?;
    Ok(ApiResponse::success(session))
}

fn issue_session(user: User) -> Result<SessionResponse, ApiError> {
    let claims = Claims::new(user.id, user.email.clone());
    let token =
        generate_jwt(&claims).map_err(|e| ApiError::internal_server_error(e.to_string()))?;
    let expires_in = config::config().security.jwt_expiry_hours * 3600;

    Ok(SessionResponse { token, user: user.into(), expires_in })
}

/// Generate a URL-safe one-time invitation token
pub fn generate_invitation_token() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(40).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_validation_collects_field_errors() {
        let req = RegisterRequest {
            tenant_slug: "Bad Slug".into(),
            tenant_name: "".into(),
            email: "not-an-email".into(),
            password: "short".into(),
            display_name: " ".into(),
        };
        let err = validate_registration(&req).unwrap_err();
        match err {
            ApiError::ValidationError { field_errors: Some(fields), .. } => {
                assert_eq!(fields.len(), 5);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn valid_registration_passes() {
        let req = RegisterRequest {
            tenant_slug: "acme".into(),
            tenant_name: "Acme Studio".into(),
            email: "owner@acme.test".into(),
            password: "correct-horse".into(),
            display_name: "Pat Owner".into(),
        };
        assert!(validate_registration(&req).is_ok());
    }

    #[test]
    fn invitation_tokens_are_long_and_unique() {
        let a = generate_invitation_token();
        let b = generate_invitation_token();
        assert_eq!(a.len(), 40);
        assert_ne!(a, b);
    }
}
