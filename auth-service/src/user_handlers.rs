use axum::{extract::State, http::StatusCode, Json};
use chrono::{SecondsFormat, Utc};
use common_auth::{AuthContext, Role};
use common_http_errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::password::{self, PasswordError};
use crate::store::{StoreError, User};
use crate::tokens::{IssuedToken, TokenSubject};
use crate::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(alias = "email", alias = "username")]
    pub identifier: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub identifier: String,
    pub role: Role,
    pub created_at: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            identifier: user.identifier.clone(),
            role: user.role,
            created_at: user.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

pub async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserSummary>)> {
    let RegisterRequest {
        identifier,
        password,
        role,
    } = request;

    let identifier = normalize_identifier(&identifier).ok_or_else(|| {
        ApiError::bad_request("invalid_identifier", "Identifier must not be empty.")
    })?;
    let role = parse_requested_role(role.as_deref())?;

    let password_hash = password::hash_password_blocking(password)
        .await
        .map_err(|err| match err {
            PasswordError::Empty => {
                ApiError::bad_request("invalid_password", "Password must not be empty.")
            }
            other => ApiError::internal("password hashing", other),
        })?;

    let user = User {
        identifier,
        password_hash,
        role,
        created_at: Utc::now(),
    };

    match state.store.insert(user).await {
        Ok(created) => {
            state.metrics.registration("created");
            info!(identifier = %created.identifier, role = %created.role, "registered account");
            Ok((StatusCode::CREATED, Json(UserSummary::from(&created))))
        }
        Err(StoreError::Duplicate) => {
            state.metrics.registration("duplicate");
            Err(ApiError::DuplicateIdentifier)
        }
        Err(err) => {
            state.metrics.registration("error");
            Err(ApiError::internal("credential insert", err))
        }
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email", alias = "username")]
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub expires_at: String,
}

impl From<IssuedToken> for LoginResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.access_token,
            token_type: issued.token_type,
            expires_in: issued.expires_in,
            expires_at: issued
                .expires_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Unknown identifiers and wrong passwords produce the same response.
pub async fn login_user(
    State(state): State<AppState>,
    Json(login): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let LoginRequest {
        identifier,
        password,
    } = login;

    let Some(identifier) = normalize_identifier(&identifier) else {
        state.metrics.login_attempt("invalid_credentials");
        return Err(ApiError::InvalidCredentials);
    };

    let account = state
        .store
        .find_by_identifier(&identifier)
        .await
        .map_err(|err| ApiError::internal("credential lookup", err))?;

    let Some(account) = account else {
        password::burn_verification(password).await;
        state.metrics.login_attempt("invalid_credentials");
        warn!(%identifier, "login for unknown identifier");
        return Err(ApiError::InvalidCredentials);
    };

    let password_valid =
        password::verify_password_blocking(password, account.password_hash.clone())
            .await
            .map_err(|err| ApiError::internal("password verification", err))?;

    if !password_valid {
        state.metrics.login_attempt("invalid_credentials");
        warn!(%identifier, "login with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let subject = TokenSubject {
        identifier: account.identifier.clone(),
        role: account.role,
    };

    let issued = state
        .token_signer
        .issue(subject)
        .map_err(|err| ApiError::internal("token issuance", err))?;

    state.metrics.login_attempt("success");
    info!(identifier = %account.identifier, role = %account.role, "issued access token");
    Ok(Json(LoginResponse::from(issued)))
}

/// Profile of the token's subject. Accounts removed after the token was issued
/// yield `NotFound`; the token itself stays valid until it expires.
pub async fn current_user(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<UserSummary>> {
    let account = state
        .store
        .find_by_identifier(auth.identifier())
        .await
        .map_err(|err| ApiError::internal("credential lookup", err))?;

    match account {
        Some(user) => Ok(Json(UserSummary::from(&user))),
        None => {
            warn!(identifier = %auth.identifier(), "token subject no longer exists");
            Err(ApiError::NotFound {
                code: "user_not_found",
            })
        }
    }
}

fn parse_requested_role(raw: Option<&str>) -> ApiResult<Role> {
    match raw {
        None => Ok(Role::default()),
        Some(value) => value.parse::<Role>().map_err(|err| {
            ApiError::bad_request("invalid_role", format!("Role must be user or admin ({err})."))
        }),
    }
}

fn normalize_identifier(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_identifier_trims() {
        assert_eq!(normalize_identifier("  alice "), Some("alice".to_string()));
        assert_eq!(normalize_identifier("   "), None);
    }

    #[test]
    fn requested_role_parsing() {
        assert_eq!(parse_requested_role(None).unwrap(), Role::User);
        assert_eq!(parse_requested_role(Some("Admin")).unwrap(), Role::Admin);
        let err = parse_requested_role(Some("root")).unwrap_err();
        assert_eq!(err.code(), "invalid_role");
    }

    #[test]
    fn register_request_accepts_email_alias() {
        let request: RegisterRequest =
            serde_json::from_str(r#"{"email":"a@example.com","password":"pw"}"#).unwrap();
        assert_eq!(request.identifier, "a@example.com");
        assert!(request.role.is_none());
    }
}
