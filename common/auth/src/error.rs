use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use thiserror::Error;
use tracing::debug;

pub type AuthResult<T> = Result<T, AuthError>;

/// Reasons a bearer credential was refused. All of them surface to the caller
/// as the same `Unauthenticated` response.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header missing")]
    MissingAuthorization,
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("failed to decode token header: {0}")]
    InvalidHeader(String),
    #[error("token verification failed: {0}")]
    Verification(String),
    #[error("token expired")]
    Expired,
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
    #[error("malformed claim payload: {0}")]
    InvalidJson(String),
    #[error("no authenticated identity on request")]
    MissingIdentity,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        Self::Verification(value.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        debug!(reason = %value, "rejecting unauthenticated request");
        ApiError::Unauthenticated
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
