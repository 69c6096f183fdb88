use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap, HeaderValue};

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};
use crate::roles::Role;
use crate::verifier::JwtVerifier;

/// Authenticated identity for the lifetime of one request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    pub token: String,
}

impl AuthContext {
    pub fn identifier(&self) -> &str {
        &self.claims.subject
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.claims.has_role(role)
    }
}

/// Verifies the bearer token carried in `headers`.
pub fn authenticate(headers: &HeaderMap, verifier: &JwtVerifier) -> AuthResult<AuthContext> {
    let header_value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthorization)?;

    let token = parse_bearer(header_value)?;
    let claims = verifier.verify(&token)?;

    Ok(AuthContext { claims, token })
}

/// Reuses the identity placed by `BearerAuth` when present, otherwise verifies
/// the header itself.
#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<JwtVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<AuthContext>() {
            return Ok(existing.clone());
        }

        let verifier = Arc::<JwtVerifier>::from_ref(state);
        let context = authenticate(&parts.headers, &verifier)?;
        parts.extensions.insert(context.clone());
        Ok(context)
    }
}

fn parse_bearer(value: &HeaderValue) -> AuthResult<String> {
    let raw = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization)?
        .trim();

    let token = raw
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthorization)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidAuthorization);
    }

    Ok(token.to_owned())
}
