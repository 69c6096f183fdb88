//! Per-route request interception.
//!
//! Each stage implements [`RequestInterceptor`]; an [`InterceptorChain`] runs
//! its stages in the order they were added and stops at the first rejection,
//! so no later stage or handler observes a refused request. Mount a chain on a
//! route with `axum::middleware::from_fn_with_state(chain, enforce)`.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;

use crate::error::AuthError;
use crate::extractors::{authenticate, AuthContext};
use crate::guards::ensure_role;
use crate::roles::Role;
use crate::verifier::JwtVerifier;

pub trait RequestInterceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn intercept(&self, parts: &mut Parts) -> Result<(), ApiError>;
}

/// Verifies the bearer token and stores the resulting [`AuthContext`] in the
/// request extensions.
pub struct BearerAuth {
    verifier: Arc<JwtVerifier>,
}

impl BearerAuth {
    pub fn new(verifier: Arc<JwtVerifier>) -> Self {
        Self { verifier }
    }
}

impl RequestInterceptor for BearerAuth {
    fn name(&self) -> &'static str {
        "bearer_auth"
    }

    fn intercept(&self, parts: &mut Parts) -> Result<(), ApiError> {
        let context = authenticate(&parts.headers, &self.verifier)?;
        parts.extensions.insert(context);
        Ok(())
    }
}

/// Compares the identity left by [`BearerAuth`] against an allow-list.
pub struct RoleGate {
    allowed: Vec<Role>,
}

impl RoleGate {
    pub fn new<I>(allowed: I) -> Self
    where
        I: IntoIterator<Item = Role>,
    {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl RequestInterceptor for RoleGate {
    fn name(&self) -> &'static str {
        "role_gate"
    }

    fn intercept(&self, parts: &mut Parts) -> Result<(), ApiError> {
        // A gate placed ahead of authentication has nothing to check.
        let context = parts
            .extensions
            .get::<AuthContext>()
            .ok_or(AuthError::MissingIdentity)?;
        ensure_role(context, &self.allowed)?;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InterceptorChain {
    stages: Vec<Arc<dyn RequestInterceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain that only requires a valid bearer token.
    pub fn authenticated(verifier: Arc<JwtVerifier>) -> Self {
        Self::new().then(BearerAuth::new(verifier))
    }

    /// Appends a role gate for `roles`.
    pub fn require_roles<I>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = Role>,
    {
        self.then(RoleGate::new(roles))
    }

    pub fn then<I>(mut self, stage: I) -> Self
    where
        I: RequestInterceptor + 'static,
    {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn run(&self, parts: &mut Parts) -> Result<(), ApiError> {
        for stage in &self.stages {
            stage.intercept(parts)?;
        }
        Ok(())
    }
}

/// Middleware entry point for `axum::middleware::from_fn_with_state`.
pub async fn enforce(
    State(chain): State<InterceptorChain>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    if let Err(err) = chain.run(&mut parts) {
        return err.into_response();
    }
    next.run(Request::from_parts(parts, body)).await
}
