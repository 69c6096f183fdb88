use std::sync::Arc;

use axum::extract::{FromRef, State};
use axum::middleware::{self, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use common_auth::{enforce, InterceptorChain, JwtVerifier, Role};
use common_http_errors::{http_error_metrics_layer, ApiError};
use serde_json::Value;

use crate::admin_handlers::admin_dashboard;
use crate::data_handlers::catalog;
use crate::metrics::AuthMetrics;
use crate::store::CredentialStore;
use crate::tokens::TokenSigner;
use crate::user_handlers::{current_user, login_user, register_user};

pub const SERVICE_NAME: &str = "auth-service";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CredentialStore>,
    pub jwt_verifier: Arc<JwtVerifier>,
    pub token_signer: Arc<TokenSigner>,
    pub metrics: Arc<AuthMetrics>,
    pub catalog: Arc<Value>,
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_verifier.clone()
    }
}

impl FromRef<AppState> for Arc<TokenSigner> {
    fn from_ref(state: &AppState) -> Self {
        state.token_signer.clone()
    }
}

async fn landing() -> &'static str {
    "auth-service: POST /auth/register, POST /auth/login, GET /auth/me"
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(response) => response,
        Err(err) => ApiError::internal("metrics render", err).into_response(),
    }
}

/// All routes with their interceptor chains. Protected routes declare their
/// chain explicitly: bearer authentication first, then any role gate.
pub fn router(state: AppState) -> Router {
    let authenticated = InterceptorChain::authenticated(state.jwt_verifier.clone());
    let admin_only = authenticated.clone().require_roles([Role::Admin]);

    let account_routes = Router::new()
        .route("/auth/me", get(current_user))
        .route_layer(from_fn_with_state(authenticated, enforce));

    let admin_routes = Router::new()
        .route("/admin/dashboard", get(admin_dashboard))
        .route_layer(from_fn_with_state(admin_only, enforce));

    Router::new()
        .route("/", get(landing))
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/data", get(catalog))
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login_user))
        .merge(account_routes)
        .merge(admin_routes)
        .with_state(state)
        .layer(middleware::from_fn(http_error_metrics_layer(SERVICE_NAME)))
}
