use axum::Json;
use common_auth::{AuthContext, Role};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub identifier: String,
    pub role: Role,
    pub message: String,
}

/// Mounted behind `BearerAuth` and an admin-only `RoleGate`; the role shown is
/// the one embedded in the token.
pub async fn admin_dashboard(auth: AuthContext) -> Json<DashboardResponse> {
    Json(DashboardResponse {
        identifier: auth.identifier().to_string(),
        role: auth.role(),
        message: format!("Welcome to the admin dashboard, {}.", auth.identifier()),
    })
}
