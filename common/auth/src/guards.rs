use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use tracing::debug;

use crate::roles::Role;
use crate::AuthContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    Forbidden { required: Vec<Role>, actual: Role },
}

impl From<GuardError> for ApiError {
    fn from(value: GuardError) -> Self {
        match value {
            GuardError::Forbidden { required, actual } => {
                debug!(%actual, ?required, "role not permitted");
                ApiError::Forbidden {
                    required: required.iter().map(|role| role.to_string()).collect(),
                }
            }
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Admits `auth` when its token role is one of `allowed`. An empty allow-list
/// admits every authenticated identity.
pub fn ensure_role(auth: &AuthContext, allowed: &[Role]) -> Result<(), GuardError> {
    if allowed.is_empty() || allowed.iter().any(|role| auth.has_role(*role)) {
        Ok(())
    } else {
        Err(GuardError::Forbidden {
            required: allowed.to_vec(),
            actual: auth.role(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Claims;
    use chrono::Utc;

    fn context(role: Role) -> AuthContext {
        AuthContext {
            claims: Claims {
                subject: "alice".into(),
                role,
                issued_at: None,
                expires_at: Utc::now(),
                issuer: "iss".into(),
                audience: vec!["aud".into()],
                token_id: None,
            },
            token: "t".into(),
        }
    }

    #[test]
    fn admits_listed_role() {
        assert!(ensure_role(&context(Role::Admin), &[Role::Admin]).is_ok());
        assert!(ensure_role(&context(Role::User), &[Role::User, Role::Admin]).is_ok());
    }

    #[test]
    fn rejects_unlisted_role() {
        let err = ensure_role(&context(Role::User), &[Role::Admin]).expect_err("forbidden");
        assert_eq!(
            err,
            GuardError::Forbidden {
                required: vec![Role::Admin],
                actual: Role::User,
            }
        );
    }

    #[test]
    fn empty_allow_list_admits_everyone() {
        assert!(ensure_role(&context(Role::User), &[]).is_ok());
    }
}
