use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

pub const ERROR_CODE_HEADER: &str = "X-Error-Code";

/// Distinct error codes tracked as metric labels before falling back to `overflow`.
pub const MAX_ERROR_CODES: usize = 40;

const OVERFLOW_CODE: &str = "overflow";

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_roles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Uuid>,
}

/// Caller-facing failures. Every variant renders a fixed message; anything more
/// specific belongs in the logs.
#[derive(Debug)]
pub enum ApiError {
    DuplicateIdentifier,
    InvalidCredentials,
    Unauthenticated,
    Forbidden { required: Vec<String> },
    NotFound { code: &'static str },
    BadRequest { code: &'static str, message: Option<String> },
    Internal { trace_id: Option<Uuid> },
}

impl ApiError {
    /// Logs `err` under a fresh trace id and returns an opaque 500.
    pub fn internal<E: std::fmt::Display>(context: &'static str, err: E) -> Self {
        let trace_id = Uuid::new_v4();
        error!(%trace_id, context, error = %err, "internal error");
        Self::Internal {
            trace_id: Some(trace_id),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: Some(message.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::DuplicateIdentifier => StatusCode::CONFLICT,
            ApiError::InvalidCredentials | ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::DuplicateIdentifier => "duplicate_identifier",
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Forbidden { .. } => "forbidden",
            ApiError::NotFound { code } => *code,
            ApiError::BadRequest { code, .. } => *code,
            ApiError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let body = match self {
            ApiError::DuplicateIdentifier => ErrorBody {
                code: code.into(),
                message: "An account with this identifier already exists.".into(),
                required_roles: Vec::new(),
                trace_id: None,
            },
            ApiError::InvalidCredentials => ErrorBody {
                code: code.into(),
                message: "Invalid credentials. Please try again.".into(),
                required_roles: Vec::new(),
                trace_id: None,
            },
            ApiError::Unauthenticated => ErrorBody {
                code: code.into(),
                message: "Authentication required.".into(),
                required_roles: Vec::new(),
                trace_id: None,
            },
            ApiError::Forbidden { required } => ErrorBody {
                code: code.into(),
                message: "Insufficient role.".into(),
                required_roles: required,
                trace_id: None,
            },
            ApiError::NotFound { .. } => ErrorBody {
                code: code.into(),
                message: "Resource not found.".into(),
                required_roles: Vec::new(),
                trace_id: None,
            },
            ApiError::BadRequest { message, .. } => ErrorBody {
                code: code.into(),
                message: message.unwrap_or_else(|| "Bad request.".into()),
                required_roles: Vec::new(),
                trace_id: None,
            },
            ApiError::Internal { trace_id } => ErrorBody {
                code: code.into(),
                message: "Internal server error.".into(),
                required_roles: Vec::new(),
                trace_id,
            },
        };

        let mut resp = (status, Json(body)).into_response();
        resp.headers_mut()
            .insert(ERROR_CODE_HEADER, HeaderValue::from_static(code));
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

struct ErrorTelemetry {
    registry: Registry,
    http_errors_total: IntCounterVec,
    distinct_codes: IntGauge,
    overflow_total: IntCounter,
    seen: Mutex<HashSet<String>>,
}

static TELEMETRY: Lazy<ErrorTelemetry> = Lazy::new(|| {
    let registry = Registry::new();
    let http_errors_total = IntCounterVec::new(
        Opts::new(
            "http_errors_total",
            "Count of HTTP error responses emitted (status >= 400)",
        ),
        &["service", "code", "status"],
    )
    .expect("static metric definition");
    let distinct_codes = IntGauge::new(
        "http_error_codes_distinct",
        "Distinct error codes currently tracked as labels",
    )
    .expect("static metric definition");
    let overflow_total = IntCounter::new(
        "http_error_code_overflow_total",
        "Error responses whose code was folded into the overflow label",
    )
    .expect("static metric definition");
    let _ = registry.register(Box::new(http_errors_total.clone()));
    let _ = registry.register(Box::new(distinct_codes.clone()));
    let _ = registry.register(Box::new(overflow_total.clone()));
    ErrorTelemetry {
        registry,
        http_errors_total,
        distinct_codes,
        overflow_total,
        seen: Mutex::new(HashSet::new()),
    }
});

/// Registry holding the HTTP error counters, for merging into a `/metrics` response.
pub fn metrics_registry() -> &'static Registry {
    &TELEMETRY.registry
}

fn bounded_code_label(code: &str) -> String {
    let mut seen = match TELEMETRY.seen.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if seen.contains(code) {
        return code.to_string();
    }
    if seen.len() >= MAX_ERROR_CODES {
        TELEMETRY.overflow_total.inc();
        return OVERFLOW_CODE.to_string();
    }
    seen.insert(code.to_string());
    TELEMETRY.distinct_codes.set(seen.len() as i64);
    code.to_string()
}

fn record_error(service: &str, code: &str, status: StatusCode) {
    let label = bounded_code_label(code);
    TELEMETRY
        .http_errors_total
        .with_label_values(&[service, &label, status.as_str()])
        .inc();
}

type MiddlewareFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Middleware for `axum::middleware::from_fn` counting every response with
/// status >= 400, labelled by its `X-Error-Code` header.
pub fn http_error_metrics_layer(
    service: &'static str,
) -> impl Fn(Request, Next) -> MiddlewareFuture + Clone + Send + Sync + 'static {
    move |req: Request, next: Next| {
        Box::pin(async move {
            let resp = next.run(req).await;
            let status = resp.status();
            if status.as_u16() >= 400 {
                let code = resp
                    .headers()
                    .get(ERROR_CODE_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("unlabelled")
                    .to_string();
                record_error(service, &code, status);
            }
            resp
        })
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use super::*;

    pub fn simulate_error_code(code: &str) {
        record_error("test", code, StatusCode::BAD_REQUEST);
    }

    pub fn distinct_gauge() -> i64 {
        TELEMETRY.distinct_codes.get()
    }

    pub fn overflow_count() -> u64 {
        TELEMETRY.overflow_total.get()
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::{distinct_gauge, overflow_count, simulate_error_code};
    use super::*;

    #[test]
    fn distinct_codes_are_capped_and_overflow_counted() {
        for i in 0..5 {
            simulate_error_code(&format!("code_{i}"));
        }
        assert!(distinct_gauge() >= 5, "expected at least 5 distinct codes");
        let before_overflow = overflow_count();

        for i in 5..60 {
            simulate_error_code(&format!("code_{i}"));
        }
        assert!(distinct_gauge() as usize <= MAX_ERROR_CODES);
        assert!(overflow_count() > before_overflow);
    }

    #[test]
    fn codes_match_taxonomy() {
        assert_eq!(ApiError::DuplicateIdentifier.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::NotFound { code: "user_not_found" }.code(),
            "user_not_found"
        );
    }
}
