pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod interceptor;
pub mod roles;
pub mod verifier;

pub use claims::Claims;
pub use config::JwtConfig;
pub use error::{AuthError, AuthResult};
pub use extractors::{authenticate, AuthContext};
pub use guards::{ensure_role, GuardError};
pub use interceptor::{enforce, BearerAuth, InterceptorChain, RequestInterceptor, RoleGate};
pub use roles::{Role, UnknownRole, ROLE_ADMIN, ROLE_USER};
pub use verifier::JwtVerifier;
