use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};

/// Verifies HS256 tokens against the server-held secret.
#[derive(Clone)]
pub struct JwtVerifier {
    config: JwtConfig,
    key: DecodingKey,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig, secret: &[u8]) -> Self {
        Self {
            config,
            key: DecodingKey::from_secret(secret),
        }
    }

    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        self.verify_at(token, Utc::now())
    }

    /// Verifies `token` as of `now`. A token is accepted while
    /// `now <= exp + leeway` and rejected for any later instant.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<Claims> {
        let header =
            decode_header(token).map_err(|err| AuthError::InvalidHeader(err.to_string()))?;
        if header.alg != Algorithm::HS256 {
            return Err(AuthError::InvalidHeader(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.clone()]);
        validation.set_audience(&[self.config.audience.clone()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        // exp is compared against the caller's clock below
        validation.validate_exp = false;

        let token_data = decode::<Value>(token, &self.key, &validation)?;
        let claims = Claims::try_from(token_data.claims)?;

        let deadline = claims.expires_at + Duration::seconds(self.config.leeway_seconds.into());
        if now > deadline {
            return Err(AuthError::Expired);
        }

        debug!(subject = %claims.subject, role = %claims.role, "verified JWT successfully");
        Ok(claims)
    }
}
