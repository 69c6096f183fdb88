use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use common_auth::Role;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use uuid::Uuid;

pub struct TokenConfig {
    pub issuer: String,
    pub audience: String,
    pub ttl_seconds: i64,
}

pub struct TokenSigner {
    config: TokenConfig,
    encoding_key: EncodingKey,
}

pub struct TokenSubject {
    pub identifier: String,
    pub role: Role,
}

#[derive(Debug)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
    pub token_type: &'static str,
}

impl TokenSigner {
    pub fn new(secret: &[u8], config: TokenConfig) -> Result<Self> {
        if secret.is_empty() {
            return Err(anyhow!("No signing secret configured"));
        }
        if config.ttl_seconds <= 0 {
            return Err(anyhow!(
                "Token TTL must be positive, got {}",
                config.ttl_seconds
            ));
        }

        Ok(Self {
            config,
            encoding_key: EncodingKey::from_secret(secret),
        })
    }

    pub fn issue(&self, subject: TokenSubject) -> Result<IssuedToken> {
        self.issue_at(subject, Utc::now())
    }

    /// Signs a token whose `iat` is `now` and whose `exp` is `now + ttl`.
    pub fn issue_at(&self, subject: TokenSubject, now: DateTime<Utc>) -> Result<IssuedToken> {
        let expires_at = now + Duration::seconds(self.config.ttl_seconds);

        let claims = AccessClaims {
            sub: &subject.identifier,
            role: subject.role.as_str(),
            iss: &self.config.issuer,
            aud: &self.config.audience,
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| anyhow!("Failed to sign access token: {err}"))?;

        Ok(IssuedToken {
            access_token,
            expires_at,
            expires_in: self.config.ttl_seconds,
            token_type: "Bearer",
        })
    }
}

#[derive(Serialize)]
struct AccessClaims<'a> {
    sub: &'a str,
    role: &'a str,
    iss: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
    jti: String,
}
