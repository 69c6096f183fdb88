use anyhow::{anyhow, Context, Result};
use std::env;
use std::net::{IpAddr, SocketAddr};

const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: IpAddr,
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub token_ttl_seconds: i64,
    pub leeway_seconds: u32,
    pub allowed_origins: Vec<String>,
}

impl ServiceConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

pub fn load_service_config() -> Result<ServiceConfig> {
    let host = env::var("HOST")
        .unwrap_or_else(|_| "0.0.0.0".to_string())
        .parse::<IpAddr>()
        .context("Failed to parse HOST")?;
    let port = parse_from_env("PORT", 8085u16)?;

    let database_url = env::var("DATABASE_URL")
        .ok()
        .and_then(|value| normalize_optional(&value));
    let database_max_connections = parse_from_env("DATABASE_MAX_CONNECTIONS", 5u32)?;

    let jwt_secret = env::var("JWT_SECRET")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .ok_or_else(|| anyhow!("JWT_SECRET must be set"))?;
    let allow_weak = bool_from_env("AUTH_ALLOW_WEAK_SECRET").unwrap_or(false);
    validate_secret(&jwt_secret, allow_weak)?;

    let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "auth-service".to_string());
    let jwt_audience = env::var("JWT_AUDIENCE").unwrap_or_else(|_| "auth-api".to_string());
    let token_ttl_seconds = parse_from_env("JWT_TTL_SECONDS", 3600i64)?;
    if token_ttl_seconds <= 0 {
        return Err(anyhow!("JWT_TTL_SECONDS must be positive"));
    }
    let leeway_seconds = parse_from_env("JWT_LEEWAY_SECONDS", 0u32)?;

    let allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .map(|value| parse_list(&value))
        .unwrap_or_else(default_origins);

    Ok(ServiceConfig {
        host,
        port,
        database_url,
        database_max_connections,
        jwt_secret,
        jwt_issuer,
        jwt_audience,
        token_ttl_seconds,
        leeway_seconds,
        allowed_origins,
    })
}

fn validate_secret(secret: &str, allow_weak: bool) -> Result<()> {
    if secret.len() < MIN_SECRET_BYTES && !allow_weak {
        return Err(anyhow!(
            "JWT_SECRET must be at least {MIN_SECRET_BYTES} bytes (set AUTH_ALLOW_WEAK_SECRET=1 to override)"
        ));
    }
    Ok(())
}

fn parse_from_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow!("Failed to parse {key}='{value}': {err}")),
        Err(_) => Ok(default),
    }
}

fn bool_from_env(key: &str) -> Option<bool> {
    env::var(key).ok().map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(|c| c == ',' || c == ';' || c == ' ')
        .filter_map(normalize_optional)
        .collect()
}

fn default_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_from_env_parses() {
        std::env::set_var("TEST_AUTH_BOOL_TRUE", "true");
        std::env::set_var("TEST_AUTH_BOOL_ONE", "1");
        std::env::set_var("TEST_AUTH_BOOL_FALSE", "no");
        assert_eq!(bool_from_env("TEST_AUTH_BOOL_TRUE"), Some(true));
        assert_eq!(bool_from_env("TEST_AUTH_BOOL_ONE"), Some(true));
        assert_eq!(bool_from_env("TEST_AUTH_BOOL_FALSE"), Some(false));
        assert_eq!(bool_from_env("TEST_AUTH_BOOL_UNSET"), None);
    }

    #[test]
    fn parse_list_skips_blanks() {
        let origins = parse_list("http://a.test, ,http://b.test;");
        assert_eq!(origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn parse_from_env_reports_bad_values() {
        std::env::set_var("TEST_AUTH_PORT_BAD", "eighty");
        assert!(parse_from_env("TEST_AUTH_PORT_BAD", 80u16).is_err());
        assert_eq!(parse_from_env("TEST_AUTH_PORT_UNSET", 80u16).unwrap(), 80);
    }

    #[test]
    fn short_secret_needs_override() {
        assert!(validate_secret("short", false).is_err());
        assert!(validate_secret("short", true).is_ok());
        assert!(validate_secret(&"x".repeat(MIN_SECRET_BYTES), false).is_ok());
    }
}
