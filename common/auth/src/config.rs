/// Runtime configuration for JWT verification.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Expected issuer claim (iss).
    pub issuer: String,
    /// Expected audience claim (aud).
    pub audience: String,
    /// Seconds past `exp` during which a token is still accepted.
    pub leeway_seconds: u32,
}

impl JwtConfig {
    /// Construct config with no expiry leeway.
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_seconds: 0,
        }
    }

    /// Adjust the allowed leeway.
    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }
}
