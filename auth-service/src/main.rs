use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use auth_service::config::{load_service_config, ServiceConfig};
use auth_service::data_handlers::load_catalog;
use auth_service::metrics::AuthMetrics;
use auth_service::store::{CredentialStore, InMemoryCredentialStore, PgCredentialStore};
use auth_service::tokens::{TokenConfig, TokenSigner};
use auth_service::{router, AppState};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use common_auth::{JwtConfig, JwtVerifier};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

async fn build_store(config: &ServiceConfig) -> Result<Arc<dyn CredentialStore>> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .acquire_timeout(Duration::from_secs(5))
                .connect(url)
                .await
                .context("Failed to connect to DATABASE_URL")?;
            let store = PgCredentialStore::new(pool);
            store
                .migrate()
                .await
                .context("Failed to apply users migration")?;
            info!("using Postgres credential store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set; accounts are kept in memory and lost on restart");
            Ok(Arc::new(InMemoryCredentialStore::new()))
        }
    }
}

fn build_cors(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("Invalid CORS origin '{origin}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION]))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = load_service_config()?;
    let secret = config.jwt_secret.as_bytes();

    let jwt_config = JwtConfig::new(config.jwt_issuer.clone(), config.jwt_audience.clone())
        .with_leeway(config.leeway_seconds);
    let jwt_verifier = JwtVerifier::new(jwt_config, secret);

    let token_signer = TokenSigner::new(
        secret,
        TokenConfig {
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            ttl_seconds: config.token_ttl_seconds,
        },
    )?;

    let state = AppState {
        store: build_store(&config).await?,
        jwt_verifier: Arc::new(jwt_verifier),
        token_signer: Arc::new(token_signer),
        metrics: Arc::new(AuthMetrics::new()?),
        catalog: load_catalog()?,
    };

    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors(&config.allowed_origins)?);

    let addr = config.bind_addr();
    info!(%addr, "starting auth-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
