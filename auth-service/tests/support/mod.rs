#![allow(dead_code)]

use std::{env, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use auth_service::data_handlers::load_catalog;
use auth_service::metrics::AuthMetrics;
use auth_service::store::{CredentialStore, InMemoryCredentialStore, PgCredentialStore};
use auth_service::tokens::{TokenConfig, TokenSigner};
use auth_service::{router, AppState};
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use common_auth::{JwtConfig, JwtVerifier};
use dirs::cache_dir;
use http_body_util::BodyExt;
use pg_embed::pg_enums::PgAuthMethod;
use pg_embed::pg_fetch::{PgFetchSettings, PG_V13};
use pg_embed::postgres::{PgEmbed, PgSettings};
use portpicker::pick_unused_port;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt;

pub const TEST_SECRET: &[u8] = b"integration-test-secret-0123456789abcdef";
pub const TEST_ISSUER: &str = "test-issuer";
pub const TEST_AUDIENCE: &str = "test-audience";

pub fn token_config() -> TokenConfig {
    TokenConfig {
        issuer: TEST_ISSUER.to_string(),
        audience: TEST_AUDIENCE.to_string(),
        ttl_seconds: 900,
    }
}

pub fn test_verifier() -> JwtVerifier {
    JwtVerifier::new(JwtConfig::new(TEST_ISSUER, TEST_AUDIENCE), TEST_SECRET)
}

/// Router wired to an in-memory store the test can reach into.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryCredentialStore>,
    pub verifier: Arc<JwtVerifier>,
}

impl TestApp {
    pub fn new() -> Result<Self> {
        let store = Arc::new(InMemoryCredentialStore::new());
        let verifier = Arc::new(test_verifier());
        let state = app_state(store.clone(), verifier.clone())?;
        Ok(Self {
            router: router(state),
            store,
            verifier,
        })
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Result<(u16, Value)> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))?;
        let response = self.send(request).await?;
        split(response).await
    }

    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> Result<(u16, Value)> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = self.send(builder.body(Body::empty())?).await?;
        split(response).await
    }
}

pub fn app_state(store: Arc<dyn CredentialStore>, verifier: Arc<JwtVerifier>) -> Result<AppState> {
    Ok(AppState {
        store,
        jwt_verifier: verifier,
        token_signer: Arc::new(TokenSigner::new(TEST_SECRET, token_config())?),
        metrics: Arc::new(AuthMetrics::new()?),
        catalog: load_catalog()?,
    })
}

async fn split(response: Response) -> Result<(u16, Value)> {
    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await?.to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    Ok((status, json))
}

pub struct TestDatabase {
    pool: PgPool,
    embedded: Option<EmbeddedPg>,
}

impl TestDatabase {
    pub async fn setup() -> Result<Option<Self>> {
        if env::var("AUTH_TEST_DATABASE_URL").is_err() && !env_flag_enabled("AUTH_TEST_USE_EMBED") {
            eprintln!(
                "Skipping Postgres-backed tests: set AUTH_TEST_DATABASE_URL or AUTH_TEST_USE_EMBED=1 to run them.",
            );
            return Ok(None);
        }

        let mut embedded = None;
        let database_url = if let Ok(url) = env::var("AUTH_TEST_DATABASE_URL") {
            url
        } else {
            if env_flag_enabled("AUTH_TEST_EMBED_CLEAR_CACHE") {
                if let Some(cache_dir) = cache_dir() {
                    let _ = std::fs::remove_dir_all(cache_dir.join("pg-embed"));
                }
            }

            let temp = tempdir()?;
            let port = pick_unused_port()
                .context("failed to find available port for embedded Postgres")?;

            let mut fetch_settings = PgFetchSettings::default();
            fetch_settings.version = PG_V13;

            let mut pg = PgEmbed::new(
                PgSettings {
                    database_dir: temp.path().to_path_buf(),
                    port,
                    user: "postgres".to_string(),
                    password: "postgres".to_string(),
                    auth_method: PgAuthMethod::Plain,
                    persistent: false,
                    timeout: Some(Duration::from_secs(30)),
                    migration_dir: None,
                },
                fetch_settings,
            )
            .await?;

            pg.setup().await?;
            pg.start_db().await?;

            let uri = format!("{}/postgres", pg.db_uri);
            embedded = Some(EmbeddedPg {
                pg,
                _temp_dir: temp,
            });
            uri
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;

        PgCredentialStore::new(pool.clone()).migrate().await?;

        Ok(Some(Self { pool, embedded }))
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }

    pub async fn teardown(self) -> Result<()> {
        if let Some(embedded) = self.embedded {
            embedded.shutdown().await;
        }
        Ok(())
    }
}

struct EmbeddedPg {
    pg: PgEmbed,
    _temp_dir: TempDir,
}

impl EmbeddedPg {
    async fn shutdown(mut self) {
        let _ = self.pg.stop_db().await;
    }
}

fn env_flag_enabled(key: &str) -> bool {
    matches!(env::var(key), Ok(value) if is_truthy(value.as_str()))
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}
