use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, Json};
use serde_json::Value;

use crate::AppState;

const CATALOG_JSON: &str = include_str!("../data/catalog.json");

/// Parses the document bundled with the binary.
pub fn load_catalog() -> Result<Arc<Value>> {
    let value = serde_json::from_str(CATALOG_JSON).context("Bundled catalog is not valid JSON")?;
    Ok(Arc::new(value))
}

pub async fn catalog(State(state): State<AppState>) -> Json<Value> {
    Json(state.catalog.as_ref().clone())
}
