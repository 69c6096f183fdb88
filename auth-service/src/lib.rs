pub mod admin_handlers;
pub mod app;
pub mod config;
pub mod data_handlers;
pub mod metrics;
pub mod password;
pub mod store;
pub mod tokens;
pub mod user_handlers;

pub use app::{router, AppState};
