//! API route definitions.

use axum::Router;
use serde::Deserialize;

use crate::AppState;

pub mod health;
pub mod settlement;
pub mod transactions;
pub mod users;

/// Creates the API router with all routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(users::routes())
        .merge(transactions::routes())
        .merge(settlement::routes())
}

/// Query parameters shared by list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Page number (1-indexed).
    pub page: Option<u32>,
    /// Page size, capped by the configured maximum.
    #[serde(alias = "limit")]
    pub per_page: Option<u32>,
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
