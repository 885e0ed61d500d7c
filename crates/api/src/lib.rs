//! HTTP API layer with Axum routes.
//!
//! This crate provides:
//! - REST API routes for users, transactions and settlement
//! - JSON error responses
//! - Request and response types

pub mod error;
pub mod routes;

use std::time::Duration;

use axum::Router;
use axum::http::{HeaderName, StatusCode};
use sea_orm::DatabaseConnection;
use tally_db::{LedgerRepository, UserRepository};
use tally_shared::config::LedgerConfig;
use tally_shared::types::PageRequest;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ErrorResponse};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Ledger operations.
    pub ledger: LedgerRepository,
    /// User lookups.
    pub users: UserRepository,
    /// Page size defaults for list endpoints.
    pub paging: Paging,
}

impl AppState {
    /// Builds the state from a connection and the ledger settings.
    #[must_use]
    pub fn new(db: DatabaseConnection, config: &LedgerConfig) -> Self {
        Self {
            ledger: LedgerRepository::new(db.clone()).with_max_retries(config.max_retries),
            users: UserRepository::new(db),
            paging: Paging {
                default_page_size: config.default_page_size,
                max_page_size: config.max_page_size,
            },
        }
    }
}

/// Page size defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    /// Page size used when the request gives none.
    pub default_page_size: u32,
    /// Largest page size a request may ask for.
    pub max_page_size: u32,
}

impl Paging {
    /// Builds a page request from optional query values.
    #[must_use]
    pub fn request(&self, page: Option<u32>, per_page: Option<u32>) -> PageRequest {
        PageRequest::new(
            page.unwrap_or(1),
            per_page.unwrap_or(self.default_page_size),
        )
        .clamped(self.max_page_size)
    }
}

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Creates the main application router.
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
