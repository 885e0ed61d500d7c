//! JSON error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tally_core::ledger::{LedgerError, SettlementFailure};
use tally_shared::AppError;
use tracing::error;

/// Message returned in place of internal error details.
const INTERNAL_MESSAGE: &str = "An error occurred";

/// Error returned by route handlers.
#[derive(Debug)]
pub enum ApiError {
    /// A ledger operation failed.
    Ledger(LedgerError),
    /// Any other application failure.
    App(AppError),
}

/// JSON body of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Per-item failures of a batch settlement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<Vec<SettlementFailure>>,
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::App(AppError::Database(err.to_string()))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        let code = match self {
            Self::Ledger(err) => err.http_status_code(),
            Self::App(err) => err.status_code(),
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn body(self) -> ErrorResponse {
        match self {
            Self::Ledger(err) => {
                let error = err.error_code();
                let message = err.to_string();
                let failures = match err {
                    LedgerError::BatchSettlementFailed { failures } => Some(failures),
                    _ => None,
                };
                ErrorResponse {
                    error,
                    message,
                    failures,
                }
            }
            Self::App(err) => ErrorResponse {
                error: err.error_code(),
                message: err.to_string(),
                failures: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = self.body();
        if status.is_server_error() {
            error!(code = body.error, error = %body.message, "request failed");
            body.message = INTERNAL_MESSAGE.to_string();
        }
        (status, Json(body)).into_response()
    }
}
