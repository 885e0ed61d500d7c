//! Settlement routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use tally_core::ledger::BatchSettleReport;
use tally_shared::types::TransactionId;
use tracing::info;

use super::transactions::TransactionResponse;
use crate::{ApiError, AppState};

/// Creates the settlement routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/transactions/settle", post(batch_settle))
        .route("/transactions/{id}/settle", post(settle_transaction))
}

/// POST `/transactions/{id}/settle` - Settle one deferred transaction.
async fn settle_transaction(
    State(state): State<AppState>,
    Path(id): Path<TransactionId>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let tx = state.ledger.settle(id).await?;
    info!(transaction_id = %id, "Transaction settled");
    Ok(Json(tx.into()))
}

/// POST `/transactions/settle` - Settle every eligible deferred transaction.
///
/// Items that fail are listed in the report; the rest stay committed.
async fn batch_settle(
    State(state): State<AppState>,
) -> Result<Json<BatchSettleReport>, ApiError> {
    let report = state.ledger.batch_settle().await?;
    info!(
        total = report.total,
        succeeded = report.succeeded,
        failed = report.failures.len(),
        "Batch settlement finished"
    );
    Ok(Json(report))
}
