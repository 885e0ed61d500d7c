//! Batch settlement of pending Deferred transactions.

use tracing::{info, warn};

use super::engine::LedgerEngine;
use super::error::LedgerError;
use super::store::LedgerScope;
use super::types::{BatchSettleReport, SettlementFailure};

/// Settles every eligible Deferred transaction in one scope.
pub struct SettlementProcessor;

impl SettlementProcessor {
    /// Settles all pending Deferred transactions that have no Cancellation,
    /// oldest first.
    ///
    /// Each item runs under its own savepoint. A failing item is rolled back
    /// to its savepoint and reported; the others still settle. Running the
    /// batch again after a successful pass finds nothing to do.
    ///
    /// # Errors
    ///
    /// Returns `BatchSettlementFailed` when nothing settled and at least one
    /// item failed. Retryable store errors abort the batch immediately so the
    /// caller can retry the whole scope.
    pub async fn batch_settle<S>(scope: &mut S) -> Result<BatchSettleReport, LedgerError>
    where
        S: LedgerScope + ?Sized,
    {
        let candidates = scope.settlement_candidates().await?;
        let mut report = BatchSettleReport {
            total: candidates.len(),
            ..BatchSettleReport::default()
        };

        for (index, tx) in candidates.into_iter().enumerate() {
            let savepoint = format!("batch_settle_{index}");
            let id = tx.id;
            scope.savepoint(&savepoint).await?;

            match LedgerEngine::settle_pending(scope, tx).await {
                Ok(_) => {
                    scope.release_savepoint(&savepoint).await?;
                    report.succeeded += 1;
                }
                Err(err) if err.is_retryable() => return Err(err),
                Err(err) => {
                    scope.rollback_to_savepoint(&savepoint).await?;
                    warn!(transaction_id = %id, error = %err, "batch settlement item failed");
                    report.failures.push(SettlementFailure {
                        id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if report.succeeded == 0 && !report.failures.is_empty() {
            return Err(LedgerError::BatchSettlementFailed {
                failures: report.failures,
            });
        }

        info!(
            succeeded = report.succeeded,
            total = report.total,
            failed = report.failures.len(),
            "batch settlement finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[path = "settlement_tests.rs"]
mod tests;
