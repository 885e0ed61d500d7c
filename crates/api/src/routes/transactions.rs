//! Transaction routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_core::ledger::{
    AuditEntry, CreateTransactionInput, DeleteOutcome, LedgerError, Transaction,
    TransactionType, UpdateTransactionInput, parse_amount,
};
use tally_shared::types::{PageResponse, TransactionId, TransactionTypeId, UserId};
use tracing::info;
use uuid::Uuid;

use super::ListQuery;
use crate::{ApiError, AppState};

/// Creates the transaction routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/transaction-types", get(list_transaction_types))
        .route("/transactions", get(list_transactions).post(create_transaction))
        .route("/transactions/batch", post(create_transactions))
        .route(
            "/transactions/{id}",
            get(get_transaction)
                .patch(update_transaction)
                .delete(delete_transaction),
        )
        .route("/transactions/{id}/audit", get(list_audit_entries))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// An amount sent as a decimal string or a plain JSON number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountField {
    /// `"12.50"`
    Text(String),
    /// `12.5`
    Number(serde_json::Number),
}

impl AmountField {
    /// Parses the amount.
    pub fn parse(&self) -> Result<Decimal, LedgerError> {
        match self {
            Self::Text(text) => parse_amount(text),
            Self::Number(number) => parse_amount(&number.to_string()),
        }
    }
}

/// Request body for creating a transaction.
#[derive(Debug, Default, Deserialize)]
pub struct CreateTransactionRequest {
    /// Paying user.
    pub sender_id: Option<Uuid>,
    /// Receiving user.
    pub receiver_id: Option<Uuid>,
    /// Catalog type.
    pub type_id: Option<i32>,
    /// Points to move.
    pub amount: Option<AmountField>,
    /// Deferred transaction a cancellation reverses.
    pub counter_transaction_id: Option<Uuid>,
    /// Free text.
    pub note: Option<String>,
}

impl CreateTransactionRequest {
    /// Checks required fields and parses the amount.
    pub fn into_input(self) -> Result<CreateTransactionInput, LedgerError> {
        let sender_id = self.sender_id.ok_or(LedgerError::MissingField("sender_id"))?;
        let receiver_id = self
            .receiver_id
            .ok_or(LedgerError::MissingField("receiver_id"))?;
        let type_id = self.type_id.ok_or(LedgerError::MissingField("type_id"))?;
        let amount = self
            .amount
            .ok_or(LedgerError::MissingField("amount"))?
            .parse()?;

        Ok(CreateTransactionInput {
            sender_id: UserId::from_uuid(sender_id),
            receiver_id: UserId::from_uuid(receiver_id),
            type_id: TransactionTypeId(type_id),
            amount,
            counter_transaction_id: self.counter_transaction_id.map(TransactionId::from_uuid),
            note: self.note,
        })
    }
}

/// Request body for creating several transactions at once.
#[derive(Debug, Deserialize)]
pub struct CreateTransactionsRequest {
    /// Transactions to create, in order.
    #[serde(default)]
    pub transactions: Vec<CreateTransactionRequest>,
}

/// Request body for updating a transaction. Absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTransactionRequest {
    /// New paying user.
    pub sender_id: Option<Uuid>,
    /// New receiving user.
    pub receiver_id: Option<Uuid>,
    /// New catalog type.
    pub type_id: Option<i32>,
    /// New amount.
    pub amount: Option<AmountField>,
    /// New note.
    pub note: Option<String>,
}

impl UpdateTransactionRequest {
    /// Parses the amount if one was sent.
    pub fn into_input(self) -> Result<UpdateTransactionInput, LedgerError> {
        let amount = self.amount.as_ref().map(AmountField::parse).transpose()?;
        Ok(UpdateTransactionInput {
            sender_id: self.sender_id.map(UserId::from_uuid),
            receiver_id: self.receiver_id.map(UserId::from_uuid),
            type_id: self.type_id.map(TransactionTypeId),
            amount,
            note: self.note,
        })
    }
}

/// Response for a transaction.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: Uuid,
    /// Paying user.
    pub sender_id: Uuid,
    /// Receiving user.
    pub receiver_id: Uuid,
    /// Catalog type.
    pub type_id: i32,
    /// Kind resolved from the type.
    pub kind: &'static str,
    /// Amount.
    pub amount: String,
    /// Referenced deferred transaction.
    pub counter_transaction_id: Option<Uuid>,
    /// Note.
    pub note: Option<String>,
    /// Status.
    pub status: &'static str,
    /// Sender balance after the effect was applied.
    pub sender_balance_after: Option<String>,
    /// Receiver balance after the effect was applied.
    pub receiver_balance_after: Option<String>,
    /// Created at timestamp.
    pub created_at: String,
    /// Updated at timestamp.
    pub updated_at: String,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id.into_inner(),
            sender_id: tx.sender_id.into_inner(),
            receiver_id: tx.receiver_id.into_inner(),
            type_id: tx.type_id.into_inner(),
            kind: tx.kind.as_str(),
            amount: tx.amount.to_string(),
            counter_transaction_id: tx.counter_transaction_id.map(TransactionId::into_inner),
            note: tx.note,
            status: tx.status.as_str(),
            sender_balance_after: tx.sender_balance_after.map(|b| b.to_string()),
            receiver_balance_after: tx.receiver_balance_after.map(|b| b.to_string()),
            created_at: tx.created_at.to_rfc3339(),
            updated_at: tx.updated_at.to_rfc3339(),
        }
    }
}

/// Response for a batch create.
#[derive(Debug, Serialize)]
pub struct CreateTransactionsResponse {
    /// Created transactions, in request order.
    pub transactions: Vec<TransactionResponse>,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET `/transaction-types` - The type catalog.
async fn list_transaction_types(
    State(state): State<AppState>,
) -> Result<Json<Vec<TransactionType>>, ApiError> {
    Ok(Json(state.ledger.list_transaction_types().await?))
}

/// GET `/transactions` - All transactions, newest first.
async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PageResponse<TransactionResponse>>, ApiError> {
    let page = state.paging.request(query.page, query.per_page);
    let result = state.ledger.list_transactions(page).await?;
    Ok(Json(result.map(TransactionResponse::from)))
}

/// POST `/transactions` - Create a transaction.
async fn create_transaction(
    State(state): State<AppState>,
    Json(payload): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let input = payload.into_input()?;
    let tx = state.ledger.create(input).await?;
    info!(transaction_id = %tx.id, kind = %tx.kind, "Transaction created");
    Ok((StatusCode::CREATED, Json(tx.into())))
}

/// POST `/transactions/batch` - Create several transactions, all or none.
async fn create_transactions(
    State(state): State<AppState>,
    Json(payload): Json<CreateTransactionsRequest>,
) -> Result<(StatusCode, Json<CreateTransactionsResponse>), ApiError> {
    if payload.transactions.is_empty() {
        return Err(LedgerError::EmptyBatch.into());
    }
    let inputs = payload
        .transactions
        .into_iter()
        .map(CreateTransactionRequest::into_input)
        .collect::<Result<Vec<_>, _>>()?;

    let created = state.ledger.create_many(inputs).await?;
    info!(count = created.len(), "Transactions created");
    Ok((
        StatusCode::CREATED,
        Json(CreateTransactionsResponse {
            transactions: created.into_iter().map(TransactionResponse::from).collect(),
        }),
    ))
}

/// GET `/transactions/{id}` - Get a transaction.
async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<TransactionId>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let tx = state.ledger.get_transaction(id).await?;
    Ok(Json(tx.into()))
}

/// PATCH `/transactions/{id}` - Update a transaction.
async fn update_transaction(
    State(state): State<AppState>,
    Path(id): Path<TransactionId>,
    Json(payload): Json<UpdateTransactionRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let input = payload.into_input()?;
    let tx = state.ledger.update(id, input).await?;
    info!(transaction_id = %tx.id, "Transaction updated");
    Ok(Json(tx.into()))
}

/// DELETE `/transactions/{id}` - Delete a transaction and its cancellation.
async fn delete_transaction(
    State(state): State<AppState>,
    Path(id): Path<TransactionId>,
) -> Result<Json<DeleteOutcome>, ApiError> {
    let outcome = state.ledger.delete(id).await?;
    info!(
        transaction_id = %id,
        balances_reverted = outcome.balances_reverted,
        "Transaction deleted"
    );
    Ok(Json(outcome))
}

/// GET `/transactions/{id}/audit` - Balance history of a transaction.
async fn list_audit_entries(
    State(state): State<AppState>,
    Path(id): Path<TransactionId>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    Ok(Json(state.ledger.list_audit_entries(id).await?))
}
