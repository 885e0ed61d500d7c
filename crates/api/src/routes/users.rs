//! User routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Serialize;
use tally_core::ledger::{LedgerError, UserBalance};
use tally_shared::types::{PageResponse, UserId};
use uuid::Uuid;

use super::ListQuery;
use super::transactions::TransactionResponse;
use crate::{ApiError, AppState};

/// Creates the user routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user))
        .route("/users/{id}/transactions", get(list_user_transactions))
}

/// Response for a user and their balance.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    /// User ID.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Current point balance.
    pub balance: String,
}

impl From<UserBalance> for UserResponse {
    fn from(user: UserBalance) -> Self {
        Self {
            id: user.id.into_inner(),
            name: user.name,
            balance: user.balance.to_string(),
        }
    }
}

/// GET `/users` - Users with their balances.
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PageResponse<UserResponse>>, ApiError> {
    let page = state.paging.request(query.page, query.per_page);
    let users = state.users.list(page).await?;
    Ok(Json(users.map(UserResponse::from)))
}

/// GET `/users/{id}` - One user's balance.
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or(LedgerError::UserNotFound(id))?;
    Ok(Json(user.into()))
}

/// GET `/users/{id}/transactions` - Transactions a user sent or received.
async fn list_user_transactions(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PageResponse<TransactionResponse>>, ApiError> {
    let page = state.paging.request(query.page, query.per_page);
    let result = state.ledger.list_user_transactions(id, page).await?;
    Ok(Json(result.map(TransactionResponse::from)))
}
