//! Ledger repository: runs engine operations inside Postgres scopes.
//!
//! Each mutating call opens a [`PgLedgerScope`], runs the engine against it
//! and commits. A retryable failure (serialization or deadlock) rolls the
//! scope back and runs the whole operation again, up to `max_retries` times.

use futures::future::BoxFuture;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use tally_core::ledger::{
    AuditEntry, BatchSettleReport, CreateTransactionInput, DeleteOutcome, LedgerEngine,
    LedgerError, SettlementProcessor, Transaction, TransactionType, UpdateTransactionInput,
};
use tally_shared::types::{PageRequest, PageResponse, TransactionId, UserId};
use tracing::{debug, warn};

use super::conversion::{TypeCatalog, audit_to_core, map_db_err};
use super::scope::PgLedgerScope;
use crate::entities::{transaction_logs, transactions, users};

/// Default number of retries after a serialization failure.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Ledger repository.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    db: DatabaseConnection,
    max_retries: u32,
}

impl LedgerRepository {
    /// Creates a new ledger repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Sets how often a scope is retried after a serialization failure.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Runs `operation` in a fresh scope, committing on success.
    async fn run<T, F>(&self, name: &'static str, operation: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'s> Fn(&'s mut PgLedgerScope) -> BoxFuture<'s, Result<T, LedgerError>> + Sync,
    {
        let mut attempt: u32 = 0;
        loop {
            let mut scope = PgLedgerScope::begin(&self.db).await?;
            let result = match operation(&mut scope).await {
                Ok(value) => scope.commit().await.map(|()| value),
                Err(err) => {
                    if let Err(rollback_err) = scope.rollback().await {
                        warn!(operation = name, error = %rollback_err, "rollback failed");
                    }
                    Err(err)
                }
            };

            match result {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(operation = name, attempt, error = %err, "retrying ledger operation");
                }
                other => return other,
            }
        }
    }

    /// Creates a transaction.
    ///
    /// # Errors
    ///
    /// Returns the engine's validation, lookup and conflict errors.
    pub async fn create(&self, input: CreateTransactionInput) -> Result<Transaction, LedgerError> {
        self.run("create", |scope| {
            Box::pin(LedgerEngine::create(scope, input.clone()))
        })
        .await
    }

    /// Creates several transactions in one scope. All or none are stored.
    ///
    /// # Errors
    ///
    /// Returns the first failing item's error.
    pub async fn create_many(
        &self,
        inputs: Vec<CreateTransactionInput>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        self.run("create_many", |scope| {
            Box::pin(LedgerEngine::create_many(scope, inputs.clone()))
        })
        .await
    }

    /// Updates a transaction.
    ///
    /// # Errors
    ///
    /// Returns the engine's validation, lookup and conflict errors.
    pub async fn update(
        &self,
        id: TransactionId,
        input: UpdateTransactionInput,
    ) -> Result<Transaction, LedgerError> {
        self.run("update", |scope| {
            Box::pin(LedgerEngine::update(scope, id, input.clone()))
        })
        .await
    }

    /// Deletes a transaction and its cancellation.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound` or `CancellationImmutable`.
    pub async fn delete(&self, id: TransactionId) -> Result<DeleteOutcome, LedgerError> {
        self.run("delete", |scope| Box::pin(LedgerEngine::delete(scope, id)))
            .await
    }

    /// Settles one deferred transaction.
    ///
    /// # Errors
    ///
    /// Returns `NotSettleable`, `AlreadySettled` or `AlreadyCancelled`.
    pub async fn settle(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        self.run("settle", |scope| Box::pin(LedgerEngine::settle(scope, id)))
            .await
    }

    /// Settles every eligible deferred transaction.
    ///
    /// # Errors
    ///
    /// Returns `BatchSettlementFailed` when no candidate could be settled.
    pub async fn batch_settle(&self) -> Result<BatchSettleReport, LedgerError> {
        self.run("batch_settle", |scope| {
            Box::pin(SettlementProcessor::batch_settle(scope))
        })
        .await
    }

    /// Gets a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound` if it does not exist.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        let catalog = TypeCatalog::load(&self.db).await.map_err(map_db_err)?;
        let model = transactions::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or(LedgerError::TransactionNotFound(id))?;
        catalog.transaction(model)
    }

    /// Lists all transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_transactions(
        &self,
        page: PageRequest,
    ) -> Result<PageResponse<Transaction>, LedgerError> {
        self.list_where(Condition::all(), page).await
    }

    /// Lists the transactions a user sent or received, newest first.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if the user does not exist.
    pub async fn list_user_transactions(
        &self,
        user: UserId,
        page: PageRequest,
    ) -> Result<PageResponse<Transaction>, LedgerError> {
        let exists = users::Entity::find_by_id(user.into_inner())
            .count(&self.db)
            .await
            .map_err(map_db_err)?;
        if exists == 0 {
            return Err(LedgerError::UserNotFound(user));
        }

        let involved = Condition::any()
            .add(transactions::Column::SenderId.eq(user.into_inner()))
            .add(transactions::Column::ReceiverId.eq(user.into_inner()));
        self.list_where(involved, page).await
    }

    async fn list_where(
        &self,
        condition: Condition,
        page: PageRequest,
    ) -> Result<PageResponse<Transaction>, LedgerError> {
        let catalog = TypeCatalog::load(&self.db).await.map_err(map_db_err)?;

        let query = transactions::Entity::find().filter(condition);
        let total = query.clone().count(&self.db).await.map_err(map_db_err)?;
        let rows = query
            .order_by_desc(transactions::Column::CreatedAt)
            .order_by_desc(transactions::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(map_db_err)?;
        debug!(total, returned = rows.len(), "listed transactions");

        let data = rows
            .into_iter()
            .map(|model| catalog.transaction(model))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PageResponse::new(data, page.page, page.per_page, total))
    }

    /// Lists the audit trail of a transaction, oldest first.
    ///
    /// Entries outlive the transaction, so a deleted transaction still has
    /// its trail.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_audit_entries(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<AuditEntry>, LedgerError> {
        let rows = transaction_logs::Entity::find()
            .filter(transaction_logs::Column::TransactionId.eq(transaction_id.into_inner()))
            .order_by_asc(transaction_logs::Column::RecordedAt)
            .order_by_asc(transaction_logs::Column::Id)
            .all(&self.db)
            .await
            .map_err(map_db_err)?;
        Ok(rows.into_iter().map(audit_to_core).collect())
    }

    /// Lists the transaction type catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_transaction_types(&self) -> Result<Vec<TransactionType>, LedgerError> {
        let catalog = TypeCatalog::load(&self.db).await.map_err(map_db_err)?;
        Ok(catalog.all())
    }
}
