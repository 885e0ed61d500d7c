//! Initial database migration.
//!
//! Creates the ledger enums and tables and seeds the transaction type catalog.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: TABLES
        // ============================================================
        db.execute_unprepared(USERS_SQL).await?;
        db.execute_unprepared(TRANSACTION_TYPES_SQL).await?;
        db.execute_unprepared(TRANSACTIONS_SQL).await?;
        db.execute_unprepared(TRANSACTION_LOGS_SQL).await?;

        // ============================================================
        // PART 3: SEED DATA
        // ============================================================
        db.execute_unprepared(SEED_TRANSACTION_TYPES_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
CREATE TYPE transaction_kind AS ENUM ('direct', 'deferred', 'cancellation');

CREATE TYPE transaction_status AS ENUM ('pending', 'settled');
";

const USERS_SQL: &str = r"
CREATE TABLE users (
    id UUID PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    balance NUMERIC(20, 4) NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";

const TRANSACTION_TYPES_SQL: &str = r"
CREATE TABLE transaction_types (
    id INTEGER PRIMARY KEY,
    name VARCHAR(100) NOT NULL UNIQUE,
    kind transaction_kind NOT NULL
);
";

const TRANSACTIONS_SQL: &str = r"
CREATE TABLE transactions (
    id UUID PRIMARY KEY,
    sender_id UUID NOT NULL REFERENCES users(id),
    receiver_id UUID NOT NULL REFERENCES users(id),
    type_id INTEGER NOT NULL REFERENCES transaction_types(id),
    amount NUMERIC(20, 4) NOT NULL,
    counter_transaction_id UUID REFERENCES transactions(id),
    note TEXT,
    status transaction_status NOT NULL DEFAULT 'pending',
    sender_balance_after NUMERIC(20, 4),
    receiver_balance_after NUMERIC(20, 4),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_amount_not_negative CHECK (amount >= 0),
    CONSTRAINT chk_distinct_parties CHECK (sender_id <> receiver_id)
);

-- At most one cancellation per deferred transaction
CREATE UNIQUE INDEX idx_transactions_counter
    ON transactions(counter_transaction_id)
    WHERE counter_transaction_id IS NOT NULL;

CREATE INDEX idx_transactions_sender ON transactions(sender_id);
CREATE INDEX idx_transactions_receiver ON transactions(receiver_id);
CREATE INDEX idx_transactions_created ON transactions(created_at DESC, id DESC);
CREATE INDEX idx_transactions_pending ON transactions(type_id, created_at)
    WHERE status = 'pending';
";

const TRANSACTION_LOGS_SQL: &str = r"
CREATE TABLE transaction_logs (
    id UUID PRIMARY KEY,
    transaction_id UUID NOT NULL,
    sender_balance_after NUMERIC(20, 4) NOT NULL,
    receiver_balance_after NUMERIC(20, 4) NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_transaction_logs_transaction
    ON transaction_logs(transaction_id, recorded_at);
";

const SEED_TRANSACTION_TYPES_SQL: &str = r"
INSERT INTO transaction_types (id, name, kind) VALUES
    (1, 'direct', 'direct'),
    (2, 'deferred', 'deferred'),
    (3, 'cancellation', 'cancellation');
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS transaction_logs CASCADE;
DROP TABLE IF EXISTS transactions CASCADE;
DROP TABLE IF EXISTS transaction_types CASCADE;
DROP TABLE IF EXISTS users CASCADE;

DROP TYPE IF EXISTS transaction_status;
DROP TYPE IF EXISTS transaction_kind;
";
