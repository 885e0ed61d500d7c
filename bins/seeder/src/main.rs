//! Database seeder for Tally development and testing.
//!
//! Seeds demo users with opening balances and a few transactions of each
//! kind, so the API has something to list right after `migrator up`.
//!
//! Usage: cargo run --bin seeder

use anyhow::Context;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tally_core::ledger::{CANCELLATION_TYPE, CreateTransactionInput, DEFERRED_TYPE, DIRECT_TYPE};
use tally_db::LedgerRepository;
use tally_db::entities::users;
use tally_shared::types::{TransactionTypeId, UserId};
use uuid::Uuid;

/// Demo users (fixed ids so reruns are idempotent).
const DEMO_USERS: [(u128, &str, Decimal); 3] = [
    (0x0001, "Alice", dec!(100)),
    (0x0002, "Bob", dec!(50)),
    (0x0003, "Carol", dec!(250)),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set in environment")?;

    println!("Connecting to database...");
    let db = tally_db::connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    println!("Seeding demo users...");
    let created = seed_users(&db).await?;

    if created {
        println!("Seeding demo transactions...");
        seed_transactions(&db).await?;
    } else {
        println!("  Demo users already exist, skipping transactions...");
    }

    println!("Seeding complete!");
    Ok(())
}

fn demo_user(index: usize) -> UserId {
    UserId::from_uuid(Uuid::from_u128(DEMO_USERS[index].0))
}

/// Inserts missing demo users. Returns true if any was created.
async fn seed_users(db: &DatabaseConnection) -> anyhow::Result<bool> {
    let mut created = false;
    for (id, name, balance) in DEMO_USERS {
        let id = Uuid::from_u128(id);
        if users::Entity::find_by_id(id).one(db).await?.is_some() {
            println!("  {name} already exists, skipping...");
            continue;
        }

        let now = Utc::now().into();
        users::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            balance: Set(balance),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;
        println!("  Created {name} with {balance} points");
        created = true;
    }
    Ok(created)
}

fn input(
    sender: usize,
    receiver: usize,
    type_id: TransactionTypeId,
    amount: Decimal,
    note: &str,
) -> CreateTransactionInput {
    CreateTransactionInput {
        sender_id: demo_user(sender),
        receiver_id: demo_user(receiver),
        type_id,
        amount,
        counter_transaction_id: None,
        note: Some(note.to_string()),
    }
}

/// Creates one transaction of each kind plus a pending deferred transfer.
async fn seed_transactions(db: &DatabaseConnection) -> anyhow::Result<()> {
    let ledger = LedgerRepository::new(db.clone());

    let direct = ledger
        .create(input(0, 1, DIRECT_TYPE, dec!(10), "Lunch"))
        .await?;
    println!("  Direct {}: Alice -> Bob 10", direct.id);

    let settled = ledger
        .create(input(2, 0, DEFERRED_TYPE, dec!(30), "Reward"))
        .await?;
    ledger.settle(settled.id).await?;
    println!("  Deferred {} settled", settled.id);

    let pending = ledger
        .create(input(1, 2, DEFERRED_TYPE, dec!(5), "Refund"))
        .await?;
    println!("  Deferred {} pending", pending.id);

    let cancelled = ledger
        .create(input(0, 2, DEFERRED_TYPE, dec!(15), "Voucher"))
        .await?;
    let cancellation = ledger
        .create(CreateTransactionInput {
            counter_transaction_id: Some(cancelled.id),
            ..input(0, 2, CANCELLATION_TYPE, Decimal::ZERO, "Voucher withdrawn")
        })
        .await?;
    println!("  Cancellation {} of {}", cancellation.id, cancelled.id);

    Ok(())
}
