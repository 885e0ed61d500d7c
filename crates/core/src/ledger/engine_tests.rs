use std::sync::Arc;

use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tally_shared::types::{TransactionId, TransactionTypeId, UserId};
use tokio::sync::Barrier;

use crate::ledger::{
    CANCELLATION_TYPE, CreateTransactionInput, DEFERRED_TYPE, DIRECT_TYPE, DeleteOutcome,
    InMemoryLedger, LedgerEngine, LedgerError, Transaction, TransactionKind, TransactionStatus,
    UpdateTransactionInput,
};

struct Fixture {
    ledger: InMemoryLedger,
    a: UserId,
    b: UserId,
}

async fn fixture() -> Fixture {
    let ledger = InMemoryLedger::new();
    let a = ledger.add_user("alice", dec!(100)).await;
    let b = ledger.add_user("bob", dec!(50)).await;
    Fixture { ledger, a, b }
}

fn input(
    type_id: TransactionTypeId,
    sender_id: UserId,
    receiver_id: UserId,
    amount: Decimal,
) -> CreateTransactionInput {
    CreateTransactionInput {
        sender_id,
        receiver_id,
        type_id,
        amount,
        counter_transaction_id: None,
        note: None,
    }
}

fn cancel(
    sender_id: UserId,
    receiver_id: UserId,
    amount: Decimal,
    counter: TransactionId,
) -> CreateTransactionInput {
    CreateTransactionInput {
        counter_transaction_id: Some(counter),
        ..input(CANCELLATION_TYPE, sender_id, receiver_id, amount)
    }
}

async fn create(
    ledger: &InMemoryLedger,
    input: CreateTransactionInput,
) -> Result<Transaction, LedgerError> {
    let mut scope = ledger.begin().await;
    let result = LedgerEngine::create(&mut scope, input).await;
    if result.is_ok() {
        scope.commit();
    }
    result
}

async fn update(
    ledger: &InMemoryLedger,
    id: TransactionId,
    input: UpdateTransactionInput,
) -> Result<Transaction, LedgerError> {
    let mut scope = ledger.begin().await;
    let result = LedgerEngine::update(&mut scope, id, input).await;
    if result.is_ok() {
        scope.commit();
    }
    result
}

async fn delete(ledger: &InMemoryLedger, id: TransactionId) -> Result<DeleteOutcome, LedgerError> {
    let mut scope = ledger.begin().await;
    let result = LedgerEngine::delete(&mut scope, id).await;
    if result.is_ok() {
        scope.commit();
    }
    result
}

async fn settle(ledger: &InMemoryLedger, id: TransactionId) -> Result<Transaction, LedgerError> {
    let mut scope = ledger.begin().await;
    let result = LedgerEngine::settle(&mut scope, id).await;
    if result.is_ok() {
        scope.commit();
    }
    result
}

async fn balances(f: &Fixture) -> (Decimal, Decimal) {
    (
        f.ledger.balance(f.a).await.unwrap(),
        f.ledger.balance(f.b).await.unwrap(),
    )
}

// ========== create ==========

#[tokio::test]
async fn test_direct_moves_points_from_sender_to_receiver() {
    let f = fixture().await;

    let tx = create(&f.ledger, input(DIRECT_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    assert_eq!(tx.kind, TransactionKind::Direct);
    assert_eq!(tx.status, TransactionStatus::Settled);
    assert_eq!(tx.sender_balance_after, Some(dec!(70)));
    assert_eq!(tx.receiver_balance_after, Some(dec!(80)));
    assert_eq!(balances(&f).await, (dec!(70), dec!(80)));

    let audit = f.ledger.audit_entries(tx.id).await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].sender_balance_after, dec!(70));
    assert_eq!(audit[0].receiver_balance_after, dec!(80));
}

#[tokio::test]
async fn test_direct_may_overdraw() {
    let f = fixture().await;
    create(&f.ledger, input(DIRECT_TYPE, f.b, f.a, dec!(80))).await.unwrap();
    assert_eq!(balances(&f).await, (dec!(180), dec!(-30)));
}

#[tokio::test]
async fn test_zero_amount_is_accepted() {
    let f = fixture().await;
    let tx = create(&f.ledger, input(DIRECT_TYPE, f.a, f.b, Decimal::ZERO)).await.unwrap();
    assert_eq!(tx.sender_balance_after, Some(dec!(100)));
    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
}

#[tokio::test]
async fn test_deferred_is_pending_and_moves_nothing() {
    let f = fixture().await;

    let tx = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.sender_balance_after, None);
    assert_eq!(tx.receiver_balance_after, None);
    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
    assert!(f.ledger.audit_entries(tx.id).await.is_empty());
}

#[tokio::test]
async fn test_create_rejects_invalid_input_without_side_effects() {
    let f = fixture().await;
    let stranger = UserId::new();

    let same = create(&f.ledger, input(DIRECT_TYPE, f.a, f.a, dec!(1))).await;
    assert!(matches!(same, Err(LedgerError::SameSenderReceiver)));

    let negative = create(&f.ledger, input(DIRECT_TYPE, f.a, f.b, dec!(-1))).await;
    assert!(matches!(negative, Err(LedgerError::NegativeAmount)));

    let unknown = create(&f.ledger, input(TransactionTypeId(42), f.a, f.b, dec!(1))).await;
    assert!(matches!(unknown, Err(LedgerError::UnknownTransactionType(TransactionTypeId(42)))));

    let missing = create(&f.ledger, input(DIRECT_TYPE, f.a, stranger, dec!(1))).await;
    assert!(matches!(missing, Err(LedgerError::UserNotFound(id)) if id == stranger));

    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
    assert!(f.ledger.transactions().await.is_empty());
}

#[tokio::test]
async fn test_amount_beyond_storable_range_is_rejected() {
    let f = fixture().await;

    let huge = create(&f.ledger, input(DIRECT_TYPE, f.b, f.a, Decimal::MAX - dec!(10))).await;
    assert!(matches!(huge, Err(LedgerError::InvalidAmount(_))));

    let limit = create(&f.ledger, input(DIRECT_TYPE, f.b, f.a, dec!(10000000000000000))).await;
    assert!(matches!(limit, Err(LedgerError::InvalidAmount(_))));

    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
    assert!(f.ledger.transactions().await.is_empty());
}

#[tokio::test]
async fn test_balance_leaving_storable_range_rolls_back() {
    let f = fixture().await;
    let rich = f.ledger.add_user("rich", dec!(9999999999999999)).await;

    let result = create(&f.ledger, input(DIRECT_TYPE, f.a, rich, dec!(1))).await;
    assert!(matches!(result, Err(LedgerError::BalanceOutOfRange(id)) if id == rich));

    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
    assert_eq!(f.ledger.balance(rich).await, Some(dec!(9999999999999999)));
    assert!(f.ledger.transactions().await.is_empty());
}

#[tokio::test]
async fn test_cancellation_request_must_be_well_formed() {
    let f = fixture().await;
    let deferred = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    let negative = create(&f.ledger, cancel(f.a, f.b, dec!(-1), deferred.id)).await;
    assert!(matches!(negative, Err(LedgerError::NegativeAmount)));

    let same = create(&f.ledger, cancel(f.a, f.a, dec!(30), deferred.id)).await;
    assert!(matches!(same, Err(LedgerError::SameSenderReceiver)));

    let cancellation = create(&f.ledger, cancel(f.b, f.a, dec!(0), deferred.id)).await.unwrap();
    assert_eq!(cancellation.amount, dec!(30));
    assert_eq!(cancellation.sender_id, f.a);
}

#[tokio::test]
async fn test_counter_reference_only_on_cancellations() {
    let f = fixture().await;
    let deferred = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    let mut direct = input(DIRECT_TYPE, f.a, f.b, dec!(5));
    direct.counter_transaction_id = Some(deferred.id);
    let result = create(&f.ledger, direct).await;
    assert!(matches!(result, Err(LedgerError::CounterTransactionNotAllowed)));

    let result = create(&f.ledger, input(CANCELLATION_TYPE, f.a, f.b, dec!(5))).await;
    assert!(matches!(result, Err(LedgerError::CounterTransactionRequired)));
}

// ========== settle ==========

#[tokio::test]
async fn test_settle_applies_deferred_exactly_once() {
    let f = fixture().await;
    let tx = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    let settled = settle(&f.ledger, tx.id).await.unwrap();
    assert_eq!(settled.status, TransactionStatus::Settled);
    assert_eq!(settled.sender_balance_after, Some(dec!(130)));
    assert_eq!(settled.receiver_balance_after, Some(dec!(20)));
    assert_eq!(balances(&f).await, (dec!(130), dec!(20)));

    let again = settle(&f.ledger, tx.id).await;
    assert!(matches!(again, Err(LedgerError::AlreadySettled(id)) if id == tx.id));
    assert_eq!(balances(&f).await, (dec!(130), dec!(20)));
    assert_eq!(f.ledger.audit_entries(tx.id).await.len(), 1);
}

#[tokio::test]
async fn test_settle_rejects_non_deferred() {
    let f = fixture().await;
    let tx = create(&f.ledger, input(DIRECT_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    let result = settle(&f.ledger, tx.id).await;
    assert!(matches!(result, Err(LedgerError::NotSettleable(_))));

    let result = settle(&f.ledger, TransactionId::new()).await;
    assert!(matches!(result, Err(LedgerError::TransactionNotFound(_))));
}

#[tokio::test]
async fn test_settle_failure_leaves_transaction_pending() {
    let f = fixture().await;
    let tx = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();
    f.ledger.remove_user(f.b).await;

    let result = settle(&f.ledger, tx.id).await;
    assert!(matches!(result, Err(LedgerError::UserNotFound(_))));

    let stored = f.ledger.transaction(tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
    assert_eq!(f.ledger.balance(f.a).await, Some(dec!(100)));
}

// ========== cancellation ==========

#[tokio::test]
async fn test_cancelling_settled_deferred_restores_balances() {
    let f = fixture().await;
    let deferred = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();
    settle(&f.ledger, deferred.id).await.unwrap();
    assert_eq!(balances(&f).await, (dec!(130), dec!(20)));

    // Requested parties and amount are ignored.
    let cancellation = create(&f.ledger, cancel(f.b, f.a, dec!(999), deferred.id))
        .await
        .unwrap();

    assert_eq!(cancellation.sender_id, f.a);
    assert_eq!(cancellation.receiver_id, f.b);
    assert_eq!(cancellation.amount, dec!(30));
    assert_eq!(cancellation.counter_transaction_id, Some(deferred.id));
    assert_eq!(cancellation.status, TransactionStatus::Settled);
    assert_eq!(cancellation.sender_balance_after, Some(dec!(100)));
    assert_eq!(cancellation.receiver_balance_after, Some(dec!(50)));
    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
    assert_eq!(f.ledger.audit_entries(cancellation.id).await.len(), 1);
}

#[tokio::test]
async fn test_cancelling_pending_deferred_moves_nothing_and_blocks_settlement() {
    let f = fixture().await;
    let deferred = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    let cancellation = create(&f.ledger, cancel(f.a, f.b, dec!(30), deferred.id)).await.unwrap();
    assert_eq!(cancellation.status, TransactionStatus::Pending);
    assert_eq!(cancellation.sender_balance_after, None);
    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
    assert!(f.ledger.audit_entries(cancellation.id).await.is_empty());

    let result = settle(&f.ledger, deferred.id).await;
    assert!(matches!(result, Err(LedgerError::AlreadyCancelled(id)) if id == deferred.id));
    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
}

#[tokio::test]
async fn test_cancellation_reference_checks() {
    let f = fixture().await;
    let direct = create(&f.ledger, input(DIRECT_TYPE, f.a, f.b, dec!(10))).await.unwrap();
    let deferred = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    let missing = TransactionId::new();
    let result = create(&f.ledger, cancel(f.a, f.b, dec!(1), missing)).await;
    assert!(matches!(result, Err(LedgerError::CounterTransactionNotFound(id)) if id == missing));

    let result = create(&f.ledger, cancel(f.a, f.b, dec!(1), direct.id)).await;
    assert!(matches!(result, Err(LedgerError::CounterNotDeferred(_))));

    create(&f.ledger, cancel(f.a, f.b, dec!(1), deferred.id)).await.unwrap();
    let result = create(&f.ledger, cancel(f.a, f.b, dec!(1), deferred.id)).await;
    assert!(matches!(result, Err(LedgerError::AlreadyCancelled(_))));
}

// ========== delete ==========

#[tokio::test]
async fn test_delete_direct_reverses_effect() {
    let f = fixture().await;
    let tx = create(&f.ledger, input(DIRECT_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    let outcome = delete(&f.ledger, tx.id).await.unwrap();

    assert_eq!(outcome.transaction_id, tx.id);
    assert_eq!(outcome.cancellation_id, None);
    assert!(outcome.balances_reverted);
    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
    assert!(f.ledger.transaction(tx.id).await.is_none());
    // Audit entries outlive the transaction.
    assert_eq!(f.ledger.audit_entries(tx.id).await.len(), 2);
}

#[tokio::test]
async fn test_delete_pending_deferred_moves_nothing() {
    let f = fixture().await;
    let tx = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    let outcome = delete(&f.ledger, tx.id).await.unwrap();

    assert!(!outcome.balances_reverted);
    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
    assert!(f.ledger.audit_entries(tx.id).await.is_empty());
}

#[tokio::test]
async fn test_delete_settled_deferred_reverses_settlement() {
    let f = fixture().await;
    let tx = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();
    settle(&f.ledger, tx.id).await.unwrap();

    delete(&f.ledger, tx.id).await.unwrap();

    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
}

#[tokio::test]
async fn test_delete_rejects_cancellation() {
    let f = fixture().await;
    let deferred = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();
    let cancellation = create(&f.ledger, cancel(f.a, f.b, dec!(30), deferred.id)).await.unwrap();

    let result = delete(&f.ledger, cancellation.id).await;
    assert!(matches!(result, Err(LedgerError::CancellationImmutable(_))));
    assert!(f.ledger.transaction(cancellation.id).await.is_some());

    let result = delete(&f.ledger, TransactionId::new()).await;
    assert!(matches!(result, Err(LedgerError::TransactionNotFound(_))));
}

#[tokio::test]
async fn test_delete_cascades_to_applied_cancellation() {
    let f = fixture().await;
    let deferred = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();
    settle(&f.ledger, deferred.id).await.unwrap();
    let cancellation = create(&f.ledger, cancel(f.a, f.b, dec!(30), deferred.id)).await.unwrap();

    let outcome = delete(&f.ledger, deferred.id).await.unwrap();

    assert_eq!(outcome.cancellation_id, Some(cancellation.id));
    assert!(!outcome.balances_reverted);
    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
    assert!(f.ledger.transaction(deferred.id).await.is_none());
    assert!(f.ledger.transaction(cancellation.id).await.is_none());
}

#[tokio::test]
async fn test_delete_cascades_to_pending_cancellation() {
    let f = fixture().await;
    let deferred = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();
    let cancellation = create(&f.ledger, cancel(f.a, f.b, dec!(30), deferred.id)).await.unwrap();

    let outcome = delete(&f.ledger, deferred.id).await.unwrap();

    assert_eq!(outcome.cancellation_id, Some(cancellation.id));
    assert!(f.ledger.transactions().await.is_empty());
    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
}

// ========== update ==========

#[tokio::test]
async fn test_update_direct_amount_reapplies_effect() {
    let f = fixture().await;
    let tx = create(&f.ledger, input(DIRECT_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    let updated = update(
        &f.ledger,
        tx.id,
        UpdateTransactionInput {
            amount: Some(dec!(10)),
            ..UpdateTransactionInput::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.amount, dec!(10));
    assert_eq!(updated.status, TransactionStatus::Settled);
    assert_eq!(updated.sender_balance_after, Some(dec!(90)));
    assert_eq!(updated.receiver_balance_after, Some(dec!(60)));
    assert_eq!(balances(&f).await, (dec!(90), dec!(60)));
    assert_eq!(f.ledger.audit_entries(tx.id).await.len(), 2);
}

#[tokio::test]
async fn test_update_direct_parties_moves_points_to_new_parties() {
    let f = fixture().await;
    let carol = f.ledger.add_user("carol", dec!(0)).await;
    let tx = create(&f.ledger, input(DIRECT_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    let updated = update(
        &f.ledger,
        tx.id,
        UpdateTransactionInput {
            receiver_id: Some(carol),
            ..UpdateTransactionInput::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.receiver_id, carol);
    assert_eq!(balances(&f).await, (dec!(70), dec!(50)));
    assert_eq!(f.ledger.balance(carol).await, Some(dec!(30)));
}

#[tokio::test]
async fn test_update_direct_to_deferred_resets_to_pending() {
    let f = fixture().await;
    let tx = create(&f.ledger, input(DIRECT_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    let updated = update(
        &f.ledger,
        tx.id,
        UpdateTransactionInput {
            type_id: Some(DEFERRED_TYPE),
            ..UpdateTransactionInput::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.kind, TransactionKind::Deferred);
    assert_eq!(updated.status, TransactionStatus::Pending);
    assert_eq!(updated.sender_balance_after, None);
    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));

    settle(&f.ledger, tx.id).await.unwrap();
    assert_eq!(balances(&f).await, (dec!(130), dec!(20)));
}

#[tokio::test]
async fn test_update_pending_deferred_to_direct_applies_effect() {
    let f = fixture().await;
    let tx = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    let updated = update(
        &f.ledger,
        tx.id,
        UpdateTransactionInput {
            type_id: Some(DIRECT_TYPE),
            ..UpdateTransactionInput::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.status, TransactionStatus::Settled);
    assert_eq!(balances(&f).await, (dec!(70), dec!(80)));
}

#[tokio::test]
async fn test_update_settled_deferred_stays_settled_with_new_amount() {
    let f = fixture().await;
    let tx = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();
    settle(&f.ledger, tx.id).await.unwrap();

    let updated = update(
        &f.ledger,
        tx.id,
        UpdateTransactionInput {
            amount: Some(dec!(5)),
            ..UpdateTransactionInput::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.status, TransactionStatus::Settled);
    assert_eq!(updated.sender_balance_after, Some(dec!(105)));
    assert_eq!(updated.receiver_balance_after, Some(dec!(45)));
    assert_eq!(balances(&f).await, (dec!(105), dec!(45)));
}

#[tokio::test]
async fn test_update_pending_deferred_moves_nothing() {
    let f = fixture().await;
    let tx = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    let updated = update(
        &f.ledger,
        tx.id,
        UpdateTransactionInput {
            amount: Some(dec!(12)),
            note: Some("renegotiated".to_string()),
            ..UpdateTransactionInput::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.status, TransactionStatus::Pending);
    assert_eq!(updated.note.as_deref(), Some("renegotiated"));
    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
    assert!(f.ledger.audit_entries(tx.id).await.is_empty());
}

#[tokio::test]
async fn test_update_note_only_writes_no_audit() {
    let f = fixture().await;
    let tx = create(&f.ledger, input(DIRECT_TYPE, f.a, f.b, dec!(30))).await.unwrap();

    update(
        &f.ledger,
        tx.id,
        UpdateTransactionInput {
            note: Some("lunch".to_string()),
            ..UpdateTransactionInput::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(balances(&f).await, (dec!(70), dec!(80)));
    assert_eq!(f.ledger.audit_entries(tx.id).await.len(), 1);
}

#[tokio::test]
async fn test_update_rejections() {
    let f = fixture().await;
    let deferred = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap();
    let cancellation = create(&f.ledger, cancel(f.a, f.b, dec!(30), deferred.id)).await.unwrap();
    let direct = create(&f.ledger, input(DIRECT_TYPE, f.a, f.b, dec!(10))).await.unwrap();

    let result = update(&f.ledger, cancellation.id, UpdateTransactionInput::default()).await;
    assert!(matches!(result, Err(LedgerError::CancellationImmutable(_))));

    let result = update(&f.ledger, deferred.id, UpdateTransactionInput::default()).await;
    assert!(matches!(result, Err(LedgerError::AlreadyCancelled(_))));

    let to_cancellation = UpdateTransactionInput {
        type_id: Some(CANCELLATION_TYPE),
        ..UpdateTransactionInput::default()
    };
    let result = update(&f.ledger, direct.id, to_cancellation).await;
    assert!(matches!(result, Err(LedgerError::CannotConvertToCancellation)));

    let same_parties = UpdateTransactionInput {
        receiver_id: Some(f.a),
        ..UpdateTransactionInput::default()
    };
    let result = update(&f.ledger, direct.id, same_parties).await;
    assert!(matches!(result, Err(LedgerError::SameSenderReceiver)));

    let unknown_user = UpdateTransactionInput {
        receiver_id: Some(UserId::new()),
        ..UpdateTransactionInput::default()
    };
    let result = update(&f.ledger, direct.id, unknown_user).await;
    assert!(matches!(result, Err(LedgerError::UserNotFound(_))));

    let result = update(&f.ledger, TransactionId::new(), UpdateTransactionInput::default()).await;
    assert!(matches!(result, Err(LedgerError::TransactionNotFound(_))));

    assert_eq!(balances(&f).await, (dec!(90), dec!(60)));
}

// ========== create_many ==========

#[tokio::test]
async fn test_create_many_rejects_empty_list() {
    let f = fixture().await;
    let mut scope = f.ledger.begin().await;
    let result = LedgerEngine::create_many(&mut scope, vec![]).await;
    assert!(matches!(result, Err(LedgerError::EmptyBatch)));
}

#[tokio::test]
async fn test_create_many_is_all_or_nothing() {
    let f = fixture().await;

    let mut scope = f.ledger.begin().await;
    let result = LedgerEngine::create_many(
        &mut scope,
        vec![
            input(DIRECT_TYPE, f.a, f.b, dec!(10)),
            input(DIRECT_TYPE, f.a, UserId::new(), dec!(10)),
        ],
    )
    .await;
    assert!(matches!(result, Err(LedgerError::UserNotFound(_))));
    drop(scope);

    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
    assert!(f.ledger.transactions().await.is_empty());

    let mut scope = f.ledger.begin().await;
    let created = LedgerEngine::create_many(
        &mut scope,
        vec![
            input(DIRECT_TYPE, f.a, f.b, dec!(10)),
            input(DEFERRED_TYPE, f.b, f.a, dec!(5)),
        ],
    )
    .await
    .unwrap();
    scope.commit();

    assert_eq!(created.len(), 2);
    assert_eq!(balances(&f).await, (dec!(90), dec!(60)));
}

// ========== scopes and concurrency ==========

#[tokio::test]
async fn test_dropped_scope_discards_changes() {
    let f = fixture().await;

    let mut scope = f.ledger.begin().await;
    LedgerEngine::create(&mut scope, input(DIRECT_TYPE, f.a, f.b, dec!(30)))
        .await
        .unwrap();
    drop(scope);

    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
    assert!(f.ledger.transactions().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_lose_no_updates() {
    let f = fixture().await;
    let writers = 20;
    let barrier = Arc::new(Barrier::new(writers));

    let handles = (0..writers).map(|i| {
        let ledger = f.ledger.clone();
        let barrier = Arc::clone(&barrier);
        let (sender, receiver) = if i % 2 == 0 { (f.a, f.b) } else { (f.b, f.a) };
        tokio::spawn(async move {
            barrier.wait().await;
            create(&ledger, input(DIRECT_TYPE, sender, receiver, dec!(3))).await
        })
    });

    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }

    // Ten transfers each way cancel out.
    assert_eq!(balances(&f).await, (dec!(100), dec!(50)));
    assert_eq!(f.ledger.transactions().await.len(), writers);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_settles_apply_once() {
    let f = fixture().await;
    let id = create(&f.ledger, input(DEFERRED_TYPE, f.a, f.b, dec!(30))).await.unwrap().id;
    let attempts = 8;
    let barrier = Arc::new(Barrier::new(attempts));

    let handles = (0..attempts).map(|_| {
        let ledger = f.ledger.clone();
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            settle(&ledger, id).await
        })
    });

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|err| matches!(err, LedgerError::AlreadySettled(_)))
    );
    assert_eq!(balances(&f).await, (dec!(130), dec!(20)));
}
