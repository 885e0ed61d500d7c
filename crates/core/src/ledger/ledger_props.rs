//! Property-based tests for the ledger engine.
//!
//! - Conservation: transfers never create or destroy points.
//! - Consistency: every balance equals its opening value plus the effects of
//!   the transactions currently applied, after any sequence of operations.
//! - Reversal: reversing an effect cancels it exactly.

use std::collections::BTreeMap;

use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::types::{TransactionTypeId, UserId};

use super::effect::{BalanceEffect, effect_of, moves_balances, net_deltas};
use super::{
    CANCELLATION_TYPE, CreateTransactionInput, DEFERRED_TYPE, DIRECT_TYPE, InMemoryLedger,
    LedgerEngine, SettlementProcessor, TransactionKind, UpdateTransactionInput,
};

const USERS: usize = 3;

#[derive(Debug, Clone)]
enum Op {
    Create {
        kind: u8,
        sender: usize,
        receiver: usize,
        cents: i64,
    },
    Cancel {
        target: usize,
    },
    Settle {
        target: usize,
    },
    Update {
        target: usize,
        kind: Option<u8>,
        cents: Option<i64>,
        receiver: Option<usize>,
    },
    Delete {
        target: usize,
    },
    BatchSettle,
}

fn type_for(kind: u8) -> TransactionTypeId {
    match kind % 3 {
        0 => DIRECT_TYPE,
        1 => DEFERRED_TYPE,
        _ => CANCELLATION_TYPE,
    }
}

/// Strategy to generate amounts (0.00 to 1,000.00).
fn cents() -> impl Strategy<Value = i64> {
    0i64..100_000i64
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..2, 0..USERS, 0..USERS, cents()).prop_map(|(kind, sender, receiver, cents)| {
            Op::Create { kind, sender, receiver, cents }
        }),
        1 => any::<usize>().prop_map(|target| Op::Cancel { target }),
        2 => any::<usize>().prop_map(|target| Op::Settle { target }),
        2 => (
            any::<usize>(),
            proptest::option::of(0u8..3),
            proptest::option::of(cents()),
            proptest::option::of(0..USERS),
        )
            .prop_map(|(target, kind, cents, receiver)| Op::Update {
                target,
                kind,
                cents,
                receiver,
            }),
        1 => any::<usize>().prop_map(|target| Op::Delete { target }),
        1 => Just(Op::BatchSettle),
    ]
}

fn effect_strategy() -> impl Strategy<Value = BalanceEffect> {
    (0u8..3, cents()).prop_map(|(kind, cents)| {
        let kind = match kind {
            0 => TransactionKind::Direct,
            1 => TransactionKind::Deferred,
            _ => TransactionKind::Cancellation,
        };
        BalanceEffect::of_kind(kind, UserId::new(), UserId::new(), Decimal::new(cents, 2))
    })
}

/// Runs one operation in its own scope, committing only on success.
async fn apply(ledger: &InMemoryLedger, users: &[UserId], op: &Op) {
    let transactions = ledger.transactions().await;
    let pick = |target: usize| {
        (!transactions.is_empty()).then(|| transactions[target % transactions.len()].clone())
    };

    let mut scope = ledger.begin().await;
    let committed = match op {
        Op::Create {
            kind,
            sender,
            receiver,
            cents,
        } => {
            let input = CreateTransactionInput {
                sender_id: users[*sender],
                receiver_id: users[*receiver],
                type_id: type_for(*kind),
                amount: Decimal::new(*cents, 2),
                counter_transaction_id: None,
                note: None,
            };
            LedgerEngine::create(&mut scope, input).await.is_ok()
        }
        Op::Cancel { target } => match pick(*target) {
            Some(tx) => {
                let input = CreateTransactionInput {
                    sender_id: tx.sender_id,
                    receiver_id: tx.receiver_id,
                    type_id: CANCELLATION_TYPE,
                    amount: tx.amount,
                    counter_transaction_id: Some(tx.id),
                    note: None,
                };
                LedgerEngine::create(&mut scope, input).await.is_ok()
            }
            None => false,
        },
        Op::Settle { target } => match pick(*target) {
            Some(tx) => LedgerEngine::settle(&mut scope, tx.id).await.is_ok(),
            None => false,
        },
        Op::Update {
            target,
            kind,
            cents,
            receiver,
        } => match pick(*target) {
            Some(tx) => {
                let input = UpdateTransactionInput {
                    type_id: kind.map(type_for),
                    amount: cents.map(|c| Decimal::new(c, 2)),
                    receiver_id: receiver.map(|r| users[r]),
                    ..UpdateTransactionInput::default()
                };
                LedgerEngine::update(&mut scope, tx.id, input).await.is_ok()
            }
            None => false,
        },
        Op::Delete { target } => match pick(*target) {
            Some(tx) => LedgerEngine::delete(&mut scope, tx.id).await.is_ok(),
            None => false,
        },
        Op::BatchSettle => SettlementProcessor::batch_settle(&mut scope).await.is_ok(),
    };

    if committed {
        scope.commit();
    }
}

async fn expected_balances(
    ledger: &InMemoryLedger,
    opening: &BTreeMap<UserId, Decimal>,
) -> BTreeMap<UserId, Decimal> {
    let mut expected = opening.clone();
    for tx in ledger.transactions().await {
        if let Some(effect) = effect_of(&tx) {
            for (user, delta) in effect.deltas() {
                *expected.entry(user).or_insert(Decimal::ZERO) += delta;
            }
        }
    }
    expected
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Balances always equal opening balances plus applied effects, and the
    /// total never changes.
    #[test]
    fn prop_balances_follow_applied_effects(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        runtime.block_on(async {
            let ledger = InMemoryLedger::new();
            let mut opening = BTreeMap::new();
            let mut users = Vec::with_capacity(USERS);
            for (i, start) in [100i64, 50, 0].into_iter().enumerate() {
                let id = ledger.add_user(&format!("user-{i}"), Decimal::from(start)).await;
                opening.insert(id, Decimal::from(start));
                users.push(id);
            }
            let total: Decimal = opening.values().copied().sum();

            for op in &ops {
                apply(&ledger, &users, op).await;

                let expected = expected_balances(&ledger, &opening).await;
                let mut actual_total = Decimal::ZERO;
                for user in &users {
                    let actual = ledger.balance(*user).await.unwrap();
                    prop_assert_eq!(Some(&actual), expected.get(user), "after {:?}", op);
                    actual_total += actual;
                }
                prop_assert_eq!(actual_total, total);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Reversing an effect cancels it exactly.
    #[test]
    fn prop_reversal_cancels_effect(effect in effect_strategy()) {
        prop_assert_eq!(effect.reversed().reversed(), effect);
        prop_assert_eq!(effect.sender_delta + effect.receiver_delta, Decimal::ZERO);
        let net = net_deltas([&effect, &effect.reversed()]).unwrap();
        prop_assert!(!moves_balances(&net));
    }
}
