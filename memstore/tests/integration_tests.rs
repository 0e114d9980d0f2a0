//! Integration tests for the in-memory transactional store.
//!
//! These exercise the store-level contracts directly: transaction isolation,
//! constraint enforcement, write-conflict detection, session lifecycle, and
//! the change feed.

#![allow(clippy::unwrap_used)]

use docledger_core::account::{Account, AccountId, Amount};
use docledger_core::change::{ChangeFeed, OperationKind};
use docledger_core::store::{
    AuditLog, Collection, LedgerStore, StoreError, TransactionControl,
};
use docledger_core::transfer::{TransferId, TransferRecord};
use docledger_memstore::MemoryStore;
use futures::StreamExt;

fn alice() -> AccountId {
    AccountId::new("alice")
}

fn bob() -> AccountId {
    AccountId::new("bob")
}

async fn seeded() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .create_account(Account::new(alice(), 20))
        .await
        .unwrap();
    store
        .create_account(Account::new(bob(), 20))
        .await
        .unwrap();
    store
}

fn record(from: &AccountId, to: &AccountId, amount: u64) -> TransferRecord {
    TransferRecord::new(
        TransferId::new(),
        chrono::Utc::now(),
        from.clone(),
        to.clone(),
        Amount::new(amount),
    )
}

#[tokio::test]
async fn committed_transaction_applies_all_three_writes() {
    let store = seeded().await;

    let session = store.begin_session().await.unwrap();
    store.start_transaction(&session).await.unwrap();
    store
        .apply_balance_change(Some(&session), &alice(), 10)
        .await
        .unwrap();
    store
        .apply_balance_change(Some(&session), &bob(), -10)
        .await
        .unwrap();
    store
        .append_transfer(Some(&session), record(&bob(), &alice(), 10))
        .await
        .unwrap();
    store.commit_transaction(&session).await.unwrap();
    store.close_session(&session).await.unwrap();

    assert_eq!(store.account(&alice()).await.unwrap().unwrap().balance, 30);
    assert_eq!(store.account(&bob()).await.unwrap().unwrap().balance, 10);

    let transfers = store.transfers().await.unwrap();
    assert_eq!(transfers.len(), 1);
    assert!(transfers[0].matches(&bob(), &alice(), Amount::new(10)));
}

#[tokio::test]
async fn debit_below_zero_is_rejected_inside_the_transaction() {
    let store = seeded().await;

    let session = store.begin_session().await.unwrap();
    store.start_transaction(&session).await.unwrap();
    store
        .apply_balance_change(Some(&session), &alice(), 520)
        .await
        .unwrap();

    let err = store
        .apply_balance_change(Some(&session), &bob(), -520)
        .await;
    assert!(matches!(
        err,
        Err(StoreError::ConstraintViolation { .. })
    ));

    store.abort_transaction(&session).await.unwrap();
    store.close_session(&session).await.unwrap();

    // No partial effect: both balances and the audit trail are untouched.
    assert_eq!(store.account(&alice()).await.unwrap().unwrap().balance, 20);
    assert_eq!(store.account(&bob()).await.unwrap().unwrap().balance, 20);
    assert!(store.transfers().await.unwrap().is_empty());
}

#[tokio::test]
async fn staged_writes_are_invisible_until_commit() {
    let store = seeded().await;

    let session = store.begin_session().await.unwrap();
    store.start_transaction(&session).await.unwrap();
    store
        .apply_balance_change(Some(&session), &alice(), 10)
        .await
        .unwrap();

    // A read outside the session sees the committed state only.
    assert_eq!(store.account(&alice()).await.unwrap().unwrap().balance, 20);

    store.commit_transaction(&session).await.unwrap();
    store.close_session(&session).await.unwrap();

    assert_eq!(store.account(&alice()).await.unwrap().unwrap().balance, 30);
}

#[tokio::test]
async fn abort_discards_staged_writes() {
    let store = seeded().await;

    let session = store.begin_session().await.unwrap();
    store.start_transaction(&session).await.unwrap();
    store
        .apply_balance_change(Some(&session), &alice(), 10)
        .await
        .unwrap();
    store
        .append_transfer(Some(&session), record(&bob(), &alice(), 10))
        .await
        .unwrap();
    store.abort_transaction(&session).await.unwrap();
    store.close_session(&session).await.unwrap();

    assert_eq!(store.account(&alice()).await.unwrap().unwrap().balance, 20);
    assert!(store.transfers().await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_sessions_conflict_on_the_same_account() {
    let store = seeded().await;

    let first = store.begin_session().await.unwrap();
    let second = store.begin_session().await.unwrap();
    store.start_transaction(&first).await.unwrap();
    store.start_transaction(&second).await.unwrap();

    store
        .apply_balance_change(Some(&first), &alice(), 5)
        .await
        .unwrap();
    store
        .apply_balance_change(Some(&second), &alice(), 7)
        .await
        .unwrap();

    store.commit_transaction(&first).await.unwrap();

    let err = store.commit_transaction(&second).await;
    assert!(matches!(err, Err(StoreError::CommitFailed { .. })));

    store.abort_transaction(&second).await.unwrap();
    store.close_session(&first).await.unwrap();
    store.close_session(&second).await.unwrap();

    // Only the first session's write landed.
    assert_eq!(store.account(&alice()).await.unwrap().unwrap().balance, 25);
}

#[tokio::test]
async fn session_pool_exhaustion_is_session_unavailable() {
    let store = MemoryStore::builder().max_sessions(1).build();
    store
        .create_account(Account::new(alice(), 20))
        .await
        .unwrap();

    let session = store.begin_session().await.unwrap();
    let err = store.begin_session().await;
    assert!(matches!(err, Err(StoreError::SessionUnavailable { .. })));

    store.close_session(&session).await.unwrap();
    let reopened = store.begin_session().await.unwrap();
    store.close_session(&reopened).await.unwrap();
}

#[tokio::test]
async fn closing_a_session_twice_is_a_noop() {
    let store = seeded().await;

    let session = store.begin_session().await.unwrap();
    store.close_session(&session).await.unwrap();
    store.close_session(&session).await.unwrap();
    assert_eq!(store.open_sessions().await, 0);
}

#[tokio::test]
async fn starting_a_transaction_twice_fails() {
    let store = seeded().await;

    let session = store.begin_session().await.unwrap();
    store.start_transaction(&session).await.unwrap();
    let err = store.start_transaction(&session).await;
    assert!(matches!(
        err,
        Err(StoreError::TransactionAlreadyActive { .. })
    ));

    store.abort_transaction(&session).await.unwrap();
    store.close_session(&session).await.unwrap();
}

#[tokio::test]
async fn unsessioned_writes_are_not_atomic_with_each_other() {
    let store = seeded().await;

    // The deposit applies unconditionally.
    store
        .apply_balance_change(None, &alice(), 100)
        .await
        .unwrap();

    // The withdraw is rejected by the schema, and nothing rolls the deposit
    // back: this is the documented anti-pattern the transaction exists to
    // prevent.
    let err = store.apply_balance_change(None, &bob(), -100).await;
    assert!(matches!(
        err,
        Err(StoreError::ConstraintViolation { .. })
    ));

    assert_eq!(store.account(&alice()).await.unwrap().unwrap().balance, 120);
    assert_eq!(store.account(&bob()).await.unwrap().unwrap().balance, 20);
}

#[tokio::test]
async fn writes_to_unknown_accounts_fail() {
    let store = seeded().await;
    let err = store
        .apply_balance_change(None, &AccountId::new("mallory"), 1)
        .await;
    assert!(matches!(err, Err(StoreError::WriteFailed { .. })));
}

#[tokio::test]
async fn change_feed_sees_committed_events_in_commit_order() {
    let store = seeded().await;
    let mut feed = store.watch().await.unwrap();

    let session = store.begin_session().await.unwrap();
    store.start_transaction(&session).await.unwrap();
    store
        .apply_balance_change(Some(&session), &alice(), 10)
        .await
        .unwrap();
    store
        .apply_balance_change(Some(&session), &bob(), -10)
        .await
        .unwrap();
    store
        .append_transfer(Some(&session), record(&bob(), &alice(), 10))
        .await
        .unwrap();
    store.commit_transaction(&session).await.unwrap();
    store.close_session(&session).await.unwrap();

    let first = feed.next().await.unwrap().unwrap();
    let second = feed.next().await.unwrap().unwrap();
    let third = feed.next().await.unwrap().unwrap();

    assert_eq!(first.collection, Collection::Accounts);
    assert_eq!(first.kind, OperationKind::Update);
    assert_eq!(second.collection, Collection::Accounts);
    assert_eq!(second.kind, OperationKind::Update);
    assert_eq!(third.collection, Collection::Transfers);
    assert_eq!(third.kind, OperationKind::Insert);

    assert!(first.sequence < second.sequence);
    assert!(second.sequence < third.sequence);
    // Events from one commit share a cluster time.
    assert_eq!(first.cluster_time, second.cluster_time);
    assert_eq!(second.cluster_time, third.cluster_time);
}

#[tokio::test]
async fn aborted_transactions_emit_no_change_events() {
    let store = seeded().await;
    let mut feed = store.watch().await.unwrap();

    let session = store.begin_session().await.unwrap();
    store.start_transaction(&session).await.unwrap();
    store
        .apply_balance_change(Some(&session), &alice(), 10)
        .await
        .unwrap();
    store.abort_transaction(&session).await.unwrap();
    store.close_session(&session).await.unwrap();

    // The only event on the feed is the direct write performed afterwards.
    store.apply_balance_change(None, &bob(), 1).await.unwrap();

    let event = feed.next().await.unwrap().unwrap();
    assert_eq!(event.kind, OperationKind::Update);
    let document = event.document.unwrap();
    assert_eq!(document["id"], "bob");
    assert_eq!(document["balance"], 21);
}
