//! The in-memory store: documents, sessions, commit, and the change feed.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use chrono::{DateTime, Utc};
use docledger_core::account::{Account, AccountId};
use docledger_core::change::{
    ChangeEvent, ChangeFeed, ChangeFeedError, ChangeStream, OperationKind,
};
use docledger_core::environment::{Clock, SystemClock};
use docledger_core::session::SessionId;
use docledger_core::store::{
    AuditLog, Collection, LedgerStore, StoreError, TransactionControl,
};
use docledger_core::transfer::TransferRecord;
use tokio::sync::RwLock;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::schema;

/// A committed account document plus the version counter used for
/// write-conflict detection at commit.
struct VersionedAccount {
    document: Account,
    version: u64,
}

/// One account touched by an in-flight transaction: the committed version it
/// was snapshotted from and the working copy the transaction mutates.
struct StagedAccount {
    id: AccountId,
    base_version: u64,
    document: Account,
}

enum TxPhase {
    /// Session exists but no transaction is active.
    Idle,
    /// A transaction is open and accumulating staged writes.
    Active,
}

struct SessionTx {
    phase: TxPhase,
    accounts: Vec<StagedAccount>,
    transfers: Vec<TransferRecord>,
}

impl SessionTx {
    const fn new() -> Self {
        Self {
            phase: TxPhase::Idle,
            accounts: Vec::new(),
            transfers: Vec::new(),
        }
    }
}

struct StoreInner {
    accounts: HashMap<AccountId, VersionedAccount>,
    transfers: Vec<TransferRecord>,
    sessions: HashMap<SessionId, SessionTx>,
    sequence: u64,
}

/// Builder for [`MemoryStore`].
///
/// # Example
///
/// ```
/// use docledger_memstore::MemoryStore;
///
/// let store = MemoryStore::builder()
///     .max_sessions(4)
///     .feed_capacity(64)
///     .build();
/// # drop(store);
/// ```
pub struct MemoryStoreBuilder {
    max_sessions: usize,
    feed_capacity: usize,
    clock: Arc<dyn Clock>,
}

impl MemoryStoreBuilder {
    fn new() -> Self {
        Self {
            max_sessions: 64,
            feed_capacity: 256,
            clock: Arc::new(SystemClock),
        }
    }

    /// Maximum number of concurrently open sessions. Beginning a session
    /// beyond this limit fails with `SessionUnavailable`.
    #[must_use]
    pub const fn max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    /// Capacity of the change feed buffer. A subscriber that falls further
    /// behind than this sees a `Lagged` error on its stream.
    #[must_use]
    pub const fn feed_capacity(mut self, feed_capacity: usize) -> Self {
        self.feed_capacity = feed_capacity;
        self
    }

    /// Clock used to stamp change events.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the store.
    #[must_use]
    pub fn build(self) -> MemoryStore {
        let (changes, _) = broadcast::channel(self.feed_capacity.max(1));
        MemoryStore {
            inner: RwLock::new(StoreInner {
                accounts: HashMap::new(),
                transfers: Vec::new(),
                sessions: HashMap::new(),
                sequence: 0,
            }),
            changes,
            clock: self.clock,
            max_sessions: self.max_sessions,
        }
    }
}

/// In-memory transactional document store.
///
/// Implements all four docledger contracts. See the crate docs for the
/// transaction semantics. Cheap to construct per test; wrap in an [`Arc`]
/// to share between the coordinator and a change feed reader.
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
    changes: broadcast::Sender<ChangeEvent>,
    clock: Arc<dyn Clock>,
    max_sessions: usize,
}

impl MemoryStore {
    /// Create a store with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a store with custom limits.
    #[must_use]
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::new()
    }

    /// Number of currently open sessions. Exposed for tests and diagnostics.
    pub async fn open_sessions(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    fn next_event(
        inner: &mut StoreInner,
        cluster_time: DateTime<Utc>,
        collection: Collection,
        kind: OperationKind,
        document: serde_json::Value,
    ) -> ChangeEvent {
        inner.sequence += 1;
        ChangeEvent {
            collection,
            kind,
            cluster_time,
            sequence: inner.sequence,
            document: Some(document),
        }
    }

    fn to_document<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
        serde_json::to_value(value).map_err(|e| StoreError::WriteFailed {
            reason: format!("could not serialize document: {e}"),
        })
    }

    async fn create_account_inner(&self, account: Account) -> Result<(), StoreError> {
        schema::validate_account(&account)?;
        let now = self.clock.now();
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        if inner.accounts.contains_key(&account.id) {
            return Err(StoreError::WriteFailed {
                reason: format!("account '{}' already exists", account.id),
            });
        }
        let document = Self::to_document(&account)?;
        inner.accounts.insert(
            account.id.clone(),
            VersionedAccount {
                document: account,
                version: 0,
            },
        );
        let event = Self::next_event(
            inner,
            now,
            Collection::Accounts,
            OperationKind::Insert,
            document,
        );
        drop(guard);
        let _ = self.changes.send(event);
        Ok(())
    }

    async fn apply_balance_change_inner(
        &self,
        session: Option<SessionId>,
        id: AccountId,
        delta: i64,
    ) -> Result<(), StoreError> {
        match session {
            None => self.apply_direct(id, delta).await,
            Some(session) => self.apply_staged(session, id, delta).await,
        }
    }

    /// Direct single-document write: validated and applied immediately,
    /// change event emitted immediately. No atomicity with anything else.
    async fn apply_direct(&self, id: AccountId, delta: i64) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let document = {
            let entry = inner
                .accounts
                .get_mut(&id)
                .ok_or_else(|| StoreError::WriteFailed {
                    reason: format!("account '{id}' does not exist"),
                })?;
            let updated = entry.document.balance.checked_add(delta).ok_or_else(|| {
                StoreError::WriteFailed {
                    reason: format!("balance overflow on account '{id}'"),
                }
            })?;
            let candidate = Account::new(id.clone(), updated);
            schema::validate_account(&candidate)?;
            entry.document = candidate;
            entry.version += 1;
            Self::to_document(&entry.document)?
        };
        let event = Self::next_event(
            inner,
            now,
            Collection::Accounts,
            OperationKind::Update,
            document,
        );
        drop(guard);
        let _ = self.changes.send(event);
        Ok(())
    }

    /// Session-scoped write: staged against a snapshot of the committed
    /// document, validated now, published at commit.
    async fn apply_staged(
        &self,
        session: SessionId,
        id: AccountId,
        delta: i64,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let tx = inner
            .sessions
            .get_mut(&session)
            .ok_or_else(|| StoreError::WriteFailed {
                reason: format!("unknown session {session}"),
            })?;
        if !matches!(tx.phase, TxPhase::Active) {
            return Err(StoreError::NoActiveTransaction { session });
        }
        let position = match tx.accounts.iter().position(|staged| staged.id == id) {
            Some(position) => position,
            None => {
                let base =
                    inner
                        .accounts
                        .get(&id)
                        .ok_or_else(|| StoreError::WriteFailed {
                            reason: format!("account '{id}' does not exist"),
                        })?;
                tx.accounts.push(StagedAccount {
                    id: id.clone(),
                    base_version: base.version,
                    document: base.document.clone(),
                });
                tx.accounts.len() - 1
            }
        };
        let staged = &mut tx.accounts[position];
        let updated = staged.document.balance.checked_add(delta).ok_or_else(|| {
            StoreError::WriteFailed {
                reason: format!("balance overflow on account '{id}'"),
            }
        })?;
        let candidate = Account::new(id, updated);
        schema::validate_account(&candidate)?;
        staged.document = candidate;
        Ok(())
    }

    async fn append_transfer_inner(
        &self,
        session: Option<SessionId>,
        record: TransferRecord,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        match session {
            None => {
                let document = Self::to_document(&record)?;
                inner.transfers.push(record);
                let event = Self::next_event(
                    inner,
                    now,
                    Collection::Transfers,
                    OperationKind::Insert,
                    document,
                );
                drop(guard);
                let _ = self.changes.send(event);
                Ok(())
            }
            Some(session) => {
                let tx = inner
                    .sessions
                    .get_mut(&session)
                    .ok_or_else(|| StoreError::WriteFailed {
                        reason: format!("unknown session {session}"),
                    })?;
                if !matches!(tx.phase, TxPhase::Active) {
                    return Err(StoreError::NoActiveTransaction { session });
                }
                tx.transfers.push(record);
                Ok(())
            }
        }
    }

    async fn begin_session_inner(&self) -> Result<SessionId, StoreError> {
        let mut guard = self.inner.write().await;
        if guard.sessions.len() >= self.max_sessions {
            return Err(StoreError::SessionUnavailable {
                reason: format!(
                    "session pool exhausted ({} of {} in use)",
                    guard.sessions.len(),
                    self.max_sessions
                ),
            });
        }
        let id = SessionId::new();
        guard.sessions.insert(id.clone(), SessionTx::new());
        tracing::debug!(session = %id, "session begun");
        Ok(id)
    }

    async fn start_transaction_inner(&self, session: SessionId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let tx = guard
            .sessions
            .get_mut(&session)
            .ok_or_else(|| StoreError::WriteFailed {
                reason: format!("unknown session {session}"),
            })?;
        match tx.phase {
            TxPhase::Active => Err(StoreError::TransactionAlreadyActive { session }),
            TxPhase::Idle => {
                tx.phase = TxPhase::Active;
                tracing::debug!(session = %session, "transaction started");
                Ok(())
            }
        }
    }

    async fn commit_transaction_inner(&self, session: SessionId) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let tx = inner
            .sessions
            .get_mut(&session)
            .ok_or_else(|| StoreError::WriteFailed {
                reason: format!("unknown session {session}"),
            })?;
        if !matches!(tx.phase, TxPhase::Active) {
            return Err(StoreError::NoActiveTransaction { session });
        }

        // Optimistic check: every touched document must still be at the
        // version it was snapshotted from. A concurrent commit wins the race
        // and this transaction fails without applying anything.
        for staged in &tx.accounts {
            let current =
                inner
                    .accounts
                    .get(&staged.id)
                    .ok_or_else(|| StoreError::CommitFailed {
                        reason: format!(
                            "account '{}' disappeared during the transaction",
                            staged.id
                        ),
                    })?;
            if current.version != staged.base_version {
                tracing::debug!(
                    session = %session,
                    account = %staged.id,
                    "commit rejected: write conflict"
                );
                return Err(StoreError::CommitFailed {
                    reason: format!("write conflict on account '{}'", staged.id),
                });
            }
        }

        // Serialize the post-operation documents before touching committed
        // state so a serialization failure leaves the store unchanged.
        let mut pending = Vec::with_capacity(tx.accounts.len() + tx.transfers.len());
        for staged in &tx.accounts {
            let document = Self::to_document(&staged.document)
                .map_err(|e| StoreError::CommitFailed {
                    reason: e.to_string(),
                })?;
            pending.push((Collection::Accounts, OperationKind::Update, document));
        }
        for record in &tx.transfers {
            let document = Self::to_document(record).map_err(|e| StoreError::CommitFailed {
                reason: e.to_string(),
            })?;
            pending.push((Collection::Transfers, OperationKind::Insert, document));
        }

        let staged_accounts = std::mem::take(&mut tx.accounts);
        let staged_transfers = std::mem::take(&mut tx.transfers);
        tx.phase = TxPhase::Idle;

        for staged in staged_accounts {
            inner.accounts.insert(
                staged.id.clone(),
                VersionedAccount {
                    document: staged.document,
                    version: staged.base_version + 1,
                },
            );
        }
        inner.transfers.extend(staged_transfers);

        let events: Vec<ChangeEvent> = pending
            .into_iter()
            .map(|(collection, kind, document)| {
                Self::next_event(inner, now, collection, kind, document)
            })
            .collect();
        drop(guard);
        for event in events {
            let _ = self.changes.send(event);
        }

        metrics::counter!("memstore.transactions_committed").increment(1);
        tracing::debug!(session = %session, "transaction committed");
        Ok(())
    }

    async fn abort_transaction_inner(&self, session: SessionId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let tx = guard
            .sessions
            .get_mut(&session)
            .ok_or_else(|| StoreError::WriteFailed {
                reason: format!("unknown session {session}"),
            })?;
        match tx.phase {
            TxPhase::Active => {
                tx.accounts.clear();
                tx.transfers.clear();
                tx.phase = TxPhase::Idle;
                metrics::counter!("memstore.transactions_aborted").increment(1);
                tracing::debug!(session = %session, "transaction aborted");
            }
            // Nothing staged; aborting a resolved or never-started
            // transaction is a safe no-op.
            TxPhase::Idle => {}
        }
        Ok(())
    }

    async fn close_session_inner(&self, session: SessionId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if let Some(tx) = guard.sessions.remove(&session) {
            if matches!(tx.phase, TxPhase::Active) {
                tracing::debug!(
                    session = %session,
                    "session closed with an open transaction; staged writes discarded"
                );
            } else {
                tracing::debug!(session = %session, "session closed");
            }
        }
        // Closing an unknown (already-closed) session is a no-op.
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for MemoryStore {
    fn create_account(
        &self,
        account: Account,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(self.create_account_inner(account))
    }

    fn account(
        &self,
        id: &AccountId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Account>, StoreError>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move {
            let guard = self.inner.read().await;
            Ok(guard.accounts.get(&id).map(|entry| entry.document.clone()))
        })
    }

    fn accounts(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Account>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let guard = self.inner.read().await;
            let mut accounts: Vec<Account> = guard
                .accounts
                .values()
                .map(|entry| entry.document.clone())
                .collect();
            accounts.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(accounts)
        })
    }

    fn apply_balance_change(
        &self,
        session: Option<&SessionId>,
        id: &AccountId,
        delta: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let session = session.cloned();
        let id = id.clone();
        Box::pin(self.apply_balance_change_inner(session, id, delta))
    }
}

impl AuditLog for MemoryStore {
    fn append_transfer(
        &self,
        session: Option<&SessionId>,
        record: TransferRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let session = session.cloned();
        Box::pin(self.append_transfer_inner(session, record))
    }

    fn transfers(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TransferRecord>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let guard = self.inner.read().await;
            Ok(guard.transfers.clone())
        })
    }
}

impl TransactionControl for MemoryStore {
    fn begin_session(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<SessionId, StoreError>> + Send + '_>> {
        Box::pin(self.begin_session_inner())
    }

    fn start_transaction(
        &self,
        session: &SessionId,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(self.start_transaction_inner(session.clone()))
    }

    fn commit_transaction(
        &self,
        session: &SessionId,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(self.commit_transaction_inner(session.clone()))
    }

    fn abort_transaction(
        &self,
        session: &SessionId,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(self.abort_transaction_inner(session.clone()))
    }

    fn close_session(
        &self,
        session: &SessionId,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(self.close_session_inner(session.clone()))
    }
}

impl ChangeFeed for MemoryStore {
    fn watch(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ChangeStream, ChangeFeedError>> + Send + '_>> {
        let mut receiver = self.changes.subscribe();
        Box::pin(async move {
            let events = stream! {
                loop {
                    match receiver.recv().await {
                        Ok(event) => yield Ok(event),
                        Err(RecvError::Lagged(skipped)) => {
                            yield Err(ChangeFeedError::Lagged { skipped });
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            };
            Ok(Box::pin(events) as ChangeStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn direct_write_bumps_version_and_balance() {
        let store = MemoryStore::new();
        store
            .create_account_inner(Account::new(AccountId::new("alice"), 20))
            .await
            .unwrap();

        store
            .apply_balance_change_inner(None, AccountId::new("alice"), 100)
            .await
            .unwrap();

        let guard = store.inner.read().await;
        let entry = &guard.accounts[&AccountId::new("alice")];
        assert_eq!(entry.document.balance, 120);
        assert_eq!(entry.version, 1);
    }

    #[tokio::test]
    async fn create_duplicate_account_fails() {
        let store = MemoryStore::new();
        store
            .create_account_inner(Account::new(AccountId::new("alice"), 20))
            .await
            .unwrap();
        let err = store
            .create_account_inner(Account::new(AccountId::new("alice"), 5))
            .await;
        assert!(matches!(err, Err(StoreError::WriteFailed { .. })));
    }

    #[tokio::test]
    async fn staged_write_requires_active_transaction() {
        let store = MemoryStore::new();
        store
            .create_account_inner(Account::new(AccountId::new("alice"), 20))
            .await
            .unwrap();
        let session = store.begin_session_inner().await.unwrap();

        let err = store
            .apply_balance_change_inner(Some(session), AccountId::new("alice"), 5)
            .await;
        assert!(matches!(err, Err(StoreError::NoActiveTransaction { .. })));
    }
}
