//! Store contracts and the store error taxonomy.
//!
//! The docledger core depends on an external transactional document store.
//! This module defines the three contracts that store must satisfy:
//!
//! - [`LedgerStore`]: account documents with per-field schema constraints
//!   (used to enforce `balance >= 0`)
//! - [`AuditLog`]: the append-only transfer collection
//! - [`TransactionControl`]: session lifecycle — begin, start-transaction,
//!   commit, abort, close
//!
//! # Sessions
//!
//! Write operations take an `Option<&SessionId>`. With `Some(session)` the
//! write is staged under that session and becomes visible only at commit;
//! with `None` it is a direct single-document write, applied (and validated)
//! immediately, with no atomicity relationship to any other write. The
//! direct form exists to demonstrate the race the transactional form
//! prevents; it is a contrast case, not part of the atomicity contract.
//!
//! # Dyn Compatibility
//!
//! These traits use explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` to enable trait object usage (`Arc<dyn LedgerStore>`). The
//! transfer coordinator receives its store dependencies as trait objects.

use crate::account::{Account, AccountId};
use crate::session::SessionId;
use crate::transfer::TransferRecord;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// The collections the store manages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Account documents, keyed by account id.
    Accounts,
    /// The append-only transfer audit trail.
    Transfers,
}

impl Collection {
    /// Collection name as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Accounts => "account",
            Self::Transfers => "transfer",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the document store.
///
/// Every failure during a transaction's body translates, at the coordinator
/// boundary, into a session abort followed by a single error to the caller;
/// no partial success is ever reported.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not allocate a session or transaction context.
    ///
    /// Fatal for that call; there is no automatic retry. Also the mapping
    /// for a session-acquisition deadline expiring.
    #[error("Session unavailable: {reason}")]
    SessionUnavailable {
        /// Why the session could not be allocated.
        reason: String,
    },

    /// `start_transaction` was called on a session that already has an
    /// active transaction.
    #[error("Transaction already active on session {session}")]
    TransactionAlreadyActive {
        /// The session in question.
        session: SessionId,
    },

    /// A transactional operation was attempted on a session with no active
    /// transaction.
    #[error("No active transaction on session {session}")]
    NoActiveTransaction {
        /// The session in question.
        session: SessionId,
    },

    /// A write would violate a store-enforced schema invariant.
    ///
    /// The canonical case: a debit that would take a balance below zero.
    /// Always triggers abort of the enclosing session.
    #[error("Constraint violation on {collection} document '{id}': {reason}")]
    ConstraintViolation {
        /// Collection the rejected write targeted.
        collection: Collection,
        /// Document key the rejected write targeted.
        id: String,
        /// The violated constraint.
        reason: String,
    },

    /// The store rejected the commit: write conflict, constraint, or a
    /// transient failure. Always triggers abort. Also the mapping for a
    /// commit deadline expiring.
    #[error("Commit failed: {reason}")]
    CommitFailed {
        /// Why the commit was rejected.
        reason: String,
    },

    /// Any other per-document write error during the transaction.
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// What went wrong.
        reason: String,
    },
}

/// Account documents with a store-enforced non-negative balance.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be shared across concurrent
/// transfer calls; the coordinator itself holds no locks and relies entirely
/// on the store's isolation.
pub trait LedgerStore: Send + Sync {
    /// Insert a new account document.
    ///
    /// Used at ledger initialization. The document is validated against the
    /// account schema before insertion.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ConstraintViolation`]: the document violates the schema
    /// - [`StoreError::WriteFailed`]: the account already exists
    fn create_account(
        &self,
        account: Account,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Read one account's committed state.
    ///
    /// Returns `None` for an unknown id. Reads never observe writes staged
    /// under an uncommitted session.
    ///
    /// # Errors
    ///
    /// - [`StoreError::WriteFailed`]: the store could not serve the read
    fn account(
        &self,
        id: &AccountId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Account>, StoreError>> + Send + '_>>;

    /// Read all committed accounts, ordered by id.
    ///
    /// # Errors
    ///
    /// - [`StoreError::WriteFailed`]: the store could not serve the read
    fn accounts(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Account>, StoreError>> + Send + '_>>;

    /// Apply a signed balance change to one account.
    ///
    /// The document-store equivalent of `updateOne(filter, inc("balance", delta))`.
    /// With a session, the change is staged and validated against the schema
    /// inside the transaction; without one, it is validated and applied
    /// immediately.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ConstraintViolation`]: the resulting balance would be
    ///   negative
    /// - [`StoreError::NoActiveTransaction`]: the session has no active
    ///   transaction
    /// - [`StoreError::WriteFailed`]: unknown account, unknown session, or
    ///   balance overflow
    fn apply_balance_change(
        &self,
        session: Option<&SessionId>,
        id: &AccountId,
        delta: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;
}

/// The append-only record of completed transfers.
pub trait AuditLog: Send + Sync {
    /// Append one transfer record.
    ///
    /// With a session, the insert is staged and becomes visible only when
    /// the session commits — which is the only way the coordinator ever
    /// writes it, so that a record exists if and only if both balance
    /// changes landed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NoActiveTransaction`]: the session has no active
    ///   transaction
    /// - [`StoreError::WriteFailed`]: unknown session or storage failure
    fn append_transfer(
        &self,
        session: Option<&SessionId>,
        record: TransferRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Read all committed transfer records, oldest first.
    ///
    /// # Errors
    ///
    /// - [`StoreError::WriteFailed`]: the store could not serve the read
    fn transfers(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TransferRecord>, StoreError>> + Send + '_>>;
}

/// Session lifecycle operations.
///
/// A session moves through exactly one of two terminal resolutions —
/// committed or aborted — and is then closed. Close must be safe to call
/// more than once; everything else on a closed session is an error.
pub trait TransactionControl: Send + Sync {
    /// Acquire a new session from the store.
    ///
    /// # Errors
    ///
    /// - [`StoreError::SessionUnavailable`]: the store cannot allocate one
    ///   (e.g. connection exhaustion)
    fn begin_session(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<SessionId, StoreError>> + Send + '_>>;

    /// Open a transaction on the session.
    ///
    /// # Errors
    ///
    /// - [`StoreError::TransactionAlreadyActive`]: called twice on the same
    ///   session
    /// - [`StoreError::WriteFailed`]: unknown session
    fn start_transaction(
        &self,
        session: &SessionId,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Durably apply every operation staged under the session.
    ///
    /// On success all staged writes become visible atomically. On failure
    /// nothing is applied and the caller must abort the session.
    ///
    /// # Errors
    ///
    /// - [`StoreError::CommitFailed`]: write conflict with a concurrently
    ///   committed session, or a transient failure
    /// - [`StoreError::NoActiveTransaction`]: no transaction was started
    fn commit_transaction(
        &self,
        session: &SessionId,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Discard every operation staged under the session.
    ///
    /// A no-op when the session has no active transaction, so it is safe to
    /// call on the failure path regardless of how far the transaction got.
    ///
    /// # Errors
    ///
    /// - [`StoreError::WriteFailed`]: unknown session
    fn abort_transaction(
        &self,
        session: &SessionId,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Release the session's resources.
    ///
    /// Idempotent: closing an already-closed session must not fail or
    /// double-release. An open transaction still staged on the session is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Implementations should reserve errors for genuine release failures;
    /// a repeated close is not one.
    fn close_session(
        &self,
        session: &SessionId,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_violation_display() {
        let error = StoreError::ConstraintViolation {
            collection: Collection::Accounts,
            id: "bob".to_string(),
            reason: "balance must be a non-negative integer".to_string(),
        };

        let display = format!("{error}");
        assert!(display.contains("account"));
        assert!(display.contains("bob"));
        assert!(display.contains("non-negative"));
    }

    #[test]
    fn commit_failed_display() {
        let error = StoreError::CommitFailed {
            reason: "write conflict on account 'alice'".to_string(),
        };
        assert!(format!("{error}").contains("write conflict"));
    }

    #[test]
    fn collection_names() {
        assert_eq!(Collection::Accounts.as_str(), "account");
        assert_eq!(Collection::Transfers.as_str(), "transfer");
    }
}
