//! The transactional transfer coordinator.
//!
//! Orchestrates a single transfer: credit destination, debit source, append
//! an audit record — all inside one session — then commit. On any step
//! failure the session is aborted instead of committed and the failure is
//! surfaced to the caller; the session is closed on every path. There is no
//! automatic retry: resubmission is the caller's decision.
//!
//! The non-transactional [`TransferCoordinator::deposit`] and
//! [`TransferCoordinator::withdraw`] operations are direct single-document
//! writes with no session. They exist to demonstrate the race the
//! transactional form prevents and are not atomic with respect to each
//! other.

use crate::session::{Session, SessionManager};
use docledger_core::account::{AccountId, Amount};
use docledger_core::environment::Clock;
use docledger_core::store::{AuditLog, LedgerStore, StoreError, TransactionControl};
use docledger_core::transfer::{TransferId, TransferRecord};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// Errors surfaced by [`TransferCoordinator::transfer`].
///
/// Each variant carries the originating store error as its source; the
/// variant tells the caller which stage of the transfer failed.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The requested amount was zero.
    #[error("transfer amount must be greater than zero")]
    InvalidAmount,

    /// A session could not be acquired or its transaction could not be
    /// started.
    #[error("could not open a transaction session")]
    Session(#[source] StoreError),

    /// A write inside the transaction was rejected by a store constraint
    /// (insufficient balance).
    #[error("transfer rejected by a store constraint")]
    Constraint(#[source] StoreError),

    /// The store rejected the commit (write conflict or transient failure).
    #[error("transaction commit was rejected")]
    Commit(#[source] StoreError),

    /// Any other write inside the transaction failed.
    #[error("a write inside the transaction failed")]
    Write(#[source] StoreError),
}

impl TransferError {
    /// The store error that caused this failure, when there is one.
    #[must_use]
    pub const fn cause(&self) -> Option<&StoreError> {
        match self {
            Self::InvalidAmount => None,
            Self::Session(err) | Self::Constraint(err) | Self::Commit(err) | Self::Write(err) => {
                Some(err)
            }
        }
    }
}

/// Deadlines for the two store operations that can stall.
///
/// Expiry of the session deadline surfaces as `SessionUnavailable`; expiry
/// of the commit deadline surfaces as `CommitFailed`, exactly as if the
/// store itself had refused.
#[derive(Clone, Copy, Debug)]
pub struct CoordinatorConfig {
    /// Deadline for acquiring a session.
    pub session_timeout: Duration,
    /// Deadline for the commit.
    pub commit_timeout: Duration,
}

impl CoordinatorConfig {
    /// Configuration with five-second deadlines.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            session_timeout: Duration::from_secs(5),
            commit_timeout: Duration::from_secs(5),
        }
    }

    /// Override the session acquisition deadline.
    #[must_use]
    pub const fn with_session_timeout(mut self, session_timeout: Duration) -> Self {
        self.session_timeout = session_timeout;
        self
    }

    /// Override the commit deadline.
    #[must_use]
    pub const fn with_commit_timeout(mut self, commit_timeout: Duration) -> Self {
        self.commit_timeout = commit_timeout;
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrates transfers between ledger accounts.
///
/// Store dependencies are injected explicitly so tests and embedders can
/// substitute their own store; the coordinator keeps no ambient global
/// connection.
pub struct TransferCoordinator {
    ledger: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditLog>,
    sessions: SessionManager,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
}

impl TransferCoordinator {
    /// Create a coordinator over the given store handles.
    ///
    /// The three store handles will usually point at the same object; they
    /// are separate parameters because the contracts are separate.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        audit: Arc<dyn AuditLog>,
        transactions: Arc<dyn TransactionControl>,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            ledger,
            audit,
            sessions: SessionManager::new(transactions),
            clock,
            config,
        }
    }

    /// Move `amount` from one account to the other, atomically.
    ///
    /// Credit, debit, and audit record land together or not at all. On any
    /// failure the transaction is aborted, the session is closed, and the
    /// failure is returned; prior committed state is untouched. The caller
    /// decides whether to re-invoke — the coordinator never retries.
    ///
    /// # Errors
    ///
    /// - [`TransferError::InvalidAmount`]: `amount` is zero
    /// - [`TransferError::Session`]: no session could be acquired, or its
    ///   transaction could not be started
    /// - [`TransferError::Constraint`]: the debit would take the source
    ///   balance below zero
    /// - [`TransferError::Commit`]: the store rejected the commit
    /// - [`TransferError::Write`]: any other write failed
    pub async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        if amount.is_zero() {
            return Err(TransferError::InvalidAmount);
        }
        tracing::info!(from = %from, to = %to, amount = %amount, "starting transfer");

        let mut session = match timeout(self.config.session_timeout, self.sessions.begin()).await
        {
            Ok(Ok(session)) => session,
            Ok(Err(err)) => return Err(TransferError::Session(err)),
            Err(_) => {
                return Err(TransferError::Session(StoreError::SessionUnavailable {
                    reason: "session acquisition deadline exceeded".to_string(),
                }));
            }
        };

        let outcome = self.run(&mut session, from, to, amount).await;
        let result = match outcome {
            Ok(()) => {
                metrics::counter!("coordinator.transfers_committed").increment(1);
                tracing::info!(from = %from, to = %to, amount = %amount, "transfer committed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    from = %from,
                    to = %to,
                    amount = %amount,
                    error = %err,
                    "rolling back transfer"
                );
                if let Err(abort_err) = self.sessions.abort(&mut session).await {
                    tracing::warn!(
                        session = %session.id(),
                        error = %abort_err,
                        "abort failed; surfacing the original error"
                    );
                }
                metrics::counter!("coordinator.transfers_aborted").increment(1);
                Err(err)
            }
        };

        // The session is released on every path; a close failure is
        // reported but never masks the transfer outcome.
        if let Err(close_err) = self.sessions.close(&mut session).await {
            tracing::warn!(session = %session.id(), error = %close_err, "failed to close session");
        }
        result
    }

    /// The transaction body: everything between session acquisition and the
    /// abort/close bookkeeping in [`Self::transfer`].
    async fn run(
        &self,
        session: &mut Session,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.sessions
            .start_transaction(session)
            .await
            .map_err(TransferError::Session)?;

        // Credit first, then debit, then record: the order the original
        // workflow uses. The store's atomicity makes the order observable
        // only in the change feed.
        tracing::debug!(account = %to, amount = %amount, "crediting destination");
        self.ledger
            .apply_balance_change(Some(session.id()), to, amount.signed())
            .await
            .map_err(Self::classify_write)?;

        tracing::debug!(account = %from, amount = %amount, "debiting source");
        self.ledger
            .apply_balance_change(Some(session.id()), from, -amount.signed())
            .await
            .map_err(Self::classify_write)?;

        let record = TransferRecord::new(
            TransferId::new(),
            self.clock.now(),
            from.clone(),
            to.clone(),
            amount,
        );
        tracing::debug!(record = %record, "recording transfer");
        self.audit
            .append_transfer(Some(session.id()), record)
            .await
            .map_err(Self::classify_write)?;

        match timeout(self.config.commit_timeout, self.sessions.commit(session)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(TransferError::Commit(err)),
            Err(_) => Err(TransferError::Commit(StoreError::CommitFailed {
                reason: "commit deadline exceeded".to_string(),
            })),
        }
    }

    fn classify_write(err: StoreError) -> TransferError {
        match err {
            constraint @ StoreError::ConstraintViolation { .. } => {
                TransferError::Constraint(constraint)
            }
            other => TransferError::Write(other),
        }
    }

    /// Deposit into an account with a direct, unsessioned write.
    ///
    /// Contrast case: not atomic with any other operation. A concurrent
    /// [`Self::withdraw`] can fail and leave this deposit in place.
    ///
    /// # Errors
    ///
    /// - [`StoreError::WriteFailed`]: unknown account or storage failure
    pub async fn deposit(&self, account: &AccountId, amount: Amount) -> Result<(), StoreError> {
        tracing::info!(account = %account, amount = %amount, "depositing without a session");
        self.ledger
            .apply_balance_change(None, account, amount.signed())
            .await
    }

    /// Withdraw from an account with a direct, unsessioned write.
    ///
    /// Contrast case: the store's schema still rejects a withdrawal below
    /// zero, but nothing rolls back whatever happened around it.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ConstraintViolation`]: the balance would go negative
    /// - [`StoreError::WriteFailed`]: unknown account or storage failure
    pub async fn withdraw(&self, account: &AccountId, amount: Amount) -> Result<(), StoreError> {
        tracing::info!(account = %account, amount = %amount, "withdrawing without a session");
        self.ledger
            .apply_balance_change(None, account, -amount.signed())
            .await
    }
}
