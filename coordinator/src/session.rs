//! Session handles and the session manager.
//!
//! A [`Session`] is the coordinator-side view of one store session: the
//! store-allocated id plus a state machine enforcing that the session
//! resolves exactly once (`open -> committed | aborted`) and closes exactly
//! once. The [`SessionManager`] is the only thing that moves a session
//! between states, so a handle can never observe an impossible transition.

use docledger_core::session::SessionId;
use docledger_core::store::{StoreError, TransactionControl};
use std::sync::Arc;

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Begun, no transaction started yet.
    Idle,
    /// A transaction is open and accumulating operations.
    Open,
    /// Terminal: the transaction was durably applied.
    Committed,
    /// Terminal: the transaction was discarded.
    Aborted,
}

impl SessionState {
    /// Whether the session has reached one of its two terminal resolutions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

/// Handle for one in-flight unit of work.
///
/// Owns no data; it is the capability token threaded through every store
/// operation that must participate in the same atomic unit. Obtained from
/// [`SessionManager::begin`] and driven only through the manager.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    closed: bool,
}

impl Session {
    /// The store-allocated session id.
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the underlying store session has been released.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Opens and resolves transaction sessions against a store.
///
/// Cloneable-by-wrapping: the manager itself is just an `Arc<dyn
/// TransactionControl>`, so constructing one per coordinator is cheap.
pub struct SessionManager {
    store: Arc<dyn TransactionControl>,
}

impl SessionManager {
    /// Create a manager over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn TransactionControl>) -> Self {
        Self { store }
    }

    /// Acquire a new session.
    ///
    /// # Errors
    ///
    /// - [`StoreError::SessionUnavailable`]: the store cannot allocate one
    pub async fn begin(&self) -> Result<Session, StoreError> {
        let id = self.store.begin_session().await?;
        Ok(Session {
            id,
            state: SessionState::Idle,
            closed: false,
        })
    }

    /// Start a transaction on the session.
    ///
    /// # Errors
    ///
    /// - [`StoreError::TransactionAlreadyActive`]: the session already has
    ///   an open or resolved transaction
    pub async fn start_transaction(&self, session: &mut Session) -> Result<(), StoreError> {
        if session.state != SessionState::Idle {
            return Err(StoreError::TransactionAlreadyActive {
                session: session.id.clone(),
            });
        }
        self.store.start_transaction(&session.id).await?;
        session.state = SessionState::Open;
        Ok(())
    }

    /// Durably apply all operations performed under the session.
    ///
    /// On failure the session stays open so the caller can (and must)
    /// abort it.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NoActiveTransaction`]: no transaction is open
    /// - [`StoreError::CommitFailed`]: the store rejected the commit
    pub async fn commit(&self, session: &mut Session) -> Result<(), StoreError> {
        if session.state != SessionState::Open {
            return Err(StoreError::NoActiveTransaction {
                session: session.id.clone(),
            });
        }
        self.store.commit_transaction(&session.id).await?;
        session.state = SessionState::Committed;
        Ok(())
    }

    /// Discard all operations performed under the session.
    ///
    /// Safe on any state: aborting a terminal session is a no-op, and an
    /// idle session simply resolves as aborted without a store round trip.
    ///
    /// # Errors
    ///
    /// - [`StoreError::WriteFailed`]: the store no longer knows the session
    pub async fn abort(&self, session: &mut Session) -> Result<(), StoreError> {
        match session.state {
            SessionState::Committed | SessionState::Aborted => Ok(()),
            SessionState::Idle => {
                session.state = SessionState::Aborted;
                Ok(())
            }
            SessionState::Open => {
                self.store.abort_transaction(&session.id).await?;
                session.state = SessionState::Aborted;
                Ok(())
            }
        }
    }

    /// Release the session's resources.
    ///
    /// Idempotent; must be invoked once per session regardless of outcome.
    /// A transaction still open at close time is aborted first — a failure
    /// of that abort is logged and does not prevent the close.
    ///
    /// # Errors
    ///
    /// - [`StoreError::WriteFailed`]: releasing the underlying session failed
    pub async fn close(&self, session: &mut Session) -> Result<(), StoreError> {
        if session.closed {
            return Ok(());
        }
        if session.state == SessionState::Open {
            tracing::debug!(session = %session.id, "closing session with an open transaction");
            if let Err(abort_err) = self.store.abort_transaction(&session.id).await {
                tracing::warn!(
                    session = %session.id,
                    error = %abort_err,
                    "abort during close failed"
                );
            }
            session.state = SessionState::Aborted;
        }
        self.store.close_session(&session.id).await?;
        session.closed = true;
        Ok(())
    }
}
