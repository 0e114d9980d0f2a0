//! Session identity.
//!
//! A session is a transient handle representing one logical transaction's
//! scope. The store allocates the identifier; the coordinator threads it
//! through every operation that must land in the same atomic unit. The state
//! machine that governs a session (`open -> committed | aborted`, then
//! closed) lives with the session manager, not here; the id itself is just
//! the capability token.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one store-allocated transaction session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Allocate a fresh session id.
    ///
    /// Called by store implementations when a session is begun; application
    /// code receives ids from [`crate::store::TransactionControl::begin_session`]
    /// rather than minting its own.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `SessionId` from a UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Return the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
