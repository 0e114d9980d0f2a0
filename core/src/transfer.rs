//! Transfer audit records.
//!
//! A transfer record is the append-only audit trail entry written inside the
//! same transaction as the two balance updates it describes. It references
//! the accounts involved but does not own them.

use crate::account::{AccountId, Amount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a transfer record, assigned by the store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(Uuid);

impl TransferId {
    /// Create a new random `TransferId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TransferId` from a UUID.
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

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One completed transfer, immutable once written.
///
/// Written exactly once per successful transfer, inside the same session as
/// the balance updates. A transfer is visible in the audit trail if and only
/// if both balance mutations it describes were durably applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Record identifier.
    pub id: TransferId,
    /// When the transfer was recorded.
    pub timestamp: DateTime<Utc>,
    /// Source account.
    pub from: AccountId,
    /// Destination account.
    pub to: AccountId,
    /// Amount moved.
    pub amount: Amount,
}

impl TransferRecord {
    /// Create a new transfer record.
    #[must_use]
    pub const fn new(
        id: TransferId,
        timestamp: DateTime<Utc>,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Self {
        Self {
            id,
            timestamp,
            from,
            to,
            amount,
        }
    }

    /// Whether this record describes the given movement.
    #[must_use]
    pub fn matches(&self, from: &AccountId, to: &AccountId, amount: Amount) -> bool {
        self.from == *from && self.to == *to && self.amount == amount
    }
}

impl fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transfer of {} from '{}' to '{}' at {}",
            self.amount, self.from, self.to, self.timestamp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn transfer_record_matches() {
        let from = AccountId::new("bob");
        let to = AccountId::new("alice");
        let record = TransferRecord::new(
            TransferId::new(),
            Utc::now(),
            from.clone(),
            to.clone(),
            Amount::new(10),
        );

        assert!(record.matches(&from, &to, Amount::new(10)));
        assert!(!record.matches(&to, &from, Amount::new(10)));
        assert!(!record.matches(&from, &to, Amount::new(11)));
    }

    #[test]
    fn transfer_id_display_is_uuid() {
        let id = TransferId::new();
        assert_eq!(id.to_string(), id.as_uuid().to_string());
    }
}
