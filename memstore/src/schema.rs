//! Account collection schema.
//!
//! The store, not the caller, owns the `balance >= 0` invariant. Every
//! write that produces an account document — direct or staged under a
//! transaction — passes through [`validate_account`] before it is accepted,
//! mirroring a document database's collection-level schema validator with
//! validation action `error`.

use docledger_core::account::Account;
use docledger_core::store::{Collection, StoreError};

/// Validate an account document against the collection schema.
///
/// Required: a non-empty string id and a non-negative integer balance.
///
/// # Errors
///
/// - [`StoreError::ConstraintViolation`]: the document violates the schema
pub fn validate_account(account: &Account) -> Result<(), StoreError> {
    if account.id.as_str().is_empty() {
        return Err(StoreError::ConstraintViolation {
            collection: Collection::Accounts,
            id: account.id.to_string(),
            reason: "id must be a non-empty string".to_string(),
        });
    }
    if account.balance < 0 {
        return Err(StoreError::ConstraintViolation {
            collection: Collection::Accounts,
            id: account.id.to_string(),
            reason: "balance must be a non-negative integer".to_string(),
        });
    }
    Ok(())
}
