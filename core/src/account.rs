//! Account identity, balance, and amount types.
//!
//! An account is the smallest document the ledger store manages: an immutable
//! string identifier plus a balance. The store enforces `balance >= 0` at the
//! schema level on every committed write; nothing in this crate ever checks
//! the constraint on the store's behalf.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for [`AccountId`] parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid account id: {0}")]
pub struct ParseAccountIdError(String);

/// Unique identifier for a ledger account.
///
/// `AccountId` is a newtype wrapper around `String` that provides type safety
/// (a transfer source cannot accidentally be swapped with a free-form label)
/// and clear intent in function signatures.
///
/// # Validation
///
/// - `FromStr::from_str()`: validates input (rejects empty strings)
/// - `From::from()` and `new()`: no validation, for application-controlled data
///
/// # Examples
///
/// ```
/// use docledger_core::account::AccountId;
///
/// let id = AccountId::new("alice");
/// assert_eq!(id.as_str(), "alice");
///
/// let parsed: AccountId = "bob".parse().unwrap();
/// assert_eq!(parsed, AccountId::new("bob"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create a new `AccountId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the account id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `AccountId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = ParseAccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseAccountIdError(
                "Account id cannot be empty".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A positive integer amount of money moved by a transfer.
///
/// Amounts are whole units (the original ledger works in integers, not
/// fractional currency). The type itself permits zero so that callers can
/// construct and then validate; the transfer coordinator rejects zero amounts
/// before opening a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    /// Create an amount from whole units.
    #[must_use]
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    /// The amount in whole units.
    #[must_use]
    pub const fn units(&self) -> u64 {
        self.0
    }

    /// Whether this amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The amount as a signed balance delta, saturating at `i64::MAX`.
    ///
    /// Balances are signed so that a candidate debit can be computed before
    /// the store validates it; amounts beyond `i64::MAX` cannot be
    /// represented as a delta and saturate.
    #[must_use]
    pub fn signed(&self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An account document as stored in the ledger.
///
/// The `balance >= 0` invariant is declared at the store's schema level and
/// enforced on every committed write; a write that would violate it is
/// rejected by the store, not by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier, immutable after creation.
    pub id: AccountId,
    /// Current balance in whole units. Never negative in committed state.
    pub balance: i64,
}

impl Account {
    /// Create a new account document.
    #[must_use]
    pub const fn new(id: AccountId, balance: i64) -> Self {
        Self { id, balance }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account '{}': balance {}", self.id, self.balance)
    }
}
