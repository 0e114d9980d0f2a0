//! # Docledger Testing
//!
//! Testing utilities for the docledger workspace:
//!
//! - Deterministic [`mocks::FixedClock`] for reproducible timestamps
//! - [`helpers::seeded_store`] with the two-account fixture the end-to-end
//!   scenarios start from

use chrono::{DateTime, Utc};
use docledger_core::environment::Clock;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use docledger_testing::mocks::FixedClock;
    /// use docledger_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Fixtures shared by the workspace's end-to-end tests.
#[allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#[allow(clippy::missing_panics_doc)]
pub mod helpers {
    use super::mocks::test_clock;
    use docledger_core::account::{Account, AccountId};
    use docledger_core::store::LedgerStore;
    use docledger_memstore::MemoryStore;
    use std::sync::Arc;

    /// A freshly seeded ledger: `alice` and `bob`, 20 units each.
    pub struct SeededLedger {
        /// The store backing the fixture.
        pub store: Arc<MemoryStore>,
        /// The `alice` account id.
        pub alice: AccountId,
        /// The `bob` account id.
        pub bob: AccountId,
    }

    /// Build the two-account fixture the end-to-end scenarios start from.
    ///
    /// The store uses [`test_clock`] so change event cluster times are
    /// deterministic.
    pub async fn seeded_store() -> SeededLedger {
        let store = Arc::new(
            MemoryStore::builder()
                .clock(Arc::new(test_clock()))
                .build(),
        );
        let alice = AccountId::new("alice");
        let bob = AccountId::new("bob");
        store
            .create_account(Account::new(alice.clone(), 20))
            .await
            .unwrap();
        store
            .create_account(Account::new(bob.clone(), 20))
            .await
            .unwrap();
        SeededLedger { store, alice, bob }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[tokio::test]
    async fn seeded_store_has_both_accounts() {
        use docledger_core::store::LedgerStore;

        let ledger = helpers::seeded_store().await;
        let accounts = ledger.store.accounts().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id, ledger.alice);
        assert_eq!(accounts[0].balance, 20);
        assert_eq!(accounts[1].id, ledger.bob);
        assert_eq!(accounts[1].balance, 20);
    }
}
