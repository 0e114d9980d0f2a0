//! # Docledger Memstore
//!
//! In-memory implementation of the docledger store contracts: account
//! documents with schema validation, session-scoped multi-document
//! transactions, and a change feed of committed mutations.
//!
//! [`MemoryStore`] is the test double the core contracts call for, and is
//! complete enough to back the demo end to end:
//!
//! - the account schema (`balance >= 0`) is validated on every write, both
//!   direct and staged, so a debit that would go negative is rejected at the
//!   write inside the transaction rather than at commit
//! - writes staged under a session are invisible to reads until the session
//!   commits, and are dropped wholesale on abort
//! - each account document carries a version; commit re-checks the version
//!   of every touched document and rejects the transaction with
//!   `CommitFailed` when a concurrent session got there first
//! - committed mutations are broadcast on the change feed in commit order
//!
//! # Example
//!
//! ```
//! use docledger_core::account::{Account, AccountId};
//! use docledger_core::store::{LedgerStore, TransactionControl};
//! use docledger_memstore::MemoryStore;
//!
//! # async fn example() -> Result<(), docledger_core::store::StoreError> {
//! let store = MemoryStore::new();
//! store.create_account(Account::new(AccountId::new("alice"), 20)).await?;
//!
//! let session = store.begin_session().await?;
//! store.start_transaction(&session).await?;
//! store.apply_balance_change(Some(&session), &AccountId::new("alice"), 10).await?;
//! store.commit_transaction(&session).await?;
//! store.close_session(&session).await?;
//! # Ok(())
//! # }
//! ```

pub mod schema;
mod store;

pub use store::{MemoryStore, MemoryStoreBuilder};
