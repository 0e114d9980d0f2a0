//! # Docledger Core
//!
//! Domain types and store contracts for the docledger transactional ledger.
//!
//! This crate defines the boundary between the transfer workflow and the
//! transactional document store that backs it. The store itself is an external
//! collaborator: it is expected to provide ACID multi-document transactions,
//! schema validation, and an ordered change notification feed. Everything in
//! this crate is either a domain type (accounts, transfer records), a contract
//! the store must satisfy, or an error the store may surface.
//!
//! ## Contracts
//!
//! - [`store::LedgerStore`]: account documents with a store-enforced
//!   non-negative balance constraint
//! - [`store::AuditLog`]: the append-only record of completed transfers
//! - [`store::TransactionControl`]: session lifecycle (begin, start
//!   transaction, commit, abort, close)
//! - [`change::ChangeFeed`]: ordered, push-based mutation notifications
//!
//! All four contracts are dyn-compatible (`Arc<dyn Trait>`), which is what
//! lets the transfer coordinator receive its store dependencies by injection
//! instead of through ambient global state.
//!
//! ## Sessions
//!
//! A [`session::SessionId`] is a capability token: every store operation that
//! must participate in the same atomic unit is threaded through the same
//! session. Operations invoked without a session are direct single-document
//! writes with no atomicity relationship to each other.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod account;
pub mod change;
pub mod environment;
pub mod session;
pub mod store;
pub mod transfer;
