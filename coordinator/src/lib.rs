//! # Docledger Coordinator
//!
//! Orchestration of one multi-step business transaction: the funds transfer.
//!
//! Two components live here:
//!
//! - [`session::SessionManager`]: wraps the store's session lifecycle in a
//!   handle whose state machine guarantees exactly-once resolution (a
//!   session ends committed or aborted, never both) and exactly-once close.
//! - [`transfer::TransferCoordinator`]: runs the transfer itself — credit,
//!   debit, audit record, commit — inside one session, aborting on any step
//!   failure and always closing the session afterwards.
//!
//! The coordinator holds no locks and no shared mutable state between
//! calls; isolation of concurrent transfers is entirely the store's job.
//! Store dependencies arrive as `Arc<dyn Trait>` so tests and embedders can
//! substitute their own store.

pub mod session;
pub mod transfer;
