//! # Docledger Feed
//!
//! Read-side consumers of the ledger: the change feed reader, which turns
//! the store's mutation stream into ordered, human-readable lines, and the
//! monthly audit report over transfer records.
//!
//! The reader has no interaction with the transfer coordinator; it is a
//! stateless observer of whatever the store commits.

mod reader;
pub mod report;

pub use reader::{ChangeFeedReader, format_event};
