//! Change feed types.
//!
//! The store emits an ordered, push-based stream of mutation events: one
//! event per committed write, carrying the operation kind, a cluster
//! ordering (timestamp plus monotonic sequence), and the post-operation
//! document when one exists. Writes staged under a session produce no events
//! until the session commits; an aborted session produces none at all.

use crate::store::Collection;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// The kind of mutation a change event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// A new document was inserted.
    Insert,
    /// An existing document was updated in place.
    Update,
    /// A document was replaced wholesale.
    Replace,
    /// A document was deleted.
    Delete,
}

impl OperationKind {
    /// Stable lowercase name for this operation kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mutation event from the store's change feed.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    /// Collection the mutation happened in.
    pub collection: Collection,
    /// What kind of mutation it was.
    pub kind: OperationKind,
    /// Wall-clock time the mutation was committed. Events committed in the
    /// same transaction share a cluster time; `sequence` orders them.
    pub cluster_time: DateTime<Utc>,
    /// Monotonic position in the store's total mutation order.
    pub sequence: u64,
    /// The post-operation document, when the operation leaves one.
    pub document: Option<serde_json::Value>,
}

/// Errors surfaced on the change feed.
#[derive(Error, Debug, Clone)]
pub enum ChangeFeedError {
    /// The subscriber fell behind and the store dropped events.
    ///
    /// The feed continues after this error; only the skipped events are
    /// lost. Consumers should log and keep reading.
    #[error("Change feed lagged: {skipped} events skipped")]
    Lagged {
        /// How many events were dropped.
        skipped: u64,
    },

    /// The feed was disconnected from the store.
    #[error("Change feed disconnected")]
    Disconnected,

    /// The subscription could not be established.
    #[error("Change feed subscription failed: {reason}")]
    SubscriptionFailed {
        /// Why the subscription failed.
        reason: String,
    },
}

/// Stream of change events from a [`ChangeFeed`] subscription.
///
/// Lazy, unbounded, and non-restartable: once the stream ends the consumer
/// must call [`ChangeFeed::watch`] again for a fresh subscription (which
/// resumes from the present, not from where the old stream stopped).
pub type ChangeStream = Pin<Box<dyn Stream<Item = Result<ChangeEvent, ChangeFeedError>> + Send>>;

/// Push-based mutation notifications for the whole store.
///
/// # Dyn Compatibility
///
/// Uses an explicit `Pin<Box<dyn Future>>` return instead of `async fn` to
/// enable trait object usage (`Arc<dyn ChangeFeed>`), matching the store
/// contracts in [`crate::store`].
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to mutation events for every collection.
    ///
    /// Events arrive in commit order with monotonically increasing
    /// [`ChangeEvent::sequence`]. The subscription starts at the present;
    /// past events are not replayed.
    ///
    /// # Errors
    ///
    /// - [`ChangeFeedError::SubscriptionFailed`]: the feed could not be
    ///   established
    fn watch(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ChangeStream, ChangeFeedError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_kind_names() {
        assert_eq!(OperationKind::Insert.as_str(), "insert");
        assert_eq!(OperationKind::Update.as_str(), "update");
        assert_eq!(OperationKind::Replace.as_str(), "replace");
        assert_eq!(OperationKind::Delete.as_str(), "delete");
    }

    #[test]
    fn lagged_error_display() {
        let error = ChangeFeedError::Lagged { skipped: 7 };
        assert!(format!("{error}").contains('7'));
    }
}
