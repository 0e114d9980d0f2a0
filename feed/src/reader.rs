//! Change feed consumption and formatting.
//!
//! `ChangeFeedReader` handles the transport side of watching a store:
//! subscribing, rendering each event in arrival order, skipping events that
//! fail, and resubscribing when a stream ends. The caller supplies the sink
//! the rendered lines go to, so the reader works the same whether the lines
//! end up on a console, in a log, or in a test's buffer.

use docledger_core::change::{ChangeEvent, ChangeFeed, ChangeFeedError};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Render one change event as a log line.
///
/// Format: `YYYY-MM-DD HH:MM:SS => OPERATION: document`, with `<none>` when
/// the operation carries no post-operation document.
#[must_use]
pub fn format_event(event: &ChangeEvent) -> String {
    let time = event.cluster_time.format("%Y-%m-%d %H:%M:%S");
    let kind = event.kind.as_str().to_ascii_uppercase();
    let document = event
        .document
        .as_ref()
        .map_or_else(|| "<none>".to_string(), ToString::to_string);
    format!("{time} => {kind}: {document}")
}

/// Consumes a store's change feed and emits one formatted line per event.
///
/// # Fault handling
///
/// - a failed event (for example [`ChangeFeedError::Lagged`]) is logged and
///   skipped; the subscription continues
/// - a stream that ends is resubscribed after a short delay; the new
///   subscription resumes from the present
/// - the reader stops when the shutdown signal flips to `true` or its
///   sender is dropped
pub struct ChangeFeedReader {
    feed: Arc<dyn ChangeFeed>,
    resubscribe_delay: Duration,
    events_seen: u64,
}

impl ChangeFeedReader {
    /// Create a reader over the given feed.
    #[must_use]
    pub fn new(feed: Arc<dyn ChangeFeed>) -> Self {
        Self {
            feed,
            resubscribe_delay: Duration::from_millis(500),
            events_seen: 0,
        }
    }

    /// Override the delay before resubscribing after the stream ends.
    #[must_use]
    pub const fn with_resubscribe_delay(mut self, resubscribe_delay: Duration) -> Self {
        self.resubscribe_delay = resubscribe_delay;
        self
    }

    /// How many events this reader has rendered so far.
    #[must_use]
    pub const fn events_seen(&self) -> u64 {
        self.events_seen
    }

    /// Watch the feed until the shutdown signal fires.
    ///
    /// Each event is rendered with [`format_event`] and handed to `emit` in
    /// arrival order.
    ///
    /// # Errors
    ///
    /// - [`ChangeFeedError::SubscriptionFailed`]: a (re)subscription could
    ///   not be established
    pub async fn run<F>(
        &mut self,
        mut emit: F,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ChangeFeedError>
    where
        F: FnMut(&str) + Send,
    {
        loop {
            let mut stream = self.feed.watch().await?;
            tracing::info!("change feed subscribed");

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!(events = self.events_seen, "change feed reader stopping");
                            return Ok(());
                        }
                    }
                    item = stream.next() => match item {
                        Some(Ok(event)) => {
                            self.events_seen += 1;
                            emit(&format_event(&event));
                        }
                        Some(Err(err)) => {
                            // One bad event must not end the subscription.
                            tracing::warn!(error = %err, "skipping change event");
                        }
                        None => {
                            tracing::info!("change stream ended; resubscribing");
                            break;
                        }
                    }
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(events = self.events_seen, "change feed reader stopping");
                        return Ok(());
                    }
                }
                () = tokio::time::sleep(self.resubscribe_delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use docledger_core::change::OperationKind;
    use docledger_core::store::Collection;

    fn event(kind: OperationKind, document: Option<serde_json::Value>) -> ChangeEvent {
        ChangeEvent {
            collection: Collection::Accounts,
            kind,
            cluster_time: Utc.with_ymd_and_hms(2025, 1, 1, 12, 30, 0).unwrap(),
            sequence: 1,
            document,
        }
    }

    #[test]
    fn formats_update_with_document() {
        let line = format_event(&event(
            OperationKind::Update,
            Some(serde_json::json!({"id": "alice", "balance": 120})),
        ));
        assert_eq!(
            line,
            "2025-01-01 12:30:00 => UPDATE: {\"balance\":120,\"id\":\"alice\"}"
        );
    }

    #[test]
    fn formats_delete_without_document() {
        let line = format_event(&event(OperationKind::Delete, None));
        assert_eq!(line, "2025-01-01 12:30:00 => DELETE: <none>");
    }
}
