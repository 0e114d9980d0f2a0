//! End-to-end tests for the change feed reader against the in-memory store.

#![allow(clippy::unwrap_used)]

use docledger_core::account::Amount;
use docledger_core::change::ChangeFeed;
use docledger_coordinator::transfer::{CoordinatorConfig, TransferCoordinator};
use docledger_feed::ChangeFeedReader;
use docledger_testing::helpers::seeded_store;
use docledger_testing::test_clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[tokio::test]
async fn reader_renders_committed_transfer_events_in_order() {
    let ledger = seeded_store().await;
    let coordinator = TransferCoordinator::new(
        ledger.store.clone(),
        ledger.store.clone(),
        ledger.store.clone(),
        Arc::new(test_clock()),
        CoordinatorConfig::default(),
    );

    let (lines_tx, mut lines_rx) = mpsc::unbounded_channel::<String>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let feed: Arc<dyn ChangeFeed> = ledger.store.clone();
    let mut reader = ChangeFeedReader::new(feed);
    let handle = tokio::spawn(async move {
        reader
            .run(
                move |line| {
                    let _ = lines_tx.send(line.to_string());
                },
                shutdown_rx,
            )
            .await
    });

    // Let the reader establish its subscription before mutating anything.
    tokio::time::sleep(Duration::from_millis(50)).await;

    coordinator
        .transfer(&ledger.bob, &ledger.alice, Amount::new(10))
        .await
        .unwrap();

    let mut lines = Vec::new();
    for _ in 0..3 {
        let line = tokio::time::timeout(Duration::from_secs(1), lines_rx.recv())
            .await
            .unwrap()
            .unwrap();
        lines.push(line);
    }

    // Credit, debit, record: the order the coordinator staged them in.
    assert!(lines[0].contains("UPDATE"));
    assert!(lines[0].contains("\"id\":\"alice\""));
    assert!(lines[0].contains("\"balance\":30"));
    assert!(lines[1].contains("UPDATE"));
    assert!(lines[1].contains("\"id\":\"bob\""));
    assert!(lines[1].contains("\"balance\":10"));
    assert!(lines[2].contains("INSERT"));
    assert!(lines[2].contains("\"from\":\"bob\""));
    assert!(lines[2].contains("\"to\":\"alice\""));

    // The fixture clock pins every cluster time.
    assert!(lines[0].starts_with("2025-01-01 00:00:00 => "));

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn reader_stops_on_shutdown_signal_without_events() {
    let ledger = seeded_store().await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let feed: Arc<dyn ChangeFeed> = ledger.store.clone();
    let mut reader = ChangeFeedReader::new(feed);
    let handle = tokio::spawn(async move {
        reader.run(|_line| {}, shutdown_rx).await?;
        Ok::<u64, docledger_core::change::ChangeFeedError>(reader.events_seen())
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown_tx.send(true).unwrap();

    let events_seen = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(events_seen, 0);
}

#[tokio::test]
async fn rolled_back_transfer_produces_no_lines() {
    let ledger = seeded_store().await;
    let coordinator = TransferCoordinator::new(
        ledger.store.clone(),
        ledger.store.clone(),
        ledger.store.clone(),
        Arc::new(test_clock()),
        CoordinatorConfig::default(),
    );

    let (lines_tx, mut lines_rx) = mpsc::unbounded_channel::<String>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let feed: Arc<dyn ChangeFeed> = ledger.store.clone();
    let mut reader = ChangeFeedReader::new(feed);
    let handle = tokio::spawn(async move {
        reader
            .run(
                move |line| {
                    let _ = lines_tx.send(line.to_string());
                },
                shutdown_rx,
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    // More than bob holds: the transaction aborts and emits nothing.
    assert!(
        coordinator
            .transfer(&ledger.bob, &ledger.alice, Amount::new(520))
            .await
            .is_err()
    );

    let nothing = tokio::time::timeout(Duration::from_millis(200), lines_rx.recv()).await;
    assert!(nothing.is_err(), "expected no change feed lines");

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}
