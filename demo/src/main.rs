//! Narrated docledger demo.
//!
//! Reproduces the classic two-account walkthrough end to end: first a pair
//! of unsessioned writes that race past each other, then a transactional
//! transfer that commits, then one that rolls back — while a change feed
//! reader prints every committed mutation as it lands.

use anyhow::Context;
use docledger_core::account::{Account, AccountId, Amount};
use docledger_core::change::ChangeFeed;
use docledger_core::environment::SystemClock;
use docledger_core::store::{AuditLog, LedgerStore};
use docledger_coordinator::transfer::{CoordinatorConfig, TransferCoordinator};
use docledger_feed::ChangeFeedReader;
use docledger_feed::report::monthly_totals;
use docledger_memstore::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn print_database_state(store: &Arc<MemoryStore>) -> anyhow::Result<()> {
    println!("Database state:");
    for account in store.accounts().await.context("reading accounts")? {
        println!("  {account}");
    }
    for transfer in store.transfers().await.context("reading transfers")? {
        println!("  {transfer}");
    }
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docledger_demo=info,docledger_coordinator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Docledger: Multi-Document Transactions ===\n");

    let store = Arc::new(MemoryStore::new());
    let alice = AccountId::new("alice");
    let bob = AccountId::new("bob");

    // Watch the change feed in the background; every committed mutation is
    // printed as it lands.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed: Arc<dyn ChangeFeed> = store.clone();
    let mut reader = ChangeFeedReader::new(feed);
    let watcher = tokio::spawn(async move {
        reader
            .run(|line| println!("  [feed] {line}"), shutdown_rx)
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("Seeding accounts alice=20, bob=20...");
    store
        .create_account(Account::new(alice.clone(), 20))
        .await
        .context("seeding alice")?;
    store
        .create_account(Account::new(bob.clone(), 20))
        .await
        .context("seeding bob")?;

    let coordinator = TransferCoordinator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(SystemClock),
        CoordinatorConfig::default(),
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    print_database_state(&store).await?;

    println!("######### Without a transaction #########");
    println!("Bob pays Alice with two separate writes;");
    println!("each applies on its own, so a failure strands the other.");
    println!("--------------------------------------------------------");

    println!("Trying to deposit 100 to alice ...");
    coordinator.deposit(&alice, Amount::new(100)).await?;

    println!("Trying to withdraw 100 from bob ...");
    match coordinator.withdraw(&bob, Amount::new(100)).await {
        Ok(()) => println!("withdrawal applied"),
        Err(err) => println!("#### BALANCE CANNOT BE NEGATIVE: {err} ####"),
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    print_database_state(&store).await?;

    println!("######### With a transaction #########");
    println!("Bob transfers 10 to Alice; both balance changes and the");
    println!("audit record land in one atomic unit.");
    println!("--------------------------------------------------------");

    coordinator
        .transfer(&bob, &alice, Amount::new(10))
        .await
        .context("transferring 10 from bob to alice")?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    print_database_state(&store).await?;

    println!("######### With a transaction, insufficient funds #########");
    println!("Bob transfers 520 to Alice; the debit violates the balance");
    println!("constraint and the whole transaction rolls back.");
    println!("--------------------------------------------------------");

    match coordinator.transfer(&bob, &alice, Amount::new(520)).await {
        Ok(()) => println!("transfer applied (unexpected)"),
        Err(err) => println!("#### ROLLBACK TRANSACTION: {err} ####"),
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    print_database_state(&store).await?;

    println!("Monthly totals by source account:");
    let transfers = store.transfers().await.context("reading transfers")?;
    for total in monthly_totals(&transfers) {
        println!("  {total}");
    }

    let _ = shutdown_tx.send(true);
    watcher
        .await
        .context("joining the change feed watcher")?
        .context("change feed watcher failed")?;

    println!("\n=== Demo complete ===");
    Ok(())
}
