use std::sync::{Arc, mpsc};
use std::time::Duration;

use fieldline_engine::{EngineConfig, spawn_reconciler};
use fieldline_harness::*;
use fieldline_storage::SqliteStorage;
use time::macros::datetime;

fn fast(interval_ms: u64) -> EngineConfig {
    EngineConfig::default().with_reconcile_interval(Duration::from_millis(interval_ms))
}

async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn first_pass_runs_immediately() -> Result<(), Box<dyn std::error::Error>> {
    // Long interval: only the initial pass can do the promotion.
    let bench = TestBench::with_config(fast(60_000))?;
    let record = bench.create(&[(CONTRACT, SALARY, "100")])?;
    bench.schedule(record.id, CONTRACT, SALARY, "120", datetime!(2025-02-01 0:00 UTC))?;
    bench.advance_days(30);

    let handle = spawn_reconciler(Arc::clone(&bench.engine));
    let promoted = wait_for(|| {
        bench
            .field(record.id, CONTRACT, SALARY)
            .ok()
            .flatten()
            .is_some_and(|s| s.current_value == "120")
    })
    .await;
    handle.shutdown().await?;
    assert!(promoted);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn later_passes_pick_up_newly_due_changes() -> Result<(), Box<dyn std::error::Error>> {
    let bench = TestBench::with_config(fast(20))?;
    let record = bench.create(&[(CONTRACT, SALARY, "100")])?;
    bench.schedule(record.id, CONTRACT, SALARY, "120", datetime!(2025-02-01 0:00 UTC))?;

    let handle = spawn_reconciler(Arc::clone(&bench.engine));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(bench.field(record.id, CONTRACT, SALARY)?.unwrap().current_value, "100");

    bench.advance_days(30);
    let promoted = wait_for(|| {
        bench
            .field(record.id, CONTRACT, SALARY)
            .ok()
            .flatten()
            .is_some_and(|s| s.current_value == "120")
    })
    .await;
    handle.shutdown().await?;
    assert!(promoted);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_interrupts_the_delay() -> Result<(), Box<dyn std::error::Error>> {
    let bench = TestBench::with_config(fast(3_600_000))?;
    let handle = spawn_reconciler(Arc::clone(&bench.engine));
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown()).await??;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn loop_survives_a_failed_pass() -> Result<(), Box<dyn std::error::Error>> {
    let store = FaultyStore::new(Arc::new(SqliteStorage::open_in_memory()?));
    let bench = TestBench::over(Arc::new(store), fast(20))?;
    let record = bench.create(&[(CONTRACT, SALARY, "100")])?;
    bench.schedule(record.id, CONTRACT, SALARY, "120", datetime!(2025-02-01 0:00 UTC))?;
    bench.advance_days(30);

    bench.store().fail_next_listings(2);
    let handle = spawn_reconciler(Arc::clone(&bench.engine));
    let promoted = wait_for(|| {
        bench
            .field(record.id, CONTRACT, SALARY)
            .ok()
            .flatten()
            .is_some_and(|s| s.current_value == "120")
    })
    .await;
    assert!(!handle.is_finished());
    handle.shutdown().await?;
    assert!(promoted);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_during_a_pass_lets_its_writes_land() -> Result<(), Box<dyn std::error::Error>> {
    let store = FaultyStore::new(Arc::new(SqliteStorage::open_in_memory()?));
    let bench = TestBench::over(Arc::new(store), fast(10))?;
    let record = bench.create(&[(CONTRACT, SALARY, "100")])?;
    bench.schedule(record.id, CONTRACT, SALARY, "120", datetime!(2025-02-01 0:00 UTC))?;
    bench.advance_days(30);

    // Hold the first pass just before its write.
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    bench.store().interleave_before_replace(move |_: &SqliteStorage| {
        let _ = entered_tx.send(());
        let _ = release_rx.recv();
    });

    let handle = spawn_reconciler(Arc::clone(&bench.engine));
    tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(5))).await??;

    let stopping = tokio::spawn(handle.shutdown());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopping.is_finished());

    release_tx.send(())?;
    tokio::time::timeout(Duration::from_secs(5), stopping).await???;

    let salary = bench.field(record.id, CONTRACT, SALARY)?.unwrap();
    assert_eq!(salary.current_value, "120");
    assert_eq!(salary.history.len(), 1);
    assert_eq!(bench.store().id_listings(), 1);
    Ok(())
}
