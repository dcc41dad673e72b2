//! The scheduler's tick loop: recovery, capacity computation, claim,
//! dispatch. Runs on a dedicated OS thread driving its own single-threaded
//! Tokio runtime, so its blocking database calls never contend with the
//! HTTP server's reactor and a slow tick never delays request handling.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dts_store::domain::now_ms;
use dts_store::{repository, Claim, Store};
use rusqlite::Connection;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};

use crate::config::{Config, CLAIM_BATCH_SIZE, RECOVERY_INTERVAL_MS};
use crate::engine::worker;

/// Handle to the running scheduler loop and its bounded worker pool.
pub struct Scheduler {
    stop: Arc<Notify>,
    thread: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Runs an initial recovery pass synchronously so capacity is accurate
    /// on the first tick after a restart, then spawns the tick loop.
    pub fn spawn(store: Store, config: Config) -> anyhow::Result<Self> {
        {
            let mut conn = store.connect()?;
            let recovered = repository::recover_stale_running(&mut conn, now_ms())?;
            if recovered > 0 {
                info!(count = recovered, "initial recovery pass transitioned stale running tasks");
            }
        }

        let stop = Arc::new(Notify::new());
        let stop_for_loop = stop.clone();
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1) as usize));

        let thread = thread::Builder::new()
            .name("dts-scheduler".to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .expect("failed to build the scheduler's runtime");
                rt.block_on(run(store, config, semaphore, stop_for_loop));
            })
            .expect("failed to spawn the scheduler thread");

        Ok(Self { stop, thread: Some(thread) })
    }

    /// Signal the loop to exit and wait up to `timeout` for it to finish.
    /// In-flight worker tasks are not cancelled; their completions still
    /// commit against the store after this call returns.
    pub fn stop(mut self, timeout: Duration) {
        self.stop.notify_one();
        let Some(handle) = self.thread.take() else { return };

        let (tx, rx) = std_mpsc::channel();
        thread::spawn(move || {
            let _ = handle.join();
            let _ = tx.send(());
        });
        if rx.recv_timeout(timeout).is_err() {
            warn!("scheduler loop did not stop within the shutdown timeout");
        }
    }
}

async fn run(store: Store, config: Config, semaphore: Arc<Semaphore>, stop: Arc<Notify>) {
    let mut conn = match store.connect() {
        Ok(conn) => conn,
        Err(err) => {
            tracing::error!(error = %err, "scheduler could not open its dedicated connection");
            return;
        }
    };

    let mut last_recovery = now_ms();
    let tick = config.sched_tick();

    loop {
        tick_once(&mut conn, &store, &config, &semaphore, &mut last_recovery);

        tokio::select! {
            _ = stop.notified() => {
                debug!("scheduler stop signal received");
                break;
            }
            _ = tokio::time::sleep(tick) => {}
        }
    }
}

fn tick_once(
    conn: &mut Connection,
    store: &Store,
    config: &Config,
    semaphore: &Arc<Semaphore>,
    last_recovery: &mut i64,
) {
    let now = now_ms();

    if now - *last_recovery >= RECOVERY_INTERVAL_MS {
        match repository::recover_stale_running(conn, now) {
            Ok(0) => {}
            Ok(n) => info!(count = n, "recovered stale running tasks"),
            Err(err) => warn!(error = %err, "recovery pass failed, continuing tick"),
        }
        *last_recovery = now;
    }

    let running = match repository::count_running_leased(conn, now) {
        Ok(n) => n,
        Err(err) => {
            warn!(error = %err, "failed to compute running capacity, skipping claim this tick");
            return;
        }
    };

    let slots = config.max_concurrent_tasks - running;
    if slots <= 0 {
        return;
    }
    let limit = slots.min(CLAIM_BATCH_SIZE);

    let claims = match repository::claim_runnable_tasks(conn, now, config.lease_ms, limit) {
        Ok(c) => c,
        Err(err) => {
            warn!(error = %err, "claim failed, continuing tick");
            return;
        }
    };

    for claim in claims {
        dispatch(store.clone(), semaphore.clone(), claim);
    }
}

/// Hand one claim to a semaphore-gated worker task, with a supervising task
/// that logs a worker-side panic (the completion callback spec.md's
/// scheduler tick step 4 calls for).
fn dispatch(store: Store, semaphore: Arc<Semaphore>, claim: Claim) {
    let id = claim.id.clone();
    let handle = tokio::spawn(async move {
        let permit = semaphore
            .acquire_owned()
            .await
            .expect("scheduler semaphore is never closed while the loop runs");
        worker::run(store, claim).await;
        drop(permit);
    });

    tokio::spawn(async move {
        if let Err(join_err) = handle.await {
            tracing::error!(id = %id, error = %join_err, "worker task panicked");
        }
    });
}
