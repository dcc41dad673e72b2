//! Executes one claimed task: sleep for its simulated duration, then commit
//! a terminal transition. A worker never renews its lease — a task whose
//! actual execution outruns `lease_ms` is recovered in parallel by the
//! scheduler's sweep, and the `status = RUNNING` guard on the terminal
//! update resolves whichever side loses the race.

use std::time::Duration;

use dts_store::domain::now_ms;
use dts_store::{repository, Claim, Store, StoreError};
use tracing::{debug, info, warn};

/// Sleep for `claim.duration_ms`, then mark the task completed. Any
/// unexpected condition along the way (a panicked blocking task, an I/O
/// failure opening the completion connection) is treated as execution
/// failure: it is logged and a best-effort `mark_failed` is attempted
/// rather than leaving the task to the lease-expiry sweep alone.
pub async fn run(store: Store, claim: Claim) {
    tokio::time::sleep(Duration::from_millis(claim.duration_ms.max(0) as u64)).await;

    let id = claim.id.clone();
    let completion = {
        let store = store.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut conn = store.connect()?;
            repository::mark_completed(&mut conn, &id, now_ms())
        })
        .await
    };

    match completion {
        Ok(Ok(())) => debug!(id = %id, "task completed"),
        Ok(Err(StoreError::Conflict { .. })) => {
            // Lost the race to a recovery-driven requeue/fail of the same
            // lease; expected under lease-expiry races, not an error.
            info!(id = %id, "completion lost the race, task already transitioned");
        }
        Ok(Err(err)) => warn!(id = %id, error = %err, "failed to commit completion"),
        Err(join_err) => {
            warn!(id = %id, error = %join_err, "completion task panicked; marking task failed");
            mark_failed_best_effort(&store, &id, "worker panicked during completion").await;
        }
    }
}

async fn mark_failed_best_effort(store: &Store, id: &str, error: &str) {
    let store = store.clone();
    let id = id.to_string();
    let error = error.to_string();
    let result = tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
        let mut conn = store.connect()?;
        repository::mark_failed(&mut conn, &id, now_ms(), &error)
    })
    .await;

    match result {
        Ok(Ok(())) | Ok(Err(StoreError::Conflict { .. })) => {}
        Ok(Err(err)) => warn!(error = %err, "failed to mark panicked task as failed"),
        Err(join_err) => warn!(error = %join_err, "the mark_failed recovery task itself panicked"),
    }
}
