//! spec.md §8 scenario 6, "crash recovery": a row pre-seeded directly in
//! RUNNING state with an already-expired lease must be picked up by the
//! scheduler's startup recovery pass and driven to completion.

mod common;

use std::time::Duration;

use common::TestServer;
use dts_store::domain::now_ms;

#[tokio::test]
async fn stale_running_task_is_recovered_and_completes() {
    let store = TestServer::fresh_store();

    {
        let conn = store.connect().unwrap();
        let now = now_ms();
        conn.execute(
            "INSERT INTO tasks
                (id, type, duration_ms, status, remaining_deps, attempts, max_attempts,
                 created_at, updated_at, started_at, finished_at, lease_expires_at, last_error)
             VALUES
                ('stale-task', 'data_processing', 50, 'RUNNING', 0, 0, 3,
                 ?1, ?1, ?1, NULL, ?2, NULL)",
            rusqlite::params![now, now - 1_000],
        )
        .unwrap();
    }

    let server = TestServer::start_with_store(store, 3).await;

    let task = server
        .wait_for_status("stale-task", &["COMPLETED"], Duration::from_secs(3))
        .await;
    assert_eq!(task["status"], "COMPLETED");
    assert!(task["attempts"].as_i64().unwrap() >= 1);
}
