//! Shared harness for the API integration tests: boots a real server
//! (store + scheduler + axum) bound to an ephemeral port, the way the
//! teacher's `TestServerBuilder` spins up a full `raiko-host` instance for
//! its own `tests/` suite.

use std::path::PathBuf;
use std::time::Duration;

use dts::api::{self, AppState};
use dts::config::Config;
use dts::engine::Scheduler;
use dts_store::{schema, Store};
use tokio::net::TcpListener;

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    pub store: Store,
    scheduler: Option<Scheduler>,
}

impl TestServer {
    /// Fresh temp-file database with migrations applied, no scheduler or
    /// HTTP server started yet — lets a test seed rows directly before the
    /// scheduler's startup recovery pass would otherwise run.
    pub fn fresh_store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("tasks.db");
        // Tests are short-lived processes; leak the tempdir so the file
        // outlives this function instead of trying to thread its lifetime
        // through the server.
        std::mem::forget(dir);

        let store = Store::new(path);
        let mut conn = store.connect().unwrap();
        schema::apply_migrations(&mut conn, dts_store::schema::migrations_dir()).unwrap();
        store
    }

    pub async fn start(max_concurrent_tasks: i64) -> Self {
        Self::start_with_store(Self::fresh_store(), max_concurrent_tasks).await
    }

    pub async fn start_with_store(store: Store, max_concurrent_tasks: i64) -> Self {
        let config = Config {
            db_path: store.path().to_path_buf(),
            max_concurrent_tasks,
            sched_tick_ms: 20,
            lease_ms: 2_000,
            max_attempts: 3,
            host: "127.0.0.1".to_string(),
            port: 0,
            log_level: "error".to_string(),
        };

        let scheduler = Scheduler::spawn(store.clone(), config.clone()).unwrap();

        let state = AppState {
            store: store.clone(),
            default_max_attempts: config.max_attempts,
        };
        let router = api::create_router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            store,
            scheduler: Some(scheduler),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Poll `GET /tasks/{id}` until `status` matches one of `want`, or panic
    /// after `timeout`.
    pub async fn wait_for_status(&self, id: &str, want: &[&str], timeout: Duration) -> serde_json::Value {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let resp = self.client.get(self.url(&format!("/tasks/{id}"))).send().await.unwrap();
            if resp.status().is_success() {
                let body: serde_json::Value = resp.json().await.unwrap();
                if let Some(status) = body.get("status").and_then(|s| s.as_str()) {
                    if want.contains(&status) {
                        return body;
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("task {id} did not reach {want:?} within {timeout:?}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop(Duration::from_millis(500));
        }
    }
}
