//! All transactional task operations.
//!
//! Every write path here opens its own immediate transaction and rolls back
//! on any error — callers never see a half-applied batch or claim.

use std::collections::{HashMap, HashSet, VecDeque};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::domain::{Claim, NewTask, Task, TaskStatus, TaskView};
use crate::error::{StoreError, StoreResult};
use crate::store::begin_immediate;

/// Create a single task and its dependency edges atomically.
pub fn create_task(
    conn: &mut Connection,
    new_task: NewTask,
    now: i64,
    default_max_attempts: i64,
) -> StoreResult<String> {
    let tx = begin_immediate(conn)?;

    if task_exists(&tx, &new_task.id)? {
        return Err(StoreError::conflict_existing(vec![new_task.id]));
    }

    let missing = missing_dependencies(&tx, &new_task.dependencies)?;
    if !missing.is_empty() {
        return Err(StoreError::DependencyMissing { missing });
    }

    if !new_task.dependencies.is_empty() && reaches(&tx, &new_task.dependencies, &new_task.id)? {
        return Err(StoreError::cycle_single(new_task.id));
    }

    let remaining_deps = count_incomplete(&tx, &new_task.dependencies)?;

    insert_task(
        &tx,
        &new_task.id,
        &new_task.task_type,
        new_task.duration_ms,
        remaining_deps,
        default_max_attempts,
        now,
    )?;
    for dep in &new_task.dependencies {
        insert_edge(&tx, &new_task.id, dep)?;
    }

    tx.commit()?;
    Ok(new_task.id)
}

/// Create a batch of tasks, whose internal dependency edges may reference
/// each other, atomically.
pub fn create_tasks_batch(
    conn: &mut Connection,
    tasks: Vec<NewTask>,
    now: i64,
    default_max_attempts: i64,
) -> StoreResult<Vec<String>> {
    if tasks.is_empty() {
        return Err(StoreError::validation("batch must not be empty"));
    }

    let mut seen = HashSet::with_capacity(tasks.len());
    for t in &tasks {
        if !seen.insert(t.id.as_str()) {
            return Err(StoreError::validation(format!(
                "duplicate id within batch: {}",
                t.id
            )));
        }
    }
    let batch_ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

    let tx = begin_immediate(conn)?;

    let mut existing = Vec::new();
    for t in &tasks {
        if task_exists(&tx, &t.id)? {
            existing.push(t.id.clone());
        }
    }
    if !existing.is_empty() {
        return Err(StoreError::conflict_existing(existing));
    }

    let external_deps: HashSet<&str> = tasks
        .iter()
        .flat_map(|t| t.dependencies.iter())
        .map(String::as_str)
        .filter(|d| !batch_ids.contains(d))
        .collect();
    let external_deps: Vec<&str> = external_deps.into_iter().collect();
    let missing = missing_dependency_refs(&tx, &external_deps)?;
    if !missing.is_empty() {
        return Err(StoreError::DependencyMissing { missing });
    }

    check_batch_acyclic(&tasks, &batch_ids)
        .map_err(|_| StoreError::cycle_in_batch(tasks.iter().map(|t| t.id.clone()).collect()))?;

    let external_status = fetch_external_statuses(&tx, &external_deps)?;

    for t in &tasks {
        let remaining_deps = t
            .dependencies
            .iter()
            .filter(|dep| {
                if batch_ids.contains(dep.as_str()) {
                    true
                } else {
                    external_status
                        .get(dep.as_str())
                        .map(|s| *s != TaskStatus::Completed)
                        .unwrap_or(false)
                }
            })
            .count() as i64;

        insert_task(
            &tx,
            &t.id,
            &t.task_type,
            t.duration_ms,
            remaining_deps,
            default_max_attempts,
            now,
        )?;
    }
    for t in &tasks {
        for dep in &t.dependencies {
            insert_edge(&tx, &t.id, dep)?;
        }
    }

    tx.commit()?;
    Ok(tasks.into_iter().map(|t| t.id).collect())
}

/// Atomically claim up to `limit` runnable tasks (QUEUED with no remaining
/// dependencies), FIFO by submission time, stamping a lease on each.
pub fn claim_runnable_tasks(
    conn: &mut Connection,
    now: i64,
    lease_ms: i64,
    limit: i64,
) -> StoreResult<Vec<Claim>> {
    if limit <= 0 {
        return Ok(Vec::new());
    }

    let tx = begin_immediate(conn)?;

    let candidate_ids: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT id FROM tasks
             WHERE status = ?1 AND remaining_deps = 0
             ORDER BY created_at ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![TaskStatus::Queued, limit], |row| row.get(0))?;
        rows.collect::<Result<Vec<String>, _>>()?
    };

    let mut claimed = Vec::with_capacity(candidate_ids.len());
    {
        let mut update = tx.prepare(
            "UPDATE tasks
             SET status = ?1,
                 started_at = COALESCE(started_at, ?2),
                 updated_at = ?2,
                 attempts = attempts + 1,
                 lease_expires_at = ?3
             WHERE id = ?4 AND status = ?5 AND remaining_deps = 0",
        )?;
        let mut fetch_duration =
            tx.prepare("SELECT duration_ms FROM tasks WHERE id = ?1")?;

        for id in candidate_ids {
            let changed = update.execute(params![
                TaskStatus::Running,
                now,
                now + lease_ms,
                id,
                TaskStatus::Queued,
            ])?;
            if changed == 1 {
                let duration_ms: i64 = fetch_duration.query_row([&id], |row| row.get(0))?;
                claimed.push(Claim { id, duration_ms });
            }
        }
    }

    tx.commit()?;
    Ok(claimed)
}

/// Transition a RUNNING task to COMPLETED and unblock its QUEUED dependents.
pub fn mark_completed(conn: &mut Connection, id: &str, now: i64) -> StoreResult<()> {
    let tx = begin_immediate(conn)?;

    require_running(&tx, id)?;

    tx.execute(
        "UPDATE tasks
         SET status = ?1, updated_at = ?2, finished_at = ?2, lease_expires_at = NULL, last_error = NULL
         WHERE id = ?3 AND status = ?4",
        params![TaskStatus::Completed, now, id, TaskStatus::Running],
    )?;

    tx.execute(
        "UPDATE tasks
         SET remaining_deps = MAX(remaining_deps - 1, 0), updated_at = ?1
         WHERE status = ?2
           AND id IN (SELECT task_id FROM deps WHERE depends_on_id = ?3)",
        params![now, TaskStatus::Queued, id],
    )?;

    tx.commit()?;
    Ok(())
}

/// Transition a RUNNING task to FAILED. Dependents are intentionally left
/// untouched: failure does not propagate (see the design notes).
pub fn mark_failed(conn: &mut Connection, id: &str, now: i64, error: &str) -> StoreResult<()> {
    let tx = begin_immediate(conn)?;

    require_running(&tx, id)?;

    tx.execute(
        "UPDATE tasks
         SET status = ?1, updated_at = ?2, finished_at = ?2, lease_expires_at = NULL, last_error = ?3
         WHERE id = ?4 AND status = ?5",
        params![TaskStatus::Failed, now, error, id, TaskStatus::Running],
    )?;

    tx.commit()?;
    Ok(())
}

/// Sweep RUNNING tasks whose lease has expired: re-queue if retries remain,
/// otherwise fail them. Returns the number of rows transitioned.
pub fn recover_stale_running(conn: &mut Connection, now: i64) -> StoreResult<usize> {
    let tx = begin_immediate(conn)?;

    let requeued = tx.execute(
        "UPDATE tasks
         SET status = ?1, lease_expires_at = NULL, updated_at = ?2,
             last_error = 'Recovered: lease expired; re-queued'
         WHERE status = ?3 AND lease_expires_at <= ?2 AND attempts < max_attempts",
        params![TaskStatus::Queued, now, TaskStatus::Running],
    )?;

    let failed = tx.execute(
        "UPDATE tasks
         SET status = ?1, lease_expires_at = NULL, updated_at = ?2,
             finished_at = COALESCE(finished_at, ?2),
             last_error = 'Recovered: lease expired; max attempts reached'
         WHERE status = ?3 AND lease_expires_at <= ?2 AND attempts >= max_attempts",
        params![TaskStatus::Failed, now, TaskStatus::Running],
    )?;

    tx.commit()?;
    Ok(requeued + failed)
}

/// Count RUNNING tasks whose lease has not yet expired — ground truth for
/// capacity, recomputed every tick rather than tracked in-process.
pub fn count_running_leased(conn: &Connection, now: i64) -> StoreResult<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE status = ?1 AND lease_expires_at > ?2",
        params![TaskStatus::Running, now],
        |row| row.get(0),
    )
    .map_err(StoreError::from)
}

pub fn get_task(conn: &Connection, id: &str) -> StoreResult<TaskView> {
    let task = load_task(conn, id)?.ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
    let dependencies = dependencies_of(conn, id)?;
    Ok(TaskView { task, dependencies })
}

pub fn list_tasks(conn: &Connection, limit: i64, offset: i64) -> StoreResult<(Vec<TaskView>, i64)> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;

    let mut stmt = conn.prepare(
        "SELECT id, type, duration_ms, status, remaining_deps, attempts, max_attempts,
                created_at, updated_at, started_at, finished_at, lease_expires_at, last_error
         FROM tasks
         ORDER BY created_at ASC
         LIMIT ?1 OFFSET ?2",
    )?;
    let ids: Vec<Task> = stmt
        .query_map(params![limit, offset], row_to_task)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut views = Vec::with_capacity(ids.len());
    for task in ids {
        let dependencies = dependencies_of(conn, &task.id)?;
        views.push(TaskView { task, dependencies });
    }

    Ok((views, total))
}

// Internal helpers
// ----------------------------------------------------------------

fn require_running(conn: &Connection, id: &str) -> StoreResult<()> {
    let status: Option<TaskStatus> = conn
        .query_row("SELECT status FROM tasks WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;
    match status {
        None => Err(StoreError::NotFound { id: id.to_string() }),
        Some(TaskStatus::Running) => Ok(()),
        Some(other) => Err(StoreError::conflict_status(id, other.as_db_str())),
    }
}

fn task_exists(conn: &Connection, id: &str) -> StoreResult<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )
    .map_err(StoreError::from)
}

fn missing_dependencies(conn: &Connection, deps: &[String]) -> StoreResult<Vec<String>> {
    let refs: Vec<&str> = deps.iter().map(String::as_str).collect();
    missing_dependency_refs(conn, &refs)
}

fn missing_dependency_refs(conn: &Connection, deps: &[&str]) -> StoreResult<Vec<String>> {
    let mut missing = Vec::new();
    for &dep in deps {
        if !task_exists(conn, dep)? {
            missing.push(dep.to_string());
        }
    }
    Ok(missing)
}

fn count_incomplete(conn: &Connection, deps: &[String]) -> StoreResult<i64> {
    let mut count = 0;
    for dep in deps {
        let status: TaskStatus =
            conn.query_row("SELECT status FROM tasks WHERE id = ?1", [dep], |row| row.get(0))?;
        if status != TaskStatus::Completed {
            count += 1;
        }
    }
    Ok(count)
}

/// Is `target` reachable from any of `seeds` by following `task_id ->
/// depends_on_id` edges transitively? Used to reject a single insert that
/// would close a cycle.
fn reaches(conn: &Connection, seeds: &[String], target: &str) -> StoreResult<bool> {
    let placeholders = placeholders(seeds.len());
    let sql = format!(
        "WITH RECURSIVE reach(id) AS (
            SELECT depends_on_id FROM deps WHERE task_id IN ({placeholders})
            UNION
            SELECT d.depends_on_id FROM deps d JOIN reach r ON d.task_id = r.id
         )
         SELECT EXISTS(SELECT 1 FROM reach WHERE id = ?)"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut bind_params: Vec<&dyn rusqlite::ToSql> =
        seeds.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
    bind_params.push(&target);
    stmt.query_row(params_from_iter(bind_params), |row| row.get(0))
        .map_err(StoreError::from)
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(",")
}

/// Cycle check restricted to the sub-DAG induced by batch-internal edges
/// (Kahn's algorithm): pre-existing nodes can't point to new ones, so any
/// cycle must live entirely within the batch.
fn check_batch_acyclic(tasks: &[NewTask], batch_ids: &HashSet<&str>) -> Result<(), ()> {
    let mut indegree: HashMap<&str, usize> = tasks.iter().map(|t| (t.id.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for t in tasks {
        for dep in &t.dependencies {
            if batch_ids.contains(dep.as_str()) {
                *indegree.get_mut(t.id.as_str()).unwrap() += 1;
                adjacency.entry(dep.as_str()).or_default().push(t.id.as_str());
            }
        }
    }

    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0;
    while let Some(node) = queue.pop_front() {
        visited += 1;
        if let Some(next) = adjacency.get(node) {
            for &succ in next {
                let deg = indegree.get_mut(succ).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(succ);
                }
            }
        }
    }

    if visited == tasks.len() {
        Ok(())
    } else {
        Err(())
    }
}

fn fetch_external_statuses(
    conn: &Connection,
    external_deps: &[&str],
) -> StoreResult<HashMap<String, TaskStatus>> {
    if external_deps.is_empty() {
        return Ok(HashMap::new());
    }
    let placeholders = placeholders(external_deps.len());
    let sql = format!("SELECT id, status FROM tasks WHERE id IN ({placeholders})");
    let mut stmt = conn.prepare(&sql)?;
    let bind_params: Vec<&dyn rusqlite::ToSql> = external_deps
        .iter()
        .map(|s| s as &dyn rusqlite::ToSql)
        .collect();
    let rows = stmt.query_map(params_from_iter(bind_params), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, TaskStatus>(1)?))
    })?;
    rows.collect::<Result<HashMap<_, _>, _>>()
        .map_err(StoreError::from)
}

fn insert_task(
    conn: &Connection,
    id: &str,
    task_type: &str,
    duration_ms: i64,
    remaining_deps: i64,
    max_attempts: i64,
    now: i64,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO tasks
            (id, type, duration_ms, status, remaining_deps, attempts, max_attempts,
             created_at, updated_at, started_at, finished_at, lease_expires_at, last_error)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?7, NULL, NULL, NULL, NULL)",
        params![
            id,
            task_type,
            duration_ms,
            TaskStatus::Queued,
            remaining_deps,
            max_attempts,
            now,
        ],
    )?;
    Ok(())
}

fn insert_edge(conn: &Connection, task_id: &str, depends_on_id: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO deps (task_id, depends_on_id) VALUES (?1, ?2)",
        params![task_id, depends_on_id],
    )?;
    Ok(())
}

fn dependencies_of(conn: &Connection, task_id: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT depends_on_id FROM deps WHERE task_id = ?1 ORDER BY depends_on_id ASC",
    )?;
    let rows = stmt.query_map([task_id], |row| row.get(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

fn load_task(conn: &Connection, id: &str) -> StoreResult<Option<Task>> {
    conn.query_row(
        "SELECT id, type, duration_ms, status, remaining_deps, attempts, max_attempts,
                created_at, updated_at, started_at, finished_at, lease_expires_at, last_error
         FROM tasks WHERE id = ?1",
        [id],
        row_to_task,
    )
    .optional()
    .map_err(StoreError::from)
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        task_type: row.get(1)?,
        duration_ms: row.get(2)?,
        status: row.get(3)?,
        remaining_deps: row.get(4)?,
        attempts: row.get(5)?,
        max_attempts: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        started_at: row.get(9)?,
        finished_at: row.get(10)?,
        lease_expires_at: row.get(11)?,
        last_error: row.get(12)?,
    })
}
