//! Versioned, ordered, idempotent schema application.
//!
//! Migration units live as `NNN_*.sql` files under a directory chosen by the
//! caller (normally `store/migrations` next to this crate, copied alongside
//! the deployed binary). Applied versions are recorded in a
//! `schema_migrations` ledger so re-running the same set is a no-op.

use std::fs;
use std::path::Path;

/// The migrations directory shipped alongside this crate, resolved at
/// compile time so callers (the `dts` binary, the `dts-migrate` tool)
/// don't need to guess a path relative to the process's working directory.
pub fn migrations_dir() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations"))
}

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::domain::now_ms;
use crate::error::StoreResult;

static MIGRATION_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)_.*\.sql$").unwrap());

struct MigrationFile {
    version: i64,
    filename: String,
    sql: String,
}

/// Apply every unapplied migration file under `dir`, in ascending numeric
/// order. Returns the number of files newly applied.
pub fn apply_migrations(conn: &mut Connection, dir: &Path) -> StoreResult<usize> {
    ensure_ledger(conn)?;

    let mut files = collect_migrations(dir)?;
    files.sort_by_key(|f| f.version);

    let mut applied = 0;
    for file in files {
        if is_applied(conn, file.version)? {
            debug!(version = file.version, "migration already applied, skipping");
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(&file.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, filename, applied_at_ms) VALUES (?1, ?2, ?3)",
            rusqlite::params![file.version, file.filename, now_ms()],
        )?;
        tx.commit()?;

        info!(version = file.version, filename = %file.filename, "applied migration");
        applied += 1;
    }

    Ok(applied)
}

fn ensure_ledger(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version       INTEGER PRIMARY KEY,
            filename      TEXT NOT NULL,
            applied_at_ms INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn is_applied(conn: &Connection, version: i64) -> StoreResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = ?1)",
        [version],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn collect_migrations(dir: &Path) -> StoreResult<Vec<MigrationFile>> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(caps) = MIGRATION_NAME.captures(filename) else {
            debug!(filename, "ignoring non-migration file");
            continue;
        };
        let version: i64 = caps[1].parse().expect("regex guarantees digits");
        let sql = fs::read_to_string(&path)?;
        out.push(MigrationFile {
            version,
            filename: filename.to_string(),
            sql,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, sql: &str) {
        fs::write(dir.join(name), sql).unwrap();
    }

    #[test]
    fn applies_in_numeric_order_and_is_idempotent() {
        let dir = tempdir().unwrap();
        write(dir.path(), "002_add_note.sql", "ALTER TABLE t ADD COLUMN note TEXT;");
        write(dir.path(), "001_init.sql", "CREATE TABLE t (id INTEGER PRIMARY KEY);");
        write(dir.path(), "readme.md", "not a migration");

        let mut conn = Connection::open_in_memory().unwrap();
        let applied = apply_migrations(&mut conn, dir.path()).unwrap();
        assert_eq!(applied, 2);

        let again = apply_migrations(&mut conn, dir.path()).unwrap();
        assert_eq!(again, 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn ignores_non_matching_filenames() {
        let dir = tempdir().unwrap();
        write(dir.path(), "init.sql", "CREATE TABLE bad (id INTEGER);");
        write(dir.path(), "001_good.sql", "CREATE TABLE good (id INTEGER);");

        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn, dir.path()).unwrap();

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name = 'good')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!(exists);
    }
}
