//! Standalone migration tool: loads configuration, ensures the database
//! directory exists, and applies pending schema migrations without starting
//! the HTTP server or the scheduler. Useful for provisioning a fresh
//! `DTS_DB_PATH` ahead of a deployment.

use anyhow::{Context, Result};
use dts::config::Config;
use dts_store::{schema, Store};

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env().context("invalid configuration")?;
    let store = Store::new(&config.db_path);

    let mut conn = store.connect()?;
    let applied = schema::apply_migrations(&mut conn, schema::migrations_dir())?;

    println!(
        "applied {applied} migration(s) to {}",
        config.db_path.display()
    );
    Ok(())
}
