//! Embedded schema migrations, tracked in `schema_migrations`.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{MindOrbitError, Result};

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

/// Applied in ascending version order.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "001_knowledge_items",
    sql: include_str!("../../migrations/001_knowledge_items.sql"),
}];

const CREATE_MIGRATIONS_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

/// Highest applied schema version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32> {
    conn.execute_batch(CREATE_MIGRATIONS_TABLE)?;
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

/// Bring the schema up to date, one transaction per migration.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let current = current_version(conn)?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        log::info!("Applying migration {} (version {})", migration.name, migration.version);

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql).map_err(|e| {
            log::error!("Migration {} failed: {}", migration.name, e);
            MindOrbitError::Database(e)
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }

    Ok(())
}
