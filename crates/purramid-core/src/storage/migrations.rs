//! Database schema migrations for purramid.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

use super::database::write_record;
use super::legacy::{repair_spotlight_rows, LegacySpotlightRow};
use crate::state::FeatureState;

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Spotlight pool size of the builds that wrote the legacy table.
const LEGACY_SPOTLIGHT_LIMIT: u32 = 4;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> SqliteResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Migration v1: instance tables.
///
/// `instances` holds one row per live overlay; `instance_fields` holds its
/// flat key/value state and is removed with it.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS instances (
            feature TEXT NOT NULL,
            instance_id INTEGER NOT NULL,
            schema_version INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (feature, instance_id)
        );
        CREATE TABLE IF NOT EXISTS instance_fields (
            feature TEXT NOT NULL,
            instance_id INTEGER NOT NULL,
            key TEXT NOT NULL,
            kind TEXT NOT NULL,
            value,
            PRIMARY KEY (feature, instance_id, key),
            FOREIGN KEY (feature, instance_id)
                REFERENCES instances (feature, instance_id) ON DELETE CASCADE
        );",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: fold the legacy `spotlights` table into `instances`.
///
/// The legacy table allowed duplicate and out-of-range IDs; rows are repaired
/// on the way in and the table is dropped.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    if table_exists(&tx, "spotlights")? {
        let rows = read_legacy_spotlights(&tx)?;
        let found = rows.len();
        let states = repair_spotlight_rows(rows, LEGACY_SPOTLIGHT_LIMIT);
        for state in &states {
            write_record(&tx, &state.to_record())?;
        }
        tx.execute_batch("DROP TABLE spotlights;")?;
        tracing::info!(found, imported = states.len(), "migrated legacy spotlights");
    }

    set_schema_version(&tx, 2)?;
    tx.commit()
}

fn read_legacy_spotlights(conn: &Connection) -> SqliteResult<Vec<LegacySpotlightRow>> {
    let mut stmt = conn.prepare(
        "SELECT rowid, instance_id, center_x, center_y, radius, width, height, shape, is_locked
         FROM spotlights",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(LegacySpotlightRow {
            row_id: row.get(0)?,
            instance_id: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
            center_x: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
            center_y: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
            radius: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
            width: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
            height: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
            shape: row.get(7)?,
            locked: row.get::<_, Option<bool>>(8)?.unwrap_or(false),
        })
    })?;
    let legacy = rows.collect();
    legacy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_legacy_table(conn: &Connection) {
        conn.execute_batch(
            "CREATE TABLE spotlights (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instance_id INTEGER,
                center_x INTEGER,
                center_y INTEGER,
                radius INTEGER,
                width INTEGER,
                height INTEGER,
                shape TEXT,
                is_locked INTEGER
            );",
        )
        .unwrap();
    }

    fn insert_legacy(conn: &Connection, instance_id: i64) {
        conn.execute(
            "INSERT INTO spotlights (instance_id, center_x, center_y, radius, width, height, shape, is_locked)
             VALUES (?1, 400, 300, 100, 0, 0, 'circle', 0)",
            [instance_id],
        )
        .unwrap();
    }

    fn spotlight_ids(conn: &Connection) -> Vec<u32> {
        let mut stmt = conn
            .prepare(
                "SELECT instance_id FROM instances WHERE feature = 'spotlight' ORDER BY instance_id",
            )
            .unwrap();
        let ids = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<u32>, _>>()
            .unwrap();
        ids
    }

    #[test]
    fn test_migrate_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
        assert!(table_exists(&conn, "instances").unwrap());
        assert!(table_exists(&conn, "instance_fields").unwrap());
        assert!(spotlight_ids(&conn).is_empty());
    }

    #[test]
    fn test_migrate_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn legacy_spotlights_are_repaired_and_table_dropped() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        create_legacy_table(&conn);
        for id in [1, 1, 0, 7, 2, 3, 4] {
            insert_legacy(&conn, id);
        }

        migrate(&conn).unwrap();

        assert_eq!(spotlight_ids(&conn), vec![1, 2, 3, 4]);
        assert!(!table_exists(&conn, "spotlights").unwrap());
        let width: i64 = conn
            .query_row(
                "SELECT value FROM instance_fields
                 WHERE feature = 'spotlight' AND instance_id = 1 AND key = 'width'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(width, 200);
    }

    #[test]
    fn test_incremental_migration() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 1);

        create_legacy_table(&conn);
        insert_legacy(&conn, 3);
        migrate(&conn).unwrap();

        assert_eq!(get_schema_version(&conn), 2);
        assert_eq!(spotlight_ids(&conn), vec![3]);
    }
}
