//! Database schema initialization

use rusqlite::params;

use super::{CacheError, CacheResult, EntityCache, SCHEMA_VERSION};

impl EntityCache {
    /// Initialize database schema
    pub(super) fn init_schema(&mut self) -> CacheResult<()> {
        self.conn.execute_batch(
            r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            -- Name -> UUID rows, one per remote entity instance
            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                name TEXT NOT NULL,
                uuid TEXT NOT NULL,
                attributes TEXT NOT NULL DEFAULT '{}',
                list_api_suffix TEXT NOT NULL,
                last_update_time TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entities_type_name ON entities(entity_type, name);
            CREATE INDEX IF NOT EXISTS idx_entities_type_uuid ON entities(entity_type, uuid);

            -- Last successful sync per entity type
            CREATE TABLE IF NOT EXISTS sync_log (
                entity_type TEXT PRIMARY KEY,
                synced_at TEXT NOT NULL,
                entity_count INTEGER NOT NULL
            );
            "#,
        )?;

        self.conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;

        Ok(())
    }

    /// True when the database file holds no tables yet
    pub(super) fn is_empty_database(&self) -> CacheResult<bool> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
            [],
            |row| row.get(0),
        )?;
        Ok(tables == 0)
    }

    /// Refuse to use a database written with a different schema
    ///
    /// There is no migration path; the user resets the cache file instead.
    pub(super) fn check_schema_version(&self) -> CacheResult<()> {
        let found: i32 = match self.conn.query_row(
            "SELECT version FROM schema_version LIMIT 1",
            [],
            |row| row.get(0),
        ) {
            Ok(version) => version,
            // Not one of our databases (or an unversioned one)
            Err(rusqlite::Error::QueryReturnedNoRows) => 0,
            Err(rusqlite::Error::SqliteFailure(_, Some(ref msg)))
                if msg.starts_with("no such table") =>
            {
                0
            }
            Err(e) => return Err(e.into()),
        };

        if found != SCHEMA_VERSION {
            return Err(CacheError::SchemaMismatch {
                path: self.db_path.clone(),
                found,
                expected: SCHEMA_VERSION,
            });
        }

        Ok(())
    }
}
