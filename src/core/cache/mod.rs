//! SQLite-backed entity name cache
//!
//! This module provides a local SQLite cache that:
//! - Maps `(entity type, name[, disambiguators])` to remote UUIDs
//! - Supports reverse lookup by UUID
//! - Refreshes each entity type by purging it and refetching from the server
//!
//! The cache is never authoritative. Lookups never go to the network; a miss
//! means the user has to run `calm cache update`.

mod queries;
mod schema;
mod sync;
mod types;


// Re-export all types
pub use types::*;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ToSql};
use thiserror::Error;

use crate::core::client::RemoteError;
use crate::core::entity_type::EntityType;

/// Current schema version - a mismatch is reported, never migrated
const SCHEMA_VERSION: i32 = 1;

/// Columns selected for every `CacheEntry` query, in `entry_from_row` order
const ENTRY_COLUMNS: &str =
    "entity_type, name, uuid, attributes, list_api_suffix, last_update_time";

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by the cache
#[derive(Debug, Error, Diagnostic)]
pub enum CacheError {
    #[error("Invalid entity type: {0}")]
    #[diagnostic(
        code(calm::cache::invalid_type),
        help(
            "Valid types: ACCOUNT, PROJECT, ENVIRONMENT, AHV_SUBNET, AHV_DISK_IMAGE, AHV_CLUSTER, \
             AHV_VPC, USER, USER_GROUP, ROLE, DIRECTORY_SERVICE, APP_ICON"
        )
    )]
    InvalidEntityType(String),

    #[error("{entity_type} '{key}' not found in cache")]
    #[diagnostic(code(calm::cache::miss))]
    CacheMiss {
        entity_type: EntityType,
        key: String,
        #[help]
        hint: String,
    },

    #[error("Failed to refresh {entity_type} from the server")]
    #[diagnostic(code(calm::cache::remote))]
    RemoteFetch {
        entity_type: EntityType,
        #[source]
        source: RemoteError,
    },

    #[error("Cache storage error: {0}")]
    #[diagnostic(code(calm::cache::storage))]
    Storage(#[from] rusqlite::Error),

    #[error("Cache database {} has schema version {found}, expected {expected}", .path.display())]
    #[diagnostic(
        code(calm::cache::schema_mismatch),
        help("Run `calm cache reset` and then `calm cache update` to rebuild it")
    )]
    SchemaMismatch {
        path: PathBuf,
        found: i32,
        expected: i32,
    },

    #[error("Cannot prepare cache location {}: {source}", .path.display())]
    #[diagnostic(code(calm::cache::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    /// A miss, with the hint telling the user how to refresh the type
    pub fn miss(entity_type: EntityType, key: impl Into<String>) -> Self {
        CacheError::CacheMiss {
            entity_type,
            key: key.into(),
            hint: format!(
                "Run `calm cache update --type {}` to refresh it from the server",
                entity_type
            ),
        }
    }
}

/// The entity cache backed by SQLite
pub struct EntityCache {
    conn: Connection,
    db_path: PathBuf,
}

impl EntityCache {
    /// Open or create the cache database at `path`
    ///
    /// A fresh file gets the current schema. An existing file must carry the
    /// current schema version.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn, path.to_path_buf())
    }

    /// Open a throwaway cache (for testing)
    pub fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, db_path: PathBuf) -> CacheResult<Self> {
        let mut cache = Self { conn, db_path };

        if cache.is_empty_database()? {
            cache.init_schema()?;
        } else {
            cache.check_schema_version()?;
        }

        Ok(cache)
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Insert a row
    ///
    /// No uniqueness is enforced on the logical key; the remote system is
    /// trusted to keep names unique within their scope.
    pub fn create(
        &mut self,
        entity_type: EntityType,
        name: &str,
        uuid: &str,
        attributes: &BTreeMap<String, String>,
    ) -> CacheResult<()> {
        insert_entry(&self.conn, entity_type, name, uuid, attributes, Utc::now())
    }

    /// Remove the row(s) of a type carrying `uuid`, returning how many went
    pub fn delete_one(&mut self, entity_type: EntityType, uuid: &str) -> CacheResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM entities WHERE entity_type = ?1 AND uuid = ?2",
            params![entity_type, uuid],
        )?;
        Ok(removed)
    }

    /// Remove every row regardless of type
    pub fn clear_entities(&mut self) -> CacheResult<()> {
        self.conn.execute_batch(
            r#"
            DELETE FROM entities;
            DELETE FROM sync_log;
            "#,
        )?;
        Ok(())
    }

    /// Get cache statistics
    pub fn statistics(&self) -> CacheResult<CacheStats> {
        let total_entries: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT entity_type, COUNT(*) FROM entities GROUP BY entity_type")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
            })?;
            for row in rows {
                let (entity_type, count) = row?;
                counts.insert(entity_type, count);
            }
        }

        let mut synced: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT entity_type, synced_at FROM sync_log")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (entity_type, synced_at) = row?;
                synced.insert(entity_type, parse_datetime(&synced_at));
            }
        }

        let by_type = EntityType::all()
            .iter()
            .map(|t| TypeSummary {
                entity_type: *t,
                count: counts.get(t.as_str()).copied().unwrap_or(0),
                last_synced: synced.get(t.as_str()).copied(),
            })
            .collect();

        let db_size_bytes = fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);

        Ok(CacheStats {
            total_entries,
            by_type,
            db_size_bytes,
        })
    }
}

impl ToSql for EntityType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EntityType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: CacheError| FromSqlError::Other(Box::new(e)))
    }
}

/// Insert one row on any connection (plain or inside a transaction)
fn insert_entry(
    conn: &Connection,
    entity_type: EntityType,
    name: &str,
    uuid: &str,
    attributes: &BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> CacheResult<()> {
    let attributes = serde_json::to_string(attributes).map_err(|e| {
        rusqlite::Error::ToSqlConversionFailure(Box::new(e))
    })?;

    conn.execute(
        r#"INSERT INTO entities
           (entity_type, name, uuid, attributes, list_api_suffix, last_update_time)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        params![
            entity_type,
            name,
            uuid,
            attributes,
            entity_type.list_api_suffix(),
            now.to_rfc3339()
        ],
    )?;

    Ok(())
}

/// Map a row selected with `ENTRY_COLUMNS`
fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheEntry> {
    let attributes: String = row.get(3)?;
    let attributes = serde_json::from_str(&attributes).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(CacheEntry {
        entity_type: row.get(0)?,
        name: row.get(1)?,
        uuid: row.get(2)?,
        attributes,
        list_api_suffix: row.get(4)?,
        last_update_time: parse_datetime(&row.get::<_, String>(5)?),
    })
}

/// Parse a stored RFC 3339 timestamp
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
