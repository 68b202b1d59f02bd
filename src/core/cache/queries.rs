//! Query methods for retrieving cached entities
//!
//! Read-only lookups. A miss is `Ok(None)`; only storage failures are errors.

use rusqlite::{params, OptionalExtension};

use super::{entry_from_row, CacheEntry, CacheError, CacheResult, EntityCache, ENTRY_COLUMNS};
use crate::core::entity_type::EntityType;

impl EntityCache {
    /// UUID of the first row with this name
    pub fn get_entity_uuid(
        &self,
        entity_type: EntityType,
        name: &str,
    ) -> CacheResult<Option<String>> {
        let uuid = self
            .conn
            .query_row(
                "SELECT uuid FROM entities WHERE entity_type = ?1 AND name = ?2 ORDER BY id LIMIT 1",
                params![entity_type, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(uuid)
    }

    /// First row with this name whose attributes match every filter
    pub fn get_entity_data(
        &self,
        entity_type: EntityType,
        name: &str,
        filters: &[(&str, &str)],
    ) -> CacheResult<Option<CacheEntry>> {
        let sql = format!(
            "SELECT {} FROM entities WHERE entity_type = ?1 AND name = ?2 ORDER BY id",
            ENTRY_COLUMNS
        );
        self.first_match(&sql, entity_type, name, filters)
    }

    /// Reverse lookup: first row with this UUID whose attributes match every filter
    pub fn get_entity_data_using_uuid(
        &self,
        entity_type: EntityType,
        uuid: &str,
        filters: &[(&str, &str)],
    ) -> CacheResult<Option<CacheEntry>> {
        let sql = format!(
            "SELECT {} FROM entities WHERE entity_type = ?1 AND uuid = ?2 ORDER BY id",
            ENTRY_COLUMNS
        );
        self.first_match(&sql, entity_type, uuid, filters)
    }

    /// Like `get_entity_data`, but a miss becomes a `CacheMiss` error
    pub fn require_entity_data(
        &self,
        entity_type: EntityType,
        name: &str,
        filters: &[(&str, &str)],
    ) -> CacheResult<CacheEntry> {
        self.get_entity_data(entity_type, name, filters)?
            .ok_or_else(|| CacheError::miss(entity_type, describe_key(name, filters)))
    }

    /// All cached rows, optionally restricted to one type
    ///
    /// Ordered by registration order of the type, then by name.
    pub fn list(&self, entity_type: Option<EntityType>) -> CacheResult<Vec<CacheEntry>> {
        let mut entries = match entity_type {
            Some(t) => {
                let sql = format!(
                    "SELECT {} FROM entities WHERE entity_type = ?1 ORDER BY name, id",
                    ENTRY_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![t], entry_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!("SELECT {} FROM entities ORDER BY name, id", ENTRY_COLUMNS);
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map([], entry_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        // Stable sort keeps the name/id order within each type
        entries.sort_by_key(|e| e.entity_type.registration_index());
        Ok(entries)
    }

    fn first_match(
        &self,
        sql: &str,
        entity_type: EntityType,
        key: &str,
        filters: &[(&str, &str)],
    ) -> CacheResult<Option<CacheEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![entity_type, key], entry_from_row)?;

        for row in rows {
            let entry = row?;
            if entry.matches(filters) {
                return Ok(Some(entry));
            }
        }

        Ok(None)
    }
}

/// `name` plus any filters, for miss messages
fn describe_key(name: &str, filters: &[(&str, &str)]) -> String {
    if filters.is_empty() {
        return name.to_string();
    }
    let filters = filters
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} ({})", name, filters)
}
