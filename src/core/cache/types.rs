//! Cache type definitions
//!
//! Rows stored in the cache and the reports produced by sync and status.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::entity_type::EntityType;

// =========================================================================
// Cached Rows
// =========================================================================

/// One cached entity instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub entity_type: EntityType,
    pub name: String,
    pub uuid: String,
    /// Type-specific disambiguating attributes (cluster, account, ...)
    pub attributes: BTreeMap<String, String>,
    pub list_api_suffix: String,
    pub last_update_time: DateTime<Utc>,
}

impl CacheEntry {
    /// Value of a single attribute
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// True when every filter equals the row's attribute of the same key
    pub fn matches(&self, filters: &[(&str, &str)]) -> bool {
        filters
            .iter()
            .all(|(key, value)| self.attribute(key) == Some(*value))
    }

    /// Attributes rendered as `key=value` pairs for display
    pub fn attributes_display(&self) -> String {
        self.attributes
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

// =========================================================================
// Sync Reports
// =========================================================================

/// Result of refreshing one entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Purged and repopulated with `count` rows
    Refreshed { count: usize },
    /// Purged, but the remote fetch failed and the type was left empty
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct TypeSyncResult {
    pub entity_type: EntityType,
    pub outcome: SyncOutcome,
}

/// Statistics from a sync operation
#[derive(Debug, Default)]
pub struct SyncReport {
    /// The single type requested, or `None` for all registered types
    pub requested: Option<EntityType>,
    pub results: Vec<TypeSyncResult>,
    pub duration_ms: u64,
}

impl SyncReport {
    /// Types whose remote fetch failed
    pub fn failures(&self) -> impl Iterator<Item = (&EntityType, &str)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            SyncOutcome::Failed { error } => Some((&r.entity_type, error.as_str())),
            SyncOutcome::Refreshed { .. } => None,
        })
    }

    /// Total rows inserted across all refreshed types
    pub fn total_rows(&self) -> usize {
        self.results
            .iter()
            .map(|r| match r.outcome {
                SyncOutcome::Refreshed { count } => count,
                SyncOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    /// A sync fails outright only when the single requested type failed
    pub fn is_fatal(&self) -> bool {
        self.requested.is_some() && self.failures().next().is_some()
    }
}

// =========================================================================
// Statistics
// =========================================================================

/// Per-type row count and last successful sync
#[derive(Debug, Clone, Serialize)]
pub struct TypeSummary {
    pub entity_type: EntityType,
    pub count: usize,
    pub last_synced: Option<DateTime<Utc>>,
}

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    pub total_entries: usize,
    pub by_type: Vec<TypeSummary>,
    pub db_size_bytes: u64,
}
