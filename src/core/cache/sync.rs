//! Cache synchronization with the remote server
//!
//! Every refresh is purge-then-repopulate. All types in the working set are
//! purged before the first fetch; a failed fetch leaves its type empty.

use std::time::Instant;

use chrono::Utc;
use rusqlite::params;
use tracing::{debug, info, warn};

use super::{
    insert_entry, CacheEntry, CacheError, CacheResult, EntityCache, SyncOutcome, SyncReport,
    TypeSyncResult,
};
use crate::core::client::{RemoteCatalog, RemoteEntity};
use crate::core::entity_type::EntityType;

impl EntityCache {
    /// Refresh one type, or every registered type when `entity_type` is `None`
    ///
    /// Remote failures are recorded per type in the report and do not abort
    /// the remaining types. Storage failures abort the sync.
    pub fn sync<R>(&mut self, remote: &R, entity_type: Option<EntityType>) -> CacheResult<SyncReport>
    where
        R: RemoteCatalog + ?Sized,
    {
        let start = Instant::now();
        let working_set: Vec<EntityType> = match entity_type {
            Some(t) => vec![t],
            None => EntityType::all().to_vec(),
        };

        for t in &working_set {
            self.purge_type(*t)?;
        }

        let mut report = SyncReport {
            requested: entity_type,
            ..Default::default()
        };

        for t in working_set {
            let outcome = match remote.list_entities(t) {
                Ok(entities) => {
                    let count = self.repopulate_type(t, &entities)?;
                    info!("cached {} {} entities", count, t);
                    SyncOutcome::Refreshed { count }
                }
                Err(e) => {
                    warn!("failed to refresh {}: {}", t, e);
                    SyncOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            report.results.push(TypeSyncResult {
                entity_type: t,
                outcome,
            });
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Same as `sync`, taking the type as user input
    ///
    /// An unregistered type fails before anything is purged.
    pub fn sync_named<R>(&mut self, remote: &R, entity_type: Option<&str>) -> CacheResult<SyncReport>
    where
        R: RemoteCatalog + ?Sized,
    {
        let entity_type = entity_type.map(str::parse::<EntityType>).transpose()?;
        self.sync(remote, entity_type)
    }

    /// Fetch a single entity and replace any cached row with its UUID
    ///
    /// Used after a remote create or update. The cache is untouched when
    /// the fetch fails.
    pub fn add_one<R>(
        &mut self,
        remote: &R,
        entity_type: EntityType,
        uuid: &str,
    ) -> CacheResult<CacheEntry>
    where
        R: RemoteCatalog + ?Sized,
    {
        let entity = remote
            .get_entity(entity_type, uuid)
            .map_err(|source| CacheError::RemoteFetch {
                entity_type,
                source,
            })?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM entities WHERE entity_type = ?1 AND uuid = ?2",
            params![entity_type, entity.uuid],
        )?;
        insert_entry(
            &tx,
            entity_type,
            &entity.name,
            &entity.uuid,
            &entity.attributes,
            Utc::now(),
        )?;
        tx.commit()?;

        debug!("cached {} '{}' ({})", entity_type, entity.name, entity.uuid);

        self.get_entity_data_using_uuid(entity_type, &entity.uuid, &[])?
            .ok_or_else(|| CacheError::miss(entity_type, entity.uuid.clone()))
    }

    /// Drop every row of a type along with its sync record
    fn purge_type(&mut self, entity_type: EntityType) -> CacheResult<()> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM entities WHERE entity_type = ?1",
            params![entity_type],
        )?;
        tx.execute(
            "DELETE FROM sync_log WHERE entity_type = ?1",
            params![entity_type],
        )?;
        tx.commit()?;

        debug!("purged {} {} rows", removed, entity_type);
        Ok(())
    }

    /// Insert a fetched listing in one transaction and log the sync
    fn repopulate_type(
        &mut self,
        entity_type: EntityType,
        entities: &[RemoteEntity],
    ) -> CacheResult<usize> {
        let now = Utc::now();
        let tx = self.conn.transaction()?;

        for entity in entities {
            insert_entry(
                &tx,
                entity_type,
                &entity.name,
                &entity.uuid,
                &entity.attributes,
                now,
            )?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO sync_log (entity_type, synced_at, entity_count) VALUES (?1, ?2, ?3)",
            params![entity_type, now.to_rfc3339(), entities.len() as i64],
        )?;
        tx.commit()?;

        Ok(entities.len())
    }
}
