//! Core module - fundamental types and utilities

pub mod cache;
pub mod client;
pub mod config;
pub mod entity_type;

pub use cache::{CacheEntry, CacheError, CacheStats, EntityCache, SyncOutcome, SyncReport};
pub use client::{CalmClient, RemoteCatalog, RemoteEntity, RemoteError};
pub use config::{Config, ConfigError};
pub use entity_type::EntityType;
