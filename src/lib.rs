//! Calm DSL: command line client for Nutanix Calm
//!
//! The engineered core is a local SQLite cache mapping entity names to
//! UUIDs, refreshed from the Calm v3 REST API.

pub mod cli;
pub mod core;
