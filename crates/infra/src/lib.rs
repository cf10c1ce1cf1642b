//! Infrastructure layer: data access, audit persistence, config.

pub mod audit_store;
pub mod config;
pub mod data;

pub use audit_store::PostgresAuditStore;
pub use config::{AppConfig, ConfigError};
pub use data::{DataError, DataLayer, FieldMatch, InMemoryDataStore, PostgresDataStore, RecordStore};
