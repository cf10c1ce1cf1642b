//! Persistent audit storage.

pub mod postgres;

pub use postgres::PostgresAuditStore;
