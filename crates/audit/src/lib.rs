//! Audit trail: entry model, redaction, eligibility and the best-effort recorder.
//!
//! Storage is behind [`AuditStore`]; the Postgres adapter lives in `campus-infra`.

pub mod entry;
pub mod policy;
pub mod recorder;
pub mod redact;
pub mod store;

pub use entry::{AuditAction, AuditEntry, ChangeSet, PrincipalSnapshot};
pub use policy::AuditPolicy;
pub use recorder::AuditRecorder;
pub use redact::{REDACTED, Redactor};
pub use store::{AuditFilter, AuditPage, AuditStore, AuditStoreError, InMemoryAuditStore};
