use std::sync::Arc;

use tracing::{debug, error};

use crate::{AuditEntry, AuditStore, Redactor};

/// Best-effort writer in front of an [`AuditStore`].
///
/// Every payload is redacted here before it reaches the store. Store failures
/// are logged and swallowed; they never reach the caller.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    redactor: Redactor,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            redactor: Redactor::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Fire-and-forget: schedule the write on the current tokio runtime.
    pub fn record(&self, entry: AuditEntry) {
        let entry = self.sanitize(entry);
        let store = Arc::clone(&self.store);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { persist(store.as_ref(), entry).await });
            }
            Err(e) => error!(
                audit_id = %entry.id,
                action = %entry.action,
                error = %e,
                "audit entry dropped: no async runtime"
            ),
        }
    }

    /// Write the entry and wait for the store. Failures are still swallowed.
    pub async fn write(&self, entry: AuditEntry) {
        let entry = self.sanitize(entry);
        persist(self.store.as_ref(), entry).await;
    }

    pub fn sanitize(&self, mut entry: AuditEntry) -> AuditEntry {
        for body in [&mut entry.request_body, &mut entry.response_body]
            .into_iter()
            .flatten()
        {
            self.redactor.redact_in_place(body);
        }
        if let Some(changes) = entry.changes.as_mut() {
            for side in [&mut changes.before, &mut changes.after].into_iter().flatten() {
                self.redactor.redact_in_place(side);
            }
        }
        entry
    }
}

async fn persist(store: &dyn AuditStore, entry: AuditEntry) {
    let id = entry.id;
    let action = entry.action;
    let resource = entry.resource.clone();
    match store.append(entry).await {
        Ok(()) => debug!(audit_id = %id, %action, %resource, "audit entry written"),
        Err(e) => error!(
            audit_id = %id,
            %action,
            %resource,
            error = %e,
            "failed to write audit entry"
        ),
    }
}
