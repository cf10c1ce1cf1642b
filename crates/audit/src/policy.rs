/// Which requests get an audit entry.
///
/// A request is eligible when it mutates (`POST`, `PUT`, `PATCH`, `DELETE`)
/// under a configured prefix, or when it is a `GET` touching a sensitive
/// family. Change-tracked prefixes additionally get a before/after snapshot.
#[derive(Debug, Clone)]
pub struct AuditPolicy {
    mutating_prefixes: Vec<String>,
    sensitive_read_prefixes: Vec<String>,
    change_tracked_prefixes: Vec<String>,
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self::new(
            [
                "/students",
                "/guardians",
                "/staff",
                "/classes",
                "/grades",
                "/attendance",
                "/payments",
                "/users",
            ],
            ["/payments", "/grades", "/staff"],
            ["/payments", "/grades"],
        )
    }
}

impl AuditPolicy {
    pub fn new<M, S, C>(mutating: M, sensitive_reads: S, change_tracked: C) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            mutating_prefixes: mutating.into_iter().map(Into::into).collect(),
            sensitive_read_prefixes: sensitive_reads.into_iter().map(Into::into).collect(),
            change_tracked_prefixes: change_tracked.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_eligible(&self, method: &str, path: &str) -> bool {
        match method.to_ascii_uppercase().as_str() {
            "POST" | "PUT" | "PATCH" | "DELETE" => matches_any(&self.mutating_prefixes, path),
            "GET" => matches_any(&self.sensitive_read_prefixes, path),
            _ => false,
        }
    }

    /// Whether mutations under `path` record a before/after change set.
    pub fn tracks_changes(&self, path: &str) -> bool {
        matches_any(&self.change_tracked_prefixes, path)
    }
}

fn matches_any(prefixes: &[String], path: &str) -> bool {
    prefixes.iter().any(|prefix| {
        path.strip_prefix(prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutations_on_configured_prefixes_are_audited() {
        let policy = AuditPolicy::default();
        assert!(policy.is_eligible("POST", "/students"));
        assert!(policy.is_eligible("delete", "/classes/0192"));
        assert!(!policy.is_eligible("POST", "/dashboard"));
    }

    #[test]
    fn only_sensitive_reads_are_audited() {
        let policy = AuditPolicy::default();
        assert!(policy.is_eligible("GET", "/payments"));
        assert!(policy.is_eligible("GET", "/grades/abc"));
        assert!(policy.is_eligible("GET", "/staff"));
        assert!(!policy.is_eligible("GET", "/students"));
        assert!(!policy.is_eligible("OPTIONS", "/payments"));
    }

    #[test]
    fn prefix_must_end_on_a_segment_boundary() {
        let policy = AuditPolicy::default();
        assert!(!policy.is_eligible("POST", "/studentsx"));
        assert!(!policy.is_eligible("GET", "/payments-summary"));
    }

    #[test]
    fn change_tracking_covers_financial_and_grade_routes() {
        let policy = AuditPolicy::default();
        assert!(policy.tracks_changes("/payments/1"));
        assert!(policy.tracks_changes("/grades/1"));
        assert!(!policy.tracks_changes("/students/1"));
    }
}
