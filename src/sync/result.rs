// SyncResult: the entire observable outcome of one reconciliation pass

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ErrorKind, SyncError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub sku: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl ItemError {
    pub fn new(sku: impl Into<String>, err: &SyncError) -> Self {
        Self {
            sku: sku.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Per-run counters, filled in while the plan is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deactivated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub fetched: usize,
    #[serde(default)]
    pub created: usize,
    #[serde(default)]
    pub updated: usize,
    #[serde(default)]
    pub unchanged: usize,
    #[serde(default)]
    pub deactivated: usize,
    #[serde(default)]
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_errors: Vec<ItemError>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl SyncResult {
    /// Build the result of a pass that reached the end. Any item error turns the
    /// whole run into a failure with a summary message.
    pub fn completed(
        counts: SyncCounts,
        item_errors: Vec<ItemError>,
        dry_run: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        let failed = item_errors.len();
        let (error, error_kind) = match item_errors.first() {
            None => (None, None),
            Some(first) => {
                let total = counts.fetched.max(failed);
                (
                    Some(format!(
                        "{failed} of {total} catalog items failed; first: {} ({})",
                        first.sku, first.message
                    )),
                    Some(first.kind),
                )
            }
        };
        Self {
            success: error.is_none(),
            error,
            error_kind,
            dry_run,
            fetched: counts.fetched,
            created: counts.created,
            updated: counts.updated,
            unchanged: counts.unchanged,
            deactivated: counts.deactivated,
            failed,
            item_errors,
            started_at,
            duration_ms: elapsed_ms(started_at),
        }
    }

    /// Result of a pass aborted before any write was attempted.
    pub fn aborted(err: &SyncError, fetched: usize, dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            dry_run,
            fetched,
            created: 0,
            updated: 0,
            unchanged: 0,
            deactivated: 0,
            failed: 0,
            item_errors: Vec::new(),
            started_at,
            duration_ms: elapsed_ms(started_at),
        }
    }

    pub fn failure(err: &SyncError) -> Self {
        Self::aborted(err, 0, false, Utc::now())
    }

    /// Records written (or that would be written, in a dry run).
    pub fn changed(&self) -> usize {
        self.created + self.updated + self.deactivated
    }
}

fn elapsed_ms(started_at: DateTime<Utc>) -> u64 {
    (Utc::now() - started_at).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_run_serializes_without_error_fields() {
        let counts = SyncCounts {
            fetched: 3,
            created: 2,
            unchanged: 1,
            ..Default::default()
        };
        let result = SyncResult::completed(counts, Vec::new(), false, Utc::now());
        let v = serde_json::to_value(&result).unwrap();

        assert_eq!(v["success"], true);
        assert!(v.get("error").is_none());
        assert!(v.get("error_kind").is_none());
        assert!(v.get("item_errors").is_none());
        assert_eq!(v["created"], 2);
        assert_eq!(result.changed(), 2);
    }

    #[test]
    fn item_errors_fail_the_run_with_summary() {
        let counts = SyncCounts {
            fetched: 4,
            created: 3,
            ..Default::default()
        };
        let errs = vec![ItemError::new(
            "SKU-9",
            &SyncError::Persistence("record rejected".into()),
        )];
        let result = SyncResult::completed(counts, errs, false, Utc::now());

        assert!(!result.success);
        assert_eq!(result.failed, 1);
        assert_eq!(result.error_kind, Some(ErrorKind::Persistence));
        let msg = result.error.unwrap();
        assert!(msg.starts_with("1 of 4 catalog items failed"), "{msg}");
        assert!(msg.contains("SKU-9"));
    }

    #[test]
    fn failure_shape_round_trips_through_json() {
        let result = SyncResult::failure(&SyncError::Transport("connection refused".into()));
        let raw = serde_json::to_string(&result).unwrap();
        let back: SyncResult = serde_json::from_str(&raw).unwrap();

        assert!(!back.success);
        assert_eq!(back.error_kind, Some(ErrorKind::Transport));
        assert!(back.error.unwrap().contains("connection refused"));
    }
}
