//! Ledger of recent internal failures.

use dashmap::DashMap;
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

/// Maximum number of failures kept.
pub const MAX_FAILURES: usize = 50;

/// Deduplicated record of recent internal errors.
///
/// Each record renders the error and its source chain. Identical records are
/// kept once; beyond [`MAX_FAILURES`] the oldest records are dropped.
#[derive(Debug, Default)]
pub struct FailureLedger {
    failures: DashMap<String, u64>,
    sequence: AtomicU64,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `failure` under the correlation `id`, usually the request path.
    pub fn record(&self, id: &str, failure: &(dyn Error + 'static)) {
        let record = render(id, failure);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        let mut added = false;
        self.failures.entry(record).or_insert_with(|| {
            added = true;
            sequence
        });

        if !added {
            return;
        }
        error!(id, error = %failure, "Internal failure recorded");

        while self.failures.len() > MAX_FAILURES {
            let oldest = self
                .failures
                .iter()
                .min_by_key(|entry| *entry.value())
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.failures.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Recorded failures, oldest first.
    pub fn failures(&self) -> Vec<String> {
        let mut failures: Vec<(u64, String)> = self
            .failures
            .iter()
            .map(|entry| (*entry.value(), entry.key().clone()))
            .collect();
        failures.sort_unstable_by_key(|(sequence, _)| *sequence);
        failures.into_iter().map(|(_, record)| record).collect()
    }
}

fn render(id: &str, failure: &(dyn Error + 'static)) -> String {
    let mut record = format!("failure {id}");
    let mut current = Some(failure);
    while let Some(cause) = current {
        record.push_str("\n  by ");
        record.push_str(&cause.to_string());
        current = cause.source();
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn test_record_renders_source_chain() {
        let ledger = FailureLedger::new();
        let failure = Outer(std::io::Error::other("disk on fire"));

        ledger.record("/main/g/a/1.0/a.jar", &failure);

        assert!(ledger.has_failures());
        assert_eq!(
            ledger.failures(),
            vec!["failure /main/g/a/1.0/a.jar\n  by outer failure\n  by disk on fire".to_string()]
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let ledger = FailureLedger::new();
        let failure = std::io::Error::other("boom");
        ledger.record("id", &failure);
        ledger.record("id", &failure);
        assert_eq!(ledger.failures().len(), 1);
    }

    #[test]
    fn test_capped_and_evicts_oldest() {
        let ledger = FailureLedger::new();
        for i in 0..(MAX_FAILURES + 10) {
            ledger.record(&format!("id-{i}"), &std::io::Error::other("boom"));
        }

        let failures = ledger.failures();
        assert_eq!(failures.len(), MAX_FAILURES);
        assert!(failures[0].starts_with("failure id-10\n"));
        assert!(!failures.iter().any(|f| f.starts_with("failure id-0\n")));
    }
}
