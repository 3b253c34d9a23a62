//! Prometheus metrics for the cluster control plane.
//!
//! Counters live in a process-wide registry initialized on first use.
//! Scrape endpoints are wired by the surrounding service; the core only
//! increments.

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

/// Process-wide metrics registry for the control plane.
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Records appended to the cluster state ledger.
pub static LEDGER_APPENDS: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "stratomq_ledger_appends_total",
        "Records appended to the cluster state ledger",
    )
    .expect("valid metric definition");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("first registration");
    counter
});

/// Advisories applied to the cluster state, by kind.
pub static ADVISORIES_APPLIED: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "stratomq_advisories_applied_total",
            "Advisories applied to the cluster state",
        ),
        &["kind"],
    )
    .expect("valid metric definition");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("first registration");
    counter
});

/// Partition primary reassignments performed.
pub static PARTITION_REASSIGNMENTS: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "stratomq_partition_reassignments_total",
        "Partition primary reassignments performed",
    )
    .expect("valid metric definition");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("first registration");
    counter
});

/// Control messages that failed to decode and were dropped.
///
/// Incremented by [`ClusterMessage::decode`] (and therefore by
/// `extract` on event blobs) before the malformed-message error is
/// returned to the caller.
///
/// [`ClusterMessage::decode`]: super::messages::ClusterMessage::decode
pub static MESSAGE_DECODE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "stratomq_message_decode_failures_total",
        "Control messages that failed to decode and were dropped",
    )
    .expect("valid metric definition");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("first registration");
    counter
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::messages::ClusterMessage;

    #[test]
    fn test_counters_register_and_count() {
        let before = LEDGER_APPENDS.get();
        LEDGER_APPENDS.inc();
        assert_eq!(LEDGER_APPENDS.get(), before + 1);

        ADVISORIES_APPLIED
            .with_label_values(&["queueAssignmentAdvisory"])
            .inc();
        assert!(
            ADVISORIES_APPLIED
                .with_label_values(&["queueAssignmentAdvisory"])
                .get()
                >= 1
        );

        PARTITION_REASSIGNMENTS.inc();

        // Everything above landed in the shared registry.
        assert!(REGISTRY.gather().len() >= 4);
    }

    #[test]
    fn test_decode_failure_increments_through_real_path() {
        let before = MESSAGE_DECODE_FAILURES.get();
        assert!(ClusterMessage::decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF]).is_err());
        // Other tests may decode garbage concurrently; only monotonic
        // growth is guaranteed.
        assert!(MESSAGE_DECODE_FAILURES.get() > before);
    }
}
