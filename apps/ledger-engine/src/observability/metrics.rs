//! Ledger metrics.
//!
//! | Metric | Labels |
//! |--------|--------|
//! | `ledger_idempotency_total` | `outcome` |
//! | `ledger_transitions_total` | `to` |
//! | `ledger_broker_failures_total` | `operation`, `kind` |
//! | `ledger_cache_reads_total` | `source` |
//! | `ledger_reconciliation_runs_total` | `kind`, `passed` |
//! | `ledger_reconciliation_discrepancies_total` | `kind`, `category` |

use metrics::counter;

use crate::domain::order::OrderStatus;

/// Idempotency outcome labels.
pub mod idempotency_outcome {
    /// First request for a key.
    pub const ACCEPTED: &str = "accepted";
    /// Completed response replayed.
    pub const REPLAYED: &str = "replayed";
    /// Same key, different payload.
    pub const KEY_REUSED: &str = "key_reused";
    /// Same key still executing.
    pub const IN_PROGRESS: &str = "in_progress";
}

/// Count an idempotency check.
pub fn record_idempotency_outcome(outcome: &'static str) {
    counter!("ledger_idempotency_total", "outcome" => outcome).increment(1);
}

/// Count an accepted order transition.
pub fn record_transition(to: OrderStatus) {
    counter!("ledger_transitions_total", "to" => to.as_str()).increment(1);
}

/// Count a classified broker failure.
pub fn record_broker_failure(operation: &'static str, kind: &'static str) {
    counter!("ledger_broker_failures_total", "operation" => operation, "kind" => kind).increment(1);
}

/// Count a cache read by where the value came from.
pub fn record_cache_read(source: &'static str) {
    counter!("ledger_cache_reads_total", "source" => source).increment(1);
}

/// Count a reconciliation run and its discrepancies.
pub fn record_reconciliation(
    kind: &'static str,
    passed: bool,
    missing_at_broker: usize,
    missing_locally: usize,
    drifted: usize,
) {
    counter!(
        "ledger_reconciliation_runs_total",
        "kind" => kind,
        "passed" => if passed { "true" } else { "false" }
    )
    .increment(1);

    for (category, count) in [
        ("missing_at_broker", missing_at_broker),
        ("missing_locally", missing_locally),
        ("drift", drifted),
    ] {
        if count > 0 {
            counter!(
                "ledger_reconciliation_discrepancies_total",
                "kind" => kind,
                "category" => category
            )
            .increment(count as u64);
        }
    }
}
