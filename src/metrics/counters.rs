//! Counter helpers

use super::labels;
use metrics::counter;

/// An authentication exchange started for `mechanism`
pub fn auth_attempted(mechanism: &'static str) {
    counter!("pgwire_pool_auth_attempts_total", labels::MECHANISM => mechanism).increment(1);
}

/// The server accepted the credentials
pub fn auth_successful(mechanism: &'static str) {
    counter!("pgwire_pool_auth_success_total", labels::MECHANISM => mechanism).increment(1);
}

/// Authentication failed, either locally or on the server
pub fn auth_failed(mechanism: &'static str, reason: &'static str) {
    counter!(
        "pgwire_pool_auth_failures_total",
        labels::MECHANISM => mechanism,
        labels::REASON => reason
    )
    .increment(1);
}

/// A query finished, successfully or not
pub fn query_completed(kind: &'static str, status: &'static str) {
    counter!(
        "pgwire_pool_queries_total",
        labels::KIND => kind,
        labels::STATUS => status
    )
    .increment(1);
}

pub fn connection_opened() {
    counter!("pgwire_pool_connections_opened_total").increment(1);
}

pub fn connection_closed(reason: &'static str) {
    counter!("pgwire_pool_connections_closed_total", labels::REASON => reason).increment(1);
}

/// An idle timer fired on a busy socket and was re-armed
pub fn idle_rescheduled() {
    counter!("pgwire_pool_idle_reschedules_total").increment(1);
}
