//! Histogram helpers (durations in milliseconds)

use super::labels;
use metrics::histogram;
use std::time::Duration;

pub fn auth_duration(mechanism: &'static str, elapsed: Duration) {
    histogram!("pgwire_pool_auth_duration_ms", labels::MECHANISM => mechanism)
        .record(elapsed.as_secs_f64() * 1000.0);
}

pub fn query_duration(kind: &'static str, elapsed: Duration) {
    histogram!("pgwire_pool_query_duration_ms", labels::KIND => kind)
        .record(elapsed.as_secs_f64() * 1000.0);
}
