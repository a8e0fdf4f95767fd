//! Repository query metrics.
//!
//! Latency histograms are recorded on the `metrics` facade under the
//! service's own metric names; the exporter is wired by the deployment,
//! not here. Engine-level counters (offers, payments, outbox) live with
//! the engines that produce them.

use metrics::histogram;
use std::time::Instant;

/// Histogram of repository query latency, labeled by query name.
pub const DB_QUERY_DURATION: &str = "ride_hailing_db_query_duration_seconds";

/// Times one repository query.
///
/// Usage:
/// ```ignore
/// let timer = QueryTimer::new("find_ride_by_id");
/// let result = sqlx::query_as::<_, RideEntity>(...).fetch_optional(&pool).await;
/// timer.record();
/// result
/// ```
pub struct QueryTimer {
    query_name: String,
    start: Instant,
}

impl QueryTimer {
    /// Create a new timer for the given query name.
    pub fn new(query_name: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            start: Instant::now(),
        }
    }

    /// Record the elapsed duration to the query histogram.
    pub fn record(self) {
        histogram!(DB_QUERY_DURATION, "query" => self.query_name)
            .record(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_timer_creation() {
        let timer = QueryTimer::new("find_ride_by_id");
        assert_eq!(timer.query_name, "find_ride_by_id");
    }

    #[test]
    fn test_query_timer_with_string() {
        let name = String::from("accept_ride");
        let timer = QueryTimer::new(name);
        assert_eq!(timer.query_name, "accept_ride");
    }

    #[test]
    fn test_metric_name_is_service_scoped() {
        assert!(DB_QUERY_DURATION.starts_with("ride_hailing_"));
    }
}
