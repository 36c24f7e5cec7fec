//! Query metrics and tracing spans.
//!
//! Instruments are registered on the global OpenTelemetry meter; the
//! application decides which meter provider and exporter receive them.

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};
#[cfg(feature = "metrics")]
use std::time::Duration;

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<OrmMetrics> = Lazy::new(OrmMetrics::init);

#[cfg(feature = "metrics")]
pub struct OrmMetrics {
    pub queries_total: Counter<u64>,
    pub query_errors_total: Counter<u64>,
    pub query_duration: Histogram<f64>,
    pub connection_wait_duration: Histogram<f64>,
    pub transactions_total: Counter<u64>,
}

#[cfg(feature = "metrics")]
impl OrmMetrics {
    pub fn init() -> Self {
        let meter = global::meter("pingorm");

        let queries_total = meter
            .u64_counter("pingorm_queries_total")
            .with_description("Total statements executed")
            .build();

        let query_errors_total = meter
            .u64_counter("pingorm_query_errors_total")
            .with_description("Statements that failed")
            .build();

        let query_duration = meter
            .f64_histogram("pingorm_query_duration_seconds")
            .with_description("Duration of statements")
            .build();

        let connection_wait_duration = meter
            .f64_histogram("pingorm_connection_wait_seconds")
            .with_description("Time spent opening connections")
            .build();

        let transactions_total = meter
            .u64_counter("pingorm_transactions_total")
            .with_description("Completed transactions by outcome")
            .build();

        Self {
            queries_total,
            query_errors_total,
            query_duration,
            connection_wait_duration,
            transactions_total,
        }
    }

    pub fn record_query_duration(&self, elapsed: Duration) {
        self.queries_total.add(1, &[]);
        self.query_duration.record(elapsed.as_secs_f64(), &[]);
    }

    pub fn record_query_error(&self) {
        self.query_errors_total.add(1, &[]);
    }

    pub fn record_connection_wait(&self, elapsed: Duration) {
        self.connection_wait_duration.record(elapsed.as_secs_f64(), &[]);
    }

    pub fn record_transaction(&self, committed: bool) {
        let outcome = if committed { "commit" } else { "rollback" };
        self.transactions_total
            .add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    pub fn execute_query_span(sql: &str) -> Span {
        tracing::info_span!("pingorm.execute", sql = %sql)
    }

    pub fn acquire_connection_span() -> Span {
        tracing::info_span!("pingorm.connect")
    }

    pub fn begin_transaction_span(key: &str) -> Span {
        tracing::info_span!("pingorm.transaction.begin", key = %key)
    }

    pub fn commit_transaction_span(key: &str) -> Span {
        tracing::info_span!("pingorm.transaction.commit", key = %key)
    }

    pub fn rollback_transaction_span(key: &str) -> Span {
        tracing::info_span!("pingorm.transaction.rollback", key = %key)
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_provider_is_a_no_op() {
        METRICS.record_query_duration(Duration::from_millis(3));
        METRICS.record_query_error();
        METRICS.record_connection_wait(Duration::from_millis(1));
        METRICS.record_transaction(true);
    }
}
