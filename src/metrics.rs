#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{RepositoryMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};

    pub static METRICS: Lazy<RepositoryMetrics> = Lazy::new(RepositoryMetrics::init);

    pub struct RepositoryMetrics {
        pub registry: Registry,
        pub provider: SdkMeterProvider,
        pub queries_total: Counter<u64>,
        pub query_errors_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
        pub identity_cache_clears_total: Counter<u64>,
        pub repository_calls_total: Counter<u64>,
    }

    impl RepositoryMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let exporter = opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
                .expect("failed to build prometheus exporter");
            let provider = SdkMeterProvider::builder().with_reader(exporter).build();
            let meter = provider.meter("lifeguard_repository");

            let queries_total = meter
                .u64_counter("lifeguard_repository_queries_total")
                .with_description("Total statements executed")
                .build();

            let query_errors_total = meter
                .u64_counter("lifeguard_repository_query_errors_total")
                .with_description("Statements that returned an error")
                .build();

            let query_duration = meter
                .f64_histogram("lifeguard_repository_query_duration_seconds")
                .with_description("Duration of statements")
                .build();

            let identity_cache_clears_total = meter
                .u64_counter("lifeguard_repository_identity_cache_clears_total")
                .with_description("Identity cache clears after modifying queries")
                .build();

            let repository_calls_total = meter
                .u64_counter("lifeguard_repository_calls_total")
                .with_description("Repository method calls by cardinality")
                .build();

            Self {
                registry,
                provider,
                queries_total,
                query_errors_total,
                query_duration,
                identity_cache_clears_total,
                repository_calls_total,
            }
        }

        pub fn record_query(&self, elapsed: std::time::Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn record_cache_clear(&self) {
            self.identity_cache_clears_total.add(1, &[]);
        }

        pub fn record_call(&self, cardinality: &'static str) {
            self.repository_calls_total
                .add(1, &[KeyValue::new("cardinality", cardinality)]);
        }

        /// Current metrics in the Prometheus text exposition format.
        pub fn gather(&self) -> String {
            let mut buffer = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
                log::warn!("Failed to encode metrics: {e}");
                return String::new();
            }
            String::from_utf8_lossy(&buffer).into_owned()
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    //! Span constructors shared by executors and repository queries.

    use tracing::{info_span, Span};

    /// Longest SQL prefix attached to a span.
    const MAX_SQL_IN_SPAN: usize = 256;

    pub fn execute_query_span(sql: &str) -> Span {
        let mut end = sql.len().min(MAX_SQL_IN_SPAN);
        while !sql.is_char_boundary(end) {
            end -= 1;
        }
        info_span!("lifeguard.execute_query", db.system = "postgresql", db.statement = &sql[..end])
    }

    pub fn repository_query_span(entity: &str, method: &str, cardinality: &str) -> Span {
        info_span!(
            "lifeguard.repository_query",
            entity = entity,
            method = method,
            cardinality = cardinality
        )
    }

    pub fn acquire_connection_span() -> Span {
        info_span!("lifeguard.acquire_connection", db.system = "postgresql")
    }

    pub fn derive_query_span(entity: &str, method: &str) -> Span {
        info_span!("lifeguard.derive_query", entity = entity, method = method)
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::METRICS;
    use std::time::Duration;

    #[test]
    fn test_recorded_metrics_are_exported() {
        METRICS.record_query(Duration::from_millis(3));
        METRICS.record_query_error();
        METRICS.record_cache_clear();
        METRICS.record_call("single");
        let text = METRICS.gather();
        assert!(text.contains("lifeguard_repository_queries_total"));
        assert!(text.contains("lifeguard_repository_identity_cache_clears_total"));
    }
}
