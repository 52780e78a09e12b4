//! Metrics and tracing helpers.
//!
//! With the `metrics` feature, counters are exported through the Prometheus
//! default registry (served by `jaspel-server` at `/metrics`). With the
//! `tracing` feature, [`tracing_helpers`] provides the spans used around
//! transactions, status transitions and calculations.

#[cfg(feature = "metrics")]
pub use prometheus_metrics::{JaspelMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::Counter;
    use opentelemetry::{global, KeyValue};
    use opentelemetry_sdk::metrics::SdkMeterProvider;

    pub static METRICS: Lazy<JaspelMetrics> = Lazy::new(JaspelMetrics::init);

    pub struct JaspelMetrics {
        pub transitions_total: Counter<u64>,
        pub calculations_total: Counter<u64>,
        pub cache_hits: Counter<u64>,
        pub cache_misses: Counter<u64>,
        pub rule_rejections: Counter<u64>,
    }

    impl JaspelMetrics {
        pub fn init() -> Self {
            let exporter = opentelemetry_prometheus::exporter()
                .with_registry(prometheus::default_registry().clone())
                .build()
                .expect("failed to build prometheus exporter");
            let provider = SdkMeterProvider::builder().with_reader(exporter).build();
            global::set_meter_provider(provider);
            let meter = global::meter("jaspel");

            let transitions_total = meter
                .u64_counter("jaspel_status_transitions_total")
                .with_description("Validation status transitions applied")
                .build();

            let calculations_total = meter
                .u64_counter("jaspel_calculations_total")
                .with_description("Fee calculations performed")
                .build();

            let cache_hits = meter
                .u64_counter("jaspel_cache_hits_total")
                .with_description("Read cache hits")
                .build();

            let cache_misses = meter
                .u64_counter("jaspel_cache_misses_total")
                .with_description("Read cache misses")
                .build();

            let rule_rejections = meter
                .u64_counter("jaspel_rule_rejections_total")
                .with_description("Jaspel entries rejected by the input rule")
                .build();

            Self {
                transitions_total,
                calculations_total,
                cache_hits,
                cache_misses,
                rule_rejections,
            }
        }

        pub fn record_transition(&self, kind: &'static str, to: &'static str) {
            self.transitions_total.add(
                1,
                &[KeyValue::new("kind", kind), KeyValue::new("to", to)],
            );
        }

        pub fn record_calculation(&self, policy: &'static str) {
            self.calculations_total
                .add(1, &[KeyValue::new("policy", policy)]);
        }

        pub fn record_cache_hit(&self) {
            self.cache_hits.add(1, &[]);
        }

        pub fn record_cache_miss(&self) {
            self.cache_misses.add(1, &[]);
        }

        pub fn record_rule_rejection(&self) {
            self.rule_rejections.add(1, &[]);
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn transaction_span(operation: &str) -> Span {
        info_span!("jaspel.transaction", operation = operation)
    }

    pub fn transition_span(record: &str, to: &str) -> Span {
        info_span!("jaspel.transition", record = record, to = to)
    }

    pub fn calculation_span(policy: &str) -> Span {
        info_span!("jaspel.calculation", policy = policy)
    }

    pub fn request_span(method: &str, path: &str) -> Span {
        info_span!("jaspel.request", method = method, path = path)
    }
}
