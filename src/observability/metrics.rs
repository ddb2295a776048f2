use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub order_transitions_total: IntCounterVec,
    pub assignment_attempts_total: IntCounterVec,
    pub pending_retries: IntGauge,
    pub assignment_latency_seconds: HistogramVec,
    pub rider_utilization: GaugeVec,
    pub wallet_operations_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let order_transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Order lifecycle transitions by target status"),
            &["status"],
        )
        .expect("valid order_transitions_total metric");

        let assignment_attempts_total = IntCounterVec::new(
            Opts::new("assignment_attempts_total", "Assignment attempts by target and outcome"),
            &["target", "outcome"],
        )
        .expect("valid assignment_attempts_total metric");

        let pending_retries = IntGauge::new("pending_retries", "Scheduled reassignment retries")
            .expect("valid pending_retries metric");

        let assignment_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of candidate selection in seconds",
            ),
            &["target"],
        )
        .expect("valid assignment_latency_seconds metric");

        let rider_utilization = GaugeVec::new(
            Opts::new("rider_utilization", "Rider active orders over capacity [0..1]"),
            &["rider_id"],
        )
        .expect("valid rider_utilization metric");

        let wallet_operations_total = IntCounterVec::new(
            Opts::new("wallet_operations_total", "Rider wallet ledger operations"),
            &["kind"],
        )
        .expect("valid wallet_operations_total metric");

        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(assignment_attempts_total.clone()))
            .expect("register assignment_attempts_total");
        registry
            .register(Box::new(pending_retries.clone()))
            .expect("register pending_retries");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(rider_utilization.clone()))
            .expect("register rider_utilization");
        registry
            .register(Box::new(wallet_operations_total.clone()))
            .expect("register wallet_operations_total");

        Self {
            registry,
            order_transitions_total,
            assignment_attempts_total,
            pending_retries,
            assignment_latency_seconds,
            rider_utilization,
            wallet_operations_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
