use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub parcels_created_total: IntCounter,
    pub assignments_total: IntCounterVec,
    pub settlements_total: IntCounterVec,
    pub settlement_latency_seconds: HistogramVec,
    pub side_effect_failures_total: IntCounterVec,
    pub riders_in_delivery: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let parcels_created_total =
            IntCounter::new("parcels_created_total", "Total parcels booked")
                .expect("valid parcels_created_total metric");

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Rider assignments by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let settlements_total = IntCounterVec::new(
            Opts::new("settlements_total", "Settlement confirmations by outcome"),
            &["outcome"],
        )
        .expect("valid settlements_total metric");

        let settlement_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "settlement_latency_seconds",
                "Latency of settlement confirmation in seconds",
            ),
            &["outcome"],
        )
        .expect("valid settlement_latency_seconds metric");

        let side_effect_failures_total = IntCounterVec::new(
            Opts::new(
                "side_effect_failures_total",
                "Best-effort side effects that failed and were swallowed",
            ),
            &["kind"],
        )
        .expect("valid side_effect_failures_total metric");

        let riders_in_delivery =
            IntGauge::new("riders_in_delivery", "Riders currently in delivery")
                .expect("valid riders_in_delivery metric");

        registry
            .register(Box::new(parcels_created_total.clone()))
            .expect("register parcels_created_total");
        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(settlements_total.clone()))
            .expect("register settlements_total");
        registry
            .register(Box::new(settlement_latency_seconds.clone()))
            .expect("register settlement_latency_seconds");
        registry
            .register(Box::new(side_effect_failures_total.clone()))
            .expect("register side_effect_failures_total");
        registry
            .register(Box::new(riders_in_delivery.clone()))
            .expect("register riders_in_delivery");

        Self {
            registry,
            parcels_created_total,
            assignments_total,
            settlements_total,
            settlement_latency_seconds,
            side_effect_failures_total,
            riders_in_delivery,
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
