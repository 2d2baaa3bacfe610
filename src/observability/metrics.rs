use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub deliveries_created_total: IntCounter,
    pub delivery_transitions_total: IntCounterVec,
    pub notifications_total: IntCounterVec,
    pub fanout_latency_seconds: HistogramVec,
    pub dispatch_queue_depth: IntGauge,
    pub dispatch_dropped_total: IntCounterVec,
    pub geo_cache_lookups_total: IntCounterVec,
    pub commissions_recorded_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let deliveries_created_total =
            IntCounter::new("deliveries_created_total", "Total deliveries created")
                .expect("valid deliveries_created_total metric");

        let delivery_transitions_total = IntCounterVec::new(
            Opts::new(
                "delivery_transitions_total",
                "Delivery status transitions by target status",
            ),
            &["to"],
        )
        .expect("valid delivery_transitions_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Push notification attempts by outcome"),
            &["outcome"],
        )
        .expect("valid notifications_total metric");

        let fanout_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "fanout_latency_seconds",
                "Latency of new-delivery fan-out in seconds",
            ),
            &["outcome"],
        )
        .expect("valid fanout_latency_seconds metric");

        let dispatch_queue_depth = IntGauge::new(
            "dispatch_queue_depth",
            "Deliveries waiting for dispatch fan-out",
        )
        .expect("valid dispatch_queue_depth metric");

        let dispatch_dropped_total = IntCounterVec::new(
            Opts::new(
                "dispatch_dropped_total",
                "Deliveries that skipped fan-out, by reason",
            ),
            &["reason"],
        )
        .expect("valid dispatch_dropped_total metric");

        let geo_cache_lookups_total = IntCounterVec::new(
            Opts::new("geo_cache_lookups_total", "Route cache lookups by result"),
            &["result"],
        )
        .expect("valid geo_cache_lookups_total metric");

        let commissions_recorded_total =
            IntCounter::new("commissions_recorded_total", "Commission entries recorded")
                .expect("valid commissions_recorded_total metric");

        registry
            .register(Box::new(deliveries_created_total.clone()))
            .expect("register deliveries_created_total");
        registry
            .register(Box::new(delivery_transitions_total.clone()))
            .expect("register delivery_transitions_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(fanout_latency_seconds.clone()))
            .expect("register fanout_latency_seconds");
        registry
            .register(Box::new(dispatch_queue_depth.clone()))
            .expect("register dispatch_queue_depth");
        registry
            .register(Box::new(dispatch_dropped_total.clone()))
            .expect("register dispatch_dropped_total");
        registry
            .register(Box::new(geo_cache_lookups_total.clone()))
            .expect("register geo_cache_lookups_total");
        registry
            .register(Box::new(commissions_recorded_total.clone()))
            .expect("register commissions_recorded_total");

        Self {
            registry,
            deliveries_created_total,
            delivery_transitions_total,
            notifications_total,
            fanout_latency_seconds,
            dispatch_queue_depth,
            dispatch_dropped_total,
            geo_cache_lookups_total,
            commissions_recorded_total,
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
