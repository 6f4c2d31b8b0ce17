use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub samples_total: IntCounterVec,
    pub deliveries_total: IntCounterVec,
    pub queue_depth: IntGauge,
    pub drain_latency_seconds: HistogramVec,
    pub proximity_events_total: IntCounterVec,
    pub active_watches: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let samples_total = IntCounterVec::new(
            Opts::new("samples_total", "Position fixes seen by the sampler, by outcome"),
            &["outcome"],
        )
        .expect("valid samples_total metric");

        let deliveries_total = IntCounterVec::new(
            Opts::new("deliveries_total", "Sample delivery attempts by outcome"),
            &["outcome"],
        )
        .expect("valid deliveries_total metric");

        let queue_depth = IntGauge::new("queue_depth", "Samples held in the local telemetry queue")
            .expect("valid queue_depth metric");

        let drain_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "drain_latency_seconds",
                "Latency of queue drain passes in seconds",
            ),
            &["outcome"],
        )
        .expect("valid drain_latency_seconds metric");

        let proximity_events_total = IntCounterVec::new(
            Opts::new("proximity_events_total", "Proximity threshold events fired, by leg"),
            &["leg"],
        )
        .expect("valid proximity_events_total metric");

        let active_watches = IntGauge::new("active_watches", "Open position watches")
            .expect("valid active_watches metric");

        registry
            .register(Box::new(samples_total.clone()))
            .expect("register samples_total");
        registry
            .register(Box::new(deliveries_total.clone()))
            .expect("register deliveries_total");
        registry
            .register(Box::new(queue_depth.clone()))
            .expect("register queue_depth");
        registry
            .register(Box::new(drain_latency_seconds.clone()))
            .expect("register drain_latency_seconds");
        registry
            .register(Box::new(proximity_events_total.clone()))
            .expect("register proximity_events_total");
        registry
            .register(Box::new(active_watches.clone()))
            .expect("register active_watches");

        Self {
            registry,
            samples_total,
            deliveries_total,
            queue_depth,
            drain_latency_seconds,
            proximity_events_total,
            active_watches,
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
