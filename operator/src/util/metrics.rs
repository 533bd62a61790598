use prometheus::{HistogramVec, IntCounterVec, Opts};

/// Per-controller Prometheus metrics. One instance per `{kind}`-controller
/// (clusters/topologies/workerpools each register their own under a
/// distinct `subsystem` so cardinality stays per-kind), all registered
/// into the process-wide default registry so `metrics::run_server` can
/// gather a single `/metrics` response regardless of which controllers
/// are currently leading.
#[derive(Clone)]
pub struct ControllerMetrics {
    pub reconcile_counter: IntCounterVec,
    pub action_counter: IntCounterVec,
    pub read_histogram: HistogramVec,
    pub write_histogram: HistogramVec,
}

impl ControllerMetrics {
    pub fn new(subsystem: &str) -> Self {
        let reconcile_counter = IntCounterVec::new(
            Opts::new(
                format!("{subsystem}_reconcile_total"),
                "Total number of reconciliations",
            ),
            &["name", "namespace"],
        )
        .expect("static metric config is valid");

        let action_counter = IntCounterVec::new(
            Opts::new(
                format!("{subsystem}_action_total"),
                "Total number of actions taken per reconciliation",
            ),
            &["name", "namespace", "action"],
        )
        .expect("static metric config is valid");

        let read_histogram = HistogramVec::new(
            prometheus::HistogramOpts::new(
                format!("{subsystem}_read_duration_seconds"),
                "Duration of the read phase of reconciliation",
            ),
            &["name", "namespace", "action"],
        )
        .expect("static metric config is valid");

        let write_histogram = HistogramVec::new(
            prometheus::HistogramOpts::new(
                format!("{subsystem}_write_duration_seconds"),
                "Duration of the write phase of reconciliation",
            ),
            &["name", "namespace", "action"],
        )
        .expect("static metric config is valid");

        let metrics = Self {
            reconcile_counter,
            action_counter,
            read_histogram,
            write_histogram,
        };
        metrics.register();
        metrics
    }

    fn register(&self) {
        prometheus::register(Box::new(self.reconcile_counter.clone())).ok();
        prometheus::register(Box::new(self.action_counter.clone())).ok();
        prometheus::register(Box::new(self.read_histogram.clone())).ok();
        prometheus::register(Box::new(self.write_histogram.clone())).ok();
    }
}
