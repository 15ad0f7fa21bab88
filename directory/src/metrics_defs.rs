//! Metrics definitions for the directory client.

use shared::metrics_defs::{MetricDef, MetricType};

pub const POLL_DURATION: MetricDef = MetricDef {
    name: "directory.poll.duration",
    metric_type: MetricType::Histogram,
    description: "Time to fetch a route snapshot from the directory in seconds",
};

pub const POLL_FAILURES: MetricDef = MetricDef {
    name: "directory.poll.failures",
    metric_type: MetricType::Counter,
    description: "Number of route snapshot fetches that failed",
};

pub const ROUTE_UPDATES_EMITTED: MetricDef = MetricDef {
    name: "directory.route_updates",
    metric_type: MetricType::Counter,
    description: "Number of route updates emitted to the reloader",
};

pub const ALL_METRICS: &[MetricDef] = &[POLL_DURATION, POLL_FAILURES, ROUTE_UPDATES_EMITTED];
