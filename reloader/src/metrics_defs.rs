//! Metrics definitions for the reloader.

use shared::metrics_defs::{MetricDef, MetricType};

pub const ROUTE_UPDATES: MetricDef = MetricDef {
    name: "reloader.route_updates",
    metric_type: MetricType::Counter,
    description: "Number of route updates applied to the route table",
};

pub const ROUTED_SERVICES: MetricDef = MetricDef {
    name: "reloader.routed_services",
    metric_type: MetricType::Gauge,
    description: "Number of services with at least one HTTP route",
};

pub const RENDERS: MetricDef = MetricDef {
    name: "reloader.renders",
    metric_type: MetricType::Counter,
    description: "Number of times the proxy configuration was rendered",
};

pub const PUBLISH_UNCHANGED: MetricDef = MetricDef {
    name: "reloader.publish.unchanged",
    metric_type: MetricType::Counter,
    description: "Number of renders identical to the published configuration",
};

pub const RELOADS: MetricDef = MetricDef {
    name: "reloader.reloads",
    metric_type: MetricType::Counter,
    description: "Number of successful proxy reloads",
};

pub const RELOAD_FAILURES: MetricDef = MetricDef {
    name: "reloader.reload.failures",
    metric_type: MetricType::Counter,
    description: "Number of proxy reloads that failed to start or exited with an error",
};

pub const RELOAD_DURATION: MetricDef = MetricDef {
    name: "reloader.reload.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent waiting for the proxy to take over in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    ROUTE_UPDATES,
    ROUTED_SERVICES,
    RENDERS,
    PUBLISH_UNCHANGED,
    RELOADS,
    RELOAD_FAILURES,
    RELOAD_DURATION,
];
