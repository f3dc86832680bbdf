use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::PipelineState;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Pipeline state (0=Idle, 1=Starting, 2=Running, 3=Stopping, 4=Failed)
    pub static ref PIPELINE_STATE: Gauge = Gauge::new(
        "pipeline_state",
        "Current state of the supervised pipeline"
    ).expect("metric can be created");

    pub static ref PIPELINE_STARTS: IntCounter = IntCounter::new(
        "pipeline_starts_total",
        "Pipelines started successfully"
    ).expect("metric can be created");

    pub static ref PIPELINE_START_FAILURES: IntCounter = IntCounter::new(
        "pipeline_start_failures_total",
        "Pipelines that failed to build or start"
    ).expect("metric can be created");

    pub static ref PIPELINE_STOPS: IntCounter = IntCounter::new(
        "pipeline_stops_total",
        "Pipelines stopped"
    ).expect("metric can be created");

    pub static ref SOURCE_REQUESTS: IntCounter = IntCounter::new(
        "source_requests_total",
        "Accepted source and settings edits"
    ).expect("metric can be created");

    pub static ref ACTIVE_CLIENTS: IntGauge = IntGauge::new(
        "live_active_clients",
        "Viewers currently registered with the pipeline sink"
    ).expect("metric can be created");

    pub static ref TOTAL_CONNECTIONS: IntCounter = IntCounter::new(
        "live_client_connections_total",
        "Viewers registered since start"
    ).expect("metric can be created");

    pub static ref CLIENT_REJECTIONS: IntCounter = IntCounter::new(
        "live_client_rejections_total",
        "Live stream requests that could not be attached"
    ).expect("metric can be created");
}

pub struct PrometheusReporter;

impl PrometheusReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn init_metrics() -> Result<(), prometheus::Error> {
        REGISTRY.register(Box::new(PIPELINE_STATE.clone()))?;
        REGISTRY.register(Box::new(PIPELINE_STARTS.clone()))?;
        REGISTRY.register(Box::new(PIPELINE_START_FAILURES.clone()))?;
        REGISTRY.register(Box::new(PIPELINE_STOPS.clone()))?;
        REGISTRY.register(Box::new(SOURCE_REQUESTS.clone()))?;
        REGISTRY.register(Box::new(ACTIVE_CLIENTS.clone()))?;
        REGISTRY.register(Box::new(TOTAL_CONNECTIONS.clone()))?;
        REGISTRY.register(Box::new(CLIENT_REJECTIONS.clone()))?;
        Ok(())
    }

    pub fn gather_metrics() -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return b"# Error encoding metrics\n".to_vec();
        }
        buffer
    }
}

impl Default for PrometheusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsReporter for PrometheusReporter {
    fn report_pipeline_state(&self, state: &PipelineState) {
        PIPELINE_STATE.set(state.as_metric());
    }

    fn report_pipeline_started(&self) {
        PIPELINE_STARTS.inc();
    }

    fn report_pipeline_start_failed(&self) {
        PIPELINE_START_FAILURES.inc();
    }

    fn report_pipeline_stopped(&self) {
        PIPELINE_STOPS.inc();
    }

    fn report_source_request(&self) {
        SOURCE_REQUESTS.inc();
    }

    fn report_client_connected(&self) {
        ACTIVE_CLIENTS.inc();
        TOTAL_CONNECTIONS.inc();
    }

    fn report_client_disconnected(&self) {
        ACTIVE_CLIENTS.dec();
    }

    fn report_client_rejected(&self) {
        CLIENT_REJECTIONS.inc();
    }
}
