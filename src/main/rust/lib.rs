pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-exports for convenience
pub use application::services::{
    ClientFanout, ControllerHandle, CurrentPipeline, PipelineSupervisor, SourceController,
};
pub use config::{Config, ServiceConfig};
pub use domain::entities::{ActiveSourceSelector, ClientRegistration, SourceRequest};
pub use domain::errors::{DomainError, Result};
pub use domain::ports::{
    DetachedConnection, MediaPipeline, MetricsReporter, PipelineFactory, SinkEvent,
    SinkEventSender,
};
pub use domain::value_objects::{
    OutputFormat, OutputSettings, PipelineId, PipelineParameters, PipelineState, SettingsUpdate,
    SourceConfig, SourceLocator,
};
pub use infrastructure::gstreamer::{GStreamerPipeline, GStreamerPipelineFactory, PipelineBuilder};
pub use infrastructure::http::{control_routes, serve_control_api, serve_stream, StreamListener};
pub use infrastructure::metrics::{serve_metrics, PrometheusReporter};
