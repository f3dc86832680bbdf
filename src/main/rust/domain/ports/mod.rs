mod detached_connection;
mod media_pipeline;
mod metrics_reporter;

pub use detached_connection::DetachedConnection;
pub use media_pipeline::{MediaPipeline, PipelineFactory, SinkEvent, SinkEventSender};
pub use metrics_reporter::MetricsReporter;
