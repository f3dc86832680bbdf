mod gstreamer_pipeline;
mod pipeline_builder;

pub use gstreamer_pipeline::{GStreamerPipeline, GStreamerPipelineFactory};
pub use pipeline_builder::{PipelineBuilder, SINK_NAME};
