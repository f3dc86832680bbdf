use std::os::fd::RawFd;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::domain::errors::Result;
use crate::domain::value_objects::{PipelineId, PipelineParameters};

/// Notifications flowing from pipelines (and their supervisor) to the fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    /// The sink of `pipeline_id` dropped `fd` and will not touch it again
    ClientRemoved { pipeline_id: PipelineId, fd: RawFd },
    /// `pipeline_id` was stopped; whatever it still held is orphaned
    PipelineStopped { pipeline_id: PipelineId },
}

pub type SinkEventSender = mpsc::UnboundedSender<SinkEvent>;

/// Port for one running instance of the external media pipeline
pub trait MediaPipeline: Send + Sync {
    fn id(&self) -> PipelineId;

    fn parameters(&self) -> &PipelineParameters;

    /// Blocks until the pipeline is playing or has failed to
    fn start(&self) -> Result<()>;

    /// Blocks until the underlying resources are released. Called once.
    fn stop(&self) -> Result<()>;

    /// Hand `fd` to the sink for direct writes. Fails once stopped.
    fn add_client(&self, fd: RawFd) -> Result<()>;

    fn content_type(&self) -> &'static str {
        self.parameters().output().format.content_type()
    }
}

/// Port for building pipelines from parameters
pub trait PipelineFactory: Send + Sync {
    fn create(
        &self,
        id: PipelineId,
        parameters: PipelineParameters,
    ) -> Result<Arc<dyn MediaPipeline>>;
}
