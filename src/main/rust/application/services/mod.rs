mod client_fanout;
mod pipeline_supervisor;
mod source_controller;

pub use client_fanout::ClientFanout;
pub use pipeline_supervisor::{CurrentPipeline, PipelineSupervisor};
pub use source_controller::{Command, ControllerHandle, SourceController};
