use std::os::fd::RawFd;
use std::sync::{Arc, Mutex, MutexGuard};

use gstreamer::prelude::*;

use super::{PipelineBuilder, SINK_NAME};
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{MediaPipeline, PipelineFactory, SinkEvent, SinkEventSender};
use crate::domain::value_objects::{PipelineId, PipelineParameters};

/// How long `start` waits for the pipeline to settle
const START_TIMEOUT_SECS: u64 = 10;

/// One launched GStreamer pipeline ending in a `multifdsink`
pub struct GStreamerPipeline {
    id: PipelineId,
    parameters: PipelineParameters,
    pipeline: gstreamer::Pipeline,
    sink: gstreamer::Element,
    stopped: Mutex<bool>,
}

impl GStreamerPipeline {
    pub fn new(
        id: PipelineId,
        parameters: PipelineParameters,
        events: SinkEventSender,
    ) -> Result<Self> {
        let launch = PipelineBuilder::build_launch_string(&parameters);
        tracing::info!(pipeline_id = %id, "Creating pipeline: {}", launch);

        let pipeline = gstreamer::parse::launch(&launch)
            .map_err(|e| DomainError::PipelineCreationFailed(e.to_string()))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| {
                DomainError::PipelineCreationFailed("Failed to downcast to Pipeline".to_string())
            })?;

        let sink = pipeline.by_name(SINK_NAME).ok_or_else(|| {
            DomainError::PipelineCreationFailed(format!("Missing element '{}'", SINK_NAME))
        })?;

        // Emitted once the sink no longer touches the descriptor, which is
        // the earliest point it may be closed.
        sink.connect("client-fd-removed", false, move |values: &[glib::Value]| {
            match values.get(1).and_then(|value| value.get::<i32>().ok()) {
                Some(fd) => {
                    if events
                        .send(SinkEvent::ClientRemoved {
                            pipeline_id: id,
                            fd,
                        })
                        .is_err()
                    {
                        tracing::warn!(fd, pipeline_id = %id, "Fan-out gone, descriptor not released");
                    }
                }
                None => tracing::warn!(pipeline_id = %id, "client-fd-removed without descriptor"),
            }
            None::<glib::Value>
        });

        let bus = pipeline.bus().ok_or_else(|| {
            DomainError::PipelineCreationFailed("Failed to get bus".to_string())
        })?;
        bus.set_sync_handler(move |_bus, msg| {
            Self::log_bus_message(id, msg);
            gstreamer::BusSyncReply::Drop
        });

        Ok(Self {
            id,
            parameters,
            pipeline,
            sink,
            stopped: Mutex::new(false),
        })
    }

    fn log_bus_message(id: PipelineId, msg: &gstreamer::Message) {
        match msg.view() {
            gstreamer::MessageView::Eos(_) => {
                tracing::warn!(pipeline_id = %id, "End of stream");
            }
            gstreamer::MessageView::Error(err) => {
                tracing::error!(
                    pipeline_id = %id,
                    "Error from {:?}: {} ({:?})",
                    err.src().map(|s| s.path_string()),
                    err.error(),
                    err.debug()
                );
            }
            gstreamer::MessageView::Warning(warn) => {
                tracing::warn!(
                    pipeline_id = %id,
                    "Warning from {:?}: {} ({:?})",
                    warn.src().map(|s| s.path_string()),
                    warn.error(),
                    warn.debug()
                );
            }
            gstreamer::MessageView::StateChanged(state_changed) => {
                let from_pipeline = state_changed
                    .src()
                    .map(|s| s.type_().is_a(gstreamer::Pipeline::static_type()))
                    .unwrap_or(false);
                if from_pipeline {
                    tracing::debug!(
                        pipeline_id = %id,
                        "Pipeline state changed from {:?} to {:?}",
                        state_changed.old(),
                        state_changed.current()
                    );
                }
            }
            _ => {}
        }
    }

    fn stopped(&self) -> MutexGuard<'_, bool> {
        self.stopped
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MediaPipeline for GStreamerPipeline {
    fn id(&self) -> PipelineId {
        self.id
    }

    fn parameters(&self) -> &PipelineParameters {
        &self.parameters
    }

    fn start(&self) -> Result<()> {
        if *self.stopped() {
            return Err(DomainError::PipelineStopped(self.id.0));
        }

        self.pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| DomainError::PipelineStartFailed(e.to_string()))?;

        // Live sources never preroll; only an outright failure counts
        let (result, current, pending) = self
            .pipeline
            .state(gstreamer::ClockTime::from_seconds(START_TIMEOUT_SECS));
        result.map_err(|e| DomainError::PipelineStartFailed(e.to_string()))?;

        tracing::info!(
            pipeline_id = %self.id,
            "Pipeline started (state {:?}, pending {:?})",
            current,
            pending
        );
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut stopped = self.stopped();
        if *stopped {
            return Ok(());
        }
        *stopped = true;

        self.pipeline
            .set_state(gstreamer::State::Null)
            .map_err(|e| DomainError::PipelineStopFailed(e.to_string()))?;
        tracing::info!(pipeline_id = %self.id, "Pipeline stopped");
        Ok(())
    }

    fn add_client(&self, fd: RawFd) -> Result<()> {
        // Held while adding so a concurrent stop waits for us
        let stopped = self.stopped();
        if *stopped {
            return Err(DomainError::PipelineStopped(self.id.0));
        }
        self.sink.emit_by_name::<()>("add", &[&fd]);
        Ok(())
    }
}

impl Drop for GStreamerPipeline {
    fn drop(&mut self) {
        if !*self.stopped() {
            let _ = self.pipeline.set_state(gstreamer::State::Null);
        }
    }
}

/// Builds `GStreamerPipeline`s wired to the fan-out's event channel
pub struct GStreamerPipelineFactory {
    events: SinkEventSender,
}

impl GStreamerPipelineFactory {
    pub fn new(events: SinkEventSender) -> Self {
        Self { events }
    }
}

impl PipelineFactory for GStreamerPipelineFactory {
    fn create(
        &self,
        id: PipelineId,
        parameters: PipelineParameters,
    ) -> Result<Arc<dyn MediaPipeline>> {
        let pipeline = GStreamerPipeline::new(id, parameters, self.events.clone())?;
        Ok(Arc::new(pipeline))
    }
}
