use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::ports::{
    MediaPipeline, MetricsReporter, PipelineFactory, SinkEvent, SinkEventSender,
};
use crate::domain::value_objects::{PipelineId, PipelineParameters, PipelineState};

/// Read side of "whichever pipeline is running right now"
pub type CurrentPipeline = watch::Receiver<Option<Arc<dyn MediaPipeline>>>;

/// Owns the single running pipeline and restarts it only when the
/// pipeline-relevant parameters actually change.
pub struct PipelineSupervisor {
    factory: Arc<dyn PipelineFactory>,
    events: SinkEventSender,
    metrics: Arc<dyn MetricsReporter>,
    current: watch::Sender<Option<Arc<dyn MediaPipeline>>>,
    running: Option<Arc<dyn MediaPipeline>>,
    state: PipelineState,
    next_id: u64,
}

impl PipelineSupervisor {
    pub fn new(
        factory: Arc<dyn PipelineFactory>,
        events: SinkEventSender,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            factory,
            events,
            metrics,
            current,
            running: None,
            state: PipelineState::Idle,
            next_id: 1,
        }
    }

    pub fn subscribe(&self) -> CurrentPipeline {
        self.current.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn running_parameters(&self) -> Option<&PipelineParameters> {
        self.running.as_ref().map(|p| p.parameters())
    }

    /// Drives the pipeline towards `desired`; `None` means nothing should play.
    ///
    /// Blocks for the whole transition. The previous handle is fully stopped
    /// before the next one is created, since both may need the same tuner.
    pub fn apply(&mut self, desired: Option<PipelineParameters>) {
        if let (Some(running), Some(desired)) = (&self.running, &desired) {
            if running.parameters() == desired {
                tracing::debug!(
                    pipeline_id = %running.id(),
                    "Pipeline parameters unchanged, keeping current pipeline"
                );
                return;
            }
        }

        self.stop_running();

        match desired {
            Some(parameters) => self.start_new(parameters),
            None => self.set_state(PipelineState::Idle),
        }
    }

    /// Stops whatever is running
    pub fn shutdown(&mut self) {
        self.apply(None);
    }

    fn stop_running(&mut self) {
        let Some(pipeline) = self.running.take() else {
            return;
        };
        let pipeline_id = pipeline.id();

        self.set_state(PipelineState::Stopping);
        // Unpublish first so no new viewer lands on a handle being torn down
        self.current.send_replace(None);

        tracing::info!(
            pipeline_id = %pipeline_id,
            source = %pipeline.parameters().locator(),
            "Stopping pipeline"
        );
        if let Err(e) = pipeline.stop() {
            // Discarded regardless; the external resource may leak until exit
            tracing::warn!(pipeline_id = %pipeline_id, "Pipeline stop failed: {}", e);
        }
        self.metrics.report_pipeline_stopped();
        self.notify_stopped(pipeline_id);
    }

    fn start_new(&mut self, parameters: PipelineParameters) {
        let pipeline_id = PipelineId(self.next_id);
        self.next_id += 1;

        self.set_state(PipelineState::Starting);
        tracing::info!(
            pipeline_id = %pipeline_id,
            source = %parameters.locator(),
            "Starting pipeline"
        );

        let pipeline = match self.factory.create(pipeline_id, parameters) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                tracing::error!(pipeline_id = %pipeline_id, "Pipeline creation failed: {}", e);
                self.fail_start();
                return;
            }
        };

        if let Err(e) = pipeline.start() {
            tracing::error!(pipeline_id = %pipeline_id, "Pipeline start failed: {}", e);
            // Release whatever the half-built pipeline grabbed
            if let Err(e) = pipeline.stop() {
                tracing::warn!(pipeline_id = %pipeline_id, "Cleanup after failed start: {}", e);
            }
            self.notify_stopped(pipeline_id);
            self.fail_start();
            return;
        }

        self.running = Some(pipeline.clone());
        self.current.send_replace(Some(pipeline));
        self.metrics.report_pipeline_started();
        self.set_state(PipelineState::Running);
    }

    fn fail_start(&mut self) {
        self.metrics.report_pipeline_start_failed();
        self.set_state(PipelineState::Failed);
    }

    fn notify_stopped(&self, pipeline_id: PipelineId) {
        if self
            .events
            .send(SinkEvent::PipelineStopped { pipeline_id })
            .is_err()
        {
            tracing::debug!(pipeline_id = %pipeline_id, "No fan-out listening for sink events");
        }
    }

    fn set_state(&mut self, state: PipelineState) {
        if self.state != state {
            tracing::debug!("Pipeline state {} -> {}", self.state, state);
        }
        self.state = state;
        self.metrics.report_pipeline_state(&state);
    }
}

impl Drop for PipelineSupervisor {
    fn drop(&mut self) {
        self.stop_running();
    }
}
