use crate::domain::value_objects::PipelineState;

/// Port for metrics reporting
pub trait MetricsReporter: Send + Sync {
    fn report_pipeline_state(&self, state: &PipelineState);
    fn report_pipeline_started(&self);
    fn report_pipeline_start_failed(&self);
    fn report_pipeline_stopped(&self);
    fn report_source_request(&self);
    fn report_client_connected(&self);
    fn report_client_disconnected(&self);
    fn report_client_rejected(&self);
}
