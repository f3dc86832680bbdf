use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Pipeline creation failed: {0}")]
    PipelineCreationFailed(String),

    #[error("Pipeline start failed: {0}")]
    PipelineStartFailed(String),

    #[error("Pipeline stop failed: {0}")]
    PipelineStopFailed(String),

    #[error("Pipeline {0} is stopped")]
    PipelineStopped(u64),

    #[error("Connection takeover failed: {0}")]
    ConnectionTakeoverFailed(String),

    #[error("Descriptor duplication failed: {0}")]
    DuplicationFailed(String),

    #[error("Client registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Descriptor {0} is already registered")]
    DescriptorInUse(i32),

    #[error("Source controller unavailable")]
    ControllerUnavailable,
}

pub type Result<T> = std::result::Result<T, DomainError>;
