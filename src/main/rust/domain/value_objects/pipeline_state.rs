use std::fmt;

/// Lifecycle of the single supervised pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// No source selected
    #[default]
    Idle,
    /// Building and starting a new handle
    Starting,
    /// A handle is playing
    Running,
    /// Tearing the current handle down
    Stopping,
    /// Last start attempt failed; nothing is playing
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Starting => write!(f, "STARTING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Stopping => write!(f, "STOPPING"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl PipelineState {
    /// Convert state to numeric value for metrics
    pub fn as_metric(&self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::Starting => 1.0,
            Self::Running => 2.0,
            Self::Stopping => 3.0,
            Self::Failed => 4.0,
        }
    }
}
