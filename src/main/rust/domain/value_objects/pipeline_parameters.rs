use std::fmt;

use super::{OutputSettings, SourceConfig, SourceLocator};

/// Identifies one pipeline instance for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub u64);

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything that goes into building a pipeline, and nothing else.
///
/// Two values compare equal exactly when they would build the same
/// pipeline; display names and guide metadata never take part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineParameters {
    locator: SourceLocator,
    output: OutputSettings,
}

impl PipelineParameters {
    pub fn new(source: &SourceConfig, output: &OutputSettings) -> Self {
        Self {
            locator: source.locator.clone(),
            output: output.clone(),
        }
    }

    pub fn locator(&self) -> &SourceLocator {
        &self.locator
    }

    pub fn output(&self) -> &OutputSettings {
        &self.output
    }
}
