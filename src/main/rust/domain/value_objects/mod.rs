mod output_format;
mod output_settings;
mod pipeline_parameters;
mod pipeline_state;
mod source_config;

pub use output_format::OutputFormat;
pub use output_settings::{OutputSettings, SettingsUpdate};
pub use pipeline_parameters::{PipelineId, PipelineParameters};
pub use pipeline_state::PipelineState;
pub use source_config::{SourceConfig, SourceLocator};
