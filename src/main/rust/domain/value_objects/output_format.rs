use serde::{Deserialize, Serialize};

/// Container/codec combination produced by the pipeline for viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    WebM,
    Ogg,
    #[serde(alias = "h264", alias = "ts")]
    MpegTs,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::WebM => "webm",
            OutputFormat::Ogg => "ogg",
            OutputFormat::MpegTs => "mpegts",
        }
    }

    /// Content type announced in the live stream preamble
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::WebM => "video/webm",
            OutputFormat::Ogg => "video/ogg",
            OutputFormat::MpegTs => "video/mp2t",
        }
    }
}
