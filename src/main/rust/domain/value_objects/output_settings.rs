use serde::{Deserialize, Serialize};

use super::OutputFormat;
use crate::domain::errors::{DomainError, Result};

const MAX_WIDTH: u32 = 1920;
const MAX_HEIGHT: u32 = 1080;
const MAX_CAPTURE_CACHE_MS: u32 = 60_000;

/// Global encoder settings shared by every source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OutputSettings {
    pub video_width: u32,
    pub video_height: u32,
    #[serde(rename = "VideoBitrate")]
    pub video_bitrate_kbps: u32,
    #[serde(rename = "AudioBitrate")]
    pub audio_bitrate_kbps: u32,
    pub capture_cache_ms: u32,
    #[serde(alias = "VideoCodec")]
    pub format: OutputFormat,
}

/// Partial settings edit; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SettingsUpdate {
    pub video_width: Option<u32>,
    pub video_height: Option<u32>,
    #[serde(rename = "VideoBitrate")]
    pub video_bitrate_kbps: Option<u32>,
    #[serde(rename = "AudioBitrate")]
    pub audio_bitrate_kbps: Option<u32>,
    pub capture_cache_ms: Option<u32>,
}

impl OutputSettings {
    pub fn validate(&self) -> Result<()> {
        Self::validate_dimension(self.video_width, MAX_WIDTH, "width")?;
        Self::validate_dimension(self.video_height, MAX_HEIGHT, "height")?;

        if self.video_bitrate_kbps == 0 {
            return Err(DomainError::InvalidSettings(
                "video bitrate must be positive".to_string(),
            ));
        }
        if self.audio_bitrate_kbps == 0 {
            return Err(DomainError::InvalidSettings(
                "audio bitrate must be positive".to_string(),
            ));
        }
        if self.capture_cache_ms > MAX_CAPTURE_CACHE_MS {
            return Err(DomainError::InvalidSettings(format!(
                "capture cache {}ms exceeds {}ms",
                self.capture_cache_ms, MAX_CAPTURE_CACHE_MS
            )));
        }

        Ok(())
    }

    /// Returns the settings with `update` applied, validated as a whole.
    /// The receiver is left untouched so a rejected edit changes nothing.
    pub fn merged(&self, update: &SettingsUpdate) -> Result<Self> {
        let merged = Self {
            video_width: update.video_width.unwrap_or(self.video_width),
            video_height: update.video_height.unwrap_or(self.video_height),
            video_bitrate_kbps: update.video_bitrate_kbps.unwrap_or(self.video_bitrate_kbps),
            audio_bitrate_kbps: update.audio_bitrate_kbps.unwrap_or(self.audio_bitrate_kbps),
            capture_cache_ms: update.capture_cache_ms.unwrap_or(self.capture_cache_ms),
            format: self.format,
        };
        merged.validate()?;
        Ok(merged)
    }

    fn validate_dimension(value: u32, max: u32, name: &str) -> Result<()> {
        if value == 0 || value > max {
            return Err(DomainError::InvalidSettings(format!(
                "video {} {} outside 1..={}",
                name, value, max
            )));
        }
        // I420 needs even dimensions
        if value % 2 != 0 {
            return Err(DomainError::InvalidSettings(format!(
                "video {} {} must be even",
                name, value
            )));
        }
        Ok(())
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            video_width: 640,
            video_height: 360,
            video_bitrate_kbps: 1000,
            audio_bitrate_kbps: 128,
            capture_cache_ms: 300,
            format: OutputFormat::default(),
        }
    }
}
