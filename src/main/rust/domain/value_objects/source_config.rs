use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, Result};

/// Where a source is captured from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceLocator {
    /// DVB tuner capture
    Dvb {
        #[serde(rename = "Frequency")]
        frequency: u32,
        #[serde(rename = "Pids", default, skip_serializing_if = "Option::is_none")]
        pids: Option<String>,
    },
    /// Anything `uridecodebin` can open
    Uri {
        #[serde(rename = "Url")]
        url: String,
    },
}

impl SourceLocator {
    fn validate(&self) -> Result<()> {
        match self {
            SourceLocator::Dvb { frequency, pids } => {
                if *frequency == 0 {
                    return Err(DomainError::InvalidSource(
                        "frequency cannot be zero".to_string(),
                    ));
                }
                if let Some(pids) = pids {
                    let valid = !pids.is_empty()
                        && pids.split(':').all(|pid| {
                            !pid.is_empty() && pid.chars().all(|c| c.is_ascii_digit())
                        });
                    if !valid {
                        return Err(DomainError::InvalidSource(format!(
                            "pids must be ':'-separated numbers: {}",
                            pids
                        )));
                    }
                }
                Ok(())
            }
            SourceLocator::Uri { url } => {
                if !url.contains("://") {
                    return Err(DomainError::InvalidSource(format!(
                        "url must carry a scheme: {}",
                        url
                    )));
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dvb {
                frequency,
                pids: Some(pids),
            } => write!(f, "dvb:{} pids={}", frequency, pids),
            Self::Dvb {
                frequency,
                pids: None,
            } => write!(f, "dvb:{}", frequency),
            Self::Uri { url } => write!(f, "{}", url),
        }
    }
}

/// One configured live input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceConfig {
    pub name: String,
    #[serde(flatten)]
    pub locator: SourceLocator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guide_channel_id: Option<u32>,
    #[serde(default)]
    pub active: bool,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, locator: SourceLocator) -> Self {
        Self {
            name: name.into(),
            locator,
            display_name: None,
            guide_channel_id: None,
            active: false,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_guide_channel_id(mut self, id: u32) -> Self {
        self.guide_channel_id = Some(id);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Name plus locator; the only identity a source has besides its position
    pub fn same_identity(&self, other: &SourceConfig) -> bool {
        self.name == other.name && self.locator == other.locator
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidSource("name cannot be empty".to_string()));
        }
        self.locator.validate()
    }
}
