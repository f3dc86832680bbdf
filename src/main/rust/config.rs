use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde_json::{Map, Value};

use crate::domain::value_objects::{OutputSettings, SourceConfig};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pipeline-live-switch",
    version = "0.1.0",
    author = "Hawkeye Video Pipeline",
    about = "Live source switcher serving one transcoded stream to many viewers"
)]
pub struct Config {
    /// Path to the sources and output settings file
    #[arg(long, env = "SOURCES_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Address all listeners bind to
    #[arg(long, env = "LISTEN_HOST", default_value = "0.0.0.0")]
    pub listen_host: IpAddr,

    /// Control API port
    #[arg(long, env = "WEB_PORT", default_value = "8080")]
    pub web_port: u16,

    /// Live stream port
    #[arg(long, env = "STREAM_PORT", default_value = "8081")]
    pub stream_port: u16,

    /// Path viewers request on the stream port
    #[arg(long, env = "STREAM_MOUNT", default_value = "/live")]
    pub stream_mount: String,

    /// Metrics server port
    #[arg(long, env = "METRICS_PORT", default_value = "9003")]
    pub metrics_port: u16,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Minimum allowed port (ports below 1024 are privileged)
const MIN_USER_PORT: u16 = 1024;

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        Self::validate_port(self.web_port, "web")?;
        Self::validate_port(self.stream_port, "stream")?;
        Self::validate_port(self.metrics_port, "metrics")?;

        let ports = [self.web_port, self.stream_port, self.metrics_port];
        if ports[0] == ports[1] || ports[0] == ports[2] || ports[1] == ports[2] {
            anyhow::bail!(
                "Web ({}), stream ({}) and metrics ({}) ports must differ",
                self.web_port,
                self.stream_port,
                self.metrics_port
            );
        }

        if !self.stream_mount.starts_with('/') {
            anyhow::bail!("Stream mount must start with '/': {}", self.stream_mount);
        }

        Ok(())
    }

    fn validate_port(port: u16, name: &str) -> anyhow::Result<()> {
        if port == 0 {
            anyhow::bail!("Invalid {} port: port cannot be 0", name);
        }
        if port < MIN_USER_PORT {
            anyhow::bail!(
                "Invalid {} port: {} is a privileged port (< {}). Use a port >= {}",
                name,
                port,
                MIN_USER_PORT,
                MIN_USER_PORT
            );
        }
        Ok(())
    }

    pub fn web_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_host, self.web_port)
    }

    pub fn stream_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_host, self.stream_port)
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_host, self.metrics_port)
    }
}

/// Keys understood inside the settings object
const SETTINGS_KEYS: &[&str] = &[
    "VideoWidth",
    "VideoHeight",
    "VideoBitrate",
    "AudioBitrate",
    "CaptureCacheMs",
    "Format",
    "VideoCodec",
];

/// Contents of the sources file.
///
/// Settings are read from a nested `Settings` object or, in the older flat
/// layout, from the top level next to `Streams`. Keys that configure
/// nothing here are logged and skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceConfig {
    pub settings: OutputSettings,
    pub streams: Vec<SourceConfig>,
}

impl ServiceConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_json(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let mut document: Map<String, Value> = serde_json::from_str(raw)?;

        let streams = match document.remove("Streams") {
            Some(streams) => serde_json::from_value(streams).context("Invalid Streams")?,
            None => Vec::new(),
        };

        let (settings, ignored) = match document.remove("Settings") {
            Some(Value::Object(settings)) => {
                let ignored: Vec<String> = document.keys().cloned().collect();
                let (settings, mut unknown) = Self::split_settings(settings);
                unknown.extend(ignored);
                (settings, unknown)
            }
            Some(other) => anyhow::bail!("Settings must be an object, got {}", other),
            None => Self::split_settings(document),
        };

        for key in &ignored {
            tracing::warn!("Ignoring unsupported config key '{}'", key);
        }

        let settings =
            serde_json::from_value(Value::Object(settings)).context("Invalid Settings")?;
        Ok(Self { settings, streams })
    }

    fn split_settings(object: Map<String, Value>) -> (Map<String, Value>, Vec<String>) {
        let mut settings = Map::new();
        let mut ignored = Vec::new();
        for (key, value) in object {
            if SETTINGS_KEYS.contains(&key.as_str()) {
                settings.insert(key, value);
            } else {
                ignored.push(key);
            }
        }
        (settings, ignored)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.settings
            .validate()
            .context("Invalid output settings")?;
        for stream in &self.streams {
            stream
                .validate()
                .with_context(|| format!("Invalid stream '{}'", stream.name))?;
        }
        Ok(())
    }
}
