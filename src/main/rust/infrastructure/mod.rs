pub mod gstreamer;
pub mod http;
pub mod metrics;
