mod connection;
mod control_api;
mod stream_listener;

pub use connection::detach;
pub use control_api::{control_routes, serve_control_api};
pub use stream_listener::{serve_stream, StreamListener};
