mod active_source_selector;
mod client_registration;

pub use active_source_selector::{ActiveSourceSelector, SourceRequest};
pub use client_registration::ClientRegistration;
