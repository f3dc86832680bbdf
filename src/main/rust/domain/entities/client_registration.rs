use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

use crate::domain::value_objects::PipelineId;

/// A viewer whose duplicated descriptor is owned by one pipeline's sink
pub struct ClientRegistration {
    descriptor: OwnedFd,
    pipeline_id: PipelineId,
    peer: String,
    registered_at: Instant,
}

impl ClientRegistration {
    pub fn new(descriptor: OwnedFd, pipeline_id: PipelineId, peer: impl Into<String>) -> Self {
        Self {
            descriptor,
            pipeline_id,
            peer: peer.into(),
            registered_at: Instant::now(),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.descriptor.as_raw_fd()
    }

    pub fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn connected_for(&self) -> Duration {
        self.registered_at.elapsed()
    }

    /// Closes the descriptor and returns how long the viewer was attached
    pub fn close(self) -> Duration {
        let connected_for = self.connected_for();
        drop(self.descriptor);
        connected_for
    }
}

impl std::fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistration")
            .field("fd", &self.fd())
            .field("pipeline_id", &self.pipeline_id)
            .field("peer", &self.peer)
            .finish()
    }
}
