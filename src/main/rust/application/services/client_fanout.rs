use std::collections::HashMap;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use super::CurrentPipeline;
use crate::domain::entities::ClientRegistration;
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{DetachedConnection, MediaPipeline, MetricsReporter, SinkEvent};
use crate::domain::value_objects::PipelineId;

/// Hands viewer connections to the running pipeline's sink and frees them
/// again when the sink lets go.
///
/// The registration table is the only owner of duplicated descriptors;
/// every close goes through it, so a descriptor is closed exactly once.
pub struct ClientFanout {
    current: CurrentPipeline,
    registrations: Mutex<HashMap<RawFd, ClientRegistration>>,
    metrics: Arc<dyn MetricsReporter>,
}

impl ClientFanout {
    pub fn new(current: CurrentPipeline, metrics: Arc<dyn MetricsReporter>) -> Self {
        Self {
            current,
            registrations: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Snapshot of the running pipeline; may be stale by the time it is used
    pub fn current_pipeline(&self) -> Option<Arc<dyn MediaPipeline>> {
        self.current.borrow().clone()
    }

    pub fn client_count(&self) -> usize {
        self.table().len()
    }

    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.table().contains_key(&fd)
    }

    /// Duplicates the connection, writes the preamble, releases the original
    /// handle and registers the duplicate with `pipeline`. On error nothing
    /// is left registered and the duplicate is closed.
    pub fn attach(
        &self,
        mut connection: Box<dyn DetachedConnection>,
        pipeline: Arc<dyn MediaPipeline>,
    ) -> Result<RawFd> {
        let descriptor = connection
            .duplicate()
            .map_err(|e| DomainError::DuplicationFailed(e.to_string()))?;
        let fd = descriptor.as_raw_fd();

        let preamble = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\n\r\n",
            pipeline.content_type()
        );
        connection
            .write_preamble(preamble.as_bytes())
            .map_err(|e| DomainError::ConnectionTakeoverFailed(e.to_string()))?;

        // From here on the duplicate is the only handle on the transport
        let peer = connection.peer();
        drop(connection);

        let pipeline_id = pipeline.id();
        let registration = ClientRegistration::new(descriptor, pipeline_id, peer.clone());

        // Held across add_client so a concurrent release of this pipeline
        // cannot run between registration and bookkeeping.
        let mut table = self.table();
        if table.contains_key(&fd) {
            return Err(DomainError::DescriptorInUse(fd));
        }
        table.insert(fd, registration);

        if let Err(e) = pipeline.add_client(fd) {
            if let Some(registration) = table.remove(&fd) {
                registration.close();
            }
            return Err(DomainError::RegistrationFailed(e.to_string()));
        }
        drop(table);

        self.metrics.report_client_connected();
        tracing::info!(fd, pipeline_id = %pipeline_id, peer = %peer, "Client registered");
        Ok(fd)
    }

    /// Frees `fd` if it is still registered under `pipeline_id`.
    ///
    /// Notifications for another pipeline are ignored: the number may
    /// already belong to a newer viewer.
    pub fn release(&self, pipeline_id: PipelineId, fd: RawFd) -> bool {
        let registration = {
            let mut table = self.table();
            match table.get(&fd) {
                Some(existing) if existing.pipeline_id() == pipeline_id => table.remove(&fd),
                Some(existing) => {
                    tracing::debug!(
                        fd,
                        pipeline_id = %pipeline_id,
                        owner = %existing.pipeline_id(),
                        "Ignoring removal for descriptor owned by another pipeline"
                    );
                    None
                }
                None => {
                    tracing::debug!(fd, pipeline_id = %pipeline_id, "Removal for unknown descriptor");
                    None
                }
            }
        };

        match registration {
            Some(registration) => {
                let peer = registration.peer().to_string();
                let connected_for = registration.close();
                self.metrics.report_client_disconnected();
                tracing::info!(
                    fd,
                    pipeline_id = %pipeline_id,
                    peer = %peer,
                    "Client disconnected after {:?}",
                    connected_for
                );
                true
            }
            None => false,
        }
    }

    /// Frees every descriptor still registered with a stopped pipeline
    pub fn release_pipeline(&self, pipeline_id: PipelineId) -> usize {
        let orphaned: Vec<ClientRegistration> = {
            let mut table = self.table();
            let fds: Vec<RawFd> = table
                .iter()
                .filter(|(_, r)| r.pipeline_id() == pipeline_id)
                .map(|(fd, _)| *fd)
                .collect();
            fds.into_iter().filter_map(|fd| table.remove(&fd)).collect()
        };

        let released = orphaned.len();
        for registration in orphaned {
            tracing::info!(
                fd = registration.fd(),
                pipeline_id = %pipeline_id,
                peer = %registration.peer(),
                "Client released with stopped pipeline"
            );
            registration.close();
            self.metrics.report_client_disconnected();
        }
        released
    }

    pub fn handle_event(&self, event: SinkEvent) {
        match event {
            SinkEvent::ClientRemoved { pipeline_id, fd } => {
                self.release(pipeline_id, fd);
            }
            SinkEvent::PipelineStopped { pipeline_id } => {
                let released = self.release_pipeline(pipeline_id);
                if released > 0 {
                    tracing::info!(pipeline_id = %pipeline_id, released, "Released orphaned clients");
                }
            }
        }
    }

    /// Drains sink events until every sender is gone
    pub async fn run_sink_events(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<SinkEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        tracing::debug!("Sink event channel closed");
    }

    fn table(&self) -> MutexGuard<'_, HashMap<RawFd, ClientRegistration>> {
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
