use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{CurrentPipeline, PipelineSupervisor};
use crate::domain::entities::{ActiveSourceSelector, SourceRequest};
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{
    OutputSettings, PipelineParameters, PipelineState, SettingsUpdate, SourceConfig,
};

/// Requests accepted by the controller task
#[derive(Debug)]
pub enum Command {
    UpdateSource {
        source: SourceConfig,
        reply: oneshot::Sender<Result<Option<SourceConfig>>>,
    },
    UpdateSettings {
        update: SettingsUpdate,
        reply: oneshot::Sender<Result<OutputSettings>>,
    },
    ListSources {
        reply: oneshot::Sender<Vec<SourceConfig>>,
    },
    GetSource {
        name: String,
        reply: oneshot::Sender<Option<SourceConfig>>,
    },
    GetSettings {
        reply: oneshot::Sender<OutputSettings>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Single writer for the source list, the output settings and the pipeline.
///
/// Commands are handled one at a time in arrival order, and a command is
/// only answered after its pipeline transition finished.
pub struct SourceController {
    selector: ActiveSourceSelector,
    settings: OutputSettings,
    supervisor: PipelineSupervisor,
    metrics: Arc<dyn MetricsReporter>,
}

impl SourceController {
    pub fn new(
        sources: Vec<SourceConfig>,
        settings: OutputSettings,
        supervisor: PipelineSupervisor,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Self {
        Self {
            selector: ActiveSourceSelector::new(sources),
            settings,
            supervisor,
            metrics,
        }
    }

    pub fn sources(&self) -> &[SourceConfig] {
        self.selector.sources()
    }

    pub fn settings(&self) -> &OutputSettings {
        &self.settings
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.supervisor.state()
    }

    pub fn current_pipeline(&self) -> CurrentPipeline {
        self.supervisor.subscribe()
    }

    /// Applies one source record; a malformed record changes nothing
    pub fn update_source(&mut self, source: SourceConfig) -> Result<Option<SourceConfig>> {
        source.validate()?;
        self.metrics.report_source_request();

        tracing::info!(
            name = %source.name,
            locator = %source.locator,
            active = source.active,
            "Source update"
        );
        let resolved = self.selector.apply(&SourceRequest::Set(source));
        self.drive(resolved.as_ref());
        Ok(resolved)
    }

    /// Applies a settings edit and always recomputes; the supervisor decides
    /// whether anything needs restarting.
    pub fn update_settings(&mut self, update: SettingsUpdate) -> Result<OutputSettings> {
        let settings = self.settings.merged(&update)?;
        self.metrics.report_source_request();

        tracing::info!(?settings, "Settings update");
        self.settings = settings;
        self.recompute();
        Ok(self.settings.clone())
    }

    /// Re-resolves the active source against the current settings
    pub fn recompute(&mut self) -> Option<SourceConfig> {
        let resolved = self.selector.apply(&SourceRequest::Recompute);
        self.drive(resolved.as_ref());
        resolved
    }

    pub fn handle(&mut self, command: Command) -> ControlFlow<()> {
        // A dropped reply receiver only means the caller stopped waiting
        match command {
            Command::UpdateSource { source, reply } => {
                let _ = reply.send(self.update_source(source));
            }
            Command::UpdateSettings { update, reply } => {
                let _ = reply.send(self.update_settings(update));
            }
            Command::ListSources { reply } => {
                let _ = reply.send(self.selector.sources().to_vec());
            }
            Command::GetSource { name, reply } => {
                let _ = reply.send(self.selector.find(&name).cloned());
            }
            Command::GetSettings { reply } => {
                let _ = reply.send(self.settings.clone());
            }
            Command::Shutdown { reply } => {
                self.supervisor.shutdown();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Blocking command loop. Pipeline start/stop block this thread, so run
    /// it via `spawn` rather than on an async worker.
    pub fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        tracing::info!("Source controller running");
        self.recompute();

        while let Some(command) = commands.blocking_recv() {
            if self.handle(command).is_break() {
                break;
            }
        }

        self.supervisor.shutdown();
        tracing::info!("Source controller stopped");
    }

    /// Moves the controller onto a blocking thread and returns its handle
    pub fn spawn(self, queue_depth: usize) -> (ControllerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_depth);
        let task = tokio::task::spawn_blocking(move || self.run(rx));
        (ControllerHandle { commands: tx }, task)
    }

    fn drive(&mut self, resolved: Option<&SourceConfig>) {
        let desired = resolved.map(|source| PipelineParameters::new(source, &self.settings));
        self.supervisor.apply(desired);
    }
}

/// Cheap, cloneable client of the controller task
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
}

impl ControllerHandle {
    /// False once the controller task has ended
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    pub async fn update_source(&self, source: SourceConfig) -> Result<Option<SourceConfig>> {
        self.request(|reply| Command::UpdateSource { source, reply })
            .await?
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<OutputSettings> {
        self.request(|reply| Command::UpdateSettings { update, reply })
            .await?
    }

    pub async fn list_sources(&self) -> Result<Vec<SourceConfig>> {
        self.request(|reply| Command::ListSources { reply }).await
    }

    pub async fn get_source(&self, name: String) -> Result<Option<SourceConfig>> {
        self.request(|reply| Command::GetSource { name, reply }).await
    }

    pub async fn settings(&self) -> Result<OutputSettings> {
        self.request(|reply| Command::GetSettings { reply }).await
    }

    /// Stops the pipeline and ends the controller task
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| DomainError::ControllerUnavailable)?;
        response.await.map_err(|_| DomainError::ControllerUnavailable)
    }
}
