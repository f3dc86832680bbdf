use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use pipeline_live_switch::{
    serve_control_api, serve_metrics, serve_stream, ClientFanout, Config, GStreamerPipelineFactory,
    MetricsReporter, PipelineSupervisor, PrometheusReporter, ServiceConfig, SourceController,
    StreamListener,
};

/// Pending commands before HTTP handlers start waiting for a slot
const CONTROLLER_QUEUE_DEPTH: usize = 32;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration
    let config = Config::parse();
    config.validate()?;

    // Initialize logging
    let filter = if config.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let service_config = ServiceConfig::load(&config.config)?;

    // Initialize GStreamer (infrastructure concern)
    gstreamer::init()?;

    // Initialize metrics
    PrometheusReporter::init_metrics()?;

    info!("Starting live source switcher");
    info!("  Sources file: {}", config.config.display());
    info!("  Streams configured: {}", service_config.streams.len());
    info!("  Output format: {}", service_config.settings.format.as_str());
    info!("  Control API: {}", config.web_addr());
    info!("  Live stream: {}{}", config.stream_addr(), config.stream_mount);
    info!("  Metrics: {}", config.metrics_addr());

    // Create infrastructure implementations (dependency injection)
    let metrics_reporter: Arc<dyn MetricsReporter> = Arc::new(PrometheusReporter::new());
    let (sink_events, sink_event_rx) = mpsc::unbounded_channel();
    let factory = Arc::new(GStreamerPipelineFactory::new(sink_events.clone()));

    // Create application services
    let supervisor = PipelineSupervisor::new(factory, sink_events, metrics_reporter.clone());
    let fanout = Arc::new(ClientFanout::new(
        supervisor.subscribe(),
        metrics_reporter.clone(),
    ));
    let sink_event_task = tokio::spawn(fanout.clone().run_sink_events(sink_event_rx));

    let controller = SourceController::new(
        service_config.streams,
        service_config.settings,
        supervisor,
        metrics_reporter.clone(),
    );
    let (controller, controller_task) = controller.spawn(CONTROLLER_QUEUE_DEPTH);

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_signal = move || {
        let mut rx = shutdown_rx.clone();
        async move {
            let _ = rx.wait_for(|stopping| *stopping).await;
        }
    };

    let stream_listener = Arc::new(StreamListener::new(
        fanout,
        config.stream_mount.clone(),
        metrics_reporter,
    ));
    let stream_addr = config.stream_addr();
    let stream_server = tokio::spawn(async move {
        if let Err(e) = serve_stream(stream_addr, stream_listener).await {
            error!("Live stream listener failed: {}", e);
        }
    });

    let control_server = tokio::spawn(serve_control_api(
        config.web_addr(),
        controller.clone(),
        shutdown_signal(),
    ));
    let metrics_server = tokio::spawn(serve_metrics(
        config.metrics_addr(),
        controller.clone(),
        shutdown_signal(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    // Stop accepting viewers before tearing the pipeline down
    stream_server.abort();

    if let Err(e) = controller.shutdown().await {
        error!("Controller shutdown failed: {}", e);
    }
    controller_task.await?;

    for (name, server) in [("Control API", control_server), ("Metrics server", metrics_server)] {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("{} failed: {}", name, e),
            Err(e) => error!("{} task failed: {}", name, e),
        }
    }

    sink_event_task.abort();

    info!("Live source switcher shutdown complete");
    Ok(())
}
