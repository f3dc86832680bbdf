use std::future::Future;
use std::net::SocketAddr;

use serde::Serialize;
use warp::http::StatusCode;
use warp::{Filter, Reply};

use super::prometheus_reporter::ACTIVE_CLIENTS;
use super::PrometheusReporter;
use crate::application::services::ControllerHandle;

const SERVICE_NAME: &str = "pipeline-live-switch";

#[derive(Serialize)]
struct ProbeResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    active_clients: i64,
}

impl ProbeResponse {
    fn new(status: &'static str) -> Self {
        Self {
            status,
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            active_clients: ACTIVE_CLIENTS.get(),
        }
    }
}

/// Prometheus scrape endpoint plus liveness and readiness probes.
///
/// Readiness follows the source controller: once its queue is closed no
/// edit can be applied, so the service reports itself unready.
pub async fn serve_metrics(
    addr: SocketAddr,
    controller: ControllerHandle,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), warp::Error> {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let metrics = warp::path!("metrics").map(|| {
        warp::reply::with_header(
            PrometheusReporter::gather_metrics(),
            "content-type",
            "text/plain; version=0.0.4; charset=utf-8",
        )
    });

    let health =
        warp::path!("health").map(|| warp::reply::json(&ProbeResponse::new("healthy")));

    let livez = warp::path!("livez").map(|| warp::reply::with_status("OK", StatusCode::OK));

    let readyz = warp::path!("readyz").map(move || {
        if controller.is_running() {
            warp::reply::json(&ProbeResponse::new("ready")).into_response()
        } else {
            warp::reply::with_status(
                warp::reply::json(&ProbeResponse::new("unavailable")),
                StatusCode::SERVICE_UNAVAILABLE,
            )
            .into_response()
        }
    });

    let routes = warp::get()
        .and(metrics.or(health).or(livez).or(readyz))
        .with(cors);

    let (addr, server) = warp::serve(routes).try_bind_with_graceful_shutdown(addr, shutdown)?;
    tracing::info!("Metrics server listening on http://{}", addr);
    server.await;
    Ok(())
}
