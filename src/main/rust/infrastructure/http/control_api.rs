use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::application::services::ControllerHandle;
use crate::domain::errors::DomainError;
use crate::domain::value_objects::{SettingsUpdate, SourceConfig};

const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ActiveResponse {
    active: Option<SourceConfig>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Source and settings API. Every edit goes through the controller queue
/// and is answered once the resulting pipeline transition has settled.
pub fn control_routes(
    controller: ControllerHandle,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let with_controller = warp::any().map(move || controller.clone());

    let list_sources = warp::path!("streams")
        .and(warp::get())
        .and(with_controller.clone())
        .and_then(list_sources);

    let get_source = warp::path!("streams" / String)
        .and(warp::get())
        .and(with_controller.clone())
        .and_then(get_source);

    let update_source = warp::path!("streams")
        .and(warp::post())
        .and(json_body::<SourceConfig>())
        .and(with_controller.clone())
        .and_then(update_source);

    let update_named_source = warp::path!("streams" / String)
        .and(warp::post())
        .and(json_body::<SourceConfig>())
        .and(with_controller.clone())
        .and_then(update_named_source);

    let get_settings = warp::path!("settings")
        .and(warp::get())
        .and(with_controller.clone())
        .and_then(get_settings);

    let update_settings = warp::path!("settings")
        .and(warp::post())
        .and(json_body::<SettingsUpdate>())
        .and(with_controller)
        .and_then(update_settings);

    let health = warp::path!("health").and(warp::get()).map(|| {
        warp::reply::json(&HealthResponse {
            status: "healthy",
            service: "pipeline-live-switch",
            version: env!("CARGO_PKG_VERSION"),
        })
    });

    list_sources
        .or(get_source)
        .or(update_source)
        .or(update_named_source)
        .or(get_settings)
        .or(update_settings)
        .or(health)
}

pub async fn serve_control_api(
    addr: SocketAddr,
    controller: ControllerHandle,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), warp::Error> {
    // CORS configuration for browser access
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let routes = control_routes(controller).with(cors);
    let (addr, server) = warp::serve(routes).try_bind_with_graceful_shutdown(addr, shutdown)?;

    tracing::info!("Control API listening on http://{}", addr);
    server.await;
    Ok(())
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

async fn list_sources(controller: ControllerHandle) -> Result<Response, Infallible> {
    Ok(match controller.list_sources().await {
        Ok(sources) => warp::reply::json(&sources).into_response(),
        Err(e) => error_reply(e),
    })
}

async fn get_source(segment: String, controller: ControllerHandle) -> Result<Response, Infallible> {
    let name = match decode_name(&segment) {
        Ok(name) => name,
        Err(response) => return Ok(response),
    };
    Ok(match controller.get_source(name.clone()).await {
        Ok(Some(source)) => warp::reply::json(&source).into_response(),
        Ok(None) => reply_error(StatusCode::NOT_FOUND, format!("unknown stream: {}", name)),
        Err(e) => error_reply(e),
    })
}

async fn update_source(
    source: SourceConfig,
    controller: ControllerHandle,
) -> Result<Response, Infallible> {
    tracing::info!(name = %source.name, active = source.active, "POST /streams");
    Ok(match controller.update_source(source).await {
        Ok(active) => warp::reply::json(&ActiveResponse { active }).into_response(),
        Err(e) => error_reply(e),
    })
}

async fn update_named_source(
    segment: String,
    mut source: SourceConfig,
    controller: ControllerHandle,
) -> Result<Response, Infallible> {
    source.name = match decode_name(&segment) {
        Ok(name) => name,
        Err(response) => return Ok(response),
    };
    update_source(source, controller).await
}

async fn get_settings(controller: ControllerHandle) -> Result<Response, Infallible> {
    Ok(match controller.settings().await {
        Ok(settings) => warp::reply::json(&settings).into_response(),
        Err(e) => error_reply(e),
    })
}

async fn update_settings(
    update: SettingsUpdate,
    controller: ControllerHandle,
) -> Result<Response, Infallible> {
    tracing::info!(?update, "POST /settings");
    Ok(match controller.update_settings(update).await {
        Ok(settings) => warp::reply::json(&settings).into_response(),
        Err(e) => error_reply(e),
    })
}

/// Path parameters arrive percent-encoded; source names may contain spaces
fn decode_name(segment: &str) -> Result<String, Response> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|name| name.into_owned())
        .map_err(|_| {
            reply_error(
                StatusCode::BAD_REQUEST,
                format!("stream name is not valid UTF-8: {}", segment),
            )
        })
}

fn error_reply(error: DomainError) -> Response {
    let status = match &error {
        DomainError::InvalidSource(_) | DomainError::InvalidSettings(_) => StatusCode::BAD_REQUEST,
        DomainError::ControllerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!("Request failed: {}", error);
    reply_error(status, error.to_string())
}

fn reply_error(status: StatusCode, message: String) -> Response {
    warp::reply::with_status(warp::reply::json(&ErrorResponse { error: message }), status)
        .into_response()
}
