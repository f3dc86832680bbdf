use std::io::{self, Write as _};
use std::os::fd::{AsFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use pipeline_live_switch::{
    control_routes, ActiveSourceSelector, ClientFanout, ControllerHandle, DetachedConnection,
    DomainError,
    GStreamerPipeline, MediaPipeline, MetricsReporter, OutputSettings, PipelineBuilder,
    PipelineFactory, PipelineId, PipelineParameters, PipelineState, PipelineSupervisor, Result,
    ServiceConfig, SettingsUpdate, SinkEvent, SourceConfig, SourceController, SourceLocator,
    SourceRequest, StreamListener,
};

#[derive(Default)]
struct Journal {
    calls: Mutex<Vec<String>>,
}

impl Journal {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

struct FakePipeline {
    id: PipelineId,
    parameters: PipelineParameters,
    journal: Arc<Journal>,
}

impl MediaPipeline for FakePipeline {
    fn id(&self) -> PipelineId {
        self.id
    }

    fn parameters(&self) -> &PipelineParameters {
        &self.parameters
    }

    fn start(&self) -> Result<()> {
        self.journal
            .record(format!("start:{}", self.parameters.locator()));
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.journal
            .record(format!("stop:{}", self.parameters.locator()));
        Ok(())
    }

    fn add_client(&self, _fd: RawFd) -> Result<()> {
        Ok(())
    }
}

/// Records every start and stop by source locator
struct RecordingFactory {
    journal: Arc<Journal>,
}

impl PipelineFactory for RecordingFactory {
    fn create(
        &self,
        id: PipelineId,
        parameters: PipelineParameters,
    ) -> Result<Arc<dyn MediaPipeline>> {
        Ok(Arc::new(FakePipeline {
            id,
            parameters,
            journal: self.journal.clone(),
        }))
    }
}

struct NullMetrics;

impl MetricsReporter for NullMetrics {
    fn report_pipeline_state(&self, _state: &PipelineState) {}
    fn report_pipeline_started(&self) {}
    fn report_pipeline_start_failed(&self) {}
    fn report_pipeline_stopped(&self) {}
    fn report_source_request(&self) {}
    fn report_client_connected(&self) {}
    fn report_client_disconnected(&self) {}
    fn report_client_rejected(&self) {}
}

fn dvb(name: &str, frequency: u32) -> SourceConfig {
    SourceConfig::new(
        name,
        SourceLocator::Dvb {
            frequency,
            pids: None,
        },
    )
}

fn controller(sources: Vec<SourceConfig>) -> (SourceController, Arc<Journal>) {
    let journal = Arc::new(Journal::default());
    let (events, _rx) = mpsc::unbounded_channel();
    let supervisor = PipelineSupervisor::new(
        Arc::new(RecordingFactory {
            journal: journal.clone(),
        }),
        events,
        Arc::new(NullMetrics),
    );
    let controller = SourceController::new(
        sources,
        OutputSettings::default(),
        supervisor,
        Arc::new(NullMetrics),
    );
    (controller, journal)
}

fn spawn_controller(sources: Vec<SourceConfig>) -> (ControllerHandle, Arc<Journal>) {
    let (controller, journal) = controller(sources);
    let (handle, _task) = controller.spawn(8);
    (handle, journal)
}

#[test]
fn test_switching_between_sources() {
    let (mut controller, journal) = controller(vec![dvb("A", 100), dvb("B", 200)]);
    controller.recompute();
    assert!(journal.calls().is_empty());

    let active = controller
        .update_source(dvb("A", 100).with_active(true))
        .unwrap();
    assert_eq!(active.map(|s| s.name), Some("A".to_string()));
    assert_eq!(journal.calls(), vec!["start:dvb:100"]);

    journal.clear();
    controller
        .update_source(dvb("B", 200).with_active(true))
        .unwrap();
    assert_eq!(journal.calls(), vec!["stop:dvb:100", "start:dvb:200"]);
    assert!(!controller.sources()[0].active);
    assert!(controller.sources()[1].active);

    journal.clear();
    controller
        .update_source(dvb("A", 100).with_active(true))
        .unwrap();
    assert_eq!(journal.calls(), vec!["stop:dvb:200", "start:dvb:100"]);

    // Same source, new display name: metadata only
    journal.clear();
    controller
        .update_source(
            dvb("A", 100)
                .with_active(true)
                .with_display_name("Channel A"),
        )
        .unwrap();
    assert!(journal.calls().is_empty());
    assert_eq!(
        controller.sources()[0].display_name.as_deref(),
        Some("Channel A")
    );
}

#[test]
fn test_resubmitting_active_source_is_a_noop() {
    let (mut controller, journal) = controller(vec![dvb("A", 100)]);
    controller
        .update_source(dvb("A", 100).with_active(true))
        .unwrap();
    controller
        .update_source(dvb("A", 100).with_active(true))
        .unwrap();
    controller.recompute();

    assert_eq!(journal.calls(), vec!["start:dvb:100"]);
}

#[test]
fn test_settings_change_restarts_once() {
    let (mut controller, journal) = controller(vec![dvb("A", 100).with_active(true)]);
    controller.recompute();
    journal.clear();

    let settings = controller
        .update_settings(SettingsUpdate {
            video_bitrate_kbps: Some(2000),
            ..SettingsUpdate::default()
        })
        .unwrap();

    assert_eq!(settings.video_bitrate_kbps, 2000);
    assert_eq!(journal.calls(), vec!["stop:dvb:100", "start:dvb:100"]);
}

#[test]
fn test_unchanged_settings_do_not_restart() {
    let (mut controller, journal) = controller(vec![dvb("A", 100).with_active(true)]);
    controller.recompute();
    journal.clear();

    let bitrate = controller.settings().video_bitrate_kbps;
    controller
        .update_settings(SettingsUpdate {
            video_bitrate_kbps: Some(bitrate),
            ..SettingsUpdate::default()
        })
        .unwrap();

    assert!(journal.calls().is_empty());
}

#[test]
fn test_invalid_settings_change_nothing() {
    let (mut controller, journal) = controller(vec![dvb("A", 100).with_active(true)]);
    controller.recompute();
    journal.clear();

    let result = controller.update_settings(SettingsUpdate {
        video_width: Some(0),
        ..SettingsUpdate::default()
    });

    assert!(matches!(result, Err(DomainError::InvalidSettings(_))));
    assert_eq!(controller.settings(), &OutputSettings::default());
    assert!(journal.calls().is_empty());
}

#[test]
fn test_deactivating_stops_without_restart() {
    let (mut controller, journal) = controller(vec![dvb("A", 100).with_active(true)]);
    controller.recompute();
    journal.clear();

    let active = controller.update_source(dvb("A", 100)).unwrap();
    controller.recompute();

    assert!(active.is_none());
    assert_eq!(journal.calls(), vec!["stop:dvb:100"]);
    assert_eq!(controller.pipeline_state(), PipelineState::Idle);
}

#[test]
fn test_invalid_source_is_rejected() {
    let (mut controller, journal) = controller(vec![dvb("A", 100)]);
    let bad = SourceConfig::new(
        "A",
        SourceLocator::Uri {
            url: "nowhere".to_string(),
        },
    )
    .with_active(true);

    assert!(matches!(
        controller.update_source(bad),
        Err(DomainError::InvalidSource(_))
    ));
    assert!(journal.calls().is_empty());
}

#[tokio::test]
async fn test_controller_handle_serializes_requests() {
    let (handle, journal) = spawn_controller(vec![dvb("A", 100), dvb("B", 200)]);

    let first = handle.clone();
    let second = handle.clone();
    let (a, b) = tokio::join!(
        first.update_source(dvb("A", 100).with_active(true)),
        second.update_source(dvb("B", 200).with_active(true)),
    );
    assert!(a.is_ok());
    assert!(b.is_ok());

    let active: Vec<_> = handle
        .list_sources()
        .await
        .unwrap()
        .into_iter()
        .filter(|s| s.active)
        .collect();
    assert_eq!(active.len(), 1);

    // Whatever order the two edits landed in, starts and stops alternate
    let calls = journal.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[0].starts_with("start:"));
    assert!(calls[1].starts_with("stop:"));
    assert!(calls[2].starts_with("start:"));

    handle.shutdown().await.unwrap();
    assert!(journal.calls().last().unwrap().starts_with("stop:"));
    assert!(matches!(
        handle.settings().await,
        Err(DomainError::ControllerUnavailable)
    ));
}

proptest! {
    #[test]
    fn prop_at_most_one_source_active(
        requests in proptest::collection::vec((0usize..4, any::<bool>(), any::<bool>()), 1..40)
    ) {
        let sources: Vec<_> = (0..4u32).map(|i| dvb(&format!("s{}", i), 100 + i)).collect();
        let mut selector = ActiveSourceSelector::new(sources.clone());

        for (index, active, recompute) in requests {
            let request = if recompute {
                SourceRequest::Recompute
            } else {
                SourceRequest::Set(sources[index].clone().with_active(active))
            };
            let resolved = selector.apply(&request);

            let active_count = selector.sources().iter().filter(|s| s.active).count();
            prop_assert!(active_count <= 1);
            prop_assert_eq!(resolved.as_ref(), selector.active());
        }
    }
}

/// Viewer backed by one end of a socket pair
struct SocketPairViewer(UnixStream);

impl DetachedConnection for SocketPairViewer {
    fn duplicate(&self) -> io::Result<OwnedFd> {
        self.0.as_fd().try_clone_to_owned()
    }

    fn write_preamble(&mut self, preamble: &[u8]) -> io::Result<()> {
        self.0.write_all(preamble)
    }

    fn peer(&self) -> String {
        "socketpair".to_string()
    }
}

/// Pipeline that accepts every descriptor; removal is driven by the test
struct AcceptingPipeline {
    parameters: PipelineParameters,
}

impl MediaPipeline for AcceptingPipeline {
    fn id(&self) -> PipelineId {
        PipelineId(1)
    }

    fn parameters(&self) -> &PipelineParameters {
        &self.parameters
    }

    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn add_client(&self, _fd: RawFd) -> Result<()> {
        Ok(())
    }
}

fn accepting_pipeline() -> Arc<dyn MediaPipeline> {
    Arc::new(AcceptingPipeline {
        parameters: PipelineParameters::new(&dvb("A", 100), &OutputSettings::default()),
    })
}

#[test]
fn test_concurrent_register_and_remove_converge() {
    let (_, current) = watch::channel(None);
    let fanout = Arc::new(ClientFanout::new(current, Arc::new(NullMetrics)));
    let pipeline = accepting_pipeline();

    let workers: Vec<_> = (0..16)
        .map(|_| {
            let fanout = fanout.clone();
            let pipeline = pipeline.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    let (local, _remote) = UnixStream::pair().unwrap();
                    let fd = fanout
                        .attach(Box::new(SocketPairViewer(local)), pipeline.clone())
                        .unwrap();
                    fanout.handle_event(SinkEvent::ClientRemoved {
                        pipeline_id: PipelineId(1),
                        fd,
                    });
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(fanout.client_count(), 0);
}

async fn start_stream_listener(
    pipeline: Option<Arc<dyn MediaPipeline>>,
) -> (std::net::SocketAddr, Arc<ClientFanout>, watch::Sender<Option<Arc<dyn MediaPipeline>>>) {
    let (publisher, current) = watch::channel(pipeline);
    let fanout = Arc::new(ClientFanout::new(current, Arc::new(NullMetrics)));
    let listener = Arc::new(StreamListener::new(
        fanout.clone(),
        "/live",
        Arc::new(NullMetrics),
    ));

    let tcp = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    tokio::spawn(listener.run(tcp));
    (addr, fanout, publisher)
}

async fn request(addr: std::net::SocketAddr, head: &str) -> tokio::net::TcpStream {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(head.as_bytes()).await.unwrap();
    stream
}

#[tokio::test]
async fn test_stream_without_active_source_is_not_found() {
    let (addr, fanout, _publisher) = start_stream_listener(None).await;

    let mut stream = request(addr, "GET /live HTTP/1.1\r\nHost: test\r\n\r\n").await;
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 404 Not Found"));
    assert_eq!(fanout.client_count(), 0);
}

#[tokio::test]
async fn test_stream_rejects_other_paths_and_methods() {
    let (addr, fanout, _publisher) = start_stream_listener(Some(accepting_pipeline())).await;

    let mut stream = request(addr, "GET /other HTTP/1.1\r\n\r\n").await;
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 404 Not Found"));

    let mut stream = request(addr, "POST /live HTTP/1.1\r\n\r\n").await;
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed"));

    let mut stream = request(addr, "garbage\r\n\r\n").await;
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));

    assert_eq!(fanout.client_count(), 0);
}

#[tokio::test]
async fn test_stream_request_is_handed_to_pipeline() {
    let (addr, fanout, _publisher) = start_stream_listener(Some(accepting_pipeline())).await;

    let mut stream = request(addr, "GET /live?player=1 HTTP/1.1\r\nHost: test\r\n\r\n").await;
    let expected = "HTTP/1.1 200 OK\r\nContent-Type: video/webm\r\n\r\n";
    let mut preamble = vec![0u8; expected.len()];
    stream.read_exact(&mut preamble).await.unwrap();
    assert_eq!(String::from_utf8(preamble).unwrap(), expected);

    tokio::time::timeout(Duration::from_secs(5), async {
        while fanout.client_count() != 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    fanout.handle_event(SinkEvent::PipelineStopped {
        pipeline_id: PipelineId(1),
    });
    assert_eq!(fanout.client_count(), 0);

    // Released descriptor means the viewer sees end of stream
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_control_api_round_trip() {
    let (handle, journal) = spawn_controller(vec![dvb("A", 100), dvb("B", 200)]);
    let routes = control_routes(handle.clone());

    let response = warp::test::request()
        .method("POST")
        .path("/streams/B")
        .json(&serde_json::json!({ "Name": "ignored", "Frequency": 200, "Active": true }))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["Active"]["Name"], "B");
    assert_eq!(journal.calls(), vec!["start:dvb:200"]);

    let response = warp::test::request()
        .method("GET")
        .path("/streams/B")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["Active"], true);

    let response = warp::test::request()
        .method("GET")
        .path("/streams/missing")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 404);

    let response = warp::test::request()
        .method("POST")
        .path("/streams")
        .json(&serde_json::json!({ "Name": "C", "Url": "not-a-url", "Active": true }))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert!(body["error"].as_str().unwrap().contains("Invalid source"));

    let response = warp::test::request()
        .method("POST")
        .path("/settings")
        .json(&serde_json::json!({ "VideoWidth": 320, "VideoHeight": 240 }))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["VideoWidth"], 320);
    assert_eq!(
        journal.calls(),
        vec!["start:dvb:200", "stop:dvb:200", "start:dvb:200"]
    );

    handle.shutdown().await.unwrap();
    let response = warp::test::request()
        .method("GET")
        .path("/streams")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn test_control_api_decodes_stream_names() {
    let (handle, journal) = spawn_controller(vec![dvb("News", 100), dvb("My Channel", 200)]);
    let routes = control_routes(handle.clone());

    let response = warp::test::request()
        .method("GET")
        .path("/streams/My%20Channel")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["Name"], "My Channel");

    let response = warp::test::request()
        .method("POST")
        .path("/streams/My%20Channel")
        .json(&serde_json::json!({ "Name": "ignored", "Frequency": 200, "Active": true }))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["Active"]["Name"], "My Channel");
    assert_eq!(journal.calls(), vec!["start:dvb:200"]);

    let response = warp::test::request()
        .method("GET")
        .path("/streams/bad%FF")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 400);

    handle.shutdown().await.unwrap();
}

#[test]
fn test_load_service_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "Settings": {{ "VideoBitrate": 1500, "Format": "ogg" }},
            "Streams": [
                {{ "Name": "A", "Frequency": 578000000, "Pids": "256:257", "Active": true }},
                {{ "Name": "B", "Url": "http://example.com/feed.ts", "Active": true }}
            ]
        }}"#
    )
    .unwrap();

    let config = ServiceConfig::load(file.path()).unwrap();
    assert_eq!(config.settings.video_bitrate_kbps, 1500);
    assert_eq!(config.settings.video_width, 640);
    assert_eq!(config.streams.len(), 2);

    // Several active entries: the last one wins
    let selector = ActiveSourceSelector::new(config.streams);
    assert_eq!(selector.active().map(|s| s.name.as_str()), Some("B"));
}

#[test]
fn test_load_service_config_rejects_bad_files() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();
    assert!(ServiceConfig::load(file.path()).is_err());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "Settings": {{ "VideoWidth": 5000 }} }}"#).unwrap();
    assert!(ServiceConfig::load(file.path()).is_err());

    assert!(ServiceConfig::load(std::path::Path::new("/nonexistent/config.json")).is_err());
}

#[test]
fn test_gstreamer_parses_uri_pipeline() {
    if gstreamer::init().is_err() {
        return;
    }
    let required = [
        "uridecodebin",
        "videoconvert",
        "audioconvert",
        "audioresample",
        "queue2",
        "deinterlace",
        "videoscale",
        "videorate",
        "vp8enc",
        "vorbisenc",
        "webmmux",
        "multifdsink",
    ];
    if required
        .iter()
        .any(|name| gstreamer::ElementFactory::find(name).is_none())
    {
        eprintln!("Skipping: GStreamer plugins missing");
        return;
    }

    let source = SourceConfig::new(
        "file",
        SourceLocator::Uri {
            url: "file:///dev/null".to_string(),
        },
    );
    let parameters = PipelineParameters::new(&source, &OutputSettings::default());
    assert!(PipelineBuilder::build_launch_string(&parameters).contains("multifdsink"));

    let (events, _rx) = mpsc::unbounded_channel();
    let pipeline = GStreamerPipeline::new(PipelineId(1), parameters, events).unwrap();
    assert_eq!(pipeline.content_type(), "video/webm");
    assert!(pipeline.stop().is_ok());
    assert!(matches!(
        pipeline.add_client(0),
        Err(DomainError::PipelineStopped(1))
    ));
}
