use crate::domain::value_objects::{OutputFormat, OutputSettings, PipelineParameters, SourceLocator};

/// Name of the multi-descriptor sink inside every built pipeline
pub const SINK_NAME: &str = "sink";

/// dvbsrc pid filter meaning "the whole transport stream"
const ALL_PIDS: &str = "8192";

pub struct PipelineBuilder;

impl PipelineBuilder {
    /// Convert pipeline parameters to a GStreamer launch string.
    ///
    /// The source element exposes its pads dynamically; each branch starts
    /// with an element that only accepts video or only audio, so delayed
    /// linking routes every new pad by its caps.
    pub fn build_launch_string(parameters: &PipelineParameters) -> String {
        let output = parameters.output();
        let (source, video_head, audio_head) =
            Self::source_for_locator(parameters.locator(), output);
        let (video_encoder, audio_encoder, muxer) = Self::encoders_for_format(output);

        format!(
            "{source} \
             {video_head} ! deinterlace method=2 ! videoconvert ! videoscale method=1 ! videorate ! \
             video/x-raw,format=I420,width={width},height={height},framerate=30000/1001 ! \
             {video_encoder} ! queue2 ! mux. \
             {audio_head} ! audioconvert ! audioresample ! audio/x-raw,channels=2 ! \
             {audio_encoder} ! queue2 ! mux. \
             {muxer} name=mux ! queue2 ! \
             multifdsink name={sink} qos=true sync=true max-lateness=10000000 \
             recover-policy=keyframe sync-method=latest-keyframe",
            width = output.video_width,
            height = output.video_height,
            sink = SINK_NAME,
        )
    }

    fn source_for_locator(
        locator: &SourceLocator,
        output: &OutputSettings,
    ) -> (String, &'static str, &'static str) {
        match locator {
            SourceLocator::Dvb { frequency, pids } => (
                format!(
                    "dvbsrc frequency={} pids={} ! tsdemux name=demux",
                    frequency,
                    pids.as_deref().unwrap_or(ALL_PIDS)
                ),
                "demux. ! mpegvideoparse ! queue2 ! mpeg2dec",
                "demux. ! ac3parse ! queue2 ! a52dec",
            ),
            SourceLocator::Uri { url } => (
                format!(
                    "uridecodebin uri=\"{}\" buffer-duration={} name=src",
                    url,
                    u64::from(output.capture_cache_ms) * 1_000_000
                ),
                "src. ! videoconvert ! queue2",
                "src. ! audioconvert ! queue2",
            ),
        }
    }

    fn encoders_for_format(output: &OutputSettings) -> (String, String, &'static str) {
        let video_bps = u64::from(output.video_bitrate_kbps) * 1000;
        let audio_bps = u64::from(output.audio_bitrate_kbps) * 1000;

        match output.format {
            OutputFormat::WebM => (
                format!(
                    "vp8enc threads=4 deadline=1 cpu-used=5 token-partitions=2 \
                     target-bitrate={} auto-alt-ref=true arnr-maxframes=7 arnr-strength=5",
                    video_bps
                ),
                format!("vorbisenc bitrate={}", audio_bps),
                "webmmux streamable=true",
            ),
            OutputFormat::Ogg => (
                format!("theoraenc bitrate={}", output.video_bitrate_kbps),
                format!("vorbisenc bitrate={}", audio_bps),
                "oggmux",
            ),
            OutputFormat::MpegTs => (
                format!(
                    "x264enc tune=zerolatency speed-preset=veryfast bitrate={}",
                    output.video_bitrate_kbps
                ),
                format!(
                    "lamemp3enc target=bitrate bitrate={} ! mpegaudioparse",
                    output.audio_bitrate_kbps
                ),
                "mpegtsmux",
            ),
        }
    }
}
