// ffmpeg argument construction for the frame source and the recorder

use std::path::Path;

use crate::config::{CameraProfile, Settings};

/// Demuxer read limits for the analysis stream (microseconds)
const SOURCE_MAX_DELAY_US: u32 = 3_000_000;
const SOURCE_TIMEOUT_US: u32 = 2_000_000;

/// The recorder tolerates a slower start than the analysis stream
const RECORDER_MAX_DELAY_US: u32 = 5_000_000;
const RECORDER_TIMEOUT_US: u32 = 5_000_000;

const REORDER_QUEUE_SIZE: u32 = 4000;

/// What ffmpeg writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FfmpegOutput {
    /// Headerless single-channel 8-bit frames on stdout
    RawGray,
    /// Stream copy into a container file
    StreamCopy(String),
}

#[derive(Debug, Clone)]
pub struct FfmpegCommandBuilder {
    input: String,
    hwaccel: Option<String>,
    rtsp_transport: Option<String>,
    max_delay_us: u32,
    timeout_us: u32,
    video_filter: Option<String>,
    output: FfmpegOutput,
}

impl FfmpegCommandBuilder {
    pub fn new(input: impl Into<String>, output: FfmpegOutput) -> Self {
        Self {
            input: input.into(),
            hwaccel: None,
            rtsp_transport: None,
            max_delay_us: SOURCE_MAX_DELAY_US,
            timeout_us: SOURCE_TIMEOUT_US,
            video_filter: None,
            output,
        }
    }

    /// Empty strings mean no hardware acceleration
    pub fn with_hwaccel(mut self, hwaccel: Option<&str>) -> Self {
        self.hwaccel = hwaccel.filter(|h| !h.is_empty()).map(str::to_string);
        self
    }

    /// Only applied to rtsp:// inputs
    pub fn with_rtsp_transport(mut self, transport: &str) -> Self {
        self.rtsp_transport = Some(transport.to_string());
        self
    }

    pub fn with_read_limits(mut self, max_delay_us: u32, timeout_us: u32) -> Self {
        self.max_delay_us = max_delay_us;
        self.timeout_us = timeout_us;
        self
    }

    pub fn with_video_filter(mut self, filter: impl Into<String>) -> Self {
        self.video_filter = Some(filter.into());
        self
    }

    fn is_network_input(&self) -> bool {
        self.input.to_ascii_lowercase().starts_with("rtsp://")
    }

    pub fn build(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "quiet".into(),
        ];

        if let Some(hwaccel) = &self.hwaccel {
            args.extend(["-hwaccel".into(), hwaccel.clone()]);
        }

        if self.is_network_input() {
            if let Some(transport) = &self.rtsp_transport {
                args.extend(["-rtsp_transport".into(), transport.clone()]);
            }
            args.extend([
                "-reorder_queue_size".into(),
                REORDER_QUEUE_SIZE.to_string(),
                "-max_delay".into(),
                self.max_delay_us.to_string(),
                "-timeout".into(),
                self.timeout_us.to_string(),
            ]);
        }

        args.extend([
            "-avoid_negative_ts".into(),
            "make_zero".into(),
            "-seek2any".into(),
            "1".into(),
            "-fflags".into(),
            "+genpts".into(),
            "-i".into(),
            self.input.clone(),
        ]);

        if let Some(filter) = &self.video_filter {
            args.extend(["-vf".into(), filter.clone()]);
        }

        match &self.output {
            FfmpegOutput::RawGray => {
                args.extend(
                    ["-an", "-f", "rawvideo", "-pix_fmt", "gray", "-"].map(String::from),
                );
            }
            FfmpegOutput::StreamCopy(path) => {
                args.extend(["-c".into(), "copy".into(), path.clone()]);
            }
        }

        args
    }
}

/// libplacebo filter expression for a shader file
pub fn shader_filter(shader: &Path) -> String {
    format!("libplacebo=custom_shader_path={}", shader.display())
}

/// Arguments for the process producing motion-mask frames from the LQ stream
pub fn motion_source_args(settings: &Settings, camera: &CameraProfile, shader: &Path) -> Vec<String> {
    FfmpegCommandBuilder::new(camera.stream_lq.clone(), FfmpegOutput::RawGray)
        .with_hwaccel(settings.hwaccel.as_deref())
        .with_rtsp_transport(&settings.rtsp_transport)
        .with_read_limits(SOURCE_MAX_DELAY_US, SOURCE_TIMEOUT_US)
        .with_video_filter(shader_filter(shader))
        .build()
}

/// Arguments for the process copying the HQ stream into `output`
pub fn recorder_args(settings: &Settings, camera: &CameraProfile, output: &Path) -> Vec<String> {
    FfmpegCommandBuilder::new(
        camera.stream_hq.clone(),
        FfmpegOutput::StreamCopy(output.to_string_lossy().into_owned()),
    )
    .with_hwaccel(settings.hwaccel.as_deref())
    .with_rtsp_transport(&settings.rtsp_transport)
    .with_read_limits(RECORDER_MAX_DELAY_US, RECORDER_TIMEOUT_US)
    .build()
}
