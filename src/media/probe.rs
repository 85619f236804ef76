use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::media::tool::stderr_detail;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Data,
    Other,
}

impl StreamKind {
    fn from_codec_type(codec_type: &str) -> Self {
        match codec_type {
            "video" => Self::Video,
            "audio" => Self::Audio,
            "subtitle" => Self::Subtitle,
            "data" => Self::Data,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Subtitle => write!(f, "subtitle"),
            Self::Data => write!(f, "data"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Informational per-stream fields. Only the duration on [`MediaMetadata`] is
/// required by the render core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
}

/// Result of probing one file. Read-only once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub path: PathBuf,
    /// Always finite and > 0.
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u64>,
    /// First stream of each kind, in file order.
    pub streams: BTreeMap<StreamKind, StreamInfo>,
}

impl MediaMetadata {
    pub fn stream(&self, kind: StreamKind) -> Option<&StreamInfo> {
        self.streams.get(&kind)
    }
}

/// Metadata source for input files. Results are never cached; every call
/// inspects the file again.
pub trait MediaProbe: Send + Sync {
    /// Probe `path`, failing unless it has a positive duration and at least
    /// one stream of the `expected` kind.
    fn probe(&self, path: &Path, expected: StreamKind) -> Result<MediaMetadata, RenderError>;
}

/// [`MediaProbe`] backed by the ffprobe binary.
#[derive(Debug, Clone)]
pub struct Ffprobe {
    binary: PathBuf,
}

impl Ffprobe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl MediaProbe for Ffprobe {
    fn probe(&self, path: &Path, expected: StreamKind) -> Result<MediaMetadata, RenderError> {
        let output = Command::new(&self.binary)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                RenderError::probe(path, format!("failed to start {}: {}", self.binary.display(), e))
            })?;

        if !output.status.success() {
            return Err(RenderError::probe(path, stderr_detail(&output.stderr)));
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(path, &raw, expected)
    }
}

// --- ffprobe JSON ---

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    format_name: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

/// "30000/1001" -> 29.97; "0/0" and garbage -> None.
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let (num, den) = raw.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

pub(crate) fn parse_probe_output(
    path: &Path,
    raw: &str,
    expected: StreamKind,
) -> Result<MediaMetadata, RenderError> {
    let parsed: ProbeOutput = serde_json::from_str(raw)
        .map_err(|e| RenderError::probe(path, format!("unreadable ffprobe output: {}", e)))?;

    let format = parsed
        .format
        .ok_or_else(|| RenderError::probe(path, "no format section in ffprobe output"))?;

    let duration_raw = format
        .duration
        .as_deref()
        .ok_or_else(|| RenderError::probe(path, "duration is missing"))?;
    let duration_seconds: f64 = duration_raw
        .trim()
        .parse()
        .map_err(|_| RenderError::probe(path, format!("duration is not numeric: {}", duration_raw)))?;
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Err(RenderError::probe(
            path,
            format!("duration must be positive, got {}", duration_seconds),
        ));
    }

    let mut streams = BTreeMap::new();
    for stream in parsed.streams {
        let kind = StreamKind::from_codec_type(stream.codec_type.as_deref().unwrap_or(""));
        streams.entry(kind).or_insert_with(|| StreamInfo {
            codec: stream.codec_name,
            sample_rate: stream.sample_rate.and_then(|s| s.parse().ok()),
            channels: stream.channels,
            width: stream.width,
            height: stream.height,
            frame_rate: stream.r_frame_rate.as_deref().and_then(parse_frame_rate),
        });
    }

    if !streams.contains_key(&expected) {
        return Err(RenderError::probe(
            path,
            format!("no {} stream found", expected),
        ));
    }

    Ok(MediaMetadata {
        path: path.to_path_buf(),
        duration_seconds,
        format_name: format.format_name,
        bit_rate: format.bit_rate.and_then(|b| b.parse().ok()),
        streams,
    })
}
