// Encode specification for one job: a still image looped for the voice
// track's duration, muxed with the voice track or a raw two-input mix of
// voice and prepared background music.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::render::background::PreparedTrack;
use crate::render::pairing::JobSpec;

// Product defaults, not tunables.
pub const VIDEO_CODEC: &str = "libx264";
pub const AUDIO_CODEC: &str = "aac";
pub const VIDEO_BITRATE: &str = "2000k";
pub const VOICE_AUDIO_BITRATE: &str = "128k";
/// Extra headroom for the summed voice + background signal.
pub const MIXED_AUDIO_BITRATE: &str = "192k";
pub const FRAME_RATE: u32 = 30;
pub const PIXEL_FORMAT: &str = "yuv420p";
pub const PRESET: &str = "ultrafast";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mixing {
    /// Voice track only.
    None,
    /// Equal-weight sum of voice and background: no ducking, no dropout
    /// transition, no loudness normalization.
    MixTwo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodeSpec {
    pub video_input: PathBuf,
    pub video_duration_seconds: f64,
    /// Voice first, then the optional background track.
    pub audio_inputs: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub video_codec: &'static str,
    pub audio_codec: &'static str,
    pub video_bitrate: &'static str,
    pub audio_bitrate: &'static str,
    pub frame_rate: u32,
    pub pixel_format: &'static str,
    pub preset: &'static str,
    pub mixing: Mixing,
}

/// Build the encode spec for `job`. Pure: touches neither the filesystem nor
/// any subprocess.
pub fn build(
    job: &JobSpec,
    duration_seconds: f64,
    background: Option<&PreparedTrack>,
    output_folder: &Path,
) -> EncodeSpec {
    let mut audio_inputs = vec![job.voice_path.clone()];
    let (mixing, audio_bitrate) = match background {
        Some(track) => {
            audio_inputs.push(track.path.clone());
            (Mixing::MixTwo, MIXED_AUDIO_BITRATE)
        }
        None => (Mixing::None, VOICE_AUDIO_BITRATE),
    };

    EncodeSpec {
        video_input: job.image_path.clone(),
        video_duration_seconds: duration_seconds,
        audio_inputs,
        output_path: output_folder.join(format!("{}.mp4", job.output_name)),
        video_codec: VIDEO_CODEC,
        audio_codec: AUDIO_CODEC,
        video_bitrate: VIDEO_BITRATE,
        audio_bitrate,
        frame_rate: FRAME_RATE,
        pixel_format: PIXEL_FORMAT,
        preset: PRESET,
        mixing,
    }
}

/// Seconds as ffmpeg expects them for `-t`, with millisecond precision.
pub(crate) fn format_seconds(seconds: f64) -> String {
    format!("{:.3}", seconds)
}

impl EncodeSpec {
    /// ffmpeg arguments, without the global preamble added by the toolchain.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        let mut push = |a: &str| args.push(a.into());

        // Input 0: the image, looped into a video stream of the job's length
        push("-loop");
        push("1");
        push("-t");
        push(&format_seconds(self.video_duration_seconds));
        push("-i");
        args.push(self.video_input.clone().into_os_string());

        for input in &self.audio_inputs {
            args.push("-i".into());
            args.push(input.clone().into_os_string());
        }

        let mut push = |a: &str| args.push(a.into());
        match self.mixing {
            Mixing::None => {
                push("-map");
                push("0:v:0");
                push("-map");
                push("1:a:0");
            }
            Mixing::MixTwo => {
                push("-filter_complex");
                push("[1:a][2:a]amix=inputs=2:dropout_transition=0:normalize=0[aout]");
                push("-map");
                push("0:v:0");
                push("-map");
                push("[aout]");
            }
        }

        push("-c:v");
        push(self.video_codec);
        push("-c:a");
        push(self.audio_codec);
        push("-b:v");
        push(self.video_bitrate);
        push("-b:a");
        push(self.audio_bitrate);
        push("-r");
        push(&self.frame_rate.to_string());
        push("-pix_fmt");
        push(self.pixel_format);
        push("-preset");
        push(self.preset);
        push("-threads");
        push("auto");
        push("-shortest");
        push("-movflags");
        push("+faststart");

        args.push(self.output_path.clone().into_os_string());
        args
    }
}
