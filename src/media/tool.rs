// Thin wrapper around the external ffmpeg / ffprobe binaries.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use crate::config::ToolsConfig;

/// Flags prepended to every ffmpeg invocation: overwrite outputs, never read
/// stdin, and keep stderr down to actual errors so it can be reported as-is.
const FFMPEG_PREAMBLE: [&str; 5] = ["-y", "-nostdin", "-hide_banner", "-loglevel", "error"];

#[derive(Debug, Clone)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Toolchain {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(&config.ffmpeg, &config.ffprobe)
    }

    fn ffmpeg_command(&self, args: &[OsString]) -> Command {
        let mut command = Command::new(&self.ffmpeg);
        command.args(FFMPEG_PREAMBLE).args(args);
        command
    }

    /// Run ffmpeg to completion. On failure the error is the captured stderr
    /// (or the spawn error), suitable for logging verbatim.
    pub fn run_ffmpeg(&self, args: &[OsString]) -> Result<(), String> {
        tracing::debug!("ffmpeg args: {:?}", args);
        let output = self
            .ffmpeg_command(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| format!("failed to start {}: {}", self.ffmpeg.display(), e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(stderr_detail(&output.stderr))
        }
    }

    /// Start ffmpeg without waiting for it. Stderr is piped so the caller can
    /// collect it; stdout is discarded.
    pub fn spawn_ffmpeg(&self, args: &[OsString]) -> std::io::Result<Child> {
        tracing::debug!("ffmpeg args: {:?}", args);
        self.ffmpeg_command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::from_config(&ToolsConfig::default())
    }
}

/// Turn raw stderr bytes into an error message, falling back to
/// "unknown error" when the tool printed nothing.
pub fn stderr_detail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr).trim().to_string();
    if text.is_empty() {
        "unknown error".to_string()
    } else {
        text
    }
}
