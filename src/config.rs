use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub output: OutputConfig,
    pub workspace: WorkspaceConfig,
    pub background: BackgroundConfig,
    pub projects: ProjectsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// ffmpeg binary; a bare name is resolved through PATH.
    pub ffmpeg: PathBuf,
    /// ffprobe binary; a bare name is resolved through PATH.
    pub ffprobe: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root under which each batch creates its `output_<timestamp>` folder.
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub scratch_dir: PathBuf,
    pub cleanup_after_batch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Gain used when neither the project nor the command line sets one.
    pub default_volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectsConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    /// Append batch log records as JSON lines under `directory`.
    pub json_log: bool,
}

// --- Default implementations ---

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stillcast")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        let directory = dirs::video_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stillcast");
        Self { directory }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("temp"),
            cleanup_after_batch: true,
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            default_volume: 0.3,
        }
    }
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            directory: data_dir().join("projects"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: data_dir().join("logs"),
            json_log: true,
        }
    }
}

// --- Config loading ---

impl Config {
    /// Load config and return the resolved file path (if any).
    pub fn load_with_path(path: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        // 1. Check explicit path
        if let Some(p) = path {
            let content = std::fs::read_to_string(p).map_err(|e| {
                anyhow::anyhow!("Failed to read config file {}: {}", p.display(), e)
            })?;
            let config: Config = toml::from_str(&content)?;
            return Ok((config, Some(p.to_path_buf())));
        }

        // 2. Check beside the executable
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(p) = exe_path.parent().map(|p| p.join("stillcast.toml")) {
                if p.exists() {
                    let content = std::fs::read_to_string(&p)?;
                    let config: Config = toml::from_str(&content)?;
                    return Ok((config, Some(p)));
                }
            }
        }

        // 3. Check platform config directory
        if let Some(p) = Self::platform_path() {
            if p.exists() {
                let content = std::fs::read_to_string(&p)?;
                let config: Config = toml::from_str(&content)?;
                return Ok((config, Some(p)));
            }
        }

        // 4. Fall back to defaults
        tracing::info!("No config file found, using defaults");
        Ok((Config::default(), None))
    }

    /// `<config dir>/stillcast/config.toml`, where `init-config` writes by default.
    pub fn platform_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("stillcast").join("config.toml"))
    }

    /// Generate a default config file with all fields and inline documentation.
    pub fn generate_default_commented() -> String {
        let escape = |p: PathBuf| p.to_string_lossy().replace('\\', "\\\\");
        let output_dir = escape(OutputConfig::default().directory);
        let projects_dir = escape(ProjectsConfig::default().directory);
        let log_dir = escape(LoggingConfig::default().directory);

        format!(
r#"# stillcast configuration

[tools]
# ffmpeg and ffprobe binaries. Bare names are looked up on PATH.
ffmpeg = "ffmpeg"
ffprobe = "ffprobe"

[output]
# Each render creates an output_<YYYYMMDD_HHMMSS> folder under this directory.
directory = "{output_dir}"

[workspace]
# Scratch directory for looped / volume-adjusted background tracks.
scratch_dir = "temp"
# Clear the scratch directory when a batch finishes.
cleanup_after_batch = true

[background]
# Background music gain (0.0 to 1.0) used when a project does not set one.
default_volume = 0.3

[projects]
# Where project.json files are stored.
directory = "{projects_dir}"

[logging]
# Directory for the JSON-lines batch log (app-YYYY-MM-DD.log).
directory = "{log_dir}"
json_log = true
"#
        )
    }
}
