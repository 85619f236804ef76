use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use stillcast::media::probe::StreamKind;
use stillcast::project::FileKind;

#[derive(Parser, Debug)]
#[command(
    name = "stillcast",
    version,
    about = "Render still images and voice tracks into MP4 videos, with optional background music"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a batch of videos
    Render(RenderArgs),

    /// Print ffprobe metadata for a media file as JSON
    Probe {
        file: PathBuf,

        /// Stream the file must contain
        #[arg(long, value_enum, default_value = "audio")]
        expect: ProbeKind,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectCommand,
    },

    /// Remove leftover intermediate files from the scratch directory
    Clean,

    /// Write a commented default config file
    InitConfig {
        /// Destination (defaults to the platform config directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
pub struct RenderArgs {
    /// Render the files of a saved project
    #[arg(long, conflicts_with_all = ["voice", "image"])]
    pub project: Option<String>,

    /// Voice track (repeatable, order is kept)
    #[arg(long)]
    pub voice: Vec<PathBuf>,

    /// Image (repeatable, order is kept)
    #[arg(long)]
    pub image: Vec<PathBuf>,

    /// Background music track
    #[arg(long)]
    pub background: Option<PathBuf>,

    /// Background music volume, 0.0 to 1.0
    #[arg(long)]
    pub volume: Option<f64>,

    /// Output root (defaults to output.directory from the config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Keep intermediate background tracks after the batch
    #[arg(long)]
    pub keep_temp: bool,

    /// Exit with an error if any job failed
    #[arg(long)]
    pub strict: bool,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create a project
    New { name: String },

    /// List projects
    List,

    /// Show a project's files and settings
    Show { id: String },

    /// Delete a project
    Delete { id: String },

    /// Add files to a project
    Add {
        id: String,
        #[arg(value_enum)]
        kind: FileKind,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Remove a file from a project
    Remove { id: String, file: PathBuf },

    /// Set the background music volume (clamped to 0.0..=1.0)
    Volume {
        id: String,
        #[arg(allow_negative_numbers = true)]
        volume: f64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProbeKind {
    Audio,
    Video,
}

impl From<ProbeKind> for StreamKind {
    fn from(kind: ProbeKind) -> Self {
        match kind {
            ProbeKind::Audio => StreamKind::Audio,
            ProbeKind::Video => StreamKind::Video,
        }
    }
}
