use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::render::batch::BatchRequest;

pub const PROJECT_FILE_NAME: &str = "project.json";

/// Inputs larger than this are refused when added to a project.
pub const MAX_FILE_BYTES: u64 = 500 * 1024 * 1024;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aac"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Which list of a project a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Audio,
    Images,
    BackgroundMusic,
}

impl FileKind {
    fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Audio | Self::BackgroundMusic => AUDIO_EXTENSIONS,
            Self::Images => IMAGE_EXTENSIONS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectFiles {
    pub audio: Vec<PathBuf>,
    pub images: Vec<PathBuf>,
    pub background_music: Vec<PathBuf>,
}

impl ProjectFiles {
    fn list_mut(&mut self, kind: FileKind) -> &mut Vec<PathBuf> {
        match kind {
            FileKind::Audio => &mut self.audio,
            FileKind::Images => &mut self.images,
            FileKind::BackgroundMusic => &mut self.background_music,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub bg_music_volume: f64,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            bg_music_volume: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Local>,
    #[serde(default)]
    pub files: ProjectFiles,
    #[serde(default)]
    pub settings: ProjectSettings,
}

/// What a project contributes to a render batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderInputs {
    pub voice_tracks: Vec<PathBuf>,
    pub images: Vec<PathBuf>,
    pub background: Option<PathBuf>,
    pub background_volume: f64,
}

impl RenderInputs {
    pub fn into_request(self, output_root: impl Into<PathBuf>) -> BatchRequest {
        BatchRequest {
            voice_tracks: self.voice_tracks,
            images: self.images,
            output_root: output_root.into(),
            background: self.background,
            background_volume: self.background_volume,
        }
    }
}

impl Project {
    /// Only the first background track is ever used.
    pub fn render_inputs(&self) -> RenderInputs {
        RenderInputs {
            voice_tracks: self.files.audio.clone(),
            images: self.files.images.clone(),
            background: self.files.background_music.first().cloned(),
            background_volume: self.settings.bg_music_volume,
        }
    }
}

/// Projects on disk, one directory per project under `root`.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            anyhow::bail!("Invalid project id: {:?}", id);
        }
        Ok(self.root.join(id))
    }

    pub fn create(&self, name: &str) -> Result<Project> {
        self.create_at(name, Local::now())
    }

    /// Ids are the creation time as `YYYYMMDD_HHMMSS`; a second project in
    /// the same second gets `_2`, then `_3`.
    pub fn create_at(&self, name: &str, now: DateTime<Local>) -> Result<Project> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create {}", self.root.display()))?;

        let base = now.format("%Y%m%d_%H%M%S").to_string();
        let mut id = base.clone();
        let mut n = 2;
        loop {
            match std::fs::create_dir(self.root.join(&id)) {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    id = format!("{}_{}", base, n);
                    n += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to create project {}", id))
                }
            }
        }

        let project = Project {
            id,
            name: name.to_string(),
            created_at: now,
            files: ProjectFiles::default(),
            settings: ProjectSettings::default(),
        };
        self.save(&project)?;
        tracing::info!("Created project {} ({})", project.id, project.name);
        Ok(project)
    }

    /// All readable projects, oldest first. Directories without a readable
    /// project file are skipped.
    pub fn list(&self) -> Result<Vec<Project>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut projects = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let file = entry.path().join(PROJECT_FILE_NAME);
            if !file.exists() {
                continue;
            }
            match read_project(&file) {
                Ok(p) => projects.push(p),
                Err(e) => tracing::warn!("Skipping {}: {:#}", file.display(), e),
            }
        }
        projects.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(projects)
    }

    pub fn load(&self, id: &str) -> Result<Project> {
        let file = self.project_dir(id)?.join(PROJECT_FILE_NAME);
        if !file.exists() {
            anyhow::bail!("Project not found: {}", id);
        }
        read_project(&file)
    }

    /// Returns false when there was nothing to delete.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let dir = self.project_dir(id)?;
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to delete {}", dir.display()))?;
        tracing::info!("Deleted project {}", id);
        Ok(true)
    }

    pub fn save(&self, project: &Project) -> Result<()> {
        let dir = self.project_dir(&project.id)?;
        std::fs::create_dir_all(&dir)?;
        let file = dir.join(PROJECT_FILE_NAME);
        std::fs::write(&file, serde_json::to_string_pretty(project)?)
            .with_context(|| format!("Failed to write {}", file.display()))?;
        Ok(())
    }

    /// Add `path` to the list for `kind` and persist. Returns false, without
    /// saving, when the file is already listed.
    pub fn add_file(&self, project: &mut Project, kind: FileKind, path: &Path) -> Result<bool> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("File does not exist: {}", path.display()))?;
        if !metadata.is_file() {
            anyhow::bail!("Not a file: {}", path.display());
        }
        if metadata.len() > MAX_FILE_BYTES {
            anyhow::bail!(
                "File too large: {} ({:.1} MB, limit {} MB)",
                path.display(),
                metadata.len() as f64 / 1_048_576.0,
                MAX_FILE_BYTES / 1_048_576
            );
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if !kind.allowed_extensions().contains(&extension.as_str()) {
            anyhow::bail!(
                "Unsupported file type for {:?}: {} (expected one of: {})",
                kind,
                path.display(),
                kind.allowed_extensions().join(", ")
            );
        }

        let list = project.files.list_mut(kind);
        if list.iter().any(|p| p == path) {
            tracing::info!("{} is already in project {}", path.display(), project.id);
            return Ok(false);
        }
        list.push(path.to_path_buf());
        self.save(project)?;
        Ok(true)
    }

    /// Remove `path` from whichever list holds it. Returns false if none does.
    pub fn remove_file(&self, project: &mut Project, path: &Path) -> Result<bool> {
        let files = &mut project.files;
        let removed = [&mut files.audio, &mut files.images, &mut files.background_music]
            .into_iter()
            .any(|list| match list.iter().position(|p| p == path) {
                Some(pos) => {
                    list.remove(pos);
                    true
                }
                None => false,
            });
        if removed {
            self.save(project)?;
        }
        Ok(removed)
    }

    /// Set the background music gain, clamped to [0, 1]. Returns the stored value.
    pub fn set_volume(&self, project: &mut Project, volume: f64) -> Result<f64> {
        if volume.is_nan() {
            anyhow::bail!("Volume must be a number");
        }
        project.settings.bg_music_volume = volume.clamp(0.0, 1.0);
        self.save(project)?;
        Ok(project.settings.bg_music_volume)
    }
}

fn read_project(file: &Path) -> Result<Project> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", file.display()))
}
