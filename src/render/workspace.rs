use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::RenderError;

/// Scratch directory plus the timestamped output folder of one batch.
///
/// The scratch directory may hold unrelated files; cleanup only touches the
/// artifacts this workspace handed out.
#[derive(Debug)]
pub struct Workspace {
    scratch_dir: PathBuf,
    output_folder: PathBuf,
    stamp: String,
    artifacts: Vec<PathBuf>,
}

impl Workspace {
    /// Create the scratch directory and `<output_root>/output_<YYYYMMDD_HHMMSS>`.
    pub fn create(output_root: &Path, scratch_dir: &Path) -> Result<Self, RenderError> {
        Self::create_at(output_root, scratch_dir, Local::now())
    }

    pub fn create_at(
        output_root: &Path,
        scratch_dir: &Path,
        now: DateTime<Local>,
    ) -> Result<Self, RenderError> {
        std::fs::create_dir_all(scratch_dir)
            .map_err(|e| RenderError::workspace(scratch_dir, e))?;
        std::fs::create_dir_all(output_root)
            .map_err(|e| RenderError::workspace(output_root, e))?;

        let stamp = now.format("%Y%m%d_%H%M%S").to_string();
        let output_folder = create_unique_dir(output_root, &format!("output_{}", stamp))?;

        Ok(Self {
            scratch_dir: scratch_dir.to_path_buf(),
            output_folder,
            stamp,
            artifacts: Vec::new(),
        })
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// A fresh, never-before-returned path in the scratch directory. The path
    /// is remembered for [`Workspace::cleanup`].
    pub fn scratch_file(&mut self, prefix: &str, extension: &str) -> PathBuf {
        let n = self.artifacts.len() + 1;
        let path = self
            .scratch_dir
            .join(format!("{}_{}_{}.{}", prefix, self.stamp, n, extension));
        self.artifacts.push(path.clone());
        path
    }

    /// Delete the scratch files handed out by [`Workspace::scratch_file`].
    /// Paths that were never written are skipped. Returns how many were
    /// deleted; files that cannot be removed are logged and kept.
    pub fn cleanup(&mut self) -> Result<usize, RenderError> {
        let mut removed = 0;
        for path in self.artifacts.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to delete scratch file {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}

/// Create `root/name`, or `root/name_2`, `root/name_3`, ... when a folder from
/// an earlier batch in the same second already exists.
fn create_unique_dir(root: &Path, name: &str) -> Result<PathBuf, RenderError> {
    let mut candidate = root.join(name);
    let mut index = 2_u32;
    loop {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate = root.join(format!("{}_{}", name, index));
                index += 1;
            }
            Err(e) => return Err(RenderError::workspace(&candidate, e)),
        }
    }
}

/// Delete every file directly inside `dir`, whoever created it. Only the
/// `clean` command uses this. A missing directory counts as already clean;
/// individual files that cannot be removed are logged and skipped.
pub fn clear_scratch_dir(dir: &Path) -> Result<usize, RenderError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(RenderError::workspace(dir, e)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| RenderError::workspace(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("Failed to delete scratch file {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}
