use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the render core.
///
/// Which variants abort a batch and which only affect a single job is decided
/// by the orchestrator; see [`RenderError::is_batch_fatal`].
#[derive(Debug, Error)]
pub enum RenderError {
    /// Empty input lists, non-positive durations and similar caller mistakes.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("probe failed for {}: {detail}", path.display())]
    Probe { path: PathBuf, detail: String },

    #[error("background music preparation failed for {}: {detail}", path.display())]
    BackgroundPrep { path: PathBuf, detail: String },

    #[error("encode failed for {}: {detail}", output.display())]
    Encode { output: PathBuf, detail: String },

    #[error("workspace error at {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("render cancelled")]
    Cancelled,
}

impl RenderError {
    pub fn probe(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Probe {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub fn background(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::BackgroundPrep {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Workspace {
            path: path.into(),
            source,
        }
    }

    /// Only input validation and workspace setup failures stop a batch before
    /// its jobs run. Everything else is recorded against the job.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::Workspace { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_path_and_detail() {
        let err = RenderError::probe("/media/a.mp3", "no duration");
        let msg = err.to_string();
        assert!(msg.contains("/media/a.mp3"));
        assert!(msg.contains("no duration"));
        assert!(msg.starts_with("probe failed"));
    }

    #[test]
    fn test_batch_fatal_classification() {
        assert!(RenderError::InvalidInput("empty".into()).is_batch_fatal());
        assert!(RenderError::workspace(
            "/out",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied")
        )
        .is_batch_fatal());
        assert!(!RenderError::probe("a", "b").is_batch_fatal());
        assert!(!RenderError::background("a", "b").is_batch_fatal());
        assert!(!RenderError::Cancelled.is_batch_fatal());
    }
}
