// Batch orchestrator: resolves the pairing, then runs every job strictly in
// sequence (probe -> background -> build -> encode). Job failures are recorded
// and the batch moves on; only input validation and output-folder creation
// abort the batch.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::error::RenderError;
use crate::events::{EventSink, LogLevel, LogRecord, ProgressEvent};
use crate::media::probe::{Ffprobe, MediaProbe, StreamKind};
use crate::media::tool::Toolchain;
use crate::render::background::{BackgroundMusicPreparer, BackgroundTrackSpec};
use crate::render::cancel::CancelToken;
use crate::render::encode::{EncodeResult, EncodeRunner, POLL_INTERVAL};
use crate::render::pairing::{self, JobSpec, PairingStrategy};
use crate::render::pipeline;
use crate::render::workspace::Workspace;

pub const REPORT_FILE_NAME: &str = "render-report.json";

/// Everything one batch needs from its environment. Passed in explicitly so
/// independent batches (and tests) share no hidden state.
pub struct RenderSession {
    pub tools: Toolchain,
    pub probe: Box<dyn MediaProbe>,
    pub scratch_dir: PathBuf,
    pub cleanup_after_batch: bool,
    pub poll_interval: Duration,
    pub cancel: CancelToken,
}

impl RenderSession {
    pub fn new(tools: Toolchain, scratch_dir: impl Into<PathBuf>) -> Self {
        let probe = Box::new(Ffprobe::new(&tools.ffprobe));
        Self {
            tools,
            probe,
            scratch_dir: scratch_dir.into(),
            cleanup_after_batch: true,
            poll_interval: POLL_INTERVAL,
            cancel: CancelToken::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut session = Self::new(
            Toolchain::from_config(&config.tools),
            &config.workspace.scratch_dir,
        );
        session.cleanup_after_batch = config.workspace.cleanup_after_batch;
        session
    }
}

/// Inputs for one batch, as supplied by the project layer or the CLI.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub voice_tracks: Vec<PathBuf>,
    pub images: Vec<PathBuf>,
    pub output_root: PathBuf,
    pub background: Option<PathBuf>,
    /// Background gain in [0, 1].
    pub background_volume: f64,
}

/// States the orchestrator moves through; per-job states repeat for every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Resolving,
    Probing,
    PreparingBackground,
    Building,
    Encoding,
    Completed,
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving inputs",
            Self::Probing => "probing",
            Self::PreparingBackground => "preparing background music",
            Self::Building => "building encode",
            Self::Encoding => "encoding",
            Self::Completed => "completed",
        };
        write!(f, "{}", s)
    }
}

/// Per-job stage at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Probing,
    Encoding,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Rendered {
        output_path: PathBuf,
        with_background: bool,
    },
    Failed {
        stage: JobStage,
        error: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub job_index: usize,
    pub output_name: String,
    pub outcome: JobOutcome,
}

impl JobResult {
    pub fn is_rendered(&self) -> bool {
        matches!(self.outcome, JobOutcome::Rendered { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    /// True once the pairing resolved and the output folder exists, whatever
    /// the individual jobs did. False when the batch aborted or was cancelled.
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<PairingStrategy>,
    /// Present whenever the batch got far enough to create it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_folder: Option<PathBuf>,
    /// Why the batch aborted, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cancelled: bool,
    pub jobs: Vec<JobResult>,
}

impl BatchResult {
    fn aborted(error: &RenderError) -> Self {
        debug_assert!(error.is_batch_fatal());
        Self {
            succeeded: false,
            strategy: None,
            output_folder: None,
            error: Some(error.to_string()),
            cancelled: false,
            jobs: Vec::new(),
        }
    }

    pub fn rendered_count(&self) -> usize {
        self.jobs.iter().filter(|j| j.is_rendered()).count()
    }

    pub fn failed_jobs(&self) -> Vec<&JobResult> {
        self.jobs
            .iter()
            .filter(|j| matches!(j.outcome, JobOutcome::Failed { .. }))
            .collect()
    }

    /// Write the result as pretty JSON to `<folder>/render-report.json`.
    pub fn write_report(&self, folder: &Path) -> Result<PathBuf> {
        let path = folder.join(REPORT_FILE_NAME);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

pub struct BatchOrchestrator {
    session: RenderSession,
    state: BatchState,
}

impl BatchOrchestrator {
    pub fn new(session: RenderSession) -> Self {
        Self {
            session,
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    fn enter(&mut self, state: BatchState) {
        tracing::debug!("Batch state: {} -> {}", self.state, state);
        self.state = state;
    }

    /// Run the batch on a dedicated worker thread so the caller stays free.
    pub fn spawn<S>(
        mut self,
        request: BatchRequest,
        mut sink: S,
    ) -> std::io::Result<JoinHandle<BatchResult>>
    where
        S: EventSink + 'static,
    {
        std::thread::Builder::new()
            .name("render-batch".into())
            .spawn(move || self.run(&request, &mut sink))
    }

    /// Run the whole batch on the calling thread. The completion event is the
    /// last thing emitted to `sink`.
    pub fn run(&mut self, request: &BatchRequest, sink: &mut dyn EventSink) -> BatchResult {
        let result = self.run_inner(request, sink);
        self.enter(BatchState::Completed);

        let detail = match (&result.output_folder, &result.error) {
            (_, Some(error)) => error.clone(),
            (Some(folder), None) if !result.cancelled => folder.display().to_string(),
            _ => RenderError::Cancelled.to_string(),
        };
        sink.on_complete(result.succeeded, &detail);
        result
    }

    fn run_inner(&mut self, request: &BatchRequest, sink: &mut dyn EventSink) -> BatchResult {
        emit(
            sink,
            LogRecord::new(LogLevel::Info, "batch", "Starting render batch").with_data(
                serde_json::json!({
                    "voice_tracks": request.voice_tracks.len(),
                    "images": request.images.len(),
                    "background": request.background,
                    "background_volume": request.background_volume,
                }),
            ),
        );

        self.enter(BatchState::Resolving);
        let pairing = match pairing::plan(&request.voice_tracks, &request.images) {
            Ok(p) => p,
            Err(e) => {
                emit(sink, LogRecord::new(LogLevel::Error, "pairing", e.to_string()));
                return BatchResult::aborted(&e);
            }
        };
        emit(
            sink,
            LogRecord::new(
                LogLevel::Info,
                "pairing",
                format!("Pairing mode: {}", pairing.strategy.describe()),
            ),
        );
        if pairing.ignored_voices > 0 {
            emit(
                sink,
                LogRecord::new(
                    LogLevel::Warn,
                    "pairing",
                    format!(
                        "{} voice tracks and {} images cannot be paired; using only the first voice track ({} ignored)",
                        request.voice_tracks.len(),
                        request.images.len(),
                        pairing.ignored_voices
                    ),
                ),
            );
        }

        let mut workspace = match Workspace::create(&request.output_root, &self.session.scratch_dir)
        {
            Ok(ws) => ws,
            Err(e) => {
                emit(sink, LogRecord::new(LogLevel::Error, "workspace", e.to_string()));
                let mut result = BatchResult::aborted(&e);
                result.strategy = Some(pairing.strategy);
                return result;
            }
        };
        emit(
            sink,
            LogRecord::new(
                LogLevel::Info,
                "workspace",
                format!("Output folder: {}", workspace.output_folder().display()),
            ),
        );

        let total = pairing.jobs.len();
        let mut jobs = Vec::with_capacity(total);
        let mut cancelled = false;
        for job in &pairing.jobs {
            let outcome = if cancelled || self.session.cancel.is_cancelled() {
                cancelled = true;
                JobOutcome::Cancelled
            } else {
                self.run_job(job, total, request, &mut workspace, sink)
            };
            if outcome == JobOutcome::Cancelled {
                cancelled = true;
            }
            jobs.push(JobResult {
                job_index: job.index,
                output_name: job.output_name.clone(),
                outcome,
            });
        }

        let result = BatchResult {
            succeeded: !cancelled,
            strategy: Some(pairing.strategy),
            output_folder: Some(workspace.output_folder().to_path_buf()),
            error: None,
            cancelled,
            jobs,
        };

        let failed = result.failed_jobs().len();
        emit(
            sink,
            LogRecord::new(
                if failed > 0 { LogLevel::Warn } else { LogLevel::Info },
                "batch",
                format!(
                    "Batch finished: {} of {} videos rendered, {} failed",
                    result.rendered_count(),
                    total,
                    failed
                ),
            ),
        );

        if let Err(e) = result.write_report(workspace.output_folder()) {
            emit(
                sink,
                LogRecord::new(
                    LogLevel::Warn,
                    "batch",
                    format!("Failed to write render report: {:#}", e),
                ),
            );
        }

        if self.session.cleanup_after_batch {
            match workspace.cleanup() {
                Ok(n) => tracing::debug!("Removed {} scratch files", n),
                Err(e) => emit(
                    sink,
                    LogRecord::new(
                        LogLevel::Warn,
                        "workspace",
                        format!("Scratch cleanup failed: {}", e),
                    ),
                ),
            }
        }

        result
    }

    fn run_job(
        &mut self,
        job: &JobSpec,
        total: usize,
        request: &BatchRequest,
        workspace: &mut Workspace,
        sink: &mut dyn EventSink,
    ) -> JobOutcome {
        emit(
            sink,
            LogRecord::new(
                LogLevel::Info,
                "job",
                format!("Processing video {}/{}: {}", job.index + 1, total, job.output_name),
            )
            .with_data(serde_json::json!({
                "image": job.image_path,
                "voice": job.voice_path,
            })),
        );

        self.enter(BatchState::Probing);
        let duration = match self.session.probe.probe(&job.voice_path, StreamKind::Audio) {
            Ok(meta) => meta.duration_seconds,
            Err(e) => {
                emit(sink, LogRecord::new(LogLevel::Error, "probe", e.to_string()));
                return JobOutcome::Failed {
                    stage: JobStage::Probing,
                    error: e.to_string(),
                };
            }
        };
        emit(
            sink,
            LogRecord::new(
                LogLevel::Info,
                "probe",
                format!("Voice track duration: {:.2}s", duration),
            ),
        );

        let background = match &request.background {
            Some(source) => {
                self.enter(BatchState::PreparingBackground);
                let spec = BackgroundTrackSpec {
                    source_path: source.clone(),
                    target_duration_seconds: duration,
                    volume: request.background_volume,
                };
                let preparer =
                    BackgroundMusicPreparer::new(&self.session.tools, self.session.probe.as_ref());
                match preparer.prepare(&spec, workspace) {
                    Ok(track) => {
                        emit(
                            sink,
                            LogRecord::new(
                                LogLevel::Info,
                                "background",
                                format!("Mixing background music: {}", track.path.display()),
                            ),
                        );
                        Some(track)
                    }
                    Err(e) => {
                        emit(
                            sink,
                            LogRecord::new(
                                LogLevel::Warn,
                                "background",
                                format!("{}; continuing without background music", e),
                            ),
                        );
                        None
                    }
                }
            }
            None => None,
        };

        self.enter(BatchState::Building);
        let spec = pipeline::build(job, duration, background.as_ref(), workspace.output_folder());
        let output_path = spec.output_path.clone();

        self.enter(BatchState::Encoding);
        emit(
            sink,
            LogRecord::new(
                LogLevel::Info,
                "encode",
                format!("Encoding {}", output_path.display()),
            ),
        );
        let runner = EncodeRunner::new(&self.session.tools, self.session.cancel.clone())
            .with_poll_interval(self.session.poll_interval);
        let job_index = job.index;
        let result = runner.run(spec, &mut |percent| {
            sink.on_progress(ProgressEvent {
                job_index,
                total_jobs: total,
                percent,
            })
        });

        match result {
            EncodeResult::Success { output_path } => {
                emit(
                    sink,
                    LogRecord::new(
                        LogLevel::Info,
                        "encode",
                        format!("Finished {}", output_path.display()),
                    ),
                );
                JobOutcome::Rendered {
                    output_path,
                    with_background: background.is_some(),
                }
            }
            EncodeResult::Failed { exit_code, detail } => {
                let error = RenderError::Encode {
                    output: output_path,
                    detail,
                };
                emit(
                    sink,
                    LogRecord::new(LogLevel::Error, "encode", error.to_string())
                        .with_data(serde_json::json!({ "exit_code": exit_code })),
                );
                JobOutcome::Failed {
                    stage: JobStage::Encoding,
                    error: error.to_string(),
                }
            }
            EncodeResult::Cancelled => {
                emit(
                    sink,
                    LogRecord::new(LogLevel::Warn, "encode", "Encode cancelled"),
                );
                JobOutcome::Cancelled
            }
        }
    }
}

fn emit(sink: &mut dyn EventSink, record: LogRecord) {
    record.trace();
    sink.on_log(record);
}
