// Runs the main encode for one job: spawn ffmpeg, poll it on a fixed
// interval while reporting estimated progress, then classify the exit.

use std::io::Read;
use std::path::PathBuf;
use std::process::Child;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::media::tool::{stderr_detail, Toolchain};
use crate::render::cancel::CancelToken;
use crate::render::pipeline::EncodeSpec;
use crate::render::progress::{ElapsedTimeEstimator, ProgressEstimator};

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeResult {
    Success {
        output_path: PathBuf,
    },
    /// Non-zero exit (or the encoder could not be started). `detail` is the
    /// encoder's stderr, or "unknown error" when it printed nothing.
    Failed {
        exit_code: Option<i32>,
        detail: String,
    },
    /// The cancel token fired; the child was killed.
    Cancelled,
}

pub struct EncodeRunner<'a> {
    tools: &'a Toolchain,
    poll_interval: Duration,
    cancel: CancelToken,
}

impl<'a> EncodeRunner<'a> {
    pub fn new(tools: &'a Toolchain, cancel: CancelToken) -> Self {
        Self {
            tools,
            poll_interval: POLL_INTERVAL,
            cancel,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Encode with the elapsed-time progress heuristic.
    pub fn run(&self, spec: EncodeSpec, on_progress: &mut dyn FnMut(u8)) -> EncodeResult {
        let mut estimator = ElapsedTimeEstimator::new(spec.video_duration_seconds);
        self.run_with_estimator(spec, &mut estimator, on_progress)
    }

    /// Progress values passed to `on_progress` never decrease. A successful
    /// encode always ends with a final 100.
    pub fn run_with_estimator(
        &self,
        spec: EncodeSpec,
        estimator: &mut dyn ProgressEstimator,
        on_progress: &mut dyn FnMut(u8),
    ) -> EncodeResult {
        let args = spec.to_args();
        let mut child = match self.tools.spawn_ffmpeg(&args) {
            Ok(child) => child,
            Err(e) => {
                return EncodeResult::Failed {
                    exit_code: None,
                    detail: format!("failed to start {}: {}", self.tools.ffmpeg.display(), e),
                }
            }
        };

        // Drain stderr concurrently so a chatty encoder never blocks on a
        // full pipe while we poll.
        let stderr_reader = drain_stderr(&mut child);

        let started = Instant::now();
        let mut last = 0u8;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break Err(e);
                }
            }

            if self.cancel.is_cancelled() {
                tracing::info!("Cancelling encode of {}", spec.output_path.display());
                let _ = child.kill();
                let _ = child.wait();
                join_stderr(stderr_reader);
                return EncodeResult::Cancelled;
            }

            last = estimator.estimate(started.elapsed()).max(last);
            on_progress(last);
            std::thread::sleep(self.poll_interval);
        };

        let stderr = join_stderr(stderr_reader);
        match status {
            Ok(status) if status.success() => {
                on_progress(100);
                EncodeResult::Success {
                    output_path: spec.output_path,
                }
            }
            Ok(status) => EncodeResult::Failed {
                exit_code: status.code(),
                detail: stderr_detail(&stderr),
            },
            Err(e) => EncodeResult::Failed {
                exit_code: None,
                detail: format!("lost track of encoder process: {}", e),
            },
        }
    }
}

fn drain_stderr(child: &mut Child) -> Option<JoinHandle<Vec<u8>>> {
    let mut stderr = child.stderr.take()?;
    std::thread::Builder::new()
        .name("encode-stderr".into())
        .spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf);
            buf
        })
        .ok()
}

fn join_stderr(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::pairing::JobSpec;
    use crate::render::pipeline;
    use std::path::Path;

    fn spec(out_dir: &Path, duration: f64) -> EncodeSpec {
        let job = JobSpec {
            index: 0,
            image_path: PathBuf::from("1.jpg"),
            voice_path: PathBuf::from("a.mp3"),
            output_name: "1".to_string(),
        };
        pipeline::build(&job, duration, None, out_dir)
    }

    #[test]
    fn test_missing_encoder_fails_without_panicking() {
        let tools = Toolchain::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let runner = EncodeRunner::new(&tools, CancelToken::new());
        let mut seen = Vec::new();
        let result = runner.run(spec(Path::new("/out"), 1.0), &mut |p| seen.push(p));
        match result {
            EncodeResult::Failed { exit_code, detail } => {
                assert!(exit_code.is_none());
                assert!(detail.contains("failed to start"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(seen.is_empty());
    }

    #[cfg(unix)]
    mod with_fake_tools {
        use super::*;
        use crate::testutil::write_script;
        use tempfile::TempDir;

        #[test]
        fn test_success_reports_monotonic_progress_ending_at_100() {
            let tmp = TempDir::new().unwrap();
            let ffmpeg = write_script(
                tmp.path(),
                "ffmpeg",
                "sleep 0.3\nfor last; do :; done\ntouch \"$last\"\n",
            );
            let tools = Toolchain::new(ffmpeg, "unused");
            let runner = EncodeRunner::new(&tools, CancelToken::new())
                .with_poll_interval(Duration::from_millis(20));

            let mut seen = Vec::new();
            let result = runner.run(spec(tmp.path(), 0.5), &mut |p| seen.push(p));

            assert_eq!(
                result,
                EncodeResult::Success {
                    output_path: tmp.path().join("1.mp4")
                }
            );
            assert!(tmp.path().join("1.mp4").is_file());
            assert!(seen.len() >= 2, "expected several samples, got {:?}", seen);
            assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
            assert_eq!(*seen.last().unwrap(), 100);
        }

        #[test]
        fn test_nonzero_exit_captures_stderr() {
            let tmp = TempDir::new().unwrap();
            let ffmpeg = write_script(
                tmp.path(),
                "ffmpeg",
                "echo '1.jpg: Invalid data found when processing input' >&2\nexit 1\n",
            );
            let tools = Toolchain::new(ffmpeg, "unused");
            let runner = EncodeRunner::new(&tools, CancelToken::new())
                .with_poll_interval(Duration::from_millis(10));

            let result = runner.run(spec(tmp.path(), 5.0), &mut |_| {});
            assert_eq!(
                result,
                EncodeResult::Failed {
                    exit_code: Some(1),
                    detail: "1.jpg: Invalid data found when processing input".to_string(),
                }
            );
        }

        #[test]
        fn test_absurd_media_duration_still_completes() {
            let tmp = TempDir::new().unwrap();
            let ffmpeg = write_script(tmp.path(), "ffmpeg", "exit 0\n");
            let tools = Toolchain::new(ffmpeg, "unused");
            let runner = EncodeRunner::new(&tools, CancelToken::new())
                .with_poll_interval(Duration::from_millis(10));

            let mut seen = Vec::new();
            let result = runner.run(spec(tmp.path(), 1e30), &mut |p| seen.push(p));
            assert!(matches!(result, EncodeResult::Success { .. }));
            assert_eq!(*seen.last().unwrap(), 100);
        }

        #[test]
        fn test_nonzero_exit_without_stderr_is_unknown_error() {
            let tmp = TempDir::new().unwrap();
            let ffmpeg = write_script(tmp.path(), "ffmpeg", "exit 3\n");
            let tools = Toolchain::new(ffmpeg, "unused");
            let runner = EncodeRunner::new(&tools, CancelToken::new())
                .with_poll_interval(Duration::from_millis(10));

            match runner.run(spec(tmp.path(), 5.0), &mut |_| {}) {
                EncodeResult::Failed { exit_code, detail } => {
                    assert_eq!(exit_code, Some(3));
                    assert_eq!(detail, "unknown error");
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }

        #[test]
        fn test_cancel_kills_running_encoder() {
            let tmp = TempDir::new().unwrap();
            let ffmpeg = write_script(tmp.path(), "ffmpeg", "exec sleep 30\n");
            let tools = Toolchain::new(ffmpeg, "unused");
            let cancel = CancelToken::new();
            let runner = EncodeRunner::new(&tools, cancel.clone())
                .with_poll_interval(Duration::from_millis(10));

            let started = Instant::now();
            let mut polls = 0;
            let result = runner.run(spec(tmp.path(), 30.0), &mut |_| {
                polls += 1;
                if polls == 3 {
                    cancel.cancel();
                }
            });
            assert_eq!(result, EncodeResult::Cancelled);
            assert!(started.elapsed() < Duration::from_secs(10));
        }
    }
}
