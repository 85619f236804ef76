// Background music preparation: stretch (by looping) or trim the source to a
// job's exact duration and apply the configured gain.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::RenderError;
use crate::media::probe::{MediaProbe, StreamKind};
use crate::media::tool::Toolchain;
use crate::render::pipeline::format_seconds;
use crate::render::workspace::Workspace;

/// Upper bound on the number of samples `aloop` buffers.
const ALOOP_SIZE: &str = "2e+09";
const BACKGROUND_CODEC: &str = "libmp3lame";

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundTrackSpec {
    pub source_path: PathBuf,
    pub target_duration_seconds: f64,
    /// Gain in [0, 1]; out-of-range values are clamped.
    pub volume: f64,
}

/// Background audio trimmed/looped and gain-adjusted for one job. The file
/// lives in the workspace scratch directory and is removed on cleanup.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTrack {
    pub path: PathBuf,
    pub duration_seconds: f64,
}

/// Which passes a preparation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundPlan {
    /// Source is long enough: trim and scale in a single pass.
    TrimOnly,
    /// Source is too short: play it `loops` times, trim, then scale in a
    /// second pass.
    LoopThenTrim { loops: u32 },
}

impl BackgroundPlan {
    pub fn for_durations(source_seconds: f64, target_seconds: f64) -> Self {
        if source_seconds >= target_seconds {
            Self::TrimOnly
        } else {
            let loops = (target_seconds / source_seconds).ceil() as u32;
            Self::LoopThenTrim {
                loops: loops.max(2),
            }
        }
    }

    /// Seconds of audio available before trimming.
    pub fn covered_seconds(&self, source_seconds: f64) -> f64 {
        match self {
            Self::TrimOnly => source_seconds,
            Self::LoopThenTrim { loops } => source_seconds * *loops as f64,
        }
    }
}

/// The gain is passed through at full precision.
fn volume_filter(volume: f64) -> String {
    format!("volume={}", volume)
}

fn trim_and_scale_args(source: &Path, target: f64, volume: f64, out: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        source.as_os_str().to_os_string(),
        "-af".into(),
        volume_filter(volume).into(),
        "-t".into(),
        format_seconds(target).into(),
        "-c:a".into(),
        BACKGROUND_CODEC.into(),
        out.as_os_str().to_os_string(),
    ]
}

fn loop_and_trim_args(source: &Path, loops: u32, target: f64, out: &Path) -> Vec<OsString> {
    // aloop's `loop` counts repeats after the first play
    vec![
        "-i".into(),
        source.as_os_str().to_os_string(),
        "-af".into(),
        format!("aloop=loop={}:size={}", loops - 1, ALOOP_SIZE).into(),
        "-t".into(),
        format_seconds(target).into(),
        "-c:a".into(),
        BACKGROUND_CODEC.into(),
        out.as_os_str().to_os_string(),
    ]
}

fn scale_args(source: &Path, volume: f64, out: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        source.as_os_str().to_os_string(),
        "-af".into(),
        volume_filter(volume).into(),
        "-c:a".into(),
        BACKGROUND_CODEC.into(),
        out.as_os_str().to_os_string(),
    ]
}

pub struct BackgroundMusicPreparer<'a> {
    tools: &'a Toolchain,
    probe: &'a dyn MediaProbe,
}

impl<'a> BackgroundMusicPreparer<'a> {
    pub fn new(tools: &'a Toolchain, probe: &'a dyn MediaProbe) -> Self {
        Self { tools, probe }
    }

    pub fn prepare(
        &self,
        spec: &BackgroundTrackSpec,
        workspace: &mut Workspace,
    ) -> Result<PreparedTrack, RenderError> {
        let target = spec.target_duration_seconds;
        if !target.is_finite() || target <= 0.0 {
            return Err(RenderError::InvalidInput(format!(
                "background target duration must be positive, got {}",
                target
            )));
        }
        if spec.volume.is_nan() {
            return Err(RenderError::InvalidInput(
                "background volume is not a number".into(),
            ));
        }
        let volume = spec.volume.clamp(0.0, 1.0);
        let source = &spec.source_path;

        if !source.is_file() {
            return Err(RenderError::background(source, "file does not exist"));
        }

        let source_seconds = self
            .probe
            .probe(source, StreamKind::Audio)
            .map_err(|e| RenderError::background(source, e.to_string()))?
            .duration_seconds;

        let plan = BackgroundPlan::for_durations(source_seconds, target);
        tracing::info!(
            "Background {}: {:.2}s source, {:.2}s target, {:?}",
            source.display(),
            source_seconds,
            target,
            plan
        );

        let path = match plan {
            BackgroundPlan::TrimOnly => {
                let out = workspace.scratch_file("volume_bg", "mp3");
                self.tools
                    .run_ffmpeg(&trim_and_scale_args(source, target, volume, &out))
                    .map_err(|detail| RenderError::background(source, detail))?;
                out
            }
            BackgroundPlan::LoopThenTrim { loops } => {
                let looped = workspace.scratch_file("looped_bg", "mp3");
                self.tools
                    .run_ffmpeg(&loop_and_trim_args(source, loops, target, &looped))
                    .map_err(|detail| RenderError::background(source, detail))?;

                let out = workspace.scratch_file("volume_bg", "mp3");
                self.tools
                    .run_ffmpeg(&scale_args(&looped, volume, &out))
                    .map_err(|detail| RenderError::background(source, detail))?;
                out
            }
        };

        Ok(PreparedTrack {
            path,
            duration_seconds: target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_trim_only_when_long_enough() {
        assert_eq!(BackgroundPlan::for_durations(60.0, 10.0), BackgroundPlan::TrimOnly);
        assert_eq!(BackgroundPlan::for_durations(10.0, 10.0), BackgroundPlan::TrimOnly);
    }

    #[test]
    fn test_plan_loops_when_short() {
        assert_eq!(
            BackgroundPlan::for_durations(3.0, 8.0),
            BackgroundPlan::LoopThenTrim { loops: 3 }
        );
        assert_eq!(
            BackgroundPlan::for_durations(3.0, 12.0),
            BackgroundPlan::LoopThenTrim { loops: 4 }
        );
        assert_eq!(
            BackgroundPlan::for_durations(3.0, 6.0),
            BackgroundPlan::LoopThenTrim { loops: 2 }
        );
    }

    #[test]
    fn test_plan_always_covers_target() {
        let sources = [0.7, 1.0, 2.5, 3.0, 7.3, 30.0, 180.0];
        let targets = [0.5, 1.0, 3.0, 8.0, 12.0, 59.9, 600.0, 3601.2];
        for &source in &sources {
            for &target in &targets {
                let plan = BackgroundPlan::for_durations(source, target);
                assert!(
                    plan.covered_seconds(source) >= target,
                    "source {} target {} -> {:?}",
                    source,
                    target,
                    plan
                );
            }
        }
    }

    #[test]
    fn test_loop_args_use_repeat_count() {
        let args = loop_and_trim_args(Path::new("bg.mp3"), 3, 8.0, Path::new("out.mp3"));
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().to_string()).collect();
        assert!(args.contains(&"aloop=loop=2:size=2e+09".to_string()));
        assert!(args.contains(&"8.000".to_string()));
        assert_eq!(args.last().unwrap(), "out.mp3");
    }

    #[test]
    fn test_volume_filter_format() {
        assert_eq!(volume_filter(0.3), "volume=0.3");
        assert_eq!(volume_filter(1.0), "volume=1");
        assert_eq!(volume_filter(0.333), "volume=0.333");
        // Small gains must not round down to silence
        assert_eq!(volume_filter(0.004), "volume=0.004");
    }

    #[cfg(unix)]
    mod with_fake_tools {
        use super::*;
        use crate::media::probe::Ffprobe;
        use crate::testutil::{fake_ffmpeg, fake_ffprobe, write_script};
        use tempfile::TempDir;

        struct Fixture {
            tmp: TempDir,
            log: PathBuf,
            source: PathBuf,
            workspace: Workspace,
        }

        fn fixture() -> Fixture {
            let tmp = TempDir::new().unwrap();
            let log = tmp.path().join("ffmpeg.log");
            let source = tmp.path().join("bg.mp3");
            std::fs::write(&source, b"mp3").unwrap();
            let workspace =
                Workspace::create(&tmp.path().join("out"), &tmp.path().join("temp")).unwrap();
            Fixture {
                tmp,
                log,
                source,
                workspace,
            }
        }

        fn ffmpeg_calls(log: &Path) -> Vec<String> {
            std::fs::read_to_string(log)
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        #[test]
        fn test_short_source_runs_loop_then_volume_pass() {
            let mut f = fixture();
            let tools = Toolchain::new(fake_ffmpeg(f.tmp.path(), &f.log), "unused");
            let probe = Ffprobe::new(fake_ffprobe(f.tmp.path(), "3.0"));
            let preparer = BackgroundMusicPreparer::new(&tools, &probe);

            let track = preparer
                .prepare(
                    &BackgroundTrackSpec {
                        source_path: f.source.clone(),
                        target_duration_seconds: 8.0,
                        volume: 0.3,
                    },
                    &mut f.workspace,
                )
                .unwrap();

            let calls = ffmpeg_calls(&f.log);
            assert_eq!(calls.len(), 2);
            assert!(calls[0].contains("aloop=loop=2"));
            assert!(calls[0].contains("-t 8.000"));
            assert!(calls[1].contains("volume=0.3 "));
            assert!(track.path.starts_with(f.workspace.scratch_dir()));
            assert!(track.path.is_file());
            assert!(track.duration_seconds >= 8.0);
        }

        #[test]
        fn test_long_source_runs_single_pass() {
            let mut f = fixture();
            let tools = Toolchain::new(fake_ffmpeg(f.tmp.path(), &f.log), "unused");
            let probe = Ffprobe::new(fake_ffprobe(f.tmp.path(), "120.0"));
            let preparer = BackgroundMusicPreparer::new(&tools, &probe);

            let track = preparer
                .prepare(
                    &BackgroundTrackSpec {
                        source_path: f.source.clone(),
                        target_duration_seconds: 10.0,
                        volume: 1.7,
                    },
                    &mut f.workspace,
                )
                .unwrap();

            let calls = ffmpeg_calls(&f.log);
            assert_eq!(calls.len(), 1);
            // Volume clamped to 1.0
            assert!(calls[0].contains("volume=1 "));
            assert!(calls[0].contains("-t 10.000"));
            assert!(!calls[0].contains("aloop"));
            assert!(track.duration_seconds >= 10.0);
        }

        #[test]
        fn test_non_positive_target_is_invalid_input() {
            let mut f = fixture();
            let tools = Toolchain::new(fake_ffmpeg(f.tmp.path(), &f.log), "unused");
            let probe = Ffprobe::new(fake_ffprobe(f.tmp.path(), "3.0"));
            let preparer = BackgroundMusicPreparer::new(&tools, &probe);

            let err = preparer
                .prepare(
                    &BackgroundTrackSpec {
                        source_path: f.source.clone(),
                        target_duration_seconds: 0.0,
                        volume: 0.3,
                    },
                    &mut f.workspace,
                )
                .unwrap_err();
            assert!(matches!(err, RenderError::InvalidInput(_)));
            assert!(ffmpeg_calls(&f.log).is_empty());
        }

        #[test]
        fn test_missing_source_is_background_error() {
            let mut f = fixture();
            let tools = Toolchain::new(fake_ffmpeg(f.tmp.path(), &f.log), "unused");
            let probe = Ffprobe::new(fake_ffprobe(f.tmp.path(), "3.0"));
            let preparer = BackgroundMusicPreparer::new(&tools, &probe);

            let err = preparer
                .prepare(
                    &BackgroundTrackSpec {
                        source_path: f.tmp.path().join("missing.mp3"),
                        target_duration_seconds: 5.0,
                        volume: 0.3,
                    },
                    &mut f.workspace,
                )
                .unwrap_err();
            assert!(matches!(err, RenderError::BackgroundPrep { .. }));
        }

        #[test]
        fn test_ffmpeg_failure_is_background_error() {
            let mut f = fixture();
            let ffmpeg = write_script(f.tmp.path(), "ffmpeg", "echo 'bad codec' >&2\nexit 1\n");
            let tools = Toolchain::new(ffmpeg, "unused");
            let probe = Ffprobe::new(fake_ffprobe(f.tmp.path(), "3.0"));
            let preparer = BackgroundMusicPreparer::new(&tools, &probe);

            let err = preparer
                .prepare(
                    &BackgroundTrackSpec {
                        source_path: f.source.clone(),
                        target_duration_seconds: 5.0,
                        volume: 0.3,
                    },
                    &mut f.workspace,
                )
                .unwrap_err();
            assert!(matches!(err, RenderError::BackgroundPrep { .. }));
            assert!(err.to_string().contains("bad codec"));
        }
    }
}
