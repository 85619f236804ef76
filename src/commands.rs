use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use anyhow::Result;

use stillcast::config::Config;
use stillcast::events::{BatchEvent, ChannelSink};
use stillcast::logging::JsonLog;
use stillcast::media::probe::{Ffprobe, MediaProbe, StreamKind};
use stillcast::project::{Project, ProjectStore};
use stillcast::render::batch::{
    BatchOrchestrator, BatchRequest, BatchResult, JobOutcome, RenderSession,
};
use stillcast::render::cancel::CancelToken;
use stillcast::render::workspace::clear_scratch_dir;

use crate::cli::{ProjectCommand, RenderArgs};

/// Turn CLI arguments into a batch request. Explicit `--background` and
/// `--volume` override what a project stores.
pub fn build_request(config: &Config, args: &RenderArgs) -> Result<BatchRequest> {
    let output_root = args
        .output
        .clone()
        .unwrap_or_else(|| config.output.directory.clone());

    let mut request = match &args.project {
        Some(id) => ProjectStore::new(&config.projects.directory)
            .load(id)?
            .render_inputs()
            .into_request(output_root),
        None => BatchRequest {
            voice_tracks: args.voice.clone(),
            images: args.image.clone(),
            output_root,
            background: None,
            background_volume: config.background.default_volume,
        },
    };

    if let Some(background) = &args.background {
        request.background = Some(background.clone());
    }
    if let Some(volume) = args.volume {
        if !(0.0..=1.0).contains(&volume) {
            anyhow::bail!("--volume must be between 0.0 and 1.0, got {}", volume);
        }
        request.background_volume = volume;
    }
    Ok(request)
}

/// Run a batch on a worker thread and report its events on this one.
pub fn render(config: &Config, args: &RenderArgs, cancel: CancelToken) -> Result<BatchResult> {
    let request = build_request(config, args)?;

    let mut session = RenderSession::from_config(config);
    session.cancel = cancel;
    if args.keep_temp {
        session.cleanup_after_batch = false;
    }

    let json_log = if config.logging.json_log {
        match JsonLog::new(&config.logging.directory) {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::warn!(
                    "JSON log disabled, cannot use {}: {}",
                    config.logging.directory.display(),
                    e
                );
                None
            }
        }
    } else {
        None
    };

    let (sender, receiver) = mpsc::channel();
    let handle = BatchOrchestrator::new(session).spawn(request, ChannelSink::new(sender))?;

    let mut last_percent = None;
    for event in receiver {
        match event {
            BatchEvent::Progress(progress) => {
                let overall = progress.overall_percent();
                if last_percent != Some((progress.job_index, overall)) {
                    last_percent = Some((progress.job_index, overall));
                    print!(
                        "\rVideo {}/{}: {:>3}%  (overall {:>3}%)",
                        progress.job_index + 1,
                        progress.total_jobs,
                        progress.percent,
                        overall
                    );
                    let _ = std::io::stdout().flush();
                }
            }
            BatchEvent::Log(record) => {
                if let Some(log) = &json_log {
                    if let Err(e) = log.append(&record) {
                        tracing::warn!("Failed to append to JSON log: {}", e);
                    }
                }
            }
            BatchEvent::Complete { success, detail } => {
                if last_percent.is_some() {
                    println!();
                }
                if success {
                    println!("Done. Output folder: {}", detail);
                } else {
                    println!("Render failed: {}", detail);
                }
            }
        }
    }

    let result = handle
        .join()
        .map_err(|_| anyhow::anyhow!("Render worker panicked"))?;
    print_summary(&result);
    Ok(result)
}

fn print_summary(result: &BatchResult) {
    if result.jobs.is_empty() {
        return;
    }
    println!(
        "{} of {} videos rendered",
        result.rendered_count(),
        result.jobs.len()
    );
    for job in result.failed_jobs() {
        if let JobOutcome::Failed { stage, error } = &job.outcome {
            println!("  {} failed while {:?}: {}", job.output_name, stage, error);
        }
    }
}

pub fn probe(config: &Config, file: &Path, expected: StreamKind) -> Result<()> {
    let metadata = Ffprobe::new(&config.tools.ffprobe).probe(file, expected)?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

fn print_project(project: &Project) {
    println!("{} {}", project.id, project.name);
    println!("  Created:          {}", project.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Background volume: {:.2}", project.settings.bg_music_volume);
    for (label, files) in [
        ("Audio", &project.files.audio),
        ("Images", &project.files.images),
        ("Background music", &project.files.background_music),
    ] {
        println!("  {} ({}):", label, files.len());
        for f in files {
            println!("    {}", f.display());
        }
    }
}

pub fn project(config: &Config, action: ProjectCommand) -> Result<()> {
    let store = ProjectStore::new(&config.projects.directory);
    match action {
        ProjectCommand::New { name } => {
            let project = store.create(&name)?;
            println!("Created project {}", project.id);
        }
        ProjectCommand::List => {
            let projects = store.list()?;
            if projects.is_empty() {
                println!("No projects in {}", store.root().display());
            }
            for p in projects {
                println!(
                    "{}  {:<30} {} audio, {} images",
                    p.id,
                    p.name,
                    p.files.audio.len(),
                    p.files.images.len()
                );
            }
        }
        ProjectCommand::Show { id } => print_project(&store.load(&id)?),
        ProjectCommand::Delete { id } => {
            if store.delete(&id)? {
                println!("Deleted project {}", id);
            } else {
                println!("No project {}", id);
            }
        }
        ProjectCommand::Add { id, kind, files } => {
            let mut project = store.load(&id)?;
            for file in files {
                let file = std::fs::canonicalize(&file).unwrap_or(file);
                if store.add_file(&mut project, kind, &file)? {
                    println!("Added {}", file.display());
                } else {
                    println!("Already in project: {}", file.display());
                }
            }
        }
        ProjectCommand::Remove { id, file } => {
            let mut project = store.load(&id)?;
            let file = std::fs::canonicalize(&file).unwrap_or(file);
            if store.remove_file(&mut project, &file)? {
                println!("Removed {}", file.display());
            } else {
                println!("Not in project: {}", file.display());
            }
        }
        ProjectCommand::Volume { id, volume } => {
            let mut project = store.load(&id)?;
            let stored = store.set_volume(&mut project, volume)?;
            println!("Background volume set to {:.2}", stored);
        }
    }
    Ok(())
}

pub fn clean(config: &Config) -> Result<()> {
    let removed = clear_scratch_dir(&config.workspace.scratch_dir)?;
    println!(
        "Removed {} files from {}",
        removed,
        config.workspace.scratch_dir.display()
    );
    Ok(())
}

/// Write the commented default config. Never overwrites an existing file.
pub fn init_config(path: Option<PathBuf>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p,
        None => Config::platform_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
    };
    if path.exists() {
        anyhow::bail!("Config file already exists: {}", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, Config::generate_default_commented())?;
    println!("Wrote {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.output.directory = tmp.path().join("videos");
        config.projects.directory = tmp.path().join("projects");
        config.workspace.scratch_dir = tmp.path().join("temp");
        config.logging.directory = tmp.path().join("logs");
        config
    }

    #[test]
    fn test_build_request_from_explicit_args() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let args = RenderArgs {
            voice: vec![PathBuf::from("a.mp3")],
            image: vec![PathBuf::from("1.jpg"), PathBuf::from("2.jpg")],
            ..Default::default()
        };

        let request = build_request(&config, &args).unwrap();
        assert_eq!(request.output_root, tmp.path().join("videos"));
        assert_eq!(request.images.len(), 2);
        assert_eq!(request.background, None);
        assert_eq!(request.background_volume, 0.3);
    }

    #[test]
    fn test_build_request_from_project_with_overrides() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let store = ProjectStore::new(&config.projects.directory);
        let project = store.create("demo").unwrap();

        let args = RenderArgs {
            project: Some(project.id.clone()),
            background: Some(PathBuf::from("bed.mp3")),
            volume: Some(0.8),
            output: Some(tmp.path().join("elsewhere")),
            ..Default::default()
        };
        let request = build_request(&config, &args).unwrap();
        assert_eq!(request.background, Some(PathBuf::from("bed.mp3")));
        assert_eq!(request.background_volume, 0.8);
        assert_eq!(request.output_root, tmp.path().join("elsewhere"));
    }

    #[test]
    fn test_build_request_rejects_bad_volume_and_unknown_project() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let args = RenderArgs {
            volume: Some(1.5),
            ..Default::default()
        };
        assert!(build_request(&config, &args).is_err());

        let args = RenderArgs {
            project: Some("20990101_000000".into()),
            ..Default::default()
        };
        assert!(build_request(&config, &args).is_err());
    }

    #[test]
    fn test_render_with_no_inputs_fails_without_output_folder() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let result = render(&config, &RenderArgs::default(), CancelToken::new()).unwrap();
        assert!(!result.succeeded);
        assert!(result.output_folder.is_none());
        assert!(!tmp.path().join("videos").exists());
        // The abort is still recorded in the JSON log
        assert!(std::fs::read_dir(tmp.path().join("logs")).unwrap().count() > 0);
    }

    #[test]
    fn test_init_config_refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("conf").join("config.toml");

        init_config(Some(path.clone())).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(toml::from_str::<Config>(&written).is_ok());

        let err = init_config(Some(path)).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_clean_missing_scratch_dir() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        clean(&config).unwrap();
    }

    #[test]
    fn test_project_commands_round_trip() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let voice = tmp.path().join("a.mp3");
        std::fs::write(&voice, b"voice").unwrap();

        project(&config, ProjectCommand::New { name: "demo".into() }).unwrap();
        let store = ProjectStore::new(&config.projects.directory);
        let id = store.list().unwrap()[0].id.clone();

        project(
            &config,
            ProjectCommand::Add {
                id: id.clone(),
                kind: stillcast::project::FileKind::Audio,
                files: vec![voice.clone()],
            },
        )
        .unwrap();
        project(
            &config,
            ProjectCommand::Volume {
                id: id.clone(),
                volume: 2.0,
            },
        )
        .unwrap();

        let loaded = store.load(&id).unwrap();
        assert_eq!(loaded.files.audio.len(), 1);
        assert_eq!(loaded.settings.bg_music_volume, 1.0);

        project(&config, ProjectCommand::Delete { id: id.clone() }).unwrap();
        assert!(store.load(&id).is_err());
    }
}
