mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use stillcast::config::Config;
use stillcast::render::cancel::CancelToken;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stillcast=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    // init-config runs without loading, so a broken config can be regenerated
    let load_config = || -> anyhow::Result<Config> {
        let (config, path) = Config::load_with_path(cli.config.as_deref())?;
        if let Some(path) = &path {
            tracing::info!("Using config {}", path.display());
        }
        Ok(config)
    };

    match cli.command {
        Commands::Render(args) => {
            let config = load_config()?;
            let cancel = CancelToken::new();
            let cancel_ctrlc = cancel.clone();
            ctrlc::set_handler(move || {
                tracing::info!("Ctrl+C received, cancelling render");
                cancel_ctrlc.cancel();
            })?;

            let result = commands::render(&config, &args, cancel)?;
            if !result.succeeded {
                anyhow::bail!("Render did not complete");
            }
            let failed = result.failed_jobs().len();
            if args.strict && failed > 0 {
                anyhow::bail!("{} of {} videos failed", failed, result.jobs.len());
            }
            Ok(())
        }
        Commands::Probe { file, expect } => {
            commands::probe(&load_config()?, &file, expect.into())
        }
        Commands::Project { action } => commands::project(&load_config()?, action),
        Commands::Clean => commands::clean(&load_config()?),
        Commands::InitConfig { path } => commands::init_config(path).map(|_| ()),
    }
}
