// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use grafana_keeper::{
    config::{KeeperDefinition, KeeperSettings},
    path::default_settings_file,
    GrafanaClient, Keeper, KeeperConfig, Mode, RetryPolicy, WorkDir,
};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::{fs::read_to_string, path::PathBuf, process::exit, time::Duration};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "grafana-keeper [options] --grafana-url <url> --work-dir <path>",
    version
)]
struct Cli {
    /// Grafana server URL, e.g., "http://localhost:3000".
    #[arg(long, value_name = "url")]
    pub grafana_url: Option<String>,

    /// Directory to load Grafana objects from and save them to.
    #[arg(long, value_name = "path")]
    pub work_dir: Option<PathBuf>,

    /// Save all Grafana objects to work directory and exit.
    ///
    /// Any value other than "false" turns save-script mode on.
    #[arg(
        long,
        value_name = "bool",
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    pub save_script: String,

    /// Seconds between checks for changed objects.
    #[arg(long, value_name = "secs")]
    pub interval: Option<u64>,

    /// Path to settings file.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let mode = Mode::from_save_script(&self.save_script);
        let flags = KeeperSettings {
            grafana_url: self.grafana_url,
            work_dir: self.work_dir,
            interval: self.interval,
        };
        let settings = load_settings(self.config)?.merge(flags);
        let config = KeeperConfig::resolve(settings, mode)?.with_env_credentials()?;
        info!("grafana-url: {}", config.redacted_url());
        info!("work-dir: {}", config.work_dir.display());

        let client = GrafanaClient::new(config.grafana_url.clone())?;
        let keeper = Keeper::new(client, WorkDir::new(&config.work_dir))
            .with_retry(RetryPolicy::constant(config.interval));

        match config.mode {
            Mode::Snapshot => run_snapshot(keeper).await,
            Mode::Keep => Ok(keeper.keep().await?),
        }
    }
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer().compact().with_target(false);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    info!("grafana-keeper started");
    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    info!("grafana-keeper finished ok");
    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn load_settings(path: Option<PathBuf>) -> Result<KeeperSettings> {
    // INVARIANT: Explicit settings file must exist, default one may be absent.
    let path = match path {
        Some(path) => path,
        None => match default_settings_file() {
            Ok(path) if path.exists() => path,
            _ => return Ok(KeeperSettings::default()),
        },
    };

    let data = read_to_string(&path)
        .with_context(|| format!("failed to read settings file {:?}", path.display()))?;
    let definition: KeeperDefinition = data.parse()?;

    Ok(definition.keeper)
}

async fn run_snapshot(keeper: Keeper) -> Result<()> {
    info!("save-script mode on");
    let bar = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {spinner:.yellow}  saved {pos} objects  {msg}",
    )?;
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(100));

    let saved = keeper.with_progress(bar).snapshot().await?;
    info!("saved {} objects to work directory", saved.len());

    Ok(())
}
