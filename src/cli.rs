use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::batch;
use crate::cadence::Cadence;
use crate::config::{Config, ConfigLoader};
use crate::logging;
use crate::providers;
use crate::retrier::PipelineRetrier;
use crate::scheduler::{format_ids, Exit, Scheduler};
use crate::signals;

#[derive(Parser)]
#[command(name = "gitlab-retrier")]
#[command(author, version, about = "Watches GitLab pipelines and retries failed jobs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (defaults to ./gitlab-retrier.{toml,json,yaml,yml})
    #[arg(short, long, global = true, env = "GITLAB_RETRIER_CONFIG")]
    config: Option<PathBuf>,

    /// .env file to load (defaults to ./.env when present)
    #[arg(short, long, global = true)]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Copy, Default)]
enum Commands {
    /// Check immediately, then keep checking on the configured schedule
    #[default]
    Run,
    /// Run a single check cycle and exit
    Once,
    /// Load and validate configuration without contacting GitLab
    Validate,
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        let loader = ConfigLoader::new(self.config.clone(), self.env_file.clone());
        let config = loader.load().context("Failed to load configuration")?;
        logging::apply(config.log_level);

        match self.command.unwrap_or_default() {
            Commands::Run => Self::execute_run(loader, config).await,
            Commands::Once => Self::execute_once(config).await,
            Commands::Validate => Self::execute_validate(&config),
        }
    }

    async fn execute_run(loader: ConfigLoader, config: Config) -> Result<()> {
        log_startup(&config);

        let scheduler =
            Scheduler::initialize(config, Box::new(loader), Arc::new(providers::connect))
                .context("Invalid configuration")?;

        let (tx, rx) = mpsc::channel(8);
        if let Err(e) = signals::listen(tx) {
            error!("Failed to install signal handlers: {e}");
        }

        exit_result(scheduler.run(rx).await)
    }

    async fn execute_once(config: Config) -> Result<()> {
        log_startup(&config);

        let client = providers::connect(&config)?;
        let retrier = PipelineRetrier::new(client, config.project_id.clone());

        let outcome = batch::check_and_retry_all_pipelines(&retrier, &config.pipeline_ids).await;
        info!(
            "Check completed: {} pipeline(s), {} unfinished",
            outcome.len(),
            outcome.unfinished()
        );

        Ok(())
    }

    fn execute_validate(config: &Config) -> Result<()> {
        let cadence = Cadence::parse(&config.check_interval)?;

        println!("GitLab URL:     {}", config.gitlab_url);
        println!("Token:          {}", config.token);
        println!("Project ID:     {}", config.project_id);
        println!("Pipeline IDs:   {}", format_ids(&config.pipeline_ids));
        println!("Check interval: {}", cadence.expression());
        if let Some(next) = cadence.next_after(chrono::Local::now()) {
            println!("Next check:     {}", next.to_rfc3339());
        }
        println!("Log level:      {}", config.log_level);

        Ok(())
    }
}

fn exit_result(exit: Exit) -> Result<()> {
    match exit {
        Exit::Shutdown => Ok(()),
        Exit::Fatal => bail!("Initial check failed"),
    }
}

fn log_startup(config: &Config) {
    info!("GitLab Pipeline Retrier started");
    info!("GitLab URL: {}", config.gitlab_url);
    info!("Project ID: {}", config.project_id);
    info!("Monitoring pipeline IDs: {}", format_ids(&config.pipeline_ids));
    info!("Check interval: {}", config.check_interval);
    info!("Log level: {}", config.log_level);
}
