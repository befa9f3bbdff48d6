use anyhow::{bail, Context, Result};
use log::{warn, LevelFilter};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

use crate::auth::Token;

pub const DEFAULT_CHECK_INTERVAL: &str = "*/1 * * * *";

const CONFIG_CANDIDATES: [&str; 4] = [
    "gitlab-retrier.toml",
    "gitlab-retrier.json",
    "gitlab-retrier.yaml",
    "gitlab-retrier.yml",
];

/// Log verbosity. Lower variants are louder: `Error` always logs,
/// `Debug` logs everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::Error,
            // `info` also lets warnings through
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => bail!("unknown log level '{other}' (expected error, info or debug)"),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Info => "info",
            Self::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// A fully validated, immutable configuration snapshot.
///
/// Snapshots are never mutated; a reload builds a new one and swaps it in.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub gitlab_url: String,
    pub token: Token,
    pub project_id: String,
    pub pipeline_ids: Vec<u64>,
    pub check_interval: String,
    pub log_level: LogLevel,
}

/// Configuration file structure.
///
/// Every key is optional; environment variables take precedence over the
/// file and validation happens once both layers are merged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    #[serde(default)]
    pub gitlab: GitLabFileConfig,

    /// Cron expression controlling how often pipelines are checked
    pub check_interval: Option<String>,

    /// One of `error`, `info`, `debug`
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabFileConfig {
    /// GitLab instance base URL
    pub url: Option<String>,

    /// GitLab personal or project access token
    pub token: Option<String>,

    /// Numeric project ID or full project path (e.g. 'group/project')
    pub project_id: Option<ProjectId>,

    /// Pipelines to watch
    pub pipeline_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ProjectId {
    Numeric(u64),
    Path(String),
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{id}"),
            Self::Path(path) => f.write_str(path),
        }
    }
}

impl FileConfig {
    /// Load the configuration file.
    ///
    /// Searches in this order:
    /// 1. Specified path
    /// 2. ./gitlab-retrier.toml
    /// 3. ./gitlab-retrier.json
    /// 4. ./gitlab-retrier.yaml
    /// 5. ./gitlab-retrier.yml
    ///
    /// Returns an empty file layer if nothing is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        for candidate in &CONFIG_CANDIDATES {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}

impl Config {
    /// Merge the file layer with environment lookups and validate the result.
    ///
    /// Empty environment values count as unset.
    pub fn resolve<F>(file: FileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let gitlab_url = env("GITLAB_URL")
            .or(file.gitlab.url)
            .context("GITLAB_URL is required (environment, .env file or [gitlab] url)")?;
        Url::parse(&gitlab_url).with_context(|| format!("Invalid GITLAB_URL '{gitlab_url}'"))?;

        let token = env("GITLAB_TOKEN")
            .or(file.gitlab.token)
            .filter(|token| !token.trim().is_empty())
            .context("GITLAB_TOKEN is required (environment, .env file or [gitlab] token)")?;

        let project_id = env("GITLAB_PROJECT_ID")
            .or_else(|| file.gitlab.project_id.map(|id| id.to_string()))
            .filter(|id| !id.is_empty())
            .context(
                "GITLAB_PROJECT_ID is required (environment, .env file or [gitlab] project-id)",
            )?;

        let pipeline_ids = match env("PIPELINE_IDS") {
            Some(raw) => parse_pipeline_ids(&raw),
            None => file
                .gitlab
                .pipeline_ids
                .context("PIPELINE_IDS is required (environment, .env file or [gitlab] pipeline-ids)")?
                .into_iter()
                .filter_map(|id| positive_id(&id.to_string()))
                .collect(),
        };

        if pipeline_ids.is_empty() {
            bail!("PIPELINE_IDS must contain at least one valid pipeline ID");
        }

        let check_interval = env("CHECK_INTERVAL")
            .or(file.check_interval)
            .unwrap_or_else(|| DEFAULT_CHECK_INTERVAL.to_string());

        let log_level = match env("LOG_LEVEL").or(file.log_level) {
            Some(raw) => raw.parse().context("Invalid LOG_LEVEL")?,
            None => LogLevel::default(),
        };

        Ok(Self {
            gitlab_url,
            token: Token::from(token),
            project_id,
            pipeline_ids,
            check_interval: check_interval.trim().to_string(),
            log_level,
        })
    }
}

/// Parse a comma-separated list of pipeline IDs, skipping entries that are
/// not positive integers.
pub fn parse_pipeline_ids(raw: &str) -> Vec<u64> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(positive_id)
        .collect()
}

fn positive_id(entry: &str) -> Option<u64> {
    match entry.parse::<u64>() {
        Ok(id) if id > 0 => Some(id),
        _ => {
            warn!("Ignoring invalid pipeline ID '{entry}'");
            None
        }
    }
}

/// Knows where configuration comes from, so it can be read again on reload.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(config_path: Option<PathBuf>, env_file: Option<PathBuf>) -> Self {
        Self {
            config_path,
            env_file,
        }
    }

    /// Initial load. Values already present in the process environment win
    /// over the `.env` file.
    pub fn load(&self) -> Result<Config> {
        self.load_dotenv(false)?;
        self.resolve()
    }

    /// Reload. The `.env` file is re-read and overrides the process
    /// environment, so edits to it take effect.
    pub fn reload(&self) -> Result<Config> {
        self.load_dotenv(true)?;
        self.resolve()
    }

    fn resolve(&self) -> Result<Config> {
        let file = FileConfig::load(self.config_path.as_deref())?;
        Config::resolve(file, |key| std::env::var(key).ok())
    }

    fn load_dotenv(&self, override_existing: bool) -> Result<()> {
        let loaded = match (&self.env_file, override_existing) {
            (Some(path), false) => dotenvy::from_path(path),
            (Some(path), true) => dotenvy::from_path_override(path),
            (None, false) => dotenvy::dotenv().map(|_| ()),
            (None, true) => dotenvy::dotenv_override().map(|_| ()),
        };

        match loaded {
            Ok(()) => Ok(()),
            // A missing default .env is fine; a missing explicit one is not
            Err(e) if e.not_found() && self.env_file.is_none() => Ok(()),
            Err(e) => Err(e).context("Failed to load .env file"),
        }
    }
}
