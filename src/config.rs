// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Startup configuration of Grafana-keeper is resolved from three layers,
//! where later layers win:
//!
//! 1. Optional settings file in TOML format.
//! 2. Command-line flags.
//! 3. Credentials from `GRAFANA_USER` and `GRAFANA_PASSWORD`.
//!
//! File I/O is left to the caller to figure out.

use crate::keeper::DEFAULT_INTERVAL;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

/// Environment variable holding Grafana user name.
pub const GRAFANA_USER: &str = "GRAFANA_USER";

/// Environment variable holding Grafana password.
pub const GRAFANA_PASSWORD: &str = "GRAFANA_PASSWORD";

/// Settings file layout.
///
/// ```toml
/// [keeper]
/// grafana_url = "http://localhost:3000"
/// work_dir = "$HOME/grafana-objects"
/// interval = 30
/// ```
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct KeeperDefinition {
    /// Keeper settings.
    #[serde(default)]
    pub keeper: KeeperSettings,
}

impl FromStr for KeeperDefinition {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut definition: KeeperDefinition =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on work directory field.
        if let Some(work_dir) = definition.keeper.work_dir.take() {
            definition.keeper.work_dir = Some(expand_path(work_dir)?);
        }

        Ok(definition)
    }
}

impl Display for KeeperDefinition {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Keeper settings.
///
/// Every field is optional, since command-line flags may supply it instead.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct KeeperSettings {
    /// Base URL of Grafana server.
    pub grafana_url: Option<String>,

    /// Directory holding datasource and dashboard files.
    pub work_dir: Option<PathBuf>,

    /// Seconds between polling passes and bootstrap retries.
    pub interval: Option<u64>,
}

impl KeeperSettings {
    /// Overlay other settings on top of these settings.
    ///
    /// Fields set in `other` win.
    pub fn merge(self, other: KeeperSettings) -> Self {
        Self {
            grafana_url: other.grafana_url.or(self.grafana_url),
            work_dir: other.work_dir.or(self.work_dir),
            interval: other.interval.or(self.interval),
        }
    }
}

/// Operating mode chosen once at startup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Enforce work directory onto Grafana, then watch for changes.
    #[default]
    Keep,

    /// Save current Grafana objects to work directory and exit.
    Snapshot,
}

impl Mode {
    /// Select mode from value of save-script flag.
    ///
    /// Any value other than the literal "false" selects snapshot mode.
    pub fn from_save_script(value: &str) -> Self {
        match value {
            "false" => Self::Keep,
            _ => Self::Snapshot,
        }
    }
}

/// Fully resolved keeper configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeeperConfig {
    /// Base URL of Grafana server, with credentials if any.
    pub grafana_url: Url,

    /// Directory holding datasource and dashboard files.
    pub work_dir: PathBuf,

    /// Wait between polling passes and bootstrap retries.
    pub interval: Duration,

    /// Operating mode.
    pub mode: Mode,
}

impl KeeperConfig {
    /// Resolve configuration from settings.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Missing`] if URL or work directory is unset.
    /// - Return [`ConfigError::InvalidUrl`] if URL cannot be parsed, or does
    ///   not use the http or https scheme.
    pub fn resolve(settings: KeeperSettings, mode: Mode) -> Result<Self> {
        let raw_url = settings
            .grafana_url
            .ok_or(ConfigError::Missing("grafana-url"))?;
        let work_dir = settings.work_dir.ok_or(ConfigError::Missing("work-dir"))?;
        let grafana_url = Url::parse(&raw_url).map_err(|error| ConfigError::InvalidUrl {
            url: raw_url.clone(),
            reason: error.to_string(),
        })?;

        // INVARIANT: Only HTTP(S) URLs can reach Grafana and carry credentials.
        if !matches!(grafana_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: raw_url,
                reason: format!(
                    "unsupported scheme {:?}, expected \"http\" or \"https\"",
                    grafana_url.scheme()
                ),
            });
        }

        Ok(Self {
            grafana_url,
            work_dir,
            interval: settings
                .interval
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_INTERVAL),
            mode,
        })
    }

    /// Inject basic authentication credentials into Grafana URL.
    ///
    /// Nothing happens if user is missing or empty. Password is optional.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Credentials`] if URL cannot carry credentials.
    pub fn with_credentials(
        mut self,
        user: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let Some(user) = user.filter(|user| !user.is_empty()) else {
            return Ok(self);
        };

        let password = password.filter(|password| !password.is_empty());
        if self.grafana_url.set_username(&user).is_err()
            || self.grafana_url.set_password(password.as_deref()).is_err()
        {
            return Err(ConfigError::Credentials(self.redacted_url()));
        }

        Ok(self)
    }

    /// Inject credentials from `GRAFANA_USER` and `GRAFANA_PASSWORD`.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Credentials`] if URL cannot carry credentials.
    pub fn with_env_credentials(self) -> Result<Self> {
        let user = std::env::var(GRAFANA_USER).ok();
        let password = std::env::var(GRAFANA_PASSWORD).ok();
        self.with_credentials(user, password)
    }

    /// Grafana URL safe for logging, with password masked.
    pub fn redacted_url(&self) -> String {
        let mut url = self.grafana_url.clone();
        if url.password().is_some() {
            let _ = url.set_password(Some("***"));
        }

        url.to_string()
    }
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Required setting was given by neither flag nor settings file.
    #[error("missing parameter {0}")]
    Missing(&'static str),

    /// Grafana URL cannot be parsed.
    #[error("grafana url could not be parsed: {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Grafana URL cannot carry credentials.
    #[error("cannot set credentials on grafana url {0}")]
    Credentials(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
