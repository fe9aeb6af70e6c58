use std::collections::HashSet;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub users: UsersConfiguration,
    #[serde(default)]
    pub watchers: WatchersConfiguration,
    #[serde(default)]
    pub notifiers: NotifiersConfiguration,
}

#[derive(Debug, Default, Deserialize)]
pub struct UsersConfiguration {
    /// Users that are never reported, whatever their usage.
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WatchersConfiguration {
    /// Threshold in percentage points, summed over a user's processes.
    #[serde(default)]
    pub cpu: WatcherConfiguration<f64>,
    /// Threshold in bytes of resident memory.
    #[serde(default)]
    pub memory: WatcherConfiguration<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WatcherConfiguration<T> {
    #[serde(default)]
    pub enabled: bool,
    pub threshold: Option<T>,
    /// 5-field cron expression.
    pub schedule: Option<String>,
}

/// An enabled watcher with its required settings present.
#[derive(Debug, Clone, PartialEq)]
pub struct WatcherSettings<'a, T> {
    pub threshold: T,
    pub schedule: &'a str,
}

impl<T: Copy> WatcherConfiguration<T> {
    /// Returns `None` for a disabled watcher, or an error if an enabled one
    /// is missing a setting.
    pub fn settings(&self, name: &str) -> Result<Option<WatcherSettings<'_, T>>> {
        if !self.enabled {
            return Ok(None);
        }

        let threshold = self
            .threshold
            .ok_or_else(|| eyre!("watchers.{name}.threshold is required when the {name} watcher is enabled"))?;
        let schedule = self
            .schedule
            .as_deref()
            .ok_or_else(|| eyre!("watchers.{name}.schedule is required when the {name} watcher is enabled"))?;

        Ok(Some(WatcherSettings {
            threshold,
            schedule,
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NotifiersConfiguration {
    #[serde(default)]
    pub slack: SlackConfiguration,
    #[serde(default)]
    pub log: LogConfiguration,
}

#[derive(Debug, Default, Deserialize)]
pub struct SlackConfiguration {
    #[serde(default)]
    pub enabled: bool,
    /// Bot token, usually kept in the secrets file or the environment.
    pub token: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlackCredentials {
    pub token: String,
    pub channel: String,
}

impl SlackConfiguration {
    pub fn credentials(&self) -> Result<Option<SlackCredentials>> {
        if !self.enabled {
            return Ok(None);
        }

        let token = match self.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => return Err(eyre!("notifiers.slack.token is required when slack is enabled")),
        };
        let channel = match self.channel.as_deref().map(str::trim) {
            Some(channel) if !channel.is_empty() => channel.to_string(),
            _ => return Err(eyre!("notifiers.slack.channel is required when slack is enabled")),
        };

        Ok(Some(SlackCredentials { token, channel }))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LogConfiguration {
    #[serde(default)]
    pub enabled: bool,
}

impl Configuration {
    pub fn ignored_users(&self) -> HashSet<String> {
        self.users.ignore.iter().cloned().collect()
    }
}

/// Loads `userwatch.toml`, then `userwatch.secrets.toml` if present, then
/// `USERWATCH__*` environment variables.
pub fn load() -> Result<Configuration> {
    let settings = Config::builder()
        .add_source(File::with_name("userwatch"))
        .add_source(File::new("userwatch.secrets.toml", FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix("USERWATCH")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("users.ignore"),
        )
        .build()?;

    settings.try_deserialize().map_err(From::from)
}
