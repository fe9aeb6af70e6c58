use async_trait::async_trait;
use color_eyre::Result;

use crate::watchers::{Formatter, WatcherKind};

mod log;
mod slack;

pub use self::log::LogNotifier;
pub use self::slack::SlackNotifier;

/// A user's usage moving across, or further beyond, a watcher's threshold.
#[derive(Debug, Clone)]
pub struct UsageChange<'a> {
    pub watcher: WatcherKind,
    pub user: &'a str,
    /// Raw usage on the previous run, `None` if the user was under threshold.
    pub previous: Option<f64>,
    /// Raw usage on this run, `None` if the user is now under threshold.
    pub current: Option<f64>,
    pub unit: &'a str,
    pub formatter: Formatter,
}

impl UsageChange<'_> {
    /// Renders the change as a plain text message, in display units.
    pub fn message(&self) -> String {
        let mut message = format!("Watcher: {}\nUser: {}\n", self.watcher, self.user);
        self.write_usage(&mut message, "Previous Usage", self.previous);
        self.write_usage(&mut message, "Current Usage", self.current);
        message
    }

    fn write_usage(&self, message: &mut String, label: &str, usage: Option<f64>) {
        let line = match usage {
            Some(usage) => format!("{label}: {:.2} {}\n", (self.formatter)(usage), self.unit),
            None => format!("{label}: N/A\n"),
        };
        message.push_str(&line);
    }
}

/// Delivers usage changes to an external channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, change: &UsageChange<'_>) -> Result<()>;
}
