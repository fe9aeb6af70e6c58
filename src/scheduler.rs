use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Local, TimeZone};
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use tracing::{debug, error, info, trace, warn};

use crate::configuration::Configuration;
use crate::notifiers::{LogNotifier, Notifier, SlackNotifier, UsageChange};
use crate::schedule::{self, CronSchedule};
use crate::threshold;
use crate::watchers::{
    bytes_to_gigabytes, identity, CpuWatcher, Formatter, MemoryWatcher, UsageByUser, Watcher,
    WatcherKind,
};

/// A watcher bound to the schedule it runs on and how its values are displayed.
struct ScheduleEntry {
    schedule: CronSchedule,
    watcher: Box<dyn Watcher>,
    unit: &'static str,
    formatter: Formatter,
}

/// Runs watchers on their schedules and notifies about users crossing
/// thresholds.
///
/// For every watcher the scheduler remembers who was over threshold on its
/// last run. That state is replaced wholesale after each run and lives only
/// as long as the process.
pub struct Scheduler {
    entries: Vec<ScheduleEntry>,
    notifiers: Vec<Box<dyn Notifier>>,
    ignored_users: HashSet<String>,
    previous: HashMap<WatcherKind, UsageByUser>,
}

impl Scheduler {
    pub fn new(ignored_users: HashSet<String>) -> Self {
        Self {
            entries: Vec::new(),
            notifiers: Vec::new(),
            ignored_users,
            previous: HashMap::new(),
        }
    }

    pub fn from_configuration(configuration: &Configuration) -> Result<Self> {
        let mut scheduler = Self::new(configuration.ignored_users());

        if let Some(slack) = configuration.notifiers.slack.credentials()? {
            debug!(channel = %slack.channel, "adding slack notifier");
            scheduler.add_notifier(Box::new(SlackNotifier::new(slack.token, slack.channel)));
        }
        if configuration.notifiers.log.enabled {
            debug!("adding log notifier");
            scheduler.add_notifier(Box::new(LogNotifier));
        }

        if let Some(cpu) = configuration.watchers.cpu.settings("cpu")? {
            debug!(threshold = cpu.threshold, "adding cpu watcher");
            scheduler
                .register(cpu.schedule, Box::new(CpuWatcher::new(cpu.threshold)), "%", identity)
                .wrap_err("watchers.cpu.schedule")?;
        }
        if let Some(memory) = configuration.watchers.memory.settings("memory")? {
            debug!(threshold = memory.threshold, "adding memory watcher");
            scheduler
                .register(
                    memory.schedule,
                    Box::new(MemoryWatcher::new(memory.threshold)),
                    "GB",
                    bytes_to_gigabytes,
                )
                .wrap_err("watchers.memory.schedule")?;
        }

        if scheduler.entries.is_empty() {
            warn!("no watchers are enabled");
        }
        if scheduler.notifiers.is_empty() {
            warn!("no notifiers are enabled, usage changes will not be reported");
        }

        Ok(scheduler)
    }

    /// Adds a watcher running on `expression`, a 5-field cron expression.
    pub fn register(
        &mut self,
        expression: &str,
        watcher: Box<dyn Watcher>,
        unit: &'static str,
        formatter: Formatter,
    ) -> Result<()> {
        let schedule = CronSchedule::parse(expression)?;
        let kind = watcher.kind();
        if self.entries.iter().any(|entry| entry.watcher.kind() == kind) {
            bail!("{kind} is already registered");
        }

        self.entries.push(ScheduleEntry {
            schedule,
            watcher,
            unit,
            formatter,
        });
        Ok(())
    }

    pub fn add_notifier(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Users over threshold on the last run of the given watcher, if it ran.
    #[cfg(test)]
    pub fn previous(&self, kind: WatcherKind) -> Option<&UsageByUser> {
        self.previous.get(&kind)
    }

    /// Runs every watcher whose schedule selects the minute containing `now`.
    pub async fn tick(&mut self, now: &DateTime<Local>) {
        for entry in &self.entries {
            if !entry.schedule.matches(now) {
                continue;
            }

            let kind = entry.watcher.kind();
            info!(
                watcher = %kind,
                schedule = entry.schedule.expression(),
                tick = %now,
                "schedule matched"
            );

            let current: UsageByUser = match entry.watcher.watch().await {
                Ok(usage) => usage
                    .into_iter()
                    .filter(|(user, _)| !self.ignored_users.contains(user))
                    .collect(),
                Err(e) => {
                    error!(watcher = %kind, tick = %now, "watcher failed: {e:?}");
                    continue;
                }
            };

            let previous = self.previous.entry(kind).or_default();
            for change in threshold::changes(previous, &current) {
                debug!(watcher = %kind, user = %change.user, transition = ?change.transition(), "usage changed");
                let event = UsageChange {
                    watcher: kind,
                    user: &change.user,
                    previous: change.previous,
                    current: change.current,
                    unit: entry.unit,
                    formatter: entry.formatter,
                };
                dispatch(&self.notifiers, &event, now).await;
            }

            *previous = current;
        }
    }

    /// Ticks once per minute, aligned to minute boundaries, forever.
    ///
    /// A tick that overruns its minute is followed immediately by the next
    /// one; minutes that passed in between are skipped.
    pub async fn start(&mut self) {
        info!(
            watchers = self.entries.len(),
            notifiers = self.notifiers.len(),
            "scheduler started"
        );

        let mut last_minute = None;
        loop {
            let tick = Local::now();
            if claim_minute(&mut last_minute, &tick) {
                self.tick(&tick).await;
            }

            let next = schedule::next_tick(&tick);
            if let Ok(wait) = (next - Local::now()).to_std() {
                trace!("sleeping for {} seconds", wait.as_secs_f64());
                tokio::time::sleep(wait).await;
            }
        }
    }
}

/// Records the minute containing `tick` as run. Returns `false` if it
/// already was, so an early wake-up cannot run the same minute twice.
fn claim_minute<Tz: TimeZone>(last_minute: &mut Option<DateTime<Tz>>, tick: &DateTime<Tz>) -> bool {
    let minute = schedule::start_of_minute(tick);
    if last_minute.as_ref() == Some(&minute) {
        return false;
    }
    *last_minute = Some(minute);
    true
}

async fn dispatch(notifiers: &[Box<dyn Notifier>], change: &UsageChange<'_>, tick: &DateTime<Local>) {
    for notifier in notifiers {
        if let Err(e) = notifier.notify(change).await {
            warn!(
                notifier = notifier.name(),
                watcher = %change.watcher,
                user = change.user,
                tick = %tick,
                "notification failed: {e:?}"
            );
        }
    }
}
