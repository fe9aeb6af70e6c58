use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use color_eyre::Result;
use sysinfo::{Process, System, Users};

mod cpu;
mod memory;

pub use cpu::CpuWatcher;
pub use memory::{bytes_to_gigabytes, MemoryWatcher};

/// Usage values keyed by username.
pub type UsageByUser = HashMap<String, f64>;

/// Converts a raw usage value into display units.
pub type Formatter = fn(f64) -> f64;

pub fn identity(usage: f64) -> f64 {
    usage
}

/// Stable identity of a watcher, used to key threshold state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherKind {
    Cpu,
    Memory,
}

impl fmt::Display for WatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatcherKind::Cpu => write!(f, "CpuWatcher"),
            WatcherKind::Memory => write!(f, "MemoryWatcher"),
        }
    }
}

/// Samples one resource and reports the users above its threshold.
#[async_trait]
pub trait Watcher: Send + Sync {
    fn kind(&self) -> WatcherKind;

    /// Returns raw usage for every user strictly above the threshold.
    async fn watch(&self) -> Result<UsageByUser>;
}

/// Sums per-process samples by owner and keeps the owners above `threshold`.
pub(crate) fn users_over_threshold<I>(samples: I, threshold: f64) -> (UsageByUser, UsageByUser)
where
    I: IntoIterator<Item = (String, f64)>,
{
    let mut totals = UsageByUser::new();
    for (user, usage) in samples {
        *totals.entry(user).or_insert(0.0) += usage;
    }

    let exceeded = totals
        .iter()
        .filter(|(_, usage)| **usage > threshold)
        .map(|(user, usage)| (user.clone(), *usage))
        .collect();

    (totals, exceeded)
}

/// Resolves the owner of a process; processes without one are skipped.
///
/// The process table must have been refreshed with user ids loaded.
pub(crate) fn owner(users: &Users, process: &Process) -> Option<String> {
    let uid = process.user_id()?;
    users.get_user_by_id(uid).map(|user| user.name().to_string())
}

/// Processes with a known owner. Linux also lists every thread as its own
/// entry carrying the whole process's memory, so thread entries are left out.
pub(crate) fn owned_processes<'a>(
    system: &'a System,
    users: &'a Users,
) -> impl Iterator<Item = (String, &'a Process)> + 'a {
    system
        .processes()
        .values()
        .filter(|process| process.thread_kind().is_none())
        .filter_map(move |process| owner(users, process).map(|user| (user, process)))
}
