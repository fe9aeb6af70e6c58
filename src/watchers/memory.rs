use async_trait::async_trait;
use color_eyre::Result;
use sysinfo::{ProcessRefreshKind, System, UpdateKind, Users};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{owned_processes, users_over_threshold, UsageByUser, Watcher, WatcherKind};

const BYTES_PER_GIGABYTE: f64 = 1024.0 * 1024.0 * 1024.0;

/// Converts bytes to gigabytes, rounded to two decimals.
pub fn bytes_to_gigabytes(bytes: f64) -> f64 {
    (bytes / BYTES_PER_GIGABYTE * 100.0).round() / 100.0
}

/// Sums resident memory (bytes) per user.
pub struct MemoryWatcher {
    threshold: u64,
    system: Mutex<System>,
}

impl MemoryWatcher {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            system: Mutex::new(System::new()),
        }
    }
}

#[async_trait]
impl Watcher for MemoryWatcher {
    fn kind(&self) -> WatcherKind {
        WatcherKind::Memory
    }

    async fn watch(&self) -> Result<UsageByUser> {
        info!("watching memory usage");
        let mut system = self.system.lock().await;
        system.refresh_processes_specifics(
            ProcessRefreshKind::new()
                .with_memory()
                .with_user(UpdateKind::OnlyIfNotSet),
        );

        let users = Users::new_with_refreshed_list();
        let samples = owned_processes(&system, &users)
            .map(|(user, process)| (user, process.memory() as f64));
        let (totals, exceeded) = users_over_threshold(samples, self.threshold as f64);

        debug!(?totals, "memory usage by user");
        let threshold_gb = bytes_to_gigabytes(self.threshold as f64);
        info!(threshold_gb, ?exceeded, "users exceeding memory threshold");

        Ok(exceeded)
    }
}

#[cfg(test)]
mod tests {
    use crate::watchers::tests::current_user;

    use super::*;

    #[test]
    fn formats_bytes_as_gigabytes() {
        assert_eq!(bytes_to_gigabytes(0.0), 0.0);
        assert_eq!(bytes_to_gigabytes(BYTES_PER_GIGABYTE), 1.0);
        assert_eq!(bytes_to_gigabytes(12.0 * BYTES_PER_GIGABYTE), 12.0);
        assert_eq!(bytes_to_gigabytes(1.5 * BYTES_PER_GIGABYTE), 1.5);
        assert_eq!(bytes_to_gigabytes(1_234_567_890.0), 1.15);
    }

    #[tokio::test]
    async fn reports_the_current_user() {
        let watcher = MemoryWatcher::new(0);
        let exceeded = watcher.watch().await.unwrap();

        let user = current_user();
        assert!(
            exceeded.get(&user).is_some_and(|usage| *usage > 0.0),
            "{user} missing from {exceeded:?}"
        );
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn threads_do_not_multiply_memory() {
        let (release, hold) = std::sync::mpsc::channel::<()>();
        let hold = std::sync::Arc::new(std::sync::Mutex::new(hold));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let hold = hold.clone();
                std::thread::spawn(move || {
                    let _ = hold.lock().unwrap().recv();
                })
            })
            .collect();

        let user = current_user();
        let watcher = MemoryWatcher::new(0);
        let total = watcher.watch().await.unwrap()[&user];

        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessRefreshKind::new()
                .with_memory()
                .with_user(UpdateKind::OnlyIfNotSet),
        );
        let users = Users::new_with_refreshed_list();
        let by_process: f64 = owned_processes(&system, &users)
            .filter(|(owner, _)| *owner == user)
            .map(|(_, process)| process.memory() as f64)
            .sum();
        let with_threads: f64 = system
            .processes()
            .values()
            .filter(|process| crate::watchers::owner(&users, process).as_ref() == Some(&user))
            .map(|process| process.memory() as f64)
            .sum();

        // eight live threads each carry this process's whole resident set
        let inflation = with_threads - by_process;
        assert!(inflation > 0.0);
        assert!(
            (total - by_process).abs() < inflation / 2.0,
            "total {total}, per process {by_process}, with threads {with_threads}"
        );

        drop(release);
        for thread in threads {
            thread.join().unwrap();
        }
    }
}
