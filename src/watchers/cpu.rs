use async_trait::async_trait;
use color_eyre::Result;
use sysinfo::{ProcessRefreshKind, System, UpdateKind, Users, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{owned_processes, users_over_threshold, UsageByUser, Watcher, WatcherKind};

/// Sums process CPU usage per user, in percentage points of one core.
pub struct CpuWatcher {
    threshold: f64,
    system: Mutex<System>,
}

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::new()
        .with_cpu()
        .with_user(UpdateKind::OnlyIfNotSet)
}

impl CpuWatcher {
    pub fn new(threshold: f64) -> Self {
        let mut system = System::new();
        system.refresh_processes_specifics(refresh_kind());

        Self {
            threshold,
            system: Mutex::new(system),
        }
    }
}

#[async_trait]
impl Watcher for CpuWatcher {
    fn kind(&self) -> WatcherKind {
        WatcherKind::Cpu
    }

    async fn watch(&self) -> Result<UsageByUser> {
        info!("watching cpu usage");
        let mut system = self.system.lock().await;

        // cpu usage is computed between two refreshes
        system.refresh_processes_specifics(refresh_kind());
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        system.refresh_processes_specifics(refresh_kind());

        let users = Users::new_with_refreshed_list();
        let samples = owned_processes(&system, &users)
            .map(|(user, process)| (user, f64::from(process.cpu_usage())));
        let (totals, exceeded) = users_over_threshold(samples, self.threshold);

        debug!(?totals, "cpu usage by user");
        info!(
            threshold = self.threshold,
            ?exceeded,
            "users exceeding cpu threshold"
        );

        Ok(exceeded)
    }
}
