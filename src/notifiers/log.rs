use async_trait::async_trait;
use color_eyre::Result;
use tracing::info;

use super::{Notifier, UsageChange};

/// Writes usage changes to the application log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, change: &UsageChange<'_>) -> Result<()> {
        info!(
            watcher = %change.watcher,
            user = change.user,
            "usage changed:\n{}",
            change.message()
        );
        Ok(())
    }
}
