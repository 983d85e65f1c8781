use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use kitabya_db::{Database, format_timestamp};

/// Background task that expires old recent-search records.
///
/// Every `interval_secs` it deletes records last touched more than
/// `retention_days` ago.
pub async fn run_cleanup_loop(db: Arc<Database>, retention_days: u32, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        let db = db.clone();
        let result = tokio::task::spawn_blocking(move || prune_recent_searches(&db, retention_days)).await;

        match result {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Cleanup: pruned {} expired recent searches", count);
                }
            }
            Ok(Err(e)) => warn!("Cleanup error: {}", e),
            Err(e) => warn!("Cleanup task panicked: {}", e),
        }
    }
}

/// Delete recent searches older than `retention_days`. Returns the count.
pub fn prune_recent_searches(db: &Database, retention_days: u32) -> anyhow::Result<usize> {
    let cutoff = chrono::Duration::try_days(i64::from(retention_days))
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| anyhow::anyhow!("retention window of {} days is out of range", retention_days))?;
    db.prune_recent_searches(&format_timestamp(cutoff))
}
