//! Background retention cleanup task for expired content.
//!
//! Reads already treat expired rows as absent, so this task only reclaims
//! space. It deletes strictly `expires_at <= now` rows, which an update can
//! no longer touch, so a purge never races an update into resurrecting a code.

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::content::store::ContentStore;

/// Spawn a background task that periodically purges expired content and
/// stale reservations.
///
/// Runs `delete_expired` every `interval_secs` seconds (default 300).
pub fn spawn_retention_cleanup(store: ContentStore, interval_secs: u64) -> JoinHandle<()> {
    let interval = std::time::Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let store_clone = store.clone();
            match tokio::task::spawn_blocking(move || store_clone.delete_expired(Utc::now())).await
            {
                Ok(Ok(count)) => {
                    if count > 0 {
                        tracing::info!("Content retention cleanup: purged {} expired records", count);
                    } else {
                        tracing::debug!("Content retention cleanup: nothing expired");
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!("Content retention cleanup error: {:?}", e);
                }
                Err(e) => {
                    tracing::error!("Content retention cleanup task join error: {}", e);
                }
            }
        }
    })
}
