//! Logging subscriber for new notifications and connection status changes.

use crate::center::NotificationCenter;
use common::types::EventLevel;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Log every appended notification and every status transition until `cancel` fires.
pub async fn run_logging_subscriber(center: NotificationCenter, cancel: CancellationToken) {
    let mut notifications_rx = center.subscribe();
    let mut status_rx = center.subscribe_status();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,

            received = notifications_rx.recv() => match received {
                Ok(item) => match item.level {
                    EventLevel::Info => tracing::info!(
                        key = %item.key,
                        title = %item.title,
                        message = item.message.as_deref().unwrap_or(""),
                        fresh = item.fresh,
                        "notification"
                    ),
                    EventLevel::Warning | EventLevel::Error => tracing::warn!(
                        key = %item.key,
                        title = %item.title,
                        message = item.message.as_deref().unwrap_or(""),
                        level = ?item.level,
                        fresh = item.fresh,
                        "notification"
                    ),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "logging subscriber lagged behind notifications");
                }
                Err(RecvError::Closed) => break,
            },

            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                tracing::info!(%status, "connection status changed");
            }
        }
    }

    tracing::info!("logging subscriber shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::center::ConnectionStatus;
    use std::time::Duration;

    #[tokio::test]
    async fn test_logging_subscriber_runs_until_cancelled() {
        let center = NotificationCenter::new(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_logging_subscriber(center.clone(), cancel.clone()));

        tokio::time::sleep(Duration::from_millis(10)).await;
        center.add("Backup finished", None, EventLevel::Info);
        center.add("Disk almost full", None, EventLevel::Warning);
        center.set_status(ConnectionStatus::Connected);
        tokio::time::sleep(Duration::from_millis(20)).await;

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
