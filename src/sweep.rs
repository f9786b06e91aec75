use std::time::Duration;

use crate::clock;
use crate::convo::ops as convo_ops;
use crate::error::AppError;
use crate::services::Services;
use crate::session::scheduled::remove_mirrored;
use crate::supervisor::supervise;

/// Deliver every scheduled message due before `now`, each stamped with its
/// own due time. Returns how many were sent.
///
/// Rows are claimed by deleting them first, so a crash between the delete
/// and the send loses that message.
pub async fn run_sweep(svc: &Services, now: &str) -> Result<usize, AppError> {
    let mut due = svc.store.take_due_scheduled(now).await?;
    due.sort_by(|a, b| a.m_time.cmp(&b.m_time));

    let mut sent = 0;
    for item in due {
        match convo_ops::send_scheduled(svc, &item.f_username, &item.cid, &item.content, &item.m_time).await {
            Ok(_) => sent += 1,
            Err(e) => tracing::error!(
                cid = %item.cid,
                user = %item.f_username,
                "scheduled message dropped: {}", e
            ),
        }
        if let Err(e) = remove_mirrored(svc, &item.f_username, &item.cid, &item.m_time, &item.content).await {
            tracing::error!(user = %item.f_username, "failed to clear scheduled mirror: {}", e);
        }
    }
    Ok(sent)
}

/// Spawn the periodic sweep under the supervisor.
pub fn spawn_sweep(svc: Services, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        supervise("scheduled-sweep", || {
            let svc = svc.clone();
            async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    match run_sweep(&svc, &clock::now_iso()).await {
                        Ok(0) => {}
                        Ok(n) => tracing::debug!("📬 Delivered {} scheduled messages", n),
                        Err(e) => tracing::error!("❌ Scheduled sweep failed: {}", e),
                    }
                }
            }
        })
        .await;
    })
}
