use serde_json::{json, Value};

use crate::clock;
use crate::db::{ScheduledEntry, ScheduledMessage};
use crate::error::AppError;
use crate::services::Services;
use crate::session::command::ScheduledCmd;

pub async fn add(svc: &Services, handle: &str, cmd: ScheduledCmd, raw: &Value) -> Result<String, AppError> {
    let time = clock::normalize(&cmd.time)
        .ok_or_else(|| AppError::Malformed(format!("invalid schedule time {:?}", cmd.time)))?;
    let Some(mut user) = svc.store.get_user(handle).await? else {
        return Ok(String::new());
    };

    // The store keeps one row per (author, time); mirror that.
    user.scheduled_messages.retain(|s| s.time != time);
    user.scheduled_messages.push(ScheduledEntry {
        cid: cmd.cid.clone(),
        time: time.clone(),
        content: cmd.content.clone(),
    });
    svc.store.put_user(&user).await?;
    svc.fanout.publish_web(&user, &raw.to_string()).await;

    svc.store
        .add_scheduled(&ScheduledMessage {
            cid: cmd.cid,
            f_username: user.username.clone(),
            content: cmd.content,
            m_time: time,
        })
        .await?;
    Ok(String::new())
}

/// Drop the mirrored entry matching CID, time and content. Returns whether
/// the user record changed.
pub async fn remove_mirrored(svc: &Services, handle: &str, cid: &str, time: &str, content: &str) -> Result<bool, AppError> {
    let Some(mut user) = svc.store.get_user(handle).await? else {
        return Ok(false);
    };
    let before = user.scheduled_messages.len();
    user.scheduled_messages
        .retain(|s| !(s.cid == cid && s.time == time && s.content == content));
    if user.scheduled_messages.len() == before {
        return Ok(false);
    }
    svc.store.put_user(&user).await?;
    let payload = user.client_json("RemoveScheduledMessage").to_string();
    svc.fanout.publish_web(&user, &payload).await;
    Ok(true)
}

pub async fn remove(svc: &Services, handle: &str, cmd: ScheduledCmd) -> Result<String, AppError> {
    let time = clock::normalize(&cmd.time).unwrap_or(cmd.time);
    remove_mirrored(svc, handle, &cmd.cid, &time, &cmd.content).await?;

    let author = match svc.store.get_user(handle).await? {
        Some(user) => user.username,
        None => handle.to_string(),
    };
    svc.store.delete_scheduled(&author, &time).await?;
    Ok(String::new())
}

pub async fn remove_all(svc: &Services, handle: &str) -> Result<String, AppError> {
    let Some(mut user) = svc.store.get_user(handle).await? else {
        return Ok(String::new());
    };
    user.scheduled_messages.clear();
    svc.store.put_user(&user).await?;

    let payload = json!({ "cmd": "RemoveAllScheduledMessages" }).to_string();
    svc.fanout.publish_web(&user, &payload).await;

    let removed = svc.store.delete_all_scheduled(&user.username).await?;
    tracing::debug!(user = %user.username, removed, "scheduled messages cleared");
    Ok(String::new())
}
