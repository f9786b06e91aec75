use serde_json::{json, Value};
use uuid::Uuid;

use crate::clock;
use crate::convo::members::{ConvoFile, ConvoMember, MemberList};
use crate::db::models::same_handle;
use crate::db::{ChatMessage, ConversationSnapshot, MessageQuery, UserRecord};
use crate::delivery::DeliveryReport;
use crate::error::AppError;
use crate::services::Services;

/// Default page size for history reads.
pub const PAGE_SIZE: i64 = 50;

pub const AUTOREPLY_PREFIX: &str = "AUTOREPLY: ";

/// Result of pushing one message through the pipeline.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message: ChatMessage,
    pub deliveries: Vec<(String, DeliveryReport)>,
    pub autoreplies: usize,
}

fn unknown_conversation(cid: &str) -> AppError {
    AppError::Malformed(format!("unknown conversation {}", cid))
}

async fn publish_to_members(svc: &Services, members: &MemberList, payload: &Value) {
    let payload = payload.to_string();
    for member in members.iter() {
        svc.notify_user(&member.username, &payload).await;
    }
}

/// Create a conversation containing `creator` and `members`, returning its id.
pub async fn create(
    svc: &Services,
    creator: &str,
    members: &[String],
    name: &str,
    m_time: Option<&str>,
) -> Result<String, AppError> {
    if members.iter().all(|m| m.trim().is_empty()) {
        return Err(AppError::Malformed("conversation needs at least one member".to_string()));
    }

    let t = m_time.and_then(clock::normalize).unwrap_or_else(clock::now_iso);
    let cid = Uuid::new_v4().to_string();

    let mut list = MemberList::default();
    let mut records: Vec<UserRecord> = Vec::new();
    for handle in std::iter::once(creator).chain(members.iter().map(String::as_str)) {
        let handle = handle.trim();
        if handle.is_empty() || list.contains(handle) {
            continue;
        }
        let Some(user) = svc.store.get_user(handle).await? else {
            tracing::debug!(cid = %cid, user = handle, "skipping unknown member");
            continue;
        };
        list.insert(ConvoMember { username: user.username.clone(), read_time: t.clone(), typing: false });
        records.push(user);
    }

    let snapshot = ConversationSnapshot {
        cid: cid.clone(),
        name: name.to_string(),
        m_time: t.clone(),
        members: list,
        files: Default::default(),
    };
    svc.store.create_conversation(&snapshot).await?;

    for user in records.iter_mut() {
        user.join(&cid, &t);
        svc.store.put_user(user).await?;
    }

    let payload = json!({
        "cmd": "CreateConversation",
        "CID": cid,
        "Name": name,
        "M_time": t,
        "Members": snapshot.members.to_string_array()?,
    })
    .to_string();
    for user in &records {
        svc.fanout.publish_web(user, &payload).await;
    }

    tracing::info!(cid = %cid, members = records.len(), "conversation created");
    Ok(cid)
}

/// Add members not already present. Returns how many were added.
pub async fn add_members(svc: &Services, cid: &str, handles: &[String]) -> Result<usize, AppError> {
    let mut members = svc.store.get_members(cid).await?.ok_or_else(|| unknown_conversation(cid))?;
    let t = clock::now_iso();

    let mut added = 0;
    for handle in handles {
        if handle.trim().is_empty() || members.contains(handle) {
            continue;
        }
        let Some(mut user) = svc.store.get_user(handle).await? else {
            tracing::debug!(cid, user = %handle, "skipping unknown member");
            continue;
        };
        members.insert(ConvoMember { username: user.username.clone(), read_time: t.clone(), typing: false });
        user.join(cid, &t);
        svc.store.put_user(&user).await?;
        added += 1;
    }

    if added == 0 {
        return Ok(0);
    }

    svc.store.set_members(cid, &members).await?;
    svc.store.set_mtime(cid, &t).await?;

    let payload = json!({
        "cmd": "AddUsersToConversation",
        "CID": cid,
        "M_time": t,
        "Members": members.to_string_array()?,
    });
    publish_to_members(svc, &members, &payload).await;
    Ok(added)
}

/// Remove `handle` from the conversation. An emptied conversation is kept.
pub async fn remove_member(svc: &Services, cid: &str, handle: &str) -> Result<bool, AppError> {
    let mut members = svc.store.get_members(cid).await?.ok_or_else(|| unknown_conversation(cid))?;
    if members.remove(handle).is_none() {
        tracing::debug!(cid, user = handle, "not a member, nothing to remove");
        return Ok(false);
    }

    let t = clock::now_iso();
    svc.store.set_members(cid, &members).await?;
    svc.store.set_mtime(cid, &t).await?;

    let payload = json!({
        "cmd": "update_convo_members",
        "CID": cid,
        "Members": members.to_string_array()?,
    });
    publish_to_members(svc, &members, &payload).await;

    if let Some(mut user) = svc.store.get_user(handle).await? {
        user.leave(cid);
        svc.store.put_user(&user).await?;
        let update = user.client_json("RemoveUserFromConversation").to_string();
        svc.fanout.publish_web(&user, &update).await;
    }

    if members.is_empty() {
        tracing::info!(cid, "last member left, conversation orphaned");
    }
    Ok(true)
}

pub async fn rename(svc: &Services, cid: &str, name: &str) -> Result<(), AppError> {
    let members = svc.store.get_members(cid).await?.ok_or_else(|| unknown_conversation(cid))?;
    svc.store.set_name(cid, name).await?;

    let payload = json!({ "cmd": "update_convo_name", "CID": cid, "name": name });
    publish_to_members(svc, &members, &payload).await;
    Ok(())
}

/// Record an attachment, replacing any earlier entry with the same URL.
pub async fn add_file(svc: &Services, cid: &str, file: ConvoFile) -> Result<(), AppError> {
    let mut files = svc.store.get_files(cid).await?.ok_or_else(|| unknown_conversation(cid))?;
    files.upsert(file.clone());
    svc.store.set_files(cid, &files).await?;

    let members = svc.store.get_members(cid).await?.unwrap_or_default();
    let payload = json!({
        "cmd": "UpdateConvoFiles",
        "CID": cid,
        "f_username": file.f_username,
        "fileURL": file.file_url,
        "m_time": file.m_time,
    });
    publish_to_members(svc, &members, &payload).await;
    Ok(())
}

/// Append a message to history and deliver it to every member.
///
/// A parseable client `m_time` is used as is, and a clash with the sender's
/// existing entry at that time is refused before anything is delivered.
/// Without one the server stamps the message. Recipients come from the
/// stored member list. Each non-sender gets its unread counter bumped and
/// may trigger one autoreply per conversation.
pub async fn send_message(
    svc: &Services,
    sender: &str,
    cid: &str,
    content: &str,
    m_time: Option<&str>,
) -> Result<SendOutcome, AppError> {
    match m_time.and_then(clock::normalize) {
        Some(t) => post(svc, sender, cid, content, t, true).await,
        None => post(svc, sender, cid, content, clock::now_iso(), false).await,
    }
}

/// Send a deferred message stamped with its due time, or the first
/// millisecond after it that the author has free.
pub async fn send_scheduled(
    svc: &Services,
    sender: &str,
    cid: &str,
    content: &str,
    due: &str,
) -> Result<SendOutcome, AppError> {
    let t = clock::normalize(due).unwrap_or_else(clock::now_iso);
    post(svc, sender, cid, content, t, false).await
}

async fn post(
    svc: &Services,
    sender: &str,
    cid: &str,
    content: &str,
    mut t: String,
    exact: bool,
) -> Result<SendOutcome, AppError> {
    let convo = svc.store.get_conversation(cid).await?.ok_or_else(|| unknown_conversation(cid))?;
    let Some(author) = svc.store.get_user(sender).await? else {
        return Err(AppError::Auth(format!("no account for sender {}", sender)));
    };

    // History is keyed by (cid, author, time).
    let message = loop {
        let candidate = ChatMessage {
            cid: cid.to_string(),
            f_username: author.username.clone(),
            m_time: t.clone(),
            content: content.to_string(),
        };
        match svc.store.append_message(&candidate).await {
            Ok(()) => break candidate,
            Err(AppError::Conflict(reason)) if exact => return Err(AppError::Conflict(reason)),
            Err(AppError::Conflict(_)) => {
                t = clock::next_millisecond(&t)
                    .ok_or_else(|| AppError::Internal(format!("cannot advance timestamp {}", t)))?;
            }
            Err(e) => {
                tracing::error!(cid, "failed to append message, delivering anyway: {}", e);
                break candidate;
            }
        }
    };

    let mut deliveries = Vec::new();
    let mut recipients = Vec::new();
    let mut autoreplies: Vec<(String, String)> = Vec::new();

    for member in convo.members.iter() {
        let Some(mut user) = svc.store.get_user(&member.username).await? else {
            tracing::debug!(cid, user = %member.username, "member has no record");
            continue;
        };
        let is_self = same_handle(&user.username, sender);
        let report = svc.fanout.deliver(&user, &message, &convo.name, is_self).await;
        deliveries.push((user.username.clone(), report));

        if !is_self {
            if user.membership(cid).is_none() {
                user.join(cid, &t);
            }
            let autoreply_text = user.autoreply_message.clone();
            if let Some(entry) = user.membership_mut(cid) {
                if t > entry.m_time {
                    entry.m_time = t.clone();
                }
                entry.unread_count += 1;
                if !autoreply_text.is_empty() && entry.autoreply_sent == 0 {
                    entry.autoreply_sent = 1;
                    autoreplies.push((user.username.clone(), autoreply_text));
                }
            }
            if let Err(e) = svc.store.put_user(&user).await {
                tracing::error!(cid, user = %user.username, "failed to save membership: {}", e);
            }
        }
        recipients.push(user);
    }

    if t > convo.m_time {
        svc.store.set_mtime(cid, &t).await?;
    }

    for (replier, text) in &autoreplies {
        let reply = ChatMessage {
            cid: cid.to_string(),
            f_username: replier.clone(),
            m_time: t.clone(),
            content: format!("{}{}", AUTOREPLY_PREFIX, text),
        };
        if let Err(e) = svc.store.append_message(&reply).await {
            tracing::error!(cid, user = %replier, "failed to append autoreply: {}", e);
            continue;
        }
        let payload = reply.wire().to_string();
        for user in &recipients {
            svc.fanout.publish_web(user, &payload).await;
        }
    }

    tracing::debug!(cid, recipients = recipients.len(), autoreplies = autoreplies.len(), "message sent");
    Ok(SendOutcome { message, deliveries, autoreplies: autoreplies.len() })
}

/// Update a member's read time (forward only) and typing flag.
pub async fn update_status(
    svc: &Services,
    cid: &str,
    handle: &str,
    read_time: Option<&str>,
    typing: Option<bool>,
) -> Result<(), AppError> {
    let mut members = svc.store.get_members(cid).await?.ok_or_else(|| unknown_conversation(cid))?;
    let Some(member) = members.get_mut(handle) else {
        tracing::debug!(cid, user = handle, "status update from non-member ignored");
        return Ok(());
    };
    if let Some(t) = read_time {
        if t > member.read_time.as_str() {
            member.read_time = t.to_string();
        }
    }
    if let Some(typing) = typing {
        member.typing = typing;
    }
    let payload = json!({
        "cmd": "UpdateUserStatus",
        "CID": cid,
        "Username": member.username,
        "NewReadTime": member.read_time,
        "Typing": member.typing,
    });

    svc.store.set_members(cid, &members).await?;
    svc.store.set_mtime(cid, &clock::now_iso()).await?;
    publish_to_members(svc, &members, &payload).await;
    Ok(())
}

/// Conversation fields plus a slice of history, or `None` if unknown.
pub async fn convo_data(
    svc: &Services,
    cid: &str,
    query: MessageQuery,
    cmd: &str,
) -> Result<Option<Value>, AppError> {
    let Some(convo) = svc.store.get_conversation(cid).await? else {
        return Ok(None);
    };
    let messages = svc.store.query_messages(cid, query).await?;

    Ok(Some(json!({
        "cmd": cmd,
        "CID": cid,
        "Name": convo.name,
        "M_time": convo.m_time,
        "Members": convo.members.to_string_array()?,
        "Files": convo.files,
        "Messages": messages,
    })))
}

pub async fn update_unread_count(svc: &Services, handle: &str, cid: &str, count: u64) -> Result<bool, AppError> {
    let Some(mut user) = svc.store.get_user(handle).await? else {
        return Ok(false);
    };
    let Some(entry) = user.membership_mut(cid) else {
        return Ok(false);
    };
    entry.unread_count = count;
    svc.store.put_user(&user).await?;
    Ok(true)
}

pub async fn update_convo_mtime(svc: &Services, handle: &str, cid: &str, m_time: &str) -> Result<bool, AppError> {
    let Some(mut user) = svc.store.get_user(handle).await? else {
        return Ok(false);
    };
    let Some(entry) = user.membership_mut(cid) else {
        return Ok(false);
    };
    entry.m_time = m_time.to_string();
    svc.store.put_user(&user).await?;
    Ok(true)
}
