//! Mailbox commands: listing, per-email flags, drafts and emptying the trash.

use serde_json::json;

use crate::clock;
use crate::db::{EmailFlag, EmailKey, EmailRow};
use crate::error::AppError;
use crate::services::Services;
use crate::session::command::{MailboxCmd, UpdateEmailCmd};

fn result(cmd: &str, ok: bool) -> String {
    json!({ "cmd": cmd, "Success": ok }).to_string()
}

/// Canonical form when parseable, otherwise the client's text unchanged.
fn canonical(ts: &str) -> String {
    clock::normalize(ts).unwrap_or_else(|| ts.to_string())
}

fn change_time(cmd: &UpdateEmailCmd) -> String {
    clock::normalize(&cmd.email_mtime).unwrap_or_else(clock::now_iso)
}

/// Record when the mailbox last changed on the user record.
async fn touch(svc: &Services, handle: &str, m_time: &str) -> Result<(), AppError> {
    let Some(mut user) = svc.store.get_user(handle).await? else {
        return Ok(());
    };
    if m_time > user.email_mtime.as_str() {
        user.email_mtime = m_time.to_string();
        svc.store.put_user(&user).await?;
    }
    Ok(())
}

pub async fn get_all(svc: &Services, handle: &str, cmd: MailboxCmd) -> Result<String, AppError> {
    let since = match cmd.m_time.trim() {
        "" => None,
        t => Some(clock::normalize(t).ok_or_else(|| AppError::Malformed(format!("invalid M_time {:?}", t)))?),
    };
    let emails = svc.store.query_emails(handle, since.as_deref()).await?;
    Ok(json!({ "cmd": "GetAllEmails", "Messages": emails }).to_string())
}

/// Set one flag on the email addressed by sender, subject and receive time.
/// `Success` reports whether such an email exists.
pub async fn mark(
    svc: &Services,
    handle: &str,
    cmd: UpdateEmailCmd,
    flag: EmailFlag,
    name: &str,
) -> Result<String, AppError> {
    let value = match flag {
        EmailFlag::Unread => cmd.unread,
        EmailFlag::Starred => cmd.starred,
        EmailFlag::Deleted => cmd.deleted,
    };
    let m_time = change_time(&cmd);
    let key = EmailKey {
        from_email: cmd.from_email,
        subject: cmd.subject,
        recv_time: canonical(&cmd.recv_time),
    };

    let found = svc.store.set_email_flag(handle, &key, flag, value, &m_time).await?;
    if found {
        touch(svc, handle, &m_time).await?;
    } else {
        tracing::debug!(user = handle, cmd = name, "no email matched");
    }
    Ok(result(name, found))
}

/// Save a draft; a draft with the same receive time is replaced.
pub async fn add_draft(svc: &Services, handle: &str, cmd: UpdateEmailCmd) -> Result<String, AppError> {
    if cmd.recv_time.trim().is_empty() {
        return Err(AppError::Malformed("draft without RecvTime".to_string()));
    }
    let m_time = change_time(&cmd);
    let draft = EmailRow {
        from_email: cmd.from_email,
        to_emails: serde_json::to_string(&cmd.to_emails)?,
        subject: cmd.subject,
        content: cmd.content,
        draft: true,
        recv_time: canonical(&cmd.recv_time),
        m_time: m_time.clone(),
        ..Default::default()
    };

    svc.store.save_draft(handle, &draft).await?;
    touch(svc, handle, &m_time).await?;
    Ok(result("AddNewDraft", true))
}

pub async fn remove_deleted(svc: &Services, handle: &str) -> Result<String, AppError> {
    let removed = svc.store.purge_deleted_emails(handle).await?;
    tracing::debug!(user = handle, removed, "trash emptied");
    Ok(result("RemoveDeletedEmails", true))
}
