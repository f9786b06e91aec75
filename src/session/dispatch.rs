use serde_json::{json, Value};

use crate::clock;
use crate::convo::{ops as convo_ops, ConvoFile, PAGE_SIZE};
use crate::db::{DeviceClass, EmailFlag, MessageQuery};
use crate::error::AppError;
use crate::friends::ops as friend_ops;
use crate::services::Services;
use crate::session::command::{Command, ParseError};
use crate::session::devices::DeviceChange;
use crate::session::{account, auth, devices, mailbox, scheduled};

pub const BAD_COMMAND: &str = r#"{"retcmd":"bad_command"}"#;

/// Per-connection identity. Rebuilt from scratch when a loop is respawned.
#[derive(Clone)]
pub struct SessionCtx {
    pub services: Services,
    pub handle: String,
    pub token: String,
}

/// Parse and run one payload. `None` means nothing is written back.
pub async fn handle_payload(ctx: &SessionCtx, raw: &str) -> Option<String> {
    let (command, value) = match Command::parse(raw) {
        Ok(parsed) => parsed,
        Err(ParseError::Unknown(name)) => {
            tracing::debug!(user = %ctx.handle, cmd = %name, "unknown command");
            return Some(BAD_COMMAND.to_string());
        }
        Err(ParseError::Malformed(reason)) => {
            tracing::warn!(user = %ctx.handle, "malformed payload: {}", reason);
            return None;
        }
        Err(ParseError::BadFields { cmd, error }) => {
            tracing::warn!(user = %ctx.handle, cmd = %cmd, "malformed payload: {}", error);
            return None;
        }
    };

    let name = command.name();
    match dispatch(ctx, command, &value).await {
        Ok(reply) if reply.is_empty() => None,
        Ok(reply) => Some(reply),
        Err(e @ (AppError::Malformed(_) | AppError::Conflict(_))) => {
            tracing::warn!(user = %ctx.handle, cmd = name, "rejected: {}", e);
            None
        }
        Err(e) => {
            tracing::error!(user = %ctx.handle, cmd = name, "handler failed: {}", e);
            None
        }
    }
}

/// Run a command as the session's user. An empty string means the results
/// went out through fan-out.
pub async fn dispatch(ctx: &SessionCtx, command: Command, raw: &Value) -> Result<String, AppError> {
    let svc = &ctx.services;
    let me = ctx.handle.as_str();

    match command {
        Command::CreateUser(_) | Command::ValidateUser(_) | Command::ResetUserPassword(_) => {
            tracing::debug!(user = me, "authentication command after login ignored");
            Ok(String::new())
        }
        Command::GetPasswordResetUser(cmd) => auth::password_reset_questions(svc, cmd, raw).await,

        Command::DeleteUser(_) => account::delete_user(svc, me, raw).await,
        Command::ChangeUserPassword(cmd) => account::change_password(svc, me, cmd).await,
        Command::GetUserByUsername(cmd) => account::get_user_by_username(svc, &cmd.username).await,
        Command::GetUserByEmail(cmd) => account::get_user_by_email(svc, cmd).await,
        Command::MatchUsers(cmd) => account::match_users(svc, me, cmd).await,
        Command::AddToQuota(cmd) => account::add_to_quota(svc, me, cmd, raw).await,
        Command::AddToQuotaUsed(cmd) => account::add_to_quota_used(svc, me, cmd, raw).await,
        Command::SaveAutoreplyMessage(cmd) => account::save_autoreply(svc, me, cmd).await,
        Command::ChangeProfilePic(cmd) => account::change_profile_pic(svc, me, cmd).await,
        Command::ChangeUserPhone(cmd) => account::change_phone(svc, me, cmd).await,
        Command::ChangeUserEmail(cmd) => account::change_email(svc, me, cmd).await,

        Command::AddAndroidDev(cmd) => {
            devices::update_device(svc, me, DeviceClass::Android, DeviceChange::Add, &cmd, "AddAndroidDev").await
        }
        Command::ChangeAndroidDev(cmd) => {
            devices::update_device(svc, me, DeviceClass::Android, DeviceChange::Change, &cmd, "ChangeAndroidDev").await
        }
        Command::RemoveAndroidDev(cmd) => {
            devices::update_device(svc, me, DeviceClass::Android, DeviceChange::Remove, &cmd, "RemoveAndroidDev").await
        }
        Command::AddIosDev(cmd) => {
            devices::update_device(svc, me, DeviceClass::Ios, DeviceChange::Add, &cmd, "AddIosDev").await
        }
        Command::ChangeIosDev(cmd) => {
            devices::update_device(svc, me, DeviceClass::Ios, DeviceChange::Change, &cmd, "ChangeIosDev").await
        }
        Command::RemoveIosDev(cmd) => {
            devices::update_device(svc, me, DeviceClass::Ios, DeviceChange::Remove, &cmd, "RemoveIosDev").await
        }
        Command::AddFireosDev(cmd) => {
            devices::update_device(svc, me, DeviceClass::Fireos, DeviceChange::Add, &cmd, "AddFireosDev").await
        }
        Command::ChangeFireosDev(cmd) => {
            devices::update_device(svc, me, DeviceClass::Fireos, DeviceChange::Change, &cmd, "ChangeFireosDev").await
        }
        Command::RemoveFireosDev(cmd) => {
            devices::update_device(svc, me, DeviceClass::Fireos, DeviceChange::Remove, &cmd, "RemoveFireosDev").await
        }
        Command::RemoveWebDev(cmd) => devices::remove_web_device(svc, me, &cmd).await,

        Command::AddScheduledMessage(cmd) => scheduled::add(svc, me, cmd, raw).await,
        Command::RemoveScheduledMessage(cmd) => scheduled::remove(svc, me, cmd).await,
        Command::RemoveAllScheduledMessages(_) => scheduled::remove_all(svc, me).await,

        Command::AddFriend(cmd) => {
            friend_ops::add_friend(svc, me, &cmd.friend, &cmd.message).await?;
            Ok(String::new())
        }
        Command::AcceptFriendRequest(cmd) => {
            friend_ops::accept_request(svc, me, &cmd.friend).await?;
            Ok(String::new())
        }
        Command::DenyFriendRequest(cmd) => {
            friend_ops::deny_request(svc, me, &cmd.friend).await?;
            Ok(String::new())
        }
        Command::RemoveFriend(cmd) => {
            friend_ops::remove_friend(svc, me, &cmd.friend).await?;
            Ok(String::new())
        }

        Command::CreateConversation(cmd) => {
            let m_time = (!cmd.m_time.is_empty()).then_some(cmd.m_time.as_str());
            convo_ops::create(svc, me, &cmd.members, &cmd.name, m_time).await?;
            Ok(String::new())
        }
        Command::AddUsersToConversation(cmd) => {
            convo_ops::add_members(svc, &cmd.cid, &cmd.members).await?;
            Ok(String::new())
        }
        Command::RemoveUserFromConversation(cmd) => {
            let target = if cmd.username.is_empty() { me } else { cmd.username.as_str() };
            convo_ops::remove_member(svc, &cmd.cid, target).await?;
            Ok(String::new())
        }
        Command::ChangeConvoName(cmd) => {
            convo_ops::rename(svc, &cmd.cid, &cmd.name).await?;
            Ok(String::new())
        }
        Command::UpdateConvoFiles(cmd) => {
            let file = ConvoFile {
                f_username: me.to_string(),
                file_url: cmd.file_url,
                m_time: clock::normalize(&cmd.m_time).unwrap_or_else(clock::now_iso),
            };
            convo_ops::add_file(svc, &cmd.cid, file).await?;
            Ok(String::new())
        }
        Command::SendMessage(cmd) => {
            let m_time = (!cmd.m_time.is_empty()).then_some(cmd.m_time.as_str());
            convo_ops::send_message(svc, me, &cmd.cid, &cmd.content, m_time).await?;
            Ok(String::new())
        }
        Command::GetConvoData(cmd) => {
            let query = if cmd.m_time.is_empty() {
                MessageQuery::Latest(PAGE_SIZE)
            } else {
                MessageQuery::Since(cmd.m_time)
            };
            convo_reply(svc, &cmd.cid, query, "GetConvoData").await
        }
        Command::GetAllConvoData(cmd) => convo_reply(svc, &cmd.cid, MessageQuery::All, "GetAllConvoData").await,
        Command::GetMoreConvoMessages(cmd) => {
            if cmd.m_time.is_empty() {
                return Ok(String::new());
            }
            let messages = svc
                .store
                .query_messages(&cmd.cid, MessageQuery::Before(cmd.m_time, PAGE_SIZE))
                .await?;
            Ok(json!({ "cmd": "GetMoreConvoMessages", "CID": cmd.cid, "Messages": messages }).to_string())
        }
        Command::UpdateUserStatus(cmd) => {
            convo_ops::update_status(svc, &cmd.cid, me, cmd.new_read_time.as_deref(), cmd.typing).await?;
            Ok(String::new())
        }
        Command::UpdateUnreadCount(cmd) => {
            convo_ops::update_unread_count(svc, me, &cmd.cid, cmd.unread_count).await?;
            Ok(String::new())
        }
        Command::UpdateConvoMtime(cmd) => {
            convo_ops::update_convo_mtime(svc, me, &cmd.cid, &cmd.m_time).await?;
            Ok(String::new())
        }

        Command::GetAllEmails(cmd) => mailbox::get_all(svc, me, cmd).await,
        Command::MarkEmailUnread(cmd) => mailbox::mark(svc, me, cmd, EmailFlag::Unread, "MarkEmailUnread").await,
        Command::MarkEmailStarred(cmd) => mailbox::mark(svc, me, cmd, EmailFlag::Starred, "MarkEmailStarred").await,
        Command::MarkEmailDeleted(cmd) => mailbox::mark(svc, me, cmd, EmailFlag::Deleted, "MarkEmailDeleted").await,
        Command::AddNewDraft(cmd) => mailbox::add_draft(svc, me, cmd).await,
        Command::RemoveDeletedEmails(_) => mailbox::remove_deleted(svc, me).await,
    }
}

async fn convo_reply(svc: &Services, cid: &str, query: MessageQuery, cmd: &str) -> Result<String, AppError> {
    Ok(convo_ops::convo_data(svc, cid, query, cmd)
        .await?
        .map(|v| v.to_string())
        .unwrap_or_default())
}
