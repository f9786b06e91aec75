use serde_json::{json, Value};

use crate::crypto::Digest;
use crate::db::UserRecord;
use crate::delivery::format_phone_number;
use crate::error::AppError;
use crate::friends::ops as friend_ops;
use crate::services::Services;
use crate::session::auth::{resolve_gateway, MIN_PASSWORD_LEN};
use crate::session::command::{
    AutoreplyCmd, ChangeAccountCmd, ChangePasswordCmd, EmailCmd, MatchUsersCmd, ProfilePicCmd, QuotaCmd,
};

async fn load(svc: &Services, handle: &str) -> Result<UserRecord, AppError> {
    svc.store
        .get_user(handle)
        .await?
        .ok_or_else(|| AppError::Internal(format!("session user {} has no record", handle)))
}

async fn save_and_publish(svc: &Services, user: &UserRecord, cmd: &str) -> Result<(), AppError> {
    svc.store.put_user(user).await?;
    let payload = user.client_json(cmd).to_string();
    svc.fanout.publish_web(user, &payload).await;
    Ok(())
}

/// Echo to the user's web sessions, detach from every friend, drop
/// everything the account owns, then delete the record.
pub async fn delete_user(svc: &Services, handle: &str, raw: &Value) -> Result<String, AppError> {
    let user = load(svc, handle).await?;
    svc.fanout.publish_web(&user, &raw.to_string()).await;

    let updated = friend_ops::purge_account(svc, &user).await?;
    let scheduled = svc.store.delete_all_scheduled(&user.username).await?;
    let messages = svc.store.delete_messages_by_author(&user.username).await?;
    let emails = svc.store.delete_emails(&user.username).await?;
    svc.store.delete_user(&user.username).await?;
    tracing::info!(
        user = %user.username,
        counterparts = updated,
        scheduled,
        messages,
        emails,
        "account deleted"
    );
    Ok(raw.to_string())
}

pub async fn change_password(svc: &Services, handle: &str, cmd: ChangePasswordCmd) -> Result<String, AppError> {
    let reply = |ok: bool| json!({ "cmd": "ChangeUserPassword", "success": ok.to_string() }).to_string();
    let mut user = load(svc, handle).await?;

    if cmd.new_password.len() < MIN_PASSWORD_LEN || !user.password.verify(&cmd.old_password)? {
        return Ok(reply(false));
    }
    user.password = Digest::new(&cmd.new_password)?;
    svc.store.put_user(&user).await?;
    Ok(reply(true))
}

pub async fn get_user_by_username(svc: &Services, target: &str) -> Result<String, AppError> {
    let user = svc.store.get_user(target).await?.unwrap_or_default();
    Ok(user.public_json("GetUserByUsername").to_string())
}

pub async fn get_user_by_email(svc: &Services, cmd: EmailCmd) -> Result<String, AppError> {
    let user = svc.store.find_user_by_email(&cmd.email).await?.unwrap_or_default();
    Ok(user.public_json("GetUserByEmail").to_string())
}

/// Match address-book contacts against registered phones and emails.
pub async fn match_users(svc: &Services, handle: &str, cmd: MatchUsersCmd) -> Result<String, AppError> {
    let mut matched: Vec<Value> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    let mut push = |user: UserRecord, display: &str| {
        if user.username_upper == crate::db::models::handle_key(handle) || seen.contains(&user.username_upper) {
            return;
        }
        seen.push(user.username_upper.clone());
        matched.push(json!({
            "Username": user.username,
            "DisplayName": display,
            "ProfilePic": user.profile_pic,
            "Phone": user.phone,
            "Email": user.email,
        }));
    };

    for contact in &cmd.phones {
        let Some(phone) = format_phone_number(&contact.phone_num) else {
            continue;
        };
        if let Some(user) = svc.store.find_user_by_phone(&phone).await? {
            push(user, &contact.name);
        }
    }
    for contact in &cmd.emails {
        if let Some(user) = svc.store.find_user_by_email(&contact.email).await? {
            push(user, &contact.name);
        }
    }

    Ok(json!({ "cmd": "MatchUsers", "MatchedUsers": matched }).to_string())
}

pub async fn add_to_quota(svc: &Services, handle: &str, cmd: QuotaCmd, raw: &Value) -> Result<String, AppError> {
    let mut user = load(svc, handle).await?;
    user.quota += cmd.quota;
    svc.store.put_user(&user).await?;
    svc.fanout.publish_web(&user, &raw.to_string()).await;
    Ok(String::new())
}

pub async fn add_to_quota_used(svc: &Services, handle: &str, cmd: QuotaCmd, raw: &Value) -> Result<String, AppError> {
    let mut user = load(svc, handle).await?;
    let used = user.quota_used + cmd.quota_used;
    if used > user.quota {
        return Ok(json!({
            "cmd": "AddToQuotaUsed",
            "ret_msg": "This upload would put you over your storage quota.",
        })
        .to_string());
    }
    if used == user.quota {
        return Ok(json!({
            "cmd": "AddToQuotaUsed",
            "ret_msg": "You have reached your storage quota.",
        })
        .to_string());
    }
    user.quota_used = used;
    svc.store.put_user(&user).await?;
    svc.fanout.publish_web(&user, &raw.to_string()).await;
    Ok(String::new())
}

pub async fn save_autoreply(svc: &Services, handle: &str, cmd: AutoreplyCmd) -> Result<String, AppError> {
    let mut user = load(svc, handle).await?;
    let reply = |msg: &str| json!({ "cmd": "AddAutoreplyMessage", "ret_msg": msg }).to_string();

    if user.autoreply_message == cmd.message {
        return Ok(reply("Autoreply message has not changed."));
    }
    user.autoreply_message = cmd.message;
    for membership in user.cids.iter_mut() {
        membership.autoreply_sent = 0;
    }
    svc.store.put_user(&user).await?;
    Ok(reply("Autoreply message saved."))
}

pub async fn change_profile_pic(svc: &Services, handle: &str, cmd: ProfilePicCmd) -> Result<String, AppError> {
    let mut user = load(svc, handle).await?;
    user.profile_pic = cmd.profile_pic;
    svc.store.put_user(&user).await?;
    friend_ops::propagate_picture(svc, &user).await?;
    Ok(user.client_json("ChangeProfilePic").to_string())
}

pub async fn change_phone(svc: &Services, handle: &str, cmd: ChangeAccountCmd) -> Result<String, AppError> {
    let Some(phone) = format_phone_number(&cmd.phone) else {
        tracing::debug!(user = handle, "rejected phone number");
        return Ok(String::new());
    };
    let Some(gateway) = resolve_gateway(svc, &phone).await? else {
        tracing::debug!(user = handle, "no sms gateway for number");
        return Ok(String::new());
    };
    let mut user = load(svc, handle).await?;
    user.phone = phone;
    user.phone_gateway = gateway;
    save_and_publish(svc, &user, "ChangeUserPhone").await?;
    Ok(String::new())
}

pub async fn change_email(svc: &Services, handle: &str, cmd: ChangeAccountCmd) -> Result<String, AppError> {
    let email = cmd.email.trim();
    let reject = |msg: &str| json!({ "cmd": "ChangeUserEmail", "error": msg }).to_string();
    if email.is_empty() {
        return Ok(reject("Email must not be empty."));
    }
    if svc.store.find_user_by_email(email).await?.is_some() {
        return Ok(reject("Email already registered."));
    }
    let mut user = load(svc, handle).await?;
    user.email = email.to_string();
    svc.store.put_user(&user).await?;
    Ok(user.client_json("ChangeUserEmail").to_string())
}
