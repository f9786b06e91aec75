use serde_json::json;

use crate::db::{FriendEntry, UserRecord};
use crate::error::AppError;
use crate::friends::{self, FriendError};
use crate::services::Services;

/// Load both records of a pair, or `None` if either is missing.
async fn load_pair(svc: &Services, me: &str, other: &str) -> Result<Option<(UserRecord, UserRecord)>, AppError> {
    let Some(mine) = svc.store.get_user(me).await? else {
        return Ok(None);
    };
    let Some(theirs) = svc.store.get_user(other).await? else {
        tracing::debug!(user = me, other, "friend target does not exist");
        return Ok(None);
    };
    Ok(Some((mine, theirs)))
}

async fn save_pair(svc: &Services, a: &UserRecord, b: &UserRecord) -> Result<(), AppError> {
    svc.store.put_user(a).await?;
    svc.store.put_user(b).await?;
    Ok(())
}

fn rejected(action: &str, me: &str, other: &str, err: FriendError) -> Result<bool, AppError> {
    tracing::debug!(user = me, other, "{} ignored: {}", action, err);
    Ok(false)
}

fn public_entry(user: &UserRecord) -> FriendEntry {
    FriendEntry {
        username: user.username.clone(),
        profile_pic: user.profile_pic.clone(),
        message: String::new(),
    }
}

/// Send a friend request. Returns false when the transition is not allowed.
pub async fn add_friend(svc: &Services, me: &str, target: &str, message: &str) -> Result<bool, AppError> {
    let Some((mut mine, mut theirs)) = load_pair(svc, me, target).await? else {
        return Ok(false);
    };
    if let Err(e) = friends::request(&mut mine, &mut theirs, message) {
        return rejected("friend request", me, target, e);
    }
    save_pair(svc, &mine, &theirs).await?;

    let incoming = FriendEntry { message: message.to_string(), ..public_entry(&mine) };
    let to_target = json!({ "cmd": "AddIncomingFriend", "Friend": incoming }).to_string();
    let to_me = json!({ "cmd": "AddOutgoingFriend", "Friend": public_entry(&theirs) }).to_string();
    svc.fanout.publish_web(&theirs, &to_target).await;
    svc.fanout.publish_web(&mine, &to_me).await;
    Ok(true)
}

pub async fn accept_request(svc: &Services, me: &str, requester: &str) -> Result<bool, AppError> {
    let Some((mut mine, mut theirs)) = load_pair(svc, me, requester).await? else {
        return Ok(false);
    };
    if let Err(e) = friends::accept(&mut mine, &mut theirs) {
        return rejected("accept", me, requester, e);
    }
    save_pair(svc, &mine, &theirs).await?;

    let to_me = json!({ "cmd": "AcceptFriendRequest", "Friend": public_entry(&theirs) }).to_string();
    let to_them = json!({ "cmd": "AcceptFriendRequest", "Friend": public_entry(&mine) }).to_string();
    svc.fanout.publish_web(&mine, &to_me).await;
    svc.fanout.publish_web(&theirs, &to_them).await;
    Ok(true)
}

pub async fn deny_request(svc: &Services, me: &str, requester: &str) -> Result<bool, AppError> {
    let Some((mut mine, mut theirs)) = load_pair(svc, me, requester).await? else {
        return Ok(false);
    };
    if let Err(e) = friends::deny(&mut mine, &mut theirs) {
        return rejected("deny", me, requester, e);
    }
    save_pair(svc, &mine, &theirs).await?;

    let to_me = json!({ "cmd": "DenyFriendRequest", "Friend": theirs.username }).to_string();
    let to_them = json!({ "cmd": "DenyFriendRequest", "Friend": mine.username }).to_string();
    svc.fanout.publish_web(&mine, &to_me).await;
    svc.fanout.publish_web(&theirs, &to_them).await;
    Ok(true)
}

pub async fn remove_friend(svc: &Services, me: &str, friend: &str) -> Result<bool, AppError> {
    let Some((mut mine, mut theirs)) = load_pair(svc, me, friend).await? else {
        return Ok(false);
    };
    if let Err(e) = friends::remove(&mut mine, &mut theirs) {
        return rejected("remove", me, friend, e);
    }
    save_pair(svc, &mine, &theirs).await?;

    let to_me = json!({ "cmd": "RemoveFriend", "Friend": theirs.username }).to_string();
    let to_them = json!({ "cmd": "RemoveFriend", "Friend": mine.username }).to_string();
    svc.fanout.publish_web(&mine, &to_me).await;
    svc.fanout.publish_web(&theirs, &to_them).await;
    Ok(true)
}

/// Remove `user` from every counterpart's lists and tell each of them.
/// Returns the number of counterparts updated.
pub async fn purge_account(svc: &Services, user: &UserRecord) -> Result<usize, AppError> {
    let mut updated = 0;
    for handle in friends::counterparts(user) {
        let Some(mut other) = svc.store.get_user(&handle).await? else {
            continue;
        };
        if !friends::purge(&user.username, &mut other) {
            continue;
        }
        svc.store.put_user(&other).await?;
        let payload = other.client_json("UpdateUser").to_string();
        svc.fanout.publish_web(&other, &payload).await;
        updated += 1;
    }
    Ok(updated)
}

/// Push `user`'s current picture into each accepted friend's list.
pub async fn propagate_picture(svc: &Services, user: &UserRecord) -> Result<usize, AppError> {
    let mut updated = 0;
    for entry in &user.friends {
        let Some(mut friend) = svc.store.get_user(&entry.username).await? else {
            continue;
        };
        if friends::refresh_picture(user, &mut friend) {
            svc.store.put_user(&friend).await?;
            let payload = friend.client_json("UpdateUser").to_string();
            svc.fanout.publish_web(&friend, &payload).await;
            updated += 1;
        }
    }
    Ok(updated)
}
