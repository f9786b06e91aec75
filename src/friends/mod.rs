//! Friend relationships between user pairs.
//!
//! The pure transitions here operate on two loaded records; [`ops`] loads,
//! saves and notifies around them.

pub mod ops;

use thiserror::Error;

use crate::db::models::same_handle;
use crate::db::{FriendEntry, UserRecord};

/// Relationship from the point of view of one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendState {
    None,
    /// This user asked the other.
    OutgoingPending,
    /// The other user asked this one.
    IncomingPending,
    Accepted,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FriendError {
    #[error("cannot befriend yourself")]
    SelfRequest,
    #[error("relationship already exists: {0:?}")]
    AlreadyRelated(FriendState),
    #[error("no pending request from {0}")]
    NoPendingRequest(String),
    #[error("not friends with {0}")]
    NotFriends(String),
}

fn has(list: &[FriendEntry], handle: &str) -> bool {
    list.iter().any(|f| same_handle(&f.username, handle))
}

fn drop_entry(list: &mut Vec<FriendEntry>, handle: &str) -> bool {
    let before = list.len();
    list.retain(|f| !same_handle(&f.username, handle));
    list.len() != before
}

fn entry_for(user: &UserRecord, message: &str) -> FriendEntry {
    FriendEntry {
        username: user.username.clone(),
        profile_pic: user.profile_pic.clone(),
        message: message.to_string(),
    }
}

pub fn state_between(me: &UserRecord, other: &str) -> FriendState {
    if has(&me.friends, other) {
        FriendState::Accepted
    } else if has(&me.outgoing_pending, other) {
        FriendState::OutgoingPending
    } else if has(&me.incoming_pending, other) {
        FriendState::IncomingPending
    } else {
        FriendState::None
    }
}

/// `requester` asks `target`. Valid only when neither side records any
/// relationship.
pub fn request(requester: &mut UserRecord, target: &mut UserRecord, message: &str) -> Result<(), FriendError> {
    if same_handle(&requester.username, &target.username) {
        return Err(FriendError::SelfRequest);
    }
    let mine = state_between(requester, &target.username);
    if mine != FriendState::None {
        return Err(FriendError::AlreadyRelated(mine));
    }
    let theirs = state_between(target, &requester.username);
    if theirs != FriendState::None {
        return Err(FriendError::AlreadyRelated(theirs));
    }

    requester.outgoing_pending.push(entry_for(target, ""));
    target.incoming_pending.push(entry_for(requester, message));
    Ok(())
}

/// `me` accepts the pending request from `requester`.
pub fn accept(me: &mut UserRecord, requester: &mut UserRecord) -> Result<(), FriendError> {
    if !has(&me.incoming_pending, &requester.username) {
        return Err(FriendError::NoPendingRequest(requester.username.clone()));
    }
    drop_entry(&mut me.incoming_pending, &requester.username);
    drop_entry(&mut requester.outgoing_pending, &me.username);

    if !has(&me.friends, &requester.username) {
        me.friends.push(entry_for(requester, ""));
    }
    if !has(&requester.friends, &me.username) {
        requester.friends.push(entry_for(me, ""));
    }
    Ok(())
}

/// `me` declines the pending request from `requester`.
pub fn deny(me: &mut UserRecord, requester: &mut UserRecord) -> Result<(), FriendError> {
    if !has(&me.incoming_pending, &requester.username) {
        return Err(FriendError::NoPendingRequest(requester.username.clone()));
    }
    drop_entry(&mut me.incoming_pending, &requester.username);
    drop_entry(&mut requester.outgoing_pending, &me.username);
    Ok(())
}

pub fn remove(me: &mut UserRecord, friend: &mut UserRecord) -> Result<(), FriendError> {
    if !has(&me.friends, &friend.username) {
        return Err(FriendError::NotFriends(friend.username.clone()));
    }
    drop_entry(&mut me.friends, &friend.username);
    drop_entry(&mut friend.friends, &me.username);
    Ok(())
}

/// Every handle that holds an entry for `user` in some list.
pub fn counterparts(user: &UserRecord) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for entry in user.friends.iter().chain(&user.incoming_pending).chain(&user.outgoing_pending) {
        if !out.iter().any(|h| same_handle(h, &entry.username)) {
            out.push(entry.username.clone());
        }
    }
    out
}

/// Strip `deleted` out of all of `counterpart`'s lists.
pub fn purge(deleted: &str, counterpart: &mut UserRecord) -> bool {
    let a = drop_entry(&mut counterpart.friends, deleted);
    let b = drop_entry(&mut counterpart.incoming_pending, deleted);
    let c = drop_entry(&mut counterpart.outgoing_pending, deleted);
    a || b || c
}

/// Refresh the picture shown for `user` inside `friend`'s accepted list.
pub fn refresh_picture(user: &UserRecord, friend: &mut UserRecord) -> bool {
    let mut changed = false;
    for entry in friend.friends.iter_mut().filter(|f| same_handle(&f.username, &user.username)) {
        entry.profile_pic = user.profile_pic.clone();
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserRecord {
        let mut u = UserRecord::new(name);
        u.profile_pic = format!("{}.png", name);
        u
    }

    #[test]
    fn request_then_accept_becomes_symmetric() {
        let (mut a, mut b) = (user("alice"), user("bob"));
        request(&mut a, &mut b, "hey").unwrap();
        assert_eq!(state_between(&a, "bob"), FriendState::OutgoingPending);
        assert_eq!(state_between(&b, "ALICE"), FriendState::IncomingPending);
        assert_eq!(b.incoming_pending[0].message, "hey");

        accept(&mut b, &mut a).unwrap();
        assert_eq!(state_between(&a, "bob"), FriendState::Accepted);
        assert_eq!(state_between(&b, "alice"), FriendState::Accepted);
        assert!(a.outgoing_pending.is_empty() && b.incoming_pending.is_empty());
        assert_eq!(a.friends[0].profile_pic, "bob.png");
    }

    #[test]
    fn invalid_transitions_leave_state_alone() {
        let (mut a, mut b) = (user("alice"), user("bob"));
        assert_eq!(accept(&mut b, &mut a), Err(FriendError::NoPendingRequest("alice".into())));
        assert_eq!(remove(&mut a, &mut b), Err(FriendError::NotFriends("bob".into())));
        assert_eq!(a, user("alice"));
        assert_eq!(b, user("bob"));

        request(&mut a, &mut b, "").unwrap();
        assert_eq!(
            request(&mut b, &mut a, ""),
            Err(FriendError::AlreadyRelated(FriendState::IncomingPending))
        );
        // Requester cannot accept its own request.
        assert!(accept(&mut a, &mut b).is_err());

        let mut me = user("Solo");
        let mut also_me = user("solo");
        assert_eq!(request(&mut me, &mut also_me, ""), Err(FriendError::SelfRequest));
    }

    #[test]
    fn deny_and_remove_clear_both_sides() {
        let (mut a, mut b) = (user("alice"), user("bob"));
        request(&mut a, &mut b, "").unwrap();
        deny(&mut b, &mut a).unwrap();
        assert_eq!(state_between(&a, "bob"), FriendState::None);
        assert_eq!(state_between(&b, "alice"), FriendState::None);

        request(&mut a, &mut b, "").unwrap();
        accept(&mut b, &mut a).unwrap();
        remove(&mut a, &mut b).unwrap();
        assert_eq!(state_between(&a, "bob"), FriendState::None);
        assert_eq!(state_between(&b, "alice"), FriendState::None);
    }

    #[test]
    fn purge_sweeps_every_list() {
        let (mut a, mut b, mut c) = (user("alice"), user("bob"), user("carol"));
        request(&mut a, &mut b, "").unwrap();
        request(&mut c, &mut a, "").unwrap();
        assert_eq!(counterparts(&a), vec!["carol".to_string(), "bob".to_string()]);

        assert!(purge("alice", &mut b));
        assert!(purge("alice", &mut c));
        assert!(!purge("alice", &mut c));
        assert_eq!(state_between(&b, "alice"), FriendState::None);
        assert_eq!(state_between(&c, "alice"), FriendState::None);
    }
}
