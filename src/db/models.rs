use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;

use crate::convo::{FileList, MemberList};
use crate::crypto::Digest;

/// Upper-cased form used as the identity key for handles.
pub fn handle_key(handle: &str) -> String {
    handle.trim().to_uppercase()
}

pub fn same_handle(a: &str, b: &str) -> bool {
    handle_key(a) == handle_key(b)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Android,
    Fireos,
    Ios,
    Web,
}

impl DeviceClass {
    pub const MOBILE: [DeviceClass; 3] = [DeviceClass::Android, DeviceClass::Fireos, DeviceClass::Ios];
    pub const ALL: [DeviceClass; 4] = [
        DeviceClass::Android,
        DeviceClass::Fireos,
        DeviceClass::Ios,
        DeviceClass::Web,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Android => "android",
            DeviceClass::Fireos => "fireos",
            DeviceClass::Ios => "ios",
            DeviceClass::Web => "web",
        }
    }
}

/// Device identifiers registered for a user, partitioned by class.
///
/// An identifier lives in at most one class list and never twice in the same one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistry {
    #[serde(rename = "Android", default)]
    pub android: Vec<String>,
    #[serde(rename = "Fireos", default)]
    pub fireos: Vec<String>,
    #[serde(rename = "Ios", default)]
    pub ios: Vec<String>,
    #[serde(rename = "Web", default)]
    pub web: Vec<String>,
}

impl DeviceRegistry {
    pub fn list(&self, class: DeviceClass) -> &[String] {
        match class {
            DeviceClass::Android => &self.android,
            DeviceClass::Fireos => &self.fireos,
            DeviceClass::Ios => &self.ios,
            DeviceClass::Web => &self.web,
        }
    }

    fn list_mut(&mut self, class: DeviceClass) -> &mut Vec<String> {
        match class {
            DeviceClass::Android => &mut self.android,
            DeviceClass::Fireos => &mut self.fireos,
            DeviceClass::Ios => &mut self.ios,
            DeviceClass::Web => &mut self.web,
        }
    }

    /// Register `id` under `class`. Returns false when it was already there.
    pub fn register(&mut self, class: DeviceClass, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() || self.list(class).iter().any(|d| d == id) {
            return false;
        }
        for other in DeviceClass::ALL.into_iter().filter(|c| *c != class) {
            self.list_mut(other).retain(|d| d != id);
        }
        self.list_mut(class).push(id.to_string());
        true
    }

    /// Drop `id` (and any blank entries) from `class`.
    pub fn remove(&mut self, class: DeviceClass, id: &str) -> bool {
        let list = self.list_mut(class);
        let before = list.len();
        list.retain(|d| d != id && !d.trim().is_empty());
        list.len() != before
    }

    pub fn has_mobile(&self) -> bool {
        DeviceClass::MOBILE.iter().any(|c| !self.list(*c).is_empty())
    }

    pub fn has_any(&self) -> bool {
        self.has_mobile() || !self.web.is_empty()
    }
}

/// A user's view of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    #[serde(rename = "CID")]
    pub cid: String,
    #[serde(rename = "M_time", default)]
    pub m_time: String,
    #[serde(rename = "UnreadCount", default)]
    pub unread_count: u64,
    #[serde(rename = "AutoreplySent", default)]
    pub autoreply_sent: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEntry {
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "ProfilePic", default)]
    pub profile_pic: String,
    #[serde(rename = "Message", default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityQuestion {
    #[serde(rename = "Question")]
    pub question: String,
    #[serde(rename = "Answer")]
    pub answer: Digest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEntry {
    #[serde(rename = "CID")]
    pub cid: String,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Content")]
    pub content: String,
}

/// The per-user record. Serialized in full for storage; clients get
/// [`UserRecord::client_json`] which omits credentials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "UsernameUpper")]
    pub username_upper: String,
    #[serde(rename = "Password", default)]
    pub password: Digest,
    #[serde(rename = "Email", default)]
    pub email: String,
    #[serde(rename = "Phone", default)]
    pub phone: String,
    #[serde(rename = "PhoneGateway", default)]
    pub phone_gateway: String,
    #[serde(rename = "AutoreplyMessage", default)]
    pub autoreply_message: String,
    #[serde(rename = "Friends", default)]
    pub friends: Vec<FriendEntry>,
    #[serde(rename = "IncomingPendingFriends", default)]
    pub incoming_pending: Vec<FriendEntry>,
    #[serde(rename = "OutgoingPendingFriends", default)]
    pub outgoing_pending: Vec<FriendEntry>,
    #[serde(rename = "CIDs", default)]
    pub cids: Vec<Membership>,
    #[serde(rename = "ScheduledMessages", default)]
    pub scheduled_messages: Vec<ScheduledEntry>,
    #[serde(flatten)]
    pub devices: DeviceRegistry,
    #[serde(rename = "ProfilePic", default)]
    pub profile_pic: String,
    #[serde(rename = "Quota", default)]
    pub quota: i64,
    #[serde(rename = "QuotaUsed", default)]
    pub quota_used: i64,
    #[serde(rename = "SecQuests", default)]
    pub sec_quests: Vec<SecurityQuestion>,
    /// Last time anything in the mailbox changed.
    #[serde(rename = "EmailMtime", default)]
    pub email_mtime: String,
}

impl UserRecord {
    pub fn new(username: &str) -> Self {
        UserRecord {
            username: username.trim().to_string(),
            username_upper: handle_key(username),
            ..Default::default()
        }
    }

    pub fn membership(&self, cid: &str) -> Option<&Membership> {
        self.cids.iter().find(|m| m.cid == cid)
    }

    pub fn membership_mut(&mut self, cid: &str) -> Option<&mut Membership> {
        self.cids.iter_mut().find(|m| m.cid == cid)
    }

    /// Add a membership, or move the cursor of an existing one to `m_time`.
    pub fn join(&mut self, cid: &str, m_time: &str) {
        match self.membership_mut(cid) {
            Some(existing) => existing.m_time = m_time.to_string(),
            None => self.cids.push(Membership {
                cid: cid.to_string(),
                m_time: m_time.to_string(),
                ..Default::default()
            }),
        }
    }

    pub fn leave(&mut self, cid: &str) -> bool {
        let before = self.cids.len();
        self.cids.retain(|m| m.cid != cid);
        self.cids.len() != before
    }

    /// Client-facing JSON with `cmd` set and credentials removed.
    pub fn client_json(&self, cmd: &str) -> Value {
        let mut map = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        map.remove("Password");
        map.remove("SecQuests");
        map.insert("cmd".to_string(), Value::String(cmd.to_string()));
        Value::Object(map)
    }

    /// Public projection returned by lookups.
    pub fn public_json(&self, cmd: &str) -> Value {
        serde_json::json!({
            "cmd": cmd,
            "Username": self.username,
            "UsernameUpper": self.username_upper,
            "Email": self.email,
            "Phone": self.phone,
            "PhoneGateway": self.phone_gateway,
            "Friends": self.friends,
            "ProfilePic": self.profile_pic,
        })
    }
}

/// One entry of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "CID")]
    pub cid: String,
    pub f_username: String,
    pub m_time: String,
    pub content: String,
}

impl ChatMessage {
    pub fn wire(&self) -> Value {
        serde_json::json!({
            "cmd": "SendMessage",
            "CID": self.cid,
            "f_username": self.f_username,
            "m_time": self.m_time,
            "content": self.content,
        })
    }
}

/// A deferred message, unique per (author, send time).
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ScheduledMessage {
    #[serde(rename = "CID")]
    pub cid: String,
    pub f_username: String,
    pub content: String,
    pub m_time: String,
}

/// One mailbox entry, as stored and as sent to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct EmailRow {
    pub from_email: String,
    /// JSON array of recipient addresses.
    pub to_emails: String,
    pub recv_email: String,
    pub subject: String,
    pub content: String,
    pub attachments: String,
    pub starred: bool,
    pub unread: bool,
    pub spam: bool,
    pub draft: bool,
    pub deleted: bool,
    pub recv_time: String,
    pub m_time: String,
}

/// Addresses a received email within one mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailKey {
    pub from_email: String,
    pub subject: String,
    pub recv_time: String,
}

impl EmailKey {
    pub fn matches(&self, row: &EmailRow) -> bool {
        row.from_email == self.from_email && row.subject == self.subject && row.recv_time == self.recv_time
    }
}

/// Per-email flags a client may toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailFlag {
    Unread,
    Starred,
    Deleted,
}

impl EmailFlag {
    pub fn column(&self) -> &'static str {
        match self {
            EmailFlag::Unread => "unread",
            EmailFlag::Starred => "starred",
            EmailFlag::Deleted => "deleted",
        }
    }

    pub fn apply(&self, row: &mut EmailRow, value: bool) {
        match self {
            EmailFlag::Unread => row.unread = value,
            EmailFlag::Starred => row.starred = value,
            EmailFlag::Deleted => row.deleted = value,
        }
    }
}

/// Every independently stored field of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub cid: String,
    pub name: String,
    pub m_time: String,
    pub members: MemberList,
    pub files: FileList,
}

/// Which slice of history to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageQuery {
    /// The newest `n`, returned oldest first.
    Latest(i64),
    /// Strictly newer than the cursor, oldest first.
    Since(String),
    /// Strictly older than the cursor, newest first, at most `n`.
    Before(String, i64),
    All,
}
