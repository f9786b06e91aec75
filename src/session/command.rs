//! Wire commands. Every client payload is a JSON object whose `cmd` field
//! selects the variant; field names follow the established client protocol.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUserCmd {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    /// JSON-encoded `[{"Question": .., "Answer": ..}]`.
    #[serde(rename = "secQuests", default)]
    pub sec_quests: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginCmd {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserCmd {
    #[serde(rename = "Username", alias = "username", default)]
    pub username: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerCmd {
    #[serde(rename = "Question", default)]
    pub question: String,
    #[serde(rename = "Answer", default)]
    pub answer: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetPasswordCmd {
    #[serde(rename = "Username", alias = "username", default)]
    pub username: String,
    #[serde(rename = "NewPassword", alias = "password", default)]
    pub new_password: String,
    #[serde(rename = "SecQuests", default)]
    pub answers: Vec<AnswerCmd>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangePasswordCmd {
    #[serde(rename = "OldPassword", default)]
    pub old_password: String,
    #[serde(rename = "NewPassword", default)]
    pub new_password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailCmd {
    #[serde(rename = "Email", alias = "email", default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhoneContact {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "PhoneNum", default)]
    pub phone_num: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailContact {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Email", default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchUsersCmd {
    #[serde(rename = "Phones", default)]
    pub phones: Vec<PhoneContact>,
    #[serde(rename = "Emails", default)]
    pub emails: Vec<EmailContact>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotaCmd {
    #[serde(rename = "Quota", default)]
    pub quota: i64,
    #[serde(rename = "QuotaUsed", default)]
    pub quota_used: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutoreplyCmd {
    #[serde(rename = "Message", default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePicCmd {
    #[serde(rename = "ProfilePic", default)]
    pub profile_pic: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeAccountCmd {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceCmd {
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub old_device: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduledCmd {
    #[serde(rename = "CID")]
    pub cid: String,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Content", default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FriendCmd {
    #[serde(rename = "friend_UID")]
    pub friend: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConvoCmd {
    #[serde(rename = "CID", default)]
    pub cid: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "M_time", default)]
    pub m_time: String,
    #[serde(rename = "Username", default)]
    pub username: String,
    #[serde(rename = "Members", default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileCmd {
    #[serde(rename = "CID")]
    pub cid: String,
    #[serde(rename = "fileURL")]
    pub file_url: String,
    #[serde(default)]
    pub m_time: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageCmd {
    #[serde(rename = "CID")]
    pub cid: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub m_time: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusCmd {
    #[serde(rename = "CID")]
    pub cid: String,
    #[serde(rename = "NewReadTime", default)]
    pub new_read_time: Option<String>,
    #[serde(rename = "Typing", default)]
    pub typing: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnreadCmd {
    #[serde(rename = "CID")]
    pub cid: String,
    pub unread_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MtimeCmd {
    #[serde(rename = "CID")]
    pub cid: String,
    #[serde(rename = "M_time")]
    pub m_time: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailboxCmd {
    #[serde(rename = "M_time", default)]
    pub m_time: String,
}

/// Addresses one email by sender, subject and receive time, and carries the
/// new flag values or draft body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEmailCmd {
    #[serde(rename = "FromEmail", default)]
    pub from_email: String,
    #[serde(rename = "ToEmails", default)]
    pub to_emails: Vec<String>,
    #[serde(rename = "Subject", default)]
    pub subject: String,
    #[serde(rename = "Content", default)]
    pub content: String,
    #[serde(rename = "RecvTime", default)]
    pub recv_time: String,
    #[serde(rename = "EmailMtime", default)]
    pub email_mtime: String,
    #[serde(rename = "Unread", default)]
    pub unread: bool,
    #[serde(rename = "Starred", default)]
    pub starred: bool,
    #[serde(rename = "Deleted", default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    CreateUser(CreateUserCmd),
    ValidateUser(LoginCmd),
    GetPasswordResetUser(UserCmd),
    ResetUserPassword(ResetPasswordCmd),

    DeleteUser(UserCmd),
    ChangeUserPassword(ChangePasswordCmd),
    GetUserByUsername(UserCmd),
    GetUserByEmail(EmailCmd),
    MatchUsers(MatchUsersCmd),
    AddToQuota(QuotaCmd),
    AddToQuotaUsed(QuotaCmd),
    SaveAutoreplyMessage(AutoreplyCmd),
    ChangeProfilePic(ProfilePicCmd),
    ChangeUserPhone(ChangeAccountCmd),
    ChangeUserEmail(ChangeAccountCmd),

    AddAndroidDev(DeviceCmd),
    ChangeAndroidDev(DeviceCmd),
    RemoveAndroidDev(DeviceCmd),
    AddIosDev(DeviceCmd),
    ChangeIosDev(DeviceCmd),
    RemoveIosDev(DeviceCmd),
    AddFireosDev(DeviceCmd),
    ChangeFireosDev(DeviceCmd),
    RemoveFireosDev(DeviceCmd),
    RemoveWebDev(DeviceCmd),

    AddScheduledMessage(ScheduledCmd),
    RemoveScheduledMessage(ScheduledCmd),
    RemoveAllScheduledMessages(UserCmd),

    AddFriend(FriendCmd),
    AcceptFriendRequest(FriendCmd),
    DenyFriendRequest(FriendCmd),
    RemoveFriend(FriendCmd),

    CreateConversation(ConvoCmd),
    AddUsersToConversation(ConvoCmd),
    RemoveUserFromConversation(ConvoCmd),
    ChangeConvoName(ConvoCmd),
    UpdateConvoFiles(FileCmd),
    SendMessage(MessageCmd),
    GetConvoData(ConvoCmd),
    GetAllConvoData(ConvoCmd),
    GetMoreConvoMessages(ConvoCmd),
    UpdateUserStatus(StatusCmd),
    UpdateUnreadCount(UnreadCmd),
    UpdateConvoMtime(MtimeCmd),

    GetAllEmails(MailboxCmd),
    MarkEmailUnread(UpdateEmailCmd),
    MarkEmailStarred(UpdateEmailCmd),
    MarkEmailDeleted(UpdateEmailCmd),
    AddNewDraft(UpdateEmailCmd),
    RemoveDeletedEmails(MailboxCmd),
}

/// Names accepted on the wire, in declaration order.
pub const COMMAND_NAMES: &[&str] = &[
    "CreateUser",
    "ValidateUser",
    "GetPasswordResetUser",
    "ResetUserPassword",
    "DeleteUser",
    "ChangeUserPassword",
    "GetUserByUsername",
    "GetUserByEmail",
    "MatchUsers",
    "AddToQuota",
    "AddToQuotaUsed",
    "SaveAutoreplyMessage",
    "ChangeProfilePic",
    "ChangeUserPhone",
    "ChangeUserEmail",
    "AddAndroidDev",
    "ChangeAndroidDev",
    "RemoveAndroidDev",
    "AddIosDev",
    "ChangeIosDev",
    "RemoveIosDev",
    "AddFireosDev",
    "ChangeFireosDev",
    "RemoveFireosDev",
    "RemoveWebDev",
    "AddScheduledMessage",
    "RemoveScheduledMessage",
    "RemoveAllScheduledMessages",
    "AddFriend",
    "AcceptFriendRequest",
    "DenyFriendRequest",
    "RemoveFriend",
    "CreateConversation",
    "AddUsersToConversation",
    "RemoveUserFromConversation",
    "ChangeConvoName",
    "UpdateConvoFiles",
    "SendMessage",
    "GetConvoData",
    "GetAllConvoData",
    "GetMoreConvoMessages",
    "UpdateUserStatus",
    "UpdateUnreadCount",
    "UpdateConvoMtime",
    "GetAllEmails",
    "MarkEmailUnread",
    "MarkEmailStarred",
    "MarkEmailDeleted",
    "AddNewDraft",
    "RemoveDeletedEmails",
];

/// Why a payload did not become a [`Command`].
#[derive(Debug)]
pub enum ParseError {
    /// Not JSON, or no string `cmd` field.
    Malformed(String),
    /// A `cmd` this server does not know.
    Unknown(String),
    /// A known `cmd` whose fields did not deserialize.
    BadFields { cmd: String, error: serde_json::Error },
}

impl Command {
    pub fn parse(raw: &str) -> Result<(Command, Value), ParseError> {
        let value: Value = serde_json::from_str(raw).map_err(|e| ParseError::Malformed(e.to_string()))?;
        let name = value
            .get("cmd")
            .and_then(Value::as_str)
            .ok_or_else(|| ParseError::Malformed("missing cmd".to_string()))?
            .to_string();

        if !COMMAND_NAMES.contains(&name.as_str()) {
            return Err(ParseError::Unknown(name));
        }

        let command = serde_json::from_value(value.clone())
            .map_err(|error| ParseError::BadFields { cmd: name, error })?;
        Ok((command, value))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateUser(_) => "CreateUser",
            Command::ValidateUser(_) => "ValidateUser",
            Command::GetPasswordResetUser(_) => "GetPasswordResetUser",
            Command::ResetUserPassword(_) => "ResetUserPassword",
            Command::DeleteUser(_) => "DeleteUser",
            Command::ChangeUserPassword(_) => "ChangeUserPassword",
            Command::GetUserByUsername(_) => "GetUserByUsername",
            Command::GetUserByEmail(_) => "GetUserByEmail",
            Command::MatchUsers(_) => "MatchUsers",
            Command::AddToQuota(_) => "AddToQuota",
            Command::AddToQuotaUsed(_) => "AddToQuotaUsed",
            Command::SaveAutoreplyMessage(_) => "SaveAutoreplyMessage",
            Command::ChangeProfilePic(_) => "ChangeProfilePic",
            Command::ChangeUserPhone(_) => "ChangeUserPhone",
            Command::ChangeUserEmail(_) => "ChangeUserEmail",
            Command::AddAndroidDev(_) => "AddAndroidDev",
            Command::ChangeAndroidDev(_) => "ChangeAndroidDev",
            Command::RemoveAndroidDev(_) => "RemoveAndroidDev",
            Command::AddIosDev(_) => "AddIosDev",
            Command::ChangeIosDev(_) => "ChangeIosDev",
            Command::RemoveIosDev(_) => "RemoveIosDev",
            Command::AddFireosDev(_) => "AddFireosDev",
            Command::ChangeFireosDev(_) => "ChangeFireosDev",
            Command::RemoveFireosDev(_) => "RemoveFireosDev",
            Command::RemoveWebDev(_) => "RemoveWebDev",
            Command::AddScheduledMessage(_) => "AddScheduledMessage",
            Command::RemoveScheduledMessage(_) => "RemoveScheduledMessage",
            Command::RemoveAllScheduledMessages(_) => "RemoveAllScheduledMessages",
            Command::AddFriend(_) => "AddFriend",
            Command::AcceptFriendRequest(_) => "AcceptFriendRequest",
            Command::DenyFriendRequest(_) => "DenyFriendRequest",
            Command::RemoveFriend(_) => "RemoveFriend",
            Command::CreateConversation(_) => "CreateConversation",
            Command::AddUsersToConversation(_) => "AddUsersToConversation",
            Command::RemoveUserFromConversation(_) => "RemoveUserFromConversation",
            Command::ChangeConvoName(_) => "ChangeConvoName",
            Command::UpdateConvoFiles(_) => "UpdateConvoFiles",
            Command::SendMessage(_) => "SendMessage",
            Command::GetConvoData(_) => "GetConvoData",
            Command::GetAllConvoData(_) => "GetAllConvoData",
            Command::GetMoreConvoMessages(_) => "GetMoreConvoMessages",
            Command::UpdateUserStatus(_) => "UpdateUserStatus",
            Command::UpdateUnreadCount(_) => "UpdateUnreadCount",
            Command::UpdateConvoMtime(_) => "UpdateConvoMtime",
            Command::GetAllEmails(_) => "GetAllEmails",
            Command::MarkEmailUnread(_) => "MarkEmailUnread",
            Command::MarkEmailStarred(_) => "MarkEmailStarred",
            Command::MarkEmailDeleted(_) => "MarkEmailDeleted",
            Command::AddNewDraft(_) => "AddNewDraft",
            Command::RemoveDeletedEmails(_) => "RemoveDeletedEmails",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_command_with_wire_field_names() {
        let (cmd, raw) = Command::parse(
            r#"{"cmd":"SendMessage","CID":"c1","content":"hi","m_time":"2024-01-01T00:00:00Z","t_UIDs":["x"]}"#,
        )
        .unwrap();
        assert_eq!(raw["CID"], "c1");
        match cmd {
            Command::SendMessage(m) => {
                assert_eq!(m.cid, "c1");
                assert_eq!(m.content, "hi");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_and_malformed_are_distinguished() {
        assert!(matches!(Command::parse(r#"{"cmd":"Teleport"}"#), Err(ParseError::Unknown(n)) if n == "Teleport"));
        assert!(matches!(Command::parse("not json"), Err(ParseError::Malformed(_))));
        assert!(matches!(Command::parse(r#"{"CID":"c1"}"#), Err(ParseError::Malformed(_))));
        assert!(matches!(
            Command::parse(r#"{"cmd":"SendMessage","content":"no cid"}"#),
            Err(ParseError::BadFields { cmd, .. }) if cmd == "SendMessage"
        ));
    }

    #[test]
    fn every_listed_name_round_trips_through_name() {
        let (cmd, _) = Command::parse(r#"{"cmd":"RemoveAllScheduledMessages"}"#).unwrap();
        assert_eq!(cmd.name(), "RemoveAllScheduledMessages");
        let (cmd, _) = Command::parse(r#"{"cmd":"UpdateUserStatus","CID":"c","Typing":true}"#).unwrap();
        assert_eq!(cmd.name(), "UpdateUserStatus");
        let (cmd, _) = Command::parse(r#"{"cmd":"MarkEmailStarred","Starred":true,"Subject":"s"}"#).unwrap();
        assert_eq!(cmd.name(), "MarkEmailStarred");
        assert_eq!(COMMAND_NAMES.len(), 50);
    }
}
