use serde::{Deserialize, Serialize};

use crate::db::models::{handle_key, same_handle};
use crate::error::AppError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvoMember {
    pub username: String,
    #[serde(default)]
    pub read_time: String,
    #[serde(default)]
    pub typing: bool,
}

/// Conversation members, kept sorted case-insensitively by handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberList(Vec<ConvoMember>);

impl MemberList {
    pub fn new(members: Vec<ConvoMember>) -> Self {
        let mut list = MemberList(members);
        list.sort();
        list
    }

    fn sort(&mut self) {
        self.0.sort_by_key(|m| handle_key(&m.username));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConvoMember> {
        self.0.iter()
    }

    pub fn handles(&self) -> Vec<String> {
        self.0.iter().map(|m| m.username.clone()).collect()
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.0.iter().any(|m| same_handle(&m.username, handle))
    }

    pub fn get_mut(&mut self, handle: &str) -> Option<&mut ConvoMember> {
        self.0.iter_mut().find(|m| same_handle(&m.username, handle))
    }

    /// Insert unless already present. Returns whether the list changed.
    pub fn insert(&mut self, member: ConvoMember) -> bool {
        if self.contains(&member.username) {
            return false;
        }
        self.0.push(member);
        self.sort();
        true
    }

    pub fn remove(&mut self, handle: &str) -> Option<ConvoMember> {
        let idx = self.0.iter().position(|m| same_handle(&m.username, handle))?;
        Some(self.0.remove(idx))
    }

    /// Each member encoded as its own JSON string.
    pub fn to_string_array(&self) -> Result<Vec<String>, AppError> {
        self.0
            .iter()
            .map(|m| serde_json::to_string(m).map_err(AppError::from))
            .collect()
    }

    pub fn from_string_array(items: &[String]) -> Result<Self, AppError> {
        let members = items
            .iter()
            .map(|s| serde_json::from_str::<ConvoMember>(s).map_err(AppError::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MemberList::new(members))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvoFile {
    pub f_username: String,
    #[serde(rename = "fileURL")]
    pub file_url: String,
    #[serde(default)]
    pub m_time: String,
}

/// Attachments of a conversation, unique by URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileList(Vec<ConvoFile>);

impl FileList {
    pub fn iter(&self) -> std::slice::Iter<'_, ConvoFile> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replace any entry with the same URL and append `file` last.
    pub fn upsert(&mut self, file: ConvoFile) {
        self.0.retain(|f| f.file_url != file.file_url);
        self.0.push(file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str) -> ConvoMember {
        ConvoMember { username: name.to_string(), read_time: "t0".into(), typing: false }
    }

    #[test]
    fn members_stay_sorted_case_insensitively() {
        let mut list = MemberList::new(vec![member("carol"), member("Bob")]);
        assert!(list.insert(member("alice")));
        assert!(!list.insert(member("ALICE")));
        assert_eq!(list.handles(), vec!["alice", "Bob", "carol"]);

        list.remove("bob");
        assert_eq!(list.handles(), vec!["alice", "carol"]);
    }

    #[test]
    fn string_array_round_trips() {
        let mut list = MemberList::new(vec![member("zed"), member("amy")]);
        if let Some(m) = list.get_mut("zed") {
            m.typing = true;
        }
        let encoded = list.to_string_array().unwrap();
        assert_eq!(encoded.len(), 2);
        assert!(encoded[0].contains("\"username\":\"amy\""));
        assert_eq!(MemberList::from_string_array(&encoded).unwrap(), list);
    }

    #[test]
    fn malformed_string_array_is_rejected() {
        assert!(MemberList::from_string_array(&["{not json".to_string()]).is_err());
    }

    #[test]
    fn files_dedup_by_url() {
        let mut files = FileList::default();
        files.upsert(ConvoFile { f_username: "a".into(), file_url: "u1".into(), m_time: "1".into() });
        files.upsert(ConvoFile { f_username: "b".into(), file_url: "u2".into(), m_time: "2".into() });
        files.upsert(ConvoFile { f_username: "c".into(), file_url: "u1".into(), m_time: "3".into() });
        let urls: Vec<_> = files.iter().map(|f| f.file_url.as_str()).collect();
        assert_eq!(urls, vec!["u2", "u1"]);
        assert_eq!(files.iter().last().map(|f| f.f_username.as_str()), Some("c"));
    }
}
