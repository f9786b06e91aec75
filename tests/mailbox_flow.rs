mod common;

use serde_json::json;

use common::{Client, Harness};
use convo_server::db::{EmailRow, StateStore};

async fn login(h: &Harness, name: &str, token: &str) -> Client {
    let mut client = Client::connect(&h.services, token);
    let reply = client
        .call(json!({ "cmd": "ValidateUser", "username": name, "password": "password1" }))
        .await;
    assert!(reply.get("error").is_none(), "login failed: {}", reply);
    client
}

fn received(from: &str, subject: &str, recv_time: &str) -> EmailRow {
    EmailRow {
        from_email: from.into(),
        to_emails: "[\"alice@example.com\"]".into(),
        recv_email: "alice@example.com".into(),
        subject: subject.into(),
        content: "body".into(),
        unread: true,
        recv_time: recv_time.into(),
        m_time: recv_time.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn flags_are_set_by_sender_subject_and_receive_time() {
    let h = Harness::new();
    h.user("alice").await;
    h.store
        .add_email("alice", &received("bob@example.com", "lunch", "2024-06-01T10:00:00.000Z"))
        .await
        .unwrap();
    h.store
        .add_email("alice", &received("carol@example.com", "report", "2024-06-01T11:00:00.000Z"))
        .await
        .unwrap();
    let mut alice = login(&h, "alice", "tok-a").await;

    let all = alice.call(json!({ "cmd": "GetAllEmails" })).await;
    let subjects: Vec<&str> = all["Messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["subject"].as_str().unwrap())
        .collect();
    assert_eq!(subjects, vec!["report", "lunch"]);

    let lunch = json!({
        "FromEmail": "bob@example.com",
        "Subject": "lunch",
        "RecvTime": "2024-06-01T10:00:00Z",
        "EmailMtime": "2024-06-01T12:00:00Z",
    });
    let mut cmd = lunch.clone();
    cmd["cmd"] = json!("MarkEmailStarred");
    cmd["Starred"] = json!(true);
    assert_eq!(alice.call(cmd).await, json!({ "cmd": "MarkEmailStarred", "Success": true }));

    let mut cmd = lunch.clone();
    cmd["cmd"] = json!("MarkEmailUnread");
    cmd["Unread"] = json!(false);
    assert_eq!(alice.call(cmd).await["Success"], true);

    let missing = alice
        .call(json!({ "cmd": "MarkEmailUnread", "FromEmail": "bob@example.com", "Subject": "dinner", "RecvTime": "2024-06-01T10:00:00Z" }))
        .await;
    assert_eq!(missing, json!({ "cmd": "MarkEmailUnread", "Success": false }));

    // Only the lunch email changed after 11:30.
    let changed = alice.call(json!({ "cmd": "GetAllEmails", "M_time": "2024-06-01T11:30:00Z" })).await;
    let changed = changed["Messages"].as_array().unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0]["subject"], "lunch");
    assert_eq!(changed[0]["starred"], true);
    assert_eq!(changed[0]["unread"], false);
    assert_eq!(h.get("alice").await.email_mtime, "2024-06-01T12:00:00.000Z");

    // A bad cursor is dropped without a reply.
    alice.send(json!({ "cmd": "GetAllEmails", "M_time": "yesterday" })).await;
    assert_eq!(alice.call(json!({ "cmd": "Teleport" })).await["retcmd"], "bad_command");

    alice.close().await;
}

#[tokio::test]
async fn drafts_replace_by_receive_time_and_trash_is_emptied() {
    let h = Harness::new();
    h.user("alice").await;
    h.store
        .add_email("alice", &received("bob@example.com", "lunch", "2024-06-01T10:00:00.000Z"))
        .await
        .unwrap();
    let mut alice = login(&h, "alice", "tok-a").await;

    for body in ["first try", "second try"] {
        let saved = alice
            .call(json!({
                "cmd": "AddNewDraft",
                "FromEmail": "alice@example.com",
                "ToEmails": ["bob@example.com"],
                "Subject": "re: lunch",
                "Content": body,
                "RecvTime": "2024-06-01T10:30:00Z",
                "EmailMtime": "2024-06-01T10:31:00Z",
            }))
            .await;
        assert_eq!(saved, json!({ "cmd": "AddNewDraft", "Success": true }));
    }
    let emails = h.store.query_emails("alice", None).await.unwrap();
    let drafts: Vec<&EmailRow> = emails.iter().filter(|e| e.draft).collect();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].content, "second try");
    assert_eq!(drafts[0].to_emails, "[\"bob@example.com\"]");

    let deleted = alice
        .call(json!({
            "cmd": "MarkEmailDeleted",
            "FromEmail": "bob@example.com",
            "Subject": "lunch",
            "RecvTime": "2024-06-01T10:00:00Z",
            "Deleted": true,
        }))
        .await;
    assert_eq!(deleted["Success"], true);
    let emptied = alice.call(json!({ "cmd": "RemoveDeletedEmails" })).await;
    assert_eq!(emptied, json!({ "cmd": "RemoveDeletedEmails", "Success": true }));

    let left = h.store.query_emails("alice", None).await.unwrap();
    assert_eq!(left.len(), 1);
    assert!(left[0].draft);

    // Removing the account takes the mailbox with it.
    let gone = alice.call(json!({ "cmd": "DeleteUser" })).await;
    assert_eq!(gone["cmd"], "DeleteUser");
    alice.close().await;
    assert!(h.store.query_emails("alice", None).await.unwrap().is_empty());
}
