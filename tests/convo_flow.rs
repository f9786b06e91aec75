mod common;

use common::{cmds, drain, Harness};
use convo_server::convo::{ops, ConvoFile, MemberList};
use convo_server::db::{DeviceClass, MessageQuery, StateStore};
use convo_server::error::AppError;

#[tokio::test]
async fn send_message_updates_recipient_and_fans_out() {
    let h = Harness::new();
    h.user("alice").await;
    h.user("bob").await;
    let mut alice_web = h.web_device("alice", "tok-alice").await;
    let mut bob_web = h.web_device("bob", "tok-bob").await;

    // alice also has a phone; she must not be pushed her own message.
    let mut alice = h.get("alice").await;
    alice.devices.register(DeviceClass::Ios, "alice-phone");
    h.store.put_user(&alice).await.unwrap();

    let cid = ops::create(&h.services, "alice", &["bob".into()], "Lunch", Some("2024-05-01T10:00:00Z"))
        .await
        .unwrap();
    drain(&mut alice_web);
    drain(&mut bob_web);

    let t1 = "2024-05-01T10:05:00.000Z";
    let outcome = ops::send_message(&h.services, "alice", &cid, "hi bob", Some(t1)).await.unwrap();
    assert_eq!(outcome.message.m_time, t1);

    let bob = h.get("bob").await;
    let entry = bob.membership(&cid).unwrap();
    assert_eq!(entry.unread_count, 1);
    assert_eq!(entry.m_time, t1);

    let alice = h.get("alice").await;
    assert_eq!(alice.membership(&cid).unwrap().unread_count, 0);

    let convo = h.store.get_conversation(&cid).await.unwrap().unwrap();
    assert_eq!(convo.m_time, t1);

    assert!(h.push.sent.lock().await.is_empty());

    let to_bob = drain(&mut bob_web);
    assert_eq!(cmds(&to_bob), vec!["SendMessage"]);
    assert_eq!(to_bob[0]["content"], "hi bob");
    assert_eq!(to_bob[0]["f_username"], "alice");
    assert_eq!(cmds(&drain(&mut alice_web)), vec!["SendMessage"]);
}

#[tokio::test]
async fn create_sorts_members_and_registers_memberships() {
    let h = Harness::new();
    for name in ["carol", "Bob", "alice"] {
        h.user(name).await;
    }
    let mut bob_web = h.web_device("Bob", "tok-bob").await;

    let cid = ops::create(&h.services, "carol", &["alice".into(), "BOB".into(), "ghost".into()], "", None)
        .await
        .unwrap();

    let members = h.store.get_members(&cid).await.unwrap().unwrap();
    assert_eq!(members.handles(), vec!["alice", "Bob", "carol"]);
    for name in ["alice", "Bob", "carol"] {
        assert!(h.get(name).await.membership(&cid).is_some());
    }

    let notes = drain(&mut bob_web);
    assert_eq!(notes[0]["cmd"], "CreateConversation");
    let encoded: Vec<String> = serde_json::from_value(notes[0]["Members"].clone()).unwrap();
    assert_eq!(MemberList::from_string_array(&encoded).unwrap(), members);

    assert!(ops::create(&h.services, "carol", &[], "", None).await.is_err());
}

#[tokio::test]
async fn add_and_remove_members() {
    let h = Harness::new();
    for name in ["alice", "bob", "zed"] {
        h.user(name).await;
    }
    let mut zed_web = h.web_device("zed", "tok-zed").await;
    let cid = ops::create(&h.services, "bob", &["zed".into()], "", None).await.unwrap();
    drain(&mut zed_web);

    assert_eq!(ops::add_members(&h.services, &cid, &["Zed".into(), "alice".into()]).await.unwrap(), 1);
    assert_eq!(ops::add_members(&h.services, &cid, &["alice".into()]).await.unwrap(), 0);
    let members = h.store.get_members(&cid).await.unwrap().unwrap();
    assert_eq!(members.handles(), vec!["alice", "bob", "zed"]);
    assert_eq!(cmds(&drain(&mut zed_web)), vec!["AddUsersToConversation"]);

    assert!(ops::remove_member(&h.services, &cid, "ALICE").await.unwrap());
    assert!(!ops::remove_member(&h.services, &cid, "alice").await.unwrap());
    assert!(h.get("alice").await.membership(&cid).is_none());
    let notes = drain(&mut zed_web);
    assert_eq!(notes[0]["cmd"], "update_convo_members");
    assert_eq!(notes[0]["Members"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn removing_only_member_leaves_orphan() {
    let h = Harness::new();
    h.user("solo").await;
    let cid = ops::create(&h.services, "solo", &["solo".into()], "", None).await.unwrap();

    assert!(ops::remove_member(&h.services, &cid, "solo").await.unwrap());
    let convo = h.store.get_conversation(&cid).await.unwrap().unwrap();
    assert!(convo.members.is_empty());

    // Sending into an orphan is harmless.
    let outcome = ops::send_message(&h.services, "solo", &cid, "anyone?", None).await.unwrap();
    assert!(outcome.deliveries.is_empty());
}

#[tokio::test]
async fn read_time_only_moves_forward() {
    let h = Harness::new();
    h.user("alice").await;
    h.user("bob").await;
    let mut bob_web = h.web_device("bob", "tok-bob").await;
    let cid = ops::create(&h.services, "alice", &["bob".into()], "", Some("2024-01-01T00:00:00Z"))
        .await
        .unwrap();
    drain(&mut bob_web);

    let later = "2024-01-02T00:00:00.000Z";
    let earlier = "2024-01-01T12:00:00.000Z";
    ops::update_status(&h.services, &cid, "alice", Some(later), Some(true)).await.unwrap();
    ops::update_status(&h.services, &cid, "alice", Some(earlier), Some(false)).await.unwrap();

    let mut members = h.store.get_members(&cid).await.unwrap().unwrap();
    let alice = members.get_mut("alice").unwrap();
    assert_eq!(alice.read_time, later);
    assert!(!alice.typing);

    let notes = drain(&mut bob_web);
    assert_eq!(cmds(&notes), vec!["UpdateUserStatus", "UpdateUserStatus"]);
    assert_eq!(notes[1]["NewReadTime"], later);
}
#[tokio::test]
async fn history_entries_are_unique_per_author_and_time() {
    let h = Harness::new();
    h.user("alice").await;
    h.user("bob").await;
    let mut bob_web = h.web_device("bob", "tok-bob").await;
    let cid = ops::create(&h.services, "alice", &["bob".into()], "", Some("2024-01-01T00:00:00Z"))
        .await
        .unwrap();
    drain(&mut bob_web);

    let t = "2024-01-01T00:00:05.000Z";
    ops::send_message(&h.services, "alice", &cid, "first", Some(t)).await.unwrap();
    let clash = ops::send_message(&h.services, "alice", &cid, "second", Some(t)).await;
    assert!(matches!(clash, Err(AppError::Conflict(_))));
    // A different author may post at the same instant.
    ops::send_message(&h.services, "bob", &cid, "same instant", Some(t)).await.unwrap();

    // Server-stamped sends in a tight loop never collide.
    for i in 0..20 {
        ops::send_message(&h.services, "alice", &cid, &format!("burst {}", i), None).await.unwrap();
    }

    let history = h.store.query_messages(&cid, MessageQuery::All).await.unwrap();
    assert_eq!(history.len(), 22);
    assert!(history.iter().any(|m| m.content == "first"));
    assert!(!history.iter().any(|m| m.content == "second"));
    assert!(!drain(&mut bob_web).iter().any(|n| n["content"] == "second"));
    assert_eq!(h.get("bob").await.membership(&cid).unwrap().unread_count, 21);
}

#[tokio::test]
async fn late_client_time_does_not_rewind_conversation() {
    let h = Harness::new();
    h.user("alice").await;
    h.user("bob").await;
    let cid = ops::create(&h.services, "alice", &["bob".into()], "", Some("2024-01-01T00:00:00Z"))
        .await
        .unwrap();

    ops::send_message(&h.services, "alice", &cid, "now", Some("2024-01-02T00:00:00Z")).await.unwrap();
    ops::send_message(&h.services, "bob", &cid, "stale", Some("2023-12-31T00:00:00Z")).await.unwrap();

    let convo = h.store.get_conversation(&cid).await.unwrap().unwrap();
    assert_eq!(convo.m_time, "2024-01-02T00:00:00.000Z");
    assert_eq!(h.store.query_messages(&cid, MessageQuery::All).await.unwrap().len(), 2);
}

#[tokio::test]
async fn sender_without_account_is_refused() {
    let h = Harness::new();
    h.user("alice").await;
    let cid = ops::create(&h.services, "alice", &["alice".into()], "", None).await.unwrap();

    let result = ops::send_message(&h.services, "ghost", &cid, "boo", None).await;
    assert!(matches!(result, Err(AppError::Auth(_))));
    assert!(h.store.query_messages(&cid, MessageQuery::All).await.unwrap().is_empty());
}

#[tokio::test]
async fn autoreply_fires_once_per_conversation() {
    let h = Harness::new();
    h.user("alice").await;
    let mut bob = h.user("bob").await;
    bob.autoreply_message = "on vacation".into();
    h.store.put_user(&bob).await.unwrap();
    let mut alice_web = h.web_device("alice", "tok-alice").await;

    let cid = ops::create(&h.services, "alice", &["bob".into()], "", None).await.unwrap();
    drain(&mut alice_web);

    let first = ops::send_message(&h.services, "alice", &cid, "hello", Some("2024-01-01T00:00:01Z")).await.unwrap();
    let second = ops::send_message(&h.services, "alice", &cid, "again", Some("2024-01-01T00:00:02Z")).await.unwrap();
    assert_eq!(first.autoreplies, 1);
    assert_eq!(second.autoreplies, 0);

    let history = h.store.query_messages(&cid, MessageQuery::All).await.unwrap();
    let replies: Vec<_> = history.iter().filter(|m| m.f_username == "bob").collect();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].content, "AUTOREPLY: on vacation");

    let notes = drain(&mut alice_web);
    assert!(notes.iter().any(|n| n["content"] == "AUTOREPLY: on vacation"));
    assert_eq!(h.get("bob").await.membership(&cid).unwrap().autoreply_sent, 1);
}

#[tokio::test]
async fn mobile_push_and_sms_fallback() {
    let h = Harness::new();
    h.user("alice").await;
    let mut bob = h.user("bob").await;
    bob.devices.register(DeviceClass::Android, "broken-droid");
    bob.devices.register(DeviceClass::Fireos, "kindle");
    h.store.put_user(&bob).await.unwrap();
    let mut carol = h.user("carol").await;
    carol.phone = "+15551234567".into();
    carol.phone_gateway = "5551234567@vtext.com".into();
    h.store.put_user(&carol).await.unwrap();

    let cid = ops::create(&h.services, "alice", &["bob".into(), "carol".into()], "Weekend", None)
        .await
        .unwrap();
    let outcome = ops::send_message(&h.services, "alice", &cid, "<img src='cat.png'>", None).await.unwrap();

    let sent = h.push.sent.lock().await.clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, DeviceClass::Fireos);
    assert_eq!(sent[0].2.title, "alice sent you a picture!");

    let sms = h.sms.sent.lock().await.clone();
    assert_eq!(sms.len(), 1);
    assert_eq!(sms[0].0, "5551234567@vtext.com");
    assert_eq!(sms[0].2, "Weekend");

    let bob_report = outcome.deliveries.iter().find(|(n, _)| n == "bob").unwrap().1;
    assert_eq!(bob_report.mobile, 1);
    assert_eq!(bob_report.sms, 0);
}

#[tokio::test]
async fn files_rename_and_history_reads() {
    let h = Harness::new();
    h.user("alice").await;
    let mut alice_web = h.web_device("alice", "tok").await;
    let cid = ops::create(&h.services, "alice", &["alice".into()], "old", None).await.unwrap();
    drain(&mut alice_web);

    ops::rename(&h.services, &cid, "new").await.unwrap();
    let file = ConvoFile { f_username: "alice".into(), file_url: "https://f/1".into(), m_time: "t".into() };
    ops::add_file(&h.services, &cid, file.clone()).await.unwrap();
    ops::add_file(&h.services, &cid, file).await.unwrap();
    assert_eq!(cmds(&drain(&mut alice_web)), vec!["update_convo_name", "UpdateConvoFiles", "UpdateConvoFiles"]);

    for i in 0..60 {
        let t = format!("2024-01-01T00:{:02}:00Z", i);
        ops::send_message(&h.services, "alice", &cid, &format!("m{}", i), Some(&t)).await.unwrap();
    }

    let data = ops::convo_data(&h.services, &cid, MessageQuery::Latest(50), "GetConvoData")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(data["Name"], "new");
    assert_eq!(data["Files"].as_array().unwrap().len(), 1);
    let messages = data["Messages"].as_array().unwrap();
    assert_eq!(messages.len(), 50);
    assert_eq!(messages[0]["content"], "m10");
    assert_eq!(messages[49]["content"], "m59");

    let since = ops::convo_data(&h.services, &cid, MessageQuery::Since("2024-01-01T00:57:00.000Z".into()), "GetConvoData")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(since["Messages"].as_array().unwrap().len(), 2);

    assert!(ops::convo_data(&h.services, "nope", MessageQuery::All, "GetAllConvoData").await.unwrap().is_none());
}
