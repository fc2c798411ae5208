mod common;

use common::{chat_fixture, StubDirectory};
use interaction_service::error::AppError;
use interaction_service::models::{ChatMessage, MessageType, MAX_CONTENT_BYTES};
use interaction_service::repository::ChatStore;

fn directory() -> StubDirectory {
    StubDirectory::new()
        .with_user("u1", "alice")
        .with_user("u2", "bob")
        .with_user("u3", "carol")
}

#[tokio::test]
async fn create_join_and_send() {
    let fx = chat_fixture(directory());

    let room = fx
        .service
        .create_chatroom("u1", "r1", "general chatter", false)
        .await
        .unwrap();
    assert_eq!(room.creator_id, "u1");
    assert_eq!(room.member_ids, vec!["u1".to_string()]);

    let system = fx.service.join_chatroom(&room.id, "u2").await.unwrap();
    assert_eq!(system.content, "bob joined the chatroom");
    assert_eq!(system.user_id, "system");
    assert_eq!(system.message_type, MessageType::System);

    // Membership symmetry after join.
    assert!(fx.service.is_member(&room.id, "u2").await.unwrap());
    let rooms = fx.service.get_chatrooms("u2").await.unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].id, room.id);

    let message = fx
        .service
        .send_message(&room.id, "u2", "hi", MessageType::Text)
        .await
        .unwrap();
    assert_eq!(message.username, "bob");
    assert_eq!(message.message_type, MessageType::Text);

    // History is chronological: join announcement first, then the message.
    let (messages, _) = fx
        .service
        .get_messages(&room.id, "u2", 10, None)
        .await
        .unwrap();
    let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["bob joined the chatroom", "hi"]);
}

#[tokio::test]
async fn non_members_cannot_send_or_read() {
    let fx = chat_fixture(directory());
    let room = fx
        .service
        .create_chatroom("u1", "r1", "", false)
        .await
        .unwrap();

    let err = fx
        .service
        .send_message(&room.id, "u3", "hello", MessageType::Text)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));

    let err = fx
        .service
        .get_messages(&room.id, "u3", 10, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));
}

#[tokio::test]
async fn duplicate_join_is_rejected() {
    let fx = chat_fixture(directory());
    let room = fx
        .service
        .create_chatroom("u1", "r1", "", false)
        .await
        .unwrap();
    fx.service.join_chatroom(&room.id, "u2").await.unwrap();

    let err = fx.service.join_chatroom(&room.id, "u2").await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));

    // The creator is a member from the start and cannot re-join either.
    let err = fx.service.join_chatroom(&room.id, "u1").await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));
}

#[tokio::test]
async fn leave_rules_and_symmetry() {
    let fx = chat_fixture(directory());
    let room = fx
        .service
        .create_chatroom("u1", "r1", "", false)
        .await
        .unwrap();
    fx.service.join_chatroom(&room.id, "u2").await.unwrap();

    // Creator cannot abandon a room that still has members.
    let err = fx.service.leave_chatroom(&room.id, "u1").await.unwrap_err();
    assert!(matches!(err, AppError::FailedPrecondition(_)));

    let system = fx.service.leave_chatroom(&room.id, "u2").await.unwrap();
    assert_eq!(system.content, "bob left the chatroom");

    assert!(!fx.service.is_member(&room.id, "u2").await.unwrap());
    assert!(fx.service.get_chatrooms("u2").await.unwrap().is_empty());

    // Remaining member order is preserved.
    let stored = fx.store.get_chatroom(&room.id).await.unwrap().unwrap();
    assert_eq!(stored.member_ids, vec!["u1".to_string()]);

    // Alone in the room, the creator may leave.
    fx.service.leave_chatroom(&room.id, "u1").await.unwrap();
}

#[tokio::test]
async fn leaving_without_membership_is_not_found() {
    let fx = chat_fixture(directory());
    let room = fx
        .service
        .create_chatroom("u1", "r1", "", false)
        .await
        .unwrap();

    let err = fx.service.leave_chatroom(&room.id, "u3").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn unknown_users_and_rooms_are_not_found() {
    let fx = chat_fixture(directory());
    let err = fx
        .service
        .create_chatroom("ghost", "r1", "", false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = fx.service.join_chatroom("missing-room", "u1").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn content_size_boundary() {
    let fx = chat_fixture(directory());
    let room = fx
        .service
        .create_chatroom("u1", "r1", "", false)
        .await
        .unwrap();

    let at_limit = "a".repeat(MAX_CONTENT_BYTES);
    fx.service
        .send_message(&room.id, "u1", &at_limit, MessageType::Text)
        .await
        .unwrap();

    let over_limit = "a".repeat(MAX_CONTENT_BYTES + 1);
    let err = fx
        .service
        .send_message(&room.id, "u1", &over_limit, MessageType::Text)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));

    let err = fx
        .service
        .send_message(&room.id, "u1", "", MessageType::Text)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));
}

#[tokio::test]
async fn cursorless_reads_come_from_cache_newest_window() {
    let fx = chat_fixture(directory());
    let room = fx
        .service
        .create_chatroom("u1", "r1", "", false)
        .await
        .unwrap();

    for i in 0..6 {
        fx.service
            .send_message(&room.id, "u1", &format!("m{i}"), MessageType::Text)
            .await
            .unwrap();
    }

    // The most recent window, returned ascending.
    let (messages, cursor) = fx
        .service
        .get_messages(&room.id, "u1", 3, None)
        .await
        .unwrap();
    let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["m3", "m4", "m5"]);
    assert!(cursor.is_none());
}

#[tokio::test]
async fn cursor_reads_walk_the_durable_log() {
    let fx = chat_fixture(directory());
    let room = fx
        .service
        .create_chatroom("u1", "r1", "", false)
        .await
        .unwrap();

    // Seed the durable log directly; the hot cache stays empty, which is
    // the state after a cache flush.
    let base = chrono::Utc::now();
    for i in 0..5 {
        let mut msg =
            ChatMessage::new(&room.id, "u1", "alice", &format!("m{i}"), MessageType::Text);
        msg.created_at = base + chrono::Duration::seconds(i);
        fx.store.put_message(&msg).await.unwrap();
    }

    let (page1, cursor) = fx
        .service
        .get_messages(&room.id, "u1", 2, None)
        .await
        .unwrap();
    assert_eq!(
        page1.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        ["m0", "m1"]
    );
    let cursor = cursor.expect("full page yields a cursor");

    let (page2, cursor2) = fx
        .service
        .get_messages(&room.id, "u1", 2, Some(&cursor))
        .await
        .unwrap();
    assert_eq!(
        page2.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        ["m2", "m3"]
    );
    let cursor2 = cursor2.expect("full page yields a cursor");

    let (page3, cursor3) = fx
        .service
        .get_messages(&room.id, "u1", 2, Some(&cursor2))
        .await
        .unwrap();
    assert_eq!(
        page3.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        ["m4"]
    );
    assert!(cursor3.is_none());
}
