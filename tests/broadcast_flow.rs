//! Anonymous room flows driven through the router with a recording gateway.

mod common;

use std::time::Duration;

use common::*;
use relay_bot::config::RelayMode;
use relay_bot::relay::notices;
use relay_bot::relay::types::{MessageContent, UserId};
use relay_bot::relay::{RelayRouter, RelayState};

const A: i64 = 1;
const B: i64 = 2;
const C: i64 = 3;
const U: i64 = 4;

async fn join(router: &RelayRouter, user: i64) -> String {
    handle(router, command(user, "start", &[])).await;
    router.alias_of(UserId(user)).await.expect("alias assigned")
}

#[tokio::test]
async fn password_gate_then_broadcast_excludes_sender_and_blocked() {
    let gateway = MockGateway::new();
    let router = router(&config(RelayMode::Broadcast), &gateway);

    handle(&router, command(OWNER, "setpassword", &["abc123"])).await;
    assert_eq!(
        gateway.texts_to(OWNER).await,
        vec![notices::PASSWORD_ENABLED.to_string()]
    );

    for user in [A, B] {
        handle(&router, command(user, "start", &[])).await;
        handle(&router, text(user, "abc123", 2)).await;
        assert!(router.alias_of(UserId(user)).await.is_some());
    }

    // New user walks through the gate.
    handle(&router, command(U, "start", &[])).await;
    assert_eq!(
        gateway.texts_to(U).await,
        vec![notices::PASSWORD_PROMPT.to_string()]
    );
    assert!(router.alias_of(UserId(U)).await.is_none());

    handle(&router, text(U, "wrong", 2)).await;
    assert_eq!(
        gateway.texts_to(U).await[1..],
        [
            notices::WRONG_PASSWORD.to_string(),
            notices::PASSWORD_PROMPT.to_string()
        ]
    );
    assert!(router.alias_of(UserId(U)).await.is_none());

    handle(&router, text(U, "abc123", 3)).await;
    let alias_u = router.alias_of(UserId(U)).await.expect("alias after password");
    assert_eq!(
        gateway.last_to(U).await.unwrap().text(),
        Some(notices::password_accepted(&alias_u).as_str())
    );

    let alias_b = router.alias_of(UserId(B)).await.unwrap();
    handle(&router, command(OWNER, "block", &[alias_b.as_str()])).await;
    assert!(router.is_blocked(UserId(B)).await);

    gateway.clear().await;
    handle(&router, text(U, "hello room", 4)).await;

    let expected = format!("{alias_u}: hello room");
    assert_eq!(gateway.texts_to(A).await, vec![expected]);
    assert!(gateway.to(B).await.is_empty());
    assert!(gateway.to(U).await.is_empty());
    assert!(gateway.to(OWNER).await.is_empty());
    assert_eq!(router.stats().await.relayed, 1);
}

#[tokio::test]
async fn unregistered_user_is_told_to_start() {
    let gateway = MockGateway::new();
    let router = router(&config(RelayMode::Broadcast), &gateway);
    join(&router, A).await;

    handle(&router, text(U, "hi", 1)).await;

    assert_eq!(
        gateway.texts_to(U).await,
        vec![notices::START_FIRST.to_string()]
    );
    assert_eq!(gateway.to(A).await.len(), 1, "only the welcome");
}

#[tokio::test]
async fn open_room_welcomes_with_alias() {
    let gateway = MockGateway::new();
    let router = router(&config(RelayMode::Broadcast), &gateway);

    let alias = join(&router, A).await;
    assert!(alias.starts_with("USER"));
    assert_eq!(
        gateway.texts_to(A).await,
        vec![notices::room_welcome(&alias)]
    );

    // A second /start keeps the alias.
    assert_eq!(join(&router, A).await, alias);
}

#[tokio::test]
async fn seventh_message_in_window_is_rate_limited() {
    let gateway = MockGateway::new();
    let router = router(&config(RelayMode::Broadcast), &gateway);
    join(&router, A).await;
    join(&router, B).await;
    gateway.clear().await;

    for i in 0..7 {
        handle(&router, text(A, &format!("m{i}"), 10 + i)).await;
    }

    assert_eq!(gateway.to(B).await.len(), 6);
    assert_eq!(
        gateway.texts_to(A).await,
        vec![notices::SLOW_DOWN.to_string()]
    );
    let stats = router.stats().await;
    assert_eq!(stats.relayed, 6);
    assert_eq!(stats.rate_limited, 1);
}

#[tokio::test]
async fn owner_is_not_rate_limited() {
    let gateway = MockGateway::new();
    let router = router(&config(RelayMode::Broadcast), &gateway);
    join(&router, OWNER).await;
    join(&router, A).await;
    gateway.clear().await;

    for i in 0..10 {
        handle(&router, text(OWNER, &format!("m{i}"), 10 + i)).await;
    }

    assert_eq!(gateway.to(A).await.len(), 10);
    assert_eq!(router.stats().await.rate_limited, 0);
}

#[tokio::test]
async fn blocking_the_owner_fails() {
    let gateway = MockGateway::new();
    let router = router(&config(RelayMode::Broadcast), &gateway);

    handle(&router, command(OWNER, "block", &[OWNER.to_string().as_str()])).await;

    assert!(!router.is_blocked(UserId(OWNER)).await);
    assert_eq!(
        gateway.texts_to(OWNER).await,
        vec![notices::CANNOT_BLOCK_OWNER.to_string()]
    );
}

#[tokio::test]
async fn blocked_user_cannot_enter_or_post() {
    let gateway = MockGateway::new();
    let router = router(&config(RelayMode::Broadcast), &gateway);
    join(&router, A).await;
    join(&router, B).await;
    handle(&router, command(OWNER, "block", &[B.to_string().as_str()])).await;
    gateway.clear().await;

    handle(&router, command(B, "start", &[])).await;
    handle(&router, text(B, "let me in", 5)).await;

    assert_eq!(
        gateway.texts_to(B).await,
        vec![notices::BLOCKED.to_string(), notices::BLOCKED.to_string()]
    );
    assert!(gateway.to(A).await.is_empty());

    handle(&router, command(OWNER, "unblock", &[B.to_string().as_str()])).await;
    handle(&router, text(B, "back", 6)).await;
    assert_eq!(gateway.to(A).await.len(), 1);
}

#[tokio::test]
async fn non_owner_admin_commands_are_ignored() {
    let gateway = MockGateway::new();
    let router = router(&config(RelayMode::Broadcast), &gateway);
    join(&router, A).await;
    join(&router, B).await;
    let alias_b = router.alias_of(UserId(B)).await.unwrap();
    gateway.clear().await;

    handle(&router, command(A, "block", &[alias_b.as_str()])).await;
    handle(&router, command(A, "users", &[])).await;

    assert!(!router.is_blocked(UserId(B)).await);
    assert!(gateway.deliveries().await.is_empty());
}

#[tokio::test]
async fn failed_recipient_does_not_stop_fan_out() {
    let gateway = MockGateway::new();
    let router = router(&config(RelayMode::Broadcast), &gateway);
    for user in [A, B, C] {
        join(&router, user).await;
    }
    gateway.fail_for(B).await;
    gateway.clear().await;

    handle(&router, text(A, "still here", 7)).await;

    assert_eq!(gateway.to(C).await.len(), 1);
    assert!(gateway.to(A).await.is_empty(), "sender gets no error");
    assert_eq!(router.stats().await.delivery_failures, 1);
}

#[tokio::test]
async fn slow_recipient_times_out_and_others_still_receive() {
    let gateway = MockGateway::new();
    let router = router(&config(RelayMode::Broadcast), &gateway);
    for user in [A, B, C] {
        join(&router, user).await;
    }
    gateway.delay_for(B, Duration::from_secs(2)).await;
    gateway.clear().await;

    handle(&router, text(A, "hurry", 8)).await;

    assert_eq!(gateway.to(C).await.len(), 1);
    assert_eq!(router.stats().await.delivery_failures, 1);
}

#[tokio::test]
async fn room_relays_text_only() {
    let gateway = MockGateway::new();
    let router = router(&config(RelayMode::Broadcast), &gateway);
    join(&router, A).await;
    join(&router, B).await;
    gateway.clear().await;

    let photo = MessageContent::Photo {
        file_id: "f1".into(),
        caption: Some("pic".into()),
    };
    handle(&router, message(A, photo, 9)).await;

    assert!(gateway.to(B).await.is_empty());
    assert_eq!(
        gateway.texts_to(A).await,
        vec![notices::TEXT_ONLY.to_string()]
    );
}

#[tokio::test]
async fn users_and_stats_report_members() {
    let gateway = MockGateway::new();
    let router = router(&config(RelayMode::Broadcast), &gateway);
    let alias_a = join(&router, A).await;
    join(&router, B).await;
    handle(&router, command(OWNER, "block", &[alias_a.to_lowercase().as_str()])).await;
    assert!(router.is_blocked(UserId(A)).await);
    gateway.clear().await;

    handle(&router, command(OWNER, "users", &[])).await;
    let listing = gateway.last_to(OWNER).await.unwrap();
    assert!(listing.text().unwrap().contains(&format!("{alias_a} (blocked)")));

    handle(&router, command(OWNER, "stats", &[])).await;
    let stats = gateway.last_to(OWNER).await.unwrap();
    let stats = stats.text().unwrap();
    assert!(stats.contains("Total users: 2"));
    assert!(stats.contains("Blocked: 1"));

    handle(&router, command(OWNER, "block", &["NOBODY"])).await;
    assert_eq!(
        gateway.last_to(OWNER).await.unwrap().text(),
        Some(notices::target_not_found("NOBODY").as_str())
    );
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(RelayMode::Broadcast);
    config.data_dir = dir.path().to_path_buf();

    let gateway = MockGateway::new();
    let first = RelayRouter::new(
        &config,
        gateway.clone(),
        RelayState::load(&config).await,
    );
    handle(&first, command(OWNER, "setpassword", &["abc123"])).await;
    handle(&first, command(A, "start", &[])).await;
    handle(&first, text(A, "abc123", 2)).await;
    let alias = first.alias_of(UserId(A)).await.unwrap();
    handle(&first, command(OWNER, "block", &[B.to_string().as_str()])).await;

    let second = RelayRouter::new(
        &config,
        gateway.clone(),
        RelayState::load(&config).await,
    );
    assert_eq!(second.alias_of(UserId(A)).await, Some(alias));
    assert!(second.is_blocked(UserId(B)).await);

    gateway.clear().await;
    handle(&second, command(C, "start", &[])).await;
    assert_eq!(
        gateway.texts_to(C).await,
        vec![notices::PASSWORD_PROMPT.to_string()]
    );
}

#[tokio::test]
async fn password_must_match_exactly() {
    let gateway = MockGateway::new();
    let router = router(&config(RelayMode::Broadcast), &gateway);
    handle(&router, command(OWNER, "setpassword", &["abc123"])).await;
    handle(&router, command(U, "start", &[])).await;
    gateway.clear().await;

    handle(&router, text(U, "  abc123  ", 2)).await;

    assert!(router.alias_of(UserId(U)).await.is_none());
    assert_eq!(
        gateway.texts_to(U).await,
        vec![
            notices::WRONG_PASSWORD.to_string(),
            notices::PASSWORD_PROMPT.to_string()
        ]
    );
}

#[tokio::test]
async fn rejected_media_does_not_use_up_the_rate_window() {
    let gateway = MockGateway::new();
    let router = router(&config(RelayMode::Broadcast), &gateway);
    join(&router, A).await;
    join(&router, B).await;
    gateway.clear().await;

    for i in 0..6 {
        let photo = MessageContent::Photo {
            file_id: format!("f{i}"),
            caption: None,
        };
        handle(&router, message(A, photo, 20 + i)).await;
    }
    for i in 0..6 {
        handle(&router, text(A, &format!("m{i}"), 30 + i)).await;
    }

    assert_eq!(gateway.to(B).await.len(), 6);
    assert_eq!(router.stats().await.rate_limited, 0);
}
