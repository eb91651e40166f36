mod support;

use serde_json::json;

use support::{spawn_server, WsClient};

#[tokio::test]
async fn two_clients_exchange_a_private_message() {
    let server = spawn_server().await;

    let mut u1 = WsClient::join(&server, "u1").await;
    u1.expect_online(&[]).await;
    let mut u2 = WsClient::join(&server, "u2").await;

    u1.expect_online(&["u2"]).await;
    u2.expect_online(&["u1"]).await;

    u1.send_message("u2", "hi").await;
    let received = u2.expect("receive-message").await;
    assert_eq!(received["senderId"], "u1");
    assert_eq!(received["receiverId"], "u2");
    assert_eq!(received["payload"], "hi");
    assert!(received["timestamp"].as_i64().is_some());

    // 不回显给发送方
    let echoed = u1.drain_until_pong().await;
    assert!(echoed.iter().all(|(name, _)| name != "receive-message"));

    u1.close().await;
    u2.expect_online(&[]).await;
    assert_eq!(server.online().await, vec!["u2"]);
}

#[tokio::test]
async fn payload_is_relayed_byte_for_byte() {
    let server = spawn_server().await;
    let mut alice = WsClient::join(&server, "alice").await;
    let mut bob = WsClient::join(&server, "bob").await;
    bob.expect_online(&["alice"]).await;

    let ciphertext = "U2FsdGVkX1+vupppZksvRf5pq5g5XjFRlipRkwB0K1Y=\n\t ünïcødé";
    alice
        .emit(
            "private-message",
            json!({ "senderId": "alice", "receiverId": "bob", "encryptedMessage": ciphertext }),
        )
        .await;

    let received = bob.expect("receive-message").await;
    assert_eq!(received["payload"], ciphertext);
}

#[tokio::test]
async fn structured_payload_is_relayed_and_archived_unchanged() {
    let server = spawn_server().await;
    let mut alice = WsClient::join(&server, "alice").await;
    let mut bob = WsClient::join(&server, "bob").await;
    bob.expect_online(&["alice"]).await;

    let envelope = json!({
        "ct": "U2FsdGVkX1+vupppZksvRf5pq5g5XjFRlipRkwB0K1Y=",
        "iv": "a1b2c3",
        "keys": [{ "id": 7, "wrapped": "xyz" }],
        "v": 2
    });
    alice
        .emit(
            "private-message",
            json!({ "receiverId": "bob", "payload": envelope.clone() }),
        )
        .await;

    let received = bob.expect("receive-message").await;
    assert_eq!(received["payload"], envelope);

    // 保存在后台完成，轮询到消息出现为止
    let mut history = Vec::new();
    for _ in 0..100 {
        alice
            .emit("get-messages", json!({ "userId": "alice", "partnerId": "bob" }))
            .await;
        let batch = alice.expect("chat-history").await;
        history = batch.as_array().cloned().unwrap_or_default();
        if !history.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["payload"], envelope);
}

#[tokio::test]
async fn message_to_offline_identity_is_dropped_silently() {
    let server = spawn_server().await;
    let mut u1 = WsClient::join(&server, "u1").await;
    u1.expect_online(&[]).await;

    u1.send_message("nobody", "hello?").await;
    let seen = u1.drain_until_pong().await;
    assert!(seen.is_empty(), "unexpected events: {seen:?}");
}

#[tokio::test]
async fn malformed_and_unknown_frames_are_ignored() {
    let server = spawn_server().await;
    let mut u1 = WsClient::join(&server, "u1").await;
    u1.expect_online(&[]).await;

    u1.send_raw("definitely not json").await;
    u1.send_raw(r#"{"data": "no event name"}"#).await;
    u1.emit("teleport", json!({ "to": "mars" })).await;
    u1.emit("join", json!(42)).await;
    u1.emit("private-message", json!({ "payload": "missing receiver" }))
        .await;
    u1.emit("get-messages", json!({ "userId": "u1" })).await;

    let seen = u1.drain_until_pong().await;
    assert!(seen.is_empty(), "unexpected events: {seen:?}");
    assert_eq!(server.online().await, vec!["u1"]);
}

#[tokio::test]
async fn events_before_join_are_ignored() {
    let server = spawn_server().await;
    let mut bob = WsClient::join(&server, "bob").await;
    bob.expect_online(&[]).await;

    let mut anonymous = WsClient::connect(&server).await;
    anonymous.send_message("bob", "sneaky").await;
    anonymous
        .emit("get-messages", json!({ "userId": "x", "partnerId": "bob" }))
        .await;
    assert!(anonymous.drain_until_pong().await.is_empty());

    let seen = bob.drain_until_pong().await;
    assert!(seen.iter().all(|(name, _)| name != "receive-message"));
}

#[tokio::test]
async fn leave_keeps_transport_but_stops_delivery() {
    let server = spawn_server().await;
    let mut u1 = WsClient::join(&server, "u1").await;
    let mut u2 = WsClient::join(&server, "u2").await;
    u2.expect_online(&["u1"]).await;

    u1.emit("leave", serde_json::Value::Null).await;
    u2.expect_online(&[]).await;
    assert_eq!(server.online().await, vec!["u2"]);

    // 会话已关闭：消息不再投递，连接本身保持
    u2.send_message("u1", "are you there?").await;
    u2.drain_until_pong().await;
    assert_eq!(server.online().await, vec!["u2"]);
}

#[tokio::test]
async fn rejoin_from_new_connection_takes_over_identity() {
    let server = spawn_server().await;
    let mut sender = WsClient::join(&server, "sender").await;
    let mut old = WsClient::join(&server, "a").await;
    sender.expect_online(&["a"]).await;
    let mut new = WsClient::join(&server, "a").await;
    new.expect_online(&["sender"]).await;

    sender.send_message("a", "for the newest").await;
    let received = new.expect("receive-message").await;
    assert_eq!(received["payload"], "for the newest");

    let seen = old.drain_until_pong().await;
    assert!(seen.iter().all(|(name, _)| name != "receive-message"));

    // 旧连接关闭不会让新连接下线
    old.close().await;
    new.drain_until_pong().await;
    assert_eq!(server.online().await, vec!["a", "sender"]);
}
