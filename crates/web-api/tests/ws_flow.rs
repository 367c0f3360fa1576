mod support;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite};

use support::{
    expect_event, expect_silence, next_text, send_event, send_text, settle, TestServer,
};

#[tokio::test]
async fn websocket_call_signaling_flow() {
    let server = TestServer::spawn(true).await;
    let (_, token_a) = server.register("A").await;
    let (_, token_b) = server.register("B").await;

    let mut a = server.connect(&token_a).await;
    expect_event(&mut a, "message_response").await;
    let mut b = server.connect(&token_b).await;
    let joined = expect_event(&mut b, "message_response").await;
    assert_eq!(joined, json!({"message": "B has joined the chat.", "username": "System"}));
    expect_event(&mut a, "message_response").await;

    send_event(&mut a, json!({"event": "join_call", "data": {"room": "r1"}})).await;
    expect_silence(&mut a).await;

    send_event(&mut b, json!({"event": "join_call", "data": {"room": "r1"}})).await;
    let ready_a = expect_event(&mut a, "peers_connected").await;
    let ready_b = expect_event(&mut b, "peers_connected").await;
    assert_eq!(ready_a, ready_b);
    assert_ne!(ready_a["peer1"], ready_a["peer2"]);

    let offer = json!({"type": "offer", "sdp": "v=0\r\no=- 46117 2 IN IP4 127.0.0.1"});
    send_event(
        &mut b,
        json!({"event": "webrtc_signal", "data": {"room": "r1", "signal": offer}}),
    )
    .await;
    assert_eq!(expect_event(&mut a, "webrtc_signal").await, offer);
    expect_silence(&mut b).await;

    a.close(None).await.expect("close A");
    let left = expect_event(&mut b, "peer_left").await;
    assert_eq!(left, json!({"peer": "A"}));
}

#[tokio::test]
async fn websocket_signal_frame_relayed_byte_for_byte() {
    let server = TestServer::spawn(true).await;
    let (_, token_a) = server.register("A").await;
    let (_, token_b) = server.register("B").await;
    let mut a = server.connect(&token_a).await;
    let mut b = server.connect(&token_b).await;

    send_event(&mut a, json!({"event": "join_call", "data": {"room": "r1"}})).await;
    settle().await;
    send_event(&mut b, json!({"event": "join_call", "data": {"room": "r1"}})).await;
    expect_event(&mut a, "peers_connected").await;
    expect_event(&mut b, "peers_connected").await;

    let raw = r#"{"type":"offer","sdp":"v=0","n":1.0e2,"big":123456789012345678901234567890}"#;
    send_text(
        &mut b,
        &format!(r#"{{"data":{{"signal":{raw},"room":"r1"}},"event":"webrtc_signal"}}"#),
    )
    .await;

    let expected = format!(r#"{{"event":"webrtc_signal","data":{raw}}}"#);
    loop {
        let frame = next_text(&mut a).await.expect("relayed signal");
        if frame.contains("webrtc_signal") {
            assert_eq!(frame, expected);
            break;
        }
    }
    expect_silence(&mut b).await;
}

#[tokio::test]
async fn websocket_call_room_may_share_chat_room_name() {
    let server = TestServer::spawn(true).await;
    let (_, token_a) = server.register("alice").await;
    let (_, token_b) = server.register("bob").await;
    let mut a = server.connect(&token_a).await;
    let mut b = server.connect(&token_b).await;

    send_event(
        &mut b,
        json!({"event": "join", "data": {"username": "bob", "room": "alice-bob"}}),
    )
    .await;
    settle().await;
    send_event(&mut a, json!({"event": "join_call", "data": {"room": "alice-bob"}})).await;
    settle().await;
    send_event(&mut b, json!({"event": "join_call", "data": {"room": "alice-bob"}})).await;

    let ready = expect_event(&mut a, "peers_connected").await;
    assert_eq!(expect_event(&mut b, "peers_connected").await, ready);
}

#[tokio::test]
async fn websocket_third_peer_rejected() {
    let server = TestServer::spawn(true).await;
    let mut clients = Vec::new();
    for name in ["A", "B", "C"] {
        let (_, token) = server.register(name).await;
        clients.push(server.connect(&token).await);
    }
    settle().await;

    for ws in clients.iter_mut() {
        send_event(ws, json!({"event": "join_call", "data": {"room": "r1"}})).await;
        settle().await;
    }

    let error = expect_event(&mut clients[2], "error").await;
    assert_eq!(error["code"], "CALL_ROOM_FULL");
}

#[tokio::test]
async fn websocket_refuses_unauthenticated_connections() {
    let server = TestServer::spawn(true).await;

    for url in [server.ws_url(None), server.ws_url(Some("not-a-jwt"))] {
        match connect_async(url).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 401);
            }
            other => panic!("expected 401 refusal, got {:?}", other.map(|_| ())),
        }
    }
}

#[tokio::test]
async fn websocket_chat_broadcast() {
    let server = TestServer::spawn(true).await;
    let (_, token_a) = server.register("alice").await;
    let (_, token_b) = server.register("bob").await;
    let mut a = server.connect(&token_a).await;
    let mut b = server.connect(&token_b).await;
    settle().await;

    send_event(&mut a, json!({"event": "message", "data": "hello everyone"})).await;
    assert_eq!(expect_event(&mut a, "message").await, json!("hello everyone"));
    assert_eq!(expect_event(&mut b, "message").await, json!("hello everyone"));

    send_event(&mut b, json!({"event": "json", "data": {"message": "hi alice"}})).await;
    let response = json!({"message": "hi alice", "username": "bob"});
    loop {
        let data = expect_event(&mut a, "message_response").await;
        if data == response {
            break;
        }
    }

    // 缺字段的事件被丢弃，连接保持可用
    send_event(&mut a, json!({"event": "json", "data": {}})).await;
    send_event(&mut a, json!({"event": "message", "data": "still here"})).await;
    assert_eq!(expect_event(&mut b, "message").await, json!("still here"));
}

#[tokio::test]
async fn websocket_anonymous_allowed_when_policy_relaxed() {
    let server = TestServer::spawn(false).await;
    let (mut guest, _) = connect_async(server.ws_url(None)).await.expect("connect");

    send_event(&mut guest, json!({"event": "json", "data": {"message": "hello"}})).await;
    let data = expect_event(&mut guest, "message_response").await;
    assert_eq!(data, json!({"message": "hello", "username": "Anonymous"}));

    send_event(&mut guest, json!({"event": "join_call", "data": {"room": "r1"}})).await;
    let error = expect_event(&mut guest, "error").await;
    assert_eq!(error["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn private_message_delivery_and_history() {
    let server = TestServer::spawn(true).await;
    let (_, token_a) = server.register("alice").await;
    let (_, token_b) = server.register("bob").await;
    server.register("carol").await;
    let mut a = server.connect(&token_a).await;
    let mut b = server.connect(&token_b).await;

    for (ws, name) in [(&mut a, "alice"), (&mut b, "bob")] {
        send_event(
            ws,
            json!({"event": "join", "data": {"username": name, "room": "alice-bob"}}),
        )
        .await;
    }
    settle().await;

    send_event(
        &mut a,
        json!({"event": "private_message", "data": {
            "room": "alice-bob",
            "message": "lunch?",
            "sender": "alice",
            "recipient": "bob"
        }}),
    )
    .await;

    let delivered = expect_event(&mut b, "new_private_message").await;
    assert_eq!(delivered["message"], "lunch?");
    assert_eq!(delivered["sender"], "alice");
    assert_eq!(delivered["recipient"], "bob");
    assert!(delivered["timestamp"].as_str().is_some_and(|ts| !ts.is_empty()));
    assert_eq!(expect_event(&mut a, "new_private_message").await, delivered);
    assert_eq!(server.messages.len().await, 1);

    let client = Client::new();
    let history: Vec<Value> = client
        .get(server.http("/api/v1/messages/bob"))
        .bearer_auth(&token_a)
        .send()
        .await
        .expect("history")
        .json()
        .await
        .expect("history json");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["message"], "lunch?");
    assert_eq!(history[0]["timestamp"], delivered["timestamp"]);

    let empty: Vec<Value> = client
        .get(server.http("/api/v1/messages/carol"))
        .bearer_auth(&token_a)
        .send()
        .await
        .expect("history")
        .json()
        .await
        .expect("history json");
    assert!(empty.is_empty());

    let status = |path: &'static str, token: Option<String>| {
        let client = client.clone();
        let url = server.http(path);
        async move {
            let mut request = client.get(url);
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            request.send().await.expect("request").status()
        }
    };
    assert_eq!(
        status("/api/v1/messages/alice", Some(token_a.clone())).await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        status("/api/v1/messages/ghost", Some(token_a.clone())).await,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        status("/api/v1/messages/bob", None).await,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn user_list_excludes_caller() {
    let server = TestServer::spawn(true).await;
    let (_, token_a) = server.register("alice").await;
    server.register("carol").await;
    server.register("bob").await;
    let client = Client::new();

    let users: Vec<Value> = client
        .get(server.http("/api/v1/users"))
        .bearer_auth(&token_a)
        .send()
        .await
        .expect("users")
        .json()
        .await
        .expect("users json");
    let names: Vec<&str> = users
        .iter()
        .filter_map(|user| user["username"].as_str())
        .collect();
    assert_eq!(names, vec!["bob", "carol"]);
    assert!(users.iter().all(|user| user["id"].is_string()));

    let status = client
        .get(server.http("/api/v1/users"))
        .send()
        .await
        .expect("users")
        .status();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_check() {
    let server = TestServer::spawn(true).await;
    let response = reqwest::get(server.http("/health")).await.expect("health");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn private_message_resolves_remembered_identities() {
    let server = TestServer::spawn_with(true, true).await;
    let token_a = server.issue_token("alice");
    let token_b = server.issue_token("bob");
    let mut a = server.connect(&token_a).await;
    let mut b = server.connect(&token_b).await;

    for (ws, name) in [(&mut a, "alice"), (&mut b, "bob")] {
        send_event(
            ws,
            json!({"event": "join", "data": {"username": name, "room": "alice-bob"}}),
        )
        .await;
    }
    settle().await;

    send_event(
        &mut b,
        json!({"event": "private_message", "data": {
            "room": "alice-bob",
            "message": "on my way",
            "sender": "bob",
            "recipient": "alice"
        }}),
    )
    .await;

    let delivered = expect_event(&mut a, "new_private_message").await;
    assert_eq!(delivered["message"], "on my way");
    assert_eq!(delivered["sender"], "bob");
}
