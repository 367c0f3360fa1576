#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{EventRouter, Hub, MemoryMessageStore, MemoryUserDirectory};
use domain::{Identity, UserId};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    time::{sleep, timeout},
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use uuid::Uuid;
use web_api::{router as build_router_fn, AppState, JwtConfig, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 运行在随机端口上的测试服务器，析构时优雅关闭
pub struct TestServer {
    pub addr: SocketAddr,
    pub jwt: JwtService,
    pub users: Arc<MemoryUserDirectory>,
    pub messages: Arc<MemoryMessageStore>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn spawn(require_authentication: bool) -> Self {
        Self::spawn_with(require_authentication, false).await
    }

    /// `remember_identities` 时，通过 token 认证的用户会自动进入用户目录
    pub async fn spawn_with(require_authentication: bool, remember_identities: bool) -> Self {
        let jwt = JwtService::new(JwtConfig {
            secret: "test-secret-key-that-is-at-least-32-characters".to_string(),
            expiration_hours: 1,
        });
        let users = Arc::new(MemoryUserDirectory::new());
        let messages = Arc::new(MemoryMessageStore::default());
        let router = Arc::new(EventRouter::new(
            Arc::new(Hub::new(require_authentication)),
            messages.clone(),
            users.clone(),
        ));
        let mut state =
            AppState::new(router, messages.clone(), users.clone(), Arc::new(jwt.clone()));
        if remember_identities {
            state = state.with_known_users(users.clone());
        }
        let app = build_router_fn(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // allow server to start
        sleep(Duration::from_millis(50)).await;

        Self {
            addr,
            jwt,
            users,
            messages,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("ws://{}/api/v1/ws?token={}", self.addr, token),
            None => format!("ws://{}/api/v1/ws", self.addr),
        }
    }

    /// 在用户目录中登记用户并签发 token
    pub async fn register(&self, username: &str) -> (Identity, String) {
        let identity = Identity::authenticated(UserId::from(Uuid::new_v4()), username);
        self.users.add(identity.clone()).await;
        let token = self.jwt.generate_token(&identity).expect("token");
        (identity, token)
    }

    /// 只签发 token，不登记用户
    pub fn issue_token(&self, username: &str) -> String {
        let identity = Identity::authenticated(UserId::from(Uuid::new_v4()), username);
        self.jwt.generate_token(&identity).expect("token")
    }

    pub async fn connect(&self, token: &str) -> WsClient {
        let (ws, _) = connect_async(self.ws_url(Some(token)))
            .await
            .expect("websocket connect");
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn send_event(ws: &mut WsClient, event: Value) {
    ws.send(TungsteniteMessage::Text(event.to_string().into()))
        .await
        .expect("send event");
}

/// 原样发送一个文本帧
pub async fn send_text(ws: &mut WsClient, text: &str) {
    ws.send(TungsteniteMessage::Text(text.to_string().into()))
        .await
        .expect("send text");
}

/// 下一个原始文本帧，超时返回 `None`
pub async fn next_text(ws: &mut WsClient) -> Option<String> {
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next()).await.ok()??;
        match frame.ok()? {
            TungsteniteMessage::Text(text) => return Some(text.as_str().to_string()),
            TungsteniteMessage::Close(_) => return None,
            _ => continue,
        }
    }
}

/// 下一个文本帧（事件信封），超时返回 `None`
pub async fn next_event(ws: &mut WsClient) -> Option<Value> {
    let text = next_text(ws).await?;
    serde_json::from_str(&text).ok()
}

/// 跳过其他事件，直到收到指定名称的事件
pub async fn expect_event(ws: &mut WsClient, name: &str) -> Value {
    loop {
        let event = next_event(ws)
            .await
            .unwrap_or_else(|| panic!("expected event {name}"));
        if event["event"] == name {
            return event["data"].clone();
        }
    }
}

/// 在短时间内不应收到任何事件
pub async fn expect_silence(ws: &mut WsClient) {
    if let Ok(Some(Ok(TungsteniteMessage::Text(text)))) =
        timeout(Duration::from_millis(200), ws.next()).await
    {
        panic!("unexpected event: {}", text.as_str());
    }
}

/// 给服务端留出处理其他连接事件的时间
pub async fn settle() {
    sleep(Duration::from_millis(100)).await;
}
