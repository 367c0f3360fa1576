use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::ApplicationError;
use domain::{DomainError, Identity, PrivateMessage, UserId};

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// 私信历史条目
#[derive(Debug, Serialize)]
struct HistoryItem {
    id: Uuid,
    message: String,
    sender: String,
    recipient: String,
    timestamp: String,
    sent_at: DateTime<Utc>,
}

impl From<&PrivateMessage> for HistoryItem {
    fn from(message: &PrivateMessage) -> Self {
        Self {
            id: message.id,
            message: message.body.clone(),
            sender: message.sender.username.clone(),
            recipient: message.recipient.username.clone(),
            timestamp: message.display_timestamp(),
            sent_at: message.timestamp,
        }
    }
}

/// 可以发起私聊的用户
#[derive(Debug, Serialize)]
struct UserItem {
    id: UserId,
    username: String,
}

impl From<Identity> for UserItem {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(websocket_upgrade))
        .route("/users", get(list_users))
        .route("/messages/{username}", get(get_history))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 传输层接入：未认证的连接在升级前以 401 拒绝
async fn websocket_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let identity = state
        .jwt_service
        .identify(&headers, query.token.as_deref())
        .inspect_err(|err| tracing::warn!(error = ?err, "WebSocket upgrade failed: invalid token"))?;

    match &identity {
        Some(identity) => state.remember(identity).await,
        None if state.router.hub().requires_authentication() => {
            tracing::warn!("WebSocket upgrade refused: authentication required");
            return Err(ApplicationError::from(DomainError::RejectedConnection).into());
        }
        None => {}
    }

    let router = state.router.clone();
    Ok(ws.on_upgrade(move |socket| WebSocketConnection::new(socket, router, identity).run()))
}

/// 除当前用户外的全部已知用户，按用户名排序
async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserItem>>, ApiError> {
    let current = state.jwt_service.require_identity(&headers)?;
    state.remember(&current).await;

    let users = state.users.list().await?;
    Ok(Json(
        users
            .into_iter()
            .filter(|user| user.username != current.username)
            .map(UserItem::from)
            .collect(),
    ))
}

/// 当前用户与 `username` 之间的私信历史，按时间升序
async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<Json<Vec<HistoryItem>>, ApiError> {
    let current = state.jwt_service.require_identity(&headers)?;
    state.remember(&current).await;
    if current.username == username {
        return Err(ApiError::bad_request("cannot open a conversation with yourself"));
    }

    let other = state
        .users
        .find_by_username(&username)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("user {username} not found")))?;

    let history = state.messages.history(current.id, other.id).await?;
    Ok(Json(history.iter().map(HistoryItem::from).collect()))
}
