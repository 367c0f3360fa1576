//! 事件路由
//!
//! 按事件类型分发到对应的处理逻辑，并决定投递范围：
//!
//! | 事件 | 需要身份 | 投递 | 持久化 |
//! |---|---|---|---|
//! | `message` / `json` | 否 | 全局聊天受众 | 否 |
//! | `join` / `leave` | 否 | 只更新成员关系 | 否 |
//! | `private_message` | 是 | 会话房间 | 先落库后投递 |
//! | `join_call` / `webrtc_signal` / `leave_call` | 是 | 经通话状态机 | 否 |
//!
//! 同一连接的事件由连接任务顺序调用 [`EventRouter::dispatch`]，不同连接之间并发执行。

use std::sync::Arc;

use domain::{
    ChatPayload, ClientEvent, ConnectionId, DomainError, Identity, MessageStore,
    NewPrivateMessage, PrivateMessagePayload, RoomPayload, ServerEvent, SignalPayload,
    UserDirectory, ANONYMOUS_USERNAME,
};
use tracing::{debug, error, info, warn};

use crate::calls::JoinCallOutcome;
use crate::error::ApplicationError;
use crate::hub::{Deliveries, Hub};
use crate::reconciler::{DisconnectReconciler, DisconnectReport};
use crate::registry::Outbox;

/// 每个处理函数显式接收的连接上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    pub connection_id: ConnectionId,
    pub identity: Option<Identity>,
}

impl ConnectionContext {
    /// 已认证的身份
    pub fn authenticated(&self) -> Option<&Identity> {
        self.identity.as_ref().filter(|id| id.is_authenticated)
    }

    pub fn display_name(&self) -> &str {
        self.identity
            .as_ref()
            .map(Identity::display_name)
            .unwrap_or(ANONYMOUS_USERNAME)
    }

    fn require_identity(&self, event: &str) -> Result<&Identity, ApplicationError> {
        self.authenticated().ok_or_else(|| {
            DomainError::Unauthenticated {
                event: event.to_string(),
            }
            .into()
        })
    }
}

pub struct EventRouter {
    hub: Arc<Hub>,
    messages: Arc<dyn MessageStore>,
    users: Arc<dyn UserDirectory>,
}

impl EventRouter {
    pub fn new(
        hub: Arc<Hub>,
        messages: Arc<dyn MessageStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            hub,
            messages,
            users,
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn reconciler(&self) -> DisconnectReconciler {
        DisconnectReconciler::new(self.hub.clone())
    }

    /// 接入新连接
    ///
    /// 认证用户接入时向全体（含自己）广播加入通知。
    pub fn connect(
        &self,
        identity: Option<Identity>,
        outbox: Outbox,
    ) -> Result<ConnectionContext, ApplicationError> {
        let mut deliveries = Deliveries::new();

        let context = {
            let mut state = self.hub.lock();
            let connection_id = state.registry.register(identity.clone(), outbox)?;
            let context = ConnectionContext {
                connection_id,
                identity,
            };

            if let Some(identity) = context.authenticated() {
                let notice = ServerEvent::joined_chat(&identity.username);
                deliveries.extend(state.audience_except(None), &notice);
            }
            context
        };

        deliveries.deliver();
        Ok(context)
    }

    /// 连接断开，执行断线清理
    pub fn disconnect(&self, connection_id: ConnectionId) -> Option<DisconnectReport> {
        self.reconciler().reconcile(connection_id)
    }

    /// 处理一个原始文本帧；格式错误只记录日志
    pub async fn dispatch_text(
        &self,
        ctx: &ConnectionContext,
        text: &str,
    ) -> Result<(), ApplicationError> {
        match ClientEvent::parse(text) {
            Ok(event) => self.dispatch(ctx, event).await,
            Err(err) => {
                warn!(connection_id = %ctx.connection_id, error = %err, "Dropping malformed event");
                Err(err.into())
            }
        }
    }

    /// 处理一个客户端事件
    ///
    /// 需要告知请求方的错误会以 `error` 事件发回该连接，其余错误只记录日志。
    /// 无论哪种错误都不会影响其他连接。
    pub async fn dispatch(
        &self,
        ctx: &ConnectionContext,
        event: ClientEvent,
    ) -> Result<(), ApplicationError> {
        let name = event.name();
        let result = match event {
            ClientEvent::Message(text) => {
                self.broadcast(ctx, ServerEvent::Message(text));
                Ok(())
            }
            ClientEvent::Json(payload) => {
                self.chat(ctx, payload);
                Ok(())
            }
            ClientEvent::Join(payload) => {
                self.join_room(ctx, payload);
                Ok(())
            }
            ClientEvent::Leave(payload) => {
                self.leave_room(ctx, payload);
                Ok(())
            }
            ClientEvent::PrivateMessage(payload) => self.private_message(ctx, payload).await,
            ClientEvent::JoinCall(payload) => self.join_call(ctx, &payload.room),
            ClientEvent::WebrtcSignal(payload) => self.relay_signal(ctx, payload),
            ClientEvent::LeaveCall(payload) => self.leave_call(ctx, &payload.room),
        };

        if let Err(err) = &result {
            self.report_failure(ctx, name, err);
        }
        result
    }

    fn report_failure(&self, ctx: &ConnectionContext, event: &str, err: &ApplicationError) {
        match err {
            ApplicationError::Persistence(_) | ApplicationError::Directory(_) => {
                error!(connection_id = %ctx.connection_id, event, error = %err, "Event failed")
            }
            ApplicationError::Domain(_) => {
                warn!(connection_id = %ctx.connection_id, event, error = %err, "Event rejected")
            }
        }

        if err.notifies_caller() {
            let outbox = self.hub.lock().registry.outbox(ctx.connection_id);
            if let Some(outbox) = outbox {
                let mut deliveries = Deliveries::new();
                deliveries.push(outbox, err.to_event());
                deliveries.deliver();
            }
        }
    }

    fn broadcast(&self, ctx: &ConnectionContext, event: ServerEvent) {
        let mut deliveries = Deliveries::new();
        {
            let state = self.hub.lock();
            deliveries.extend(state.audience_except(None), &event);
        }
        debug!(
            connection_id = %ctx.connection_id,
            event = event.name(),
            recipients = deliveries.len(),
            "Broadcasting chat"
        );
        deliveries.deliver();
    }

    fn chat(&self, ctx: &ConnectionContext, payload: ChatPayload) {
        let event = ServerEvent::MessageResponse {
            message: payload.message,
            username: ctx.display_name().to_string(),
        };
        self.broadcast(ctx, event);
    }

    fn join_room(&self, ctx: &ConnectionContext, payload: RoomPayload) {
        let joined = self.hub.lock().rooms.join(&payload.room, ctx.connection_id);
        debug!(
            connection_id = %ctx.connection_id,
            room = %payload.room,
            user = %payload.username,
            joined,
            "Joined chat room"
        );
    }

    fn leave_room(&self, ctx: &ConnectionContext, payload: RoomPayload) {
        let left = self.hub.lock().rooms.leave(&payload.room, ctx.connection_id);
        debug!(connection_id = %ctx.connection_id, room = %payload.room, left, "Left chat room");
    }

    /// 私信：解析双方身份，落库，然后投递到会话房间
    ///
    /// 身份无法解析或用户目录不可用时静默丢弃；落库失败时不投递并告知发送方。
    async fn private_message(
        &self,
        ctx: &ConnectionContext,
        payload: PrivateMessagePayload,
    ) -> Result<(), ApplicationError> {
        let current = ctx
            .authenticated()
            .ok_or_else(|| DomainError::unknown_identity(&payload.sender))?;
        if current.username != payload.sender {
            return Err(DomainError::unknown_identity(&payload.sender).into());
        }

        let sender = self.resolve(&payload.sender).await?;
        let recipient = self.resolve(&payload.recipient).await?;

        let saved = self
            .messages
            .save(NewPrivateMessage {
                sender,
                recipient,
                body: payload.message,
            })
            .await?;

        let event = ServerEvent::new_private_message(&saved);
        let mut deliveries = Deliveries::new();
        {
            let state = self.hub.lock();
            let members = state.rooms.members(&payload.room);
            deliveries.extend(state.outboxes(&members), &event);
        }

        info!(
            connection_id = %ctx.connection_id,
            room = %payload.room,
            message_id = %saved.id,
            recipients = deliveries.len(),
            "Private message delivered"
        );
        deliveries.deliver();
        Ok(())
    }

    async fn resolve(&self, username: &str) -> Result<Identity, ApplicationError> {
        self.users
            .find_by_username(username)
            .await
            .map_err(ApplicationError::Directory)?
            .ok_or_else(|| DomainError::unknown_identity(username).into())
    }

    fn join_call(&self, ctx: &ConnectionContext, room: &str) -> Result<(), ApplicationError> {
        ctx.require_identity("join_call")?;

        let mut deliveries = Deliveries::new();
        {
            let mut state = self.hub.lock();
            let outcome = state.calls().join_call(room, ctx.connection_id)?;
            if let JoinCallOutcome::PeersConnected { peer1, peer2 } = outcome {
                let event = ServerEvent::PeersConnected { peer1, peer2 };
                deliveries.extend(state.outboxes(&[peer1, peer2]), &event);
            }
        }
        deliveries.deliver();
        Ok(())
    }

    fn relay_signal(
        &self,
        ctx: &ConnectionContext,
        payload: SignalPayload,
    ) -> Result<(), ApplicationError> {
        ctx.require_identity("webrtc_signal")?;

        let target = {
            let mut state = self.hub.lock();
            let peer = state.calls().relay(&payload.room, ctx.connection_id);
            peer.and_then(|peer| state.registry.outbox(peer))
        };

        if let Some(outbox) = target {
            debug!(connection_id = %ctx.connection_id, room = %payload.room, "Relaying signal");
            let mut deliveries = Deliveries::new();
            deliveries.push(outbox, ServerEvent::WebrtcSignal(payload.signal));
            deliveries.deliver();
        }
        Ok(())
    }

    fn leave_call(&self, ctx: &ConnectionContext, room: &str) -> Result<(), ApplicationError> {
        let identity = ctx.require_identity("leave_call")?;

        let mut deliveries = Deliveries::new();
        {
            let mut state = self.hub.lock();
            if let Some(departure) = state.calls().leave_call(room, ctx.connection_id) {
                let event = ServerEvent::PeerLeft {
                    peer: identity.username.clone(),
                };
                deliveries.extend(state.outboxes(&departure.remaining), &event);
            }
        }
        deliveries.deliver();
        Ok(())
    }
}
