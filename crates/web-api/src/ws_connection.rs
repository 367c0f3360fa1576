use std::sync::Arc;

use application::{ConnectionContext, DisconnectReconciler, EventRouter};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ConnectionId, Identity, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

/// WebSocket 连接
///
/// 每个连接一个任务：
/// - 发送任务把发件箱中的事件和 pong 写入 socket
/// - 当前任务按到达顺序逐个处理客户端事件
/// - 任务结束或被取消时，`DisconnectGuard` 保证断线清理执行完毕
pub struct WebSocketConnection {
    socket: WebSocket,
    router: Arc<EventRouter>,
    identity: Option<Identity>,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, router: Arc<EventRouter>, identity: Option<Identity>) -> Self {
        Self {
            socket,
            router,
            identity,
        }
    }

    /// 运行连接主循环直到断开
    pub async fn run(self) {
        let Self {
            socket,
            router,
            identity,
        } = self;

        let (outbox, mut inbox) = mpsc::unbounded_channel::<ServerEvent>();
        let ctx = match router.connect(identity, outbox) {
            Ok(ctx) => ctx,
            Err(err) => {
                tracing::warn!(error = %err, "WebSocket 连接被拒绝");
                return;
            }
        };
        let guard = DisconnectGuard {
            reconciler: router.reconciler(),
            connection_id: ctx.connection_id,
        };

        tracing::info!(connection_id = %ctx.connection_id, "WebSocket 连接已建立");

        let (mut sender, mut incoming) = socket.split();

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                    },
                    Some(event) = inbox.recv() => match event.to_json() {
                        Ok(json) => WsMessage::Text(json.into()),
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to serialize websocket payload");
                            continue;
                        }
                    },
                    else => break,
                };
                if sender.send(message).await.is_err() {
                    tracing::warn!("Failed to write websocket frame");
                    break;
                }
            }
            tracing::debug!("WebSocket发送任务结束");
        });

        // 接收循环：同一连接的事件严格按顺序处理
        let recv_loop = async {
            while let Some(Ok(message)) = incoming.next().await {
                if Self::handle_incoming(&router, &ctx, message, &cmd_tx)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        };

        tokio::select! {
            _ = &mut send_task => {
                tracing::debug!(connection_id = %ctx.connection_id, "WebSocket发送任务完成");
            }
            _ = recv_loop => {
                tracing::debug!(connection_id = %ctx.connection_id, "WebSocket接收循环完成");
            }
        }

        drop(guard);
        tracing::info!(connection_id = %ctx.connection_id, "WebSocket连接已断开");
    }

    /// 处理来自客户端的帧
    ///
    /// 返回 `Err` 表示连接应当结束。
    async fn handle_incoming(
        router: &EventRouter,
        ctx: &ConnectionContext,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Text(text) => {
                // 错误已在路由内记录并按需回传，连接继续
                let _ = router.dispatch_text(ctx, text.as_str()).await;
            }
            WsMessage::Close(_) => {
                tracing::info!(connection_id = %ctx.connection_id, "WebSocket收到关闭消息");
                return Err(());
            }
            WsMessage::Ping(data) => {
                if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                    tracing::warn!("Failed to send pong command");
                    return Err(());
                }
            }
            WsMessage::Pong(_) => {}
            WsMessage::Binary(_) => {
                tracing::debug!(connection_id = %ctx.connection_id, "Ignoring binary frame");
            }
        }
        Ok(())
    }
}

/// WebSocket 写操作命令，事件本身走发件箱
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}

/// 任务正常结束或被取消时执行断线清理；清理是幂等的
struct DisconnectGuard {
    reconciler: DisconnectReconciler,
    connection_id: ConnectionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.reconciler.reconcile(self.connection_id);
    }
}
