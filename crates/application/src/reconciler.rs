//! 断线清理
//!
//! 连接断开后按固定顺序清理：解析身份、广播离开通知、结束通话并退出聊天房间，
//! 最后注销连接。注销必须放在最后，前面的步骤都依赖身份和成员关系仍可查询。
//! 整个过程在一次加锁内完成且不含 await，可以在 `Drop` 中同步执行。

use std::sync::Arc;

use domain::{ConnectionId, Identity, ServerEvent, ANONYMOUS_USERNAME};
use tracing::{debug, info};

use crate::calls::PeerDeparture;
use crate::hub::{Deliveries, Hub};
use crate::rooms::RoomKind;

/// 一次清理的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReport {
    pub connection_id: ConnectionId,
    pub identity: Option<Identity>,
    pub ended_calls: Vec<PeerDeparture>,
    pub left_rooms: Vec<String>,
}

#[derive(Clone)]
pub struct DisconnectReconciler {
    hub: Arc<Hub>,
}

impl DisconnectReconciler {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// 清理一个已断开的连接
    ///
    /// 幂等：连接已注销时返回 `None`，不产生任何通知。
    pub fn reconcile(&self, connection_id: ConnectionId) -> Option<DisconnectReport> {
        let mut deliveries = Deliveries::new();

        let report = {
            let mut state = self.hub.lock();
            if !state.registry.contains(connection_id) {
                debug!(connection_id = %connection_id, "Connection already reconciled");
                return None;
            }

            let identity = state.registry.resolve(connection_id).cloned();
            let authenticated = identity.as_ref().filter(|id| id.is_authenticated);

            if let Some(identity) = authenticated {
                let notice = ServerEvent::left_chat(&identity.username);
                deliveries.extend(state.audience_except(Some(connection_id)), &notice);
            }

            let peer = identity
                .as_ref()
                .map(|id| id.display_name().to_string())
                .unwrap_or_else(|| ANONYMOUS_USERNAME.to_string());
            let ended_calls = state.calls().teardown_on_disconnect(connection_id);
            for departure in &ended_calls {
                let event = ServerEvent::PeerLeft { peer: peer.clone() };
                deliveries.extend(state.outboxes(&departure.remaining), &event);
            }

            // 聊天房间静默退出，离开通知已在上面统一发出
            let left_rooms: Vec<String> = state
                .rooms
                .rooms_containing(connection_id)
                .into_iter()
                .filter(|key| key.kind == RoomKind::Chat)
                .map(|key| key.name)
                .collect();
            for room in &left_rooms {
                state.rooms.leave(room, connection_id);
            }

            state.registry.unregister(connection_id);

            DisconnectReport {
                connection_id,
                identity,
                ended_calls,
                left_rooms,
            }
        };

        info!(
            connection_id = %connection_id,
            user = report.identity.as_ref().map(|id| id.username.as_str()).unwrap_or("-"),
            ended_calls = report.ended_calls.len(),
            left_rooms = report.left_rooms.len(),
            "Connection reconciled"
        );
        deliveries.deliver();
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::UserId;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use uuid::Uuid;

    fn connect(hub: &Hub, name: &str) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let identity = Identity::authenticated(UserId::from(Uuid::new_v4()), name);
        let id = hub.lock().registry.register(Some(identity), tx).unwrap();
        (id, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_disconnect_during_active_call() {
        let hub = Arc::new(Hub::new(true));
        let (a, mut a_rx) = connect(&hub, "A");
        let (b, mut b_rx) = connect(&hub, "B");
        {
            let mut state = hub.lock();
            state.calls().join_call("r1", a).unwrap();
            state.calls().join_call("r1", b).unwrap();
            state.rooms.join("A-B", a);
            state.rooms.join("A-B", b);
        }

        let report = DisconnectReconciler::new(hub.clone()).reconcile(a).unwrap();

        assert_eq!(report.ended_calls.len(), 1);
        assert_eq!(report.left_rooms, vec!["A-B".to_string()]);
        assert_eq!(
            drain(&mut b_rx),
            vec![
                ServerEvent::left_chat("A"),
                ServerEvent::PeerLeft {
                    peer: "A".to_string()
                },
            ]
        );
        assert!(drain(&mut a_rx).is_empty());
        assert!(hub.call_members("r1").is_empty());
        assert_eq!(hub.members("A-B"), vec![b]);
        assert!(!hub.is_connected(a));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let hub = Arc::new(Hub::new(true));
        let (a, _a_rx) = connect(&hub, "A");
        let (_b, mut b_rx) = connect(&hub, "B");
        let reconciler = DisconnectReconciler::new(hub.clone());

        assert!(reconciler.reconcile(a).is_some());
        assert!(reconciler.reconcile(a).is_none());
        assert_eq!(drain(&mut b_rx), vec![ServerEvent::left_chat("A")]);
    }

    #[test]
    fn test_anonymous_disconnect_is_silent() {
        let hub = Arc::new(Hub::new(false));
        let (_a, mut a_rx) = connect(&hub, "A");
        let (tx, _rx) = mpsc::unbounded_channel();
        let guest = hub.lock().registry.register(None, tx).unwrap();
        hub.lock().rooms.join("lobby", guest);

        let report = DisconnectReconciler::new(hub.clone()).reconcile(guest).unwrap();

        assert!(report.identity.is_none());
        assert!(drain(&mut a_rx).is_empty());
        assert!(!hub.lock().rooms.contains(RoomKind::Chat, "lobby"));
    }
}
