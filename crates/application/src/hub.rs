//! 进程内共享状态
//!
//! 连接注册表和房间成员表放在同一把互斥锁下，每个公开操作在一次加锁内完成。
//! 锁内只做簿记并收集待发送的事件，真正写入发件箱在释放锁之后进行。

use std::sync::{Mutex, MutexGuard, PoisonError};

use domain::{ConnectionId, Identity, ServerEvent};
use tracing::debug;

use crate::calls::{CallSessionManager, CallState};
use crate::registry::{ConnectionRegistry, Outbox};
use crate::rooms::{RoomKey, RoomKind, RoomTable};

/// 锁保护的全部簿记状态
#[derive(Debug)]
pub struct HubState {
    pub registry: ConnectionRegistry,
    pub rooms: RoomTable,
}

impl HubState {
    pub fn calls(&mut self) -> CallSessionManager<'_> {
        CallSessionManager::new(&mut self.rooms)
    }

    /// 除 `except` 外的全局聊天受众
    pub(crate) fn audience_except(&self, except: Option<ConnectionId>) -> Vec<Outbox> {
        self.registry
            .audience()
            .filter(|(id, _)| Some(*id) != except)
            .map(|(_, outbox)| outbox.clone())
            .collect()
    }

    pub(crate) fn outboxes(&self, targets: &[ConnectionId]) -> Vec<Outbox> {
        targets
            .iter()
            .filter_map(|id| self.registry.outbox(*id))
            .collect()
    }
}

/// 实时消息中心的共享状态，进程启动时创建一次
#[derive(Debug)]
pub struct Hub {
    state: Mutex<HubState>,
}

impl Hub {
    pub fn new(require_authentication: bool) -> Self {
        Self {
            state: Mutex::new(HubState {
                registry: ConnectionRegistry::new(require_authentication),
                rooms: RoomTable::new(),
            }),
        }
    }

    /// 获取状态锁
    ///
    /// 锁内代码不会 panic 到半途，中毒时直接取回内部状态继续使用。
    pub fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn requires_authentication(&self) -> bool {
        self.lock().registry.requires_authentication()
    }

    pub fn connection_count(&self) -> usize {
        self.lock().registry.len()
    }

    pub fn identity(&self, connection_id: ConnectionId) -> Option<Identity> {
        self.lock().registry.resolve(connection_id).cloned()
    }

    pub fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.lock().registry.contains(connection_id)
    }

    /// 聊天房间成员
    pub fn members(&self, room: &str) -> Vec<ConnectionId> {
        self.lock().rooms.members(room)
    }

    /// 通话房间成员
    pub fn call_members(&self, room: &str) -> Vec<ConnectionId> {
        self.lock().rooms.members_in(RoomKind::Call, room)
    }

    pub fn rooms_containing(&self, connection_id: ConnectionId) -> Vec<RoomKey> {
        self.lock().rooms.rooms_containing(connection_id)
    }

    pub fn call_state(&self, room: &str) -> CallState {
        self.lock().calls().state(room)
    }
}

/// 锁内收集、锁外发送的一批事件
#[derive(Debug, Default)]
pub(crate) struct Deliveries {
    pending: Vec<(Outbox, ServerEvent)>,
}

impl Deliveries {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, outbox: Outbox, event: ServerEvent) {
        self.pending.push((outbox, event));
    }

    pub(crate) fn extend(&mut self, outboxes: Vec<Outbox>, event: &ServerEvent) {
        for outbox in outboxes {
            self.pending.push((outbox, event.clone()));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// 写入发件箱；接收端已关闭的连接正在断开，直接跳过
    pub(crate) fn deliver(self) {
        for (outbox, event) in self.pending {
            let name = event.name();
            if outbox.send(event).is_err() {
                debug!(event = name, "Outbox closed, event dropped");
            }
        }
    }
}
