//! 两人通话会话
//!
//! 通话房间存放在 [`RoomTable`] 的通话命名空间中，与同名聊天房间互不影响。
//! 在其上维护两人通话的状态机：
//!
//! ```text
//! EMPTY --join--> WAITING --join--> ACTIVE --leave/disconnect--> TERMINATED
//! ```
//!
//! 任意一方离开（主动或断线）都会结束整个会话并删除房间，
//! 因此 `peers_connected` 在一个房间生命周期内最多触发一次。

use domain::{ConnectionId, DomainError, DomainResult};
use tracing::{debug, info, warn};

use crate::rooms::{RoomKind, RoomTable};

/// 通话房间容量
pub const CALL_CAPACITY: usize = 2;

/// 通话房间的当前状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// 房间不存在
    Empty,
    /// 一人等待对方加入
    Waiting,
    /// 双方就绪，可以转发信令
    Active,
}

/// `join_call` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinCallOutcome {
    /// 第一个加入，等待对方
    Waiting,
    /// 已在房间中，无操作
    AlreadyJoined,
    /// 第二个加入，双方就绪；peer1 为先加入的一方
    PeersConnected {
        peer1: ConnectionId,
        peer2: ConnectionId,
    },
}

/// 一次离开通话的结果，`remaining` 中的连接需要收到 `peer_left`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDeparture {
    pub room: String,
    pub departed: ConnectionId,
    pub remaining: Vec<ConnectionId>,
}

/// 房间成员表上的通话视图
///
/// 只在持有 hub 锁期间短暂构造，本身不保存状态。
pub struct CallSessionManager<'a> {
    rooms: &'a mut RoomTable,
}

impl<'a> CallSessionManager<'a> {
    pub fn new(rooms: &'a mut RoomTable) -> Self {
        Self { rooms }
    }

    pub fn state(&self, room: &str) -> CallState {
        match self.rooms.room(RoomKind::Call, room).map(<[_]>::len) {
            None | Some(0) => CallState::Empty,
            Some(1) => CallState::Waiting,
            Some(_) => CallState::Active,
        }
    }

    /// 连接当前所在的通话房间（最多一个）
    pub fn call_room_of(&self, connection_id: ConnectionId) -> Option<String> {
        self.rooms
            .rooms_containing(connection_id)
            .into_iter()
            .find(|key| key.kind == RoomKind::Call)
            .map(|key| key.name)
    }

    /// 加入通话房间
    ///
    /// 满员或已在其他通话中时返回错误，且不修改成员。
    pub fn join_call(
        &mut self,
        room: &str,
        connection_id: ConnectionId,
    ) -> DomainResult<JoinCallOutcome> {
        if let Some(current) = self.call_room_of(connection_id) {
            if current == room {
                debug!(room, connection_id = %connection_id, "Already in call room");
                return Ok(JoinCallOutcome::AlreadyJoined);
            }
            return Err(DomainError::AlreadyInCall { room: current });
        }

        let occupied = self.rooms.room(RoomKind::Call, room).map_or(0, <[_]>::len);
        if occupied >= CALL_CAPACITY {
            warn!(room, connection_id = %connection_id, "Call room is full");
            return Err(DomainError::call_room_full(room));
        }

        self.rooms.join_in(RoomKind::Call, room, connection_id);

        let members = self.rooms.members_in(RoomKind::Call, room);
        match members.as_slice() {
            [peer1, peer2] => {
                info!(room, peer1 = %peer1, peer2 = %peer2, "Call peers connected");
                Ok(JoinCallOutcome::PeersConnected {
                    peer1: *peer1,
                    peer2: *peer2,
                })
            }
            _ => {
                info!(room, connection_id = %connection_id, "Waiting for call peer");
                Ok(JoinCallOutcome::Waiting)
            }
        }
    }

    /// 信令转发目标：ACTIVE 房间中发送方之外的另一方
    ///
    /// 房间未就绪或发送方不是成员时返回 `None`，信令直接丢弃。
    pub fn relay(&self, room: &str, sender: ConnectionId) -> Option<ConnectionId> {
        let members = self.rooms.room(RoomKind::Call, room)?;
        if members.len() != CALL_CAPACITY {
            debug!(room, sender = %sender, "Signal dropped: call not active");
            return None;
        }
        if !members.contains(&sender) {
            warn!(room, sender = %sender, "Signal dropped: sender not in call");
            return None;
        }
        members.iter().copied().find(|id| *id != sender)
    }

    /// 主动离开通话；会话随之结束，房间被删除
    ///
    /// 非成员离开时忽略。
    pub fn leave_call(&mut self, room: &str, connection_id: ConnectionId) -> Option<PeerDeparture> {
        if !self.rooms.is_member(RoomKind::Call, room, connection_id) {
            debug!(room, connection_id = %connection_id, "Ignoring leave_call from non-member");
            return None;
        }
        Some(self.terminate(room, connection_id))
    }

    /// 断线时结束连接所在的全部通话
    pub fn teardown_on_disconnect(&mut self, connection_id: ConnectionId) -> Vec<PeerDeparture> {
        self.rooms
            .rooms_containing(connection_id)
            .into_iter()
            .filter(|key| key.kind == RoomKind::Call)
            .map(|key| self.terminate(&key.name, connection_id))
            .collect()
    }

    fn terminate(&mut self, room: &str, departed: ConnectionId) -> PeerDeparture {
        let remaining: Vec<ConnectionId> = self
            .rooms
            .remove_room(RoomKind::Call, room)
            .into_iter()
            .filter(|id| *id != departed)
            .collect();

        info!(
            room,
            departed = %departed,
            remaining = remaining.len(),
            "Call terminated"
        );
        PeerDeparture {
            room: room.to_string(),
            departed,
            remaining,
        }
    }
}
