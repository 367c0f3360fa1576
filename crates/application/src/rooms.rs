//! 房间成员表
//!
//! 聊天房间和通话房间是两个独立的命名空间，同一个名字可以同时是私聊房间和通话房间。
//! 每个房间是按加入顺序排列的连接集合；集合变空即删除房间，不做持久化，也没有单独的回收过程。
//! 表本身只保证成员唯一性；通话房间的容量约束由 [`crate::CallSessionManager`] 负责。

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use domain::ConnectionId;
use tracing::debug;

/// 房间所在的命名空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoomKind {
    /// 聊天房间，成员数不限
    Chat,
    /// 通话房间，最多两人
    Call,
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomKind::Chat => write!(f, "chat"),
            RoomKind::Call => write!(f, "call"),
        }
    }
}

/// 房间的完整标识：命名空间加房间名
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomKey {
    pub kind: RoomKind,
    pub name: String,
}

impl RoomKey {
    pub fn new(kind: RoomKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn chat(name: impl Into<String>) -> Self {
        Self::new(RoomKind::Chat, name)
    }

    pub fn call(name: impl Into<String>) -> Self {
        Self::new(RoomKind::Call, name)
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

#[derive(Debug, Default)]
pub struct RoomTable {
    chat: HashMap<String, Vec<ConnectionId>>,
    call: HashMap<String, Vec<ConnectionId>>,
    /// 反向索引：连接所在的房间
    memberships: HashMap<ConnectionId, BTreeSet<RoomKey>>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入聊天房间；房间不存在时创建，已是成员时为无操作
    ///
    /// 返回是否新加入。
    pub fn join(&mut self, room: &str, connection_id: ConnectionId) -> bool {
        self.join_in(RoomKind::Chat, room, connection_id)
    }

    /// 离开聊天房间；集合变空时删除房间。返回是否确实移除了成员
    pub fn leave(&mut self, room: &str, connection_id: ConnectionId) -> bool {
        self.leave_in(RoomKind::Chat, room, connection_id)
    }

    /// 聊天房间成员，按加入顺序；房间不存在时为空
    pub fn members(&self, room: &str) -> Vec<ConnectionId> {
        self.members_in(RoomKind::Chat, room)
    }

    pub(crate) fn join_in(
        &mut self,
        kind: RoomKind,
        room: &str,
        connection_id: ConnectionId,
    ) -> bool {
        let members = self.space_mut(kind).entry(room.to_string()).or_default();
        if members.contains(&connection_id) {
            return false;
        }
        members.push(connection_id);

        self.memberships
            .entry(connection_id)
            .or_default()
            .insert(RoomKey::new(kind, room));

        debug!(room, connection_id = %connection_id, kind = %kind, "Joined room");
        true
    }

    pub(crate) fn leave_in(
        &mut self,
        kind: RoomKind,
        room: &str,
        connection_id: ConnectionId,
    ) -> bool {
        let rooms = self.space_mut(kind);
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };

        let before = members.len();
        members.retain(|id| *id != connection_id);
        let removed = members.len() != before;

        if members.is_empty() {
            rooms.remove(room);
            debug!(room, kind = %kind, "Room deleted");
        }

        if removed {
            self.forget_membership(connection_id, &RoomKey::new(kind, room));
        }
        removed
    }

    pub fn members_in(&self, kind: RoomKind, room: &str) -> Vec<ConnectionId> {
        self.room(kind, room).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// 连接所在的所有房间（聊天和通话）
    pub fn rooms_containing(&self, connection_id: ConnectionId) -> Vec<RoomKey> {
        self.memberships
            .get(&connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, kind: RoomKind, room: &str, connection_id: ConnectionId) -> bool {
        self.room(kind, room)
            .is_some_and(|members| members.contains(&connection_id))
    }

    pub fn contains(&self, kind: RoomKind, room: &str) -> bool {
        self.space(kind).contains_key(room)
    }

    /// 两个命名空间中的房间总数
    pub fn len(&self) -> usize {
        self.chat.len() + self.call.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chat.is_empty() && self.call.is_empty()
    }

    pub(crate) fn room(&self, kind: RoomKind, room: &str) -> Option<&[ConnectionId]> {
        self.space(kind).get(room).map(Vec::as_slice)
    }

    /// 整体删除房间，返回删除前的成员
    pub(crate) fn remove_room(&mut self, kind: RoomKind, room: &str) -> Vec<ConnectionId> {
        let Some(members) = self.space_mut(kind).remove(room) else {
            return Vec::new();
        };
        let key = RoomKey::new(kind, room);
        for member in &members {
            self.forget_membership(*member, &key);
        }
        debug!(room, kind = %kind, "Room deleted");
        members
    }

    fn space(&self, kind: RoomKind) -> &HashMap<String, Vec<ConnectionId>> {
        match kind {
            RoomKind::Chat => &self.chat,
            RoomKind::Call => &self.call,
        }
    }

    fn space_mut(&mut self, kind: RoomKind) -> &mut HashMap<String, Vec<ConnectionId>> {
        match kind {
            RoomKind::Chat => &mut self.chat,
            RoomKind::Call => &mut self.call,
        }
    }

    fn forget_membership(&mut self, connection_id: ConnectionId, key: &RoomKey) {
        if let Some(rooms) = self.memberships.get_mut(&connection_id) {
            rooms.remove(key);
            if rooms.is_empty() {
                self.memberships.remove(&connection_id);
            }
        }
    }
}
