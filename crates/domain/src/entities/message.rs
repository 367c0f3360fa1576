//! 私信实体定义
//!
//! 私信是唯一需要持久化的事件：先落库，后投递。
//! 创建后不可变，归消息存储协作者所有。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::identity::Identity;
use crate::value_objects::{Timestamp, UserId};

/// 投递给客户端的时间戳格式，例如 `Mar 04, 09:15 PM`
pub const TIMESTAMP_DISPLAY_FORMAT: &str = "%b %d, %I:%M %p";

/// 待保存的私信
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPrivateMessage {
    pub sender: Identity,
    pub recipient: Identity,
    pub body: String,
}

/// 已保存的私信，`id` 与 `timestamp` 由存储分配
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub id: Uuid,
    pub sender: Identity,
    pub recipient: Identity,
    pub body: String,
    pub timestamp: Timestamp,
}

impl PrivateMessage {
    /// 由存储在写入时调用
    pub fn from_new(new: NewPrivateMessage, id: Uuid, timestamp: Timestamp) -> Self {
        Self {
            id,
            sender: new.sender,
            recipient: new.recipient,
            body: new.body,
            timestamp,
        }
    }

    /// 格式化后的时间戳
    pub fn display_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_DISPLAY_FORMAT).to_string()
    }

    /// 消息是否属于两人之间的会话（不区分方向）
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.sender.id == a && self.recipient.id == b)
            || (self.sender.id == b && self.recipient.id == a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user(name: &str) -> Identity {
        Identity::authenticated(UserId::from(Uuid::new_v4()), name)
    }

    #[test]
    fn test_display_timestamp() {
        let alice = user("alice");
        let bob = user("bob");
        let timestamp = chrono::Utc.with_ymd_and_hms(2024, 3, 4, 21, 15, 0).unwrap();
        let message = PrivateMessage::from_new(
            NewPrivateMessage {
                sender: alice,
                recipient: bob,
                body: "hi".to_string(),
            },
            Uuid::new_v4(),
            timestamp,
        );

        assert_eq!(message.display_timestamp(), "Mar 04, 09:15 PM");
    }

    #[test]
    fn test_is_between_ignores_direction() {
        let alice = user("alice");
        let bob = user("bob");
        let carol = user("carol");
        let message = PrivateMessage::from_new(
            NewPrivateMessage {
                sender: bob.clone(),
                recipient: alice.clone(),
                body: "hey".to_string(),
            },
            Uuid::new_v4(),
            chrono::Utc::now(),
        );

        assert!(message.is_between(alice.id, bob.id));
        assert!(message.is_between(bob.id, alice.id));
        assert!(!message.is_between(alice.id, carol.id));
    }
}
