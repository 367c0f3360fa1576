//! 私信存储接口

use async_trait::async_trait;

use crate::entities::{NewPrivateMessage, PrivateMessage};
use crate::errors::StoreError;
use crate::value_objects::UserId;

/// 私信持久化协作者
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 保存私信，返回带有服务端时间戳的记录
    async fn save(&self, message: NewPrivateMessage) -> Result<PrivateMessage, StoreError>;

    /// 两个用户之间的全部私信，按时间升序
    async fn history(&self, a: UserId, b: UserId) -> Result<Vec<PrivateMessage>, StoreError>;
}
