//! 用户目录接口

use async_trait::async_trait;

use crate::entities::Identity;
use crate::errors::StoreError;

/// 已知用户目录
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// 按用户名解析
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError>;

    /// 全部已知用户，按用户名升序
    async fn list(&self) -> Result<Vec<Identity>, StoreError>;
}
