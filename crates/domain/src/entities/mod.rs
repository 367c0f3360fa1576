//! 领域实体定义
//!
//! 包含系统的核心实体：用户身份、私信。

pub mod identity;
pub mod message;

// 重新导出核心实体
pub use identity::{Identity, ANONYMOUS_USERNAME};
pub use message::{NewPrivateMessage, PrivateMessage, TIMESTAMP_DISPLAY_FORMAT};
