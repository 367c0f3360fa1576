//! 实时消息中心核心领域模型
//!
//! 包含身份、连接标识、私信等实体，客户端/服务端事件协议，
//! 错误分类，以及对外部协作者（消息存储、用户目录）的抽象。

pub mod entities;
pub mod errors;
pub mod protocol;
pub mod repositories;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use protocol::*;
pub use repositories::*;
pub use value_objects::*;
