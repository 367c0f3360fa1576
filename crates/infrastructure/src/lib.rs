//! 基础设施层实现。
//!
//! 提供 PostgreSQL 版的消息存储和用户目录，实现领域层定义的协作者接口。

pub mod db;
pub mod message_store;
pub mod user_directory;

pub use db::{Db, DbPool, MIGRATOR};
pub use message_store::PgMessageStore;
pub use user_directory::PgUserDirectory;
