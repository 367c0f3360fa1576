//! 外部协作者接口
//!
//! 核心只依赖这些 trait，具体实现位于 application（内存）和 infrastructure（PostgreSQL）。

pub mod message_store;
pub mod user_directory;

pub use message_store::MessageStore;
pub use user_directory::UserDirectory;

#[cfg(feature = "testing")]
pub use message_store::MockMessageStore;
#[cfg(feature = "testing")]
pub use user_directory::MockUserDirectory;
