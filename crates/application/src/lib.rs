//! 应用层实现：实时消息中心。
//!
//! 在单个进程内维护连接注册表、房间成员表和两人通话状态机，
//! 把客户端事件路由为广播、房间内投递或点对点转发，
//! 并在连接断开时完成清理。外部协作者（消息存储、用户目录）通过 trait 注入。

pub mod calls;
pub mod clock;
pub mod error;
pub mod hub;
pub mod memory;
pub mod reconciler;
pub mod registry;
pub mod rooms;
pub mod router;

pub use calls::{CallSessionManager, CallState, JoinCallOutcome, PeerDeparture, CALL_CAPACITY};
pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use hub::{Hub, HubState};
pub use memory::{MemoryMessageStore, MemoryUserDirectory};
pub use reconciler::{DisconnectReconciler, DisconnectReport};
pub use registry::{ConnectionRegistry, Outbox};
pub use rooms::{RoomKey, RoomKind, RoomTable};
pub use router::{ConnectionContext, EventRouter};
