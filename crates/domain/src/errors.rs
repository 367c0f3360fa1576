//! 领域模型错误定义
//!
//! 所有错误都只影响发生错误的连接，不会波及其他连接的注册表或房间状态，
//! 也不会导致进程退出。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 需要认证的通道收到未认证的连接，在传输层直接拒绝
    #[error("connection rejected: authentication required")]
    RejectedConnection,

    /// 需要身份的事件来自匿名连接
    #[error("event {event} requires an authenticated identity")]
    Unauthenticated { event: String },

    /// 私信的发送方或接收方无法解析为已知身份
    #[error("unknown identity: {username}")]
    UnknownIdentity { username: String },

    /// 通话房间已满（两人）
    #[error("call room {room} is full")]
    CallRoomFull { room: String },

    /// 连接已在另一个通话房间中
    #[error("connection is already in call room {room}")]
    AlreadyInCall { room: String },

    /// 客户端事件格式错误
    #[error("malformed event: {reason}")]
    MalformedEvent { reason: String },
}

impl DomainError {
    /// 创建身份解析错误
    pub fn unknown_identity(username: impl Into<String>) -> Self {
        Self::UnknownIdentity {
            username: username.into(),
        }
    }

    /// 创建通话房间已满错误
    pub fn call_room_full(room: impl Into<String>) -> Self {
        Self::CallRoomFull { room: room.into() }
    }

    /// 创建格式错误
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
        }
    }

    /// 对外暴露的稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::RejectedConnection => "REJECTED_CONNECTION",
            Self::Unauthenticated { .. } => "UNAUTHENTICATED",
            Self::UnknownIdentity { .. } => "UNKNOWN_IDENTITY",
            Self::CallRoomFull { .. } => "CALL_ROOM_FULL",
            Self::AlreadyInCall { .. } => "ALREADY_IN_CALL",
            Self::MalformedEvent { .. } => "MALFORMED_EVENT",
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 外部存储协作者的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl StoreError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
