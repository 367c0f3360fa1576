use domain::{DomainError, ServerEvent, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
    /// 用户目录查询失败，此时尚未尝试落库
    #[error("user directory failure: {0}")]
    Directory(StoreError),
}

impl ApplicationError {
    pub fn code(&self) -> &'static str {
        match self {
            ApplicationError::Domain(err) => err.code(),
            ApplicationError::Persistence(_) => "PERSISTENCE_FAILURE",
            ApplicationError::Directory(_) => "DIRECTORY_FAILURE",
        }
    }

    /// 是否需要以 `error` 事件告知请求方。
    ///
    /// 身份解析失败（包括用户目录不可用）和格式错误只记录日志，不回传给任何一方。
    pub fn notifies_caller(&self) -> bool {
        match self {
            ApplicationError::Domain(err) => matches!(
                err,
                DomainError::Unauthenticated { .. }
                    | DomainError::CallRoomFull { .. }
                    | DomainError::AlreadyInCall { .. }
            ),
            ApplicationError::Persistence(_) => true,
            ApplicationError::Directory(_) => false,
        }
    }

    pub fn to_event(&self) -> ServerEvent {
        let message = match self {
            ApplicationError::Domain(err) => err.to_string(),
            ApplicationError::Persistence(_) => "message could not be saved".to_string(),
            ApplicationError::Directory(_) => "user directory unavailable".to_string(),
        };
        ServerEvent::error(self.code(), message)
    }
}
