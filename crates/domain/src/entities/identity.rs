//! 用户身份实体
//!
//! 由外部认证协作者提供，核心只读取 `id`、`username`、`is_authenticated`。

use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 匿名连接在聊天中显示的名字
pub const ANONYMOUS_USERNAME: &str = "Anonymous";

/// 当前连接绑定的用户身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
    pub is_authenticated: bool,
}

impl Identity {
    /// 已通过认证的身份
    pub fn authenticated(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            is_authenticated: true,
        }
    }

    /// 用于展示的用户名；未认证身份显示为匿名
    pub fn display_name(&self) -> &str {
        if self.is_authenticated {
            &self.username
        } else {
            ANONYMOUS_USERNAME
        }
    }
}
