//! 连接注册表
//!
//! 记录所有存活的连接及其绑定的身份。身份在注册时确定，之后不会再改变。

use std::collections::HashMap;

use chrono::Utc;
use domain::{ConnectionId, DomainError, DomainResult, Identity, ServerEvent, Timestamp};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// 单个连接的发件箱，由连接任务负责写入 socket
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug)]
struct ConnectionEntry {
    identity: Option<Identity>,
    outbox: Outbox,
    connected_at: Timestamp,
}

/// 内存中的连接注册表
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    require_authentication: bool,
}

impl ConnectionRegistry {
    pub fn new(require_authentication: bool) -> Self {
        Self {
            connections: HashMap::new(),
            require_authentication,
        }
    }

    /// 注册新连接并分配连接标识
    ///
    /// 要求认证时，缺少身份或身份未认证的连接会被拒绝，且不会留下任何状态。
    pub fn register(
        &mut self,
        identity: Option<Identity>,
        outbox: Outbox,
    ) -> DomainResult<ConnectionId> {
        let authenticated = identity.as_ref().is_some_and(|id| id.is_authenticated);
        if self.require_authentication && !authenticated {
            return Err(DomainError::RejectedConnection);
        }

        let connection_id = ConnectionId::generate();
        let username = identity.as_ref().map(|id| id.username.clone());
        self.connections.insert(
            connection_id,
            ConnectionEntry {
                identity,
                outbox,
                connected_at: Utc::now(),
            },
        );

        info!(
            connection_id = %connection_id,
            user = username.as_deref().unwrap_or("-"),
            "Connection registered"
        );
        Ok(connection_id)
    }

    /// 连接绑定的身份；未知连接或匿名连接返回 `None`
    pub fn resolve(&self, connection_id: ConnectionId) -> Option<&Identity> {
        self.connections
            .get(&connection_id)
            .and_then(|entry| entry.identity.as_ref())
    }

    /// 注销连接；重复注销是无操作
    pub fn unregister(&mut self, connection_id: ConnectionId) -> bool {
        match self.connections.remove(&connection_id) {
            Some(entry) => {
                let lifetime = Utc::now().signed_duration_since(entry.connected_at);
                info!(
                    connection_id = %connection_id,
                    lifetime_secs = lifetime.num_seconds(),
                    "Connection unregistered"
                );
                true
            }
            None => {
                debug!(connection_id = %connection_id, "Connection already unregistered");
                false
            }
        }
    }

    /// 是否拒绝匿名连接
    pub fn requires_authentication(&self) -> bool {
        self.require_authentication
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    pub fn outbox(&self, connection_id: ConnectionId) -> Option<Outbox> {
        self.connections
            .get(&connection_id)
            .map(|entry| entry.outbox.clone())
    }

    /// 全局聊天受众：所有存活连接
    pub fn audience(&self) -> impl Iterator<Item = (ConnectionId, &Outbox)> {
        self.connections.iter().map(|(id, entry)| (*id, &entry.outbox))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
