//! 内存版外部协作者，用于测试和未配置数据库的部署

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    Identity, MessageStore, NewPrivateMessage, PrivateMessage, StoreError, UserDirectory, UserId,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};

/// 内存消息存储，时间戳按插入顺序单调不减
pub struct MemoryMessageStore {
    clock: Arc<dyn Clock>,
    messages: RwLock<Vec<PrivateMessage>>,
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryMessageStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            messages: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<PrivateMessage> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn save(&self, message: NewPrivateMessage) -> Result<PrivateMessage, StoreError> {
        let mut messages = self.messages.write().await;

        let now = self.clock.now();
        let timestamp = match messages.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };

        let saved = PrivateMessage::from_new(message, Uuid::new_v4(), timestamp);
        messages.push(saved.clone());
        Ok(saved)
    }

    async fn history(&self, a: UserId, b: UserId) -> Result<Vec<PrivateMessage>, StoreError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|message| message.is_between(a, b))
            .cloned()
            .collect())
    }
}

/// 内存用户目录，按用户名索引
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<String, Identity>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = Identity>) -> Self {
        let users = users
            .into_iter()
            .map(|identity| (identity.username.clone(), identity))
            .collect();
        Self {
            users: RwLock::new(users),
        }
    }

    pub async fn add(&self, identity: Identity) {
        self.users
            .write()
            .await
            .insert(identity.username.clone(), identity);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn list(&self) -> Result<Vec<Identity>, StoreError> {
        let mut users: Vec<Identity> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }
}
