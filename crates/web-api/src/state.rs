use std::sync::Arc;

use application::{EventRouter, MemoryUserDirectory};
use domain::{MessageStore, UserDirectory};

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<EventRouter>,
    pub messages: Arc<dyn MessageStore>,
    pub users: Arc<dyn UserDirectory>,
    pub jwt_service: Arc<JwtService>,
    /// 未接数据库时，记录通过 token 认证的用户，使私信双方可以被解析
    pub known_users: Option<Arc<MemoryUserDirectory>>,
}

impl AppState {
    pub fn new(
        router: Arc<EventRouter>,
        messages: Arc<dyn MessageStore>,
        users: Arc<dyn UserDirectory>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            router,
            messages,
            users,
            jwt_service,
            known_users: None,
        }
    }

    pub fn with_known_users(mut self, directory: Arc<MemoryUserDirectory>) -> Self {
        self.known_users = Some(directory);
        self
    }

    pub(crate) async fn remember(&self, identity: &domain::Identity) {
        if let Some(directory) = &self.known_users {
            directory.add(identity.clone()).await;
        }
    }
}
