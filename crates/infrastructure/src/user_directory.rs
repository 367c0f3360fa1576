//! 用户目录的 PostgreSQL 实现

use async_trait::async_trait;
use domain::{Identity, StoreError, UserDirectory, UserId};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::{map_sqlx_err, DbPool};

#[derive(Debug, Clone, FromRow)]
struct DbUser {
    id: Uuid,
    username: String,
}

impl From<DbUser> for Identity {
    fn from(user: DbUser) -> Self {
        Identity::authenticated(UserId::from(user.id), user.username)
    }
}

pub struct PgUserDirectory {
    pool: DbPool,
}

impl PgUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// 登记用户；用户名已存在时返回已有记录
    pub async fn upsert(&self, id: UserId, username: &str) -> Result<Identity, StoreError> {
        let user = sqlx::query_as::<_, DbUser>(
            r#"INSERT INTO users (id, username) VALUES ($1, $2)
               ON CONFLICT (username) DO UPDATE SET username = EXCLUDED.username
               RETURNING id, username"#,
        )
        .bind(Uuid::from(id))
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(user.into())
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        let user = sqlx::query_as::<_, DbUser>("SELECT id, username FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(user.map(Identity::from))
    }

    async fn list(&self) -> Result<Vec<Identity>, StoreError> {
        let users = sqlx::query_as::<_, DbUser>("SELECT id, username FROM users ORDER BY username")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(users.into_iter().map(Identity::from).collect())
    }
}
