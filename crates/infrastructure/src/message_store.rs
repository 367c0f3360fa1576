//! 私信存储的 PostgreSQL 实现

use std::sync::Arc;

use application::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Identity, MessageStore, NewPrivateMessage, PrivateMessage, StoreError, UserId};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::{map_sqlx_err, DbPool};

/// 串行化私信写入的 advisory 锁键
const PRIVATE_MESSAGE_LOCK: i64 = 0x7072_6976_6d73_6700;

/// 数据库私信模型，双方用户名通过 join 取得
#[derive(Debug, Clone, FromRow)]
struct DbPrivateMessage {
    id: Uuid,
    body: String,
    created_at: DateTime<Utc>,
    sender_id: Uuid,
    sender_username: String,
    recipient_id: Uuid,
    recipient_username: String,
}

impl From<DbPrivateMessage> for PrivateMessage {
    fn from(row: DbPrivateMessage) -> Self {
        PrivateMessage {
            id: row.id,
            sender: Identity::authenticated(UserId::from(row.sender_id), row.sender_username),
            recipient: Identity::authenticated(
                UserId::from(row.recipient_id),
                row.recipient_username,
            ),
            body: row.body,
            timestamp: row.created_at,
        }
    }
}

pub struct PgMessageStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl PgMessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    /// 保存私信
    ///
    /// 时间戳取时钟读数与已有最大时间戳中的较大者，保证按插入顺序单调不减。
    /// 事务级 advisory 锁让并发写入依次取得最大值。
    async fn save(&self, message: NewPrivateMessage) -> Result<PrivateMessage, StoreError> {
        let id = Uuid::new_v4();
        let now = self.clock.now();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(PRIVATE_MESSAGE_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        let timestamp: DateTime<Utc> = sqlx::query_scalar(
            r#"INSERT INTO private_messages (id, sender_id, recipient_id, body, created_at)
               VALUES ($1, $2, $3, $4,
                       GREATEST($5, COALESCE((SELECT MAX(created_at) FROM private_messages), $5)))
               RETURNING created_at"#,
        )
        .bind(id)
        .bind(Uuid::from(message.sender.id))
        .bind(Uuid::from(message.recipient.id))
        .bind(&message.body)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, message_id = %id, "Failed to save private message");
            map_sqlx_err(err)
        })?;

        tx.commit().await.map_err(map_sqlx_err)?;

        Ok(PrivateMessage::from_new(message, id, timestamp))
    }

    async fn history(&self, a: UserId, b: UserId) -> Result<Vec<PrivateMessage>, StoreError> {
        let rows = sqlx::query_as::<_, DbPrivateMessage>(
            r#"SELECT m.id, m.body, m.created_at,
                      s.id AS sender_id, s.username AS sender_username,
                      r.id AS recipient_id, r.username AS recipient_username
               FROM private_messages m
               JOIN users s ON s.id = m.sender_id
               JOIN users r ON r.id = m.recipient_id
               WHERE (m.sender_id = $1 AND m.recipient_id = $2)
                  OR (m.sender_id = $2 AND m.recipient_id = $1)
               ORDER BY m.seq ASC"#,
        )
        .bind(Uuid::from(a))
        .bind(Uuid::from(b))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(rows.into_iter().map(PrivateMessage::from).collect())
    }
}
