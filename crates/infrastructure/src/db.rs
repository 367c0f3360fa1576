//! Database utilities

use domain::StoreError;
use sqlx::{migrate::Migrator, Pool, Postgres};

pub type DbPool = Pool<Postgres>;

/// 内嵌的数据库迁移
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub struct Db;

impl Db {
    pub async fn create_pool(database_url: &str, max_size: u32) -> Result<DbPool, sqlx::Error> {
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_size)
            .connect(database_url)
            .await
    }
}

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> StoreError {
    StoreError::storage(err.to_string())
}
