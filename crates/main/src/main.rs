//! 主应用程序入口
//!
//! 启动实时消息中心：加载配置，选择存储实现，启动 Axum 服务。
//!
//! `chathub issue-token <username>` 在用户目录中登记用户并打印访问 token。

use std::sync::Arc;

use anyhow::Context;
use application::{EventRouter, Hub, MemoryMessageStore, MemoryUserDirectory};
use config::AppConfig;
use domain::{MessageStore, UserDirectory, UserId};
use infrastructure::{Db, PgMessageStore, PgUserDirectory, MIGRATOR};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use web_api::{router, AppState, JwtService};

/// 选定的存储实现
struct Stores {
    messages: Arc<dyn MessageStore>,
    users: Arc<dyn UserDirectory>,
    pg_users: Option<PgUserDirectory>,
    memory_users: Option<Arc<MemoryUserDirectory>>,
}

async fn build_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    match &config.database.url {
        Some(url) => {
            let pool = Db::create_pool(url, config.database.max_connections)
                .await
                .context("连接数据库失败")?;

            // 运行迁移
            MIGRATOR.run(&pool).await.context("数据库迁移失败")?;

            Ok(Stores {
                messages: Arc::new(PgMessageStore::new(pool.clone())),
                users: Arc::new(PgUserDirectory::new(pool.clone())),
                pg_users: Some(PgUserDirectory::new(pool)),
                memory_users: None,
            })
        }
        None => {
            tracing::warn!("未配置数据库，私信仅保存在内存中");
            let users = Arc::new(MemoryUserDirectory::new());
            Ok(Stores {
                messages: Arc::new(MemoryMessageStore::default()),
                users: users.clone(),
                pg_users: None,
                memory_users: Some(users),
            })
        }
    }
}

async fn issue_token(config: &AppConfig, stores: &Stores, username: &str) -> anyhow::Result<()> {
    let users = stores
        .pg_users
        .as_ref()
        .context("issue-token 需要配置数据库 (APP_DATABASE__URL)")?;

    let identity = match users.find_by_username(username).await? {
        Some(identity) => identity,
        None => users.upsert(UserId::from(Uuid::new_v4()), username).await?,
    };

    let jwt_service = JwtService::new(config.jwt.clone());
    let token = jwt_service
        .generate_token(&identity)
        .map_err(|err| anyhow::anyhow!("{err:?}"))?;

    println!("{token}");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听关闭信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到关闭信号，停止接受新连接");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("加载配置失败")?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let stores = build_stores(&config).await?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [command, username] = args.as_slice() {
        if command == "issue-token" {
            return issue_token(&config, &stores, username).await;
        }
    }
    if !args.is_empty() {
        anyhow::bail!("用法: chathub [issue-token <username>]");
    }

    let hub = Arc::new(Hub::new(config.hub.require_authentication));
    let event_router = Arc::new(EventRouter::new(
        hub,
        stores.messages.clone(),
        stores.users.clone(),
    ));
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let mut state = AppState::new(
        event_router,
        stores.messages.clone(),
        stores.users.clone(),
        jwt_service,
    );
    if let Some(directory) = stores.memory_users.clone() {
        state = state.with_known_users(directory);
    }

    // 启动 Web 服务器
    let app = router(state);
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("无法绑定 {address}"))?;

    tracing::info!("消息中心启动在 http://{}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
