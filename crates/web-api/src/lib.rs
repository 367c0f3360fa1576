//! Web API 层。
//!
//! 提供 Axum 路由：WebSocket 接入（认证在升级前完成）、私信历史查询和健康检查，
//! 实时事件交给应用层的 `EventRouter` 处理。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{Claims, JwtService};
pub use config::JwtConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
