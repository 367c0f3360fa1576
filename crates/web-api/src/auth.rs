//! JWT 认证模块
//!
//! 在传输层接入前把 bearer token 解析为连接身份。

use axum::http::HeaderMap;
use config::JwtConfig;
use domain::{Identity, UserId};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token
    pub fn generate_token(&self, identity: &Identity) -> Result<String, ApiError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);

        let claims = Claims {
            sub: identity.id.into(),
            username: identity.username.clone(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::internal_server_error(format!("Token generation failed: {}", err)))
    }

    /// 验证 token 并得到已认证身份
    pub fn verify_token(&self, token: &str) -> Result<Identity, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| Identity::authenticated(UserId::from(data.claims.sub), data.claims.username))
            .map_err(|err| ApiError::unauthorized(format!("Invalid token: {}", err)))
    }

    /// 从 `Authorization: Bearer` 头或 `token` 查询参数中解析身份
    ///
    /// 两者都没有时返回 `Ok(None)`；提供了但无效时返回错误。
    pub fn identify(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> Result<Option<Identity>, ApiError> {
        let header_token = match headers.get(axum::http::header::AUTHORIZATION) {
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|_| ApiError::unauthorized("Invalid authorization header"))?;
                let token = value
                    .strip_prefix("Bearer ")
                    .ok_or_else(|| ApiError::unauthorized("Invalid authorization header format"))?;
                Some(token)
            }
            None => None,
        };

        match header_token.or(query_token).filter(|token| !token.is_empty()) {
            Some(token) => self.verify_token(token).map(Some),
            None => Ok(None),
        }
    }

    /// 必须携带有效 token 的请求
    pub fn require_identity(&self, headers: &HeaderMap) -> Result<Identity, ApiError> {
        self.identify(headers, None)?
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))
    }
}
