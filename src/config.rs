//! 认证配置
//!
//! [`AuthConfig`] 在构造 [`EmailAuth`](crate::EmailAuth) 时一次性确定，
//! 之后以只读方式贯穿签发和兑换两个流程。
//!
//! ```rust
//! use mailauth::AuthConfig;
//! use chrono::Duration;
//!
//! let config = AuthConfig::new("http://localhost:3000", b"my-secret-key-at-least-32-bytes!")
//!     .unwrap()
//!     .with_session_max_age(Duration::days(7));
//!
//! assert_eq!(config.auth_url("verify-request"), "http://localhost:3000/api/auth/verify-request");
//! assert_eq!(config.post_sign_in_url(), "http://localhost:3000");
//! ```

use chrono::Duration;
use url::Url;

use crate::error::{ConfigError, Result};

/// 默认的认证路由前缀
pub const DEFAULT_BASE_PATH: &str = "/api/auth";

/// 认证配置
#[derive(Clone)]
pub struct AuthConfig {
    /// 站点地址（只保留 scheme、host 和端口）
    base_url: Url,

    /// 认证路由前缀
    base_path: String,

    /// 服务端密钥（CSRF 签名、token 哈希）
    secret: Vec<u8>,

    /// Session 有效期
    session_max_age: Duration,

    /// 登录成功后的默认跳转地址
    post_sign_in_url: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("base_url", &self.base_url.as_str())
            .field("base_path", &self.base_path)
            .field("secret", &"<redacted>")
            .field("session_max_age", &self.session_max_age)
            .field("post_sign_in_url", &self.post_sign_in_url)
            .finish()
    }
}

impl AuthConfig {
    /// 创建配置
    ///
    /// # Errors
    ///
    /// - `base_url` 不是合法的 http(s) 地址
    /// - `secret` 为空
    pub fn new(base_url: &str, secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired("secret".to_string()).into());
        }

        let base_url = Url::parse(base_url).map_err(|e| ConfigError::InvalidValue {
            key: "base_url".to_string(),
            message: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.host_str().is_none() {
            return Err(ConfigError::InvalidValue {
                key: "base_url".to_string(),
                message: "must be an absolute http(s) URL".to_string(),
            }
            .into());
        }

        Ok(Self {
            base_url,
            base_path: DEFAULT_BASE_PATH.to_string(),
            secret: secret.to_vec(),
            session_max_age: Duration::days(30),
            post_sign_in_url: None,
        })
    }

    /// 设置认证路由前缀
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        let base_path = base_path.into();
        let trimmed = base_path.trim_matches('/');
        self.base_path = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        };
        self
    }

    /// 设置 Session 有效期
    pub fn with_session_max_age(mut self, max_age: Duration) -> Self {
        self.session_max_age = max_age;
        self
    }

    /// 设置登录成功后的默认跳转地址
    pub fn with_post_sign_in_url(mut self, url: impl Into<String>) -> Self {
        self.post_sign_in_url = Some(url.into());
        self
    }

    /// 站点根地址，不带结尾的 `/`
    pub fn origin(&self) -> String {
        self.base_url.origin().ascii_serialization()
    }

    /// 认证路由的完整地址，例如 `http://host/api/auth/error`
    pub fn auth_url(&self, action: &str) -> String {
        format!(
            "{}{}/{}",
            self.origin(),
            self.base_path,
            action.trim_start_matches('/')
        )
    }

    /// 登录成功后的默认跳转地址
    pub fn post_sign_in_url(&self) -> String {
        self.post_sign_in_url
            .clone()
            .unwrap_or_else(|| self.origin())
    }

    /// 检查跳转地址是否安全：相对路径或与站点同源
    ///
    /// 返回可以直接使用的绝对地址。
    pub fn resolve_redirect(&self, target: &str) -> Option<String> {
        if target.starts_with('/') && !target.starts_with("//") && !target.contains('\\') {
            return Some(format!("{}{}", self.origin(), target));
        }
        let url = Url::parse(target).ok()?;
        (url.origin() == self.base_url.origin()).then(|| url.to_string())
    }

    /// 服务端密钥
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// Session 有效期
    pub fn session_max_age(&self) -> Duration {
        self.session_max_age
    }
}
