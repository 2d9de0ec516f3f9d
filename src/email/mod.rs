//! 邮箱无密码登录
//!
//! [`EmailAuth`] 把 CSRF 防护、标识符规范化、验证 token、登录回调和结果路由
//! 组合成两个流程：
//!
//! - **签发** ([`EmailAuth::sign_in`])：CSRF 校验 → 规范化 → 登录回调 → 保存 token → 发送邮件 → 跳转
//! - **兑换** ([`EmailAuth::callback`])：取出 token → 查找/创建用户 → 登录回调 → 创建 Session → 跳转
//!
//! 两个流程都不会返回错误：每一种结果都被转换成一个 [`AuthResponse`]。
//! 流程内的步骤严格顺序执行，每个副作用只在前一步成功后才会发生；已经完成的
//! 副作用（已保存的 token、已创建的用户）在后续失败时不会回滚。
//!
//! ## 示例
//!
//! ```rust
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use async_trait::async_trait;
//! use mailauth::adapter::InMemoryAdapter;
//! use mailauth::delivery::{VerificationRequest, VerificationSender};
//! use mailauth::email::{EmailAuth, EmailProvider, SignInRequest};
//! use mailauth::{AuthConfig, Result};
//!
//! struct Outbox;
//!
//! #[async_trait]
//! impl VerificationSender for Outbox {
//!     async fn send_verification(&self, request: &VerificationRequest) -> Result<()> {
//!         println!("send {} to {}", request.url, request.identifier);
//!         Ok(())
//!     }
//! }
//!
//! let config = AuthConfig::new("http://localhost:3000", b"my-secret-key-at-least-32-bytes!").unwrap();
//! let auth = EmailAuth::new(config, InMemoryAdapter::new(), EmailProvider::new(Outbox)).unwrap();
//!
//! let csrf = auth.issue_csrf().unwrap();
//! let response = auth
//!     .sign_in(SignInRequest::new("user@example.com").with_csrf(csrf.cookie_value, csrf.form_value))
//!     .await;
//!
//! assert_eq!(
//!     response.redirect,
//!     "http://localhost:3000/api/auth/verify-request?provider=email&type=email"
//! );
//! # });
//! ```

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use url::form_urlencoded;

use crate::adapter::{Account, Adapter, ExtraParams, User};
use crate::audit::{AuditLogger, EventType, SecurityEvent};
use crate::config::AuthConfig;
use crate::delivery::VerificationSender;
use crate::error::{ConfigError, Error, Result, TokenError};
use crate::gate::{AllowAll, EmailContext, SignInCallback, SignInContext, SignInDecision};
use crate::identifier::{DefaultNormalizer, IdentifierNormalizer};
use crate::outcome::Flow;
use crate::random::hex_encode;
use crate::security::csrf::{CsrfGuard, CsrfPair};

mod callback;
mod signin;

pub use crate::outcome::AuthResponse;

/// 默认的登录方式 ID
pub const DEFAULT_PROVIDER_ID: &str = "email";

/// 验证 token 的最小长度（字节），更小的值会被提升到这里
pub const MIN_TOKEN_LENGTH: usize = 16;

/// 回调链接上由本库使用的参数名
pub(crate) const PARAM_TOKEN: &str = "token";
pub(crate) const PARAM_EMAIL: &str = "email";
pub(crate) const PARAM_CALLBACK_URL: &str = "callbackUrl";

// ============================================================================
// 登录方式配置
// ============================================================================

/// 邮箱登录方式
#[derive(Clone)]
pub struct EmailProvider {
    id: String,
    name: String,
    max_age: Duration,
    token_length: usize,
    normalizer: Arc<dyn IdentifierNormalizer>,
    sender: Arc<dyn VerificationSender>,
}

impl std::fmt::Debug for EmailProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailProvider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("max_age", &self.max_age)
            .field("token_length", &self.token_length)
            .finish_non_exhaustive()
    }
}

impl EmailProvider {
    /// 使用邮件发送实现创建登录方式
    ///
    /// 默认：ID `email`，token 有效期 24 小时，token 32 字节，默认规范化策略
    pub fn new<S>(sender: S) -> Self
    where
        S: VerificationSender + 'static,
    {
        Self {
            id: DEFAULT_PROVIDER_ID.to_string(),
            name: "Email".to_string(),
            max_age: Duration::hours(24),
            token_length: 32,
            normalizer: Arc::new(DefaultNormalizer),
            sender: Arc::new(sender),
        }
    }

    /// 短有效期预设：token 15 分钟后过期
    pub fn short_lived<S>(sender: S) -> Self
    where
        S: VerificationSender + 'static,
    {
        Self::new(sender).with_max_age(Duration::minutes(15))
    }

    /// 设置登录方式 ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// 设置显示名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 设置 token 有效期
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// 设置 token 长度（字节），不小于 [`MIN_TOKEN_LENGTH`]
    pub fn with_token_length(mut self, length: usize) -> Self {
        self.token_length = length.max(MIN_TOKEN_LENGTH);
        self
    }

    /// 替换标识符规范化策略
    pub fn with_normalizer<N>(mut self, normalizer: N) -> Self
    where
        N: IdentifierNormalizer + 'static,
    {
        self.normalizer = Arc::new(normalizer);
        self
    }

    /// 登录方式 ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 显示名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// token 有效期
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// token 长度（字节）
    pub fn token_length(&self) -> usize {
        self.token_length
    }

    fn normalize(&self, raw: &str) -> Result<String> {
        self.normalizer.normalize(raw)
    }
}

// ============================================================================
// 请求
// ============================================================================

/// 签发请求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignInRequest {
    /// 用户提交的原始邮箱
    pub email: String,
    /// 表单提交的 CSRF token
    pub csrf_token: Option<String>,
    /// 请求携带的 CSRF Cookie
    pub csrf_cookie: Option<String>,
    /// 登录后希望跳转的地址
    pub callback_url: Option<String>,
    /// 查询字符串中的其他参数，会写进登录链接
    pub params: ExtraParams,
}

impl SignInRequest {
    /// 创建签发请求
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }

    /// 设置 CSRF Cookie 和表单值
    pub fn with_csrf(mut self, cookie: impl Into<String>, token: impl Into<String>) -> Self {
        self.csrf_cookie = Some(cookie.into());
        self.csrf_token = Some(token.into());
        self
    }

    /// 设置登录后跳转地址
    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// 添加查询参数
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// 兑换请求（邮件链接上的查询参数）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackRequest {
    /// 全部查询参数
    pub query: ExtraParams,
}

impl CallbackRequest {
    /// 使用邮箱和 token 创建兑换请求
    pub fn new(email: impl Into<String>, token: impl Into<String>) -> Self {
        Self::default()
            .with_param(PARAM_EMAIL, email)
            .with_param(PARAM_TOKEN, token)
    }

    /// 从原始查询字符串解析
    pub fn from_query_string(query: &str) -> Self {
        let query = form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .into_owned()
            .collect();
        Self { query }
    }

    /// 添加查询参数
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// 取出邮箱和 token，任一缺失或为空都是错误
    fn credentials(&self) -> Result<(&str, &str)> {
        let get = |name: &str| {
            self.query
                .get(name)
                .map(String::as_str)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Token(TokenError::MissingParameter(name.to_string())))
        };
        Ok((get(PARAM_EMAIL)?, get(PARAM_TOKEN)?))
    }

    /// 登录后希望跳转的地址
    fn callback_url(&self) -> Option<&str> {
        self.query.get(PARAM_CALLBACK_URL).map(String::as_str)
    }

    /// 除 token、邮箱和跳转地址外的其他参数
    fn extra_params(&self) -> ExtraParams {
        without_reserved(&self.query)
    }
}

fn without_reserved(params: &ExtraParams) -> ExtraParams {
    params
        .iter()
        .filter(|(key, _)| {
            !matches!(
                key.as_str(),
                PARAM_TOKEN | PARAM_EMAIL | PARAM_CALLBACK_URL
            )
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

// ============================================================================
// 流程入口
// ============================================================================

/// 邮箱登录核心
pub struct EmailAuth<A: Adapter> {
    config: AuthConfig,
    adapter: A,
    provider: EmailProvider,
    csrf: CsrfGuard,
    callbacks: Arc<dyn SignInCallback>,
    audit: Arc<dyn AuditLogger>,
}

impl<A: Adapter> EmailAuth<A> {
    /// 创建登录核心
    ///
    /// 默认允许所有登录；启用 `tracing` feature 时审计事件转发到 `tracing`。
    pub fn new(config: AuthConfig, adapter: A, provider: EmailProvider) -> Result<Self> {
        let csrf = CsrfGuard::new(config.secret())?;
        Ok(Self {
            config,
            adapter,
            provider,
            csrf,
            callbacks: Arc::new(AllowAll),
            audit: default_audit_logger(),
        })
    }

    /// 设置登录回调
    pub fn with_callbacks<C>(mut self, callbacks: C) -> Self
    where
        C: SignInCallback + 'static,
    {
        self.callbacks = Arc::new(callbacks);
        self
    }

    /// 设置审计日志记录器
    pub fn with_audit_logger<L>(mut self, logger: L) -> Self
    where
        L: AuditLogger + 'static,
    {
        self.audit = Arc::new(logger);
        self
    }

    /// 为登录表单签发 CSRF 值
    pub fn issue_csrf(&self) -> Result<CsrfPair> {
        self.csrf.issue()
    }

    /// 配置
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// 登录方式
    pub fn provider(&self) -> &EmailProvider {
        &self.provider
    }

    /// 存储
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// 调用登录回调
    ///
    /// 回调内部的错误统一包装为 [`Error::Callback`]。
    async fn authorize(
        &self,
        user: User,
        account: Account,
        verification_request: bool,
    ) -> Result<SignInDecision> {
        let context = SignInContext {
            user,
            account,
            email: EmailContext {
                verification_request,
            },
        };
        self.callbacks
            .sign_in(&context)
            .await
            .map_err(|e| match e {
                Error::Callback(_) => e,
                other => Error::Callback(other.to_string()),
            })
    }

    /// 记录失败事件
    fn audit_failure(&self, flow: Flow, error: &Error) {
        let provider_id = self.provider.id();
        let event = match error {
            Error::CsrfMismatch => SecurityEvent::csrf_mismatch(provider_id),
            Error::AccessDenied => SecurityEvent::access_denied(provider_id),
            Error::Token(_) => SecurityEvent::verification_failed(provider_id),
            other => {
                let kind = match flow {
                    Flow::SignIn => EventType::SigninEmailError,
                    Flow::Callback => EventType::CallbackEmailError,
                };
                SecurityEvent::error(kind, provider_id, other)
            }
        };
        self.audit.log(event);
    }

    fn hash(&self, token: &str) -> String {
        hash_token(token, self.config.secret())
    }
}

#[cfg(feature = "tracing")]
fn default_audit_logger() -> Arc<dyn AuditLogger> {
    Arc::new(crate::audit::TracingAuditLogger)
}

#[cfg(not(feature = "tracing"))]
fn default_audit_logger() -> Arc<dyn AuditLogger> {
    Arc::new(crate::audit::NoOpAuditLogger)
}

/// 计算 `now + lifetime`，超出时间范围时返回配置错误
fn expires_at(now: DateTime<Utc>, lifetime: Duration, key: &str) -> Result<DateTime<Utc>> {
    now.checked_add_signed(lifetime).ok_or_else(|| {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("lifetime {} is out of range", lifetime),
        }
        .into()
    })
}

/// 计算验证 token 的存储哈希：`hex(sha256(token ‖ secret))`
///
/// 存储层只会看到这个值，明文 token 只出现在发给用户的链接里。
pub fn hash_token(token: &str, secret: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.update(secret);
    hex_encode(&hasher.finalize())
}
