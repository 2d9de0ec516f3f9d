//! # mailauth
//!
//! 邮箱无密码登录（magic link）的认证核心。
//!
//! ## 功能特性
//!
//! - **CSRF 防护**: HMAC 签名的双重提交 Cookie
//! - **标识符规范化**: 可替换的邮箱规范化策略
//! - **验证 Token**: 安全随机生成，哈希后存储，一次性消费
//! - **登录回调**: 应用层可以在发送邮件前和创建 Session 前否决或改写登录
//! - **结果路由**: 每一种结果都映射为一个重定向地址
//! - **审计日志**: 结构化的安全事件，可转发到 `tracing`
//!
//! 本库不包含 HTTP 路由、邮件发送和数据库驱动，这些通过
//! [`Adapter`](adapter::Adapter) 和 [`VerificationSender`](delivery::VerificationSender) 接入。
//!
//! ## Features
//!
//! - `tracing` - 审计事件默认转发到 `tracing`（默认启用）
//!
//! ## 完整流程示例
//!
//! ```rust
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use std::sync::{Arc, Mutex};
//! use async_trait::async_trait;
//! use mailauth::adapter::InMemoryAdapter;
//! use mailauth::delivery::{VerificationRequest, VerificationSender};
//! use mailauth::{AuthConfig, CallbackRequest, EmailAuth, EmailProvider, Result, SignInRequest};
//!
//! #[derive(Clone, Default)]
//! struct Outbox(Arc<Mutex<Vec<String>>>);
//!
//! #[async_trait]
//! impl VerificationSender for Outbox {
//!     async fn send_verification(&self, request: &VerificationRequest) -> Result<()> {
//!         self.0.lock().unwrap().push(request.url.clone());
//!         Ok(())
//!     }
//! }
//!
//! let outbox = Outbox::default();
//! let config = AuthConfig::new("http://localhost:3000", b"my-secret-key-at-least-32-bytes!").unwrap();
//! let auth = EmailAuth::new(config, InMemoryAdapter::new(), EmailProvider::new(outbox.clone())).unwrap();
//!
//! // 签发
//! let csrf = auth.issue_csrf().unwrap();
//! auth.sign_in(SignInRequest::new("user@example.com").with_csrf(csrf.cookie_value, csrf.form_value))
//!     .await;
//!
//! // 兑换：用户点击邮件中的链接
//! let link = outbox.0.lock().unwrap()[0].clone();
//! let (_, query) = link.split_once('?').unwrap();
//! let response = auth.callback(CallbackRequest::from_query_string(query)).await;
//!
//! assert_eq!(response.redirect, "http://localhost:3000");
//! assert!(response.session.is_some());
//! # });
//! ```

pub mod adapter;
pub mod audit;
pub mod config;
pub mod delivery;
pub mod email;
pub mod error;
pub mod gate;
pub mod identifier;
pub mod outcome;
pub mod random;
pub mod security;

pub use error::{Error, Result};

// ============================================================================
// 流程入口导出
// ============================================================================

pub use config::AuthConfig;
pub use email::{
    AuthResponse, CallbackRequest, EmailAuth, EmailProvider, SignInRequest, hash_token,
};
pub use outcome::{ErrorKind, Flow, Outcome};

// ============================================================================
// 扩展点导出
// ============================================================================

pub use adapter::{Account, Adapter, InMemoryAdapter, NewUser, Session, User, VerificationToken};
pub use delivery::{VerificationRequest, VerificationSender};
pub use gate::{AllowAll, EmailContext, SignInCallback, SignInContext, SignInDecision};
pub use identifier::{DefaultNormalizer, IdentifierNormalizer, StrictEmailNormalizer};

// ============================================================================
// 审计日志导出
// ============================================================================

#[cfg(feature = "tracing")]
pub use audit::TracingAuditLogger;
pub use audit::{
    AuditLogger, EventSeverity, EventType, InMemoryAuditLogger, NoOpAuditLogger, SecurityEvent,
};

// ============================================================================
// 安全防护相关导出
// ============================================================================

pub use random::{
    generate_random_base64_url, generate_random_bytes, generate_random_hex,
    generate_session_token, generate_verification_token,
};
pub use security::{CsrfGuard, CsrfPair, validate_csrf};
