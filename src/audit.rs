//! 审计日志模块
//!
//! 登录流程的每个终止结果都会记录一条安全事件：
//!
//! - **错误事件**：`event_type` 是错误码（如 `SIGNIN_EMAIL_ERROR`），
//!   `details` 中包含 `provider_id` 和 `error`
//! - **成功事件**：验证邮件已发送、用户创建、账户关联、登录成功、Session 创建
//!
//! ## 使用示例
//!
//! ```rust
//! use mailauth::audit::{AuditLogger, EventType, InMemoryAuditLogger, SecurityEvent};
//!
//! let logger = InMemoryAuditLogger::new();
//! logger.log(SecurityEvent::error(
//!     EventType::SigninEmailError,
//!     "email",
//!     "Only one email allowed",
//! ));
//!
//! let events = logger.get_events();
//! assert_eq!(events[0].event_name(), "SIGNIN_EMAIL_ERROR");
//! assert_eq!(events[0].provider_id(), Some("email"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// 事件严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EventSeverity {
    /// 调试信息
    Debug,
    /// 一般信息
    #[default]
    Info,
    /// 警告
    Warning,
    /// 错误
    Error,
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventSeverity::Debug => write!(f, "DEBUG"),
            EventSeverity::Info => write!(f, "INFO"),
            EventSeverity::Warning => write!(f, "WARNING"),
            EventSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// 安全事件类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// 签发流程出错（规范化失败、发送失败、存储失败）
    SigninEmailError,
    /// 兑换流程出错
    CallbackEmailError,
    /// CSRF 校验失败
    CsrfTokenMismatch,
    /// 登录回调拒绝
    AccessDenied,
    /// 验证 token 不存在或已过期
    VerificationFailed,
    /// 验证邮件已发送
    VerificationRequestSent,
    /// 用户创建
    UserCreated,
    /// 账户关联
    AccountLinked,
    /// 登录成功
    SignedIn,
    /// Session 创建
    SessionCreated,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::SigninEmailError => write!(f, "SIGNIN_EMAIL_ERROR"),
            EventType::CallbackEmailError => write!(f, "CALLBACK_EMAIL_ERROR"),
            EventType::CsrfTokenMismatch => write!(f, "CSRF_TOKEN_MISMATCH"),
            EventType::AccessDenied => write!(f, "ACCESS_DENIED"),
            EventType::VerificationFailed => write!(f, "VERIFICATION_FAILED"),
            EventType::VerificationRequestSent => write!(f, "VERIFICATION_REQUEST_SENT"),
            EventType::UserCreated => write!(f, "USER_CREATED"),
            EventType::AccountLinked => write!(f, "ACCOUNT_LINKED"),
            EventType::SignedIn => write!(f, "SIGNED_IN"),
            EventType::SessionCreated => write!(f, "SESSION_CREATED"),
        }
    }
}

/// 安全事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// 事件 ID
    pub id: String,
    /// 事件类型
    pub event_type: EventType,
    /// 严重程度
    pub severity: EventSeverity,
    /// 用户 ID（如果适用）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// 事件消息/描述
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// 额外详情
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, String>,
    /// 事件时间
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    /// 创建新的安全事件
    pub fn new(event_type: EventType, severity: EventSeverity) -> Self {
        Self {
            id: generate_event_id(),
            event_type,
            severity,
            user_id: None,
            message: None,
            details: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// 创建错误事件，记录 `{errorKind, providerId, error}`
    pub fn error(
        event_type: EventType,
        provider_id: impl Into<String>,
        error: impl std::fmt::Display,
    ) -> Self {
        let error = error.to_string();
        Self::new(event_type, EventSeverity::Error)
            .with_detail("provider_id", provider_id)
            .with_detail("error", error.clone())
            .with_message(error)
    }

    // ========================================================================
    // 便捷构造方法
    // ========================================================================

    /// CSRF 校验失败
    pub fn csrf_mismatch(provider_id: impl Into<String>) -> Self {
        Self::new(EventType::CsrfTokenMismatch, EventSeverity::Warning)
            .with_detail("provider_id", provider_id)
            .with_message("CSRF token missing or invalid")
    }

    /// 登录回调拒绝
    pub fn access_denied(provider_id: impl Into<String>) -> Self {
        Self::new(EventType::AccessDenied, EventSeverity::Warning)
            .with_detail("provider_id", provider_id)
            .with_message("Sign-in rejected by callback")
    }

    /// 验证 token 不存在或已过期
    pub fn verification_failed(provider_id: impl Into<String>) -> Self {
        Self::new(EventType::VerificationFailed, EventSeverity::Warning)
            .with_detail("provider_id", provider_id)
            .with_message("Verification token not found or expired")
    }

    /// 验证邮件已发送
    pub fn verification_request_sent(
        provider_id: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self::new(EventType::VerificationRequestSent, EventSeverity::Info)
            .with_detail("provider_id", provider_id)
            .with_detail("identifier", identifier)
            .with_message("Verification request sent")
    }

    /// 用户创建
    pub fn user_created(user_id: impl Into<String>) -> Self {
        Self::new(EventType::UserCreated, EventSeverity::Info)
            .with_user_id(user_id)
            .with_message("User created on first sign-in")
    }

    /// 账户关联
    pub fn account_linked(user_id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self::new(EventType::AccountLinked, EventSeverity::Info)
            .with_user_id(user_id)
            .with_detail("provider_id", provider_id)
    }

    /// 登录成功
    pub fn signed_in(user_id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self::new(EventType::SignedIn, EventSeverity::Info)
            .with_user_id(user_id)
            .with_detail("provider_id", provider_id)
            .with_message("User signed in")
    }

    /// Session 创建
    pub fn session_created(user_id: impl Into<String>) -> Self {
        Self::new(EventType::SessionCreated, EventSeverity::Info).with_user_id(user_id)
    }

    // ========================================================================
    // Builder 方法
    // ========================================================================

    /// 设置用户 ID
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// 设置消息
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// 添加详情
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    // ========================================================================
    // 查询方法
    // ========================================================================

    /// 获取事件类型名称
    pub fn event_name(&self) -> String {
        self.event_type.to_string()
    }

    /// 事件关联的登录方式 ID
    pub fn provider_id(&self) -> Option<&str> {
        self.details.get("provider_id").map(String::as_str)
    }

    /// 事件记录的错误描述
    pub fn error_message(&self) -> Option<&str> {
        self.details.get("error").map(String::as_str)
    }

    /// 是否是错误事件
    pub fn is_error(&self) -> bool {
        self.severity == EventSeverity::Error
    }

    /// 序列化为单行 JSON，便于写入外部日志系统
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| crate::Error::internal(e.to_string()))
    }
}

/// 生成事件 ID
fn generate_event_id() -> String {
    use crate::random::generate_random_hex;
    format!(
        "evt_{}",
        generate_random_hex(16).unwrap_or_else(|_| "unknown".to_string())
    )
}

// ============================================================================
// AuditLogger Trait
// ============================================================================

/// 审计日志记录器 trait
pub trait AuditLogger: Send + Sync {
    /// 记录安全事件
    fn log(&self, event: SecurityEvent);
}

// ============================================================================
// InMemoryAuditLogger
// ============================================================================

/// 内存审计日志记录器
///
/// 用于测试和开发环境，克隆出来的实例共享同一份事件列表
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditLogger {
    events: Arc<RwLock<Vec<SecurityEvent>>>,
}

impl InMemoryAuditLogger {
    /// 创建新的内存日志记录器
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取所有事件
    pub fn get_events(&self) -> Vec<SecurityEvent> {
        self.events
            .read()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// 获取事件数量
    pub fn event_count(&self) -> usize {
        self.events.read().map(|events| events.len()).unwrap_or(0)
    }

    /// 按事件类型获取事件
    pub fn get_events_by_type(&self, event_type: &EventType) -> Vec<SecurityEvent> {
        self.get_events()
            .into_iter()
            .filter(|e| &e.event_type == event_type)
            .collect()
    }

    /// 获取所有错误事件
    pub fn get_errors(&self) -> Vec<SecurityEvent> {
        self.get_events()
            .into_iter()
            .filter(SecurityEvent::is_error)
            .collect()
    }

    /// 清空所有事件
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }
}

impl AuditLogger for InMemoryAuditLogger {
    fn log(&self, event: SecurityEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event);
        }
    }
}

// ============================================================================
// NoOpAuditLogger
// ============================================================================

/// 空操作日志记录器
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpAuditLogger;

impl AuditLogger for NoOpAuditLogger {
    fn log(&self, _event: SecurityEvent) {}
}

// ============================================================================
// TracingAuditLogger
// ============================================================================

/// 把安全事件转发到 `tracing`
///
/// 严重程度决定日志级别，事件类型作为 `kind` 字段输出。
#[cfg(feature = "tracing")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLogger;

#[cfg(feature = "tracing")]
impl AuditLogger for TracingAuditLogger {
    fn log(&self, event: SecurityEvent) {
        let kind = event.event_name();
        let provider_id = event.provider_id().unwrap_or_default();
        let user_id = event.user_id.as_deref().unwrap_or_default();
        let message = event.message.as_deref().unwrap_or_default();

        match event.severity {
            EventSeverity::Error => tracing::error!(
                event_id = %event.id,
                kind = %kind,
                provider_id,
                error = event.error_message().unwrap_or_default(),
                "{}",
                message
            ),
            EventSeverity::Warning => tracing::warn!(
                event_id = %event.id,
                kind = %kind,
                provider_id,
                user_id,
                "{}",
                message
            ),
            EventSeverity::Info => tracing::info!(
                event_id = %event.id,
                kind = %kind,
                provider_id,
                user_id,
                "{}",
                message
            ),
            EventSeverity::Debug => tracing::debug!(
                event_id = %event.id,
                kind = %kind,
                provider_id,
                user_id,
                "{}",
                message
            ),
        }
    }
}
