//! 结果路由
//!
//! 把两个流程的每一种终止结果映射成一个重定向地址：
//!
//! | 结果 | 跳转 |
//! |---|---|
//! | CSRF 校验失败 | `{base}/error?error=EmailSignin&provider=<id>` |
//! | 规范化失败 | `{base}/error?error=EmailSignin&provider=<id>` |
//! | 回调拒绝 | `{base}/error?error=AccessDenied` |
//! | token 不存在/已过期 | `{base}/error?error=Verification&provider=<id>` |
//! | 邮件发送失败 | `{base}/error?error=EmailSignin&provider=<id>` |
//! | 兑换阶段存储失败 | `{base}/error?error=Callback&provider=<id>` |
//! | 签发成功 | `{base}/verify-request?provider=<id>&type=email` |
//! | 兑换成功 | 配置的登录后地址（默认站点根地址） |
//!
//! token 不存在和已过期走同一个分支，调用方无法区分。

use std::fmt;

use url::form_urlencoded;

use crate::adapter::{ExtraParams, Session};
use crate::config::AuthConfig;
use crate::error::Error;

/// 错误页上的错误类别（`?error=` 的取值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 签发阶段失败
    EmailSignin,
    /// 登录回调拒绝
    AccessDenied,
    /// 验证 token 无效
    Verification,
    /// 兑换阶段失败
    Callback,
    /// 服务端配置错误
    Configuration,
}

impl ErrorKind {
    /// 错误页上使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::EmailSignin => "EmailSignin",
            ErrorKind::AccessDenied => "AccessDenied",
            ErrorKind::Verification => "Verification",
            ErrorKind::Callback => "Callback",
            ErrorKind::Configuration => "Configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 产生结果的流程
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// 签发（发送验证邮件）
    SignIn,
    /// 兑换（点击邮件中的链接）
    Callback,
}

impl ErrorKind {
    /// 把流程中的错误归类
    pub fn classify(flow: Flow, error: &Error) -> Self {
        match error {
            Error::AccessDenied => ErrorKind::AccessDenied,
            Error::Token(_) => ErrorKind::Verification,
            Error::Config(_) => ErrorKind::Configuration,
            Error::CsrfMismatch | Error::Validation(_) | Error::Delivery(_) => {
                ErrorKind::EmailSignin
            }
            Error::Callback(_) | Error::Storage(_) | Error::Crypto(_) | Error::Internal(_) => {
                match flow {
                    Flow::SignIn => ErrorKind::EmailSignin,
                    Flow::Callback => ErrorKind::Callback,
                }
            }
        }
    }
}

/// 流程的终止结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 验证邮件已发送
    VerifyRequest {
        /// 登录方式 ID
        provider_id: String,
        /// 签发请求附带的额外参数
        params: ExtraParams,
    },
    /// 兑换成功，跳转到已校验过的目标地址（`None` 使用默认地址）
    SignedIn { destination: Option<String> },
    /// 登录回调要求的跳转，原样使用
    Redirect(String),
    /// 失败
    Error {
        /// 错误类别
        kind: ErrorKind,
        /// 登录方式 ID（已知时）
        provider_id: Option<String>,
    },
}

impl Outcome {
    /// 由流程错误构造失败结果
    ///
    /// 回调拒绝的跳转不带登录方式 ID，其余错误都带。
    pub fn from_error(flow: Flow, error: &Error, provider_id: &str) -> Self {
        let kind = ErrorKind::classify(flow, error);
        let provider_id = match kind {
            ErrorKind::AccessDenied => None,
            _ => Some(provider_id.to_string()),
        };
        Outcome::Error { kind, provider_id }
    }

    /// 错误类别（成功时为 `None`）
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// 计算重定向地址
    pub fn redirect_url(&self, config: &AuthConfig) -> String {
        match self {
            Outcome::VerifyRequest {
                provider_id,
                params,
            } => {
                let mut query = form_urlencoded::Serializer::new(String::new());
                query.append_pair("provider", provider_id);
                query.append_pair("type", "email");
                for (key, value) in params {
                    if key != "provider" && key != "type" {
                        query.append_pair(key, value);
                    }
                }
                format!("{}?{}", config.auth_url("verify-request"), query.finish())
            }
            Outcome::SignedIn { destination } => destination
                .clone()
                .unwrap_or_else(|| config.post_sign_in_url()),
            Outcome::Redirect(url) => url.clone(),
            Outcome::Error { kind, provider_id } => {
                let mut query = form_urlencoded::Serializer::new(String::new());
                query.append_pair("error", kind.as_str());
                if let Some(provider_id) = provider_id {
                    query.append_pair("provider", provider_id);
                }
                format!("{}?{}", config.auth_url("error"), query.finish())
            }
        }
    }
}

/// 流程返回给传输层的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    /// 重定向地址
    pub redirect: String,

    /// 兑换成功时创建的 Session，传输层据此设置 Cookie
    pub session: Option<Session>,

    /// 失败时的错误类别
    pub error: Option<ErrorKind>,
}

impl AuthResponse {
    /// 由终止结果构造响应
    pub fn new(outcome: &Outcome, config: &AuthConfig, session: Option<Session>) -> Self {
        Self {
            redirect: outcome.redirect_url(config),
            session,
            error: outcome.error_kind(),
        }
    }

    /// 是否成功
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
