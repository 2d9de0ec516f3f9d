//! 统一错误类型模块
//!
//! 提供 mailauth 库中所有操作的错误类型定义。
//!
//! 这些错误只在库内部和协作者（存储、邮件发送、登录回调）之间传递；
//! 登录流程在边界处把它们统一转换成重定向，不会抛给传输层。

use std::fmt;

/// mailauth 库的统一结果类型
pub type Result<T> = std::result::Result<T, Error>;

/// mailauth 库的错误类型
#[derive(Debug)]
pub enum Error {
    /// CSRF 校验失败（Cookie 缺失、格式错误、签名或提交值不匹配）
    CsrfMismatch,

    /// 标识符（邮箱）规范化/验证错误
    Validation(ValidationError),

    /// 登录回调拒绝了本次登录
    AccessDenied,

    /// 验证 Token 相关错误
    Token(TokenError),

    /// 验证邮件发送失败
    Delivery(String),

    /// 登录回调内部出错（不是拒绝，而是回调本身失败）
    Callback(String),

    /// 配置错误
    Config(ConfigError),

    /// 存储错误
    Storage(StorageError),

    /// 加密错误
    Crypto(CryptoError),

    /// 内部错误
    Internal(String),
}

impl Error {
    /// 创建一个内部错误
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// 创建一个验证错误
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(ValidationError::Custom(msg.into()))
    }

    /// 创建一个邮件发送错误
    pub fn delivery(msg: impl Into<String>) -> Self {
        Error::Delivery(msg.into())
    }

    /// 创建一个存储操作错误
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(StorageError::OperationFailed(msg.into()))
    }

    /// 创建一个登录回调错误
    pub fn callback(msg: impl Into<String>) -> Self {
        Error::Callback(msg.into())
    }
}

/// 标识符验证相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// 无效的邮箱格式
    InvalidEmail(String),
    /// 提交了多个地址
    MultipleAddresses(String),
    /// 字段为空
    EmptyField(String),
    /// 自定义验证错误
    Custom(String),
}

/// 验证 Token 相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Token 不存在或已过期（两种情况对调用方不可区分）
    NotFoundOrExpired,
    /// 请求中缺少必需的参数
    MissingParameter(String),
}

/// 配置相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// 缺少必需的配置
    MissingRequired(String),
    /// 无效的配置值
    InvalidValue { key: String, message: String },
}

/// 存储相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// 记录未找到
    NotFound(String),
    /// 记录已存在
    AlreadyExists(String),
    /// 操作失败
    OperationFailed(String),
}

/// 加密相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// 随机数生成失败
    RngFailed(String),
}

// ============================================================================
// Display 实现
// ============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CsrfMismatch => write!(f, "CSRF token mismatch"),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::AccessDenied => write!(f, "Access denied by sign-in callback"),
            Error::Token(e) => write!(f, "Token error: {}", e),
            Error::Delivery(msg) => write!(f, "Delivery error: {}", msg),
            Error::Callback(msg) => write!(f, "Sign-in callback error: {}", msg),
            Error::Config(e) => write!(f, "Config error: {}", e),
            Error::Storage(e) => write!(f, "Storage error: {}", e),
            Error::Crypto(e) => write!(f, "Crypto error: {}", e),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidEmail(email) => write!(f, "invalid email format: {}", email),
            ValidationError::MultipleAddresses(raw) => {
                write!(f, "only one email address allowed: {}", raw)
            }
            ValidationError::EmptyField(field) => write!(f, "field '{}' cannot be empty", field),
            ValidationError::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::NotFoundOrExpired => write!(f, "verification token not found or expired"),
            TokenError::MissingParameter(name) => {
                write!(f, "missing required parameter: {}", name)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(key) => {
                write!(f, "missing required configuration: {}", key)
            }
            ConfigError::InvalidValue { key, message } => {
                write!(f, "invalid configuration value for '{}': {}", key, message)
            }
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(item) => write!(f, "not found: {}", item),
            StorageError::AlreadyExists(item) => write!(f, "already exists: {}", item),
            StorageError::OperationFailed(msg) => write!(f, "storage operation failed: {}", msg),
        }
    }
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::RngFailed(msg) => write!(f, "random number generation failed: {}", msg),
        }
    }
}

// ============================================================================
// std::error::Error 实现
// ============================================================================

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Validation(e) => Some(e),
            Error::Token(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Storage(e) => Some(e),
            Error::Crypto(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ValidationError {}
impl std::error::Error for TokenError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for StorageError {}
impl std::error::Error for CryptoError {}

// ============================================================================
// From 实现 - 方便错误转换
// ============================================================================

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<TokenError> for Error {
    fn from(err: TokenError) -> Self {
        Error::Token(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Storage(err)
    }
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        Error::Crypto(err)
    }
}
