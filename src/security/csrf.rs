//! CSRF (跨站请求伪造) 防护模块
//!
//! 使用带签名的双重提交 Cookie 模式保护发起登录的 POST 请求。
//!
//! ## Token 格式
//!
//! Cookie 中保存 `payload.signature`：
//! - `payload`：随机数据（base64url 编码），也就是表单里提交的 CSRF token
//! - `signature`：以服务端密钥对 `payload` 计算的 HMAC-SHA256（base64url 编码）
//!
//! 表单提交的值必须与 `payload` 完全一致，且签名必须能用密钥重新算出。
//! 签名和提交值都使用常量时间比较。
//!
//! ## 基本用法
//!
//! ```rust
//! use mailauth::security::csrf::CsrfGuard;
//!
//! let guard = CsrfGuard::new(b"my-secret-key-at-least-32-bytes!").unwrap();
//!
//! // 渲染表单时生成一对值
//! let pair = guard.issue().unwrap();
//! // pair.cookie_value 写入 Cookie，pair.form_value 放进表单隐藏字段
//!
//! assert!(guard.validate(Some(&pair.cookie_value), Some(&pair.form_value)));
//! assert!(!guard.validate(Some(&pair.cookie_value), Some("forged")));
//! assert!(!guard.validate(None, Some(&pair.form_value)));
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{ConfigError, Error, Result};
use crate::random::generate_random_base64_url;

type HmacSha256 = Hmac<Sha256>;

/// 随机 payload 的默认长度（字节）
const DEFAULT_TOKEN_LENGTH: usize = 32;

/// 随机 payload 的最小长度（字节）
pub const MIN_TOKEN_LENGTH: usize = 16;

/// Cookie 与表单值的分隔符
const SEPARATOR: char = '.';

/// 一次签发的 CSRF 值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfPair {
    /// 写入 Cookie 的签名值（`payload.signature`）
    pub cookie_value: String,
    /// 放进表单/请求体的值（`payload`）
    pub form_value: String,
}

/// CSRF 防护器
#[derive(Clone)]
pub struct CsrfGuard {
    secret: Vec<u8>,
    token_length: usize,
}

impl std::fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfGuard")
            .field("secret", &"<redacted>")
            .field("token_length", &self.token_length)
            .finish()
    }
}

impl CsrfGuard {
    /// 使用签名密钥创建防护器
    ///
    /// # Errors
    ///
    /// 密钥为空时返回配置错误
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::Config(ConfigError::MissingRequired(
                "csrf secret".to_string(),
            )));
        }
        Ok(Self {
            secret: secret.to_vec(),
            token_length: DEFAULT_TOKEN_LENGTH,
        })
    }

    /// 设置随机 payload 长度（字节），不小于 [`MIN_TOKEN_LENGTH`]
    pub fn with_token_length(mut self, length: usize) -> Self {
        self.token_length = length.max(MIN_TOKEN_LENGTH);
        self
    }

    /// 生成新的 Cookie/表单值对
    pub fn issue(&self) -> Result<CsrfPair> {
        let payload = generate_random_base64_url(self.token_length)?;
        let signature = URL_SAFE_NO_PAD.encode(sign(&self.secret, &payload)?);

        Ok(CsrfPair {
            cookie_value: format!("{}{}{}", payload, SEPARATOR, signature),
            form_value: payload,
        })
    }

    /// 校验请求携带的 Cookie 和提交值
    ///
    /// 任一值缺失都视为校验失败。
    pub fn validate(&self, cookie_value: Option<&str>, submitted_value: Option<&str>) -> bool {
        match (cookie_value, submitted_value) {
            (Some(cookie), Some(submitted)) => validate_csrf(cookie, submitted, &self.secret),
            _ => false,
        }
    }
}

/// 校验签名双重提交 CSRF 值
///
/// 1. Cookie 必须是 `payload.signature` 形式，两部分都非空
/// 2. 用 `secret` 重新计算 `payload` 的签名，常量时间比较
/// 3. 提交值必须与 `payload` 完全一致（常量时间比较）
///
/// 任何一步失败都返回 `false`，不区分原因。
pub fn validate_csrf(cookie_value: &str, submitted_value: &str, secret: &[u8]) -> bool {
    if secret.is_empty() || submitted_value.is_empty() {
        return false;
    }

    let Some((payload, signature_b64)) = cookie_value.split_once(SEPARATOR) else {
        return false;
    };
    if payload.is_empty() || signature_b64.is_empty() {
        return false;
    }

    let provided_signature = match URL_SAFE_NO_PAD.decode(signature_b64) {
        Ok(data) => data,
        Err(_) => return false,
    };

    let expected_signature = match sign(secret, payload) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    // 两次比较都必须执行
    let signature_ok = provided_signature.ct_eq(&expected_signature);
    let value_ok = payload.as_bytes().ct_eq(submitted_value.as_bytes());

    (signature_ok & value_ok).into()
}

/// 计算 HMAC 签名
fn sign(secret: &[u8], payload: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| Error::internal(format!("HMAC 初始化失败: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}
