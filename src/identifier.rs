//! 标识符规范化
//!
//! 从用户提交的原始输入中提取唯一的目标邮箱地址。
//!
//! 默认策略 ([`DefaultNormalizer`])：
//!
//! 1. 按 `,` 切分原始输入，只取第一段，其余丢弃
//! 2. 去掉首尾空白并转为小写
//! 3. 不做进一步的格式校验；没有 `@` 的输入原样保留
//!
//! 需要更严格的策略时可以换成 [`StrictEmailNormalizer`]，或者直接传入一个
//! `Fn(&str) -> Result<String>` 闭包。规范化失败时，签发流程会在创建 token
//! 和发送邮件之前终止。
//!
//! ```rust
//! use mailauth::identifier::{DefaultNormalizer, IdentifierNormalizer};
//!
//! let normalizer = DefaultNormalizer;
//! assert_eq!(
//!     normalizer.normalize("A@x.com,b@y.com").unwrap(),
//!     "a@x.com"
//! );
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, ValidationError};

/// `local@domain.tld`，各部分不含空白和 `@`
static EMAIL_FORMAT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// 标识符规范化接口
pub trait IdentifierNormalizer: Send + Sync {
    /// 把原始输入转换为规范化的标识符
    fn normalize(&self, raw: &str) -> Result<String>;
}

impl<F> IdentifierNormalizer for F
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn normalize(&self, raw: &str) -> Result<String> {
        self(raw)
    }
}

/// 默认规范化策略：取第一个地址，去空白，转小写
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNormalizer;

impl IdentifierNormalizer for DefaultNormalizer {
    fn normalize(&self, raw: &str) -> Result<String> {
        let first = first_candidate(raw);
        if first.is_empty() {
            return Err(ValidationError::EmptyField("email".to_string()).into());
        }
        Ok(first.to_lowercase())
    }
}

/// 严格规范化策略
///
/// 拒绝包含多个地址的输入，并要求 `local@domain` 结构，两部分都不能为空，
/// 域名中至少包含一个 `.`。
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictEmailNormalizer;

impl IdentifierNormalizer for StrictEmailNormalizer {
    fn normalize(&self, raw: &str) -> Result<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyField("email".to_string()).into());
        }
        if trimmed.contains(',') || trimmed.matches('@').count() > 1 {
            return Err(ValidationError::MultipleAddresses(trimmed.to_string()).into());
        }

        let well_formed = EMAIL_FORMAT
            .as_ref()
            .is_some_and(|regex| regex.is_match(trimmed));
        if !well_formed {
            return Err(ValidationError::InvalidEmail(trimmed.to_string()).into());
        }

        Ok(trimmed.to_lowercase())
    }
}

/// 取出第一个候选地址
fn first_candidate(raw: &str) -> &str {
    raw.split(',').next().unwrap_or_default().trim()
}
