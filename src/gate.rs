//! 登录授权回调
//!
//! 部署方在构造时注入一个 [`SignInCallback`]，签发和兑换两个流程都会在执行
//! 有副作用的步骤（创建 token / 创建 Session）之前调用它：
//!
//! - [`SignInDecision::Allow`]：继续
//! - [`SignInDecision::Deny`]：中止，跳转到 `AccessDenied` 错误页
//! - [`SignInDecision::Redirect`]：中止，原样跳转到给定地址
//! - 返回 `Err`：视为流程失败（不是拒绝），同样不执行待定的副作用
//!
//! 任何 `Fn(&SignInContext) -> Result<SignInDecision>` 都可以作为回调：
//!
//! ```rust
//! use mailauth::gate::{SignInContext, SignInDecision};
//! use mailauth::Result;
//!
//! let only_example_com = |ctx: &SignInContext| -> Result<SignInDecision> {
//!     Ok(ctx.user.email.ends_with("@example.com").into())
//! };
//! # let _ = only_example_com;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::adapter::{Account, User};
use crate::error::Result;

/// 邮箱登录相关上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailContext {
    /// `true` 表示当前处于签发阶段（即将发送验证邮件），
    /// `false` 表示处于兑换阶段（即将创建 Session）
    pub verification_request: bool,
}

/// 传给登录回调的上下文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInContext {
    /// 用户；签发阶段如果用户尚不存在，这里是一个以邮箱为 ID 的临时描述
    pub user: User,
    /// 账户关联描述
    pub account: Account,
    /// 邮箱登录上下文
    pub email: EmailContext,
}

/// 登录回调的决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInDecision {
    /// 允许登录
    Allow,
    /// 拒绝登录
    Deny,
    /// 中止并跳转到指定地址
    Redirect(String),
}

impl SignInDecision {
    /// 是否允许继续
    pub fn is_allowed(&self) -> bool {
        matches!(self, SignInDecision::Allow)
    }
}

impl From<bool> for SignInDecision {
    fn from(allowed: bool) -> Self {
        if allowed {
            SignInDecision::Allow
        } else {
            SignInDecision::Deny
        }
    }
}

/// 登录回调接口
#[async_trait]
pub trait SignInCallback: Send + Sync {
    /// 对一次登录尝试做出决定
    async fn sign_in(&self, context: &SignInContext) -> Result<SignInDecision>;
}

#[async_trait]
impl<F> SignInCallback for F
where
    F: Fn(&SignInContext) -> Result<SignInDecision> + Send + Sync,
{
    async fn sign_in(&self, context: &SignInContext) -> Result<SignInDecision> {
        self(context)
    }
}

/// 默认回调：总是允许
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl SignInCallback for AllowAll {
    async fn sign_in(&self, _context: &SignInContext) -> Result<SignInDecision> {
        Ok(SignInDecision::Allow)
    }
}
