//! 持久化适配器
//!
//! 登录流程只通过 [`Adapter`] 访问用户、账户、Session 和验证 token，
//! 存储本身由外部实现（数据库、Redis 等）。[`InMemoryAdapter`] 是一个完整的
//! 内存实现，适用于单实例部署和测试。
//!
//! ## 验证 token 的约定
//!
//! - `create_verification_token` 每次签发都会收到一个新的 token；同一标识符
//!   可以同时存在多个未使用的 token
//! - `consume_verification_token` 必须是原子的"读取并删除"：同一 token 的
//!   并发兑换中只能有一个拿到记录，其余都得到 `None`
//! - 存储中的 `token` 字段是哈希值，明文只出现在发给用户的链接里
//! - 过期判断由调用方完成；存储可以把过期记录原样返回

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

pub mod memory;

pub use memory::InMemoryAdapter;

/// 请求附带的额外参数，会原样转交给存储层
pub type ExtraParams = BTreeMap<String, String>;

/// 用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// 用户 ID
    pub id: String,

    /// 邮箱（标识符）
    pub email: String,

    /// 邮箱验证时间，未验证时为 `None`
    pub email_verified: Option<DateTime<Utc>>,
}

/// 新建用户请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    /// 邮箱（标识符）
    pub email: String,

    /// 邮箱验证时间
    pub email_verified: Option<DateTime<Utc>>,

    /// 回调链接上附带的额外参数
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: ExtraParams,
}

/// 账户关联描述
///
/// 邮箱登录时固定为 `{provider: "email", type: "email", providerAccountId: 邮箱}`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// 所属用户 ID
    pub user_id: String,

    /// 登录方式 ID
    pub provider: String,

    /// 账户类型
    #[serde(rename = "type")]
    pub account_type: String,

    /// 登录方式内部的账户 ID
    pub provider_account_id: String,
}

impl Account {
    /// 创建邮箱账户描述
    pub fn email(
        user_id: impl Into<String>,
        provider_id: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            provider: provider_id.into(),
            account_type: "email".to_string(),
            provider_account_id: identifier.into(),
        }
    }
}

/// 登录 Session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session token
    pub session_token: String,

    /// 关联的用户 ID
    pub user_id: String,

    /// 过期时间
    pub expires: DateTime<Utc>,

    /// 回调链接上附带的额外参数
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: ExtraParams,
}

impl Session {
    /// 检查 Session 是否已过期
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires
    }
}

/// 验证 token 记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationToken {
    /// 绑定的标识符
    pub identifier: String,

    /// token 哈希
    pub token: String,

    /// 过期时间
    pub expires: DateTime<Utc>,
}

impl VerificationToken {
    /// 检查 token 是否已过期
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// 检查 token 在给定时间是否已过期
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }
}

/// 持久化适配器接口
///
/// 实现此 trait 以接入自定义的存储后端。
#[async_trait]
pub trait Adapter: Send + Sync {
    /// 按邮箱查找用户
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// 创建用户
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// 记录邮箱验证时间
    async fn update_user_verified(&self, user_id: &str, verified_at: DateTime<Utc>)
    -> Result<User>;

    /// 关联账户
    async fn link_account(&self, account: Account) -> Result<()>;

    /// 创建 Session
    async fn create_session(&self, session: Session) -> Result<Session>;

    /// 保存验证 token
    async fn create_verification_token(&self, token: VerificationToken) -> Result<()>;

    /// 原子地取出并删除验证 token
    async fn consume_verification_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> Result<Option<VerificationToken>>;
}
