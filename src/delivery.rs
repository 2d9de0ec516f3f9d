//! 验证邮件发送接口
//!
//! 本库只负责生成登录链接，不包含实际的邮件发送功能。应用层实现
//! [`VerificationSender`] 接入 SMTP 或第三方服务。发送失败返回
//! [`Error::Delivery`](crate::Error::Delivery) 即可，签发流程会记录错误并跳转到错误页；
//! 已经保存的 token 不会回滚。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::adapter::ExtraParams;
use crate::error::Result;

/// 发送验证邮件所需的全部信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    /// 收件人（规范化后的标识符）
    pub identifier: String,

    /// 登录链接，包含 token、邮箱以及签发请求上附带的额外参数
    pub url: String,

    /// token 过期时间
    pub expires: DateTime<Utc>,

    /// 明文 token
    pub token: String,

    /// 站点根地址
    pub base_url: String,

    /// 签发请求附带的额外参数
    pub request: ExtraParams,
}

/// 验证邮件发送接口
#[async_trait]
pub trait VerificationSender: Send + Sync {
    /// 发送验证邮件
    async fn send_verification(&self, request: &VerificationRequest) -> Result<()>;
}
