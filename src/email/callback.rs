//! 兑换流程：取出 token，查找或创建用户，询问登录回调，创建 Session。

use chrono::Utc;

use super::{CallbackRequest, EmailAuth, expires_at};
use crate::adapter::{Account, Adapter, ExtraParams, NewUser, Session, User};
use crate::audit::SecurityEvent;
use crate::error::{Error, Result, TokenError};
use crate::gate::SignInDecision;
use crate::outcome::{AuthResponse, Flow, Outcome};
use crate::random::generate_session_token;

impl<A: Adapter> EmailAuth<A> {
    /// 处理兑换请求
    ///
    /// token 不存在、已被使用或已过期时跳转到 `error=Verification`，不会查询或创建用户。
    /// 回调拒绝发生在 Session 创建之前；此时 token 已被消费，新建的用户也会保留。
    pub async fn callback(&self, request: CallbackRequest) -> AuthResponse {
        match self.try_callback(&request).await {
            Ok((outcome, session)) => AuthResponse::new(&outcome, &self.config, session),
            Err(err) => {
                self.audit_failure(Flow::Callback, &err);
                let outcome = Outcome::from_error(Flow::Callback, &err, self.provider.id());
                AuthResponse::new(&outcome, &self.config, None)
            }
        }
    }

    async fn try_callback(&self, request: &CallbackRequest) -> Result<(Outcome, Option<Session>)> {
        let provider_id = self.provider.id();
        let (identifier, token) = request.credentials()?;

        let now = Utc::now();
        self.adapter
            .consume_verification_token(identifier, &self.hash(token))
            .await?
            .filter(|record| !record.is_expired_at(now))
            .ok_or(Error::Token(TokenError::NotFoundOrExpired))?;

        let extra = request.extra_params();
        let user = self.resolve_user(identifier, &extra).await?;
        let account = Account::email(&user.id, provider_id, identifier);

        match self.authorize(user.clone(), account, false).await? {
            SignInDecision::Allow => {}
            SignInDecision::Deny => return Err(Error::AccessDenied),
            SignInDecision::Redirect(url) => return Ok((Outcome::Redirect(url), None)),
        }

        let expires = expires_at(now, self.config.session_max_age(), "session_max_age")?;

        let user = match user.email_verified {
            Some(_) => user,
            None => self.adapter.update_user_verified(&user.id, now).await?,
        };

        let session = self
            .adapter
            .create_session(Session {
                session_token: generate_session_token()?,
                user_id: user.id.clone(),
                expires,
                extra,
            })
            .await?;

        self.audit.log(SecurityEvent::signed_in(&user.id, provider_id));
        self.audit.log(SecurityEvent::session_created(&user.id));

        let destination = request
            .callback_url()
            .and_then(|url| self.config.resolve_redirect(url));
        Ok((Outcome::SignedIn { destination }, Some(session)))
    }

    /// 按邮箱查找用户，不存在时创建并关联邮箱账户
    async fn resolve_user(&self, identifier: &str, extra: &ExtraParams) -> Result<User> {
        if let Some(user) = self.adapter.get_user_by_email(identifier).await? {
            return Ok(user);
        }

        let user = self
            .adapter
            .create_user(NewUser {
                email: identifier.to_string(),
                email_verified: None,
                extra: extra.clone(),
            })
            .await?;
        self.audit.log(SecurityEvent::user_created(&user.id));

        self.adapter
            .link_account(Account::email(&user.id, self.provider.id(), identifier))
            .await?;
        self.audit.log(SecurityEvent::account_linked(&user.id, self.provider.id()));

        Ok(user)
    }
}
