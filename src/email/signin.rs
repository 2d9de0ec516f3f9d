//! 签发流程：校验 CSRF，规范化邮箱，询问登录回调，保存 token 并发送验证邮件。

use chrono::Utc;
use url::form_urlencoded;

use super::{
    EmailAuth, PARAM_CALLBACK_URL, PARAM_EMAIL, PARAM_TOKEN, SignInRequest, expires_at,
    without_reserved,
};
use crate::adapter::{Account, Adapter, User, VerificationToken};
use crate::audit::SecurityEvent;
use crate::delivery::VerificationRequest;
use crate::error::{Error, Result};
use crate::gate::SignInDecision;
use crate::outcome::{AuthResponse, Flow, Outcome};
use crate::random::generate_verification_token;

impl<A: Adapter> EmailAuth<A> {
    /// 处理签发请求
    ///
    /// 成功时跳转到 `verify-request` 页面；任何失败都记录审计事件并跳转到错误页。
    /// CSRF 校验失败、规范化失败或回调拒绝时不会保存 token，也不会发送邮件。
    /// 邮件发送失败时已保存的 token 保留。
    pub async fn sign_in(&self, request: SignInRequest) -> AuthResponse {
        let outcome = match self.try_sign_in(&request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.audit_failure(Flow::SignIn, &err);
                Outcome::from_error(Flow::SignIn, &err, self.provider.id())
            }
        };
        AuthResponse::new(&outcome, &self.config, None)
    }

    async fn try_sign_in(&self, request: &SignInRequest) -> Result<Outcome> {
        let provider_id = self.provider.id();

        if !self
            .csrf
            .validate(request.csrf_cookie.as_deref(), request.csrf_token.as_deref())
        {
            return Err(Error::CsrfMismatch);
        }

        let identifier = self.provider.normalize(&request.email)?;

        // 只读探测，这一步不创建用户
        let user = self
            .adapter
            .get_user_by_email(&identifier)
            .await?
            .unwrap_or_else(|| User {
                id: identifier.clone(),
                email: identifier.clone(),
                email_verified: None,
            });
        let account = Account::email(&user.id, provider_id, &identifier);

        match self.authorize(user, account, true).await? {
            SignInDecision::Allow => {}
            SignInDecision::Deny => return Err(Error::AccessDenied),
            SignInDecision::Redirect(url) => return Ok(Outcome::Redirect(url)),
        }

        let expires = expires_at(Utc::now(), self.provider.max_age(), "max_age")?;
        let token = generate_verification_token(self.provider.token_length())?;
        self.adapter
            .create_verification_token(VerificationToken {
                identifier: identifier.clone(),
                token: self.hash(&token),
                expires,
            })
            .await?;

        let verification = VerificationRequest {
            url: self.callback_link(&identifier, &token, request),
            identifier,
            expires,
            token,
            base_url: self.config.origin(),
            request: request.params.clone(),
        };
        self.provider
            .sender
            .send_verification(&verification)
            .await
            .map_err(|e| match e {
                Error::Delivery(_) => e,
                other => Error::Delivery(other.to_string()),
            })?;

        self.audit.log(SecurityEvent::verification_request_sent(
            provider_id,
            &verification.identifier,
        ));

        Ok(Outcome::VerifyRequest {
            provider_id: provider_id.to_string(),
            params: request.params.clone(),
        })
    }

    /// 构造邮件中的登录链接
    ///
    /// `{base}/callback/{provider}?callbackUrl=..&token=..&email=..&<其他参数>`；
    /// 只有通过同源校验的 `callbackUrl` 才会写入链接。
    fn callback_link(&self, identifier: &str, token: &str, request: &SignInRequest) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(callback_url) = request
            .callback_url
            .as_deref()
            .and_then(|url| self.config.resolve_redirect(url))
        {
            query.append_pair(PARAM_CALLBACK_URL, &callback_url);
        }
        query.append_pair(PARAM_TOKEN, token);
        query.append_pair(PARAM_EMAIL, identifier);
        for (key, value) in without_reserved(&request.params) {
            query.append_pair(&key, &value);
        }

        format!(
            "{}?{}",
            self.config
                .auth_url(&format!("callback/{}", self.provider.id())),
            query.finish()
        )
    }
}
