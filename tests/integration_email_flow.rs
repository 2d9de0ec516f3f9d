//! 邮箱登录集成测试
//!
//! 通过计数的发送器、登录回调和存储包装，验证签发与兑换两个流程的副作用。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mailauth::adapter::{
    Account, Adapter, InMemoryAdapter, NewUser, Session, User, VerificationToken,
};
use mailauth::audit::{EventType, InMemoryAuditLogger};
use mailauth::delivery::{VerificationRequest, VerificationSender};
use mailauth::error::ValidationError;
use mailauth::gate::{SignInCallback, SignInContext, SignInDecision};
use mailauth::{
    AuthConfig, CallbackRequest, EmailAuth, EmailProvider, Error, ErrorKind, Result,
    SignInRequest, hash_token,
};

const BASE_URL: &str = "http://localhost:3000";
const SECRET: &[u8] = b"integration-test-secret-32-bytes";

// ============================================================================
// 测试替身
// ============================================================================

/// 记录每一封验证邮件的发送器
#[derive(Clone, Default)]
struct RecordingSender {
    sent: Arc<Mutex<Vec<VerificationRequest>>>,
    fail: bool,
}

impl RecordingSender {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn last(&self) -> VerificationRequest {
        self.sent.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl VerificationSender for RecordingSender {
    async fn send_verification(&self, request: &VerificationRequest) -> Result<()> {
        self.sent.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(Error::delivery("smtp connection refused"));
        }
        Ok(())
    }
}

/// 计数的登录回调
#[derive(Clone)]
struct CountingGate {
    calls: Arc<AtomicUsize>,
    allow: bool,
}

impl CountingGate {
    fn allowing() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            allow: true,
        }
    }

    fn denying() -> Self {
        Self {
            allow: false,
            ..Self::allowing()
        }
    }

    fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignInCallback for CountingGate {
    async fn sign_in(&self, _context: &SignInContext) -> Result<SignInDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.allow.into())
    }
}

/// 记录创建请求的存储包装
#[derive(Clone, Default)]
struct RecordingAdapter {
    inner: InMemoryAdapter,
    created_users: Arc<Mutex<Vec<NewUser>>>,
    created_sessions: Arc<Mutex<Vec<Session>>>,
    fail_sessions: bool,
}

#[async_trait]
impl Adapter for RecordingAdapter {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.inner.get_user_by_email(email).await
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.created_users.lock().unwrap().push(user.clone());
        self.inner.create_user(user).await
    }

    async fn update_user_verified(
        &self,
        user_id: &str,
        verified_at: DateTime<Utc>,
    ) -> Result<User> {
        self.inner.update_user_verified(user_id, verified_at).await
    }

    async fn link_account(&self, account: Account) -> Result<()> {
        self.inner.link_account(account).await
    }

    async fn create_session(&self, session: Session) -> Result<Session> {
        if self.fail_sessions {
            return Err(Error::storage("db down"));
        }
        self.created_sessions.lock().unwrap().push(session.clone());
        self.inner.create_session(session).await
    }

    async fn create_verification_token(&self, token: VerificationToken) -> Result<()> {
        self.inner.create_verification_token(token).await
    }

    async fn consume_verification_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> Result<Option<VerificationToken>> {
        self.inner.consume_verification_token(identifier, token).await
    }
}

struct Harness {
    auth: EmailAuth<RecordingAdapter>,
    adapter: RecordingAdapter,
    sender: RecordingSender,
    gate: CountingGate,
    logger: InMemoryAuditLogger,
}

fn harness_with(
    provider: impl FnOnce(EmailProvider) -> EmailProvider,
    sender: RecordingSender,
    gate: CountingGate,
) -> Harness {
    let adapter = RecordingAdapter::default();
    let logger = InMemoryAuditLogger::new();
    let config = AuthConfig::new(BASE_URL, SECRET).unwrap();
    let auth = EmailAuth::new(
        config,
        adapter.clone(),
        provider(EmailProvider::new(sender.clone())),
    )
    .unwrap()
    .with_callbacks(gate.clone())
    .with_audit_logger(logger.clone());

    Harness {
        auth,
        adapter,
        sender,
        gate,
        logger,
    }
}

fn harness() -> Harness {
    harness_with(|p| p, RecordingSender::default(), CountingGate::allowing())
}

impl Harness {
    fn signed(&self, email: &str) -> SignInRequest {
        let csrf = self.auth.issue_csrf().unwrap();
        SignInRequest::new(email).with_csrf(csrf.cookie_value, csrf.form_value)
    }

    /// 把发出的链接当作用户点击后的查询字符串
    fn clicked_link(&self) -> CallbackRequest {
        let url = self.sender.last().url;
        let (_, query) = url.split_once('?').unwrap();
        CallbackRequest::from_query_string(query)
    }
}

// ============================================================================
// 签发流程
// ============================================================================

/// 正常签发：发送给规范化后的地址并跳转到验证提示页
#[tokio::test]
async fn test_sign_in_dispatches_verification() {
    let h = harness();

    let response = h.auth.sign_in(h.signed("a@x.com")).await;

    assert_eq!(
        response.redirect,
        "http://localhost:3000/api/auth/verify-request?provider=email&type=email"
    );
    assert!(response.is_success());
    assert_eq!(h.sender.count(), 1);
    assert_eq!(h.sender.last().identifier, "a@x.com");
    assert_eq!(h.gate.count(), 1);
    assert_eq!(h.adapter.inner.token_count(), 1);
    assert_eq!(
        h.logger
            .get_events_by_type(&EventType::VerificationRequestSent)
            .len(),
        1
    );
}

/// 多个地址时只发送给第一个
#[tokio::test]
async fn test_sign_in_uses_first_address() {
    let h = harness();

    h.auth.sign_in(h.signed("a@x.com,b@y.com")).await;

    assert_eq!(h.sender.count(), 1);
    assert_eq!(h.sender.last().identifier, "a@x.com");
    assert!(h.adapter.inner.tokens_for("b@y.com").is_empty());
}

/// 大小写和空白被规范化
#[tokio::test]
async fn test_sign_in_normalizes_case() {
    let h = harness();

    h.auth.sign_in(h.signed("  Alice@Example.COM ")).await;

    assert_eq!(h.sender.last().identifier, "alice@example.com");
}

/// CSRF 失败：不保存 token，不发送邮件，也不询问登录回调
#[tokio::test]
async fn test_csrf_failure_has_no_side_effects() {
    let h = harness();
    let pair = h.auth.issue_csrf().unwrap();

    let cases = vec![
        SignInRequest::new("a@x.com"),
        SignInRequest::new("a@x.com").with_csrf(pair.cookie_value.clone(), "forged"),
        SignInRequest::new("a@x.com").with_csrf("garbage", pair.form_value.clone()),
        SignInRequest::new("a@x.com").with_csrf(pair.cookie_value.clone(), ""),
    ];

    for request in cases {
        let response = h.auth.sign_in(request).await;
        assert_eq!(response.error, Some(ErrorKind::EmailSignin));
        assert_eq!(
            response.redirect,
            "http://localhost:3000/api/auth/error?error=EmailSignin&provider=email"
        );
    }

    assert_eq!(h.adapter.inner.token_count(), 0);
    assert_eq!(h.sender.count(), 0);
    assert_eq!(h.gate.count(), 0);
    assert_eq!(
        h.logger.get_events_by_type(&EventType::CsrfTokenMismatch).len(),
        4
    );
}

/// 其他密钥签发的 CSRF Cookie 无效
#[tokio::test]
async fn test_csrf_from_other_secret_rejected() {
    let h = harness();
    let other = EmailAuth::new(
        AuthConfig::new(BASE_URL, b"another-secret").unwrap(),
        InMemoryAdapter::new(),
        EmailProvider::new(RecordingSender::default()),
    )
    .unwrap();
    let pair = other.issue_csrf().unwrap();

    let response = h
        .auth
        .sign_in(SignInRequest::new("a@x.com").with_csrf(pair.cookie_value, pair.form_value))
        .await;

    assert_eq!(response.error, Some(ErrorKind::EmailSignin));
    assert_eq!(h.sender.count(), 0);
}

/// 拒绝多地址的规范化策略：不询问回调、不发送，记录 SIGNIN_EMAIL_ERROR
#[tokio::test]
async fn test_rejecting_normalizer() {
    let h = harness_with(
        |p| {
            p.with_normalizer(|raw: &str| -> Result<String> {
                if raw.contains(',') {
                    return Err(ValidationError::MultipleAddresses(raw.to_string()).into());
                }
                Ok(raw.trim().to_lowercase())
            })
        },
        RecordingSender::default(),
        CountingGate::allowing(),
    );

    let response = h.auth.sign_in(h.signed("a@x.com,b@y.com")).await;

    assert_eq!(
        response.redirect,
        "http://localhost:3000/api/auth/error?error=EmailSignin&provider=email"
    );
    assert_eq!(h.gate.count(), 0);
    assert_eq!(h.sender.count(), 0);
    assert_eq!(h.adapter.inner.token_count(), 0);

    let errors = h.logger.get_events_by_type(&EventType::SigninEmailError);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].provider_id(), Some("email"));
    assert!(errors[0].error_message().unwrap().contains("a@x.com,b@y.com"));
}

/// 额外查询参数出现在登录链接和验证提示页地址中
#[tokio::test]
async fn test_extra_params_forwarded_to_link() {
    let h = harness();

    let response = h
        .auth
        .sign_in(h.signed("a@x.com").with_param("foo", "bar"))
        .await;

    let sent = h.sender.last();
    assert!(sent.url.contains("foo=bar"));
    assert!(sent.url.contains(&format!("token={}", sent.token)));
    assert!(sent.url.contains("email=a%40x.com"));
    assert_eq!(sent.base_url, BASE_URL);
    assert!(response.redirect.ends_with("&foo=bar"));
}

/// 回调拒绝：不保存 token，跳转到 AccessDenied
#[tokio::test]
async fn test_sign_in_denied_by_gate() {
    let h = harness_with(|p| p, RecordingSender::default(), CountingGate::denying());

    let response = h.auth.sign_in(h.signed("a@x.com")).await;

    assert_eq!(
        response.redirect,
        "http://localhost:3000/api/auth/error?error=AccessDenied"
    );
    assert_eq!(h.gate.count(), 1);
    assert_eq!(h.adapter.inner.token_count(), 0);
    assert_eq!(h.sender.count(), 0);
    assert_eq!(
        h.logger.get_events_by_type(&EventType::AccessDenied).len(),
        1
    );
}

/// 发送失败：token 已保存且不回滚
#[tokio::test]
async fn test_delivery_failure_keeps_token() {
    let h = harness_with(|p| p, RecordingSender::failing(), CountingGate::allowing());

    let response = h.auth.sign_in(h.signed("a@x.com")).await;

    assert_eq!(response.error, Some(ErrorKind::EmailSignin));
    assert_eq!(h.sender.count(), 1);
    assert_eq!(h.adapter.inner.token_count(), 1);

    let errors = h.logger.get_events_by_type(&EventType::SigninEmailError);
    assert_eq!(errors.len(), 1);
    assert!(
        errors[0]
            .error_message()
            .unwrap()
            .contains("smtp connection refused")
    );
}

/// 自定义 token 长度
#[tokio::test]
async fn test_token_length_configurable() {
    let h = harness_with(
        |p| p.with_token_length(16),
        RecordingSender::default(),
        CountingGate::allowing(),
    );

    h.auth.sign_in(h.signed("a@x.com")).await;

    assert_eq!(h.sender.last().token.len(), 32);
}

/// 有效期来自登录方式配置
#[tokio::test]
async fn test_token_expiry_from_provider() {
    let h = harness_with(
        |p| p.with_max_age(Duration::minutes(10)),
        RecordingSender::default(),
        CountingGate::allowing(),
    );

    h.auth.sign_in(h.signed("a@x.com")).await;

    let remaining = h.sender.last().expires - Utc::now();
    assert!(remaining <= Duration::minutes(10));
    assert!(remaining > Duration::minutes(9));
}

// ============================================================================
// 兑换流程
// ============================================================================

/// 首次兑换：创建用户和 Session，跳转站点根地址，额外参数可见
#[tokio::test]
async fn test_redeem_creates_user_and_session() {
    let h = harness();
    h.auth.sign_in(h.signed("a@x.com")).await;

    let response = h
        .auth
        .callback(h.clicked_link().with_param("foo", "bar"))
        .await;

    assert_eq!(response.redirect, "http://localhost:3000");
    assert!(response.session.is_some());

    let created = h.adapter.created_users.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].email, "a@x.com");
    assert_eq!(created[0].email_verified, None);
    assert_eq!(created[0].extra.get("foo").map(String::as_str), Some("bar"));

    let sessions = h.adapter.created_sessions.lock().unwrap().clone();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].extra.get("foo").map(String::as_str), Some("bar"));

    let user = h
        .adapter
        .get_user_by_email("a@x.com")
        .await
        .unwrap()
        .unwrap();
    assert!(user.email_verified.is_some());
    assert_eq!(sessions[0].user_id, user.id);

    // 签发一次，兑换一次
    assert_eq!(h.gate.count(), 2);
}

/// 签发时附带的参数随链接带回兑换流程
#[tokio::test]
async fn test_sign_in_params_round_trip_to_user_creation() {
    let h = harness();
    h.auth
        .sign_in(h.signed("a@x.com").with_param("invite", "xyz"))
        .await;

    h.auth.callback(h.clicked_link()).await;

    let created = h.adapter.created_users.lock().unwrap().clone();
    assert_eq!(created[0].extra.get("invite").map(String::as_str), Some("xyz"));
    assert!(!created[0].extra.contains_key("token"));
    assert!(!created[0].extra.contains_key("email"));
}

/// 重复兑换：第二次得到 Verification 错误，不会创建第二个 Session
#[tokio::test]
async fn test_redeem_twice_rejected() {
    let h = harness();
    h.auth.sign_in(h.signed("a@x.com")).await;

    let first = h.auth.callback(h.clicked_link()).await;
    let second = h.auth.callback(h.clicked_link()).await;

    assert!(first.is_success());
    assert_eq!(
        second.redirect,
        "http://localhost:3000/api/auth/error?error=Verification&provider=email"
    );
    assert!(second.session.is_none());
    assert_eq!(h.adapter.created_sessions.lock().unwrap().len(), 1);
    assert_eq!(
        h.logger
            .get_events_by_type(&EventType::VerificationFailed)
            .len(),
        1
    );
}

/// 过期 token：与不存在同样处理，不创建用户
#[tokio::test]
async fn test_redeem_expired_token() {
    let h = harness();
    h.adapter
        .create_verification_token(VerificationToken {
            identifier: "a@x.com".to_string(),
            token: hash_token("stale", SECRET),
            expires: Utc::now() - Duration::seconds(1),
        })
        .await
        .unwrap();

    let response = h.auth.callback(CallbackRequest::new("a@x.com", "stale")).await;

    assert_eq!(response.error, Some(ErrorKind::Verification));
    assert!(h.adapter.created_users.lock().unwrap().is_empty());
    assert!(h.adapter.created_sessions.lock().unwrap().is_empty());
    assert_eq!(h.gate.count(), 0);
}

/// 伪造的 token
#[tokio::test]
async fn test_redeem_unknown_token() {
    let h = harness();
    h.auth.sign_in(h.signed("a@x.com")).await;

    let response = h
        .auth
        .callback(CallbackRequest::new("a@x.com", "not-the-token"))
        .await;

    assert_eq!(response.error, Some(ErrorKind::Verification));
    assert_eq!(h.adapter.inner.token_count(), 1);
}

/// 兑换阶段拒绝：不创建 Session，已创建的用户保留
#[tokio::test]
async fn test_redeem_denied_by_gate() {
    let h = harness();
    h.auth.sign_in(h.signed("a@x.com")).await;

    let auth = EmailAuth::new(
        AuthConfig::new(BASE_URL, SECRET).unwrap(),
        h.adapter.clone(),
        EmailProvider::new(h.sender.clone()),
    )
    .unwrap()
    .with_callbacks(|ctx: &SignInContext| -> Result<SignInDecision> {
        Ok(ctx.email.verification_request.into())
    });

    let response = auth.callback(h.clicked_link()).await;

    assert_eq!(response.error, Some(ErrorKind::AccessDenied));
    assert_eq!(
        response.redirect,
        "http://localhost:3000/api/auth/error?error=AccessDenied"
    );
    assert!(h.adapter.created_sessions.lock().unwrap().is_empty());
    assert_eq!(h.adapter.created_users.lock().unwrap().len(), 1);
}

/// 兑换阶段存储失败：跳转到 Callback 错误页，不返回 Session
#[tokio::test]
async fn test_redeem_storage_failure_is_callback_error() {
    let h = harness();
    h.auth.sign_in(h.signed("a@x.com")).await;

    let adapter = RecordingAdapter {
        fail_sessions: true,
        ..h.adapter.clone()
    };
    let logger = InMemoryAuditLogger::new();
    let auth = EmailAuth::new(
        AuthConfig::new(BASE_URL, SECRET).unwrap(),
        adapter,
        EmailProvider::new(h.sender.clone()),
    )
    .unwrap()
    .with_audit_logger(logger.clone());

    let response = auth.callback(h.clicked_link()).await;

    assert_eq!(
        response.redirect,
        "http://localhost:3000/api/auth/error?error=Callback&provider=email"
    );
    assert_eq!(response.error, Some(ErrorKind::Callback));
    assert!(response.session.is_none());

    let errors = logger.get_events_by_type(&EventType::CallbackEmailError);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].error_message().unwrap().contains("db down"));
    assert!(logger.get_events_by_type(&EventType::SessionCreated).is_empty());
}

/// 兑换阶段登录回调出错：按 Callback 失败处理
#[tokio::test]
async fn test_redeem_gate_error_is_callback_error() {
    let h = harness();
    h.auth.sign_in(h.signed("a@x.com")).await;

    let logger = InMemoryAuditLogger::new();
    let auth = EmailAuth::new(
        AuthConfig::new(BASE_URL, SECRET).unwrap(),
        h.adapter.clone(),
        EmailProvider::new(h.sender.clone()),
    )
    .unwrap()
    .with_callbacks(|ctx: &SignInContext| -> Result<SignInDecision> {
        if ctx.email.verification_request {
            Ok(SignInDecision::Allow)
        } else {
            Err(Error::internal("policy service unavailable"))
        }
    })
    .with_audit_logger(logger.clone());

    let response = auth.callback(h.clicked_link()).await;

    assert_eq!(
        response.redirect,
        "http://localhost:3000/api/auth/error?error=Callback&provider=email"
    );
    assert!(response.session.is_none());
    assert!(h.adapter.created_sessions.lock().unwrap().is_empty());
    assert_eq!(
        logger
            .get_events_by_type(&EventType::CallbackEmailError)
            .len(),
        1
    );
}

/// 并发兑换同一个 token：只有一个成功
#[tokio::test]
async fn test_concurrent_redeem_single_winner() {
    let h = harness();
    h.auth.sign_in(h.signed("a@x.com")).await;
    let link = h.clicked_link();

    let (a, b) = tokio::join!(h.auth.callback(link.clone()), h.auth.callback(link));

    assert_eq!(
        [a.is_success(), b.is_success()]
            .iter()
            .filter(|ok| **ok)
            .count(),
        1
    );
    assert_eq!(h.adapter.created_sessions.lock().unwrap().len(), 1);
}

/// 自定义路由前缀和登录后地址
#[tokio::test]
async fn test_custom_routes() {
    let sender = RecordingSender::default();
    let config = AuthConfig::new("https://app.example.com", SECRET)
        .unwrap()
        .with_base_path("/auth")
        .with_post_sign_in_url("https://app.example.com/home");
    let auth = EmailAuth::new(config, InMemoryAdapter::new(), EmailProvider::new(sender.clone()))
        .unwrap();

    let csrf = auth.issue_csrf().unwrap();
    let response = auth
        .sign_in(SignInRequest::new("a@x.com").with_csrf(csrf.cookie_value, csrf.form_value))
        .await;
    assert_eq!(
        response.redirect,
        "https://app.example.com/auth/verify-request?provider=email&type=email"
    );

    let url = sender.last().url;
    assert!(url.starts_with("https://app.example.com/auth/callback/email?"));

    let (_, query) = url.split_once('?').unwrap();
    let response = auth
        .callback(CallbackRequest::from_query_string(query))
        .await;
    assert_eq!(response.redirect, "https://app.example.com/home");
}
