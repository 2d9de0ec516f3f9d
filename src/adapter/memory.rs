//! 内存适配器实现
//!
//! 所有数据放在一把读写锁后面。验证 token 的兑换在同一次写锁内完成查找和删除，
//! 因此并发兑换同一 token 时只有一个调用方能拿到记录。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Account, Adapter, NewUser, Session, User, VerificationToken};
use crate::error::{Result, StorageError};
use crate::random::generate_random_hex;

#[derive(Debug, Default)]
struct State {
    /// user id -> 用户
    users: HashMap<String, User>,
    accounts: Vec<Account>,
    /// session token -> Session
    sessions: HashMap<String, Session>,
    /// (identifier, token hash) -> 记录
    tokens: HashMap<(String, String), VerificationToken>,
}

/// 内存存储实现
///
/// 克隆出来的实例共享同一份数据。
#[derive(Debug, Clone, Default)]
pub struct InMemoryAdapter {
    state: Arc<RwLock<State>>,
}

impl InMemoryAdapter {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StorageError::OperationFailed("lock poisoned".to_string()).into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StorageError::OperationFailed("lock poisoned".to_string()).into())
    }

    /// 当前用户数量
    pub fn user_count(&self) -> usize {
        self.read().map(|s| s.users.len()).unwrap_or_default()
    }

    /// 当前 Session 数量
    pub fn session_count(&self) -> usize {
        self.read().map(|s| s.sessions.len()).unwrap_or_default()
    }

    /// 当前未使用的验证 token 数量
    pub fn token_count(&self) -> usize {
        self.read().map(|s| s.tokens.len()).unwrap_or_default()
    }

    /// 所有用户快照
    pub fn users(&self) -> Vec<User> {
        self.read()
            .map(|s| s.users.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 所有已关联账户快照
    pub fn accounts(&self) -> Vec<Account> {
        self.read().map(|s| s.accounts.clone()).unwrap_or_default()
    }

    /// 某个标识符下所有未使用的验证 token
    pub fn tokens_for(&self, identifier: &str) -> Vec<VerificationToken> {
        self.read()
            .map(|s| {
                s.tokens
                    .values()
                    .filter(|t| t.identifier == identifier)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 清理过期的验证 token
    ///
    /// 返回被删除的记录数
    pub fn cleanup_expired_tokens(&self) -> Result<usize> {
        let mut state = self.write()?;
        let now = Utc::now();
        let before = state.tokens.len();
        state.tokens.retain(|_, record| !record.is_expired_at(now));
        Ok(before - state.tokens.len())
    }
}

#[async_trait]
impl Adapter for InMemoryAdapter {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.read()?;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut state = self.write()?;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StorageError::AlreadyExists(format!("user {}", user.email)).into());
        }

        let created = User {
            id: format!("usr_{}", generate_random_hex(12)?),
            email: user.email,
            email_verified: user.email_verified,
        };
        state.users.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_user_verified(
        &self,
        user_id: &str,
        verified_at: DateTime<Utc>,
    ) -> Result<User> {
        let mut state = self.write()?;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound(format!("user {}", user_id)))?;
        user.email_verified = Some(verified_at);
        Ok(user.clone())
    }

    async fn link_account(&self, account: Account) -> Result<()> {
        let mut state = self.write()?;
        let exists = state.accounts.iter().any(|a| {
            a.provider == account.provider && a.provider_account_id == account.provider_account_id
        });
        if exists {
            return Err(StorageError::AlreadyExists(format!(
                "account {}:{}",
                account.provider, account.provider_account_id
            ))
            .into());
        }
        state.accounts.push(account);
        Ok(())
    }

    async fn create_session(&self, session: Session) -> Result<Session> {
        let mut state = self.write()?;
        state
            .sessions
            .insert(session.session_token.clone(), session.clone());
        Ok(session)
    }

    async fn create_verification_token(&self, token: VerificationToken) -> Result<()> {
        let mut state = self.write()?;
        let key = (token.identifier.clone(), token.token.clone());
        if state.tokens.contains_key(&key) {
            return Err(
                StorageError::AlreadyExists(format!("verification token for {}", key.0)).into(),
            );
        }
        state.tokens.insert(key, token);
        Ok(())
    }

    async fn consume_verification_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> Result<Option<VerificationToken>> {
        let mut state = self.write()?;
        Ok(state
            .tokens
            .remove(&(identifier.to_string(), token.to_string())))
    }
}
