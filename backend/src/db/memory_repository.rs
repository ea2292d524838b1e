use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use super::RepositoryError;
use crate::auth::models::{NewAccount, UserAccount};

#[derive(Default)]
struct State {
    last_id: i64,
    by_email: HashMap<String, UserAccount>,
}

/// Process-local account store. The duplicate check and the insert happen
/// under one write lock.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    state: Arc<RwLock<State>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_account(&self, account: NewAccount) -> Result<UserAccount, RepositoryError> {
        let mut state = self.state.write().await;
        if state.by_email.contains_key(&account.email) {
            return Err(RepositoryError::EmailTaken);
        }
        state.last_id += 1;
        let stored = account.into_account(state.last_id, Utc::now());
        state.by_email.insert(stored.email.clone(), stored.clone());
        Ok(stored)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, RepositoryError> {
        Ok(self.state.read().await.by_email.get(email).cloned())
    }

    pub async fn list_accounts(&self) -> Result<Vec<UserAccount>, RepositoryError> {
        let state = self.state.read().await;
        let mut accounts: Vec<UserAccount> = state.by_email.values().cloned().collect();
        accounts.sort_by_key(|a| a.id);
        Ok(accounts)
    }
}
