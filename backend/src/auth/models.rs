use chrono::{DateTime, Utc};
use shared::{UserListing, UserSummary};

/// A stored account. `email` is unique and kept trimmed and lower-cased.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAccount {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Validated signup data waiting for an id.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

impl NewAccount {
    pub fn into_account(self, id: i64, created_at: DateTime<Utc>) -> UserAccount {
        UserAccount {
            id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            created_at,
        }
    }
}

impl From<&UserAccount> for UserSummary {
    fn from(account: &UserAccount) -> Self {
        Self {
            id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
        }
    }
}

impl From<UserAccount> for UserListing {
    fn from(account: UserAccount) -> Self {
        Self {
            id: account.id,
            name: account.name,
            email: account.email,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
