pub mod dynamodb_repository;
pub mod memory_repository;

use crate::auth::models::{NewAccount, UserAccount};
use dynamodb_repository::DynamoDbRepository;
use memory_repository::MemoryRepository;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Invalid data format: {0}")]
    InvalidData(String),
    #[error("Email already registered")]
    EmailTaken,
}

/// Account persistence, selected by `store.backend`.
#[derive(Clone)]
pub enum AccountStore {
    Memory(MemoryRepository),
    DynamoDb(DynamoDbRepository),
}

impl AccountStore {
    pub fn backend(&self) -> &'static str {
        match self {
            AccountStore::Memory(_) => "memory",
            AccountStore::DynamoDb(_) => "dynamodb",
        }
    }

    /// Assigns the next id and stores the account. Fails with `EmailTaken`
    /// without writing anything when the email already exists.
    pub async fn create_account(&self, account: NewAccount) -> Result<UserAccount, RepositoryError> {
        match self {
            AccountStore::Memory(repo) => repo.create_account(account).await,
            AccountStore::DynamoDb(repo) => repo.create_account(account).await,
        }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, RepositoryError> {
        match self {
            AccountStore::Memory(repo) => repo.find_by_email(email).await,
            AccountStore::DynamoDb(repo) => repo.find_by_email(email).await,
        }
    }

    /// All accounts ordered by id.
    pub async fn list_accounts(&self) -> Result<Vec<UserAccount>, RepositoryError> {
        match self {
            AccountStore::Memory(repo) => repo.list_accounts().await,
            AccountStore::DynamoDb(repo) => repo.list_accounts().await,
        }
    }
}
