//! In-memory account directory.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::content::{Account, AccountDirectory};
use crate::game::roster::AccountId;

/// Account directory backed by a map, with sequential ids.
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    accounts: RwLock<BTreeMap<AccountId, Account>>,
}

impl InMemoryAccounts {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new account under the next free id.
    pub async fn register(&self, display_name: &str) -> Account {
        let mut accounts = self.accounts.write().await;
        let next = accounts.keys().next_back().map_or(1, |id| id.0 + 1);
        let account = Account {
            id: AccountId::new(next),
            display_name: display_name.to_string(),
        };
        accounts.insert(account.id, account.clone());
        account
    }

    /// Insert or replace an account with a known id.
    pub async fn insert(&self, account: Account) {
        self.accounts.write().await.insert(account.id, account);
    }

    /// Number of accounts.
    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// Whether the directory is empty.
    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccounts {
    async fn find_account(&self, id: AccountId) -> Option<Account> {
        self.accounts.read().await.get(&id).cloned()
    }
}
