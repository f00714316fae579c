use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TransactionId, Units};

/// Wallets are keyed by the owning user's identifier.
pub type UserId = String;

/// A user's balance plus the ordered references of every transaction that
/// touched it (oldest first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance: Units,
    pub transactions: Vec<TransactionId>,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: impl Into<UserId>, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            balance: 0,
            transactions: Vec::new(),
            created_at,
        }
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}
