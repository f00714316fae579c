use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, Units, UserId};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Units bought with an external payment; credits one wallet
    Purchase,
    /// Units sold back for a refund; debits one wallet
    Sell,
    /// Units moved between two wallets
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Purchase => "purchase",
            TransactionKind::Sell => "sell",
            TransactionKind::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "purchase" => Some(TransactionKind::Purchase),
            "sell" => Some(TransactionKind::Sell),
            "transfer" => Some(TransactionKind::Transfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    /// Awaiting an out-of-band payout. Nothing moves a transaction out of this state.
    Pending,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Pending => "pending",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "completed" => Some(TransactionStatus::Completed),
            "pending" => Some(TransactionStatus::Pending),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable ledger event.
///
/// `from_user` is the debited wallet and `to_user` the credited one: a purchase
/// only has a `to_user`, a sell only a `from_user`, a transfer has both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Position in the global log, assigned by the repository
    pub sequence: i64,
    pub kind: TransactionKind,
    /// Always positive
    pub amount: Units,
    pub from_user: Option<UserId>,
    pub to_user: Option<UserId>,
    /// Payment provider reference supplied with a purchase
    pub external_ref: Option<String>,
    /// Fiat cost of a purchase or refund owed for a sell
    pub value_cents: Option<Cents>,
    /// Where a sell refund is paid out
    pub payout_contact: Option<String>,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    fn new(
        kind: TransactionKind,
        amount: Units,
        from_user: Option<UserId>,
        to_user: Option<UserId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        assert!(amount > 0, "Transaction amount must be positive");
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            kind,
            amount,
            from_user,
            to_user,
            external_ref: None,
            value_cents: None,
            payout_contact: None,
            status: TransactionStatus::Completed,
            timestamp,
        }
    }

    pub fn purchase(
        user_id: impl Into<UserId>,
        amount: Units,
        external_ref: impl Into<String>,
        total_cost: Cents,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::new(
            TransactionKind::Purchase,
            amount,
            None,
            Some(user_id.into()),
            timestamp,
        );
        tx.external_ref = Some(external_ref.into());
        tx.value_cents = Some(total_cost);
        tx
    }

    pub fn sell(
        user_id: impl Into<UserId>,
        amount: Units,
        refund: Cents,
        payout_contact: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::new(
            TransactionKind::Sell,
            amount,
            Some(user_id.into()),
            None,
            timestamp,
        );
        tx.value_cents = Some(refund);
        tx.payout_contact = Some(payout_contact.into());
        tx.status = TransactionStatus::Pending;
        tx
    }

    pub fn transfer(
        from_user: impl Into<UserId>,
        to_user: impl Into<UserId>,
        amount: Units,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            TransactionKind::Transfer,
            amount,
            Some(from_user.into()),
            Some(to_user.into()),
            timestamp,
        )
    }

    /// Signed effect of this transaction on `user_id`'s balance.
    pub fn delta_for(&self, user_id: &str) -> Units {
        let mut delta = 0;
        if self.to_user.as_deref() == Some(user_id) {
            delta += self.amount;
        }
        if self.from_user.as_deref() == Some(user_id) {
            delta -= self.amount;
        }
        delta
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.from_user.as_deref() == Some(user_id) || self.to_user.as_deref() == Some(user_id)
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }
}
