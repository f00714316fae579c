use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Units, UserId};

pub type AuctionId = Uuid;
pub type BidId = Uuid;

/// Lifecycle of an auction. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Active,
    Completed,
    Cancelled,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Active => "active",
            AuctionStatus::Completed => "completed",
            AuctionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(AuctionStatus::Active),
            "completed" => Some(AuctionStatus::Completed),
            "cancelled" => Some(AuctionStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One offer against an auction. Bids are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub bidder_id: UserId,
    pub amount: Units,
    pub timestamp: DateTime<Utc>,
}

impl Bid {
    pub fn new(bidder_id: impl Into<UserId>, amount: Units, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            bidder_id: bidder_id.into(),
            amount,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub seller_id: UserId,
    pub title: String,
    pub description: String,
    pub starting_bid: Units,
    /// Highest accepted bid, or the starting bid while there are none
    pub current_bid: Units,
    pub highest_bidder: Option<UserId>,
    pub bids: Vec<Bid>,
    pub status: AuctionStatus,
    pub created_at: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// Set when a completed auction with a winner was settled (or failed to)
    pub winner_paid: Option<bool>,
    pub payment_error: Option<String>,
}

impl Auction {
    pub fn new(
        seller_id: impl Into<UserId>,
        title: impl Into<String>,
        description: impl Into<String>,
        starting_bid: Units,
        duration: Duration,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            seller_id: seller_id.into(),
            title: title.into(),
            description: description.into(),
            starting_bid,
            current_bid: starting_bid,
            highest_bidder: None,
            bids: Vec::new(),
            status: AuctionStatus::Active,
            created_at,
            end_time: created_at + duration,
            duration,
            winner_paid: None,
            payment_error: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AuctionStatus::Active
    }

    /// The deadline has passed, whatever the stored status says.
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    /// Active in storage but past its deadline: the next access closes it.
    pub fn needs_closing(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.has_expired(now)
    }

    pub fn has_bids(&self) -> bool {
        !self.bids.is_empty()
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        if self.has_expired(now) {
            Duration::zero()
        } else {
            self.end_time - now
        }
    }
}

/// Aggregate view over every auction ever created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionStatistics {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub total_bids: usize,
    /// Sum of final prices across completed auctions
    pub total_value: Units,
}

impl AuctionStatistics {
    pub fn from_auctions<'a>(auctions: impl IntoIterator<Item = &'a Auction>) -> Self {
        auctions
            .into_iter()
            .fold(AuctionStatistics::default(), |mut stats, auction| {
                stats.total += 1;
                stats.total_bids += auction.bids.len();
                match auction.status {
                    AuctionStatus::Active => stats.active += 1,
                    AuctionStatus::Completed => {
                        stats.completed += 1;
                        stats.total_value += auction.current_bid;
                    }
                    AuctionStatus::Cancelled => stats.cancelled += 1,
                }
                stats
            })
    }
}

/// Serde adapter storing a `chrono::Duration` as whole milliseconds.
pub mod duration_millis {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        Ok(Duration::milliseconds(millis))
    }
}
