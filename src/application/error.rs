use chrono::Duration;
use thiserror::Error;

use crate::domain::{AuctionId, Units};

#[derive(Error, Debug)]
pub enum AppError {
    // Ledger
    #[error("User wallet already exists: {0}")]
    DuplicateUser(String),

    #[error("User wallet not found: {0}")]
    UnknownUser(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient rooster cash balance for {user_id}: balance {balance}, required {required}")]
    InsufficientBalance {
        user_id: String,
        balance: Units,
        required: Units,
    },

    // Auctions
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Duration must be greater than 0 and at most {max_ms}ms, got {requested_ms}ms")]
    InvalidDuration { requested_ms: i64, max_ms: i64 },

    #[error("Auction not found: {0}")]
    UnknownAuction(AuctionId),

    #[error("Auction has ended: {0}")]
    AuctionEnded(AuctionId),

    #[error("Cannot bid on your own auction")]
    SelfBid,

    #[error("Bid must be higher than current bid of {current_bid}")]
    BidTooLow { current_bid: Units, offered: Units },

    #[error("Insufficient rooster cash balance to bid {required}")]
    InsufficientFunds { user_id: String, required: Units },

    #[error("Only the seller can cancel auction {0}")]
    NotSeller(AuctionId),

    #[error("Cannot cancel auction {0} with existing bids")]
    HasBids(AuctionId),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    pub(crate) fn invalid_duration(requested: Duration, max: Duration) -> Self {
        AppError::InvalidDuration {
            requested_ms: requested.num_milliseconds(),
            max_ms: max.num_milliseconds(),
        }
    }
}
