use serde::{Deserialize, Serialize};

use crate::domain::{Auction, AuctionStatistics, AuctionStatus, Units, Wallet};

/// A user's wallet alongside the auctions they are selling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: String,
    pub wallet: Wallet,
    pub auctions: Vec<Auction>,
    pub total_auctions: usize,
    pub active_auctions: usize,
    pub completed_auctions: usize,
}

impl UserInfo {
    pub fn new(wallet: Wallet, auctions: Vec<Auction>) -> Self {
        let count = |status: AuctionStatus| auctions.iter().filter(|a| a.status == status).count();
        Self {
            user_id: wallet.user_id.clone(),
            total_auctions: auctions.len(),
            active_auctions: count(AuctionStatus::Active),
            completed_auctions: count(AuctionStatus::Completed),
            wallet,
            auctions,
        }
    }
}

/// Market-wide totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStatistics {
    pub users: usize,
    pub circulating: Units,
    pub transactions: usize,
    pub auctions: AuctionStatistics,
}
