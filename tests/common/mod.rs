// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rooster_market::application::{AuctionService, LedgerService, MarketConfig, Marketplace};
use rooster_market::domain::{Auction, ManualClock};
use rooster_market::storage::Repository;

/// A market over an in-memory store whose clock only moves when told to.
pub struct TestMarket {
    pub market: Marketplace,
    pub clock: ManualClock,
}

impl TestMarket {
    pub fn ledger(&self) -> &LedgerService {
        self.market.ledger()
    }

    pub fn auctions(&self) -> &AuctionService {
        self.market.auctions()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Register a user and give them `amount` units.
    pub async fn funded_user(&self, user: &str, amount: i64) -> Result<()> {
        self.ledger().create_wallet(user).await?;
        if amount > 0 {
            self.ledger()
                .purchase(user, amount, &format!("FUND-{}", user))
                .await?;
        }
        Ok(())
    }

    /// alice sells a one-hour auction starting at 10.
    pub async fn hour_auction(&self) -> Result<Auction> {
        Ok(self
            .auctions()
            .create_auction(
                "alice",
                "Golden Rooster",
                "Hand-polished brass rooster",
                10,
                Duration::hours(1),
            )
            .await?)
    }
}

pub async fn test_market() -> Result<TestMarket> {
    test_market_with(MarketConfig::default()).await
}

pub async fn test_market_with(config: MarketConfig) -> Result<TestMarket> {
    let clock = ManualClock::new(start_time());
    let repo = Repository::in_memory().await?;
    let market = Marketplace::new(repo, config, Arc::new(clock.clone()));
    Ok(TestMarket { market, clock })
}

/// Fixed starting instant for every test clock.
pub fn start_time() -> DateTime<Utc> {
    parse_date("2024-06-01")
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
}
