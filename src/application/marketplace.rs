use std::sync::Arc;

use crate::domain::{Clock, SystemClock, Wallet};
use crate::storage::Repository;

use super::{
    AppError, AuctionService, LedgerService, MarketConfig, MarketStatistics, PaymentInstructions,
    UserInfo,
};

/// Entry point for clients: the ledger and the auction house over one store.
#[derive(Clone)]
pub struct Marketplace {
    ledger: LedgerService,
    auctions: AuctionService,
}

impl Marketplace {
    pub fn new(repo: Repository, config: MarketConfig, clock: Arc<dyn Clock>) -> Self {
        let ledger = LedgerService::new(repo.clone(), config, clock);
        let auctions = AuctionService::new(repo, ledger.clone());
        Self { ledger, auctions }
    }

    /// A process-local market; everything is gone when it is dropped.
    pub async fn in_memory(config: MarketConfig) -> Result<Self, AppError> {
        let repo = Repository::in_memory().await?;
        Ok(Self::new(repo, config, Arc::new(SystemClock)))
    }

    /// A market persisted to a SQLite file.
    pub async fn open(path: &str, config: MarketConfig) -> Result<Self, AppError> {
        let repo = Repository::open(path).await?;
        Ok(Self::new(repo, config, Arc::new(SystemClock)))
    }

    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    pub fn auctions(&self) -> &AuctionService {
        &self.auctions
    }

    pub async fn register_user(&self, user_id: &str) -> Result<Wallet, AppError> {
        self.ledger.create_wallet(user_id).await
    }

    pub async fn user_info(&self, user_id: &str) -> Result<UserInfo, AppError> {
        let wallet = self.ledger.get_wallet(user_id).await?;
        let auctions = self.auctions.get_user_auctions(user_id).await?;
        Ok(UserInfo::new(wallet, auctions))
    }

    pub fn payment_instructions(&self) -> PaymentInstructions {
        self.ledger.payment_instructions()
    }

    pub async fn statistics(&self) -> Result<MarketStatistics, AppError> {
        Ok(MarketStatistics {
            users: self.ledger.user_count().await?,
            circulating: self.ledger.total_circulating().await?,
            transactions: self.ledger.transaction_count().await?,
            auctions: self.auctions.get_statistics().await?,
        })
    }
}
