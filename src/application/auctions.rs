use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{Auction, AuctionId, AuctionStatistics, AuctionStatus, Bid, Clock, Units};
use crate::storage::Repository;

use super::{AppError, LedgerService};

/// Outcome of an accepted bid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidReceipt {
    pub auction: Auction,
    pub bid: Bid,
}

/// Timed auctions settled through the ledger.
///
/// Expiry is lazy: an auction past its deadline is closed by whichever call
/// next touches it, or by `sweep_expired`. Bids only check the bidder's
/// balance at bid time; nothing is held until the auction settles.
#[derive(Clone)]
pub struct AuctionService {
    repo: Repository,
    ledger: LedgerService,
    clock: Arc<dyn Clock>,
}

impl AuctionService {
    pub fn new(repo: Repository, ledger: LedgerService) -> Self {
        let clock = ledger.clock();
        Self {
            repo,
            ledger,
            clock,
        }
    }

    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    /// List a new auction owned by `seller_id`.
    pub async fn create_auction(
        &self,
        seller_id: &str,
        title: &str,
        description: &str,
        starting_bid: Units,
        duration: Duration,
    ) -> Result<Auction, AppError> {
        if title.trim().is_empty() || description.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Title and description are required".to_string(),
            ));
        }
        if starting_bid <= 0 {
            return Err(AppError::InvalidAmount(
                "Starting bid must be greater than 0".to_string(),
            ));
        }
        let max = self.ledger.config().max_auction_duration;
        if duration <= Duration::zero() || duration > max {
            return Err(AppError::invalid_duration(duration, max));
        }

        let auction = Auction::new(
            seller_id,
            title,
            description,
            starting_bid,
            duration,
            self.clock.now(),
        );
        self.repo.insert_auction(&auction).await?;

        info!(
            auction = %auction.id,
            seller = seller_id,
            starting_bid,
            end_time = %auction.end_time,
            "auction created"
        );
        Ok(auction)
    }

    /// Offer `amount` on an auction. The offer must beat the current bid
    /// strictly and the bidder must hold at least `amount` right now.
    pub async fn place_bid(
        &self,
        auction_id: AuctionId,
        bidder_id: &str,
        amount: Units,
    ) -> Result<BidReceipt, AppError> {
        let auction = self.load(auction_id).await?;
        let now = self.clock.now();

        if auction.needs_closing(now) {
            self.close_auction(auction_id).await?;
            return Err(AppError::AuctionEnded(auction_id));
        }
        if !auction.is_active() {
            return Err(AppError::AuctionEnded(auction_id));
        }
        if bidder_id == auction.seller_id {
            return Err(AppError::SelfBid);
        }
        if amount <= auction.current_bid {
            return Err(AppError::BidTooLow {
                current_bid: auction.current_bid,
                offered: amount,
            });
        }
        if !self.ledger.has_sufficient_balance(bidder_id, amount).await? {
            return Err(AppError::InsufficientFunds {
                user_id: bidder_id.to_string(),
                required: amount,
            });
        }

        let bid = Bid::new(bidder_id, amount, now);
        if !self.repo.record_bid(auction_id, &bid).await? {
            // Another bid or a close landed between our read and the write.
            let latest = self.load(auction_id).await?;
            return Err(if latest.is_active() && !latest.has_expired(now) {
                AppError::BidTooLow {
                    current_bid: latest.current_bid,
                    offered: amount,
                }
            } else {
                AppError::AuctionEnded(auction_id)
            });
        }

        info!(auction = %auction_id, bidder = bidder_id, amount, "bid placed");
        let auction = self.load(auction_id).await?;
        Ok(BidReceipt { auction, bid })
    }

    /// Current state of an auction, closing it first if it has expired.
    pub async fn get_auction(&self, auction_id: AuctionId) -> Result<Auction, AppError> {
        let auction = self.load(auction_id).await?;
        self.refresh(auction).await
    }

    /// Every auction `seller_id` created, oldest first, each refreshed.
    pub async fn get_user_auctions(&self, seller_id: &str) -> Result<Vec<Auction>, AppError> {
        let auctions = self.repo.list_auctions_by_seller(seller_id).await?;
        let mut refreshed = Vec::with_capacity(auctions.len());
        for auction in auctions {
            refreshed.push(self.refresh(auction).await?);
        }
        Ok(refreshed)
    }

    /// Open auctions, newest first, after closing any that have expired.
    pub async fn get_active_auctions(&self) -> Result<Vec<Auction>, AppError> {
        self.sweep_expired().await?;
        Ok(self
            .repo
            .list_auctions_with_status(AuctionStatus::Active)
            .await?)
    }

    /// Close every auction whose deadline has passed and return them.
    pub async fn sweep_expired(&self) -> Result<Vec<Auction>, AppError> {
        let expired = self
            .repo
            .expired_active_auction_ids(self.clock.now())
            .await?;

        let mut closed = Vec::with_capacity(expired.len());
        for id in expired {
            closed.push(self.close_auction(id).await?);
        }
        if !closed.is_empty() {
            debug!(count = closed.len(), "expired auctions closed");
        }
        Ok(closed)
    }

    /// Complete an auction and pay the seller from the highest bidder.
    ///
    /// Closing an auction that is no longer active returns it unchanged. A
    /// successful payment and `winner_paid = true` are written together. A
    /// failed payment moves nothing and is recorded on the auction
    /// (`winner_paid = false`, `payment_error`); the auction stays completed.
    pub async fn close_auction(&self, auction_id: AuctionId) -> Result<Auction, AppError> {
        let current = self.load(auction_id).await?;
        if !current.is_active() {
            return Ok(current);
        }
        if !self.repo.mark_auction_completed(auction_id).await? {
            return self.load(auction_id).await;
        }

        // No bid can land once the status is completed, so this read is final.
        let auction = self.load(auction_id).await?;
        if let Some(winner) = &auction.highest_bidder {
            match self
                .ledger
                .settle_auction(auction_id, winner, &auction.seller_id, auction.current_bid)
                .await
            {
                Ok(tx) => {
                    info!(
                        auction = %auction_id,
                        winner = winner.as_str(),
                        amount = auction.current_bid,
                        transaction = %tx.id,
                        "auction settled"
                    );
                }
                Err(err) => {
                    let message = err.to_string();
                    warn!(
                        auction = %auction_id,
                        winner = winner.as_str(),
                        error = %message,
                        "auction completed but payment failed"
                    );
                    self.repo
                        .record_payment_failure(auction_id, &message)
                        .await?;
                }
            }
        } else {
            info!(auction = %auction_id, "auction completed without bids");
        }

        self.load(auction_id).await
    }

    /// Withdraw an auction. Only the seller may, and only before any bid.
    pub async fn cancel_auction(
        &self,
        auction_id: AuctionId,
        user_id: &str,
    ) -> Result<Auction, AppError> {
        let auction = self.load(auction_id).await?;
        if auction.seller_id != user_id {
            return Err(AppError::NotSeller(auction_id));
        }
        if auction.has_bids() {
            return Err(AppError::HasBids(auction_id));
        }

        let auction = self.refresh(auction).await?;
        if !auction.is_active() {
            return Err(AppError::AuctionEnded(auction_id));
        }

        if !self.repo.mark_auction_cancelled(auction_id).await? {
            let latest = self.load(auction_id).await?;
            return Err(if latest.has_bids() {
                AppError::HasBids(auction_id)
            } else {
                AppError::AuctionEnded(auction_id)
            });
        }

        info!(auction = %auction_id, seller = user_id, "auction cancelled");
        self.load(auction_id).await
    }

    /// Every auction as stored, newest first. Does not close expired ones.
    pub async fn list_all(&self) -> Result<Vec<Auction>, AppError> {
        Ok(self.repo.list_auctions().await?)
    }

    /// Counts by status, bids placed and value of completed auctions, as stored.
    pub async fn get_statistics(&self) -> Result<AuctionStatistics, AppError> {
        let auctions = self.repo.list_auctions().await?;
        Ok(AuctionStatistics::from_auctions(&auctions))
    }

    async fn load(&self, auction_id: AuctionId) -> Result<Auction, AppError> {
        self.repo
            .get_auction(auction_id)
            .await?
            .ok_or(AppError::UnknownAuction(auction_id))
    }

    async fn refresh(&self, auction: Auction) -> Result<Auction, AppError> {
        if auction.needs_closing(self.clock.now()) {
            debug!(auction = %auction.id, "closing expired auction on access");
            self.close_auction(auction.id).await
        } else {
            Ok(auction)
        }
    }
}
