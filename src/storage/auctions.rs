use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::domain::{Auction, AuctionId, AuctionStatus, Bid, Transaction};

use super::repository::{format_timestamp, parse_timestamp};
use super::{PostingOutcome, Repository};

const AUCTION_COLUMNS: &str = "id, seller_id, title, description, starting_bid, current_bid, highest_bidder, status, created_at, end_time, duration_ms, winner_paid, payment_error";

impl Repository {
    // ========================
    // Auction operations
    // ========================

    pub async fn insert_auction(&self, auction: &Auction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO auctions (id, seller_id, title, description, starting_bid, current_bid, highest_bidder, status, created_at, end_time, duration_ms, winner_paid, payment_error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(auction.id.to_string())
        .bind(&auction.seller_id)
        .bind(&auction.title)
        .bind(&auction.description)
        .bind(auction.starting_bid)
        .bind(auction.current_bid)
        .bind(&auction.highest_bidder)
        .bind(auction.status.as_str())
        .bind(format_timestamp(auction.created_at))
        .bind(format_timestamp(auction.end_time))
        .bind(auction.duration.num_milliseconds())
        .bind(auction.winner_paid)
        .bind(&auction.payment_error)
        .execute(&self.pool)
        .await
        .context("Failed to save auction")?;

        Ok(())
    }

    /// Get an auction with its bid history.
    pub async fn get_auction(&self, id: AuctionId) -> Result<Option<Auction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM auctions WHERE id = ?",
            AUCTION_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch auction")?;

        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    /// Every auction, most recently created first.
    pub async fn list_auctions(&self) -> Result<Vec<Auction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM auctions ORDER BY created_at DESC, seq DESC",
            AUCTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list auctions")?;

        self.hydrate_all(&rows).await
    }

    /// Auctions in the given status, most recently created first.
    pub async fn list_auctions_with_status(&self, status: AuctionStatus) -> Result<Vec<Auction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM auctions WHERE status = ? ORDER BY created_at DESC, seq DESC",
            AUCTION_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list auctions by status")?;

        self.hydrate_all(&rows).await
    }

    /// A seller's auctions in the order they were created.
    pub async fn list_auctions_by_seller(&self, seller_id: &str) -> Result<Vec<Auction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM auctions WHERE seller_id = ? ORDER BY seq",
            AUCTION_COLUMNS
        ))
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list auctions for seller")?;

        self.hydrate_all(&rows).await
    }

    /// Ids of auctions still marked active whose deadline is at or before `now`.
    pub async fn expired_active_auction_ids(&self, now: DateTime<Utc>) -> Result<Vec<AuctionId>> {
        let rows = sqlx::query(
            "SELECT id FROM auctions WHERE status = 'active' AND end_time <= ? ORDER BY seq",
        )
        .bind(format_timestamp(now))
        .fetch_all(&self.pool)
        .await
        .context("Failed to find expired auctions")?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                Uuid::parse_str(&id).context("Invalid auction ID")
            })
            .collect()
    }

    /// Record a bid and make it the highest, provided the auction is still
    /// active, unexpired at `bid.timestamp`, and the bid beats the current one.
    /// Returns false (writing nothing) when any of those no longer hold.
    pub async fn record_bid(&self, auction_id: AuctionId, bid: &Bid) -> Result<bool> {
        let mut db = self.pool.begin().await.context("Failed to begin transaction")?;

        let updated = sqlx::query(
            r#"
            UPDATE auctions
            SET current_bid = ?, highest_bidder = ?
            WHERE id = ? AND status = 'active' AND current_bid < ? AND end_time > ?
            "#,
        )
        .bind(bid.amount)
        .bind(&bid.bidder_id)
        .bind(auction_id.to_string())
        .bind(bid.amount)
        .bind(format_timestamp(bid.timestamp))
        .execute(&mut *db)
        .await
        .context("Failed to update auction with bid")?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO bids (id, auction_id, bidder_id, amount, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(bid.id.to_string())
        .bind(auction_id.to_string())
        .bind(&bid.bidder_id)
        .bind(bid.amount)
        .bind(format_timestamp(bid.timestamp))
        .execute(&mut *db)
        .await
        .context("Failed to save bid")?;

        db.commit().await.context("Failed to commit bid")?;
        Ok(true)
    }

    /// Move an active auction to `completed`. Returns false if it was not
    /// active, so only one caller ever wins the transition.
    pub async fn mark_auction_completed(&self, id: AuctionId) -> Result<bool> {
        let result =
            sqlx::query("UPDATE auctions SET status = 'completed' WHERE id = ? AND status = 'active'")
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .context("Failed to complete auction")?;

        Ok(result.rows_affected() == 1)
    }

    /// Move an active auction without bids to `cancelled`.
    /// Returns false if it is no longer active or has received a bid.
    pub async fn mark_auction_cancelled(&self, id: AuctionId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE auctions SET status = 'cancelled'
            WHERE id = ? AND status = 'active'
              AND NOT EXISTS (SELECT 1 FROM bids WHERE bids.auction_id = auctions.id)
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to cancel auction")?;

        Ok(result.rows_affected() == 1)
    }

    /// Post the winner's payment and mark the auction paid in one database
    /// transaction. On any outcome other than `Posted` nothing is written.
    pub async fn post_settlement(
        &self,
        id: AuctionId,
        payment: &mut Transaction,
    ) -> Result<PostingOutcome> {
        let mut db = self.pool.begin().await.context("Failed to begin settlement")?;

        let outcome = Self::post_in(&mut db, payment).await?;
        if outcome != PostingOutcome::Posted {
            return Ok(outcome);
        }

        sqlx::query("UPDATE auctions SET winner_paid = 1, payment_error = NULL WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *db)
            .await
            .context("Failed to record settlement")?;

        db.commit().await.context("Failed to commit settlement")?;
        Ok(outcome)
    }

    /// Mark a completed auction whose payment could not be posted.
    pub async fn record_payment_failure(&self, id: AuctionId, error: &str) -> Result<()> {
        sqlx::query("UPDATE auctions SET winner_paid = 0, payment_error = ? WHERE id = ?")
            .bind(error)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to record settlement failure")?;

        Ok(())
    }

    async fn list_bids(&self, auction_id: &str) -> Result<Vec<Bid>> {
        let rows = sqlx::query(
            "SELECT id, bidder_id, amount, timestamp FROM bids WHERE auction_id = ? ORDER BY seq",
        )
        .bind(auction_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list bids")?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let timestamp: String = row.get("timestamp");
                Ok(Bid {
                    id: Uuid::parse_str(&id).context("Invalid bid ID")?,
                    bidder_id: row.get("bidder_id"),
                    amount: row.get("amount"),
                    timestamp: parse_timestamp(&timestamp, "bid timestamp")?,
                })
            })
            .collect()
    }

    async fn hydrate_all(&self, rows: &[SqliteRow]) -> Result<Vec<Auction>> {
        let mut auctions = Vec::with_capacity(rows.len());
        for row in rows {
            auctions.push(self.hydrate(row).await?);
        }
        Ok(auctions)
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<Auction> {
        let mut auction = Self::row_to_auction(row)?;
        auction.bids = self.list_bids(&auction.id.to_string()).await?;
        Ok(auction)
    }

    fn row_to_auction(row: &SqliteRow) -> Result<Auction> {
        let id: String = row.get("id");
        let status: String = row.get("status");
        let created_at: String = row.get("created_at");
        let end_time: String = row.get("end_time");

        Ok(Auction {
            id: Uuid::parse_str(&id).context("Invalid auction ID")?,
            seller_id: row.get("seller_id"),
            title: row.get("title"),
            description: row.get("description"),
            starting_bid: row.get("starting_bid"),
            current_bid: row.get("current_bid"),
            highest_bidder: row.get("highest_bidder"),
            bids: Vec::new(),
            status: AuctionStatus::from_str(&status)
                .ok_or_else(|| anyhow::anyhow!("Invalid auction status: {}", status))?,
            created_at: parse_timestamp(&created_at, "created_at")?,
            end_time: parse_timestamp(&end_time, "end_time")?,
            duration: Duration::milliseconds(row.get("duration_ms")),
            winner_paid: row.get("winner_paid"),
            payment_error: row.get("payment_error"),
        })
    }
}
