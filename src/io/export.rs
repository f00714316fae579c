use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::{MarketConfig, Marketplace};
use crate::domain::{Auction, Transaction, Wallet};

/// Everything the market holds at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub config: MarketConfig,
    pub wallets: Vec<Wallet>,
    pub transactions: Vec<Transaction>,
    pub auctions: Vec<Auction>,
}

/// Writes market data out as CSV or JSON.
pub struct Exporter<'a> {
    market: &'a Marketplace,
}

impl<'a> Exporter<'a> {
    pub fn new(market: &'a Marketplace) -> Self {
        Self { market }
    }

    /// The global transaction log as CSV, one row per transaction.
    pub async fn export_transactions_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let transactions = self.market.ledger().list_transactions(None).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "timestamp",
            "kind",
            "status",
            "from_user",
            "to_user",
            "amount",
            "value_cents",
            "external_ref",
        ])?;

        for tx in &transactions {
            csv_writer.write_record([
                tx.id.to_string(),
                tx.sequence.to_string(),
                tx.timestamp.to_rfc3339(),
                tx.kind.to_string(),
                tx.status.to_string(),
                tx.from_user.clone().unwrap_or_default(),
                tx.to_user.clone().unwrap_or_default(),
                tx.amount.to_string(),
                tx.value_cents.map(|v| v.to_string()).unwrap_or_default(),
                tx.external_ref.clone().unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(transactions.len())
    }

    /// Every auction as CSV, newest first, as currently stored.
    pub async fn export_auctions_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let auctions = self.market.auctions().list_all().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "seller",
            "title",
            "status",
            "starting_bid",
            "current_bid",
            "highest_bidder",
            "bids",
            "created_at",
            "end_time",
            "winner_paid",
        ])?;

        for auction in &auctions {
            csv_writer.write_record([
                auction.id.to_string(),
                auction.seller_id.clone(),
                auction.title.clone(),
                auction.status.to_string(),
                auction.starting_bid.to_string(),
                auction.current_bid.to_string(),
                auction.highest_bidder.clone().unwrap_or_default(),
                auction.bids.len().to_string(),
                auction.created_at.to_rfc3339(),
                auction.end_time.to_rfc3339(),
                auction
                    .winner_paid
                    .map(|paid| paid.to_string())
                    .unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(auctions.len())
    }

    pub async fn snapshot(&self) -> Result<MarketSnapshot> {
        Ok(MarketSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            config: self.market.ledger().config().clone(),
            wallets: self.market.ledger().list_wallets().await?,
            transactions: self.market.ledger().list_transactions(None).await?,
            auctions: self.market.auctions().list_all().await?,
        })
    }

    /// Full snapshot as pretty-printed JSON.
    pub async fn export_json<W: Write>(&self, writer: W) -> Result<MarketSnapshot> {
        let snapshot = self.snapshot().await?;
        serde_json::to_writer_pretty(writer, &snapshot)?;
        Ok(snapshot)
    }
}
