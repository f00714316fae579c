use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tracing::warn;
use uuid::Uuid;

use crate::application::{MarketConfig, Marketplace};
use crate::domain::{format_cents, parse_cents, Auction, ManualClock, Transaction};
use crate::storage::Repository;

mod duration;

pub use duration::{format_duration, parse_duration};

/// Rooster Market - virtual currency ledger and auction house
#[derive(Parser)]
#[command(name = "rooster-market")]
#[command(about = "A virtual-currency ledger with timed auctions settled in rooster cash")]
#[command(version)]
pub struct Cli {
    /// Database file path (omit to keep everything in memory for this run)
    #[arg(short, long, env = "ROOSTER_MARKET_DB", global = true)]
    pub database: Option<String>,

    /// Price of one unit of rooster cash (e.g. "1.00")
    #[arg(long, global = true)]
    pub unit_price: Option<String>,

    /// Contact buyers pay and sellers are refunded through
    #[arg(long, global = true)]
    pub payout_contact: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Wallet management commands
    #[command(subcommand)]
    Wallet(WalletCommands),

    /// Credit rooster cash after an external payment was confirmed
    Purchase {
        /// User receiving the units
        user: String,

        /// Number of units bought
        amount: i64,

        /// Payment provider transaction reference
        #[arg(long = "ref")]
        reference: String,
    },

    /// Sell rooster cash back for a refund (recorded as pending)
    Sell {
        /// User selling the units
        user: String,

        /// Number of units sold
        amount: i64,
    },

    /// Move rooster cash between users
    Transfer {
        /// Number of units
        amount: i64,

        /// Sending user
        #[arg(long)]
        from: String,

        /// Receiving user
        #[arg(long)]
        to: String,
    },

    /// Show balance for a user or all users
    Balance {
        /// User (omit for everyone)
        user: Option<String>,
    },

    /// List transactions
    Transactions {
        /// Only this user's history
        #[arg(long)]
        user: Option<String>,
    },

    /// Show how to buy rooster cash
    Instructions,

    /// Verify stored balances against the transaction log
    Check,

    /// Auction commands
    #[command(subcommand)]
    Auction(AuctionCommands),

    /// Show a user's wallet and auctions
    User {
        /// User ID
        user: String,
    },

    /// Show market statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export data to CSV or JSON
    Export {
        /// What to export: transactions, auctions, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Walk through a buyer/seller session on a throwaway in-memory market
    Demo,
}

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Create a wallet for a new user
    Create {
        /// User ID (must be unique)
        user: String,
    },

    /// Show a wallet and its recent transactions
    Show {
        /// User ID
        user: String,
    },

    /// List all wallets
    List,
}

#[derive(Subcommand)]
pub enum AuctionCommands {
    /// Create an auction
    Create {
        /// Seller user ID
        seller: String,

        /// Title
        #[arg(short, long)]
        title: String,

        /// Description
        #[arg(short, long)]
        description: String,

        /// Starting bid in units
        #[arg(short, long)]
        starting_bid: i64,

        /// How long the auction runs, e.g. "90m", "1h", "30d", "2y"
        #[arg(long, value_parser = parse_duration)]
        duration: Duration,
    },

    /// Bid on an auction
    Bid {
        /// Auction ID
        id: String,

        /// Bidder user ID
        bidder: String,

        /// Bid in units
        amount: i64,
    },

    /// Show an auction and its bids
    Show {
        /// Auction ID
        id: String,
    },

    /// List active auctions, or every auction of a seller
    List {
        /// Seller user ID
        #[arg(long)]
        seller: Option<String>,
    },

    /// Close an auction now and settle the winning bid
    Close {
        /// Auction ID
        id: String,
    },

    /// Cancel an auction that has no bids
    Cancel {
        /// Auction ID
        id: String,

        /// User requesting the cancellation (must be the seller)
        user: String,
    },

    /// Close every expired auction
    Sweep,
}

impl Cli {
    fn market_config(&self) -> Result<MarketConfig> {
        let mut config = MarketConfig::default();
        if let Some(price) = &self.unit_price {
            let cents = parse_cents(price).context("Invalid unit price. Use '1.00' or '1'")?;
            anyhow::ensure!(cents > 0, "Unit price must be greater than 0");
            config = config.with_unit_price(cents);
        }
        if let Some(contact) = &self.payout_contact {
            config = config.with_payout_contact(contact.clone());
        }
        Ok(config)
    }

    async fn open_market(&self) -> Result<Marketplace> {
        let config = self.market_config()?;
        let market = match &self.database {
            Some(path) => Marketplace::open(path, config).await?,
            None => {
                warn!("no --database given; this run's changes are discarded on exit");
                Marketplace::in_memory(config).await?
            }
        };
        Ok(market)
    }

    pub async fn run(self) -> Result<()> {
        if matches!(self.command, Commands::Demo) {
            return run_demo(self.market_config()?).await;
        }

        let market = self.open_market().await?;

        match self.command {
            Commands::Wallet(wallet_cmd) => run_wallet_command(&market, wallet_cmd).await?,

            Commands::Purchase {
                user,
                amount,
                reference,
            } => {
                let tx = market.ledger().purchase(&user, amount, &reference).await?;
                println!(
                    "Purchased {} rooster cash for {} ({})",
                    tx.amount,
                    format_cents(tx.value_cents.unwrap_or_default()),
                    tx.id
                );
            }

            Commands::Sell { user, amount } => {
                let tx = market.ledger().sell(&user, amount).await?;
                println!(
                    "Sold {} rooster cash; refund of {} is pending ({})",
                    tx.amount,
                    format_cents(tx.value_cents.unwrap_or_default()),
                    tx.id
                );
            }

            Commands::Transfer { amount, from, to } => {
                let tx = market.ledger().transfer(&from, &to, amount).await?;
                println!("Transferred {} {} -> {} ({})", tx.amount, from, to, tx.id);
            }

            Commands::Balance { user } => run_balance_command(&market, user).await?,

            Commands::Transactions { user } => {
                let transactions = market.ledger().list_transactions(user.as_deref()).await?;
                print_transactions(&transactions);
            }

            Commands::Instructions => {
                let instructions = market.payment_instructions();
                println!("Payment instructions");
                println!("  Contact:        {}", instructions.payout_contact);
                println!(
                    "  Price per unit: {}",
                    format_cents(instructions.unit_price_cents)
                );
                println!();
                for step in &instructions.steps {
                    println!("  {}", step);
                }
            }

            Commands::Check => run_check_command(&market).await?,

            Commands::Auction(auction_cmd) => run_auction_command(&market, auction_cmd).await?,

            Commands::User { user } => {
                let info = market.user_info(&user).await?;
                println!("User: {}", info.user_id);
                println!("  Balance:  {} rooster cash", info.wallet.balance);
                println!(
                    "  Auctions: {} ({} active, {} completed)",
                    info.total_auctions, info.active_auctions, info.completed_auctions
                );
                for auction in &info.auctions {
                    print_auction_row(auction);
                }
            }

            Commands::Stats { json } => {
                let stats = market.statistics().await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                } else {
                    println!("Users:        {}", stats.users);
                    println!("Circulating:  {} rooster cash", stats.circulating);
                    println!("Transactions: {}", stats.transactions);
                    println!(
                        "Auctions:     {} ({} active, {} completed, {} cancelled)",
                        stats.auctions.total,
                        stats.auctions.active,
                        stats.auctions.completed,
                        stats.auctions.cancelled
                    );
                    println!("Bids:         {}", stats.auctions.total_bids);
                    println!("Sold value:   {} rooster cash", stats.auctions.total_value);
                }
            }

            Commands::Export {
                export_type,
                output,
            } => run_export_command(&market, &export_type, output.as_deref()).await?,

            // Runs on its own market, dispatched above.
            Commands::Demo => {}
        }

        Ok(())
    }
}

async fn run_wallet_command(market: &Marketplace, cmd: WalletCommands) -> Result<()> {
    match cmd {
        WalletCommands::Create { user } => {
            let wallet = market.register_user(&user).await?;
            println!("Created wallet: {}", wallet.user_id);
        }

        WalletCommands::Show { user } => {
            let wallet = market.ledger().get_wallet(&user).await?;
            println!("Wallet: {}", wallet.user_id);
            println!("  Balance:      {} rooster cash", wallet.balance);
            println!(
                "  Created:      {}",
                wallet.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!("  Transactions: {}", wallet.transaction_count());

            let history = market.ledger().list_transactions(Some(user.as_str())).await?;
            if !history.is_empty() {
                println!();
                println!("Recent transactions:");
                let recent: Vec<Transaction> = history.into_iter().rev().take(5).collect();
                print_transactions(&recent);
            }
        }

        WalletCommands::List => run_balance_command(market, None).await?,
    }
    Ok(())
}

async fn run_balance_command(market: &Marketplace, user: Option<String>) -> Result<()> {
    match user {
        Some(user) => {
            let wallet = market.ledger().get_wallet(&user).await?;
            println!("{}: {} rooster cash", wallet.user_id, wallet.balance);
        }
        None => {
            let wallets = market.ledger().list_wallets().await?;
            if wallets.is_empty() {
                println!("No wallets found.");
            } else {
                println!("{:<20} {:>12} {:>6}", "USER", "BALANCE", "TXNS");
                println!("{}", "-".repeat(40));
                for wallet in wallets {
                    println!(
                        "{:<20} {:>12} {:>6}",
                        truncate(&wallet.user_id, 20),
                        wallet.balance,
                        wallet.transaction_count()
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_check_command(market: &Marketplace) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = market.ledger().check_integrity().await?;

    println!("Wallets:       {}", report.wallet_count);
    println!("Transactions:  {}", report.transaction_count);
    println!("Circulating:   {}", report.total_circulating);
    println!("Pending sells: {}", report.pending_sells);
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_auction_command(market: &Marketplace, cmd: AuctionCommands) -> Result<()> {
    let auctions = market.auctions();
    match cmd {
        AuctionCommands::Create {
            seller,
            title,
            description,
            starting_bid,
            duration,
        } => {
            let auction = auctions
                .create_auction(&seller, &title, &description, starting_bid, duration)
                .await?;
            println!("Auction created: {}", auction.id);
            println!(
                "  Ends at: {} (in {})",
                auction.end_time.format("%Y-%m-%d %H:%M:%S"),
                format_duration(auction.duration)
            );
        }

        AuctionCommands::Bid { id, bidder, amount } => {
            let receipt = auctions.place_bid(parse_id(&id)?, &bidder, amount).await?;
            println!(
                "Bid of {} placed on '{}' ({})",
                receipt.bid.amount, receipt.auction.title, receipt.bid.id
            );
            println!(
                "  {} now leads with {} bid(s) so far",
                bidder,
                receipt.auction.bids.len()
            );
        }

        AuctionCommands::Show { id } => {
            let auction = auctions.get_auction(parse_id(&id)?).await?;
            print_auction(&auction);
        }

        AuctionCommands::List { seller } => {
            let list = match seller {
                Some(seller) => auctions.get_user_auctions(&seller).await?,
                None => auctions.get_active_auctions().await?,
            };
            if list.is_empty() {
                println!("No auctions found.");
            } else {
                for auction in &list {
                    print_auction_row(auction);
                }
            }
        }

        AuctionCommands::Close { id } => {
            let auction = auctions.close_auction(parse_id(&id)?).await?;
            print_auction(&auction);
        }

        AuctionCommands::Cancel { id, user } => {
            let auction = auctions.cancel_auction(parse_id(&id)?, &user).await?;
            println!("Cancelled auction: {} ({})", auction.title, auction.id);
        }

        AuctionCommands::Sweep => {
            let closed = auctions.sweep_expired().await?;
            println!("Closed {} expired auction(s)", closed.len());
            for auction in &closed {
                print_auction_row(auction);
            }
        }
    }
    Ok(())
}

async fn run_export_command(
    market: &Marketplace,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(market);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("Failed to create file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "transactions" => {
            let count = exporter.export_transactions_csv(writer).await?;
            eprintln!("Exported {} transactions", count);
        }
        "auctions" => {
            let count = exporter.export_auctions_csv(writer).await?;
            eprintln!("Exported {} auctions", count);
        }
        "full" => {
            let snapshot = exporter.export_json(writer).await?;
            eprintln!(
                "Exported {} wallets, {} transactions, {} auctions",
                snapshot.wallets.len(),
                snapshot.transactions.len(),
                snapshot.auctions.len()
            );
        }
        other => anyhow::bail!(
            "Unknown export type '{}'. Valid types: transactions, auctions, full",
            other
        ),
    }

    Ok(())
}

/// A scripted session on an in-memory market whose clock is moved by hand,
/// so the auction can expire without waiting.
async fn run_demo(config: MarketConfig) -> Result<()> {
    let clock = ManualClock::new(Utc::now());
    let repo = Repository::in_memory().await?;
    let market = Marketplace::new(repo, config, Arc::new(clock.clone()));
    let ledger = market.ledger();
    let auctions = market.auctions();

    println!("Registering alice, bob and carol");
    for user in ["alice", "bob", "carol"] {
        market.register_user(user).await?;
    }

    let tx = ledger.purchase("bob", 20, "DEMO-PAY-1").await?;
    println!(
        "bob bought {} rooster cash for {}",
        tx.amount,
        format_cents(tx.value_cents.unwrap_or_default())
    );
    ledger.purchase("carol", 12, "DEMO-PAY-2").await?;
    println!("carol bought 12 rooster cash");

    let auction = auctions
        .create_auction(
            "alice",
            "Golden Rooster Statue",
            "Hand-polished brass rooster",
            10,
            Duration::hours(1),
        )
        .await?;
    println!("alice listed '{}' starting at {}", auction.title, auction.starting_bid);

    auctions.place_bid(auction.id, "carol", 11).await?;
    println!("carol bid 11");
    let receipt = auctions.place_bid(auction.id, "bob", 15).await?;
    println!("bob bid {}", receipt.bid.amount);

    if let Err(err) = auctions.place_bid(auction.id, "carol", 12).await {
        println!("carol bid 12: rejected ({})", err);
    }

    clock.advance(Duration::hours(2));
    println!("Two hours later...");

    let closed = auctions.get_auction(auction.id).await?;
    print_auction(&closed);

    println!();
    run_balance_command(&market, None).await?;

    let stats = market.statistics().await?;
    println!();
    println!(
        "{} users, {} rooster cash circulating, {} transactions, {} completed auction(s)",
        stats.users, stats.circulating, stats.transactions, stats.auctions.completed
    );
    Ok(())
}

fn print_transactions(transactions: &[Transaction]) {
    if transactions.is_empty() {
        println!("No transactions found.");
        return;
    }

    println!(
        "{:>5} {:<20} {:<9} {:<10} {:>8} {:<12} {:<12}",
        "SEQ", "DATE", "KIND", "STATUS", "AMOUNT", "FROM", "TO"
    );
    println!("{}", "-".repeat(82));
    for tx in transactions {
        println!(
            "{:>5} {:<20} {:<9} {:<10} {:>8} {:<12} {:<12}",
            tx.sequence,
            tx.timestamp.format("%Y-%m-%d %H:%M:%S"),
            tx.kind.as_str(),
            tx.status.as_str(),
            tx.amount,
            truncate(tx.from_user.as_deref().unwrap_or("-"), 12),
            truncate(tx.to_user.as_deref().unwrap_or("-"), 12),
        );
    }
}

fn print_auction(auction: &Auction) {
    println!("Auction: {}", auction.title);
    println!("  ID:             {}", auction.id);
    println!("  Description:    {}", auction.description);
    println!("  Seller:         {}", auction.seller_id);
    println!("  Status:         {}", auction.status);
    println!("  Starting bid:   {}", auction.starting_bid);
    println!("  Current bid:    {}", auction.current_bid);
    println!(
        "  Highest bidder: {}",
        auction.highest_bidder.as_deref().unwrap_or("None yet")
    );
    if auction.is_active() {
        println!(
            "  Ends:           {} (in {})",
            auction.end_time.format("%Y-%m-%d %H:%M:%S"),
            format_duration(auction.time_remaining(Utc::now()))
        );
    } else {
        println!(
            "  Ended:          {}",
            auction.end_time.format("%Y-%m-%d %H:%M:%S")
        );
    }
    match auction.winner_paid {
        Some(true) => println!("  Settlement:     paid"),
        Some(false) => println!(
            "  Settlement:     failed ({})",
            auction.payment_error.as_deref().unwrap_or("unknown error")
        ),
        None => {}
    }

    if !auction.bids.is_empty() {
        println!("  Bids:");
        for bid in &auction.bids {
            println!(
                "    - {} by {} at {}",
                bid.amount,
                bid.bidder_id,
                bid.timestamp.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }
}

fn print_auction_row(auction: &Auction) {
    println!(
        "  {} {:<30} {:<10} bid {:>6} by {:<12} ends {}",
        auction.id,
        truncate(&auction.title, 30),
        auction.status.as_str(),
        auction.current_bid,
        truncate(auction.highest_bidder.as_deref().unwrap_or("-"), 12),
        auction.end_time.format("%Y-%m-%d %H:%M")
    );
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).context("Invalid auction ID format (expected UUID)")
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
