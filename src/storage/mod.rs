mod auctions;
mod ledger;
mod repository;

pub use ledger::PostingOutcome;
pub use repository::*;

/// SQL migration for wallets and the transaction log
pub const MIGRATION_001_LEDGER: &str = include_str!("migrations/001_ledger.sql");

/// SQL migration for auctions and bids
pub const MIGRATION_002_AUCTIONS: &str = include_str!("migrations/002_auctions.sql");
