// Application layer: the services clients (CLI, tests, a future API) call.

mod auctions;
mod config;
mod error;
mod ledger;
mod marketplace;
mod reporting;

pub use auctions::*;
pub use config::*;
pub use error::*;
pub use ledger::*;
pub use marketplace::*;
pub use reporting::*;
