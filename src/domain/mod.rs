mod auction;
mod clock;
mod ledger;
mod money;
mod transaction;
mod wallet;

pub use auction::*;
pub use clock::*;
pub use ledger::*;
pub use money::*;
pub use transaction::*;
pub use wallet::*;
