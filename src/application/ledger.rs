use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{
    build_integrity_report, units_value, AuctionId, Clock, IntegrityReport, Transaction,
    TransactionId, Units, Wallet,
};
use crate::storage::{PostingOutcome, Repository};

use super::{AppError, MarketConfig, PaymentInstructions};

/// Owns per-user balances and the global transaction log.
///
/// Every mutating operation posts exactly one transaction, which lands in the
/// global log and in each affected wallet's history before the call returns.
#[derive(Clone)]
pub struct LedgerService {
    repo: Repository,
    config: Arc<MarketConfig>,
    clock: Arc<dyn Clock>,
}

impl LedgerService {
    pub fn new(repo: Repository, config: MarketConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            config: Arc::new(config),
            clock,
        }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    // ========================
    // Wallet operations
    // ========================

    /// Open an empty wallet for a new user.
    pub async fn create_wallet(&self, user_id: &str) -> Result<Wallet, AppError> {
        if user_id.trim().is_empty() {
            return Err(AppError::InvalidInput("User ID is required".to_string()));
        }

        let wallet = Wallet::new(user_id, self.clock.now());
        if !self.repo.insert_wallet(&wallet).await? {
            return Err(AppError::DuplicateUser(user_id.to_string()));
        }

        info!(user = user_id, "wallet created");
        Ok(wallet)
    }

    /// Current wallet snapshot, including its transaction history ids.
    pub async fn get_wallet(&self, user_id: &str) -> Result<Wallet, AppError> {
        self.repo
            .get_wallet(user_id)
            .await?
            .ok_or_else(|| AppError::UnknownUser(user_id.to_string()))
    }

    pub async fn list_wallets(&self) -> Result<Vec<Wallet>, AppError> {
        Ok(self.repo.list_wallets().await?)
    }

    /// False (never an error) when the user has no wallet.
    pub async fn has_sufficient_balance(&self, user_id: &str, amount: Units) -> Result<bool, AppError> {
        Ok(self
            .repo
            .wallet_balance(user_id)
            .await?
            .is_some_and(|balance| balance >= amount))
    }

    /// Sum of every wallet's balance.
    pub async fn total_circulating(&self) -> Result<Units, AppError> {
        let (_, total) = self.repo.wallet_totals().await?;
        Ok(total)
    }

    pub async fn user_count(&self) -> Result<usize, AppError> {
        let (count, _) = self.repo.wallet_totals().await?;
        Ok(count as usize)
    }

    // ========================
    // Balance-changing operations
    // ========================

    /// Credit units bought through an external payment.
    ///
    /// The payment reference is recorded as given; confirming it with the
    /// payment provider happens elsewhere. Creates the wallet if needed.
    pub async fn purchase(
        &self,
        user_id: &str,
        amount: Units,
        external_ref: &str,
    ) -> Result<Transaction, AppError> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount(
                "Purchase amount must be greater than 0".to_string(),
            ));
        }
        let total_cost = units_value(amount, self.config.unit_price_cents)
            .ok_or_else(|| AppError::InvalidAmount("Purchase amount is too large".to_string()))?;

        if user_id.trim().is_empty() {
            return Err(AppError::InvalidInput("User ID is required".to_string()));
        }
        if let Some(balance) = self.repo.wallet_balance(user_id).await? {
            if balance.checked_add(amount).is_none() {
                return Err(balance_overflow(user_id, amount));
            }
        }
        let now = self.clock.now();
        if self.repo.insert_wallet(&Wallet::new(user_id, now)).await? {
            debug!(user = user_id, "wallet auto-created on purchase");
        }

        let mut tx = Transaction::purchase(user_id, amount, external_ref, total_cost, now);
        self.post(&mut tx, None).await?;

        info!(user = user_id, amount, external_ref, "purchase recorded");
        Ok(tx)
    }

    /// Debit units the user is selling back. The refund is owed out of band,
    /// so the transaction stays `pending`.
    pub async fn sell(&self, user_id: &str, amount: Units) -> Result<Transaction, AppError> {
        let balance = self.require_balance(user_id).await?;
        if amount <= 0 {
            return Err(AppError::InvalidAmount(
                "Sell amount must be greater than 0".to_string(),
            ));
        }
        if balance < amount {
            return Err(AppError::InsufficientBalance {
                user_id: user_id.to_string(),
                balance,
                required: amount,
            });
        }
        let refund = units_value(amount, self.config.unit_price_cents)
            .ok_or_else(|| AppError::InvalidAmount("Sell amount is too large".to_string()))?;

        let mut tx = Transaction::sell(
            user_id,
            amount,
            refund,
            self.config.payout_contact.as_str(),
            self.clock.now(),
        );
        self.post(&mut tx, None).await?;

        info!(user = user_id, amount, refund, "sell recorded as pending");
        Ok(tx)
    }

    /// Move units from one wallet to another.
    pub async fn transfer(
        &self,
        from_user: &str,
        to_user: &str,
        amount: Units,
    ) -> Result<Transaction, AppError> {
        let tx = self.post_transfer(from_user, to_user, amount, None).await?;
        info!(from = from_user, to = to_user, amount, "transfer recorded");
        Ok(tx)
    }

    /// Pay the seller of a closed auction. The auction is marked paid in the
    /// same database transaction as the transfer.
    pub(crate) async fn settle_auction(
        &self,
        auction_id: AuctionId,
        winner: &str,
        seller: &str,
        amount: Units,
    ) -> Result<Transaction, AppError> {
        self.post_transfer(winner, seller, amount, Some(auction_id))
            .await
    }

    async fn post_transfer(
        &self,
        from_user: &str,
        to_user: &str,
        amount: Units,
        settles: Option<AuctionId>,
    ) -> Result<Transaction, AppError> {
        let balance = self.require_balance(from_user).await?;
        self.require_balance(to_user).await?;
        if amount <= 0 {
            return Err(AppError::InvalidAmount(
                "Transfer amount must be greater than 0".to_string(),
            ));
        }
        if balance < amount {
            return Err(AppError::InsufficientBalance {
                user_id: from_user.to_string(),
                balance,
                required: amount,
            });
        }

        let mut tx = Transaction::transfer(from_user, to_user, amount, self.clock.now());
        self.post(&mut tx, settles).await?;
        Ok(tx)
    }

    async fn require_balance(&self, user_id: &str) -> Result<Units, AppError> {
        self.repo
            .wallet_balance(user_id)
            .await?
            .ok_or_else(|| AppError::UnknownUser(user_id.to_string()))
    }

    /// Post through the repository, which re-checks wallets and balance
    /// inside the same database transaction as the writes.
    async fn post(&self, tx: &mut Transaction, settles: Option<AuctionId>) -> Result<(), AppError> {
        let outcome = match settles {
            Some(auction_id) => self.repo.post_settlement(auction_id, tx).await?,
            None => self.repo.post_transaction(tx).await?,
        };
        match outcome {
            PostingOutcome::Posted => Ok(()),
            PostingOutcome::UnknownUser(user_id) => Err(AppError::UnknownUser(user_id)),
            PostingOutcome::InsufficientBalance { user_id, balance } => {
                Err(AppError::InsufficientBalance {
                    user_id,
                    balance,
                    required: tx.amount,
                })
            }
            PostingOutcome::BalanceOverflow { user_id, .. } => {
                Err(balance_overflow(&user_id, tx.amount))
            }
        }
    }

    // ========================
    // Queries
    // ========================

    /// The global log, or one wallet's history when `user_id` is given.
    pub async fn list_transactions(&self, user_id: Option<&str>) -> Result<Vec<Transaction>, AppError> {
        match user_id {
            Some(user) => {
                self.require_balance(user).await?;
                Ok(self.repo.list_transactions_for_user(user).await?)
            }
            None => Ok(self.repo.list_transactions().await?),
        }
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, AppError> {
        Ok(self.repo.get_transaction(id).await?)
    }

    pub async fn transaction_count(&self) -> Result<usize, AppError> {
        Ok(self.repo.transaction_count().await? as usize)
    }

    pub fn payment_instructions(&self) -> PaymentInstructions {
        PaymentInstructions::from_config(&self.config)
    }

    /// Cross-check every stored balance against the transaction log.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let wallets = self.repo.list_wallets().await?;
        let transactions = self.repo.list_transactions().await?;
        Ok(build_integrity_report(&wallets, &transactions))
    }
}

fn balance_overflow(user_id: &str, amount: Units) -> AppError {
    AppError::InvalidAmount(format!(
        "Crediting {} to '{}' would overflow the balance",
        amount, user_id
    ))
}
