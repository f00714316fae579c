use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction as DbTransaction};
use uuid::Uuid;

use crate::domain::{
    Transaction, TransactionKind, TransactionStatus, Units, UserId, Wallet,
};

use super::repository::{format_timestamp, parse_timestamp};
use super::Repository;

/// Result of trying to post a transaction to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostingOutcome {
    /// Balances were updated and the transaction appended
    Posted,
    /// A participant has no wallet; nothing was written
    UnknownUser(UserId),
    /// The debited wallet cannot cover the amount; nothing was written
    InsufficientBalance { user_id: UserId, balance: Units },
    /// Crediting the amount would overflow the wallet; nothing was written
    BalanceOverflow { user_id: UserId, balance: Units },
}

const TRANSACTION_COLUMNS: &str = "t.id, t.sequence, t.kind, t.amount, t.from_user, t.to_user, t.external_ref, t.value_cents, t.payout_contact, t.status, t.timestamp";

impl Repository {
    // ========================
    // Wallet operations
    // ========================

    /// Insert a wallet unless one already exists for the user.
    /// Returns false when the user already had a wallet.
    pub async fn insert_wallet(&self, wallet: &Wallet) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO wallets (user_id, balance, created_at) VALUES (?, ?, ?)",
        )
        .bind(&wallet.user_id)
        .bind(wallet.balance)
        .bind(format_timestamp(wallet.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save wallet")?;

        Ok(result.rows_affected() == 1)
    }

    /// Get a wallet together with its ordered transaction history.
    pub async fn get_wallet(&self, user_id: &str) -> Result<Option<Wallet>> {
        let row = sqlx::query("SELECT user_id, balance, created_at FROM wallets WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch wallet")?;

        match row {
            Some(row) => {
                let mut wallet = Self::row_to_wallet(&row)?;
                wallet.transactions = self.wallet_history_ids(user_id).await?;
                Ok(Some(wallet))
            }
            None => Ok(None),
        }
    }

    /// List all wallets ordered by user id.
    pub async fn list_wallets(&self) -> Result<Vec<Wallet>> {
        let rows =
            sqlx::query("SELECT user_id, balance, created_at FROM wallets ORDER BY user_id")
                .fetch_all(&self.pool)
                .await
                .context("Failed to list wallets")?;

        let mut wallets = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut wallet = Self::row_to_wallet(row)?;
            wallet.transactions = self.wallet_history_ids(&wallet.user_id).await?;
            wallets.push(wallet);
        }
        Ok(wallets)
    }

    /// Current balance, or None when the user has no wallet.
    pub async fn wallet_balance(&self, user_id: &str) -> Result<Option<Units>> {
        let row = sqlx::query("SELECT balance FROM wallets WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch wallet balance")?;

        Ok(row.map(|r| r.get("balance")))
    }

    /// (wallet count, sum of all balances). The sum saturates at `Units::MAX`
    /// since SQLite's SUM errors on integer overflow.
    pub async fn wallet_totals(&self) -> Result<(i64, Units)> {
        let rows = sqlx::query("SELECT balance FROM wallets")
            .fetch_all(&self.pool)
            .await
            .context("Failed to compute wallet totals")?;

        let total = rows
            .iter()
            .fold(0, |total: Units, row| total.saturating_add(row.get("balance")));
        Ok((rows.len() as i64, total))
    }

    async fn wallet_history_ids(&self, user_id: &str) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT transaction_id FROM wallet_transactions WHERE user_id = ? ORDER BY position",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch wallet history")?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("transaction_id");
                Uuid::parse_str(&id).context("Invalid transaction ID")
            })
            .collect()
    }

    fn row_to_wallet(row: &SqliteRow) -> Result<Wallet> {
        let created_at: String = row.get("created_at");
        Ok(Wallet {
            user_id: row.get("user_id"),
            balance: row.get("balance"),
            transactions: Vec::new(),
            created_at: parse_timestamp(&created_at, "created_at")?,
        })
    }

    // ========================
    // Transaction log
    // ========================

    /// Apply a transaction's balance effects and append it to the global log
    /// and to each participant's history, all in one database transaction.
    /// Assigns the next sequence number on success.
    pub async fn post_transaction(&self, tx: &mut Transaction) -> Result<PostingOutcome> {
        let mut db = self.pool.begin().await.context("Failed to begin transaction")?;

        let outcome = Self::post_in(&mut db, tx).await?;
        if outcome == PostingOutcome::Posted {
            db.commit().await.context("Failed to commit transaction")?;
        }
        Ok(outcome)
    }

    /// Posting body shared with auction settlement. Writes nothing unless it
    /// returns `Posted`; the caller commits.
    pub(super) async fn post_in(
        db: &mut DbTransaction<'_, Sqlite>,
        tx: &mut Transaction,
    ) -> Result<PostingOutcome> {
        let mut balances = Vec::with_capacity(2);
        for user in [&tx.from_user, &tx.to_user].into_iter().flatten() {
            match Self::balance_in(db, user).await? {
                Some(balance) => balances.push(balance),
                None => return Ok(PostingOutcome::UnknownUser(user.clone())),
            }
        }

        // A self-transfer nets to zero, so only a distinct receiver can overflow.
        if let Some(to) = tx.to_user.as_ref().filter(|to| tx.from_user.as_ref() != Some(*to)) {
            let balance = balances.last().copied().unwrap_or(0);
            if balance.checked_add(tx.amount).is_none() {
                return Ok(PostingOutcome::BalanceOverflow {
                    user_id: to.clone(),
                    balance,
                });
            }
        }

        if let Some(from) = &tx.from_user {
            let debited = sqlx::query(
                "UPDATE wallets SET balance = balance - ? WHERE user_id = ? AND balance >= ?",
            )
            .bind(tx.amount)
            .bind(from)
            .bind(tx.amount)
            .execute(&mut **db)
            .await
            .context("Failed to debit wallet")?;

            if debited.rows_affected() == 0 {
                let balance = Self::balance_in(db, from).await?.unwrap_or(0);
                return Ok(PostingOutcome::InsufficientBalance {
                    user_id: from.clone(),
                    balance,
                });
            }
        }

        if let Some(to) = &tx.to_user {
            sqlx::query("UPDATE wallets SET balance = balance + ? WHERE user_id = ?")
                .bind(tx.amount)
                .bind(to)
                .execute(&mut **db)
                .await
                .context("Failed to credit wallet")?;
        }

        let sequence: i64 = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transaction_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut **db)
        .await
        .context("Failed to get next sequence number")?
        .get("value");

        sqlx::query(
            r#"
            INSERT INTO transactions (id, sequence, kind, amount, from_user, to_user, external_ref, value_cents, payout_contact, status, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tx.id.to_string())
        .bind(sequence)
        .bind(tx.kind.as_str())
        .bind(tx.amount)
        .bind(&tx.from_user)
        .bind(&tx.to_user)
        .bind(&tx.external_ref)
        .bind(tx.value_cents)
        .bind(&tx.payout_contact)
        .bind(tx.status.as_str())
        .bind(format_timestamp(tx.timestamp))
        .execute(&mut **db)
        .await
        .context("Failed to save transaction")?;

        let mut participants: Vec<&UserId> = [&tx.from_user, &tx.to_user].into_iter().flatten().collect();
        participants.dedup();
        for user in participants {
            sqlx::query("INSERT INTO wallet_transactions (user_id, transaction_id) VALUES (?, ?)")
                .bind(user)
                .bind(tx.id.to_string())
                .execute(&mut **db)
                .await
                .context("Failed to append wallet history")?;
        }

        tx.sequence = sequence;
        Ok(PostingOutcome::Posted)
    }

    async fn balance_in(db: &mut DbTransaction<'_, Sqlite>, user_id: &str) -> Result<Option<Units>> {
        let row = sqlx::query("SELECT balance FROM wallets WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut **db)
            .await
            .context("Failed to fetch wallet balance")?;
        Ok(row.map(|r| r.get("balance")))
    }

    /// The global transaction log, ordered by sequence.
    pub async fn list_transactions(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions t ORDER BY t.sequence",
            TRANSACTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// One wallet's history, in the order it was appended.
    pub async fn list_transactions_for_user(&self, user_id: &str) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM wallet_transactions w
            JOIN transactions t ON t.id = w.transaction_id
            WHERE w.user_id = ?
            ORDER BY w.position
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions for wallet")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions t WHERE t.id = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch transaction")?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    pub async fn transaction_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM transactions")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count transactions")?;
        Ok(row.get("count"))
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let id: String = row.get("id");
        let kind: String = row.get("kind");
        let status: String = row.get("status");
        let timestamp: String = row.get("timestamp");

        Ok(Transaction {
            id: Uuid::parse_str(&id).context("Invalid transaction ID")?,
            sequence: row.get("sequence"),
            kind: TransactionKind::from_str(&kind)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction kind: {}", kind))?,
            amount: row.get("amount"),
            from_user: row.get("from_user"),
            to_user: row.get("to_user"),
            external_ref: row.get("external_ref"),
            value_cents: row.get("value_cents"),
            payout_contact: row.get("payout_contact"),
            status: TransactionStatus::from_str(&status)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction status: {}", status))?,
            timestamp: parse_timestamp(&timestamp, "timestamp")?,
        })
    }
}
