use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Transaction, Units, UserId, Wallet};

/// Derived balances for every user that appears in the log.
/// Balance = sum of credits - sum of debits
pub fn compute_all_balances(transactions: &[Transaction]) -> HashMap<UserId, Units> {
    let mut balances: HashMap<UserId, Units> = HashMap::new();

    for tx in transactions {
        let mut participants: Vec<&UserId> =
            [&tx.from_user, &tx.to_user].into_iter().flatten().collect();
        participants.dedup();
        for user in participants {
            *balances.entry(user.clone()).or_insert(0) += tx.delta_for(user);
        }
    }

    balances
}

/// True when the sequence numbers are exactly 1..=n in order.
pub fn has_sequence_gaps(transactions: &[Transaction]) -> bool {
    transactions
        .iter()
        .enumerate()
        .any(|(i, tx)| tx.sequence != i as i64 + 1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceMismatch {
    pub user_id: UserId,
    pub stored: Units,
    pub derived: Units,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub wallet_count: usize,
    pub transaction_count: usize,
    pub total_circulating: Units,
    pub pending_sells: usize,
    pub mismatches: Vec<BalanceMismatch>,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Cross-check stored wallet state against the global transaction log.
pub fn build_integrity_report(wallets: &[Wallet], transactions: &[Transaction]) -> IntegrityReport {
    let derived = compute_all_balances(transactions);
    let mut report = IntegrityReport {
        wallet_count: wallets.len(),
        transaction_count: transactions.len(),
        total_circulating: wallets
            .iter()
            .fold(0, |total: Units, w| total.saturating_add(w.balance)),
        pending_sells: transactions.iter().filter(|tx| tx.is_pending()).count(),
        ..Default::default()
    };

    for wallet in wallets {
        let expected = derived.get(&wallet.user_id).copied().unwrap_or(0);
        if wallet.balance != expected {
            report.issues.push(format!(
                "Wallet '{}' balance {} does not match its transactions ({})",
                wallet.user_id, wallet.balance, expected
            ));
            report.mismatches.push(BalanceMismatch {
                user_id: wallet.user_id.clone(),
                stored: wallet.balance,
                derived: expected,
            });
        }
        if wallet.balance < 0 {
            report.issues.push(format!(
                "Wallet '{}' has a negative balance ({})",
                wallet.user_id, wallet.balance
            ));
        }

        let history = transactions
            .iter()
            .filter(|tx| tx.involves(&wallet.user_id))
            .count();
        if history != wallet.transaction_count() {
            report.issues.push(format!(
                "Wallet '{}' lists {} transactions but the log has {}",
                wallet.user_id,
                wallet.transaction_count(),
                history
            ));
        }
    }

    let orphans = derived
        .keys()
        .filter(|user| !wallets.iter().any(|w| &w.user_id == *user))
        .count();
    if orphans > 0 {
        report
            .issues
            .push(format!("{} transaction participant(s) have no wallet", orphans));
    }

    if has_sequence_gaps(transactions) {
        report
            .issues
            .push("Transaction sequence has gaps or is out of order".to_string());
    }

    report
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn sequenced(mut txs: Vec<Transaction>) -> Vec<Transaction> {
        for (i, tx) in txs.iter_mut().enumerate() {
            tx.sequence = i as i64 + 1;
        }
        txs
    }

    fn wallet(user: &str, balance: Units, txs: &[Transaction]) -> Wallet {
        let mut w = Wallet::new(user, Utc::now());
        w.balance = balance;
        w.transactions = txs.iter().filter(|t| t.involves(user)).map(|t| t.id).collect();
        w
    }

    #[test]
    fn test_compute_balances_empty() {
        assert!(compute_all_balances(&[]).is_empty());
    }

    #[test]
    fn test_compute_balances_mixed() {
        let now = Utc::now();
        let txs = vec![
            Transaction::purchase("alice", 50, "TX1", 5000, now),
            Transaction::transfer("alice", "bob", 20, now),
            Transaction::sell("alice", 5, 500, "payouts", now),
        ];

        let balances = compute_all_balances(&txs);
        assert_eq!(balances["alice"], 25);
        assert_eq!(balances["bob"], 20);
    }

    #[test]
    fn test_transfers_preserve_total() {
        let now = Utc::now();
        let txs = vec![
            Transaction::purchase("a", 100, "P1", 10000, now),
            Transaction::transfer("a", "b", 40, now),
            Transaction::transfer("b", "c", 10, now),
            Transaction::transfer("c", "a", 5, now),
        ];

        let balances = compute_all_balances(&txs);
        let total: Units = balances.values().sum();
        assert_eq!(total, 100, "transfers never create or destroy units");
    }

    #[test]
    fn test_self_transfer_nets_to_zero() {
        let now = Utc::now();
        let txs = vec![
            Transaction::purchase("a", 30, "P1", 3000, now),
            Transaction::transfer("a", "a", 10, now),
        ];

        assert_eq!(compute_all_balances(&txs)["a"], 30);
    }

    #[test]
    fn test_healthy_report() {
        let now = Utc::now();
        let txs = sequenced(vec![
            Transaction::purchase("alice", 50, "TX1", 5000, now),
            Transaction::transfer("alice", "bob", 15, now),
        ]);
        let wallets = vec![wallet("alice", 35, &txs), wallet("bob", 15, &txs)];

        let report = build_integrity_report(&wallets, &txs);
        assert!(report.is_healthy(), "issues: {:?}", report.issues);
        assert_eq!(report.total_circulating, 50);
        assert_eq!(report.transaction_count, 2);
    }

    #[test]
    fn test_report_flags_balance_mismatch() {
        let now = Utc::now();
        let txs = sequenced(vec![Transaction::purchase("alice", 50, "TX1", 5000, now)]);
        let wallets = vec![wallet("alice", 60, &txs)];

        let report = build_integrity_report(&wallets, &txs);
        assert!(!report.is_healthy());
        assert_eq!(
            report.mismatches,
            vec![BalanceMismatch {
                user_id: "alice".into(),
                stored: 60,
                derived: 50
            }]
        );
    }

    #[test]
    fn test_report_flags_sequence_gap_and_orphans() {
        let now = Utc::now();
        let mut txs = vec![Transaction::purchase("ghost", 5, "TX9", 500, now)];
        txs[0].sequence = 3;

        let report = build_integrity_report(&[], &txs);
        assert_eq!(report.issues.len(), 2);
    }
}
