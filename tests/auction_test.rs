mod common;

use anyhow::Result;
use chrono::Duration;
use common::{start_time, test_market, test_market_with};
use rooster_market::application::{AppError, MarketConfig};
use rooster_market::domain::{Auction, AuctionStatus, Transaction, Wallet};
use rooster_market::storage::{PostingOutcome, Repository};
use uuid::Uuid;

#[tokio::test]
async fn test_create_auction() -> Result<()> {
    let t = test_market().await?;

    let auction = t.hour_auction().await?;
    assert_eq!(auction.seller_id, "alice");
    assert_eq!(auction.starting_bid, 10);
    assert_eq!(auction.current_bid, 10);
    assert_eq!(auction.highest_bidder, None);
    assert!(auction.bids.is_empty());
    assert_eq!(auction.status, AuctionStatus::Active);
    assert_eq!(auction.created_at, start_time());
    assert_eq!(auction.end_time, start_time() + Duration::hours(1));

    let stored = t.auctions().get_auction(auction.id).await?;
    assert_eq!(stored, auction);
    Ok(())
}

#[tokio::test]
async fn test_create_auction_validation() -> Result<()> {
    let t = test_market().await?;
    let hour = Duration::hours(1);

    let no_title = t.auctions().create_auction("alice", "  ", "desc", 10, hour).await;
    assert!(matches!(no_title, Err(AppError::InvalidInput(_))));

    let no_desc = t.auctions().create_auction("alice", "Rooster", "", 10, hour).await;
    assert!(matches!(no_desc, Err(AppError::InvalidInput(_))));

    let free = t.auctions().create_auction("alice", "Rooster", "desc", 0, hour).await;
    assert!(matches!(free, Err(AppError::InvalidAmount(_))));

    let instant = t
        .auctions()
        .create_auction("alice", "Rooster", "desc", 10, Duration::zero())
        .await;
    assert!(matches!(instant, Err(AppError::InvalidDuration { .. })));

    let forever = t
        .auctions()
        .create_auction("alice", "Rooster", "desc", 10, Duration::days(3651))
        .await;
    assert!(matches!(forever, Err(AppError::InvalidDuration { .. })));

    assert!(t.auctions().list_all().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_max_duration_is_inclusive_and_configurable() -> Result<()> {
    let t = test_market_with(MarketConfig::default().with_max_auction_duration(Duration::days(7)))
        .await?;

    t.auctions()
        .create_auction("alice", "Rooster", "desc", 10, Duration::days(7))
        .await?;
    let too_long = t
        .auctions()
        .create_auction("alice", "Rooster", "desc", 10, Duration::days(8))
        .await;
    assert!(matches!(
        too_long,
        Err(AppError::InvalidDuration { max_ms, .. }) if max_ms == Duration::days(7).num_milliseconds()
    ));
    Ok(())
}

#[tokio::test]
async fn test_bid_scenario() -> Result<()> {
    let t = test_market().await?;
    t.funded_user("alice", 0).await?;
    t.funded_user("bob", 20).await?;
    let auction = t.hour_auction().await?;

    let receipt = t.auctions().place_bid(auction.id, "bob", 15).await?;
    assert_eq!(receipt.bid.bidder_id, "bob");
    assert_eq!(receipt.bid.amount, 15);
    assert_eq!(receipt.auction.current_bid, 15);
    assert_eq!(receipt.auction.highest_bidder.as_deref(), Some("bob"));
    assert_eq!(receipt.auction.bids.len(), 1);

    let low = t.auctions().place_bid(auction.id, "bob", 12).await;
    assert!(matches!(
        low,
        Err(AppError::BidTooLow {
            current_bid: 15,
            offered: 12
        })
    ));

    // Equal is not enough either.
    let equal = t.auctions().place_bid(auction.id, "bob", 15).await;
    assert!(matches!(equal, Err(AppError::BidTooLow { .. })));

    let after = t.auctions().get_auction(auction.id).await?;
    assert_eq!(after.current_bid, 15);
    assert_eq!(after.bids.len(), 1);

    // Nothing is held while bidding.
    assert_eq!(t.ledger().get_wallet("bob").await?.balance, 20);
    Ok(())
}

#[tokio::test]
async fn test_bid_must_beat_starting_bid() -> Result<()> {
    let t = test_market().await?;
    t.funded_user("bob", 50).await?;
    let auction = t.hour_auction().await?;

    let result = t.auctions().place_bid(auction.id, "bob", 10).await;
    assert!(matches!(result, Err(AppError::BidTooLow { current_bid: 10, .. })));
    Ok(())
}

#[tokio::test]
async fn test_seller_cannot_bid() -> Result<()> {
    let t = test_market().await?;
    t.funded_user("alice", 100).await?;
    let auction = t.hour_auction().await?;

    let result = t.auctions().place_bid(auction.id, "alice", 50).await;
    assert!(matches!(result, Err(AppError::SelfBid)));
    Ok(())
}

#[tokio::test]
async fn test_bid_requires_funds() -> Result<()> {
    let t = test_market().await?;
    t.funded_user("bob", 12).await?;
    let auction = t.hour_auction().await?;

    let broke = t.auctions().place_bid(auction.id, "bob", 13).await;
    assert!(matches!(
        broke,
        Err(AppError::InsufficientFunds { ref user_id, required: 13 }) if user_id == "bob"
    ));

    // A user without a wallet has no funds.
    let stranger = t.auctions().place_bid(auction.id, "carol", 11).await;
    assert!(matches!(stranger, Err(AppError::InsufficientFunds { .. })));

    assert!(t.auctions().get_auction(auction.id).await?.bids.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_bid_on_unknown_auction() -> Result<()> {
    let t = test_market().await?;
    let missing = Uuid::new_v4();

    let result = t.auctions().place_bid(missing, "bob", 10).await;
    assert!(matches!(result, Err(AppError::UnknownAuction(id)) if id == missing));

    let lookup = t.auctions().get_auction(missing).await;
    assert!(matches!(lookup, Err(AppError::UnknownAuction(_))));
    Ok(())
}

#[tokio::test]
async fn test_expired_auction_closes_on_bid() -> Result<()> {
    let t = test_market().await?;
    t.funded_user("alice", 0).await?;
    t.funded_user("bob", 20).await?;
    t.funded_user("carol", 50).await?;
    let auction = t.hour_auction().await?;
    t.auctions().place_bid(auction.id, "bob", 15).await?;

    // Deadline is inclusive.
    t.advance(Duration::hours(1));

    let late = t.auctions().place_bid(auction.id, "carol", 30).await;
    assert!(matches!(late, Err(AppError::AuctionEnded(id)) if id == auction.id));

    let closed = t.auctions().get_auction(auction.id).await?;
    assert_eq!(closed.status, AuctionStatus::Completed);
    assert_eq!(closed.current_bid, 15);
    assert_eq!(closed.winner_paid, Some(true));
    assert_eq!(t.ledger().get_wallet("bob").await?.balance, 5);
    assert_eq!(t.ledger().get_wallet("alice").await?.balance, 15);
    assert_eq!(t.ledger().get_wallet("carol").await?.balance, 50);
    Ok(())
}

#[tokio::test]
async fn test_close_settles_through_ledger() -> Result<()> {
    let t = test_market().await?;
    t.funded_user("alice", 0).await?;
    t.funded_user("bob", 20).await?;
    let auction = t.hour_auction().await?;
    t.auctions().place_bid(auction.id, "bob", 15).await?;

    let closed = t.auctions().close_auction(auction.id).await?;
    assert_eq!(closed.status, AuctionStatus::Completed);
    assert_eq!(closed.winner_paid, Some(true));
    assert_eq!(closed.payment_error, None);

    assert_eq!(t.ledger().get_wallet("bob").await?.balance, 5);
    assert_eq!(t.ledger().get_wallet("alice").await?.balance, 15);

    let log = t.ledger().list_transactions(None).await?;
    let settlement = log.last().unwrap();
    assert_eq!(settlement.from_user.as_deref(), Some("bob"));
    assert_eq!(settlement.to_user.as_deref(), Some("alice"));
    assert_eq!(settlement.amount, 15);
    Ok(())
}

#[tokio::test]
async fn test_close_is_idempotent() -> Result<()> {
    let t = test_market().await?;
    t.funded_user("alice", 0).await?;
    t.funded_user("bob", 20).await?;
    let auction = t.hour_auction().await?;
    t.auctions().place_bid(auction.id, "bob", 15).await?;

    let first = t.auctions().close_auction(auction.id).await?;
    let second = t.auctions().close_auction(auction.id).await?;
    assert_eq!(first, second);

    // Paid exactly once.
    assert_eq!(t.ledger().get_wallet("alice").await?.balance, 15);
    assert_eq!(t.ledger().transaction_count().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_close_without_bids() -> Result<()> {
    let t = test_market().await?;
    let auction = t.hour_auction().await?;

    let closed = t.auctions().close_auction(auction.id).await?;
    assert_eq!(closed.status, AuctionStatus::Completed);
    assert_eq!(closed.highest_bidder, None);
    assert_eq!(closed.winner_paid, None);
    assert_eq!(t.ledger().transaction_count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_settlement_is_recorded() -> Result<()> {
    let t = test_market().await?;
    t.funded_user("alice", 0).await?;
    t.funded_user("bob", 20).await?;
    t.funded_user("carol", 0).await?;
    let auction = t.hour_auction().await?;
    t.auctions().place_bid(auction.id, "bob", 15).await?;

    // Bob spends the money before the auction ends.
    t.ledger().transfer("bob", "carol", 10).await?;
    t.advance(Duration::hours(2));

    let closed = t.auctions().get_auction(auction.id).await?;
    assert_eq!(closed.status, AuctionStatus::Completed);
    assert_eq!(closed.winner_paid, Some(false));
    assert!(closed.payment_error.is_some());

    assert_eq!(t.ledger().get_wallet("bob").await?.balance, 10);
    assert_eq!(t.ledger().get_wallet("alice").await?.balance, 0);
    Ok(())
}

#[tokio::test]
async fn test_cancel_auction() -> Result<()> {
    let t = test_market().await?;
    let auction = t.hour_auction().await?;

    let not_seller = t.auctions().cancel_auction(auction.id, "bob").await;
    assert!(matches!(not_seller, Err(AppError::NotSeller(_))));

    let cancelled = t.auctions().cancel_auction(auction.id, "alice").await?;
    assert_eq!(cancelled.status, AuctionStatus::Cancelled);

    let again = t.auctions().cancel_auction(auction.id, "alice").await;
    assert!(matches!(again, Err(AppError::AuctionEnded(_))));

    t.funded_user("bob", 50).await?;
    let bid = t.auctions().place_bid(auction.id, "bob", 20).await;
    assert!(matches!(bid, Err(AppError::AuctionEnded(_))));
    Ok(())
}

#[tokio::test]
async fn test_cannot_cancel_with_bids() -> Result<()> {
    let t = test_market().await?;
    t.funded_user("bob", 20).await?;
    let auction = t.hour_auction().await?;
    t.auctions().place_bid(auction.id, "bob", 15).await?;

    let result = t.auctions().cancel_auction(auction.id, "alice").await;
    assert!(matches!(result, Err(AppError::HasBids(id)) if id == auction.id));

    let still = t.auctions().get_auction(auction.id).await?;
    assert_eq!(still.status, AuctionStatus::Active);
    Ok(())
}

#[tokio::test]
async fn test_cancel_after_deadline_closes_instead() -> Result<()> {
    let t = test_market().await?;
    let auction = t.hour_auction().await?;
    t.advance(Duration::hours(3));

    let result = t.auctions().cancel_auction(auction.id, "alice").await;
    assert!(matches!(result, Err(AppError::AuctionEnded(_))));
    assert_eq!(
        t.auctions().get_auction(auction.id).await?.status,
        AuctionStatus::Completed
    );
    Ok(())
}

#[tokio::test]
async fn test_active_auctions_newest_first() -> Result<()> {
    let t = test_market().await?;
    let short = t
        .auctions()
        .create_auction("alice", "Egg", "Speckled", 1, Duration::minutes(30))
        .await?;
    t.advance(Duration::minutes(1));
    let middle = t
        .auctions()
        .create_auction("bob", "Feather", "Long", 2, Duration::days(1))
        .await?;
    t.advance(Duration::minutes(1));
    let newest = t
        .auctions()
        .create_auction("carol", "Coop", "Sturdy", 3, Duration::days(1))
        .await?;

    let ids: Vec<Uuid> = t
        .auctions()
        .get_active_auctions()
        .await?
        .iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids, vec![newest.id, middle.id, short.id]);

    // The short one expires and drops out.
    t.advance(Duration::minutes(30));
    let ids: Vec<Uuid> = t
        .auctions()
        .get_active_auctions()
        .await?
        .iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids, vec![newest.id, middle.id]);
    assert_eq!(
        t.auctions().get_auction(short.id).await?.status,
        AuctionStatus::Completed
    );
    Ok(())
}

#[tokio::test]
async fn test_sweep_expired() -> Result<()> {
    let t = test_market().await?;
    let first = t.hour_auction().await?;
    let second = t.hour_auction().await?;
    let lasting = t
        .auctions()
        .create_auction("alice", "Coop", "Sturdy", 3, Duration::days(2))
        .await?;

    assert!(t.auctions().sweep_expired().await?.is_empty());

    t.advance(Duration::hours(1) + Duration::seconds(1));
    let mut closed: Vec<Uuid> = t
        .auctions()
        .sweep_expired()
        .await?
        .iter()
        .map(|a| a.id)
        .collect();
    closed.sort();
    let mut expected = vec![first.id, second.id];
    expected.sort();
    assert_eq!(closed, expected);

    assert!(t.auctions().sweep_expired().await?.is_empty());
    assert_eq!(
        t.auctions().get_auction(lasting.id).await?.status,
        AuctionStatus::Active
    );
    Ok(())
}

#[tokio::test]
async fn test_user_auctions_in_creation_order() -> Result<()> {
    let t = test_market().await?;
    let first = t.hour_auction().await?;
    t.auctions()
        .create_auction("bob", "Feather", "Long", 2, Duration::days(1))
        .await?;
    let second = t
        .auctions()
        .create_auction("alice", "Coop", "Sturdy", 3, Duration::days(1))
        .await?;

    let mine = t.auctions().get_user_auctions("alice").await?;
    let ids: Vec<Uuid> = mine.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
    assert!(t.auctions().get_user_auctions("nobody").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_statistics() -> Result<()> {
    let t = test_market().await?;
    t.funded_user("alice", 0).await?;
    t.funded_user("bob", 100).await?;

    let sold = t.hour_auction().await?;
    t.auctions().place_bid(sold.id, "bob", 15).await?;
    t.auctions().place_bid(sold.id, "bob", 25).await?;
    t.auctions().close_auction(sold.id).await?;

    let withdrawn = t.hour_auction().await?;
    t.auctions().cancel_auction(withdrawn.id, "alice").await?;

    t.hour_auction().await?;

    let stats = t.auctions().get_statistics().await?;
    assert_eq!(stats.total, 3);
    assert_eq!(stats.active, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.total_bids, 2);
    assert_eq!(stats.total_value, 25);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_bids_keep_highest() -> Result<()> {
    let t = test_market().await?;
    for user in ["b1", "b2", "b3", "b4"] {
        t.funded_user(user, 100).await?;
    }
    let auction = t.hour_auction().await?;

    let mut handles = Vec::new();
    for (user, amount) in [("b1", 20), ("b2", 40), ("b3", 30), ("b4", 50)] {
        let auctions = t.auctions().clone();
        let id = auction.id;
        handles.push(tokio::spawn(async move {
            auctions.place_bid(id, user, amount).await
        }));
    }
    for handle in handles {
        let _ = handle.await?;
    }

    let auction = t.auctions().get_auction(auction.id).await?;
    assert_eq!(auction.current_bid, 50);
    assert_eq!(auction.highest_bidder.as_deref(), Some("b4"));
    // Accepted bids are strictly increasing.
    assert!(auction.bids.windows(2).all(|w| w[0].amount < w[1].amount));
    Ok(())
}

#[tokio::test]
async fn test_settlement_payment_and_paid_flag_commit_together() -> Result<()> {
    let repo = Repository::in_memory().await?;
    repo.insert_wallet(&Wallet::new("alice", start_time())).await?;
    let mut bob = Wallet::new("bob", start_time());
    bob.balance = 5;
    repo.insert_wallet(&bob).await?;
    let auction = Auction::new(
        "alice",
        "Golden Rooster",
        "Brass",
        10,
        Duration::hours(1),
        start_time(),
    );
    repo.insert_auction(&auction).await?;

    let mut too_much = Transaction::transfer("bob", "alice", 15, start_time());
    let outcome = repo.post_settlement(auction.id, &mut too_much).await?;
    assert_eq!(
        outcome,
        PostingOutcome::InsufficientBalance {
            user_id: "bob".to_string(),
            balance: 5
        }
    );
    assert_eq!(repo.get_auction(auction.id).await?.unwrap().winner_paid, None);
    assert_eq!(repo.transaction_count().await?, 0);
    assert_eq!(repo.wallet_balance("alice").await?, Some(0));

    let mut payment = Transaction::transfer("bob", "alice", 5, start_time());
    let outcome = repo.post_settlement(auction.id, &mut payment).await?;
    assert_eq!(outcome, PostingOutcome::Posted);
    assert_eq!(payment.sequence, 1);
    assert_eq!(
        repo.get_auction(auction.id).await?.unwrap().winner_paid,
        Some(true)
    );
    assert_eq!(repo.wallet_balance("alice").await?, Some(5));
    assert_eq!(repo.wallet_balance("bob").await?, Some(0));
    Ok(())
}
