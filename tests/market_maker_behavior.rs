//! Behavior-driven tests for the market maker
//!
//! Ticks are driven directly with a seeded random walk; the async loop is
//! exercised once end to end with a short interval.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use grub_core::{
    AccountId, CollaboratorError, MarketMaker, MarketMakerConfig, SentimentSource,
    StaticSentiment, UtcDateTime,
};
use grub_ledger::{AccountRecord, Ledger, NewAccount, MARKET_USERNAME};
use tokio::sync::watch;

fn open(ledger: &Ledger, ticker: &str, price: f64) -> AccountRecord {
    ledger
        .open_account(
            &NewAccount {
                username: ticker.to_lowercase(),
                ticker: ticker.to_string(),
                initial_price: price,
                shares_outstanding: 1_000,
                initial_balance: 100.0,
            },
            0,
        )
        .expect("open account")
}

fn price(ledger: &Ledger, id: AccountId) -> f64 {
    ledger
        .account_by_id(id)
        .expect("read")
        .expect("account")
        .current_price
}

fn point_count(ledger: &Ledger, id: AccountId) -> i64 {
    ledger
        .read(|tx| tx.price_point_count(id))
        .expect("count")
}

/// Config with no randomness in the direction of the walk.
fn directional(buy_probability: f64) -> MarketMakerConfig {
    MarketMakerConfig {
        buy_probability,
        sentiment_step: 0.02,
        min_buy_probability: 0.0,
        max_buy_probability: 1.0,
        reversion_probability: 0.0,
        startup_delay: Duration::ZERO,
        ..MarketMakerConfig::default()
    }
}

struct FailingSentiment;

impl SentimentSource for FailingSentiment {
    fn net_sentiment(&self) -> Result<HashMap<AccountId, i64>, CollaboratorError> {
        Err(CollaboratorError::new("sentiment", "feed unreachable"))
    }
}

// =============================================================================
// Ticks
// =============================================================================

#[test]
fn when_market_maker_ticks_then_the_system_account_is_never_drifted() {
    // Given: two traders and the seeded MARKET account
    let ledger = Ledger::open_in_memory().expect("ledger");
    open(&ledger, "ALICE", 10.0);
    open(&ledger, "BOB", 10.0);
    let market = ledger
        .account_by_username(MARKET_USERNAME)
        .expect("read")
        .expect("seeded");
    let maker = MarketMaker::new(ledger.clone()).with_seed(42);

    // When
    let report = maker.tick_at(UtcDateTime::now()).expect("tick");

    // Then
    assert_eq!(report.examined, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(price(&ledger, market.id), 0.0);
    assert_eq!(point_count(&ledger, market.id), 0);
}

#[test]
fn when_prices_move_then_each_move_leaves_exactly_one_price_point() {
    let ledger = Ledger::open_in_memory().expect("ledger");
    let alice = open(&ledger, "ALICE", 10.0);
    let bob = open(&ledger, "BOB", 250.0);
    let maker = MarketMaker::new(ledger.clone()).with_seed(7);

    let mut moved = 0;
    for _ in 0..25 {
        moved += maker.tick_at(UtcDateTime::now()).expect("tick").moved;
    }

    let points = point_count(&ledger, alice.id) + point_count(&ledger, bob.id);
    assert_eq!(points, moved as i64);
}

#[test]
fn when_many_ticks_run_then_prices_stay_in_bounds() {
    let ledger = Ledger::open_in_memory().expect("ledger");
    let low = open(&ledger, "LOW", 1.0);
    let high = open(&ledger, "HIGH", 1000.0);
    let maker = MarketMaker::new(ledger.clone()).with_seed(99);

    for _ in 0..100 {
        maker.tick_at(UtcDateTime::now()).expect("tick");
        for id in [low.id, high.id] {
            let current = price(&ledger, id);
            assert!((1.0..=1000.0).contains(&current), "price {current}");
        }
    }
}

#[test]
fn when_sentiment_is_lopsided_then_drift_follows_it() {
    // Given: a neutral coin with sentiment deciding every direction
    let ledger = Ledger::open_in_memory().expect("ledger");
    let liked = open(&ledger, "LIKED", 10.0);
    let disliked = open(&ledger, "DISLIKED", 10.0);
    let sentiment = StaticSentiment::default()
        .with_score(liked.id, 100)
        .with_score(disliked.id, -100);
    let maker = MarketMaker::new(ledger.clone())
        .with_config(directional(0.5))
        .with_sentiment(Arc::new(sentiment))
        .with_seed(5);

    // When / Then: every tick moves the liked stock up and the other down
    for _ in 0..20 {
        let liked_before = price(&ledger, liked.id);
        let disliked_before = price(&ledger, disliked.id);

        maker.tick_at(UtcDateTime::now()).expect("tick");

        assert!(price(&ledger, liked.id) > liked_before);
        assert!(price(&ledger, disliked.id) < disliked_before);
    }
}

#[test]
fn when_sentiment_source_fails_then_tick_proceeds_without_it() {
    let ledger = Ledger::open_in_memory().expect("ledger");
    let alice = open(&ledger, "ALICE", 10.0);
    let maker = MarketMaker::new(ledger.clone())
        .with_config(directional(1.0))
        .with_sentiment(Arc::new(FailingSentiment));

    let report = maker.tick_at(UtcDateTime::now()).expect("tick");

    assert_eq!(report.examined, 1);
    assert_eq!(report.moved, 1);
    assert!(price(&ledger, alice.id) > 10.0);
}

// =============================================================================
// Portfolio snapshots
// =============================================================================

#[test]
fn when_tick_completes_then_every_trader_gets_a_portfolio_snapshot() {
    // Given: ALICE holds 4 BOB
    let ledger = Ledger::open_in_memory().expect("ledger");
    let alice = open(&ledger, "ALICE", 10.0);
    let bob = open(&ledger, "BOB", 10.0);
    grub_core::TradingEngine::new(ledger.clone())
        .execute_buy(alice.id, "BOB", 4.0, 0.0)
        .expect("buy");
    let now = UtcDateTime::now();

    // When: a tick that cannot move prices
    let maker = MarketMaker::new(ledger.clone()).with_config(MarketMakerConfig {
        min_change: 0.0,
        change_spread: 0.0,
        ..MarketMakerConfig::default()
    });
    let report = maker.tick_at(now).expect("tick");

    // Then: the snapshot marks ALICE's cash plus holdings to market
    assert_eq!(report.moved, 0);
    assert_eq!(report.snapshots, 2);
    assert_eq!(report.snapshot_failures, 0);

    let snapshots = ledger
        .read(|tx| tx.portfolio_snapshots_since(alice.id, 0))
        .expect("snapshots");
    assert_eq!(snapshots.len(), 1);
    let cash = ledger.balance(alice.id).expect("read").expect("row").grub;
    let expected = cash + 4.0 * price(&ledger, bob.id);
    assert!((snapshots[0].cash - cash).abs() < 1e-9);
    assert!((snapshots[0].total_value - expected).abs() < 0.006);
    assert_eq!(snapshots[0].recorded_at_ms, now.unix_millis());
}

#[test]
fn when_snapshots_are_taken_directly_then_the_system_account_is_skipped() {
    let ledger = Ledger::open_in_memory().expect("ledger");
    open(&ledger, "ALICE", 10.0);

    let recorded = MarketMaker::new(ledger)
        .snapshot_portfolios(UtcDateTime::now())
        .expect("snapshots");

    assert_eq!(recorded, 1);
}

// =============================================================================
// Background loop
// =============================================================================

#[tokio::test]
async fn when_shutdown_is_signalled_then_the_loop_stops_after_ticking() {
    // Given: a maker with no start-up delay and a fast interval
    let ledger = Ledger::open_in_memory().expect("ledger");
    let alice = open(&ledger, "ALICE", 10.0);
    let maker = MarketMaker::new(ledger.clone()).with_config(MarketMakerConfig {
        interval: Duration::from_millis(50),
        ..directional(1.0)
    });
    let (stop, shutdown) = watch::channel(false);

    // When
    let handle = tokio::spawn(maker.run_until(shutdown));
    tokio::time::sleep(Duration::from_millis(400)).await;
    stop.send(true).expect("maker listening");
    handle.await.expect("maker exits cleanly");

    // Then: at least one tick drifted the price and snapshotted the portfolio
    assert!(price(&ledger, alice.id) > 10.0);
    let snapshots = ledger
        .read(|tx| tx.portfolio_snapshots_since(alice.id, 0))
        .expect("snapshots");
    assert!(!snapshots.is_empty());
}

#[tokio::test]
async fn when_shutdown_arrives_during_startup_delay_then_no_tick_runs() {
    let ledger = Ledger::open_in_memory().expect("ledger");
    let alice = open(&ledger, "ALICE", 10.0);
    let maker = MarketMaker::new(ledger.clone()).with_config(MarketMakerConfig {
        interval: Duration::from_millis(10),
        startup_delay: Duration::from_secs(60),
        ..directional(1.0)
    });
    let (stop, shutdown) = watch::channel(false);

    let handle = tokio::spawn(maker.run_until(shutdown));
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.send(true).expect("maker listening");
    handle.await.expect("maker exits cleanly");

    assert_eq!(price(&ledger, alice.id), 10.0);
    assert_eq!(point_count(&ledger, alice.id), 0);
}

#[tokio::test]
async fn when_configured_interval_is_zero_then_the_loop_returns_without_ticking() {
    let ledger = Ledger::open_in_memory().expect("ledger");
    let alice = open(&ledger, "ALICE", 10.0);
    let maker = MarketMaker::new(ledger.clone()).with_config(MarketMakerConfig {
        interval: Duration::ZERO,
        ..directional(1.0)
    });
    let (_stop, shutdown) = watch::channel(false);

    tokio::time::timeout(Duration::from_secs(1), maker.run_until(shutdown))
        .await
        .expect("returns immediately");

    assert_eq!(point_count(&ledger, alice.id), 0);
}
