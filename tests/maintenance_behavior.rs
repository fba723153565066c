//! Behavior-driven tests for the periodic maintenance jobs
//!
//! Decay, dividends and market snapshots run against an in-memory ledger with
//! an explicit clock so inactivity windows are deterministic.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use grub_core::{
    CollaboratorError, Maintenance, Notification, Notifier, Side, TradingEngine, UtcDateTime,
};
use grub_ledger::{AccountRecord, HoldingRecord, Ledger, NewAccount, TransactionRecord};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

fn open(ledger: &Ledger, ticker: &str, price: f64, balance: f64) -> AccountRecord {
    ledger
        .open_account(
            &NewAccount {
                username: ticker.to_lowercase(),
                ticker: ticker.to_string(),
                initial_price: price,
                shares_outstanding: 1_000,
                initial_balance: balance,
            },
            0,
        )
        .expect("open account")
}

fn price(ledger: &Ledger, id: i64) -> f64 {
    ledger
        .account_by_id(id)
        .expect("read")
        .expect("account")
        .current_price
}

fn cash(ledger: &Ledger, id: i64) -> f64 {
    ledger
        .balance(id)
        .expect("read")
        .expect("balance row")
        .grub
}

fn give_holding(ledger: &Ledger, owner: i64, stock: i64, quantity: f64) {
    ledger
        .transact(|tx| {
            tx.put_holding(
                &HoldingRecord {
                    owner_id: owner,
                    stock_id: stock,
                    quantity,
                    avg_price: 10.0,
                },
                0,
            )
        })
        .expect("holding");
}

// =============================================================================
// Decay
// =============================================================================

#[test]
fn when_stock_is_idle_for_a_day_then_decay_pulls_it_toward_baseline() {
    // Given: an untraded stock at 12.00
    let ledger = Ledger::open_in_memory().expect("ledger");
    let idle = open(&ledger, "IDLE", 12.0, 0.0);
    let maintenance = Maintenance::new(ledger.clone());
    let now = UtcDateTime::now();

    // When: decay runs once
    let report = maintenance.run_daily_decay_at(now).expect("decay");

    // Then: the price moves 0.5% toward 10.00 and a price point is recorded
    assert_eq!(report.candidates, 1);
    assert_eq!(report.decayed, 1);
    assert_close(price(&ledger, idle.id), 11.94);
    let points = ledger
        .read(|tx| tx.price_history_since(idle.id, 0))
        .expect("history");
    assert_eq!(points.len(), 1);
    assert_close(points[0].price, 11.94);
    assert_eq!(points[0].recorded_at_ms, now.unix_millis());
}

#[test]
fn when_decay_repeats_daily_then_price_keeps_falling_but_never_below_baseline() {
    let ledger = Ledger::open_in_memory().expect("ledger");
    let idle = open(&ledger, "IDLE", 12.0, 0.0);
    let maintenance = Maintenance::new(ledger.clone());

    let mut previous = 12.0;
    for _ in 0..60 {
        maintenance
            .run_daily_decay_at(UtcDateTime::now())
            .expect("decay");
        let current = price(&ledger, idle.id);
        assert!(current <= previous);
        assert!(current >= 10.0, "undershot baseline: {current}");
        previous = current;
    }
    assert_close(previous, 10.0);

    // And: at baseline further runs change nothing
    let report = maintenance
        .run_daily_decay_at(UtcDateTime::now())
        .expect("decay");
    assert_eq!(report.decayed, 0);
}

#[test]
fn when_stock_traded_today_then_decay_leaves_it_alone() {
    // Given: ACTIVE was just traded, IDLE was not
    let ledger = Ledger::open_in_memory().expect("ledger");
    let active = open(&ledger, "ACTIVE", 12.0, 0.0);
    let idle = open(&ledger, "IDLE", 12.0, 0.0);
    let trader = open(&ledger, "TRADER", 10.0, 500.0);
    let trade = TradingEngine::new(ledger.clone())
        .execute_buy(trader.id, "ACTIVE", 1.0, 0.0)
        .expect("buy");

    // When
    let report = Maintenance::new(ledger.clone())
        .run_daily_decay_at(UtcDateTime::now())
        .expect("decay");

    // Then: only the idle stocks moved
    assert_close(price(&ledger, active.id), trade.new_price);
    assert_close(price(&ledger, idle.id), 11.94);
    assert_eq!(report.candidates, 2, "IDLE and TRADER are idle");
}

#[test]
fn when_last_trade_is_older_than_a_day_then_stock_decays_again() {
    // Given: a trade logged two days ago
    let ledger = Ledger::open_in_memory().expect("ledger");
    let stock = open(&ledger, "OLD", 12.0, 0.0);
    let trader = open(&ledger, "TRADER", 10.0, 500.0);
    let now = UtcDateTime::now();
    ledger
        .transact(|tx| {
            tx.insert_transaction(&TransactionRecord {
                id: String::from("old-trade"),
                actor_id: trader.id,
                stock_id: stock.id,
                side: Side::Buy,
                shares: 1.0,
                price_per_share: 12.0,
                total: 12.0,
                executed_at_ms: now.minus(DAY * 2).unix_millis(),
            })
        })
        .expect("log trade");

    // When
    Maintenance::new(ledger.clone())
        .run_daily_decay_at(now)
        .expect("decay");

    // Then
    assert_close(price(&ledger, stock.id), 11.94);
}

#[test]
fn when_market_account_exists_then_decay_never_touches_it() {
    let ledger = Ledger::open_in_memory().expect("ledger");

    let report = Maintenance::new(ledger.clone())
        .run_daily_decay_at(UtcDateTime::now())
        .expect("decay");

    assert_eq!(report.candidates, 0);
    let market = ledger
        .account_by_username(grub_ledger::MARKET_USERNAME)
        .expect("read")
        .expect("seeded");
    assert_eq!(market.current_price, 0.0);
}

// =============================================================================
// Dividends
// =============================================================================

#[derive(Default)]
struct RecordingNotifier {
    delivered: Mutex<Vec<Notification>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        self.delivered
            .lock()
            .expect("lock")
            .push(notification.clone());
        Ok(())
    }
}

#[test]
fn when_holdings_are_worth_1000_then_the_dividend_is_ten_grub() {
    // Given: HOLDER owns 100 STOCK at 10.00
    let ledger = Ledger::open_in_memory().expect("ledger");
    let stock = open(&ledger, "STOCK", 10.0, 0.0);
    let holder = open(&ledger, "HOLDER", 10.0, 5.0);
    give_holding(&ledger, holder.id, stock.id, 100.0);
    let notifier = Arc::new(RecordingNotifier::default());

    // When
    let report = Maintenance::new(ledger.clone())
        .with_notifier(notifier.clone())
        .run_dividends()
        .expect("dividends");

    // Then: 1% of 1000 is credited and the holder is told
    assert_eq!(report.holders, 1);
    assert_eq!(report.paid, 1);
    assert_close(report.total_paid, 10.0);
    assert_close(cash(&ledger, holder.id), 15.0);
    let delivered = notifier.delivered.lock().expect("lock");
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].recipient(), holder.id);
    assert_eq!(
        delivered[0].message(),
        "You received 10.00 Grub in dividends from your holdings!"
    );
}

#[test]
fn when_dividend_is_exactly_the_minimum_then_nothing_is_paid() {
    // Given: holdings worth 1.00, whose 1% is exactly the 0.01 floor
    let ledger = Ledger::open_in_memory().expect("ledger");
    let stock = open(&ledger, "STOCK", 10.0, 0.0);
    let holder = open(&ledger, "HOLDER", 10.0, 5.0);
    give_holding(&ledger, holder.id, stock.id, 0.1);

    // When
    let report = Maintenance::new(ledger.clone())
        .run_dividends()
        .expect("dividends");

    // Then
    assert_eq!(report.holders, 1);
    assert_eq!(report.paid, 0);
    assert_close(cash(&ledger, holder.id), 5.0);
}

#[test]
fn when_dividend_is_just_above_the_minimum_then_the_rounded_amount_is_paid() {
    // Given: holdings worth 1.20, whose 1% is 0.012 before rounding
    let ledger = Ledger::open_in_memory().expect("ledger");
    let stock = open(&ledger, "STOCK", 10.0, 0.0);
    let holder = open(&ledger, "HOLDER", 10.0, 5.0);
    give_holding(&ledger, holder.id, stock.id, 0.12);

    // When
    let report = Maintenance::new(ledger.clone())
        .run_dividends()
        .expect("dividends");

    // Then: the threshold is judged before rounding, and a cent is paid
    assert_eq!(report.paid, 1);
    assert_close(report.total_paid, 0.01);
    assert_close(cash(&ledger, holder.id), 5.01);
}

#[test]
fn when_dividends_are_paid_then_holdings_are_not_touched() {
    let ledger = Ledger::open_in_memory().expect("ledger");
    let stock = open(&ledger, "STOCK", 20.0, 0.0);
    let holder = open(&ledger, "HOLDER", 10.0, 0.0);
    give_holding(&ledger, holder.id, stock.id, 30.0);

    Maintenance::new(ledger.clone())
        .run_dividends()
        .expect("dividends");

    assert_close(cash(&ledger, holder.id), 6.0);
    let holding = ledger
        .holding(holder.id, stock.id)
        .expect("read")
        .expect("holding");
    assert_close(holding.quantity, 30.0);
    assert_close(price(&ledger, stock.id), 20.0);
}

// =============================================================================
// Market snapshots
// =============================================================================

#[test]
fn when_market_snapshot_is_recorded_then_totals_match_the_ledger() {
    // Given: two stocks and one holding
    let ledger = Ledger::open_in_memory().expect("ledger");
    let stock = open(&ledger, "STOCK", 10.0, 50.0);
    let holder = open(&ledger, "HOLDER", 20.0, 25.0);
    give_holding(&ledger, holder.id, stock.id, 3.0);
    let now = UtcDateTime::now();

    // When
    let snapshot = Maintenance::new(ledger.clone())
        .record_market_snapshot_at(now)
        .expect("snapshot");

    // Then: cap = 1000*10 + 1000*20, cash = 75, invested = 3*10
    assert_close(snapshot.total_market_cap, 30_000.0);
    assert_close(snapshot.total_cash, 75.0);
    assert_close(snapshot.total_invested, 30.0);
    assert_close(snapshot.total_grub, 105.0);

    let stored = ledger
        .read(|tx| tx.market_snapshots_since(0))
        .expect("snapshots");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], snapshot);
}
