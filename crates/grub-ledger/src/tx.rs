//! Row-level reads and writes against one ledger session.
//!
//! A [`LedgerTx`] borrows a pooled connection. Inside [`Ledger::transact`] every
//! call participates in the same `DuckDB` transaction; inside [`Ledger::read`] each
//! call is its own auto-committed statement.
//!
//! [`Ledger::transact`]: crate::Ledger::transact
//! [`Ledger::read`]: crate::Ledger::read

use ::duckdb::{Connection, Row, ToSql};

use crate::records::{
    AccountRecord, AccountWealth, BalanceRecord, HoldingRecord, MarketSnapshotRecord,
    MarketTotals, NewAccount, PortfolioSnapshotRecord, PricePointRecord, TradeSide,
    TransactionRecord,
};
use crate::LedgerError;

const ACCOUNT_COLUMNS: &str =
    "id, username, ticker, current_price, shares_outstanding, version, created_at_ms";
const TRANSACTION_COLUMNS: &str =
    "id, actor_id, stock_id, side, shares, price_per_share, total, executed_at_ms";

/// A borrowed ledger session.
pub struct LedgerTx<'conn> {
    connection: &'conn Connection,
}

impl<'conn> LedgerTx<'conn> {
    pub(crate) fn new(connection: &'conn Connection) -> Self {
        Self { connection }
    }

    // ---------------------------------------------------------------------
    // Accounts
    // ---------------------------------------------------------------------

    pub fn account_by_ticker(&self, ticker: &str) -> Result<Option<AccountRecord>, LedgerError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE ticker = ?");
        let params: [&dyn ToSql; 1] = [&ticker];
        optional(self.connection.query_row(&sql, params.as_slice(), read_account))
    }

    pub fn account_by_id(&self, id: i64) -> Result<Option<AccountRecord>, LedgerError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
        let params: [&dyn ToSql; 1] = [&id];
        optional(self.connection.query_row(&sql, params.as_slice(), read_account))
    }

    pub fn account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AccountRecord>, LedgerError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = ?");
        let params: [&dyn ToSql; 1] = [&username];
        optional(self.connection.query_row(&sql, params.as_slice(), read_account))
    }

    /// All accounts, including the system account, ordered by id.
    pub fn accounts(&self) -> Result<Vec<AccountRecord>, LedgerError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id");
        let mut statement = self.connection.prepare(&sql)?;
        let rows = statement.query_map([], read_account)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Insert an account together with its balance row.
    pub fn insert_account(
        &self,
        account: &NewAccount,
        now_ms: i64,
    ) -> Result<AccountRecord, LedgerError> {
        if self.account_by_ticker(&account.ticker)?.is_some() {
            return Err(LedgerError::AlreadyExists {
                entity: "account",
                key: format!("ticker {}", account.ticker),
            });
        }
        if self.account_by_username(&account.username)?.is_some() {
            return Err(LedgerError::AlreadyExists {
                entity: "account",
                key: format!("username {}", account.username),
            });
        }

        let params: [&dyn ToSql; 5] = [
            &account.username,
            &account.ticker,
            &account.initial_price,
            &account.shares_outstanding,
            &now_ms,
        ];
        let id: i64 = self.connection.query_row(
            "INSERT INTO accounts \
             (username, ticker, current_price, shares_outstanding, created_at_ms) \
             VALUES (?, ?, ?, ?, ?) RETURNING id",
            params.as_slice(),
            |row| row.get(0),
        )?;

        let params: [&dyn ToSql; 2] = [&id, &account.initial_balance];
        self.connection.execute(
            "INSERT INTO balances (account_id, grub, last_claim_ms) VALUES (?, ?, NULL)",
            params.as_slice(),
        )?;

        Ok(AccountRecord {
            id,
            username: account.username.clone(),
            ticker: account.ticker.clone(),
            current_price: account.initial_price,
            shares_outstanding: account.shares_outstanding,
            version: 0,
            created_at_ms: now_ms,
        })
    }

    /// Compare-and-swap the share price of an account.
    ///
    /// Fails with [`LedgerError::Conflict`] if another writer bumped the version
    /// since `expected_version` was read. Returns the new version.
    pub fn update_price(
        &self,
        account_id: i64,
        expected_version: i64,
        new_price: f64,
    ) -> Result<i64, LedgerError> {
        let params: [&dyn ToSql; 3] = [&new_price, &account_id, &expected_version];
        let changed = self.connection.execute(
            "UPDATE accounts SET current_price = ?, version = version + 1 \
             WHERE id = ? AND version = ?",
            params.as_slice(),
        )?;
        if changed == 0 {
            return Err(LedgerError::Conflict {
                entity: "account",
                id: account_id,
            });
        }
        Ok(expected_version + 1)
    }

    // ---------------------------------------------------------------------
    // Balances
    // ---------------------------------------------------------------------

    pub fn balance(&self, account_id: i64) -> Result<Option<BalanceRecord>, LedgerError> {
        let params: [&dyn ToSql; 1] = [&account_id];
        optional(self.connection.query_row(
            "SELECT account_id, grub, last_claim_ms FROM balances WHERE account_id = ?",
            params.as_slice(),
            |row| {
                Ok(BalanceRecord {
                    account_id: row.get(0)?,
                    grub: row.get(1)?,
                    last_claim_ms: row.get(2)?,
                })
            },
        ))
    }

    /// Add `delta` (negative to debit) to an account's balance.
    pub fn adjust_balance(&self, account_id: i64, delta: f64) -> Result<(), LedgerError> {
        let params: [&dyn ToSql; 2] = [&delta, &account_id];
        let changed = self.connection.execute(
            "UPDATE balances SET grub = grub + ? WHERE account_id = ?",
            params.as_slice(),
        )?;
        if changed == 0 {
            return Err(LedgerError::NotFound {
                entity: "balance",
                key: account_id.to_string(),
            });
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Holdings
    // ---------------------------------------------------------------------

    pub fn holding(
        &self,
        owner_id: i64,
        stock_id: i64,
    ) -> Result<Option<HoldingRecord>, LedgerError> {
        let params: [&dyn ToSql; 2] = [&owner_id, &stock_id];
        optional(self.connection.query_row(
            "SELECT owner_id, stock_id, quantity, avg_price FROM holdings \
             WHERE owner_id = ? AND stock_id = ?",
            params.as_slice(),
            read_holding,
        ))
    }

    /// Insert or overwrite the holding for `(owner_id, stock_id)`.
    pub fn put_holding(&self, holding: &HoldingRecord, now_ms: i64) -> Result<(), LedgerError> {
        let exists = self.holding(holding.owner_id, holding.stock_id)?.is_some();
        if exists {
            let params: [&dyn ToSql; 5] = [
                &holding.quantity,
                &holding.avg_price,
                &now_ms,
                &holding.owner_id,
                &holding.stock_id,
            ];
            self.connection.execute(
                "UPDATE holdings SET quantity = ?, avg_price = ?, updated_at_ms = ? \
                 WHERE owner_id = ? AND stock_id = ?",
                params.as_slice(),
            )?;
        } else {
            let params: [&dyn ToSql; 5] = [
                &holding.owner_id,
                &holding.stock_id,
                &holding.quantity,
                &holding.avg_price,
                &now_ms,
            ];
            self.connection.execute(
                "INSERT INTO holdings (owner_id, stock_id, quantity, avg_price, updated_at_ms) \
                 VALUES (?, ?, ?, ?, ?)",
                params.as_slice(),
            )?;
        }
        Ok(())
    }

    pub fn delete_holding(&self, owner_id: i64, stock_id: i64) -> Result<(), LedgerError> {
        let params: [&dyn ToSql; 2] = [&owner_id, &stock_id];
        self.connection.execute(
            "DELETE FROM holdings WHERE owner_id = ? AND stock_id = ?",
            params.as_slice(),
        )?;
        Ok(())
    }

    pub fn holdings_for_owner(&self, owner_id: i64) -> Result<Vec<HoldingRecord>, LedgerError> {
        let mut statement = self.connection.prepare(
            "SELECT owner_id, stock_id, quantity, avg_price FROM holdings \
             WHERE owner_id = ? ORDER BY stock_id",
        )?;
        let params: [&dyn ToSql; 1] = [&owner_id];
        let rows = statement.query_map(params.as_slice(), read_holding)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Distinct accounts that hold at least one stock.
    pub fn holding_owners(&self) -> Result<Vec<i64>, LedgerError> {
        let mut statement = self
            .connection
            .prepare("SELECT DISTINCT owner_id FROM holdings ORDER BY owner_id")?;
        let rows = statement.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Sum of `quantity * current_price` over an owner's holdings.
    pub fn holdings_value(&self, owner_id: i64) -> Result<f64, LedgerError> {
        let params: [&dyn ToSql; 1] = [&owner_id];
        Ok(self.connection.query_row(
            "SELECT COALESCE(SUM(market_value), 0.0) FROM vw_holding_values WHERE owner_id = ?",
            params.as_slice(),
            |row| row.get(0),
        )?)
    }

    pub fn account_wealth(&self, account_id: i64) -> Result<Option<AccountWealth>, LedgerError> {
        let params: [&dyn ToSql; 1] = [&account_id];
        optional(self.connection.query_row(
            "SELECT account_id, cash, holdings_value, total_value FROM vw_account_wealth \
             WHERE account_id = ?",
            params.as_slice(),
            |row| {
                Ok(AccountWealth {
                    account_id: row.get(0)?,
                    cash: row.get(1)?,
                    holdings_value: row.get(2)?,
                    total_value: row.get(3)?,
                })
            },
        ))
    }

    // ---------------------------------------------------------------------
    // Trade log and price history
    // ---------------------------------------------------------------------

    pub fn insert_transaction(&self, record: &TransactionRecord) -> Result<(), LedgerError> {
        let side = record.side.as_str();
        let params: [&dyn ToSql; 8] = [
            &record.id,
            &record.actor_id,
            &record.stock_id,
            &side,
            &record.shares,
            &record.price_per_share,
            &record.total,
            &record.executed_at_ms,
        ];
        self.connection.execute(
            "INSERT INTO transactions \
             (id, actor_id, stock_id, side, shares, price_per_share, total, executed_at_ms) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params.as_slice(),
        )?;
        Ok(())
    }

    pub fn insert_price_point(&self, point: &PricePointRecord) -> Result<(), LedgerError> {
        let params: [&dyn ToSql; 3] = [&point.stock_id, &point.price, &point.recorded_at_ms];
        self.connection.execute(
            "INSERT INTO price_history (stock_id, price, recorded_at_ms) VALUES (?, ?, ?)",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Tradable accounts with no trade executed at or after `since_ms`.
    pub fn stocks_not_traded_since(&self, since_ms: i64) -> Result<Vec<AccountRecord>, LedgerError> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts a \
             WHERE a.shares_outstanding > 0 AND NOT EXISTS ( \
                 SELECT 1 FROM transactions t \
                 WHERE t.stock_id = a.id AND t.executed_at_ms >= ? \
             ) ORDER BY a.id"
        );
        let mut statement = self.connection.prepare(&sql)?;
        let params: [&dyn ToSql; 1] = [&since_ms];
        let rows = statement.query_map(params.as_slice(), read_account)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Time of the most recent trade in a stock, `None` if it was never traded.
    pub fn last_trade_ms(&self, stock_id: i64) -> Result<Option<i64>, LedgerError> {
        let params: [&dyn ToSql; 1] = [&stock_id];
        Ok(self.connection.query_row(
            "SELECT MAX(executed_at_ms) FROM transactions WHERE stock_id = ?",
            params.as_slice(),
            |row| row.get(0),
        )?)
    }

    pub fn transactions_for_stock(
        &self,
        stock_id: i64,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE stock_id = ? \
             ORDER BY executed_at_ms DESC, id LIMIT {limit}"
        );
        self.query_transactions(&sql, stock_id)
    }

    pub fn transactions_for_actor(
        &self,
        actor_id: i64,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE actor_id = ? \
             ORDER BY executed_at_ms DESC, id LIMIT {limit}"
        );
        self.query_transactions(&sql, actor_id)
    }

    /// Every trade one actor made in one stock, oldest first.
    pub fn transactions_for_pair(
        &self,
        actor_id: i64,
        stock_id: i64,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE actor_id = ? AND stock_id = ? \
             ORDER BY executed_at_ms, id"
        );
        let mut statement = self.connection.prepare(&sql)?;
        let params: [&dyn ToSql; 2] = [&actor_id, &stock_id];
        let rows = statement.query_map(params.as_slice(), read_transaction_row)?;
        collect_transactions(rows)
    }

    pub fn recent_transactions(&self, limit: usize) -> Result<Vec<TransactionRecord>, LedgerError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             ORDER BY executed_at_ms DESC, id LIMIT {limit}"
        );
        let mut statement = self.connection.prepare(&sql)?;
        let rows = statement.query_map([], read_transaction_row)?;
        collect_transactions(rows)
    }

    fn query_transactions(
        &self,
        sql: &str,
        key: i64,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let mut statement = self.connection.prepare(sql)?;
        let params: [&dyn ToSql; 1] = [&key];
        let rows = statement.query_map(params.as_slice(), read_transaction_row)?;
        collect_transactions(rows)
    }

    /// Total Grub traded in a stock at or after `since_ms`.
    pub fn volume_since(&self, stock_id: i64, since_ms: i64) -> Result<f64, LedgerError> {
        let params: [&dyn ToSql; 2] = [&stock_id, &since_ms];
        Ok(self.connection.query_row(
            "SELECT COALESCE(SUM(total), 0.0) FROM transactions \
             WHERE stock_id = ? AND executed_at_ms >= ?",
            params.as_slice(),
            |row| row.get(0),
        )?)
    }

    pub fn price_history_since(
        &self,
        stock_id: i64,
        since_ms: i64,
    ) -> Result<Vec<PricePointRecord>, LedgerError> {
        let mut statement = self.connection.prepare(
            "SELECT stock_id, price, recorded_at_ms FROM price_history \
             WHERE stock_id = ? AND recorded_at_ms >= ? ORDER BY recorded_at_ms",
        )?;
        let params: [&dyn ToSql; 2] = [&stock_id, &since_ms];
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok(PricePointRecord {
                stock_id: row.get(0)?,
                price: row.get(1)?,
                recorded_at_ms: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The most recent recorded price at or before `at_ms`.
    pub fn price_at(&self, stock_id: i64, at_ms: i64) -> Result<Option<f64>, LedgerError> {
        let params: [&dyn ToSql; 2] = [&stock_id, &at_ms];
        optional(self.connection.query_row(
            "SELECT price FROM price_history WHERE stock_id = ? AND recorded_at_ms <= ? \
             ORDER BY recorded_at_ms DESC LIMIT 1",
            params.as_slice(),
            |row| row.get(0),
        ))
    }

    /// All-time `(high, low)` from the price history, `None` when no history exists.
    pub fn price_range(&self, stock_id: i64) -> Result<Option<(f64, f64)>, LedgerError> {
        let params: [&dyn ToSql; 1] = [&stock_id];
        let (high, low): (Option<f64>, Option<f64>) = self.connection.query_row(
            "SELECT MAX(price), MIN(price) FROM price_history WHERE stock_id = ?",
            params.as_slice(),
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(high.zip(low))
    }

    pub fn price_point_count(&self, stock_id: i64) -> Result<i64, LedgerError> {
        let params: [&dyn ToSql; 1] = [&stock_id];
        Ok(self.connection.query_row(
            "SELECT COUNT(*) FROM price_history WHERE stock_id = ?",
            params.as_slice(),
            |row| row.get(0),
        )?)
    }

    // ---------------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------------

    pub fn market_totals(&self) -> Result<MarketTotals, LedgerError> {
        let market_cap: f64 = self.connection.query_row(
            "SELECT COALESCE(SUM(CAST(shares_outstanding AS DOUBLE) * current_price), 0.0) \
             FROM accounts",
            [],
            |row| row.get(0),
        )?;
        let cash: f64 = self.connection.query_row(
            "SELECT COALESCE(SUM(grub), 0.0) FROM balances",
            [],
            |row| row.get(0),
        )?;
        let invested: f64 = self.connection.query_row(
            "SELECT COALESCE(SUM(market_value), 0.0) FROM vw_holding_values",
            [],
            |row| row.get(0),
        )?;
        Ok(MarketTotals {
            market_cap,
            cash,
            invested,
        })
    }

    pub fn insert_market_snapshot(&self, snapshot: &MarketSnapshotRecord) -> Result<(), LedgerError> {
        let params: [&dyn ToSql; 5] = [
            &snapshot.total_market_cap,
            &snapshot.total_invested,
            &snapshot.total_cash,
            &snapshot.total_grub,
            &snapshot.recorded_at_ms,
        ];
        self.connection.execute(
            "INSERT INTO market_snapshots \
             (total_market_cap, total_invested, total_cash, total_grub, recorded_at_ms) \
             VALUES (?, ?, ?, ?, ?)",
            params.as_slice(),
        )?;
        Ok(())
    }

    pub fn market_snapshots_since(
        &self,
        since_ms: i64,
    ) -> Result<Vec<MarketSnapshotRecord>, LedgerError> {
        let mut statement = self.connection.prepare(
            "SELECT total_market_cap, total_invested, total_cash, total_grub, recorded_at_ms \
             FROM market_snapshots WHERE recorded_at_ms >= ? ORDER BY recorded_at_ms",
        )?;
        let params: [&dyn ToSql; 1] = [&since_ms];
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok(MarketSnapshotRecord {
                total_market_cap: row.get(0)?,
                total_invested: row.get(1)?,
                total_cash: row.get(2)?,
                total_grub: row.get(3)?,
                recorded_at_ms: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn insert_portfolio_snapshot(
        &self,
        snapshot: &PortfolioSnapshotRecord,
    ) -> Result<(), LedgerError> {
        let params: [&dyn ToSql; 4] = [
            &snapshot.account_id,
            &snapshot.total_value,
            &snapshot.cash,
            &snapshot.recorded_at_ms,
        ];
        self.connection.execute(
            "INSERT INTO portfolio_snapshots (account_id, total_value, cash, recorded_at_ms) \
             VALUES (?, ?, ?, ?)",
            params.as_slice(),
        )?;
        Ok(())
    }

    pub fn portfolio_snapshots_since(
        &self,
        account_id: i64,
        since_ms: i64,
    ) -> Result<Vec<PortfolioSnapshotRecord>, LedgerError> {
        let mut statement = self.connection.prepare(
            "SELECT account_id, total_value, cash, recorded_at_ms FROM portfolio_snapshots \
             WHERE account_id = ? AND recorded_at_ms >= ? ORDER BY recorded_at_ms",
        )?;
        let params: [&dyn ToSql; 2] = [&account_id, &since_ms];
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok(PortfolioSnapshotRecord {
                account_id: row.get(0)?,
                total_value: row.get(1)?,
                cash: row.get(2)?,
                recorded_at_ms: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn read_account(row: &Row<'_>) -> Result<AccountRecord, ::duckdb::Error> {
    Ok(AccountRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        ticker: row.get(2)?,
        current_price: row.get(3)?,
        shares_outstanding: row.get(4)?,
        version: row.get(5)?,
        created_at_ms: row.get(6)?,
    })
}

fn read_holding(row: &Row<'_>) -> Result<HoldingRecord, ::duckdb::Error> {
    Ok(HoldingRecord {
        owner_id: row.get(0)?,
        stock_id: row.get(1)?,
        quantity: row.get(2)?,
        avg_price: row.get(3)?,
    })
}

/// Raw transaction row; the side is validated after the row leaves `DuckDB`.
type TransactionRow = (String, i64, i64, String, f64, f64, f64, i64);

fn read_transaction_row(row: &Row<'_>) -> Result<TransactionRow, ::duckdb::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn collect_transactions(
    rows: impl Iterator<Item = Result<TransactionRow, ::duckdb::Error>>,
) -> Result<Vec<TransactionRecord>, LedgerError> {
    rows.map(|row| {
        let (id, actor_id, stock_id, side, shares, price_per_share, total, executed_at_ms) = row?;
        Ok(TransactionRecord {
            id,
            actor_id,
            stock_id,
            side: TradeSide::parse(&side)?,
            shares,
            price_per_share,
            total,
            executed_at_ms,
        })
    })
    .collect()
}

/// Map `QueryReturnedNoRows` to `None`.
fn optional<T>(result: Result<T, ::duckdb::Error>) -> Result<Option<T>, LedgerError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(::duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(error) => Err(error.into()),
    }
}
