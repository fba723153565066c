//! # Grub Ledger
//!
//! DuckDB-backed durable store for the Grub exchange.
//!
//! ## Overview
//!
//! The ledger owns every persisted entity of the exchange: accounts (which double
//! as tradable stocks), balances, holdings, the append-only transaction log, price
//! history and periodic snapshots. It offers no business rules of its own; the
//! trading engine drives it through [`Ledger::transact`], which runs a closure
//! inside one all-or-nothing `DuckDB` transaction.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grub_ledger::{Ledger, LedgerConfig, LedgerError, NewAccount};
//!
//! fn main() -> Result<(), LedgerError> {
//!     let ledger = Ledger::open(LedgerConfig::default())?;
//!     let account = ledger.open_account(
//!         &NewAccount {
//!             username: "alice".to_string(),
//!             ticker: "ALICE".to_string(),
//!             initial_price: 10.0,
//!             shares_outstanding: 1_000,
//!             initial_balance: 100.0,
//!         },
//!         1_700_000_000_000,
//!     )?;
//!
//!     let price = ledger.read(|tx| tx.account_by_id(account.id))?;
//!     println!("{price:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `accounts` | Identities, tickers, spot price, version counter |
//! | `balances` | Grub balance per account |
//! | `holdings` | Shares owned per (owner, stock) with cost basis |
//! | `transactions` | Immutable trade log |
//! | `price_history` | Every price mutation |
//! | `market_snapshots` | Economy-wide aggregates |
//! | `portfolio_snapshots` | Per-account wealth samples |
//!
//! ## Concurrency
//!
//! Price writes are guarded by a version counter (see [`LedgerTx::update_price`]).
//! `DuckDB` also aborts transactions that write the same row concurrently; both
//! surface as errors for which [`LedgerError::is_conflict`] is true, and callers
//! are expected to retry the whole unit of work.

pub mod duckdb;
pub mod migrations;
mod records;
mod tx;
pub mod views;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use ::duckdb::Connection;
use thiserror::Error;

pub use duckdb::{DuckDbConnectionManager, PooledConnection};
pub use records::{
    AccountRecord, AccountWealth, BalanceRecord, HoldingRecord, MarketSnapshotRecord,
    MarketTotals, NewAccount, PortfolioSnapshotRecord, PricePointRecord, TradeSide,
    TransactionRecord,
};
pub use tx::LedgerTx;

/// Username and ticker of the non-tradable system account.
pub const MARKET_USERNAME: &str = "MARKET";

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Optimistic version check failed; the row changed since it was read.
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: i64 },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    /// A stored value could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl LedgerError {
    /// True when retrying the same unit of work may succeed.
    ///
    /// Covers the explicit version check as well as `DuckDB`'s own write-write
    /// conflict detection, which is reported through its error message.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::DuckDb(error) => {
                let message = error.to_string().to_ascii_lowercase();
                message.contains("conflict") || message.contains("duplicate key")
            }
            _ => false,
        }
    }
}

/// Configuration for the ledger database.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Root directory for grub data.
    pub grub_home: PathBuf,
    /// Path to the `DuckDB` database file; `None` keeps the ledger in memory.
    pub db_path: Option<PathBuf>,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let grub_home = resolve_grub_home();
        let db_path = Some(grub_home.join("ledger.duckdb"));
        Self {
            grub_home,
            db_path,
            max_pool_size: 8,
        }
    }
}

impl LedgerConfig {
    /// A private in-memory ledger, discarded when the last handle drops.
    pub fn in_memory() -> Self {
        Self {
            grub_home: resolve_grub_home(),
            db_path: None,
            max_pool_size: 8,
        }
    }

    /// Store the database under `grub_home`.
    pub fn at_home(grub_home: impl Into<PathBuf>) -> Self {
        let grub_home = grub_home.into();
        let db_path = Some(grub_home.join("ledger.duckdb"));
        Self {
            grub_home,
            db_path,
            max_pool_size: 8,
        }
    }
}

/// Handle to the exchange's durable state. Cheap to clone.
#[derive(Clone)]
pub struct Ledger {
    config: LedgerConfig,
    manager: DuckDbConnectionManager,
}

impl Ledger {
    /// Open a ledger with default configuration.
    pub fn open_default() -> Result<Self, LedgerError> {
        Self::open(LedgerConfig::default())
    }

    /// Open a private in-memory ledger.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::open(LedgerConfig::in_memory())
    }

    /// Open a ledger with the specified configuration, creating the schema.
    pub fn open(config: LedgerConfig) -> Result<Self, LedgerError> {
        let manager = match config.db_path.as_deref() {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                DuckDbConnectionManager::open(path, config.max_pool_size)?
            }
            None => DuckDbConnectionManager::open_in_memory(config.max_pool_size)?,
        };

        let ledger = Self { config, manager };
        ledger.initialize()?;
        Ok(ledger)
    }

    /// Apply migrations, create views and seed the system account.
    pub fn initialize(&self) -> Result<(), LedgerError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        views::create_views(&connection)?;
        seed_market_account(&connection)?;
        Ok(())
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Path to the database file, `None` for in-memory ledgers.
    pub fn db_path(&self) -> Option<&Path> {
        self.manager.db_path()
    }

    /// Run `work` inside a single `DuckDB` transaction.
    ///
    /// The transaction commits when `work` returns `Ok` and rolls back otherwise,
    /// so callers never observe a partial set of writes. A failed `COMMIT` is
    /// rolled back and reported as an error.
    pub fn transact<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&LedgerTx<'_>) -> Result<T, E>,
        E: From<LedgerError>,
    {
        let connection = self.manager.acquire().map_err(LedgerError::from)?;
        connection
            .execute_batch("BEGIN TRANSACTION")
            .map_err(LedgerError::from)?;
        let result = work(&LedgerTx::new(&connection));
        finalize_transaction(&connection, result)
    }

    /// Run read-only `work` outside of an explicit transaction.
    pub fn read<T, F>(&self, work: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&LedgerTx<'_>) -> Result<T, LedgerError>,
    {
        let connection = self.manager.acquire()?;
        work(&LedgerTx::new(&connection))
    }

    /// Create an account with its balance row.
    ///
    /// Fails with [`LedgerError::AlreadyExists`] when the ticker or username is taken.
    pub fn open_account(
        &self,
        account: &NewAccount,
        now_ms: i64,
    ) -> Result<AccountRecord, LedgerError> {
        self.transact(|tx| tx.insert_account(account, now_ms))
    }

    pub fn account_by_ticker(&self, ticker: &str) -> Result<Option<AccountRecord>, LedgerError> {
        self.read(|tx| tx.account_by_ticker(ticker))
    }

    pub fn account_by_id(&self, id: i64) -> Result<Option<AccountRecord>, LedgerError> {
        self.read(|tx| tx.account_by_id(id))
    }

    pub fn account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AccountRecord>, LedgerError> {
        self.read(|tx| tx.account_by_username(username))
    }

    pub fn balance(&self, account_id: i64) -> Result<Option<BalanceRecord>, LedgerError> {
        self.read(|tx| tx.balance(account_id))
    }

    pub fn holding(
        &self,
        owner_id: i64,
        stock_id: i64,
    ) -> Result<Option<HoldingRecord>, LedgerError> {
        self.read(|tx| tx.holding(owner_id, stock_id))
    }
}

/// Insert the `MARKET` system account unless it already exists.
fn seed_market_account(connection: &Connection) -> Result<(), LedgerError> {
    let now_ms = now_millis();
    connection.execute_batch(&format!(
        "INSERT INTO accounts \
         (username, ticker, current_price, shares_outstanding, bio, created_at_ms) \
         SELECT '{MARKET_USERNAME}', '{MARKET_USERNAME}', 0.0, 0, 'Automated market maker', {now_ms} \
         WHERE NOT EXISTS (SELECT 1 FROM accounts WHERE username = '{MARKET_USERNAME}'); \
         INSERT INTO balances (account_id, grub, last_claim_ms) \
         SELECT a.id, 0.0, NULL FROM accounts a WHERE a.username = '{MARKET_USERNAME}' \
         AND NOT EXISTS (SELECT 1 FROM balances b WHERE b.account_id = a.id);"
    ))?;
    Ok(())
}

fn finalize_transaction<T, E>(connection: &Connection, result: Result<T, E>) -> Result<T, E>
where
    E: From<LedgerError>,
{
    match result {
        Ok(value) => {
            if let Err(error) = connection.execute_batch("COMMIT") {
                let _ = connection.execute_batch("ROLLBACK");
                return Err(LedgerError::from(error).into());
            }
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn resolve_grub_home() -> PathBuf {
    if let Some(path) = env::var_os("GRUB_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".grub");
    }

    PathBuf::from(".grub")
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
