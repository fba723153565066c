use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

// Balances carry no CHECK (grub >= 0): non-negativity is a trade precondition
// enforced by the engine, not a storage rule.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_ledger_tables",
        sql: r#"
CREATE SEQUENCE IF NOT EXISTS account_id_seq START 1;

CREATE TABLE IF NOT EXISTS accounts (
    id BIGINT PRIMARY KEY DEFAULT nextval('account_id_seq'),
    username TEXT NOT NULL UNIQUE,
    ticker TEXT NOT NULL UNIQUE,
    current_price DOUBLE NOT NULL,
    shares_outstanding BIGINT NOT NULL,
    version BIGINT NOT NULL DEFAULT 0,
    bio TEXT NOT NULL DEFAULT '',
    created_at_ms BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS balances (
    account_id BIGINT PRIMARY KEY,
    grub DOUBLE NOT NULL,
    last_claim_ms BIGINT
);

CREATE TABLE IF NOT EXISTS holdings (
    owner_id BIGINT NOT NULL,
    stock_id BIGINT NOT NULL,
    quantity DOUBLE NOT NULL,
    avg_price DOUBLE NOT NULL,
    updated_at_ms BIGINT NOT NULL,
    PRIMARY KEY(owner_id, stock_id)
);

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    actor_id BIGINT NOT NULL,
    stock_id BIGINT NOT NULL,
    side TEXT NOT NULL CHECK (side IN ('BUY', 'SELL')),
    shares DOUBLE NOT NULL,
    price_per_share DOUBLE NOT NULL,
    total DOUBLE NOT NULL,
    executed_at_ms BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS price_history (
    stock_id BIGINT NOT NULL,
    price DOUBLE NOT NULL,
    recorded_at_ms BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS market_snapshots (
    total_market_cap DOUBLE NOT NULL,
    total_invested DOUBLE NOT NULL,
    total_cash DOUBLE NOT NULL,
    total_grub DOUBLE NOT NULL,
    recorded_at_ms BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS portfolio_snapshots (
    account_id BIGINT NOT NULL,
    total_value DOUBLE NOT NULL,
    cash DOUBLE NOT NULL,
    recorded_at_ms BIGINT NOT NULL
);
"#,
    },
    Migration {
        version: "0002_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_transactions_stock_ts ON transactions(stock_id, executed_at_ms);
CREATE INDEX IF NOT EXISTS idx_transactions_actor_ts ON transactions(actor_id, executed_at_ms);
CREATE INDEX IF NOT EXISTS idx_price_history_stock_ts ON price_history(stock_id, recorded_at_ms);
CREATE INDEX IF NOT EXISTS idx_market_snapshots_ts ON market_snapshots(recorded_at_ms);
CREATE INDEX IF NOT EXISTS idx_portfolio_snapshots_account_ts ON portfolio_snapshots(account_id, recorded_at_ms);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            ::duckdb::params![migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                ::duckdb::params![migration.version],
            )?;
        }
    }

    Ok(())
}

/// Names of all migrations in application order.
pub fn migration_versions() -> impl Iterator<Item = &'static str> {
    MIGRATIONS.iter().map(|migration| migration.version)
}
