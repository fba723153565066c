//! Database views shared by valuation queries.

use ::duckdb::Connection;

/// Create database views used by dividend, snapshot, and overview queries.
///
/// Creates the following views:
/// - `vw_holding_values`: every holding marked to the stock's current price
/// - `vw_account_wealth`: cash, marked holdings, and total value per tradable account
///
/// # Errors
/// Returns an error if the view creation SQL fails to execute.
pub fn create_views(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r"
CREATE OR REPLACE VIEW vw_holding_values AS
SELECT
    h.owner_id,
    h.stock_id,
    a.ticker,
    h.quantity,
    h.avg_price,
    a.current_price,
    h.quantity * a.current_price AS market_value
FROM holdings h
JOIN accounts a ON a.id = h.stock_id;

CREATE OR REPLACE VIEW vw_account_wealth AS
SELECT
    a.id AS account_id,
    b.grub AS cash,
    COALESCE(v.holdings_value, 0.0) AS holdings_value,
    b.grub + COALESCE(v.holdings_value, 0.0) AS total_value
FROM accounts a
JOIN balances b ON b.account_id = a.id
LEFT JOIN (
    SELECT owner_id, SUM(market_value) AS holdings_value
    FROM vw_holding_values
    GROUP BY owner_id
) v ON v.owner_id = a.id
WHERE a.shares_outstanding > 0;
",
    )?;

    Ok(())
}
