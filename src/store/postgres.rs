//! PostgreSQL ledger
//!
//! Every operation is a single stored procedure call. Business rule
//! violations come back as database errors and are classified by SQLSTATE
//! and message text.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{
    CancelTransactionDto, GetBalanceDto, GetHistoryDto, GetMonthlyReportDto, HistoryRow,
    HistorySortKey, Money, MonthlyReportRow, RecognizeRevenueDto, ReplenishBalanceDto,
    ReserveMoneyDto,
};

use super::{BalanceStore, StoreError, StoreResult};

const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";
const NO_DATA_FOUND: &str = "P0002";
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

/// Business meaning of a database error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    InsufficientFunds,
    UnknownTransaction,
    Duplicate,
    UnknownUser,
    BalanceLimit,
    Other,
}

fn signal(code: Option<&str>, message: &str) -> Signal {
    if message.contains("NOT_ENOUGH_MONEY") {
        return Signal::InsufficientFunds;
    }
    // Raised with no_data_found too, so it must be checked before the code
    if message.contains("UNKNOWN_TRANSACTION") {
        return Signal::UnknownTransaction;
    }
    match code {
        Some(UNIQUE_VIOLATION) => Signal::Duplicate,
        Some(CHECK_VIOLATION) => Signal::InsufficientFunds,
        Some(NO_DATA_FOUND) => Signal::UnknownUser,
        Some(NUMERIC_VALUE_OUT_OF_RANGE) => Signal::BalanceLimit,
        _ => Signal::Other,
    }
}

fn classify(err: sqlx::Error) -> StoreError {
    let detected = match err.as_database_error() {
        Some(db) => signal(db.code().as_deref(), db.message()),
        None => Signal::Other,
    };

    match detected {
        Signal::InsufficientFunds => StoreError::InsufficientFunds { cause: Some(err) },
        Signal::UnknownTransaction => StoreError::UnknownTransaction { cause: Some(err) },
        Signal::Duplicate => StoreError::DuplicateTransaction { cause: Some(err) },
        Signal::UnknownUser => StoreError::UnknownUser { cause: Some(err) },
        Signal::BalanceLimit => StoreError::BalanceLimitExceeded { cause: Some(err) },
        Signal::Other => StoreError::Database(err),
    }
}

/// Ledger backed by the stored procedures in `migrations/`
#[derive(Debug, Clone)]
pub struct PgBalanceStore {
    pool: PgPool,
}

impl PgBalanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    async fn get_balance(&self, dto: &GetBalanceDto) -> StoreResult<Money> {
        sqlx::query_scalar::<_, Money>("SELECT get_balance($1)")
            .bind(dto.user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)
    }

    async fn replenish_balance(&self, dto: &ReplenishBalanceDto) -> StoreResult<()> {
        sqlx::query("CALL replenish_balance($1, $2, $3)")
            .bind(dto.user_id)
            .bind(dto.amount)
            .bind(dto.description.as_deref().unwrap_or_default())
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        tracing::debug!(user_id = dto.user_id, amount = %dto.amount, "Balance replenished");
        Ok(())
    }

    async fn reserve_money(&self, dto: &ReserveMoneyDto) -> StoreResult<()> {
        // Dropping the transaction without commit rolls it back
        let mut tx = self.pool.begin().await?;

        sqlx::query("CALL reserve_money($1, $2, $3, $4, $5)")
            .bind(dto.user_id)
            .bind(dto.amount)
            .bind(dto.service_id)
            .bind(dto.order_id)
            .bind(dto.description.as_deref().unwrap_or_default())
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        if let Some(name) = dto.service_name() {
            sqlx::query(
                r#"
                INSERT INTO services (id, name)
                VALUES ($1, $2)
                ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
                "#,
            )
            .bind(dto.service_id)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        }

        tx.commit().await?;

        tracing::debug!(
            user_id = dto.user_id,
            service_id = dto.service_id,
            order_id = dto.order_id,
            amount = %dto.amount,
            "Money reserved"
        );
        Ok(())
    }

    async fn recognize_revenue(&self, dto: &RecognizeRevenueDto) -> StoreResult<()> {
        sqlx::query("CALL recognize_revenue($1, $2, $3, $4)")
            .bind(dto.user_id)
            .bind(dto.amount)
            .bind(dto.service_id)
            .bind(dto.order_id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        tracing::debug!(
            user_id = dto.user_id,
            service_id = dto.service_id,
            order_id = dto.order_id,
            "Revenue recognized"
        );
        Ok(())
    }

    async fn cancel_transaction(&self, dto: &CancelTransactionDto) -> StoreResult<()> {
        sqlx::query("CALL cancel_transaction($1, $2, $3)")
            .bind(dto.user_id)
            .bind(dto.service_id)
            .bind(dto.order_id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        tracing::debug!(
            user_id = dto.user_id,
            service_id = dto.service_id,
            order_id = dto.order_id,
            "Reservation cancelled"
        );
        Ok(())
    }

    async fn get_history(&self, dto: &GetHistoryDto) -> StoreResult<Vec<HistoryRow>> {
        let query = match dto.sort_by {
            HistorySortKey::Timestamp => {
                "SELECT * FROM get_history_sorted_by_timestamp($1, $2, $3, $4)"
            }
            HistorySortKey::Amount => "SELECT * FROM get_history_sorted_by_amount($1, $2, $3, $4)",
        };

        sqlx::query_as::<_, HistoryRow>(query)
            .bind(dto.user_id)
            .bind(dto.offset)
            .bind(dto.limit)
            .bind(dto.reverse)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)
    }

    async fn get_monthly_report(
        &self,
        dto: &GetMonthlyReportDto,
    ) -> StoreResult<Vec<MonthlyReportRow>> {
        sqlx::query_as::<_, MonthlyReportRow>("SELECT * FROM get_month_report($1, $2)")
            .bind(dto.month)
            .bind(dto.year)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_from_raised_messages() {
        assert_eq!(signal(Some("P0001"), "NOT_ENOUGH_MONEY"), Signal::InsufficientFunds);
        assert_eq!(
            signal(Some(NO_DATA_FOUND), "RECOGNIZE_UNKNOWN_TRANSACTION"),
            Signal::UnknownTransaction
        );
        assert_eq!(
            signal(Some(NO_DATA_FOUND), "CANCEL_UNKNOWN_TRANSACTION"),
            Signal::UnknownTransaction
        );
    }

    #[test]
    fn test_signal_from_sqlstate() {
        assert_eq!(
            signal(Some(UNIQUE_VIOLATION), "duplicate key value violates unique constraint"),
            Signal::Duplicate
        );
        assert_eq!(signal(Some(NO_DATA_FOUND), "UNKNOWN_USER"), Signal::UnknownUser);
        assert_eq!(
            signal(Some(CHECK_VIOLATION), "new row violates check constraint"),
            Signal::InsufficientFunds
        );
        assert_eq!(
            signal(Some(NUMERIC_VALUE_OUT_OF_RANGE), "numeric field overflow"),
            Signal::BalanceLimit
        );
    }

    #[test]
    fn test_signal_other() {
        assert_eq!(signal(Some("42P01"), "relation does not exist"), Signal::Other);
        assert_eq!(signal(None, "connection reset"), Signal::Other);
    }

    #[test]
    fn test_non_database_errors_pass_through() {
        assert!(matches!(
            classify(sqlx::Error::RowNotFound),
            StoreError::Database(sqlx::Error::RowNotFound)
        ));
    }
}
