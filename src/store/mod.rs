//! Ledger storage
//!
//! The [`BalanceStore`] trait is the only seam between the service layer and
//! persistence. `PgBalanceStore` delegates every operation to stored
//! procedures; `MemoryBalanceStore` keeps the same ledger in process.

mod error;
mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{
    CancelTransactionDto, GetBalanceDto, GetHistoryDto, GetMonthlyReportDto, HistoryRow, Money,
    MonthlyReportRow, RecognizeRevenueDto, ReplenishBalanceDto, ReserveMoneyDto,
};

pub use error::StoreError;
pub use memory::MemoryBalanceStore;
pub use postgres::PgBalanceStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence operations of the balance ledger.
///
/// Each call is atomic: either every effect is applied or none is. DTOs are
/// expected to be validated by the caller.
#[async_trait]
pub trait BalanceStore {
    /// Current balance of an existing user
    async fn get_balance(&self, dto: &GetBalanceDto) -> StoreResult<Money>;

    /// Credit a user, creating the account if it does not exist
    async fn replenish_balance(&self, dto: &ReplenishBalanceDto) -> StoreResult<()>;

    /// Debit a user and record a pending reservation
    async fn reserve_money(&self, dto: &ReserveMoneyDto) -> StoreResult<()>;

    /// Mark a pending reservation as realized revenue
    async fn recognize_revenue(&self, dto: &RecognizeRevenueDto) -> StoreResult<()>;

    /// Refund a pending reservation
    async fn cancel_transaction(&self, dto: &CancelTransactionDto) -> StoreResult<()>;

    /// One page of a user's balance movements. `dto.limit` must be positive.
    async fn get_history(&self, dto: &GetHistoryDto) -> StoreResult<Vec<HistoryRow>>;

    /// Recognized revenue per service for one calendar month (UTC)
    async fn get_monthly_report(
        &self,
        dto: &GetMonthlyReportDto,
    ) -> StoreResult<Vec<MonthlyReportRow>>;
}

pub type DynBalanceStore = Arc<dyn BalanceStore + Send + Sync>;
