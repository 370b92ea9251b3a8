//! Domain module
//!
//! Money, request DTOs and the read models returned by the store.

pub mod dto;
pub mod ledger;
pub mod money;

pub use dto::{
    CancelTransactionDto, GetBalanceDto, GetHistoryDto, GetMonthlyReportDto,
    RecognizeRevenueDto, ReplenishBalanceDto, ReserveMoneyDto,
};
pub use ledger::{HistoryRow, HistorySortKey, MonthlyReportRow};
pub use money::{Money, MoneyError};
