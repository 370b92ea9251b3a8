//! Ledger read models
//!
//! Rows produced by the store for history and revenue reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Money;

/// One balance movement of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryRow {
    pub timestamp: DateTime<Utc>,
    pub amount: Money,
    pub description: String,
}

/// Revenue recognized for one service during a month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MonthlyReportRow {
    pub service_name: String,
    pub revenue: Money,
}

/// Column used to order a history page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySortKey {
    #[default]
    Timestamp,
    Amount,
}

impl HistorySortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistorySortKey::Timestamp => "timestamp",
            HistorySortKey::Amount => "amount",
        }
    }
}

impl std::fmt::Display for HistorySortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
